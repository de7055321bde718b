//! Configuration file rendering
//!
//! The output follows the layout of the stock `ear.conf` template: commented
//! section headers, one `Key=value` per line, and one line per EARGM, tag
//! and island.

use super::model::{
    DaemonsConfig, DbManagerPlacement, PowercapConfig, PowercapMode, TagConfig, WizardModel,
};

const RULE: &str =
    "#---------------------------------------------------------------------------------------------------";

/// Line buffer for configuration text
#[derive(Default)]
struct Lines(Vec<String>);

impl Lines {
    fn push(&mut self, line: impl Into<String>) {
        self.0.push(line.into());
    }

    fn extend(&mut self, lines: &[&str]) {
        self.0.extend(lines.iter().map(|l| l.to_string()));
    }

    fn header(&mut self, title: &str) {
        self.push(RULE);
        self.push(format!("# {}", title));
        self.push(RULE);
    }

    fn finish(self) -> String {
        let mut text = self.0.join("\n");
        text.push('\n');
        text
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn render_daemons(out: &mut Lines, daemons: &DaemonsConfig) {
    let db = &daemons.database;
    out.header("DB configuration: This configuration corresponds with the DB server installation.");
    out.push(format!("DBIp={}", db.ip));
    out.push(format!("DBUser={}", db.user));
    out.push(format!("DBPassw={}", db.password));
    out.push("# User and password for usermode queries.");
    out.push(format!("DBCommandsUser={}", db.commands_user));
    out.push(format!("DBCommandsPassw={}", db.commands_password));
    out.push(format!("DBDatabase={}", db.database));
    out.push(format!("DBPort={}", db.port));
    out.push(format!("DBMaxConnections={}", db.max_connections));
    out.push("# Extended node information saves also the average frequency and temperature.");
    out.push(format!("DBReportNodeDetail={}", flag(db.report_node_detail)));
    out.push("# Extended signature information saves also the hardware counters.");
    out.push(format!("DBReportSigDetail={}", flag(db.report_sig_detail)));
    out.push("# Report loop signatures.");
    out.push(format!("DBReportLoops={}", flag(db.report_loops)));

    let node = &daemons.node;
    out.header("EAR Daemon (EARD): Update this section to change EARD configuration.");
    out.push("# Port is used for connections with the EAR plugin and commands.");
    out.push(format!("NodeDaemonPort={}", node.port));
    out.push("# Frequency at which the periodic metrics are reported, in seconds.");
    out.push(format!("NodeDaemonPowermonFreq={}", node.powermon_freq));
    out.push("# Max frequency used by eard. It's max frequency but min pstate.");
    out.extend(&["NodeDaemonMinPstate=0", "NodeDaemonTurbo=0"]);
    out.push("# Defines whether EARD uses the DB.");
    out.push(format!("NodeUseDB={}", flag(node.use_db)));
    out.push("# Defines if EARD connects with EARDBD to report data or directly with the DB server. Only for testing.");
    out.push("NodeUseEARDBD=1");
    out.push("# When set to 1, EARD must set frequencies before job starts. If not, frequency is only changed in case job runs with EARL.");
    out.push("NodeDaemonForceFrequencies=1");
    out.push("# Verbosity.");
    out.push("NodeDaemonVerbose=1");
    out.push("# When set to 1, the output is saved in 'TmpDir'/eard.log (common configuration) as a log file.");
    out.push(format!("NodeUseLog={}", flag(node.use_log)));
    out.push(format!("EARDReportPlugins={}", node.report_plugins.join(":")));

    let dbd = &daemons.db_manager;
    out.header("EAR Database Manager (EARDBD): Update this section to change EARDBD configuration.");
    out.push(format!("DBDaemonPortTCP={}", dbd.tcp_port));
    out.push(format!("DBDaemonPortSecTCP={}", dbd.sec_tcp_port));
    out.push(format!("DBDaemonSyncPort={}", dbd.sync_port));
    out.push("# Frequency at which power metrics are aggregated in aggregated metrics, in seconds.");
    out.push(format!("DBDaemonAggregationTime={}", dbd.aggregation_time));
    out.push("# Frequency at which buffered data is sent to DB server.");
    out.push(format!("DBDaemonInsertionTime={}", dbd.insertion_time));
    out.push("# Memory size expressed in MB per process (server and/or mirror) to cache the values.");
    out.push("DBDaemonMemorySize=120");
    out.extend(&[
        "#",
        "# The percentage of the memory buffer used by the previous field, by each type.",
        "# These types are: mpi, non-mpi and learning applications, loops, energy metrics and aggregations and events, in that order. If a type gets 0% of space, this metric is discarded and not saved into the database.",
        "#",
        "#DBDaemonMemorySizePerType=40,20,5,24,5,1,5",
        "",
    ]);
    out.push("# When set to 1, the output is saved in 'TmpDir'/eardbd.log (common configuration) as a log file.");
    out.push(format!("DBDaemonUseLog={}", flag(dbd.use_log)));
    out.push(format!("EARDBDReportPlugins={}", dbd.report_plugins.join(":")));

    out.header("EAR Library (EARL): These options modify internal EARL behaviour. Do not modify except you are an expert.");
    out.extend(&[
        "CoefficientsDir=@sysconfdir@/ear/coeffs",
        "# Default power policy values",
        "MinTimePerformanceAccuracy=10000000",
        "# DynAIS configuration",
        "DynAISLevels=10",
        "DynAISWindowSize=200",
        "#",
        "# Maximum time (in seconds) EAR will wait until a signature is computed.",
        "# After 'DynaisTimeout' seconds, if no signature is computed, EAR will go to periodic mode.",
        "#",
        "DynaisTimeout=15",
        "# When EAR goes to periodic mode, it will compute the application signature every 'LibraryPeriod' seconds.",
        "LibraryPeriod=10",
        "# EAR will check every N mpi calls whether it must go to periodic mode or not.",
        "CheckEARModeEvery=1000",
        "# EAR library default report plugin",
        "EARLReportPlugins=eard.so",
    ]);
}

fn eargm_lines(model: &WizardModel) -> Vec<String> {
    let Some(powercap) = &model.powercap else {
        return vec!["#EARGMId=0 energy=0 power=0".to_string()];
    };
    powercap
        .eargms
        .iter()
        .map(|eargm| {
            let energy = if eargm.id == 1 { model.energy.limit } else { 0 };
            let mut line = format!(
                "EARGMId={} energy={} power={} node={} port={}",
                eargm.id, energy, eargm.budget, eargm.host, eargm.port
            );
            if let Some(meta) = powercap.meta_of(eargm.id) {
                let ids: Vec<String> = meta.controlled.iter().map(|id| id.to_string()).collect();
                line.push_str(&format!(" meta={}", ids.join(",")));
            }
            line
        })
        .collect()
}

fn render_eargm(out: &mut Lines, model: &WizardModel) {
    let energy = &model.energy;
    let powercap = model.powercap.as_ref();
    let warnings: Vec<String> = energy.warnings.iter().map(|w| w.to_string()).collect();

    out.header("EAR Global Manager (EARGMD): Update that section to use EARGM.");
    out.extend(&[
        "#",
        "# Use aggregated periodic metrics or periodic power metrics.",
        "# Aggregated metrics are only available when EARDBD is running.",
        "#",
    ]);
    out.push(format!("EARGMUseAggregated={}", flag(energy.use_aggregated)));
    out.push("# Period T1 and T2 are specified in seconds (ex. T1 must be less than T2, ex. 10min and 1 month).");
    out.push(format!("EARGMPeriodT1={}", energy.t1));
    out.push(format!("EARGMPeriodT2={}", energy.t2));
    out.push("# 'J' are Joules, 'K' KiloJoules and 'M' MegaJoules.");
    out.push(format!("EARGMUnits={}", energy.unit.letter()));
    out.push("EARGMPort=50000");
    out.push("# Two modes are supported '0=manual' and '1=automatic'.");
    out.push("EARGMMode=1");
    out.push("# Email address to report the warning level (and the action taken in automatic mode).");
    out.push(format!("EARGMMail={}", energy.mail));
    out.push("# Percentage of accumulated energy to start the warning DEFCON level L4, L3 and L2.");
    out.push(format!("EARGMWarningsPerc={}", warnings.join(",")));
    out.push("# T1 \"grace\" periods between DEFCON before re-evaluate.");
    out.push("EARGMGracePeriods=3");
    out.push("# Verbosity");
    out.push("EARGMVerbose=0");
    out.push("# When set to 1, the output is saved in 'TmpDir'/eargmd.log (common configuration) as a log file.");
    out.push(format!("EARGMUseLog={}", flag(model.eargm_use_log)));
    out.extend(&[
        "#",
        "# Format for action is: command_name energy_T1 energy_T2 energy_limit T2 T1 units",
        "# This action is automatically executed at each warning level (only once per grace periods).",
        "#",
    ]);
    out.push(format!("EARGMEnergyAction={}", energy.action));
    out.push("# Period at which the powercap thread is activated. Meta-EARGM checks the EARGMs it controls every 2*EARGMPowerPeriod");
    out.push(format!("EARGMPowerPeriod={}", powercap.map(|p| p.period).unwrap_or(0)));
    out.push("# Powercap mode: 0 is monitoring, 1 is hard powercap, 2 is soft powercap.");
    out.push(format!(
        "EARGMPowerCapMode={}",
        powercap.map(|p| p.mode.as_number()).unwrap_or(0)
    ));

    let (suspend_limit, suspend_action, resume_limit, resume_action) = match powercap {
        Some(p) => (
            p.suspend.percentage,
            p.suspend.action.as_str(),
            p.resume.percentage,
            p.resume.action.as_str(),
        ),
        None => (0, super::model::NO_ACTION, 0, super::model::NO_ACTION),
    };
    out.push("# Admins can specify to automatically execute a command in EARGMPowerCapSuspendAction when total_power >= EARGMPowerLimit*EARGMPowerCapSuspendLimit/100");
    out.push(format!("EARGMPowerCapSuspendLimit={}", suspend_limit));
    out.push("# Format for action is: command_name current_power current_limit total_idle_nodes total_idle_power");
    out.push(format!("EARGMPowerCapSuspendAction={}", suspend_action));
    out.extend(&[
        "#",
        "# Admins can specify to automatically execute a command in EARGMPowerCapResumeAction to undo EARGMPowerCapSuspendAction",
        "# when total_power >= EARGMPowerLimit*EARGMPowerCapResumeLimit/100.",
        "# Note that this will only be executed if a suspend action was executed previously.",
        "#",
    ]);
    out.push(format!("EARGMPowerCapResumeLimit={}", resume_limit));
    out.push("# Format for action is: command_name current_power current_limit total_idle_nodes total_idle_power");
    out.push(format!("EARGMPowerCapResumeAction={}", resume_action));
    out.extend(&[
        "#",
        "# EARGMs must be specified with a unique id, their node and the port that receives remote",
        "# connections. An EARGM can also act as meta-eargm if the meta field is filled, and it will",
        "# control the EARGMs whose ids are in said field. If two EARGMs are in the same node,",
        "# setting the EARGMID environment variable overrides the node field and chooses the characteristics",
        "# of the EARGM with the corresponding id.",
        "#",
        "# Only one EARGM can currently control the energy caps, so setting the rest to 0 is recommended.",
        "# energy = 0 -> energy_cap disabled",
        "# power = 0  -> powercap disabled",
        "# power = N  -> powercap budget for that EARGM (and the nodes it controls) is N",
        "# power = -1 -> powercap budget is calculated by adding up the powercap set to each of the nodes under its control.",
        "#",
    ]);
    for line in eargm_lines(model) {
        out.push(line);
    }
}

/// Tag line for node type `index`
pub fn tag_line(model: &WizardModel, index: usize, tag: &TagConfig) -> String {
    let node_type = &model.cluster.types[index];
    let (powercap, max_powercap) = match &model.powercap {
        None => (0, 0),
        Some(pc) => node_powercap(pc, model, index),
    };

    let mut line = format!("Tag={}", tag.type_name);
    if tag.default {
        line.push_str(" default=yes");
    }
    line.push_str(&format!(
        " max_avx512={} max_avx2={} max_power={} min_power={} error_power={}",
        tag.max_avx512,
        tag.max_avx2,
        node_type.max_power,
        tag.min_power,
        node_type.error_power()
    ));
    line.push_str(&format!(
        " coeffs=coeffs.default powercap={} powercap_plugin=dvfs.so energy_plugin={}",
        powercap, tag.energy_plugin
    ));
    if tag.gpu_def_freq > 0 {
        line.push_str(" gpu_powercap_plugin=gpu.so");
    }
    line.push_str(&format!(" max_powercap={}", max_powercap));
    if tag.gpu_def_freq > 0 {
        line.push_str(&format!(" gpu_def_freq={}", tag.gpu_def_freq));
    }
    line.push_str(&format!(
        " cpu_max_pstate=0 imc_max_pstate=0 energy_model={} imc_max_freq=0 imc_min_freq=0 idle_governor={} idle_pstate=0",
        tag.energy_model, tag.idle_governor
    ));
    line
}

/// `(powercap, max_powercap)` tag values for node type `index`.
///
/// Monitor and soft modes run nodes unlimited (`powercap=1`) and apply the
/// per-node cap only when the cluster must be capped; hard mode caps nodes
/// from the start.
fn node_powercap(pc: &PowercapConfig, model: &WizardModel, index: usize) -> (u64, u64) {
    let cap = pc.node_cap(&model.cluster, index);
    match pc.mode {
        PowercapMode::Monitor | PowercapMode::Soft => (1, cap),
        PowercapMode::Hard => (cap, model.cluster.types[index].max_power),
    }
}

fn island_line(model: &WizardModel, index: usize) -> String {
    let name = &model.cluster.types[index].name;
    let mut line = format!("Island={} Nodes=[{}-nodes] Tag={}", index, name, name);
    if let Some(daemons) = &model.daemons {
        let dbd = &daemons.db_manager;
        let host = match &dbd.placement {
            DbManagerPlacement::Global { host } => Some(host),
            DbManagerPlacement::PerType { hosts } => {
                hosts.iter().find(|(t, _)| t == name).map(|(_, h)| h)
            }
        };
        if let Some(host) = host {
            line.push_str(&format!(" DBIP={}", host));
        }
        if let Some(mirror) = &dbd.mirror {
            line.push_str(&format!(" DBSECIP={}", mirror));
        }
    }
    if let Some(pc) = &model.powercap {
        line.push_str(&format!(" EARGMID={}", pc.controller_of(index)));
    }
    line
}

/// Only the EARGM section
pub fn render_eargm_section(model: &WizardModel) -> String {
    let mut out = Lines::default();
    render_eargm(&mut out, model);
    out.finish()
}

/// Complete configuration file
pub fn render_configuration(model: &WizardModel) -> String {
    let mut out = Lines::default();
    out.extend(&["# EAR Configuration File", ""]);

    if let Some(daemons) = &model.daemons {
        render_daemons(&mut out, daemons);
    }
    render_eargm(&mut out, model);
    out.push("#");

    out.header("Common configuration");
    out.extend(&[
        "TmpDir=@localstatedir@",
        "EtcDir=@sysconfdir@",
        "InstDir=@prefix@",
        "Verbose=0",
        "# Network extension (using another network instead of the local one).",
        "# If compute nodes must be accessed from login nodes with a network different than default,",
        "# and can be accessed using an extension, uncomment next line and define 'netext' accordingly.",
        "#NetworkExtension=netext",
    ]);

    let authorized = model.authorized.clone().unwrap_or_default();
    out.header("Authorized Users");
    out.extend(&[
        "#",
        "# Authorized users, accounts and groups are allowed to change policies, thresholds, frequencies, etc.",
        "# They are supposed to be admins, all special name is supported.",
        "#",
    ]);
    out.push(format!("AuthorizedUsers={}", authorized.users));
    out.push(format!("AuthorizedAccounts={}", authorized.accounts));
    out.push(format!("AuthorizedGroups={}", authorized.groups));

    out.header("Tags");
    out.extend(&[
        "# Tags are used for architectural descriptions. Max. AVX frequencies are used in predictor models",
        "# and are SKU-specific. Max. and min. power are used for warning and error tracking.",
        "# Powercap specifies the maximum power a node is allowed to use by default. If an EARGM is",
        "# controlling the cluster with mode UNLIMITED (powercap=1) max_powercap is the set power that",
        "# a node will receive if the cluster needs to be power capped (otherwise it runs",
        "# with unlimited power). A different than the default powercap plugin can be specified for nodes",
        "# using the tag. POWERCAP=0 --> disabled, POWERCAP=1 -->unlimited, POWERCAP=N (> 1) limits node to N watts",
        "# At least a default tag is mandatory to be included in this file for a cluster to work properly.",
        "#",
        "# List of accepted options is: max_avx512(GHz), max_avx2(GHz), max_power(W), min_power(W), error_power(W), coeffs(filename),",
        "# powercap(W), powercap_plugin(filename), energy_plugin(filename), gpu_powercap_plugin(filename), max_powercap(W), gpu_def_freq(GHz),",
        "# cpu_max_pstate(0..max_pstate), imc_max_pstate(0..max_imc_pstate), energy_model(filename)",
        "# imc_max_freq, imc_min_freq, idle_governor(def default), idle_pstate",
        "#",
    ]);
    for (index, tag) in model.tags.iter().enumerate() {
        out.push(tag_line(model, index, tag));
    }
    out.push("#");

    out.header("Power policies");
    out.extend(&[
        "#",
        "# Policy names must be exactly file names for policies installed in the system.",
        "DefaultPowerPolicy=min_time",
        "Policy=monitoring Settings= DefaultPstate= Privileged=",
        "Policy=min_time Settings= DefaultPstate= Privileged=",
        "Policy=min_energy Settings= DefaultPstate= Privileged=",
        "#",
        "# For homogeneous systems, default frequencies can be easily specified using freqs.",
        "# For heterogeneous systems it is preferred to use pstates or use tags",
        "#",
        "",
        "# Example with freqs (lower pstates corresponds with higher frequencies). Pstate=1 is nominal and 0 is turbo",
        "#Policy=monitoring Settings=0 DefaultFreq=2.4 Privileged=0",
        "#Policy=min_time Settings=0.7 DefaultFreq=2.0 Privileged=0",
        "#Policy=min_energy Settings=0.05 DefaultFreq=2.4 Privileged=1",
        "",
        "#Example with tags",
        "#Policy=monitoring Settings=0 DefaultFreq=2.6 Privileged=0 tag=6126",
        "#Policy=min_time Settings=0.7 DefaultFreq=2.1 Privileged=0 tag=6126",
        "#Policy=min_energy Settings=0.05 DefaultFreq=2.6 Privileged=1 tag=6126",
        "",
    ]);

    out.header("Energy Tags");
    out.extend(&[
        "#",
        "# Privileged users, accounts and groups are allowed to use EnergyTags.",
        "# The \"allowed\" TAGs are defined by row together with the privileged user/group/account.",
        "#",
        "EnergyTag=cpu-intensive pstate=1 users=all",
        "EnergyTag=turbo pstate=0",
        "EnergyTag=memory-intensive pstate=4 users=usr1,usr2 groups=grp1,grp2 accounts=acc1,acc2",
        "",
    ]);

    out.header("Node Isles");
    out.extend(&[
        "# It is mandatory to specify all the nodes in the cluster, grouped by islands. More than one line",
        "# per island must be supported to hold nodes with different names or for pointing to different",
        "# EARDBDs through its IPs or hostnames.",
        "# EARGMID is the field that specifies which EARGM controls the nodes in that line. If no EARGMID",
        "# is specified, it will pick the first EARGMID value that is found (ie, the previous line's EARGMID).",
        "#",
    ]);
    for index in 0..model.cluster.types.len() {
        out.push(island_line(model, index));
    }

    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::model::*;

    fn model(powercap: Option<PowercapConfig>) -> WizardModel {
        WizardModel {
            daemons: None,
            cluster: ClusterModel {
                types: vec![
                    NodeType { name: "cpu".into(), nodes: 10, max_power: 500, avg_power: 300 },
                    NodeType { name: "gpu".into(), nodes: 2, max_power: 1500, avg_power: 900 },
                ],
            },
            powercap,
            energy: EnergyCapConfig::disabled(),
            eargm_use_log: true,
            authorized: None,
            tags: vec![
                TagConfig {
                    type_name: "cpu".into(),
                    max_avx512: 2200,
                    max_avx2: 2600,
                    min_power: 80,
                    gpu_def_freq: 0,
                    energy_plugin: "energy_nm.so".into(),
                    energy_model: "default".into(),
                    idle_governor: "default".into(),
                    default: true,
                },
                TagConfig {
                    type_name: "gpu".into(),
                    max_avx512: 0,
                    max_avx2: 0,
                    min_power: 200,
                    gpu_def_freq: 1410,
                    energy_plugin: "energy_rapl.so".into(),
                    energy_model: "default".into(),
                    idle_governor: "default".into(),
                    default: false,
                },
            ],
        }
    }

    fn per_type_powercap(mode: PowercapMode) -> PowercapConfig {
        PowercapConfig {
            mode,
            period: 120,
            per_partition: true,
            eargms: vec![
                Eargm { id: 1, controls: Some(0), budget: 4000, host: "gm1".into(), port: 50100 },
                Eargm { id: 2, controls: Some(1), budget: 2400, host: "gm2".into(), port: 50101 },
            ],
            suspend: PowerThreshold::disabled(),
            resume: PowerThreshold::disabled(),
            metas: vec![MetaEargm { manager: 1, controlled: vec![2] }],
        }
    }

    #[test]
    fn test_no_powercap_placeholders() {
        let m = model(None);
        let text = render_configuration(&m);
        assert!(text.contains("\n#EARGMId=0 energy=0 power=0\n"));
        assert!(text.contains("EARGMPowerCapMode=0\n"));
        assert!(text.contains("EARGMPowerCapSuspendAction=no_action\n"));
        assert!(text.contains("\nIsland=0 Nodes=[cpu-nodes] Tag=cpu\n"));
        assert!(text.contains(
            "Tag=cpu default=yes max_avx512=2200 max_avx2=2600 max_power=500 min_power=80 error_power=550 coeffs=coeffs.default powercap=0 powercap_plugin=dvfs.so energy_plugin=energy_nm.so max_powercap=0 cpu_max_pstate=0"
        ));
    }

    #[test]
    fn test_gpu_tag_fields() {
        let m = model(None);
        let line = tag_line(&m, 1, &m.tags[1]);
        assert!(line.starts_with("Tag=gpu max_avx512=0"));
        assert!(line.contains("energy_plugin=energy_rapl.so gpu_powercap_plugin=gpu.so max_powercap=0 gpu_def_freq=1410 "));
        assert!(line.ends_with("idle_governor=default idle_pstate=0"));
    }

    #[test]
    fn test_eargm_lines_with_meta() {
        let mut m = model(Some(per_type_powercap(PowercapMode::Soft)));
        m.energy.limit = 777;
        let section = render_eargm_section(&m);
        assert!(section.contains("\nEARGMId=1 energy=777 power=4000 node=gm1 port=50100 meta=2\n"));
        assert!(section.contains("\nEARGMId=2 energy=0 power=2400 node=gm2 port=50101\n"));
        assert!(section.contains("EARGMPowerCapMode=2\n"));
        assert!(!section.contains("Tag="));
    }

    #[test]
    fn test_soft_mode_tag_caps() {
        let m = model(Some(per_type_powercap(PowercapMode::Soft)));
        // EARGM 1 budget 4000 over 10 nodes of 500 W
        let line = tag_line(&m, 0, &m.tags[0]);
        assert!(line.contains(" powercap=1 "));
        assert!(line.contains(" max_powercap=400 "));
    }

    #[test]
    fn test_hard_mode_tag_caps() {
        let m = model(Some(per_type_powercap(PowercapMode::Hard)));
        // EARGM 2 budget 2400 over 2 nodes of 1500 W
        let line = tag_line(&m, 1, &m.tags[1]);
        assert!(line.contains(" powercap=1200 "));
        assert!(line.contains(" max_powercap=1500 "));
    }

    #[test]
    fn test_islands_with_controllers() {
        let m = model(Some(per_type_powercap(PowercapMode::Monitor)));
        let text = render_configuration(&m);
        assert!(text.contains("Island=0 Nodes=[cpu-nodes] Tag=cpu EARGMID=1\n"));
        assert!(text.contains("Island=1 Nodes=[gpu-nodes] Tag=gpu EARGMID=2\n"));
    }

    #[test]
    fn test_daemon_sections_only_when_configured() {
        let m = model(None);
        assert!(!render_configuration(&m).contains("DBIp="));
    }
}
