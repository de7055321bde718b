//! Power and energy capping questions

use super::model::{
    ClusterModel, Eargm, EnergyCapConfig, EnergyUnit, MetaEargm, PowerThreshold, PowercapConfig,
    PowercapMode, DEFAULT_EARGM_HOST, DEFAULT_EARGM_PORT, NO_ACTION, NO_MAIL,
};
use super::prompt::{parse_number, Prompter};
use crate::error::Result;
use std::io::{BufRead, Write};
use tracing::warn;

/// Default energy warning thresholds, percent
pub const DEFAULT_WARNINGS: &str = "85,90,95";

/// Three numeric thresholds, lowest first
pub fn parse_warnings(items: &[String]) -> Option<[u64; 3]> {
    if items.len() != 3 {
        return None;
    }
    let mut values = [0u64; 3];
    for (slot, item) in values.iter_mut().zip(items) {
        *slot = parse_number(item, None)?;
    }
    if values.windows(2).all(|w| w[0] <= w[1]) {
        Some(values)
    } else {
        None
    }
}

fn ask_eargm<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    id: u64,
    controls: Option<usize>,
    suggested_budget: u64,
) -> Result<Eargm> {
    let budget = p.number(
        &format!("What is this EARGM's power budget in Watts (suggested {}W)", suggested_budget),
        "Enter a valid power budget",
        Some(suggested_budget),
    )?;
    let host = p.text(
        "What is the hostname where the EARGM will be running",
        "Enter a valid hostname",
        Some(DEFAULT_EARGM_HOST),
    )?;
    let port = p.number_in(
        "What port will this EARGM use for remote connections",
        "Enter a valid port number",
        Some(DEFAULT_EARGM_PORT),
        1..=u16::MAX as u64,
    )?;
    Ok(Eargm {
        id,
        controls,
        budget,
        host,
        port,
    })
}

fn ask_threshold<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    direction: &str,
    default_percentage: u64,
    budgets: &str,
) -> Result<PowerThreshold> {
    let question = format!(
        "Do you want to set up a command when the power consumption goes {} a certain percentage of the total",
        direction
    );
    if !p.yes_no(&question, Some(true))? {
        return Ok(PowerThreshold::disabled());
    }
    let percentage = p.number(
        &format!("What percentage would trigger the command (current power budgets: [{}])", budgets),
        "Enter a valid power percentage",
        Some(default_percentage),
    )?;
    let action = p.text(
        "Please introduce the absolute path to the command (it will be executed with the arguments\ncommand_name current_power current_limit total_idle_nodes total_idle_power)",
        "Enter a valid command",
        None,
    )?;
    Ok(PowerThreshold { percentage, action })
}

fn ask_metas<R: BufRead, W: Write>(p: &mut Prompter<R, W>, ids: &[u64]) -> Result<Vec<MetaEargm>> {
    if !p.yes_no(
        "Would you like to allow power budget redistribution between EARGMs?",
        Some(true),
    )? {
        p.say("No meta-EARGM is configured")?;
        return Ok(Vec::new());
    }

    let count = p.number_in(
        "How many meta-EARGMs do you want to configure",
        "Enter a valid number",
        None,
        1..=(ids.len() / 2).max(1) as u64,
    )?;

    let mut free_managers: Vec<u64> = ids.to_vec();
    let mut uncontrolled: Vec<u64> = ids.to_vec();
    let mut metas = Vec::new();

    for index in 1..=count {
        let groupable = free_managers
            .iter()
            .any(|m| uncontrolled.iter().any(|c| c != m));
        if !groupable {
            warn!("No EARGMs left to group, stopping after {} meta-EARGMs", metas.len());
            break;
        }
        p.say(&format!("Configuring meta-EARGM {}", index))?;

        let managers = join_ids(&free_managers, "/");
        let manager = p.ask_until(
            &format!("Which EARGM would be in charge of managing the distribution? [{}]: ", managers),
            "Enter a valid EARGM ID: ",
            |answer| parse_number(answer, None).filter(|id| free_managers.contains(id)),
        )?;

        let candidates: Vec<u64> = uncontrolled.iter().copied().filter(|id| *id != manager).collect();
        if candidates.is_empty() {
            warn!("EARGM {} has nothing left to control", manager);
            break;
        }
        let controlled = p.list(
            &format!(
                "What EARGMs should it control (comma separated list)? [{}]: ",
                join_ids(&candidates, ", ")
            ),
            "Enter valid EARGM IDs: ",
            None,
            |items| {
                let parsed: Vec<Option<u64>> = items.iter().map(|i| parse_number(i, None)).collect();
                let mut seen = Vec::new();
                !items.is_empty()
                    && parsed.iter().all(|id| match id {
                        Some(id) if candidates.contains(id) && !seen.contains(id) => {
                            seen.push(*id);
                            true
                        }
                        _ => false,
                    })
            },
        )?;
        let controlled: Vec<u64> = controlled
            .iter()
            .filter_map(|i| parse_number(i, None))
            .collect();

        free_managers.retain(|id| *id != manager);
        uncontrolled.retain(|id| !controlled.contains(id));
        metas.push(MetaEargm {
            manager,
            controlled,
        });
    }
    Ok(metas)
}

fn join_ids(ids: &[u64], separator: &str) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Ask the powercap questions; `None` when powercap is declined
pub fn ask_powercap<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    cluster: &ClusterModel,
) -> Result<Option<PowercapConfig>> {
    p.banner("POWERCAP Configuration")?;

    if !p.yes_no("Would you like to configure power capping", Some(true))? {
        p.say("No Power Capping is configured")?;
        return Ok(None);
    }

    let mode = p.ask_until(
        "What powercap mode should be used (monitor/0-hard powercap/1-soft powercap/2) [0/1/2]: ",
        "[0/1/2]: ",
        |answer| parse_number(answer, None).and_then(PowercapMode::from_number),
    )?;
    let period = p.number(
        "How often (in seconds) should the EARGMs ask the nodes for their power status",
        "Enter a valid period (in seconds)",
        Some(120),
    )?;
    let per_partition = p.yes_no(
        "Do you want to manage power limit for each partition independently",
        None,
    )?;

    let type_count = cluster.types.len() as u64;
    let eargm_count = if per_partition {
        let recommended = cluster.recommended_eargms();
        p.number_in(
            &format!(
                "How many EARGMs would you like to configure (given {} nodes and {} partitions, we recommend {} EARGMs)?",
                cluster.total_nodes(),
                type_count,
                recommended
            ),
            &format!("Enter a valid EARGMs number between 1 and {}", type_count),
            Some(recommended),
            1..=type_count.max(1),
        )?
    } else {
        1
    };

    let mut eargms = Vec::new();
    if eargm_count == 1 {
        p.say("Configuring EARGM with ID 1")?;
        eargms.push(ask_eargm(p, 1, None, cluster.max_budget())?);
    } else {
        let names: Vec<&str> = cluster.types.iter().map(|t| t.name.as_str()).collect();
        let options = names.join(",");
        for id in 1..=eargm_count {
            p.say(&format!("Configuring EARGM with ID {}", id))?;
            let claimed: Vec<usize> = eargms.iter().filter_map(|e: &Eargm| e.controls).collect();
            let index = p.ask_until(
                &format!("What type of nodes will it control [{}]: ", options),
                &format!("Enter a valid type of nodes [{}]: ", options),
                |answer| cluster.position(answer.trim()).filter(|i| !claimed.contains(i)),
            )?;
            eargms.push(ask_eargm(p, id, Some(index), cluster.types[index].max_budget())?);
        }
    }

    let budgets = join_ids(&eargms.iter().map(|e| e.budget).collect::<Vec<_>>(), ", ");
    let suspend = ask_threshold(p, "above", 85, &budgets)?;
    let resume = ask_threshold(p, "below", 40, &budgets)?;

    let metas = if eargms.len() > 1 {
        let ids: Vec<u64> = eargms.iter().map(|e| e.id).collect();
        ask_metas(p, &ids)?
    } else {
        Vec::new()
    };

    Ok(Some(PowercapConfig {
        mode,
        period,
        per_partition,
        eargms,
        suspend,
        resume,
        metas,
    }))
}

/// Ask the energy capping questions
pub fn ask_energy_cap<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    cluster: &ClusterModel,
) -> Result<EnergyCapConfig> {
    p.banner("ENERGY CAPPING Configuration")?;

    if !p.yes_no("Would you like to configure energy capping?", Some(true))? {
        p.say("No energy capping is configured")?;
        return Ok(EnergyCapConfig::disabled());
    }

    let t1 = p.number(
        "How often should the EARGM monitor for energy status (in seconds)?",
        "Enter a valid time (in seconds)",
        Some(600),
    )?;
    let t2 = p.number(
        "What time period (in seconds) should the EARGM use to monitor the energy (for example, the last month)?",
        "Enter a valid time (in seconds)",
        Some(2_592_000),
    )?;
    let unit = p.ask_until(
        "In which unit do you want to specify the energy? [J/K/M]: ",
        "Enter a valid unit [J/K/M]: ",
        EnergyUnit::parse,
    )?;
    let suggested = EnergyCapConfig::suggested_limit(cluster, t2, unit);
    let limit = p.number("What is the target energy limit?", "Enter a valid number", Some(suggested))?;
    let use_aggregated = p.yes_no(
        "To do energy control, an EARGM will read data from the configured database.\nShould it use the aggregated data (better performance) instead of the per-node data?",
        Some(true),
    )?;

    let mut config = EnergyCapConfig {
        enabled: true,
        t1,
        t2,
        unit,
        limit,
        use_aggregated,
        warnings: [0, 0, 0],
        mail: NO_MAIL.to_string(),
        action: NO_ACTION.to_string(),
    };

    if !p.yes_no(
        "Would you like to set up warnings when certain energy thresholds are passed?",
        Some(true),
    )? {
        p.say("No energy thresholds configured")?;
        return Ok(config);
    }

    let warnings = p.list(
        &format!("Please introduce the thresholds separated by a comma [{}]: ", DEFAULT_WARNINGS),
        &format!(
            "Enter three values from lowest to highest in comma separated format [{}]: ",
            DEFAULT_WARNINGS
        ),
        Some(DEFAULT_WARNINGS),
        |items| parse_warnings(items).is_some(),
    )?;
    config.warnings = parse_warnings(&warnings).unwrap_or([85, 90, 95]);

    if p.yes_no("Do you want to receive an email when the thresholds are passed?", Some(true))? {
        config.mail = p.text("Please introduce an email address", "Enter a valid email address", None)?;
    }
    if p.yes_no("Do you want to execute a command each time a threshold is reached?", Some(true))? {
        config.action = p.text(
            "Please introduce the absolute path to the command (it will be executed with the arguments\ncommand_name energy_T1 energy_T2 energy_limit T2 T1 units)",
            "Enter a valid command",
            None,
        )?;
    }
    Ok(config)
}

/// Whether the EARGM writes a log file
pub fn ask_eargm_log<R: BufRead, W: Write>(p: &mut Prompter<R, W>) -> Result<bool> {
    p.yes_no("Should the EARGM use a log file?", Some(true))
}
