//! Answers collected by the wizards

use serde::Serialize;

/// Default EARGM remote port
pub const DEFAULT_EARGM_PORT: u64 = 50100;
/// Default EARGM host placeholder
pub const DEFAULT_EARGM_HOST: &str = "nodename";
/// Placeholder for thresholds without a command
pub const NO_ACTION: &str = "no_action";
/// Placeholder for energy warnings without mail
pub const NO_MAIL: &str = "nomail";

/// One node type (partition) of the cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeType {
    pub name: String,
    pub nodes: u64,
    /// Watts
    pub max_power: u64,
    /// Watts
    pub avg_power: u64,
}

impl NodeType {
    /// Power drawn when every node runs at max power
    pub fn max_budget(&self) -> u64 {
        self.nodes.saturating_mul(self.max_power)
    }

    /// Power drawn when every node runs at average power
    pub fn average_draw(&self) -> u64 {
        self.nodes.saturating_mul(self.avg_power)
    }

    /// Power level reported as an error, 10% above max power
    pub fn error_power(&self) -> u64 {
        (self.max_power as u128 * 11 / 10).min(u64::MAX as u128) as u64
    }
}

/// Cluster structure
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterModel {
    pub types: Vec<NodeType>,
}

impl ClusterModel {
    /// Sum of nodes over all types
    pub fn total_nodes(&self) -> u64 {
        self.types.iter().fold(0u64, |acc, t| acc.saturating_add(t.nodes))
    }

    /// Sum of `nodes x max_power`
    pub fn max_budget(&self) -> u64 {
        self.types
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.max_budget()))
    }

    /// Sum of `nodes x avg_power`
    pub fn average_draw(&self) -> u64 {
        self.types
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.average_draw()))
    }

    /// One EARGM per type plus one per thousand nodes of each type,
    /// bounded to `1..=types`
    pub fn recommended_eargms(&self) -> u64 {
        let extra: u64 = self
            .types
            .iter()
            .map(|t| if t.nodes > 1000 { (t.nodes as f64 / 1000.0).round() as u64 } else { 0 })
            .sum();
        let types = self.types.len().max(1) as u64;
        types.saturating_add(extra).clamp(1, types)
    }

    /// Index of the type called `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }
}

/// EARGM powercap mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowercapMode {
    Monitor,
    Hard,
    Soft,
}

impl PowercapMode {
    /// Numeric value used in the configuration file
    pub fn as_number(self) -> u8 {
        match self {
            Self::Monitor => 0,
            Self::Hard => 1,
            Self::Soft => 2,
        }
    }

    /// Parse `0`, `1` or `2`
    pub fn from_number(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Monitor),
            1 => Some(Self::Hard),
            2 => Some(Self::Soft),
            _ => None,
        }
    }
}

/// One global manager instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eargm {
    pub id: u64,
    /// Controlled node type; `None` means the whole cluster
    pub controls: Option<usize>,
    /// Watts
    pub budget: u64,
    pub host: String,
    pub port: u64,
}

/// An EARGM redistributing budget among others
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEargm {
    pub manager: u64,
    pub controlled: Vec<u64>,
}

/// Percentage trigger with its command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerThreshold {
    pub percentage: u64,
    pub action: String,
}

impl PowerThreshold {
    /// Threshold that never fires
    pub fn disabled() -> Self {
        Self {
            percentage: 0,
            action: NO_ACTION.to_string(),
        }
    }
}

/// Powercap section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowercapConfig {
    pub mode: PowercapMode,
    /// Seconds
    pub period: u64,
    pub per_partition: bool,
    pub eargms: Vec<Eargm>,
    pub suspend: PowerThreshold,
    pub resume: PowerThreshold,
    pub metas: Vec<MetaEargm>,
}

impl PowercapConfig {
    /// EARGM controlling node type `index`; unclaimed types fall to EARGM 1
    pub fn controller_of(&self, index: usize) -> u64 {
        self.eargms
            .iter()
            .find(|e| e.controls == Some(index))
            .map(|e| e.id)
            .unwrap_or(1)
    }

    /// Meta-EARGM record managed by `id`
    pub fn meta_of(&self, id: u64) -> Option<&MetaEargm> {
        self.metas.iter().find(|m| m.manager == id)
    }

    /// Per-node power cap for node type `index`.
    ///
    /// The controlling EARGM budget is split over its nodes proportionally
    /// to their max power.
    pub fn node_cap(&self, cluster: &ClusterModel, index: usize) -> u64 {
        let controller = self.controller_of(index);
        let Some(eargm) = self.eargms.iter().find(|e| e.id == controller) else {
            return 0;
        };
        let controlled: u64 = cluster
            .types
            .iter()
            .enumerate()
            .filter(|(i, _)| self.controller_of(*i) == controller)
            .map(|(_, t)| t.max_budget())
            .sum();
        if controlled == 0 {
            return 0;
        }
        let max_power = cluster.types[index].max_power;
        ((eargm.budget as u128 * max_power as u128) / controlled as u128) as u64
    }
}

/// Energy unit of the energy cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnergyUnit {
    #[serde(rename = "J")]
    Joules,
    #[serde(rename = "K")]
    KiloJoules,
    #[serde(rename = "M")]
    MegaJoules,
}

impl EnergyUnit {
    /// Letter used in the configuration file
    pub fn letter(self) -> &'static str {
        match self {
            Self::Joules => "J",
            Self::KiloJoules => "K",
            Self::MegaJoules => "M",
        }
    }

    /// Joules per unit
    pub fn divisor(self) -> u64 {
        match self {
            Self::Joules => 1,
            Self::KiloJoules => 1_000,
            Self::MegaJoules => 1_000_000,
        }
    }

    /// Parse `J`, `K` or `M` in either case
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim() {
            "j" | "J" => Some(Self::Joules),
            "k" | "K" => Some(Self::KiloJoules),
            "m" | "M" => Some(Self::MegaJoules),
            _ => None,
        }
    }
}

/// Energy capping section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyCapConfig {
    pub enabled: bool,
    /// Monitoring period, seconds
    pub t1: u64,
    /// Accounting window, seconds
    pub t2: u64,
    pub unit: EnergyUnit,
    pub limit: u64,
    pub use_aggregated: bool,
    pub warnings: [u64; 3],
    pub mail: String,
    pub action: String,
}

impl EnergyCapConfig {
    /// Values written when energy capping is declined
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            t1: 0,
            t2: 0,
            unit: EnergyUnit::Joules,
            limit: 0,
            use_aggregated: true,
            warnings: [0, 0, 0],
            mail: NO_MAIL.to_string(),
            action: NO_ACTION.to_string(),
        }
    }

    /// `t2 x average draw / unit`
    pub fn suggested_limit(cluster: &ClusterModel, t2: u64, unit: EnergyUnit) -> u64 {
        let joules = t2 as u128 * cluster.average_draw() as u128;
        (joules / unit.divisor() as u128).min(u64::MAX as u128) as u64
    }
}

/// Users allowed to change policies
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorizedConfig {
    pub users: String,
    pub accounts: String,
    pub groups: String,
}

/// Architectural description of one node type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagConfig {
    pub type_name: String,
    pub max_avx512: u64,
    pub max_avx2: u64,
    pub min_power: u64,
    /// Zero when the type has no GPUs
    pub gpu_def_freq: u64,
    pub energy_plugin: String,
    pub energy_model: String,
    pub idle_governor: String,
    pub default: bool,
}

/// Relational database connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseConfig {
    pub ip: String,
    pub port: u64,
    pub max_connections: u64,
    pub database: String,
    pub user: String,
    pub password: String,
    pub commands_user: String,
    pub commands_password: String,
    pub report_node_detail: bool,
    pub report_sig_detail: bool,
    pub report_loops: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 3306,
            max_connections: 20,
            database: "EAR".to_string(),
            user: "ear_daemon".to_string(),
            password: "password".to_string(),
            commands_user: "ear_commands".to_string(),
            commands_password: "password".to_string(),
            report_node_detail: true,
            report_sig_detail: true,
            report_loops: true,
        }
    }
}

/// Node daemon settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDaemonConfig {
    pub port: u64,
    pub powermon_freq: u64,
    pub use_db: bool,
    pub use_log: bool,
    pub report_plugins: Vec<String>,
}

/// Where the database managers run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DbManagerPlacement {
    Global { host: String },
    PerType { hosts: Vec<(String, String)> },
}

/// Database manager settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbManagerConfig {
    pub placement: DbManagerPlacement,
    pub mirror: Option<String>,
    pub tcp_port: u64,
    pub sec_tcp_port: u64,
    pub sync_port: u64,
    pub aggregation_time: u64,
    pub insertion_time: u64,
    pub use_log: bool,
    pub report_plugins: Vec<String>,
}

/// Daemon sections of the full configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonsConfig {
    pub database: DatabaseConfig,
    pub node: NodeDaemonConfig,
    pub db_manager: DbManagerConfig,
}

/// Everything a wizard session collected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardModel {
    pub daemons: Option<DaemonsConfig>,
    pub cluster: ClusterModel,
    pub powercap: Option<PowercapConfig>,
    pub energy: EnergyCapConfig,
    pub eargm_use_log: bool,
    pub authorized: Option<AuthorizedConfig>,
    pub tags: Vec<TagConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterModel {
        ClusterModel {
            types: vec![
                NodeType { name: "cpu".into(), nodes: 2500, max_power: 400, avg_power: 300 },
                NodeType { name: "gpu".into(), nodes: 100, max_power: 1000, avg_power: 600 },
            ],
        }
    }

    #[test]
    fn test_cluster_totals() {
        let c = cluster();
        assert_eq!(c.total_nodes(), 2600);
        assert_eq!(c.max_budget(), 2500 * 400 + 100 * 1000);
        assert_eq!(c.average_draw(), 2500 * 300 + 100 * 600);
    }

    #[test]
    fn test_huge_answers_saturate() {
        let c = ClusterModel {
            types: vec![
                NodeType { name: "a".into(), nodes: 2, max_power: u64::MAX, avg_power: u64::MAX },
                NodeType { name: "b".into(), nodes: u64::MAX, max_power: 1, avg_power: 1 },
            ],
        };
        assert_eq!(c.total_nodes(), u64::MAX);
        assert_eq!(c.max_budget(), u64::MAX);
        assert_eq!(c.average_draw(), u64::MAX);
        assert_eq!(c.types[0].error_power(), u64::MAX);
        assert_eq!(c.types[1].error_power(), 1);
        assert_eq!(EnergyCapConfig::suggested_limit(&c, u64::MAX, EnergyUnit::Joules), u64::MAX);
    }

    #[test]
    fn test_recommended_eargms_bounded_by_types() {
        // 2 types + round(2.5) extra, bounded to the number of types
        assert_eq!(cluster().recommended_eargms(), 2);
        let single = ClusterModel { types: vec![cluster().types[1].clone()] };
        assert_eq!(single.recommended_eargms(), 1);
    }

    #[test]
    fn test_node_cap_split() {
        let c = cluster();
        let powercap = PowercapConfig {
            mode: PowercapMode::Monitor,
            period: 120,
            per_partition: false,
            eargms: vec![Eargm {
                id: 1,
                controls: None,
                budget: 550_000,
                host: DEFAULT_EARGM_HOST.into(),
                port: DEFAULT_EARGM_PORT,
            }],
            suspend: PowerThreshold::disabled(),
            resume: PowerThreshold::disabled(),
            metas: Vec::new(),
        };
        // half of the max budget of 1_100_000 W
        assert_eq!(powercap.node_cap(&c, 0), 200);
        assert_eq!(powercap.node_cap(&c, 1), 500);
    }

    #[test]
    fn test_suggested_energy_limit() {
        let c = cluster();
        let joules = EnergyCapConfig::suggested_limit(&c, 10, EnergyUnit::Joules);
        assert_eq!(joules, 8_100_000);
        let kilo = EnergyCapConfig::suggested_limit(&c, 10, EnergyUnit::KiloJoules);
        assert_eq!(kilo, 8_100);
    }

    #[test]
    fn test_energy_unit_parse() {
        assert_eq!(EnergyUnit::parse("k"), Some(EnergyUnit::KiloJoules));
        assert_eq!(EnergyUnit::parse("M"), Some(EnergyUnit::MegaJoules));
        assert_eq!(EnergyUnit::parse("G"), None);
    }
}
