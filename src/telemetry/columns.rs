//! Column classification for loop and application telemetry files

use regex::Regex;
use std::sync::OnceLock;

/// Columns identifying one application run on one node
pub const KEY_COLUMNS: [&str; 4] = ["JOBID", "STEPID", "APPID", "NODENAME"];

/// Loop sample time (seconds since the epoch)
pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";

/// Seconds elapsed since the application started, per loop sample
pub const ELAPSED_COLUMN: &str = "ELAPSED";

/// Columns computed per group and appended to the output
pub const DERIVED_COLUMNS: [&str; 4] = ["START_TIME", "START_DATE", "END_TIME", "END_DATE"];

/// Counter columns that accumulate across loops instead of averaging
pub const SUMMED_COLUMNS: [&str; 11] = [
    "L1_MISSES",
    "L2_MISSES",
    "L3_MISSES",
    "SPOPS_SINGLE",
    "SPOPS_128",
    "SPOPS_256",
    "SPOPS_512",
    "DPOPS_SINGLE",
    "DPOPS_128",
    "DPOPS_256",
    "DPOPS_512",
];

/// Every column expected in an application CSV header.
///
/// Matched with search semantics: a column is kept when its name contains
/// a match anywhere.
const APP_COLUMN_PATTERN: &str = concat!(
    r"DCGMI_EVENTS_COUNT|GPU\d_gr_engine_active|GPU\d_sm_active",
    r"|GPU\d_sm_occupancy|GPU\d_tensor_active|GPU\d_dram_active",
    r"|GPU\d_fp64_active|GPU\d_fp32_active|GPU\d_fp16_active",
    r"|GPU\d_pcie_tx_bytes|GPU\d_pcie_rx_bytes|GPU\d_nvlink_tx_bytes",
    r"|GPU\d_nvlink_rx_bytes|COMP_BOUND|MPI_BOUND|IO_BOUND",
    r"|CPU_BUSY_WAITING|CPU_GPU_COMP|CPU_BOUND|MEM_BOUND|MIX_COMP",
    r"|NODENAME|JOBID|STEPID|APPID|USERID|GROUPID|JOBNAME|USER_ACC",
    r"|ENERGY_TAG|POLICY|POLICY_TH|START_TIME|END_TIME|START_DATE",
    r"|END_DATE|AVG_CPUFREQ_KHZ|AVG_IMCFREQ_KHZ|DEF_FREQ_KHZ|TIME_SEC",
    r"|CPI|TPI|MEM_GBS|IO_MBS|PERC_MPI|DC_NODE_POWER_W|DRAM_POWER_W",
    r"|PCK_POWER_W|CYCLES|INSTRUCTIONS|CPU-GFLOPS|L1_MISSES|L2_MISSES",
    r"|L3_MISSES|SPOPS_SINGLE|SPOPS_128|SPOPS_256|SPOPS_512|DPOPS_SINGLE",
    r"|DPOPS_128|DPOPS_256|DPOPS_512|TEMP\d|GPU\d_POWER_W|GPU\d_FREQ_KHZ",
    r"|GPU\d_MEM_FREQ_KHZ|GPU\d_UTIL_PERC",
    r"|GPU\d_MEM_UTIL_PERC|GPU\d_GFLOPS|GPU\d_TEMP|GPU\d_MEMTEMP",
);

fn app_column_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(APP_COLUMN_PATTERN).expect("Invalid app column pattern"))
}

/// How a metric column is reduced over the loops of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Total over all loops
    Sum,
    /// Arithmetic mean over all loops
    Mean,
}

/// Whether `name` belongs in an application CSV at all
pub fn is_app_column(name: &str) -> bool {
    app_column_regex().is_match(name)
}

/// Whether `name` is one of the grouping keys
pub fn is_key_column(name: &str) -> bool {
    KEY_COLUMNS.contains(&name)
}

/// Whether `name` is aggregated per group.
///
/// Keys and the derived start/end columns are excluded; the latter are
/// recomputed from the loop timestamps.
pub fn is_metric_column(name: &str) -> bool {
    is_app_column(name) && !is_key_column(name) && !DERIVED_COLUMNS.contains(&name)
}

/// Reduction used for a metric column
pub fn aggregation_for(name: &str) -> Aggregation {
    if SUMMED_COLUMNS.contains(&name) {
        Aggregation::Sum
    } else {
        Aggregation::Mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_columns() {
        assert!(is_app_column("CPI"));
        assert!(is_app_column("GPU0_POWER_W"));
        assert!(is_app_column("GPU3_sm_active"));
        assert!(is_app_column("TEMP1"));
        assert!(is_app_column("DPOPS_256"));
        assert!(!is_app_column("TIMESTAMP"));
        assert!(!is_app_column("ELAPSED"));
        assert!(!is_app_column("LOOPID"));
    }

    #[test]
    fn test_search_semantics() {
        // Any column containing a known name is kept
        assert!(is_app_column("AVG_CPI_X"));
        assert!(is_app_column("GPU1_TEMP"));
    }

    #[test]
    fn test_metric_columns() {
        assert!(is_metric_column("DC_NODE_POWER_W"));
        assert!(is_metric_column("POLICY"));
        assert!(!is_metric_column("JOBID"));
        assert!(!is_metric_column("NODENAME"));
        assert!(!is_metric_column("START_TIME"));
        assert!(!is_metric_column("END_DATE"));
    }

    #[test]
    fn test_aggregation_kind() {
        assert_eq!(aggregation_for("L3_MISSES"), Aggregation::Sum);
        assert_eq!(aggregation_for("DPOPS_512"), Aggregation::Sum);
        assert_eq!(aggregation_for("CPI"), Aggregation::Mean);
        assert_eq!(aggregation_for("GPU0_POWER_W"), Aggregation::Mean);
    }
}
