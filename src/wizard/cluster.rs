//! Cluster structure questions

use super::model::{ClusterModel, NodeType};
use super::prompt::{is_numeric, Prompter};
use crate::error::Result;
use std::collections::HashSet;
use std::io::{BufRead, Write};

/// Upper bound on node types accepted by the wizard
pub const MAX_NODE_TYPES: u64 = 256;

/// Names must be as many as types, unique, and not purely numeric
pub fn valid_type_names(names: &[String], count: usize) -> bool {
    let unique: HashSet<&String> = names.iter().collect();
    names.len() == count
        && unique.len() == count
        && names.iter().all(|n| !n.is_empty() && !is_numeric(n))
}

/// Ask for node types and their sizes
pub fn ask_cluster<R: BufRead, W: Write>(p: &mut Prompter<R, W>) -> Result<ClusterModel> {
    p.banner("Cluster Structure Data")?;
    p.say("To configure energy or power capping we need information about the cluster structure.")?;

    let count = p.number_in(
        "How many types of nodes/partitions does the cluster contain (for example, CPU-only and CPU+2GPUs)",
        "How many types of nodes/partitions does the cluster contain",
        None,
        1..=MAX_NODE_TYPES,
    )? as usize;

    let names = if p.yes_no("Would you like to name the cluster type of nodes/partitions", Some(true))? {
        p.list(
            "Enter the names (use comma separated format)(i.e. type1,type2 or CPU-only,CPU-GPU): ",
            &format!("Enter {} unique names in comma separated format: ", count),
            None,
            |names| valid_type_names(names, count),
        )?
    } else {
        p.say("The default naming format will be used, like: type1, type2,....,typeN")?;
        (1..=count).map(|i| format!("type{}", i)).collect()
    };

    let mut types = Vec::with_capacity(count);
    for name in names {
        p.say(&format!("\nConfiguring type {}", name))?;
        let nodes = p.number_in(
            "How many nodes of this type are there",
            "Enter a valid number of nodes",
            None,
            1..=u32::MAX as u64,
        )?;
        let max_power = p.number_in(
            "What is the max power consumption (in Watts)",
            "Enter a valid max power consumption (in Watts)",
            None,
            1..=u32::MAX as u64,
        )?;
        let avg_power = p.number_in(
            "What is the average power consumption (in Watts)",
            "Enter a valid average power consumption (in Watts)",
            None,
            1..=u32::MAX as u64,
        )?;
        types.push(NodeType {
            name,
            nodes,
            max_power,
            avg_power,
        });
    }

    let cluster = ClusterModel { types };
    tracing::debug!(
        "Cluster: {} types, {} nodes, {} W at max power",
        cluster.types.len(),
        cluster.total_nodes(),
        cluster.max_budget()
    );
    Ok(cluster)
}
