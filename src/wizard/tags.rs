//! Authorized users and per-type tag questions

use super::model::{AuthorizedConfig, ClusterModel, TagConfig};
use super::prompt::Prompter;
use crate::error::Result;
use std::io::{BufRead, Write};
use tracing::warn;

/// Energy plugins shipped with EAR (`energy_<name>.so`)
pub const ENERGY_PLUGINS: [&str; 8] = [
    "nm",
    "dcmi",
    "inm_power",
    "inm_power_freeipmi",
    "rapl",
    "redfish",
    "sd650",
    "SD650N_V2",
];

/// Ask for authorized users, accounts and groups
pub fn ask_authorized<R: BufRead, W: Write>(p: &mut Prompter<R, W>) -> Result<AuthorizedConfig> {
    p.banner("Authorized Users")?;
    let mut field = |what: &str| -> Result<String> {
        let answer = p.optional_text(
            &format!("Enter the list of the authorized {} (use comma separated format)", what),
            "Enter a valid format (use comma separated format)",
        )?;
        Ok(answer.chars().filter(|c| !c.is_whitespace()).collect())
    };
    Ok(AuthorizedConfig {
        users: field("users")?,
        accounts: field("accounts")?,
        groups: field("groups")?,
    })
}

fn ask_frequency<R: BufRead, W: Write>(p: &mut Prompter<R, W>, question: &str) -> Result<u64> {
    if p.yes_no(question, Some(true))? {
        p.number("Enter the max frequency to use", "Enter a valid number", None)
    } else {
        Ok(0)
    }
}

/// Ask tag details for every node type.
///
/// Exactly one tag ends up as default: the first type the user picks, or the
/// first type when none is picked.
pub fn ask_tags<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    cluster: &ClusterModel,
) -> Result<Vec<TagConfig>> {
    p.banner("Tags")?;

    let plugins = ENERGY_PLUGINS.join(", ");
    let mut tags: Vec<TagConfig> = Vec::with_capacity(cluster.types.len());
    for node_type in &cluster.types {
        p.say(&format!("\nPartition type: {}", node_type.name))?;

        let max_avx512 = ask_frequency(p, "Does this type use avx512 instructions")?;
        let max_avx2 = ask_frequency(p, "Does this type use avx2 instructions")?;
        let min_power = p.number(
            "Enter the min_power amount to use when the node is idle",
            "Enter a valid number",
            None,
        )?;
        let gpu_def_freq = if p.yes_no("Do the nodes of this type use GPUs", Some(false))? {
            p.number("What is the default GPU frequency to use", "Enter a valid number", None)?
        } else {
            0
        };
        let plugin = p.choice(
            &format!("Which energy plugin do you want to use [{}] [nm]: ", plugins),
            &format!("Enter a valid name from the list [{}] [nm]: ", plugins),
            &ENERGY_PLUGINS,
            Some("nm"),
        )?;
        let energy_model = p.text(
            "Which interface do you want to use to read the energy",
            "Enter a valid model name",
            Some("default"),
        )?;
        let idle_governor = p.text(
            "Which governor do you want to use when the node is idle",
            "Enter a valid governor name",
            Some("default"),
        )?;
        let default = if tags.iter().any(|t| t.default) {
            false
        } else {
            p.yes_no("Do you want to use this type tag as default tag", None)?
        };

        tags.push(TagConfig {
            type_name: node_type.name.clone(),
            max_avx512,
            max_avx2,
            min_power,
            gpu_def_freq,
            energy_plugin: format!("energy_{}.so", plugin),
            energy_model,
            idle_governor,
            default,
        });
    }

    if !tags.iter().any(|t| t.default) {
        if let Some(first) = tags.first_mut() {
            warn!("No default tag selected, using {}", first.type_name);
            first.default = true;
        }
    }
    Ok(tags)
}
