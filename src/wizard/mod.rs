//! Interactive configuration wizards
//!
//! Two flavours share the same questions:
//! - `eargm`: cluster structure, power and energy capping, printed as the
//!   EARGM section only
//! - `conf`: the above plus authorized users and tags (and optionally the
//!   database and daemon sections), written as a complete configuration file
//!
//! Answers come from stdin or from an answers file with one answer per line.

pub mod capping;
pub mod cluster;
pub mod daemons;
pub mod model;
pub mod prompt;
pub mod render;
pub mod tags;

pub use model::WizardModel;
pub use prompt::Prompter;
pub use render::{render_configuration, render_eargm_section};

use crate::config::{WizardScope, WizardSettings};
use crate::error::{EarToolsError, IoResultExt, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::info;

/// Result of a wizard run
#[derive(Debug, Clone)]
pub struct WizardOutcome {
    /// Collected answers
    pub model: WizardModel,
    /// Rendered configuration text
    pub text: String,
    /// File written, `None` when printed to stdout
    pub output: Option<PathBuf>,
}

/// Ask every question for `scope`, in file order
pub fn collect<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    scope: WizardScope,
    with_daemons: bool,
) -> Result<WizardModel> {
    p.say("This tool builds the EAR configuration from a few questions about the cluster.")?;

    let cluster = cluster::ask_cluster(p)?;
    let daemons = if scope == WizardScope::Cluster && with_daemons {
        Some(daemons::ask_daemons(p, &cluster)?)
    } else {
        None
    };
    let powercap = capping::ask_powercap(p, &cluster)?;
    let energy = capping::ask_energy_cap(p, &cluster)?;
    let eargm_use_log = capping::ask_eargm_log(p)?;

    let (authorized, tags) = match scope {
        WizardScope::Cluster => (
            Some(tags::ask_authorized(p)?),
            tags::ask_tags(p, &cluster)?,
        ),
        WizardScope::Eargm => (None, Vec::new()),
    };

    Ok(WizardModel {
        daemons,
        cluster,
        powercap,
        energy,
        eargm_use_log,
        authorized,
        tags,
    })
}

/// Render the text `scope` produces
pub fn render(model: &WizardModel, scope: WizardScope) -> String {
    match scope {
        WizardScope::Eargm => render_eargm_section(model),
        WizardScope::Cluster => render_configuration(model),
    }
}

/// Run a wizard end to end: ask, render, write
pub fn run_wizard(settings: &WizardSettings) -> Result<WizardOutcome> {
    let (input, echo): (Box<dyn BufRead>, bool) = match &settings.answers {
        Some(path) => {
            info!("Reading answers from {:?}", path);
            let file = File::open(path).with_path(path)?;
            (Box::new(BufReader::new(file)), true)
        }
        None => (Box::new(std::io::stdin().lock()), false),
    };

    // Prompts go to stderr so stdout carries only the configuration
    let mut prompter = Prompter::new(input, std::io::stderr()).with_echo(echo);
    let model = collect(&mut prompter, settings.scope, settings.with_daemons).map_err(|e| {
        if e.is_aborted() {
            e.with_context(format!("after {} answers", prompter.answered()))
        } else {
            e
        }
    })?;

    let text = render(&model, settings.scope);
    match &settings.output {
        Some(path) => {
            std::fs::write(path, &text).with_path(path)?;
            info!("Configuration written to {:?}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }

    if let Some(path) = &settings.dump_json {
        let json = serde_json::to_string_pretty(&model)?;
        std::fs::write(path, json).with_path(path)?;
        info!("Answers dumped to {:?}", path);
    }

    Ok(WizardOutcome {
        model,
        text,
        output: settings.output.clone(),
    })
}

/// Make sure a wizard can write where it was asked to
pub fn check_output(settings: &WizardSettings) -> Result<()> {
    if let Some(path) = &settings.output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(EarToolsError::NotFound(parent.to_path_buf()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_eargm_scope_skips_tags() {
        // one unnamed type, no powercap, no energy cap, log
        let mut p = prompter("1\nn\n4\n500\n300\nn\nn\n\n");
        let model = collect(&mut p, WizardScope::Eargm, false).unwrap();
        assert!(model.tags.is_empty());
        assert!(model.authorized.is_none());
        assert!(model.eargm_use_log);
        let text = render(&model, WizardScope::Eargm);
        assert!(text.contains("#EARGMId=0 energy=0 power=0"));
        assert!(!text.contains("Island="));
    }

    #[test]
    fn test_truncated_answers_abort() {
        let mut p = prompter("1\nn\n4\n");
        let err = collect(&mut p, WizardScope::Cluster, false).unwrap_err();
        assert!(err.is_aborted());
    }

    #[test]
    fn test_check_output_missing_dir() {
        let settings = WizardSettings {
            output: Some(PathBuf::from("/nonexistent/dir/earConf.txt")),
            ..WizardSettings::default()
        };
        assert!(check_output(&settings).is_err());
        assert!(check_output(&WizardSettings::default()).is_ok());
    }
}
