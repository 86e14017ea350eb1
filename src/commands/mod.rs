mod check;
mod init;
mod prompt;
mod run;

pub use check::check;
pub use init::init;
pub use run::run;

use anyhow::{Context, Result};
use slotwatch::config::Settings;
use slotwatch::resolver::Resolver;
use std::path::Path;
use std::sync::Arc;

/// Settings from a file when given, from the environment otherwise
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::from_env()?,
    };
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn resolver(interactive: bool) -> Resolver {
    if interactive {
        Resolver::with_chooser(Arc::new(prompt::StdinChooser::default()))
    } else {
        Resolver::new()
    }
}
