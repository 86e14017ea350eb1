use anyhow::{bail, Context, Result};
use slotwatch::config::AccountConfig;
use std::path::Path;

pub fn init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    std::fs::write(output, AccountConfig::template())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Account template written to {}", output.display());
    println!("Fill in email, password and country, then run:");
    println!("  slotwatch run {}", output.display());
    Ok(())
}
