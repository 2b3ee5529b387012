//! Non-interactive vault setup.

use anyhow::Result;
use std::path::Path;

use crate::sync::init_vault;

/// Handle `ogresync init`
pub fn handle_init(vault: &Path, remote: Option<&str>, branch: &str) -> Result<()> {
    init_vault(vault, remote, branch)?;
    Ok(())
}
