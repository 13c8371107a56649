//! `rules.json` on disk
//!
//! The file is a JSON array of rules in evaluation order. Saves are staged in
//! a sibling `rules.json.tmp` and renamed into place, so an interrupted write
//! leaves the previous file intact.

use crate::error::RuleError;
use crate::model::Rule;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read the rules file. A file that does not exist yet is an empty rule set.
pub async fn load_rules(path: &Path) -> Result<Vec<Rule>, RuleError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Replace the rules file with `rules`
pub async fn save_rules(path: &Path, rules: &[Rule]) -> Result<(), RuleError> {
    let body = serde_json::to_vec_pretty(rules)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }

    let staged = staging_path(path);
    fs::write(&staged, body).await?;
    if let Err(e) = fs::rename(&staged, path).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }
    Ok(())
}

/// Move an unreadable rules file aside so the next save does not overwrite it
pub async fn quarantine(path: &Path) -> Result<PathBuf, RuleError> {
    let target = path.with_extension("json.corrupt");
    fs::rename(path, &target).await?;
    Ok(target)
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}
