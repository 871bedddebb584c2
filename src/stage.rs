//! Version-control staging of written files.
//!
//! Staging is best-effort: callers log a failure and move on.

use std::path::Path;
use std::process::Command;

/// Stages a written path.
pub trait Stager: Send + Sync {
    fn stage(&self, path: &Path) -> Result<(), String>;
}

/// Runs `git add <path>` from the file's own directory, so the repository
/// that owns the file is used regardless of the process working directory.
#[derive(Debug, Clone, Default)]
pub struct GitStager;

impl Stager for GitStager {
    fn stage(&self, path: &Path) -> Result<(), String> {
        let mut cmd = Command::new("git");
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                cmd.current_dir(parent).arg("add").arg("--").arg(name);
            }
            _ => {
                cmd.arg("add").arg("--").arg(path);
            }
        }

        let output = cmd
            .output()
            .map_err(|e| format!("failed to run git: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("q.sql");
        std::fs::write(&file, "SELECT 1;").unwrap();
        // Temp dirs are not git repositories, so either git is missing or it
        // refuses; both must come back as an error rather than a panic.
        assert!(GitStager.stage(&file).is_err());
    }
}
