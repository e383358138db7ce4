use crate::infrastructure::config::{ensure_default_configs, load_planner_config, PlannerConfig};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config: PlannerConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_planner_config(&config_dir)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout_and_default_config() {
        let dir = tempfile::tempdir().expect("temp dir");

        let result = bootstrap_workspace(dir.path()).expect("bootstrap");

        assert!(result.config_dir.join("planner.json").is_file());
        assert!(result.logs_dir.is_dir());
        assert_eq!(result.config, PlannerConfig::default());
    }

    #[test]
    fn keeps_existing_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("config")).expect("config dir");
        fs::write(
            dir.path().join("config").join("planner.json"),
            r#"{"schema": 1, "timezone": "Europe/Berlin"}"#,
        )
        .expect("write config");

        let result = bootstrap_workspace(dir.path()).expect("bootstrap");

        assert_eq!(result.config.timezone, "Europe/Berlin");
    }
}
