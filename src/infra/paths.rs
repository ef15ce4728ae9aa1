// src/infra/paths.rs - XDG-compliant path management
//
// All paths respect the NOVELER_HOME environment variable for isolation.
// When NOVELER_HOME is set, config and data both live under that directory.
// When unset, config uses ~/.noveler/ and data uses XDG_DATA_HOME/noveler.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "noveler"))
        .as_ref()
}

/// Returns the NOVELER_HOME override, if set.
fn noveler_home() -> Option<PathBuf> {
    std::env::var_os("NOVELER_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when no home can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $NOVELER_HOME/ or ~/.noveler/
pub fn config_dir() -> PathBuf {
    if let Some(home) = noveler_home() {
        return home;
    }
    dirs_home().join(".noveler")
}

/// Data directory: $NOVELER_HOME/data/ or ~/.local/share/noveler/
pub fn data_dir() -> PathBuf {
    if let Some(home) = noveler_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted chat sessions
pub fn sessions_file_path() -> PathBuf {
    data_dir().join("sessions.json")
}

/// Ensure config and data directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
