mod config;
pub mod database;

pub use config::Config;
pub use database::{Database, RunRecordRow, Stats};

use std::path::PathBuf;

/// Returns the calmkit data directory, creating it if needed.
///
/// `CALMKIT_DATA_DIR` overrides the location outright. Otherwise the
/// directory is `~/.config/calmkit/`, or `~/.config/calmkit-dev/` when
/// `CALMKIT_ENV=dev`.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("CALMKIT_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("CALMKIT_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("calmkit-dev")
            } else {
                base_dir.join("calmkit")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
