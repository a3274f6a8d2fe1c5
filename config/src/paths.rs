//! Platform data-directory resolution for Monad.
//!
//! The embedded database lives under `~/Library/Application Support/Monad/`
//! on macOS and `$XDG_DATA_HOME/monad/` (falling back to
//! `~/.local/share/monad/`) elsewhere. Per-session working directories live
//! under `<data_dir>/sessions/`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("no home directory")]
    NoHome,
}

/// Resolves the Monad data directory for the current platform.
///
/// `MONAD_DATA_DIR` overrides everything (used by tests and containers).
pub fn data_dir() -> Result<PathBuf, PathError> {
    if let Ok(dir) = std::env::var("MONAD_DATA_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    if cfg!(target_os = "macos") {
        let home = dirs::home_dir().ok_or(PathError::NoHome)?;
        return Ok(home.join("Library/Application Support/Monad"));
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("monad"));
        }
    }
    let home = dirs::home_dir().ok_or(PathError::NoHome)?;
    Ok(home.join(".local/share/monad"))
}

/// Path of the embedded database file.
pub fn db_path() -> Result<PathBuf, PathError> {
    Ok(data_dir()?.join("monad.sqlite"))
}

/// Root directory holding per-session working directories.
pub fn sessions_root() -> Result<PathBuf, PathError> {
    Ok(data_dir()?.join("sessions"))
}
