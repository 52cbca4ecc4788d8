//! Cross-platform path utilities for camrelay.
//!
//! Single source of truth for where the relay daemon keeps its config,
//! run reports and Unix sockets.
//!
//! # Platform Behavior
//!
//! | Platform | Config Directory | Data Directory | Socket Directory |
//! |----------|------------------|----------------|------------------|
//! | Linux    | `~/.config/camrelay` | `~/.local/share/camrelay` | `$XDG_RUNTIME_DIR` or data dir |
//! | macOS    | data dir | `~/Library/Application Support/camrelay` | data dir |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "camrelay";

/// Socket file name for the control socket (ingest events, health pulls).
const IPC_SOCKET_NAME: &str = "camrelay.sock";

/// Socket file name for the telemetry push socket.
const TELEMETRY_SOCKET_NAME: &str = "camrelay_telemetry.sock";

const CONFIG_FILE_NAME: &str = "config.toml";

const REPORT_FILE_NAME: &str = "run-report.json";

/// Create `dir` if missing, owner-only on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application data directory (run reports live here).
///
/// Creates the directory if it doesn't exist with secure permissions (0o700).
pub fn get_data_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
    let data_dir = base_dir.join(APP_NAME);
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/camrelay`
/// - **Other**: same as the data directory
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_private_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the socket directory for both Unix sockets.
///
/// On Linux `$XDG_RUNTIME_DIR` is preferred (per-user, auto-cleaned),
/// falling back to the data directory.
pub fn get_socket_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            if runtime_dir.exists() {
                return Ok(runtime_dir);
            }
        }
    }

    get_data_dir()
}

/// Path of the control socket used by ingest hooks and `health`/`status` pulls.
pub fn get_ipc_socket_path() -> Result<PathBuf> {
    Ok(get_socket_dir()?.join(IPC_SOCKET_NAME))
}

/// Path of the telemetry socket observers subscribe to.
pub fn get_telemetry_socket_path() -> Result<PathBuf> {
    Ok(get_socket_dir()?.join(TELEMETRY_SOCKET_NAME))
}

/// Default location of `config.toml`.
pub fn get_config_file_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Default location of the post-run report.
pub fn get_report_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(REPORT_FILE_NAME))
}

/// Set secure Unix socket permissions (0o600, owner read/write only).
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(socket_path, perms).with_context(|| {
            format!(
                "Failed to set socket permissions: {}",
                socket_path.display()
            )
        })?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}
