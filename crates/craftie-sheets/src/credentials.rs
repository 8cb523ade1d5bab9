//! Service-account credential acquisition.
//!
//! Credentials come from a user-supplied helper executable when configured,
//! otherwise from the system keyring.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;

pub const KEYRING_SERVICE: &str = "craftie";
pub const KEYRING_USER: &str = "google-sheets";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials helper not found: {}", path.display())]
    HelperNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials helper is not executable: {} (run: chmod +x {})", path.display(), path.display())]
    HelperNotExecutable { path: PathBuf },

    #[error("failed to execute credentials helper {}: {source}", path.display())]
    HelperSpawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials helper failed ({status}): {stderr}")]
    HelperFailed { status: ExitStatus, stderr: String },

    #[error("credentials helper {} produced no output", path.display())]
    EmptyOutput { path: PathBuf },

    #[error("failed to get credentials from keyring: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Fetches the raw service-account JSON.
pub async fn fetch_credentials(helper: Option<&Path>) -> Result<Vec<u8>, CredentialsError> {
    match helper {
        Some(path) => run_helper(path).await,
        None => {
            tracing::debug!(
                service = KEYRING_SERVICE,
                user = KEYRING_USER,
                "reading credentials from keyring"
            );
            let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
            Ok(entry.get_password()?.into_bytes())
        }
    }
}

/// Runs the helper and returns its trimmed stdout.
pub async fn run_helper(path: &Path) -> Result<Vec<u8>, CredentialsError> {
    let metadata = std::fs::metadata(path).map_err(|source| CredentialsError::HelperNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    if !is_executable(&metadata) {
        return Err(CredentialsError::HelperNotExecutable {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(helper = ?path, "running credentials helper");
    let output = Command::new(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| CredentialsError::HelperSpawn {
            path: path.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(CredentialsError::HelperFailed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let payload = output.stdout.trim_ascii();
    if payload.is_empty() {
        return Err(CredentialsError::EmptyOutput {
            path: path.to_path_buf(),
        });
    }
    Ok(payload.to_vec())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}
