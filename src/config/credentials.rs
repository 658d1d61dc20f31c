//! Credential file loading

use std::fs;
use std::path::Path;
use tracing::error;

use crate::common::errors::{ClientError, Result};
use crate::probit::auth::Credentials;

/// Read the client id and secret from two plain-text files
pub fn load_credentials(id_path: impl AsRef<Path>, secret_path: impl AsRef<Path>) -> Result<Credentials> {
    let client_id = read_trimmed(id_path.as_ref())?;
    let client_secret = read_trimmed(secret_path.as_ref())?;
    Ok(Credentials::new(client_id, client_secret))
}

fn read_trimmed(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Cannot read credential file {}: {}", path.display(), e);
        ClientError::Credentials(format!("{}: {}", path.display(), e))
    })?;
    let value = content.trim();
    if value.is_empty() {
        return Err(ClientError::Credentials(format!("{} is empty", path.display())));
    }
    Ok(value.to_string())
}
