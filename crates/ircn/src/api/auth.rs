//! 🔑 Bearer-token management. The token lives in `auth_token.txt` under
//! the config directory (64 hex chars from 32 random bytes, created once,
//! mode 0600) unless an explicit override is configured.
//!
//! 🧠 Knowledge graph: the token file is deliberately NOT a `.json` file,
//! so bundles never pick it up. Export your config, email it to a friend,
//! sleep soundly — the secret stayed home. 🔒

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::RngCore;
use tracing::info;

pub const TOKEN_FILE: &str = "auth_token.txt";

/// 🔑 The configured override wins; otherwise read the token file,
/// creating it on first startup. One token, minted once, guarded like the
/// last cookie in the jar.
pub fn load_or_create_token(config_dir: &Path, override_token: Option<&str>) -> Result<String> {
    if let Some(token) = override_token.filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }

    let path = config_dir.join(TOKEN_FILE);
    if path.is_file() {
        let token = fs::read_to_string(&path)
            .with_context(|| format!("failed to read '{}'", path.display()))?
            .trim()
            .to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    fs::write(&path, &token).with_context(|| format!("failed to write '{}'", path.display()))?;
    restrict_permissions(&path)?;
    info!(path = %path.display(), "generated control-plane auth token");
    Ok(token)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("failed to restrict '{}'", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_64_hex_char_token_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_token(dir.path(), None).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        let second = load_or_create_token(dir.path(), None).unwrap();
        assert_eq!(first, second, "token must be stable across startups");
    }

    #[test]
    fn override_wins_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let token = load_or_create_token(dir.path(), Some("override-token")).unwrap();
        assert_eq!(token, "override-token");
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_mode_is_restricted() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        load_or_create_token(dir.path(), None).unwrap();
        let mode = fs::metadata(dir.path().join(TOKEN_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
