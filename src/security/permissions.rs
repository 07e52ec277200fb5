//! Key file presence and permission checks
//!
//! Certificates and keys handed to the daemon must exist and be readable by
//! their owner only. A file with group or other bits set gets one repair
//! attempt (`chmod 0600`) before it is rejected.

use crate::error::{EipAgentError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Mode required for key files
#[cfg(unix)]
pub const KEY_FILE_MODE: u32 = 0o600;

/// Check the CA certificate, client certificate and client key
pub fn check_vpn_keys(ca_cert: &Path, client_cert: &Path, client_key: &Path) -> Result<()> {
    for path in [ca_cert, client_cert, client_key] {
        check_key_file(path)?;
    }
    Ok(())
}

/// Check one key file, repairing its mode once if needed
pub fn check_key_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        check_key_file_with(path, restrict_mode)
    }

    #[cfg(not(unix))]
    {
        check_key_file_with(path, |_| Ok(()))
    }
}

/// Check one key file, using `repair` for the single mode fix
fn check_key_file_with<F>(path: &Path, repair: F) -> Result<()>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    if !path.is_file() {
        return Err(EipAgentError::MissingKeyFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        if !is_owner_only(path)? {
            warn!(
                "Key file {} is accessible by other users, restricting to {:o}",
                path.display(),
                KEY_FILE_MODE
            );
            repair(path).map_err(|e| {
                warn!("Failed to restrict permissions on {}: {}", path.display(), e);
                EipAgentError::BadKeyFilePermissions(path.to_path_buf())
            })?;
            if !is_owner_only(path)? {
                return Err(EipAgentError::BadKeyFilePermissions(path.to_path_buf()));
            }
        }
    }

    #[cfg(not(unix))]
    let _ = repair;

    debug!("Key file {} ok", path.display());
    Ok(())
}

#[cfg(unix)]
fn is_owner_only(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|_| EipAgentError::MissingKeyFile(path.to_path_buf()))?;
    Ok(metadata.permissions().mode() & 0o077 == 0)
}

#[cfg(unix)]
fn restrict_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(KEY_FILE_MODE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_key(dir: &TempDir, name: &str, mode: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "-----BEGIN CERTIFICATE-----\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = mode;
        path
    }

    #[test]
    fn test_missing_key_file() {
        let dir = TempDir::new().unwrap();
        let ca = write_key(&dir, "ca.crt", 0o600);
        let missing = dir.path().join("client.pem");

        let result = check_vpn_keys(&ca, &missing, &missing);
        assert!(matches!(result, Err(EipAgentError::MissingKeyFile(ref p)) if *p == missing));
    }

    #[test]
    fn test_directory_is_not_a_key_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            check_key_file(dir.path()),
            Err(EipAgentError::MissingKeyFile(_))
        ));
    }

    #[test]
    fn test_owner_only_keys_pass() {
        let dir = TempDir::new().unwrap();
        let ca = write_key(&dir, "ca.crt", 0o600);
        let cert = write_key(&dir, "client.pem", 0o400);

        check_vpn_keys(&ca, &cert, &cert).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_loose_permissions_are_repaired_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let ca = write_key(&dir, "ca.crt", 0o644);
        let cert = write_key(&dir, "client.pem", 0o666);

        check_vpn_keys(&ca, &cert, &cert).unwrap();

        for path in [&ca, &cert] {
            let mode = std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_repair_is_rejected() {
        let dir = TempDir::new().unwrap();
        let key = write_key(&dir, "client.pem", 0o644);

        let result = check_key_file_with(&key, |_| {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        });
        assert!(matches!(result, Err(EipAgentError::BadKeyFilePermissions(ref p)) if *p == key));
    }

    #[cfg(unix)]
    #[test]
    fn test_ineffective_repair_is_rejected() {
        let dir = TempDir::new().unwrap();
        let key = write_key(&dir, "client.pem", 0o640);

        let mut repairs = 0;
        let result = check_key_file_with(&key, |_| {
            repairs += 1;
            Ok(())
        });
        assert!(matches!(result, Err(EipAgentError::BadKeyFilePermissions(ref p)) if *p == key));
        assert_eq!(repairs, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_skips_repair() {
        let dir = TempDir::new().unwrap();
        let key = write_key(&dir, "client.pem", 0o600);

        check_key_file_with(&key, |_| panic!("repair must not run")).unwrap();
    }
}
