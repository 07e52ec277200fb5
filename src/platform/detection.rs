//! Executable search and invoking-user detection
//!
//! The tunnel daemon and the elevation helpers are located on a search path
//! made of bundled directories followed by the `PATH` entries. The daemon
//! drops privileges to the invoking user and their primary group.

use crate::error::{EipAgentError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered list of directories searched for executables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Search exactly the given directories
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Search the directories listed in `PATH`
    pub fn from_env() -> Self {
        let dirs = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    /// Put bundled directories ahead of the current ones
    pub fn with_bundled<I>(mut self, bundled: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut dirs: Vec<PathBuf> = bundled.into_iter().collect();
        dirs.append(&mut self.dirs);
        self.dirs = dirs;
        self
    }

    /// Directories in search order
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Every executable named `name`, in search order
    pub fn find_all(&self, name: &str) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        for dir in &self.dirs {
            let candidate = dir.join(name);
            if is_executable(&candidate) && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
        debug!("Search for {} found {} candidate(s)", name, found.len());
        found
    }

    /// First executable named `name`
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.find_all(name).into_iter().next()
    }
}

/// Find `name` in `extra_dirs` first, then on `PATH`
pub fn find_executable(name: &str, extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    SearchPath::from_env()
        .with_bundled(extra_dirs.iter().cloned())
        .find_all(name)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Login name of the invoking user
#[cfg(unix)]
pub fn current_user() -> Result<String> {
    use std::ffi::CStr;

    let uid = unsafe { libc::getuid() };
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe { libc::getpwuid_r(uid, &mut entry, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() {
        return Err(EipAgentError::Platform(format!(
            "No passwd entry for uid {}",
            uid
        )));
    }

    let name = unsafe { CStr::from_ptr(entry.pw_name) };
    Ok(name.to_string_lossy().into_owned())
}

/// Login name of the invoking user
#[cfg(not(unix))]
pub fn current_user() -> Result<String> {
    std::env::var("USERNAME")
        .map_err(|_| EipAgentError::Platform("USERNAME is not set".to_string()))
}

/// Name of the invoking user's primary group
#[cfg(unix)]
pub fn current_group() -> Result<String> {
    use std::ffi::CStr;

    let gid = unsafe { libc::getgid() };
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut entry: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();

    let rc = unsafe { libc::getgrgid_r(gid, &mut entry, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() {
        return Err(EipAgentError::Platform(format!(
            "No group entry for gid {}",
            gid
        )));
    }

    let name = unsafe { CStr::from_ptr(entry.gr_name) };
    Ok(name.to_string_lossy().into_owned())
}

/// Name of the invoking user's primary group
#[cfg(not(unix))]
pub fn current_group() -> Result<String> {
    Err(EipAgentError::Platform(
        "Group lookup is not supported on this platform".to_string(),
    ))
}
