// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::ServiceError;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the runtime directory for service `name`.
///
/// Priority:
/// - explicit override (configuration)
/// - `$RUNTIME_DIRECTORY`, set by systemd's `RuntimeDirectory=`
/// - `$XDG_RUNTIME_DIR/<name>`
/// - `<tmp>/<name>`
pub fn resolve(name: &str, explicit: Option<&Path>) -> PathBuf {
    resolve_with(
        name,
        explicit,
        std::env::var_os("RUNTIME_DIRECTORY").map(PathBuf::from),
        std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
    )
}

fn resolve_with(
    name: &str,
    explicit: Option<&Path>,
    runtime_directory: Option<PathBuf>,
    xdg_runtime_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    // systemd may pass several colon-separated directories; the first is ours.
    if let Some(dirs) = runtime_directory {
        let dirs = dirs.to_string_lossy().into_owned();
        if let Some(first) = dirs.split(':').find(|s| !s.is_empty()) {
            return PathBuf::from(first);
        }
    }
    if let Some(base) = xdg_runtime_dir.filter(|p| !p.as_os_str().is_empty()) {
        return base.join(name);
    }
    std::env::temp_dir().join(name)
}

/// Create `path` (and parents) restricted to owner and group.
pub fn ensure(path: &Path) -> Result<(), ServiceError> {
    fs::create_dir_all(path).map_err(|source| ServiceError::RuntimeDir {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o750)) {
            // Directories handed to us by the service manager may belong to
            // another owner; we can still use them.
            warn!(
                "failed to set permissions on runtime directory {}: {e}",
                path.display()
            );
        }
    }

    debug!("runtime directory ready: {}", path.display());
    Ok(())
}

/// Remove a stale file left by a previous run (best effort).
pub(crate) fn remove_stale(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed stale {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let path = resolve_with(
            "svc",
            Some(Path::new("/custom")),
            Some(PathBuf::from("/run/svc")),
            Some(PathBuf::from("/run/user/1000")),
        );
        assert_eq!(path, PathBuf::from("/custom"));
    }

    #[test]
    fn test_systemd_runtime_directory() {
        let path = resolve_with(
            "svc",
            None,
            Some(PathBuf::from("/run/svc:/run/svc-extra")),
            Some(PathBuf::from("/run/user/1000")),
        );
        assert_eq!(path, PathBuf::from("/run/svc"));
    }

    #[test]
    fn test_xdg_runtime_dir() {
        let path = resolve_with("svc", None, None, Some(PathBuf::from("/run/user/1000")));
        assert_eq!(path, PathBuf::from("/run/user/1000/svc"));
    }

    #[test]
    fn test_temp_fallback() {
        let path = resolve_with("svc", None, None, Some(PathBuf::new()));
        assert_eq!(path, std::env::temp_dir().join("svc"));
    }

    #[test]
    fn test_ensure_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c");
        ensure(&path).unwrap();
        assert!(path.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o750);
        }
    }

    #[test]
    fn test_ensure_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = ensure(&file.join("sub")).unwrap_err();
        assert!(matches!(err, ServiceError::RuntimeDir { .. }));
    }

    #[test]
    fn test_remove_stale_missing_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        remove_stale(&dir.path().join("nothing.sock"));
    }
}
