use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the Argos home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("user home is unknown: {0} environment variable is not set")]
    UserHomeMissing(&'static str),
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Environment variable holding the per-user base directory.
#[cfg(target_os = "windows")]
const BASE_VAR: &str = "APPDATA";
#[cfg(not(target_os = "windows"))]
const BASE_VAR: &str = "HOME";

/// Resolve the home directory for this platform.
///
/// - A configured value may start with `~`, which expands to the user home
///   (`USERPROFILE`/`HOME` on Windows, `HOME` elsewhere). The result must be absolute.
/// - Without a configured value, `<BASE>/<default_subdir>` is used where BASE is
///   `%APPDATA%` on Windows and `$HOME` elsewhere.
///
/// When `create` is true, the directory is created if missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let user_home = user_home_from_env();
    let base = env::var_os(BASE_VAR).map(PathBuf::from);
    resolve_home_dir_with(config_home, default_subdir, create, user_home, base)
}

#[cfg(target_os = "windows")]
fn user_home_from_env() -> Option<PathBuf> {
    env::var_os("USERPROFILE")
        .or_else(|| env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(not(target_os = "windows"))]
fn user_home_from_env() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Same as [`resolve_home_dir`] with the environment lookups supplied by the caller.
pub fn resolve_home_dir_with(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
    user_home: Option<PathBuf>,
    base: Option<PathBuf>,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = expand_tilde(&raw, user_home.as_deref())?;
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into(),
                ));
            }
            expanded
        }
        None => base
            .ok_or(HomeDirError::UserHomeMissing(BASE_VAR))?
            .join(default_subdir),
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// `~`, `~/rest` and `~\rest` expand against `user_home`; anything else is taken as-is.
fn expand_tilde(raw: &str, user_home: Option<&Path>) -> Result<PathBuf, HomeDirError> {
    let Some(rest) = raw.strip_prefix('~') else {
        return Ok(PathBuf::from(raw));
    };
    let home = user_home.ok_or(HomeDirError::UserHomeMissing("HOME"))?;
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(home.to_path_buf())
    } else {
        Ok(home.join(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn is_normalized(path: &Path) -> bool {
        path.is_absolute() && !path.to_string_lossy().starts_with('~')
    }

    #[test]
    fn tilde_prefix_expands_to_user_home() {
        let tmp = tempdir().unwrap();
        let home = Some(tmp.path().to_path_buf());

        let result =
            resolve_home_dir_with(Some("~/myapp".into()), ".argos", false, home, None).unwrap();

        assert!(is_normalized(&result));
        assert_eq!(result, tmp.path().join("myapp"));
    }

    #[test]
    fn lone_tilde_is_user_home() {
        let tmp = tempdir().unwrap();
        let home = Some(tmp.path().to_path_buf());

        let result = resolve_home_dir_with(Some("~".into()), ".argos", false, home, None).unwrap();

        assert_eq!(result, tmp.path());
    }

    #[test]
    fn default_uses_base_and_subdir() {
        let tmp = tempdir().unwrap();
        let base = Some(tmp.path().to_path_buf());

        let result = resolve_home_dir_with(None, ".argos", false, None, base).unwrap();

        assert!(is_normalized(&result));
        assert!(result.ends_with(".argos"));
        assert!(result.starts_with(tmp.path()));
    }

    #[test]
    fn absolute_path_is_kept() {
        let tmp = tempdir().unwrap();
        let abs_path = tmp.path().join("custom_dir");

        let result = resolve_home_dir_with(
            Some(abs_path.to_string_lossy().to_string()),
            ".argos",
            false,
            None,
            None,
        )
        .unwrap();

        assert_eq!(result, abs_path);
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = resolve_home_dir_with(Some("relative/path".into()), ".argos", false, None, None)
            .unwrap_err();
        assert!(matches!(err, HomeDirError::AbsoluteRequired(ref p) if p.contains("relative")));
    }

    #[test]
    fn missing_base_is_an_error() {
        let err = resolve_home_dir_with(None, ".argos", false, None, None).unwrap_err();
        assert!(matches!(err, HomeDirError::UserHomeMissing(_)));

        let err =
            resolve_home_dir_with(Some("~/x".into()), ".argos", false, None, None).unwrap_err();
        assert!(matches!(err, HomeDirError::UserHomeMissing("HOME")));
    }

    #[test]
    fn create_flag_makes_directory() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join(".argos");

        let result =
            resolve_home_dir_with(None, ".argos", true, None, Some(tmp.path().to_path_buf()))
                .unwrap();

        assert!(result.exists());
        assert_eq!(result, target);
    }
}
