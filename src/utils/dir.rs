use std::{env, ffi::OsString, path::PathBuf};

use anyhow::{anyhow, Result};

const APP_DIR_NAME: &str = "tngimport";

/// Resolves and creates the directory that holds the feature store and logs.
///
/// Imported features are user data that has to survive cache and state cleanups, so the
/// directory lives under `$XDG_DATA_HOME` (or `$HOME/.local/share`) rather than the state dir.
pub fn create_application_default_path() -> Result<PathBuf> {
    #[cfg(windows)]
    let path = env::var_os("APPDATA")
        .map(|v| PathBuf::from(v).join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("APPDATA should be present on Windows"))?;
    #[cfg(not(windows))]
    let path = data_dir(env::var_os("XDG_DATA_HOME"), env::var_os("HOME"))?;

    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[cfg_attr(windows, allow(dead_code))]
fn data_dir(xdg_data_home: Option<OsString>, home: Option<OsString>) -> Result<PathBuf> {
    let base = xdg_data_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|v| PathBuf::from(v).join(".local/share")))
        .ok_or_else(|| anyhow!("Couldn't find neither XDG_DATA_HOME nor HOME"))?;
    Ok(base.join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::data_dir;

    #[test]
    fn test_data_dir_prefers_xdg_data_home() {
        assert_eq!(
            data_dir(Some("/data".into()), Some("/home/me".into())).unwrap(),
            PathBuf::from("/data/tngimport")
        );
        assert_eq!(
            data_dir(Some("".into()), Some("/home/me".into())).unwrap(),
            PathBuf::from("/home/me/.local/share/tngimport")
        );
        assert!(data_dir(None, None).is_err());
    }
}
