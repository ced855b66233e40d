use std::path::PathBuf;

/// Per-user directories for one application name.
///
/// On macOS and Linux these follow the XDG base directory variables:
/// - Config: $XDG_CONFIG_HOME/{name} (default: ~/.config/{name})
/// - Data: $XDG_DATA_HOME/{name} (default: ~/.local/share/{name})
///
/// On Windows both live under %APPDATA%\{name}.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// `None` when no home directory can be determined
    pub fn new(name: &str) -> Option<Self> {
        home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        platform_dir("XDG_CONFIG_HOME", &[".config"]).join(&self.name)
    }

    pub fn data_dir(&self) -> PathBuf {
        platform_dir("XDG_DATA_HOME", &[".local", "share"]).join(&self.name)
    }

    /// `config.toml` inside the config dir
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Persisted token and terms flag
    pub fn state_file(&self) -> PathBuf {
        self.data_dir().join("client_state.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(not(target_os = "windows"))]
fn platform_dir(xdg_var: &str, fallback: &[&str]) -> PathBuf {
    if let Some(dir) = std::env::var(xdg_var).ok().filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    let relative: PathBuf = fallback.iter().collect();
    match home_dir() {
        Some(home) => home.join(relative),
        None => relative,
    }
}

#[cfg(target_os = "windows")]
fn platform_dir(_xdg_var: &str, fallback: &[&str]) -> PathBuf {
    std::env::var("APPDATA")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| fallback.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_contain_name() {
        if let Some(paths) = ProjectPaths::new("bombdash") {
            assert!(paths.config_dir().to_string_lossy().contains("bombdash"));
            assert!(paths.data_dir().to_string_lossy().contains("bombdash"));
            assert!(paths.config_file().ends_with("bombdash/config.toml"));
            assert!(paths.state_file().ends_with("bombdash/client_state.toml"));
        }
    }
}
