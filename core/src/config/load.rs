use std::path::{Path, PathBuf};

use super::types::{AppConfig, ENV_ACCESS_TOKEN, ENV_ACCESS_TOKEN_SECRET};

/// Get the default sandrun data directory: ~/.sandrun
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".sandrun"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.sandrun/config.toml
    let user_config = get_data_dir()?.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let cfg = if user_config.exists() {
        read_config(&user_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        AppConfig::default()
    };

    Ok(apply_env_overrides(cfg, |k| std::env::var(k).ok()))
}

/// Load an explicit config file, then apply environment overrides.
pub fn load_from(path: &Path) -> anyhow::Result<AppConfig> {
    let cfg = read_config(path)?;
    Ok(apply_env_overrides(cfg, |k| std::env::var(k).ok()))
}

fn read_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("parse {}: {e}", path.display()))?;
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
pub fn apply_env_overrides<F>(mut cfg: AppConfig, get: F) -> AppConfig
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |k: &str| get(k).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty(ENV_ACCESS_TOKEN) {
        cfg.sandbox.access_token = v;
    }
    if let Some(v) = non_empty(ENV_ACCESS_TOKEN_SECRET) {
        cfg.sandbox.access_token_secret = v;
    }
    if let Some(v) = non_empty("SANDRUN_ZONE") {
        cfg.sandbox.zone = v;
    }
    if let Some(v) = non_empty("SANDRUN_DRY_RUN") {
        cfg.sandbox.dry_run = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn load_from_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[sandbox]\nzone = \"is1v\"\ntimeout_secs = 5\n[scheduler]\nrate_limit = 2.5"
        )
        .unwrap();

        let cfg = read_config(file.path()).unwrap();
        assert_eq!(cfg.sandbox.zone, "is1v");
        assert_eq!(cfg.sandbox.timeout_secs, 5);
        assert_eq!(cfg.scheduler.rate_limit, 2.5);
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sandbox\nzone = 1").unwrap();
        let err = read_config(file.path()).unwrap_err().to_string();
        assert!(err.contains("parse"), "{err}");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_ACCESS_TOKEN, "env-token"),
            (ENV_ACCESS_TOKEN_SECRET, "env-secret"),
            ("SANDRUN_ZONE", "is1v"),
            ("SANDRUN_DRY_RUN", "true"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.sandbox.access_token = "file-token".into();

        let cfg = apply_env_overrides(cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.sandbox.access_token, "env-token");
        assert_eq!(cfg.sandbox.access_token_secret, "env-secret");
        assert_eq!(cfg.sandbox.zone, "is1v");
        assert!(cfg.sandbox.dry_run);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = AppConfig::default();
        cfg.sandbox.access_token = "file-token".into();
        let cfg = apply_env_overrides(cfg, |k| {
            (k == ENV_ACCESS_TOKEN).then(|| "  ".to_string())
        });
        assert_eq!(cfg.sandbox.access_token, "file-token");
    }
}
