//! Configuration file management for planpilot.
//!
//! Provides a TOML-based config file at `~/.config/planpilot/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub map: MapSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncSection {
    /// Tracker target to sync against.
    #[serde(default = "default_target")]
    pub target: String,
    /// Label applied to every created item and used by discovery.
    #[serde(default = "default_label")]
    pub discovery_label: String,
    /// Maximum provider calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            target: default_target(),
            discovery_label: default_label(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapSection {
    /// Directory where sync maps are persisted.
    #[serde(default = "default_map_dir")]
    pub dir: PathBuf,
}

impl Default for MapSection {
    fn default() -> Self {
        Self {
            dir: default_map_dir(),
        }
    }
}

fn default_target() -> String {
    "memory".to_owned()
}

fn default_label() -> String {
    "planpilot".to_owned()
}

fn default_concurrency() -> usize {
    1
}

fn default_map_dir() -> PathBuf {
    PathBuf::from(".planpilot")
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the planpilot config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/planpilot` or
/// `~/.config/planpilot`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("planpilot");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("planpilot")
}

/// Return the path to the planpilot config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// CLI flag overrides fed into resolution.
#[derive(Debug, Default)]
pub struct CliOverrides<'a> {
    pub target: Option<&'a str>,
    pub discovery_label: Option<&'a str>,
    pub concurrency: Option<usize>,
    pub map_dir: Option<&'a Path>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub target: String,
    pub discovery_label: String,
    pub concurrency: usize,
    pub map_dir: PathBuf,
}

impl ResolvedConfig {
    /// Resolve configuration using the chain:
    /// CLI flag > `PLANPILOT_*` env var > config file > default.
    pub fn resolve(cli: &CliOverrides<'_>) -> Result<Self> {
        let file_config = load_config().ok();

        let target = resolve_string(
            cli.target,
            "PLANPILOT_TARGET",
            file_config.as_ref().map(|c| c.sync.target.clone()),
            default_target,
        );
        let discovery_label = resolve_string(
            cli.discovery_label,
            "PLANPILOT_DISCOVERY_LABEL",
            file_config.as_ref().map(|c| c.sync.discovery_label.clone()),
            default_label,
        );

        let concurrency = if let Some(n) = cli.concurrency {
            n
        } else if let Ok(raw) = std::env::var("PLANPILOT_CONCURRENCY") {
            raw.parse()
                .with_context(|| format!("PLANPILOT_CONCURRENCY is not a number: {raw:?}"))?
        } else if let Some(ref cfg) = file_config {
            cfg.sync.concurrency
        } else {
            default_concurrency()
        };

        let map_dir = if let Some(dir) = cli.map_dir {
            dir.to_path_buf()
        } else if let Ok(dir) = std::env::var("PLANPILOT_MAP_DIR") {
            PathBuf::from(dir)
        } else if let Some(ref cfg) = file_config {
            cfg.map.dir.clone()
        } else {
            default_map_dir()
        };

        Ok(Self {
            target,
            discovery_label,
            concurrency: concurrency.max(1),
            map_dir,
        })
    }
}

fn resolve_string(
    cli: Option<&str>,
    env_var: &str,
    file_value: Option<String>,
    default: fn() -> String,
) -> String {
    if let Some(v) = cli {
        return v.to_owned();
    }
    if let Ok(v) = std::env::var(env_var) {
        return v;
    }
    file_value.unwrap_or_else(default)
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_planpilot_env() {
        for var in [
            "PLANPILOT_TARGET",
            "PLANPILOT_DISCOVERY_LABEL",
            "PLANPILOT_CONCURRENCY",
            "PLANPILOT_MAP_DIR",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    /// Point config loading at an empty temp dir so a developer's real
    /// config file cannot leak into the test.
    fn isolate_config(tmp: &tempfile::TempDir) {
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let _lock = lock_env();
        let path = config_path();
        assert!(
            path.ends_with("planpilot/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);

        let original = ConfigFile {
            sync: SyncSection {
                target: "memory".to_owned(),
                discovery_label: "my-label".to_owned(),
                concurrency: 4,
            },
            map: MapSection {
                dir: PathBuf::from("out/maps"),
            },
        };
        save_config(&original).unwrap();

        let loaded = load_config().unwrap();
        assert_eq!(loaded.sync.target, "memory");
        assert_eq!(loaded.sync.discovery_label, "my-label");
        assert_eq!(loaded.sync.concurrency, 4);
        assert_eq!(loaded.map.dir, PathBuf::from("out/maps"));

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let _lock = lock_env();
        let parsed: ConfigFile = toml::from_str("[sync]\ntarget = \"memory\"\n").unwrap();
        assert_eq!(parsed.sync.target, "memory");
        assert_eq!(parsed.sync.discovery_label, "planpilot");
        assert_eq!(parsed.sync.concurrency, 1);
        assert_eq!(parsed.map.dir, PathBuf::from(".planpilot"));
    }

    #[test]
    fn resolve_with_cli_flag_overrides_env() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);
        unsafe { std::env::set_var("PLANPILOT_TARGET", "env-target") };

        let resolved = ResolvedConfig::resolve(&CliOverrides {
            target: Some("cli-target"),
            ..CliOverrides::default()
        })
        .unwrap();
        assert_eq!(resolved.target, "cli-target");

        clear_planpilot_env();
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);

        save_config(&ConfigFile {
            sync: SyncSection {
                target: "file-target".to_owned(),
                ..SyncSection::default()
            },
            map: MapSection::default(),
        })
        .unwrap();
        unsafe { std::env::set_var("PLANPILOT_TARGET", "env-target") };

        let resolved = ResolvedConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(resolved.target, "env-target");

        clear_planpilot_env();
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);

        let resolved = ResolvedConfig::resolve(&CliOverrides::default()).unwrap();
        assert_eq!(resolved.target, "memory");
        assert_eq!(resolved.discovery_label, "planpilot");
        assert_eq!(resolved.concurrency, 1);
        assert_eq!(resolved.map_dir, PathBuf::from(".planpilot"));

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_rejects_non_numeric_concurrency() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);
        unsafe { std::env::set_var("PLANPILOT_CONCURRENCY", "lots") };

        let result = ResolvedConfig::resolve(&CliOverrides::default());
        assert!(result.is_err());

        clear_planpilot_env();
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_clamps_concurrency_to_at_least_one() {
        let _lock = lock_env();
        clear_planpilot_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate_config(&tmp);

        let resolved = ResolvedConfig::resolve(&CliOverrides {
            concurrency: Some(0),
            ..CliOverrides::default()
        })
        .unwrap();
        assert_eq!(resolved.concurrency, 1);

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }
}
