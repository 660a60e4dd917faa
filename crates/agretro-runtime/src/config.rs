//! Layered runtime configuration.
//!
//! Every setting resolves through the same chain: CLI flag, environment
//! variable, config file, built-in default. The config file lives at
//! `<config dir>/agretro/config.toml` and is optional.

use std::path::{Path, PathBuf};

use agretro_providers::catalog::{self, SourceSpec};
use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk config file. Both fields are optional; `sources` entries use
/// the same `name=path` (or bare path) syntax as the `--source` flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ConfigFile {
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agretro").join("config.toml"))
}

/// Settings a process actually runs with, fully resolved.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub sources: Vec<SourceSpec>,
}

impl RuntimeConfig {
    pub fn resolve(db_flag: Option<&str>, source_flags: &[String]) -> Result<Self> {
        let file = ConfigFile::load()?;
        let env_db = std::env::var("AGRETRO_DB").ok();
        let env_sources = std::env::var("AGRETRO_SOURCES").ok();
        Self::layer(
            db_flag,
            source_flags,
            env_db.as_deref(),
            env_sources.as_deref(),
            &file,
        )
    }

    fn layer(
        db_flag: Option<&str>,
        source_flags: &[String],
        env_db: Option<&str>,
        env_sources: Option<&str>,
        file: &ConfigFile,
    ) -> Result<Self> {
        // Priority 1: CLI flag
        let db_path = if let Some(path) = db_flag {
            expand_tilde(path)
        // Priority 2: AGRETRO_DB environment variable
        } else if let Some(path) = env_db {
            expand_tilde(path)
        // Priority 3: config file
        } else if let Some(path) = &file.db_path {
            expand_tilde(path)
        // Priority 4: platform data directory
        } else {
            default_db_path()?
        };

        let sources = if !source_flags.is_empty() {
            catalog::parse_source_specs(source_flags)
        } else if let Some(raw) = env_sources {
            // AGRETRO_SOURCES is comma-separated.
            let values: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            catalog::parse_source_specs(&values)
        } else if !file.sources.is_empty() {
            catalog::parse_source_specs(&file.sources)
        } else {
            catalog::default_source_specs()
        };

        Ok(Self { db_path, sources })
    }
}

/// Default store location: the platform data directory, or `~/.agretro`
/// on systems without one.
pub fn default_db_path() -> Result<PathBuf> {
    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("agretro").join("agretro.db"));
    }
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".agretro").join("agretro.db"));
    }
    Err(anyhow::anyhow!(
        "could not determine a database path: no HOME or XDG data directory"
    ))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_returns_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = ConfigFile::load_from(&temp_dir.path().join("missing.toml"))?;
        assert!(config.db_path.is_none());
        assert!(config.sources.is_empty());
        Ok(())
    }

    #[test]
    fn load_parses_both_fields() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_path = \"/var/lib/agretro.db\"\nsources = [\"claude=/logs/claude\"]\n",
        )?;

        let config = ConfigFile::load_from(&path)?;
        assert_eq!(config.db_path.as_deref(), Some("/var/lib/agretro.db"));
        assert_eq!(config.sources, vec!["claude=/logs/claude".to_string()]);
        Ok(())
    }

    #[test]
    fn flag_beats_env_beats_file() -> Result<()> {
        let file = ConfigFile {
            db_path: Some("/from/file.db".to_string()),
            sources: Vec::new(),
        };

        let resolved = RuntimeConfig::layer(
            Some("/from/flag.db"),
            &[],
            Some("/from/env.db"),
            None,
            &file,
        )?;
        assert_eq!(resolved.db_path, PathBuf::from("/from/flag.db"));

        let resolved = RuntimeConfig::layer(None, &[], Some("/from/env.db"), None, &file)?;
        assert_eq!(resolved.db_path, PathBuf::from("/from/env.db"));

        let resolved = RuntimeConfig::layer(None, &[], None, None, &file)?;
        assert_eq!(resolved.db_path, PathBuf::from("/from/file.db"));
        Ok(())
    }

    #[test]
    fn env_sources_split_on_commas() -> Result<()> {
        let resolved = RuntimeConfig::layer(
            Some("/tmp/agretro.db"),
            &[],
            None,
            Some("claude=/a , codex=/b ,"),
            &ConfigFile::default(),
        )?;

        let agents: Vec<&str> = resolved.sources.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["claude", "codex"]);
        assert_eq!(resolved.sources[1].root, PathBuf::from("/b"));
        Ok(())
    }

    #[test]
    fn file_sources_used_when_nothing_overrides() -> Result<()> {
        let file = ConfigFile {
            db_path: None,
            sources: vec!["aider=/logs/aider".to_string()],
        };

        let resolved = RuntimeConfig::layer(Some("/tmp/agretro.db"), &[], None, None, &file)?;
        assert_eq!(resolved.sources.len(), 1);
        assert_eq!(resolved.sources[0].agent, "aider");
        Ok(())
    }

    #[test]
    fn tilde_expands_against_home() {
        let expanded = expand_tilde("~/logs/agretro.db");
        if std::env::var_os("HOME").is_some() {
            assert!(!expanded.starts_with("~"));
        }
        assert!(expanded.ends_with("logs/agretro.db"));
    }
}
