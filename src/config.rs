use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::proto::Revision;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// e.g., "info" | "debug"
    pub log_level: Option<String>,
    /// panel wiring & behavior
    pub panel: Option<PanelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PanelConfig {
    /// Serial port path, "AUTO" for USB auto-detection, or "sim" for the
    /// in-memory panel.
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub revision: Option<Revision>,
    /// Percent, 0-100. Overrides the theme's brightness.
    pub brightness: Option<u8>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "vitrine", about = "Machine telemetry on small panels", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud: Option<u32>,
    /// Panel hardware revision: A, B or C
    #[arg(long)]
    pub revision: Option<String>,
    #[arg(long)]
    pub brightness: Option<u8>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli)?;

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/vitrine/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/vitrine/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/vitrine.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["vitrine.yaml", "config.yaml", "config/vitrine.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    match (&mut dst.panel, src.panel) {
        (None, Some(c)) => dst.panel = Some(c),
        (Some(d), Some(s)) => merge_panel(d, s),
        _ => {}
    }
}

fn merge_panel(dst: &mut PanelConfig, src: PanelConfig) {
    if src.port.is_some() { dst.port = src.port; }
    if src.baud.is_some() { dst.baud = src.baud; }
    if src.revision.is_some() { dst.revision = src.revision; }
    if src.brightness.is_some() { dst.brightness = src.brightness; }
}

fn parse_revision(s: &str) -> Result<Revision, ConfigError> {
    match s.trim().to_ascii_uppercase().as_str() {
        "A" => Ok(Revision::A),
        "B" => Ok(Revision::B),
        "C" => Ok(Revision::C),
        other => Err(ConfigError::Validation(format!(
            "Unknown panel revision '{other}' (expected A, B or C)"
        ))),
    }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) -> Result<(), ConfigError> {
    if cli.log_level.is_some() {
        cfg.log_level = cli.log_level.clone();
    }
    let wants_panel = cli.port.is_some()
        || cli.baud.is_some()
        || cli.revision.is_some()
        || cli.brightness.is_some();
    if wants_panel && cfg.panel.is_none() {
        cfg.panel = Some(PanelConfig::default());
    }
    if let Some(panel) = cfg.panel.as_mut() {
        if cli.port.is_some() { panel.port = cli.port.clone(); }
        if cli.baud.is_some() { panel.baud = cli.baud; }
        if let Some(rev) = cli.revision.as_deref() {
            panel.revision = Some(parse_revision(rev)?);
        }
        if cli.brightness.is_some() { panel.brightness = cli.brightness; }
    }
    Ok(())
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(panel) = &cfg.panel {
        if let Some(baud) = panel.baud {
            if baud == 0 {
                return Err(ConfigError::Validation("baud must be non-zero".into()));
            }
        }
        if let Some(b) = panel.brightness {
            if b > 100 {
                return Err(ConfigError::Validation(
                    "brightness must be 0-100".into(),
                ));
            }
        }
    }
    Ok(())
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_src_options() {
        let mut dst = Config {
            log_level: Some("info".into()),
            panel: Some(PanelConfig {
                port: Some("/dev/ttyACM0".into()),
                baud: Some(115200),
                revision: Some(Revision::A),
                brightness: None,
            }),
        };
        let src = Config {
            log_level: None,
            panel: Some(PanelConfig {
                port: None,
                baud: Some(921600),
                revision: None,
                brightness: Some(40),
            }),
        };
        merge(&mut dst, src);
        let panel = dst.panel.unwrap();
        assert_eq!(dst.log_level.as_deref(), Some("info"));
        assert_eq!(panel.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(panel.baud, Some(921600));
        assert_eq!(panel.brightness, Some(40));
    }

    #[test]
    fn revision_parsing_is_forgiving_about_case() {
        assert_eq!(parse_revision("b").unwrap(), Revision::B);
        assert!(parse_revision("Z").is_err());
    }

    #[test]
    fn overlong_brightness_rejected() {
        let cfg = Config {
            log_level: None,
            panel: Some(PanelConfig {
                port: None,
                baud: None,
                revision: None,
                brightness: Some(130),
            }),
        };
        assert!(validate(&cfg).is_err());
    }
}
