//! Runtime configuration, layered from defaults, `qms.toml` and `QMS_*`
//! environment variables (later sources win).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Duration;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Days a deviation may wait in one status before a reminder is due.
  pub reminder_after_days: i64,
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Checked by [`load`]; an unrepresentable window saturates.
  pub fn reminder_after(&self) -> Duration {
    Duration::try_days(self.reminder_after_days).unwrap_or(Duration::MAX)
  }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
  Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080_i64)?
    .set_default("store_path", "qms.sqlite3")?
    .set_default("reminder_after_days", 7_i64)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ServerConfig> {
  let cfg: ServerConfig = builder
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  if cfg.reminder_after_days < 0 {
    anyhow::bail!("reminder_after_days must not be negative");
  }
  if Duration::try_days(cfg.reminder_after_days).is_none() {
    anyhow::bail!(
      "reminder_after_days is out of range: {}",
      cfg.reminder_after_days
    );
  }
  Ok(cfg)
}

/// Load configuration. A missing file is not an error.
pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
  let builder = defaults()?
    .add_source(File::from(path).required(false))
    .add_source(Environment::with_prefix("QMS"));
  finish(builder)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  #[test]
  fn defaults_fill_every_field() {
    let cfg = finish(defaults().unwrap()).unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.store_path, PathBuf::from("qms.sqlite3"));
    assert_eq!(cfg.reminder_after(), Duration::days(7));
  }

  #[test]
  fn file_values_override_defaults() {
    let builder = defaults().unwrap().add_source(File::from_str(
      "port = 9100\nreminder_after_days = 3\nstore_path = \"/var/lib/qms/db\"",
      FileFormat::Toml,
    ));
    let cfg = finish(builder).unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.reminder_after_days, 3);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/qms/db"));
  }

  #[test]
  fn negative_reminder_window_is_rejected() {
    let builder = defaults()
      .unwrap()
      .add_source(File::from_str("reminder_after_days = -1", FileFormat::Toml));
    assert!(finish(builder).is_err());
  }

  #[test]
  fn oversized_reminder_window_is_rejected() {
    let builder = defaults().unwrap().add_source(File::from_str(
      "reminder_after_days = 9223372036854775807",
      FileFormat::Toml,
    ));
    let err = finish(builder).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");
  }

  #[test]
  fn large_window_within_range_is_accepted() {
    let builder = defaults()
      .unwrap()
      .add_source(File::from_str("reminder_after_days = 100000000", FileFormat::Toml));
    let cfg = finish(builder).unwrap();
    assert_eq!(cfg.reminder_after(), Duration::days(100_000_000));
  }

  #[test]
  fn tilde_is_left_alone_without_slash() {
    assert_eq!(expand_tilde(Path::new("~db")), PathBuf::from("~db"));
  }
}
