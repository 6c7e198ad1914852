//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Unknown elements are rejected so typos surface instead of silently using defaults.
//! - Numeric fields tolerate surrounding whitespace.
//!
//! Example:
//! ```xml
//! <config>
//!   <poll_interval_ms>100</poll_interval_ms>
//!   <wait_timeout_ms>0</wait_timeout_ms>
//!   <workers>8</workers>
//!   <log_level>normal</log_level>
//!   <log_file>/var/log/treesync.log</log_file>
//! </config>
//! ```

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::CONFIG_ENV;
use super::paths::default_config_path;
use super::types::{Config, LogLevel};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    poll_interval_ms: Option<String>,
    wait_timeout_ms: Option<String>,
    workers: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
}

fn parse_number(field: &str, raw: Option<&str>) -> Result<Option<u64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("<{field}> must be a non-negative integer, got '{s}'")),
    }
}

// Map XmlConfig -> Config; absent fields keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(ms) = parse_number("poll_interval_ms", parsed.poll_interval_ms.as_deref())? {
        if ms == 0 {
            bail!("<poll_interval_ms> must be greater than zero");
        }
        cfg.poll_interval = Duration::from_millis(ms);
    }
    // 0 keeps the wait unbounded, same as leaving the element out.
    cfg.wait_timeout = parse_number("wait_timeout_ms", parsed.wait_timeout_ms.as_deref())?
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);
    cfg.workers = parse_number("workers", parsed.workers.as_deref())?
        .filter(|n| *n > 0)
        .map(|n| n as usize);

    if let Some(s) = parsed.log_level.as_deref() {
        cfg.log_level = s
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("<log_level>")?;
    }
    if let Some(s) = parsed.log_file.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.log_file = Some(PathBuf::from(trimmed));
        }
    }

    Ok(cfg)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    xml_to_config(parsed).with_context(|| format!("invalid config xml '{}'", path.display()))
}

/// Load the effective Config.
///
/// - `$TREESYNC_CONFIG` set: that file must exist and parse.
/// - Otherwise the platform default location is used when present.
/// - No file at all: defaults.
pub fn load_config() -> Result<Config> {
    let explicit = env::var_os(CONFIG_ENV).is_some();
    let Some(path) = default_config_path() else {
        debug!("no config location could be determined; using defaults");
        return Ok(Config::default());
    };

    if !path.exists() {
        if explicit {
            bail!("{} points to a missing file: {}", CONFIG_ENV, path.display());
        }
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }

    debug!(path = %path.display(), "loading config");
    load_config_from_xml_path(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Config> {
        let parsed: XmlConfig = from_xml_str(xml)?;
        xml_to_config(parsed)
    }

    #[test]
    fn full_document() {
        let cfg = parse(
            "<config>\n  <poll_interval_ms> 250 </poll_interval_ms>\n  <wait_timeout_ms>5000</wait_timeout_ms>\n  <workers>3</workers>\n  <log_level>debug</log_level>\n  <log_file>/tmp/ts.log</log_file>\n</config>",
        )
        .unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.wait_timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.workers, Some(3));
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/ts.log")));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let cfg = parse("<config><wait_timeout_ms>0</wait_timeout_ms></config>").unwrap();
        assert!(cfg.wait_timeout.is_none());
    }

    #[test]
    fn empty_log_file_is_none() {
        let cfg = parse("<config><log_file>   </log_file></config>").unwrap();
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(parse("<config><download_base>/x</download_base></config>").is_err());
    }

    #[test]
    fn bad_number_rejected() {
        let err = parse("<config><workers>many</workers></config>").unwrap_err();
        assert!(format!("{err:#}").contains("workers"));
        assert!(parse("<config><poll_interval_ms>0</poll_interval_ms></config>").is_err());
    }
}
