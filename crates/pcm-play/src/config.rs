//! Configuration loading and resolution.
//!
//! Settings come from, in order of precedence: CLI flags, an optional TOML file, built-in
//! defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::cli::Args;
pub use pcm_player::config::PlaybackConfig;

/// Player configuration file (TOML). Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Output device name substring.
    pub device: Option<String>,
    /// Writer chunk size in frames.
    pub frames_per_period: Option<u32>,
    /// Initial device sample rate.
    pub sample_rate: Option<u32>,
    /// Initial device channel count.
    pub channels: Option<u16>,
    /// Idle wake-up interval for shutdown checks.
    pub poll_interval_ms: Option<u64>,
    /// Directory relative resource ids are resolved against.
    pub media_root: Option<String>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<FileConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Fully resolved runner settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSettings {
    pub playback: PlaybackConfig,
    pub media_root: Option<PathBuf>,
}

/// Merge CLI flags over the file config over defaults.
pub fn resolve(args: &Args, file: &FileConfig) -> Result<PlayerSettings> {
    let defaults = PlaybackConfig::default();
    let playback = PlaybackConfig {
        frames_per_period: args
            .frames_per_period
            .or(file.frames_per_period)
            .unwrap_or(defaults.frames_per_period),
        sample_rate: args
            .rate
            .or(file.sample_rate)
            .unwrap_or(defaults.sample_rate),
        channels: args.channels.or(file.channels).unwrap_or(defaults.channels),
        device: normalize_device_name(args.device.clone().or_else(|| file.device.clone())),
        poll_interval: file
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval),
    };

    if playback.frames_per_period == 0 {
        return Err(anyhow!("frames_per_period must be at least 1"));
    }
    if playback.sample_rate == 0 {
        return Err(anyhow!("sample_rate must be positive"));
    }
    if playback.channels == 0 {
        return Err(anyhow!("channels must be at least 1"));
    }

    let media_root = file
        .media_root
        .as_deref()
        .map(str::trim)
        .filter(|root| !root.is_empty())
        .map(PathBuf::from);

    Ok(PlayerSettings {
        playback,
        media_root,
    })
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["pcm-play"];
        argv.extend_from_slice(extra);
        argv.push("stdin");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let settings = resolve(&args(&[]), &FileConfig::default()).unwrap();
        assert_eq!(settings.playback, PlaybackConfig::default());
        assert!(settings.media_root.is_none());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let file = FileConfig {
            device: Some("Speakers".to_string()),
            frames_per_period: Some(256),
            sample_rate: Some(48_000),
            ..FileConfig::default()
        };
        let settings = resolve(&args(&["--frames-per-period", "64", "--device", "DAC"]), &file)
            .unwrap();
        assert_eq!(settings.playback.frames_per_period, 64);
        assert_eq!(settings.playback.sample_rate, 48_000);
        assert_eq!(settings.playback.device.as_deref(), Some("DAC"));
    }

    #[test]
    fn blank_device_name_means_default_device() {
        let file = FileConfig {
            device: Some("   ".to_string()),
            ..FileConfig::default()
        };
        let settings = resolve(&args(&[]), &file).unwrap();
        assert!(settings.playback.device.is_none());
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(resolve(&args(&["--frames-per-period", "0"]), &FileConfig::default()).is_err());
    }

    #[test]
    fn file_config_parses_toml() {
        let cfg: FileConfig = toml::from_str(
            r#"
            device = "USB"
            frames_per_period = 128
            poll_interval_ms = 20
            media_root = "/srv/audio"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.as_deref(), Some("USB"));
        assert_eq!(cfg.frames_per_period, Some(128));

        let settings = resolve(&args(&[]), &cfg).unwrap();
        assert_eq!(settings.playback.poll_interval, Duration::from_millis(20));
        assert_eq!(settings.media_root, Some(PathBuf::from("/srv/audio")));
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("buffer_seconds = 2.0").is_err());
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB DAC ".to_string())),
            Some("USB DAC".to_string())
        );
    }
}
