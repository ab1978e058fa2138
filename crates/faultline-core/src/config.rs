//! # Configuration
//!
//! Process-wide tracing settings, read once from the environment.
//!
//! ## Environment Variables
//!
//! - `FAULTLINE_COLORS`: initial value of the color toggle (`1`, `true`, `yes`, `on`)
//! - `FAULTLINE_MAX_FRAMES`: maximum number of frames walked per trace
//!   (default 256, clamped to `1..=4096`)

use std::env;

use once_cell::sync::Lazy;

/// Environment variable holding the initial color toggle.
pub const COLORS_ENV: &str = "FAULTLINE_COLORS";

/// Environment variable holding the walker's frame cap.
pub const MAX_FRAMES_ENV: &str = "FAULTLINE_MAX_FRAMES";

/// Frame cap used when `FAULTLINE_MAX_FRAMES` is unset or invalid.
pub const DEFAULT_MAX_FRAMES: usize = 256;

/// Hard upper bound for the frame cap.
pub const MAX_FRAMES_LIMIT: usize = 4096;

static CONFIG: Lazy<TraceConfig> = Lazy::new(|| {
    let config = TraceConfig::from_lookup(|key| env::var(key).ok());
    tracing::debug!(colors = config.colors, max_frames = config.max_frames, "trace configuration loaded");
    config
});

/// Settings shared by every trace captured in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceConfig
{
    /// Initial state of the global color toggle.
    pub colors: bool,
    /// Maximum number of frames the walker produces.
    pub max_frames: usize,
}

impl Default for TraceConfig
{
    fn default() -> Self
    {
        Self {
            colors: false,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl TraceConfig
{
    /// Configuration of the current process (read once, then cached).
    pub fn global() -> &'static TraceConfig
    {
        &CONFIG
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to the defaults and are logged.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(COLORS_ENV) {
            config.colors = parse_flag(&value);
        }

        if let Some(value) = lookup(MAX_FRAMES_ENV) {
            match value.trim().parse::<usize>() {
                Ok(frames) => config.max_frames = frames.clamp(1, MAX_FRAMES_LIMIT),
                Err(err) => tracing::warn!(%value, %err, "ignoring invalid {MAX_FRAMES_ENV}"),
            }
        }

        config
    }
}

fn parse_flag(value: &str) -> bool
{
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset()
    {
        let config = TraceConfig::from_lookup(|_| None);
        assert_eq!(config, TraceConfig::default());
        assert!(!config.colors);
        assert_eq!(config.max_frames, DEFAULT_MAX_FRAMES);
    }

    #[test]
    fn test_color_flag_values()
    {
        for value in ["1", "true", "YES", " on "] {
            assert!(TraceConfig::from_lookup(lookup_from(&[(COLORS_ENV, value)])).colors, "{value}");
        }
        for value in ["0", "false", "off", "maybe"] {
            assert!(!TraceConfig::from_lookup(lookup_from(&[(COLORS_ENV, value)])).colors, "{value}");
        }
    }

    #[test]
    fn test_max_frames_is_clamped()
    {
        assert_eq!(TraceConfig::from_lookup(lookup_from(&[(MAX_FRAMES_ENV, "64")])).max_frames, 64);
        assert_eq!(TraceConfig::from_lookup(lookup_from(&[(MAX_FRAMES_ENV, "0")])).max_frames, 1);
        assert_eq!(
            TraceConfig::from_lookup(lookup_from(&[(MAX_FRAMES_ENV, "100000")])).max_frames,
            MAX_FRAMES_LIMIT
        );
    }

    #[test]
    fn test_invalid_max_frames_keeps_default()
    {
        let config = TraceConfig::from_lookup(lookup_from(&[(MAX_FRAMES_ENV, "lots")]));
        assert_eq!(config.max_frames, DEFAULT_MAX_FRAMES);
    }
}
