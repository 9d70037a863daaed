//! Animation tuning loaded from YAML.
//!
//! All values are hand-tuned constants rather than computed limits:
//!
//! ```yaml
//! max_frames: 18
//! playback_interval_ms: 500
//! batch_size: 3
//! batch_delay_ms: 150
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the timeline coordinator and precache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Maximum retained frames per timeline (most recent kept)
    pub max_frames: usize,
    /// Delay between automatic frame advances
    pub playback_interval_ms: u64,
    /// Per-frame layers created per batch
    pub batch_size: usize,
    /// Delay between pre-cache batches
    pub batch_delay_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            max_frames: 18,
            playback_interval_ms: 500,
            batch_size: 3,
            batch_delay_ms: 150,
        }
    }
}

impl AnimationConfig {
    /// Load configuration from a YAML file; missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading animation config {}", path.display()))?;
        let config: AnimationConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing animation config {}", path.display()))?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            anyhow::bail!("max_frames must be > 0");
        }
        if self.playback_interval_ms == 0 {
            anyhow::bail!("playback_interval_ms must be > 0");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        Ok(())
    }

    pub fn playback_interval(&self) -> Duration {
        Duration::from_millis(self.playback_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnimationConfig::default();
        assert_eq!(config.max_frames, 18);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.batch_delay(), Duration::from_millis(150));
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_frames: 12\nbatch_delay_ms: 50").unwrap();

        let config = tokio_test::assert_ok!(AnimationConfig::from_file(file.path()));
        assert_eq!(config.max_frames, 12);
        assert_eq!(config.batch_delay_ms, 50);
        assert_eq!(config.playback_interval_ms, 500);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = AnimationConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = AnimationConfig::from_file("/nonexistent/animation.yaml").unwrap_err();
        assert!(err.to_string().contains("reading animation config"));
    }
}
