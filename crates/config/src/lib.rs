//! Typed configuration for every tunable constant across the session
//! engines, loaded the way a desktop app loads settings: a struct with sane
//! `Default`s, optionally overlaid from a TOML file. Durations are expressed here as plain millisecond fields
//! so the file format stays human-writable; conversion into each engine's
//! native `Duration`-based config happens in the `*_config()` accessors.

mod error;

pub use error::ConfigError;

use relay_dispatch::{DispatchConfig, DuplicateGuardConfig, PartialDispatchConfig};
use relay_finalize::FinalizeConfig;
use relay_forced::ForcedConfig;
use relay_recovery::RecoveryConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FinalizeSettings {
    pub max_finalization_wait_ms: u64,
    pub base_wait_ms: u64,
    pub long_text_threshold: usize,
    pub long_text_wait_ms: u64,
    pub very_long_text_threshold: usize,
    pub very_long_text_extra_ms_per_char: f64,
    pub false_final_wait_ms: u64,
    pub final_continuation_window_ms: u64,
    pub reschedule_cap_ms: u64,
}

impl Default for FinalizeSettings {
    fn default() -> Self {
        let d = FinalizeConfig::default();
        Self {
            max_finalization_wait_ms: d.max_finalization_wait.as_millis() as u64,
            base_wait_ms: d.base_wait.as_millis() as u64,
            long_text_threshold: d.long_text_threshold,
            long_text_wait_ms: d.long_text_wait.as_millis() as u64,
            very_long_text_threshold: d.very_long_text_threshold,
            very_long_text_extra_ms_per_char: d.very_long_text_extra_ms_per_char,
            false_final_wait_ms: d.false_final_wait.as_millis() as u64,
            final_continuation_window_ms: d.final_continuation_window.as_millis() as u64,
            reschedule_cap_ms: d.reschedule_cap.as_millis() as u64,
        }
    }
}

impl FinalizeSettings {
    fn into_engine(self) -> FinalizeConfig {
        FinalizeConfig {
            max_finalization_wait: ms(self.max_finalization_wait_ms),
            base_wait: ms(self.base_wait_ms),
            long_text_threshold: self.long_text_threshold,
            long_text_wait: ms(self.long_text_wait_ms),
            very_long_text_threshold: self.very_long_text_threshold,
            very_long_text_extra_ms_per_char: self.very_long_text_extra_ms_per_char,
            false_final_wait: ms(self.false_final_wait_ms),
            final_continuation_window: ms(self.final_continuation_window_ms),
            reschedule_cap: ms(self.reschedule_cap_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForcedSettings {
    pub phase2_delay_ms: u64,
    pub pre_final_capture_ms: u64,
    pub post_final_capture_cap_ms: u64,
    pub partial_extends_max_age_ms: u64,
}

impl Default for ForcedSettings {
    fn default() -> Self {
        let d = ForcedConfig::default();
        Self {
            phase2_delay_ms: d.phase2_delay.as_millis() as u64,
            pre_final_capture_ms: d.pre_final_capture.as_millis() as u64,
            post_final_capture_cap_ms: d.post_final_capture_cap.as_millis() as u64,
            partial_extends_max_age_ms: d.partial_extends_max_age.as_millis() as u64,
        }
    }
}

impl ForcedSettings {
    fn into_engine(self) -> ForcedConfig {
        ForcedConfig {
            phase2_delay: ms(self.phase2_delay_ms),
            pre_final_capture: ms(self.pre_final_capture_ms),
            post_final_capture_cap: ms(self.post_final_capture_cap_ms),
            partial_extends_max_age: ms(self.partial_extends_max_age_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub ready_poll_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub collect_timeout_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let d = RecoveryConfig::default();
        Self {
            ready_poll_interval_ms: d.ready_poll_interval.as_millis() as u64,
            ready_timeout_ms: d.ready_timeout.as_millis() as u64,
            collect_timeout_ms: d.collect_timeout.as_millis() as u64,
        }
    }
}

impl RecoverySettings {
    fn into_engine(self) -> RecoveryConfig {
        RecoveryConfig {
            ready_poll_interval: ms(self.ready_poll_interval_ms),
            ready_timeout: ms(self.ready_timeout_ms),
            collect_timeout: ms(self.collect_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DuplicateGuardSettings {
    pub exact_window_ms: u64,
    pub forced_window_ms: u64,
    pub forced_prefix_len: usize,
    pub forced_overlap_ratio: f32,
    pub forced_max_diff: usize,
    pub continuation_catch_window_ms: u64,
    pub continuation_overlap_ratio: f32,
    pub continuation_max_diff: usize,
    pub late_overlap_ratio: f32,
    pub late_max_diff: usize,
}

impl Default for DuplicateGuardSettings {
    fn default() -> Self {
        let d = DuplicateGuardConfig::default();
        Self {
            exact_window_ms: d.exact_window.as_millis() as u64,
            forced_window_ms: d.forced_window.as_millis() as u64,
            forced_prefix_len: d.forced_prefix_len,
            forced_overlap_ratio: d.forced_overlap_ratio,
            forced_max_diff: d.forced_max_diff,
            continuation_catch_window_ms: d.continuation_catch_window.as_millis() as u64,
            continuation_overlap_ratio: d.continuation_overlap_ratio,
            continuation_max_diff: d.continuation_max_diff,
            late_overlap_ratio: d.late_overlap_ratio,
            late_max_diff: d.late_max_diff,
        }
    }
}

impl DuplicateGuardSettings {
    fn into_engine(self) -> DuplicateGuardConfig {
        DuplicateGuardConfig {
            exact_window: ms(self.exact_window_ms),
            forced_window: ms(self.forced_window_ms),
            forced_prefix_len: self.forced_prefix_len,
            forced_overlap_ratio: self.forced_overlap_ratio,
            forced_max_diff: self.forced_max_diff,
            continuation_catch_window: ms(self.continuation_catch_window_ms),
            continuation_overlap_ratio: self.continuation_overlap_ratio,
            continuation_max_diff: self.continuation_max_diff,
            late_overlap_ratio: self.late_overlap_ratio,
            late_max_diff: self.late_max_diff,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub duplicate_guard: DuplicateGuardSettings,
    pub grammar_timeout_ms: u64,
    pub cross_segment_dedup_max_check: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let d = DispatchConfig::default();
        Self {
            duplicate_guard: DuplicateGuardSettings::default(),
            grammar_timeout_ms: d.grammar_timeout.as_millis() as u64,
            cross_segment_dedup_max_check: d.cross_segment_dedup_max_check,
        }
    }
}

impl DispatchSettings {
    fn into_engine(self) -> DispatchConfig {
        DispatchConfig {
            duplicate_guard: self.duplicate_guard.into_engine(),
            grammar_timeout: ms(self.grammar_timeout_ms),
            cross_segment_dedup_max_check: self.cross_segment_dedup_max_check,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartialDispatchSettings {
    pub min_growth_chars: usize,
    pub min_growth_interval_ms: u64,
    pub short_segment_start_delay_ms: u64,
    pub short_segment_start_max_len: usize,
    pub dedup_trailing_words: usize,
}

impl Default for PartialDispatchSettings {
    fn default() -> Self {
        let d = PartialDispatchConfig::default();
        Self {
            min_growth_chars: d.min_growth_chars,
            min_growth_interval_ms: d.min_growth_interval.as_millis() as u64,
            short_segment_start_delay_ms: d.short_segment_start_delay.as_millis() as u64,
            short_segment_start_max_len: d.short_segment_start_max_len,
            dedup_trailing_words: d.dedup_trailing_words,
        }
    }
}

impl PartialDispatchSettings {
    fn into_engine(self) -> PartialDispatchConfig {
        PartialDispatchConfig {
            min_growth_chars: self.min_growth_chars,
            min_growth_interval: ms(self.min_growth_interval_ms),
            short_segment_start_delay: ms(self.short_segment_start_delay_ms),
            short_segment_start_max_len: self.short_segment_start_max_len,
            dedup_trailing_words: self.dedup_trailing_words,
        }
    }
}

/// Gateway bind address and per-session defaults, since §6 leaves the
/// transport surface to the implementer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub bind_addr: String,
    pub default_target_langs: Vec<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:8787".to_string(), default_target_langs: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub finalize: FinalizeSettings,
    pub forced: ForcedSettings,
    pub recovery: RecoverySettings,
    pub dispatch: DispatchSettings,
    pub partial_dispatch: PartialDispatchSettings,
    pub gateway: GatewaySettings,
    pub logging: LoggingSettings,
}

impl RelayConfig {
    /// Load from a TOML file, falling back to defaults for any section or
    /// field the file omits. A missing file is not an error: it just means
    /// every setting takes its default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    pub fn finalize_config(&self) -> FinalizeConfig {
        self.finalize.clone().into_engine()
    }

    pub fn forced_config(&self) -> ForcedConfig {
        self.forced.clone().into_engine()
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        self.recovery.clone().into_engine()
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        self.dispatch.clone().into_engine()
    }

    pub fn partial_dispatch_config(&self) -> PartialDispatchConfig {
        self.partial_dispatch.clone().into_engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_into_engine_configs() {
        let config = RelayConfig::default();
        assert_eq!(config.finalize_config().base_wait, Duration::from_millis(1000));
        assert_eq!(config.forced_config().phase2_delay, Duration::from_millis(1200));
        assert_eq!(config.recovery_config().ready_timeout, Duration::from_millis(1500));
        assert_eq!(config.dispatch_config().grammar_timeout, Duration::from_millis(2000));
        assert_eq!(config.partial_dispatch_config().short_segment_start_max_len, 15);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RelayConfig::load("/nonexistent/path/relay.toml").unwrap();
        assert_eq!(config.gateway.bind_addr, "127.0.0.1:8787");
    }

    #[test]
    fn partial_overlay_only_overrides_named_fields() {
        let toml_text = r#"
            [finalize]
            base_wait_ms = 1500

            [gateway]
            bind_addr = "0.0.0.0:9000"
        "#;
        let config: RelayConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.finalize.base_wait_ms, 1500);
        assert_eq!(config.finalize.max_finalization_wait_ms, 8000);
        assert_eq!(config.gateway.bind_addr, "0.0.0.0:9000");
    }
}
