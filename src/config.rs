//! Typed shape of the options table in spec.md §6.
//!
//! Loading these values from a file, environment, or CLI is explicitly out
//! of scope (spec.md §1) — an embedding application builds a [`Config`] and
//! hands it to the components below. Every field has the default the spec
//! calls out; `Config::default()` reproduces them.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Mix-status promotion strategy (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum MixstatusMode {
    #[default]
    SmartTiming,
    WaitsForSilence,
    FollowsMaster,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MixstatusConfig {
    /// Beats a live deck may spend off-air/paused/cued before it is demoted.
    pub allowed_interrupt_beats: u32,
    /// Consecutive on-air playing beats (at the deck's own tempo) required
    /// to promote a deck that isn't simply inheriting from a demoted one.
    pub beats_until_reported: u32,
    /// Silence required, with no deck both playing and on-air, before
    /// `setEnded` fires.
    pub time_between_sets: Duration,
    /// Whether `isOnAir` should be trusted. When false, it's treated as
    /// always true (some mixers don't report it).
    pub has_on_air_capabilities: bool,
    /// Require the rest of the live set to fall silent in addition to the
    /// beat threshold before promoting on the beats-until-reported path.
    pub report_requires_silence: bool,
    pub mode: MixstatusMode,
}

impl Default for MixstatusConfig {
    fn default() -> Self {
        Self {
            allowed_interrupt_beats: 8,
            beats_until_reported: 128,
            time_between_sets: Duration::from_secs(30),
            has_on_air_capabilities: true,
            report_requires_silence: false,
            mode: MixstatusMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NfsRetryConfig {
    pub attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on additional random delay added to each retry.
    pub jitter: Duration,
}

impl Default for NfsRetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// IPv4 interface to announce from. Required to connect to the network;
    /// `None` is only a valid value before the embedder has chosen one.
    pub interface: Option<Ipv4Addr>,
    /// Host id in 1..127. 1..=6 lets other players' remote database answer
    /// metadata queries for unanalyzed/CD media, but occupies a physical
    /// player slot.
    pub vcdj_id: u8,
    /// Liveness window for announces (spec.md §4.2 default: 10s).
    pub device_timeout: Duration,
    pub mixstatus: MixstatusConfig,
    pub nfs_retry: NfsRetryConfig,
}

pub const DEFAULT_VCDJ_ID: u8 = 7;

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            vcdj_id: DEFAULT_VCDJ_ID,
            device_timeout: Duration::from_secs(10),
            mixstatus: MixstatusConfig::default(),
            nfs_retry: NfsRetryConfig::default(),
        }
    }
}

impl Config {
    /// Whether this host's vcdj id lets it request metadata for unanalyzed
    /// or audio-CD media from other players' remote database (spec.md §4.3,
    /// §4.8).
    pub fn vcdj_has_metadata_capability(&self) -> bool {
        (1..=6).contains(&self.vcdj_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vcdj_id_lacks_metadata_capability() {
        assert!(!Config::default().vcdj_has_metadata_capability());
    }

    #[test]
    fn vcdj_id_in_player_range_has_metadata_capability() {
        let config = Config {
            vcdj_id: 3,
            ..Config::default()
        };
        assert!(config.vcdj_has_metadata_capability());
    }
}
