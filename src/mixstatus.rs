//! Mix-status processor (spec.md §4.4, second half): turns a stream of
//! [`DeckState`] snapshots into the higher-level events a lighting rig or
//! streaming overlay actually wants — `setStarted`, `nowPlaying`, `stopped`,
//! `setEnded`.
//!
//! The tricky part is `setEnded`: it fires only after a quiet period with no
//! deck both playing and on-air, but a deck starting up again must cancel
//! that countdown. This is shaped the same way as `mpd_client.rs`'s idle
//! loop — race the next status message against the pending timer instead of
//! spawning and aborting a separate task per rearm.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::FutureExt;
use futures_concurrency::prelude::*;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{MixstatusConfig, MixstatusMode};
use crate::model::{DeckState, PlayState};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum MixstatusEvent {
    SetStarted,
    NowPlaying(DeckState),
    Stopped { device_id: u8 },
    SetEnded,
}

fn effective_on_air(config: &MixstatusConfig, state: &DeckState) -> bool {
    !config.has_on_air_capabilities || state.is_on_air
}

/// Seconds per beat at `bpm` adjusted by `pitch` percent (spec.md §4.4).
fn seconds_per_beat(bpm: f32, pitch: f32) -> f64 {
    60.0 / (bpm as f64 * (1.0 + pitch as f64 / 100.0))
}

/// A deck with no known BPM can't have its beat count converted to wall
/// time; treat the threshold as unreachable rather than divide by zero.
fn beats_to_duration(beats: u32, bpm: f32, pitch: f32) -> Duration {
    if bpm <= 0.0 {
        return Duration::MAX;
    }
    let seconds = seconds_per_beat(bpm, pitch) * beats as f64;
    if !seconds.is_finite() || seconds < 0.0 {
        return Duration::MAX;
    }
    Duration::from_secs_f64(seconds)
}

struct PerDeviceState {
    last: DeckState,
    /// Set when the deck starts continuous on-air playback; cleared the
    /// instant it stops, so the duration since this timestamp is exactly
    /// "how long has it been playing without interruption."
    playing_since: Option<Instant>,
    /// Set when a *live* deck drops out of playing+on-air; cleared on
    /// resumption or once the deck is demoted.
    may_stop_since: Option<Instant>,
}

impl PerDeviceState {
    fn new(state: DeckState) -> Self {
        Self { last: state, playing_since: None, may_stop_since: None }
    }
}

/// Drives the state machine described in spec.md §4.4. One instance per
/// Prolink network; feed it every [`DeckState`] as it arrives and drain
/// [`MixstatusEvent`]s from the channel passed to [`MixstatusProcessor::run`].
pub struct MixstatusProcessor {
    config: MixstatusConfig,
    per_device: HashMap<u8, PerDeviceState>,
    live: HashSet<u8>,
    is_set_active: bool,
    pending_set_end: Option<Instant>,
}

impl MixstatusProcessor {
    pub fn new(config: MixstatusConfig) -> Self {
        Self {
            config,
            per_device: HashMap::new(),
            live: HashSet::new(),
            is_set_active: false,
            pending_set_end: None,
        }
    }

    /// Consumes `status_rx` until it closes, emitting events to `events_tx`.
    /// Intended to run as its own task for the life of the connection to the
    /// network.
    pub async fn run(
        &mut self,
        mut status_rx: mpsc::Receiver<DeckState>,
        events_tx: mpsc::Sender<MixstatusEvent>,
    ) {
        enum Next {
            Status(Option<DeckState>),
            SetEndTimerFired,
        }

        loop {
            let next_status = status_rx.recv().map(Next::Status);

            let next = match self.pending_set_end {
                Some(deadline) => {
                    let timer = tokio::time::sleep_until(deadline).map(|()| Next::SetEndTimerFired);
                    (next_status, timer).race().await
                }
                None => next_status.await,
            };

            match next {
                Next::Status(Some(state)) => {
                    let mut events = Vec::new();
                    self.ingest(state, Instant::now(), &mut events);
                    for event in events {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Next::Status(None) => return,
                Next::SetEndTimerFired => {
                    if self.fire_set_end_if_due(Instant::now()) {
                        if events_tx.send(MixstatusEvent::SetEnded).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Synchronous core of the state machine, split out so tests don't need
    /// an executor to exercise promotion/demotion logic.
    fn ingest(&mut self, state: DeckState, now: Instant, events: &mut Vec<MixstatusEvent>) {
        let device_id = state.device_id;
        let is_on_air = effective_on_air(&self.config, &state);
        let is_playing_on_air = state.play_state.is_playing() && is_on_air;

        let was_playing_on_air = self
            .per_device
            .get(&device_id)
            .map(|entry| entry.last.play_state.is_playing() && effective_on_air(&self.config, &entry.last))
            .unwrap_or(false);

        let entry = self
            .per_device
            .entry(device_id)
            .or_insert_with(|| PerDeviceState::new(state.clone()));
        entry.last = state.clone();

        if is_playing_on_air {
            if !was_playing_on_air {
                entry.playing_since = Some(now);
            }
            entry.may_stop_since = None;
        } else {
            if was_playing_on_air {
                entry.may_stop_since = Some(now);
            }
            entry.playing_since = None;
        }

        if self.live.contains(&device_id) {
            self.maybe_demote(device_id, &state, now, events);
        }

        match self.config.mode {
            MixstatusMode::FollowsMaster => self.ingest_follows_master(&state, events),
            MixstatusMode::SmartTiming | MixstatusMode::WaitsForSilence => {
                self.ingest_smart_timing(device_id, &state, now, events)
            }
        }

        self.recompute_set_end(now);
    }

    fn ingest_follows_master(&mut self, state: &DeckState, events: &mut Vec<MixstatusEvent>) {
        if state.is_master && !self.live.contains(&state.device_id) {
            self.promote(state.clone(), events);
        }
    }

    fn ingest_smart_timing(
        &mut self,
        device_id: u8,
        state: &DeckState,
        now: Instant,
        events: &mut Vec<MixstatusEvent>,
    ) {
        let is_on_air = effective_on_air(&self.config, state);
        if !(state.play_state.is_playing() && is_on_air) || self.live.contains(&device_id) {
            return;
        }

        let any_other_live_playing_on_air = self.live.iter().any(|id| {
            *id != device_id
                && self
                    .per_device
                    .get(id)
                    .map(|entry| entry.last.play_state.is_playing() && effective_on_air(&self.config, &entry.last))
                    .unwrap_or(false)
        });

        // (iii): first device to start playing on-air with nothing else live.
        if !any_other_live_playing_on_air {
            self.promote(state.clone(), events);
            return;
        }

        if self.config.mode == MixstatusMode::WaitsForSilence {
            // WaitsForSilence never promotes over a deck that's still live.
            return;
        }

        // (i): continuous play-time threshold, optionally requiring silence.
        let required = beats_to_duration(self.config.beats_until_reported, state.track_bpm.unwrap_or(0.0), state.effective_pitch);
        let continuously_playing_long_enough = self
            .per_device
            .get(&device_id)
            .and_then(|entry| entry.playing_since)
            .is_some_and(|since| now.duration_since(since) >= required);

        if continuously_playing_long_enough
            && (!self.config.report_requires_silence || !any_other_live_playing_on_air)
        {
            self.promote(state.clone(), events);
        }
    }

    /// (ii) from spec.md §4.4: once a live deck is demoted, the longest
    /// continuously-playing on-air candidate inherits its spot immediately,
    /// bypassing the beats-until-reported threshold. Only applies to
    /// `SmartTiming` — `WaitsForSilence` always waits out the full threshold.
    fn promote_next_candidate(&mut self, now: Instant, events: &mut Vec<MixstatusEvent>) {
        if self.config.mode != MixstatusMode::SmartTiming {
            return;
        }
        let best = self
            .per_device
            .iter()
            .filter(|(id, entry)| {
                !self.live.contains(*id)
                    && entry.last.play_state.is_playing()
                    && effective_on_air(&self.config, &entry.last)
                    && entry.playing_since.is_some()
            })
            .min_by_key(|(_, entry)| entry.playing_since.unwrap())
            .map(|(id, entry)| (*id, entry.last.clone()));

        if let Some((_, state)) = best {
            let _ = now;
            self.promote(state, events);
        }
    }

    fn maybe_demote(&mut self, device_id: u8, state: &DeckState, now: Instant, events: &mut Vec<MixstatusEvent>) {
        let hard_stop = matches!(state.play_state, PlayState::Cued | PlayState::Ended | PlayState::Loading);
        let is_playing_on_air = state.play_state.is_playing() && effective_on_air(&self.config, state);

        let interrupt_expired = self
            .per_device
            .get(&device_id)
            .and_then(|entry| entry.may_stop_since)
            .is_some_and(|since| {
                let required = beats_to_duration(
                    self.config.allowed_interrupt_beats,
                    state.track_bpm.unwrap_or(0.0),
                    state.effective_pitch,
                );
                now.duration_since(since) >= required
            });

        if hard_stop || (!is_playing_on_air && interrupt_expired) {
            self.demote(device_id, now, events);
        }
    }

    fn promote(&mut self, state: DeckState, events: &mut Vec<MixstatusEvent>) {
        let device_id = state.device_id;
        self.live.insert(device_id);
        if !self.is_set_active {
            self.is_set_active = true;
            events.push(MixstatusEvent::SetStarted);
        }
        events.push(MixstatusEvent::NowPlaying(state));
    }

    fn demote(&mut self, device_id: u8, now: Instant, events: &mut Vec<MixstatusEvent>) {
        self.live.remove(&device_id);
        if let Some(entry) = self.per_device.get_mut(&device_id) {
            entry.playing_since = None;
            entry.may_stop_since = None;
        }
        events.push(MixstatusEvent::Stopped { device_id });
        self.promote_next_candidate(now, events);
    }

    fn any_live_playing_on_air(&self) -> bool {
        self.live.iter().any(|id| {
            self.per_device
                .get(id)
                .map(|entry| entry.last.play_state.is_playing() && effective_on_air(&self.config, &entry.last))
                .unwrap_or(false)
        })
    }

    fn recompute_set_end(&mut self, now: Instant) {
        let any_active = self.any_live_playing_on_air();
        if self.is_set_active && !any_active {
            if self.pending_set_end.is_none() {
                self.pending_set_end = Some(now + self.config.time_between_sets);
            }
        } else {
            self.pending_set_end = None;
        }
    }

    fn fire_set_end_if_due(&mut self, now: Instant) -> bool {
        let Some(deadline) = self.pending_set_end else { return false };
        if now < deadline || self.any_live_playing_on_air() {
            return false;
        }
        self.pending_set_end = None;
        self.is_set_active = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SlotTag, TrackType};

    fn deck(device_id: u8, play_state: PlayState, bpm: f32) -> DeckState {
        DeckState {
            device_id,
            track_id: 1,
            source_device_id: device_id,
            source_slot: SlotTag::Usb,
            source_track_type: TrackType::Rb,
            play_state,
            is_on_air: true,
            is_sync: false,
            is_master: false,
            is_emergency_mode: false,
            track_bpm: Some(bpm),
            slider_pitch: 0.0,
            effective_pitch: 0.0,
            beat_in_measure: 1,
            beats_until_cue: None,
            beat: 0,
            packet_num: 1,
        }
    }

    #[test]
    fn first_device_to_play_is_promoted_immediately() {
        let mut processor = MixstatusProcessor::new(MixstatusConfig::default());
        let mut events = Vec::new();
        processor.ingest(deck(1, PlayState::Playing, 128.0), Instant::now(), &mut events);
        assert_eq!(events, vec![
            MixstatusEvent::SetStarted,
            MixstatusEvent::NowPlaying(deck(1, PlayState::Playing, 128.0)),
        ]);
        assert!(processor.live.contains(&1));
    }

    #[test]
    fn second_device_does_not_promote_until_threshold() {
        let mut processor = MixstatusProcessor::new(MixstatusConfig::default());
        let mut events = Vec::new();
        let now = Instant::now();
        processor.ingest(deck(1, PlayState::Playing, 128.0), now, &mut events);
        events.clear();
        processor.ingest(deck(2, PlayState::Playing, 128.0), now, &mut events);
        assert!(events.is_empty());
        assert!(!processor.live.contains(&2));
    }

    #[test]
    fn hard_stop_demotes_and_promotes_next_candidate() {
        let mut processor = MixstatusProcessor::new(MixstatusConfig::default());
        let mut events = Vec::new();
        let now = Instant::now();

        processor.ingest(deck(1, PlayState::Playing, 128.0), now, &mut events);
        events.clear();
        processor.ingest(deck(2, PlayState::Playing, 128.0), now, &mut events);
        events.clear();

        // device 2 has been continuously playing since `now`; once device 1
        // hard-stops it should be handed the live slot without waiting out
        // beats_until_reported.
        let later = now + Duration::from_millis(1);
        processor.ingest(deck(1, PlayState::Cued, 128.0), later, &mut events);

        assert_eq!(events, vec![
            MixstatusEvent::Stopped { device_id: 1 },
            MixstatusEvent::NowPlaying(deck(2, PlayState::Playing, 128.0)),
        ]);
        assert!(processor.live.contains(&2));
        assert!(!processor.live.contains(&1));
    }

    #[test]
    fn set_end_fires_only_once_quiescent() {
        let mut config = MixstatusConfig::default();
        config.time_between_sets = Duration::from_millis(10);
        let mut processor = MixstatusProcessor::new(config);
        let mut events = Vec::new();
        let now = Instant::now();

        processor.ingest(deck(1, PlayState::Playing, 128.0), now, &mut events);
        events.clear();
        processor.ingest(deck(1, PlayState::Cued, 128.0), now, &mut events);
        events.clear();

        assert!(processor.pending_set_end.is_some());
        assert!(!processor.fire_set_end_if_due(now));
        assert!(processor.fire_set_end_if_due(now + Duration::from_millis(20)));
        assert!(!processor.is_set_active);
    }

    #[test]
    fn resuming_play_cancels_pending_set_end() {
        let mut config = MixstatusConfig::default();
        config.time_between_sets = Duration::from_millis(10);
        let mut processor = MixstatusProcessor::new(config);
        let mut events = Vec::new();
        let now = Instant::now();

        processor.ingest(deck(1, PlayState::Playing, 128.0), now, &mut events);
        events.clear();
        processor.ingest(deck(1, PlayState::Cued, 128.0), now, &mut events);
        assert!(processor.pending_set_end.is_some());
        events.clear();

        processor.ingest(deck(1, PlayState::Playing, 128.0), now, &mut events);
        assert!(processor.pending_set_end.is_none());
    }

    #[test]
    fn follows_master_mode_ignores_play_state() {
        let config = MixstatusConfig { mode: MixstatusMode::FollowsMaster, ..MixstatusConfig::default() };
        let mut processor = MixstatusProcessor::new(config);
        let mut events = Vec::new();
        let now = Instant::now();

        let mut master = deck(1, PlayState::Paused, 128.0);
        master.is_master = true;
        processor.ingest(master, now, &mut events);

        assert!(processor.live.contains(&1));
        assert!(matches!(events.as_slice(), [MixstatusEvent::SetStarted, MixstatusEvent::NowPlaying(_)]));
    }

    #[tokio::test]
    async fn run_emits_set_ended_after_quiet_period() {
        let mut config = MixstatusConfig::default();
        config.time_between_sets = Duration::from_millis(20);
        let mut processor = MixstatusProcessor::new(config);

        let (status_tx, status_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move { processor.run(status_rx, events_tx).await });

        status_tx.send(deck(1, PlayState::Playing, 128.0)).await.unwrap();
        assert_eq!(events_rx.recv().await.unwrap(), MixstatusEvent::SetStarted);
        assert!(matches!(events_rx.recv().await.unwrap(), MixstatusEvent::NowPlaying(_)));

        status_tx.send(deck(1, PlayState::Cued, 128.0)).await.unwrap();
        assert_eq!(events_rx.recv().await.unwrap(), MixstatusEvent::Stopped { device_id: 1 });
        assert_eq!(events_rx.recv().await.unwrap(), MixstatusEvent::SetEnded);

        drop(status_tx);
        handle.await.unwrap();
    }
}
