//! Shared data model (spec.md §3): the types every subsystem either
//! produces (announce/status) or resolves against (remote/local database).

use std::net::Ipv4Addr;
use std::time::Duration;

use camino::Utf8PathBuf;
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// A node on the Prolink network. `id` is unique within the live set
/// (device.rs owns that invariant); 1..=6 is the reserved player range, 7+
/// are observer ids.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Device {
    pub id: u8,
    pub name: String,
    pub device_type: DeviceType,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, serde::Serialize)]
pub enum DeviceType {
    Cdj,
    Mixer,
    Rekordbox,
}

impl DeviceType {
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(DeviceType::Cdj),
            0x03 => Some(DeviceType::Mixer),
            0x04 => Some(DeviceType::Rekordbox),
            _ => None,
        }
    }

    pub const fn to_wire(self) -> u8 {
        match self {
            DeviceType::Cdj => 0x01,
            DeviceType::Mixer => 0x03,
            DeviceType::Rekordbox => 0x04,
        }
    }
}

/// Which physical (or virtual) media slot a track/database lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, serde::Serialize)]
pub enum SlotTag {
    Empty,
    Cd,
    Sd,
    Usb,
    Rb,
}

impl SlotTag {
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SlotTag::Empty),
            0x01 => Some(SlotTag::Cd),
            0x02 => Some(SlotTag::Sd),
            0x03 => Some(SlotTag::Usb),
            0x04 => Some(SlotTag::Rb),
            _ => None,
        }
    }

    pub const fn to_wire(self) -> u8 {
        match self {
            SlotTag::Empty => 0x00,
            SlotTag::Cd => 0x01,
            SlotTag::Sd => 0x02,
            SlotTag::Usb => 0x03,
            SlotTag::Rb => 0x04,
        }
    }

    /// NFS export path mounted for this slot (spec.md §4.6); `None` for
    /// slots that aren't backed by an NFS-exported rekordbox database.
    pub const fn nfs_export_path(self) -> Option<&'static str> {
        match self {
            SlotTag::Usb => Some("/C/"),
            SlotTag::Sd => Some("/B/"),
            SlotTag::Rb => Some("/"),
            SlotTag::Empty | SlotTag::Cd => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, serde::Serialize)]
pub enum TrackType {
    None,
    Rb,
    Unanalyzed,
    AudioCd,
}

impl TrackType {
    pub const fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(TrackType::None),
            0x01 => Some(TrackType::Rb),
            0x02 => Some(TrackType::Unanalyzed),
            0x05 => Some(TrackType::AudioCd),
            _ => None,
        }
    }

    pub const fn to_wire_byte(self) -> u8 {
        match self {
            TrackType::None => 0x00,
            TrackType::Rb => 0x01,
            TrackType::Unanalyzed => 0x02,
            TrackType::AudioCd => 0x05,
        }
    }
}

/// Per-slot media descriptor, queried on demand over the status socket
/// (spec.md §6 "Media-slot query packet"). Transient: request/response only,
/// but its fields feed [`Fingerprint::compute`] for local database caching.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MediaSlotInfo {
    pub device_id: u8,
    pub slot: SlotTag,
    pub name: String,
    pub created_date: Option<jiff::civil::Date>,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub track_count: u16,
    pub playlist_count: u16,
    pub track_type: TrackType,
    pub has_settings: bool,
    /// Rekordbox's cosmetic drive-color label, if the device set one.
    pub color: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default, serde::Serialize)]
pub enum PlayState {
    #[default]
    Empty,
    Loading,
    Playing,
    Looping,
    Paused,
    Cued,
    Cuing,
    PlatterHeld,
    Searching,
    SpunDown,
    Ended,
}

impl PlayState {
    /// Whether the deck is actively moving through the track (used by the
    /// mix-status processor to tell "playing" apart from "stopped, cued,
    /// or scrubbing").
    pub const fn is_playing(self) -> bool {
        matches!(self, PlayState::Playing | PlayState::Looping)
    }
}

/// A snapshot extracted from one status datagram (spec.md §3, §4.4).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeckState {
    pub device_id: u8,
    pub track_id: u32,
    pub source_device_id: u8,
    pub source_slot: SlotTag,
    pub source_track_type: TrackType,
    pub play_state: PlayState,
    pub is_on_air: bool,
    pub is_sync: bool,
    pub is_master: bool,
    pub is_emergency_mode: bool,
    pub track_bpm: Option<f32>,
    pub slider_pitch: f32,
    pub effective_pitch: f32,
    /// 1..=4, or 0 when unknown.
    pub beat_in_measure: u8,
    /// `None` when the deck isn't playing — spec.md §3 calls this "unknown"
    /// rather than a sentinel value (see spec.md §9 open question).
    pub beats_until_cue: Option<u32>,
    pub beat: u32,
    /// Strictly increasing per device (spec.md §3 invariant).
    pub packet_num: u32,
}

/// Decode the 24-bit signed-about-`0x100000` pitch encoding into a percent
/// value (spec.md §4.4): 0 at `0x100000`, -100 at `0x000000`, +100 at
/// `0x200000`. Rounded to 2 decimal places, as the spec's S2 invariant
/// requires for monotonicity to be testable against fixed points.
pub fn decode_pitch(raw_24bit: u32) -> f32 {
    let value = (raw_24bit as f64 - 0x0010_0000 as f64) / 0x0010_0000 as f64 * 100.0;
    (value * 100.0).round() / 100.0
}

/// Unified track entity (spec.md §3). When sourced from the local database
/// the hydrator owns row memory and returns a value copy; when sourced from
/// the remote database the caller owns the returned struct either way — so
/// there is exactly one `Track` shape regardless of strategy.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct Track {
    pub id: u32,
    pub title: String,
    pub duration: Duration,
    pub bitrate: Option<u32>,
    pub tempo: Option<f32>,
    /// 0..=5.
    pub rating: u8,
    pub comment: String,
    pub file_path: Utf8PathBuf,
    pub file_name: String,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub sample_rate: Option<u32>,
    pub sample_depth: Option<u32>,
    pub play_count: Option<u32>,
    pub year: Option<u32>,
    pub mix_name: String,
    pub autoload_hotcues: bool,
    pub kuvo_public: bool,
    pub file_size: Option<u64>,
    /// Analysis file path without extension — `.DAT`/`.EXT` is appended at
    /// hydration time (spec.md §4.7).
    pub analyze_path: Option<Utf8PathBuf>,
    pub release_date: Option<jiff::civil::Date>,
    pub analyze_date: Option<jiff::civil::Date>,
    pub date_added: Option<jiff::civil::Date>,
    pub artist: Option<Artist>,
    pub original_artist: Option<Artist>,
    pub remixer: Option<Artist>,
    pub composer: Option<Artist>,
    pub album: Option<Album>,
    pub label: Option<Label>,
    pub genre: Option<Genre>,
    pub color: Option<Color>,
    pub key: Option<Key>,
    pub artwork: Option<Artwork>,
    /// Lazily filled by `hydrate_anlz`/`GetBeatGrid`.
    pub beat_grid: Option<BeatGrid>,
    /// Lazily filled by `hydrate_anlz`/`GetCueAndLoops`.
    pub cue_and_loops: Vec<CueAndLoop>,
    /// Lazily filled by `GetWaveformHD` (no local-database analogue — HD
    /// waveforms are a remote-database-only query in spec.md §4.5).
    pub waveform_hd: Option<Waveform>,
}

macro_rules! named_entity {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
        pub struct $name {
            pub id: u32,
            pub name: String,
        }
    };
}

named_entity!(Artist);
named_entity!(Album);
named_entity!(Genre);
named_entity!(Label);
named_entity!(Color);
named_entity!(Key);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Artwork {
    pub id: u32,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Playlist {
    pub id: u32,
    pub is_folder: bool,
    pub name: String,
    /// `None` means this playlist/folder is at the root.
    pub parent_id: Option<u32>,
}

/// Invariant: `sort_index` is dense within a playlist (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PlaylistEntry {
    pub id: u32,
    pub sort_index: u32,
    pub playlist_id: u32,
    pub track_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BeatGridEntry {
    pub offset: Duration,
    /// 1..=4.
    pub count_in_bar: u8,
    pub bpm: f32,
}

/// Ordered sequence of beat timestamps. Invariant: offsets strictly ascend
/// (spec.md §3) — [`BeatGrid::new`] is the only constructor and enforces it.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct BeatGrid(Vec<BeatGridEntry>);

impl BeatGrid {
    /// Returns `None` if `entries` isn't strictly ascending by offset.
    pub fn new(entries: Vec<BeatGridEntry>) -> Option<Self> {
        let ascending = entries
            .windows(2)
            .all(|pair| pair[0].offset < pair[1].offset);
        ascending.then_some(Self(entries))
    }

    pub fn entries(&self) -> &[BeatGridEntry] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, serde::Serialize)]
pub enum HotCueButton {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl HotCueButton {
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::A),
            2 => Some(Self::B),
            3 => Some(Self::C),
            4 => Some(Self::D),
            5 => Some(Self::E),
            6 => Some(Self::F),
            7 => Some(Self::G),
            8 => Some(Self::H),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum CueAndLoop {
    CuePoint { offset: Duration },
    Loop { offset: Duration, length: Duration },
    HotCue { offset: Duration, button: HotCueButton },
    HotLoop { offset: Duration, length: Duration, button: HotCueButton },
}

impl CueAndLoop {
    /// Decision table from spec.md §3: a button assigns `hot_loop` if
    /// `is_loop` else `hot_cue`; with no button, `loop` if `is_loop`,
    /// `cue_point` if `is_cue`, else nothing at all.
    pub fn from_raw(
        is_cue: bool,
        is_loop: bool,
        button: Option<HotCueButton>,
        offset: Duration,
        length: Option<Duration>,
    ) -> Option<Self> {
        match (button, is_loop, is_cue) {
            (Some(button), true, _) => Some(Self::HotLoop {
                offset,
                length: length.unwrap_or_default(),
                button,
            }),
            (Some(button), false, _) => Some(Self::HotCue { offset, button }),
            (None, true, _) => Some(Self::Loop {
                offset,
                length: length.unwrap_or_default(),
            }),
            (None, false, true) => Some(Self::CuePoint { offset }),
            (None, false, false) => None,
        }
    }
}

/// Shared per-segment shape for preview and detailed waveforms (spec.md §3):
/// only the segment density and count differ between the two.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct WaveformSegment {
    /// 0..=31.
    pub height: u8,
    /// 0.0..=1.0.
    pub whiteness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct WaveformHdSegment {
    pub height: u8,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Waveform {
    /// Always exactly 400 segments.
    Preview(Vec<WaveformSegment>),
    /// 150 segments per second of track.
    Detailed(Vec<WaveformSegment>),
    /// 150 segments per second of track, colored.
    Hd(Vec<WaveformHdSegment>),
}

/// SHA-256 hex fingerprint of a media descriptor (spec.md §3): any change to
/// the slot invalidates the cached local database. Deterministic across
/// runs given identical inputs (spec.md §8 invariant 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(info: &MediaSlotInfo) -> Self {
        let created = info
            .created_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        let joined = format!(
            "{}.{}.{}.{}.{}.{}.{}",
            info.device_id,
            info.slot,
            info.name,
            info.free_bytes,
            info.total_bytes,
            info.track_count,
            created
        );
        let digest = Sha256::digest(joined.as_bytes());
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_decode_fixed_points() {
        assert_eq!(decode_pitch(0x0010_0000), 0.0);
        assert_eq!(decode_pitch(0x0000_0000), -100.0);
        assert_eq!(decode_pitch(0x0020_0000), 100.0);
    }

    #[test]
    fn pitch_decode_is_monotone() {
        let samples: Vec<f32> = (0..=0x0020_0000u32)
            .step_by(0x1000)
            .map(decode_pitch)
            .collect();
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn beat_grid_rejects_non_ascending_offsets() {
        let entries = vec![
            BeatGridEntry { offset: Duration::from_millis(500), count_in_bar: 1, bpm: 120.0 },
            BeatGridEntry { offset: Duration::from_millis(100), count_in_bar: 2, bpm: 120.0 },
        ];
        assert!(BeatGrid::new(entries).is_none());
    }

    #[test]
    fn beat_grid_accepts_ascending_offsets() {
        let entries = vec![
            BeatGridEntry { offset: Duration::from_millis(100), count_in_bar: 1, bpm: 120.0 },
            BeatGridEntry { offset: Duration::from_millis(600), count_in_bar: 2, bpm: 120.0 },
        ];
        assert!(BeatGrid::new(entries).is_some());
    }

    #[test]
    fn cue_and_loop_decision_table() {
        let offset = Duration::from_secs(1);
        let length = Some(Duration::from_secs(2));

        assert_eq!(
            CueAndLoop::from_raw(false, true, Some(HotCueButton::A), offset, length),
            Some(CueAndLoop::HotLoop { offset, length: Duration::from_secs(2), button: HotCueButton::A })
        );
        assert_eq!(
            CueAndLoop::from_raw(false, false, Some(HotCueButton::B), offset, None),
            Some(CueAndLoop::HotCue { offset, button: HotCueButton::B })
        );
        assert_eq!(
            CueAndLoop::from_raw(false, true, None, offset, length),
            Some(CueAndLoop::Loop { offset, length: Duration::from_secs(2) })
        );
        assert_eq!(
            CueAndLoop::from_raw(true, false, None, offset, None),
            Some(CueAndLoop::CuePoint { offset })
        );
        assert_eq!(CueAndLoop::from_raw(false, false, None, offset, None), None);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let info = MediaSlotInfo {
            device_id: 2,
            slot: SlotTag::Usb,
            name: "DENON DJ".to_string(),
            created_date: jiff::civil::date(2023, 1, 1).into(),
            free_bytes: 100,
            total_bytes: 1000,
            track_count: 42,
            playlist_count: 3,
            track_type: TrackType::Rb,
            has_settings: true,
            color: None,
        };
        assert_eq!(Fingerprint::compute(&info), Fingerprint::compute(&info));
    }

    #[test]
    fn fingerprint_changes_with_free_bytes() {
        let mut info = MediaSlotInfo {
            device_id: 2,
            slot: SlotTag::Usb,
            name: "DENON DJ".to_string(),
            created_date: None,
            free_bytes: 100,
            total_bytes: 1000,
            track_count: 42,
            playlist_count: 3,
            track_type: TrackType::Rb,
            has_settings: true,
            color: None,
        };
        let before = Fingerprint::compute(&info);
        info.free_bytes = 99;
        assert_ne!(before, Fingerprint::compute(&info));
    }
}
