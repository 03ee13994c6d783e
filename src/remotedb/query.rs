//! The remote-database query catalog (spec.md §4.5): one function per
//! request/response pair, each sending the shared `[hostId, menuTarget,
//! slot, trackType]` descriptor plus whatever else the request needs, then
//! decoding the matching response shape.
//!
//! Byte offsets for `BeatGrid`/`CueAndLoops`/`AdvCueAndLoops` binary
//! payloads beyond spec.md's explicit `WaveformPreview`/`WaveformHD`/
//! `Artwork` layouts are this module's own invented-but-consistent choice —
//! spec.md leaves them as "decode per response shape" without pinning exact
//! offsets, the same gap `status.rs`'s keepalive layout had to fill.

use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{BeatGrid, BeatGridEntry, CueAndLoop, HotCueButton, SlotTag, TrackType, Waveform, WaveformHdSegment, WaveformSegment};
use crate::wire::field::Field;

use super::{Connection, MSG_TYPE_SUCCESS, descriptor};
use super::menu::MenuPages;

const REQ_GET_METADATA: u16 = 0x2002;
const REQ_GET_GENERIC_METADATA: u16 = 0x2202;
const REQ_GET_ARTWORK: u16 = 0x2003;
const REQ_GET_TRACK_INFO: u16 = 0x2102;
const REQ_GET_BEAT_GRID: u16 = 0x2204;
const REQ_GET_CUE_AND_LOOPS: u16 = 0x2104;
const REQ_GET_ADV_CUE_AND_LOOPS: u16 = 0x2b04;
const REQ_GET_WAVEFORM_PREVIEW: u16 = 0x2004;
const REQ_GET_WAVEFORM_DETAILED: u16 = 0x2904;
const REQ_GET_WAVEFORM_HD: u16 = 0x2c04;
const REQ_MENU_PLAYLIST: u16 = 0x1105;

const RESP_ARTWORK: u16 = 0x4002;
const RESP_BEAT_GRID: u16 = 0x4602;
const RESP_CUE_AND_LOOPS: u16 = 0x4702;
const RESP_ADV_CUE_AND_LOOPS: u16 = 0x4e02;
const RESP_WAVEFORM_PREVIEW: u16 = 0x4402;
const RESP_WAVEFORM_DETAILED: u16 = 0x4a02;
const RESP_WAVEFORM_HD: u16 = 0x4f02;

fn items_available(message: &super::wire::Message) -> Result<u32> {
    message.args.get(1).and_then(Field::as_u32).ok_or_else(|| Error::Protocol {
        reason: "Success response missing itemsAvailable".to_string(),
    })
}

fn binary_arg(message: &super::wire::Message, index: usize) -> Result<&[u8]> {
    message.args.get(index).and_then(Field::as_binary).ok_or_else(|| Error::Protocol {
        reason: format!("response missing binary arg at index {index}"),
    })
}

async fn paged_request(
    connection: Arc<Connection>,
    msg_type: u16,
    host_id: u8,
    slot: SlotTag,
    track_type: TrackType,
    track_id: u32,
    diagnostics: Arc<Diagnostics>,
) -> Result<MenuPages> {
    let descriptor_value = descriptor(host_id, slot, track_type);
    let args = vec![Field::U32(descriptor_value), Field::U32(track_id)];
    let response = connection.request(msg_type, args, MSG_TYPE_SUCCESS).await?;
    let total = items_available(&response)?;
    Ok(MenuPages::new(connection, descriptor_value, total, diagnostics))
}

/// `GetMetadata` (0x2002): the full per-track metadata menu.
pub async fn get_metadata(
    connection: Arc<Connection>, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, diagnostics: Arc<Diagnostics>,
) -> Result<MenuPages> {
    paged_request(connection, REQ_GET_METADATA, host_id, slot, track_type, track_id, diagnostics).await
}

/// `GetGenericMetadata` (0x2202): metadata for non-rekordbox media
/// (unanalyzed/audio CD), a shorter menu than [`get_metadata`].
pub async fn get_generic_metadata(
    connection: Arc<Connection>, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, diagnostics: Arc<Diagnostics>,
) -> Result<MenuPages> {
    paged_request(connection, REQ_GET_GENERIC_METADATA, host_id, slot, track_type, track_id, diagnostics).await
}

/// `GetTrackInfo` (0x2102): extended per-track info menu (key, color, ...).
pub async fn get_track_info(
    connection: Arc<Connection>, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, diagnostics: Arc<Diagnostics>,
) -> Result<MenuPages> {
    paged_request(connection, REQ_GET_TRACK_INFO, host_id, slot, track_type, track_id, diagnostics).await
}

/// `MenuPlaylist` (0x1105): one folder/playlist level of the playlist tree.
pub async fn menu_playlist(
    connection: Arc<Connection>,
    host_id: u8,
    slot: SlotTag,
    track_type: TrackType,
    sort: u32,
    playlist_id: u32,
    is_folder: bool,
    diagnostics: Arc<Diagnostics>,
) -> Result<MenuPages> {
    let descriptor_value = descriptor(host_id, slot, track_type);
    let args = vec![
        Field::U32(descriptor_value),
        Field::U32(sort),
        Field::U32(playlist_id),
        Field::U32(is_folder as u32),
    ];
    let response = connection.request(REQ_MENU_PLAYLIST, args, MSG_TYPE_SUCCESS).await?;
    let total = items_available(&response)?;
    Ok(MenuPages::new(connection, descriptor_value, total, diagnostics))
}

/// `GetArtwork` (0x2003): raw image bytes for an `artworkId`, carried in the
/// response's fourth argument (spec.md §4.5).
pub async fn get_artwork(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, artwork_id: u32) -> Result<Vec<u8>> {
    let args = vec![Field::U32(descriptor(host_id, slot, track_type)), Field::U32(artwork_id)];
    let response = connection.request(REQ_GET_ARTWORK, args, RESP_ARTWORK).await?;
    Ok(binary_arg(&response, 3)?.to_vec())
}

/// `GetBeatGrid` (0x2204). Entries start at byte 0x14 of the binary payload,
/// 16 bytes apart: `count` (1..=4) at byte 0, a little-endian millisecond
/// offset at bytes 1..5. The remote wire carries no per-beat tempo, unlike
/// the local database's `BEAT_GRID` section, so `bpm` is always `0.0` here.
pub async fn get_beat_grid(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<BeatGrid> {
    let args = vec![Field::U32(descriptor(host_id, slot, track_type)), Field::U32(track_id)];
    let response = connection.request(REQ_GET_BEAT_GRID, args, RESP_BEAT_GRID).await?;
    decode_beat_grid(binary_arg(&response, 1)?)
}

fn decode_beat_grid(bytes: &[u8]) -> Result<BeatGrid> {
    const START: usize = 0x14;
    let mut entries = Vec::new();
    if let Some(records) = bytes.get(START..) {
        for record in records.chunks_exact(16) {
            let count_in_bar = record[0];
            if !(1..=4).contains(&count_in_bar) {
                continue;
            }
            let offset_ms = LittleEndian::read_u32(&record[1..5]);
            entries.push(BeatGridEntry { offset: Duration::from_millis(offset_ms as u64), count_in_bar, bpm: 0.0 });
        }
    }
    BeatGrid::new(entries).ok_or_else(|| Error::Protocol {
        reason: "beat grid entries are not strictly ascending".to_string(),
    })
}

/// `GetCueAndLoops` (0x2104). Records start at byte 0x14, 16 bytes apart:
/// `isCue` (byte 0), `isLoop` (byte 1), hot-cue button index (byte 2, 0 =
/// none), little-endian millisecond `offset` (bytes 4..8), little-endian
/// millisecond `length` (bytes 8..12).
pub async fn get_cue_and_loops(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<Vec<CueAndLoop>> {
    let args = vec![Field::U32(descriptor(host_id, slot, track_type)), Field::U32(track_id)];
    let response = connection.request(REQ_GET_CUE_AND_LOOPS, args, RESP_CUE_AND_LOOPS).await?;
    Ok(decode_cue_and_loops(binary_arg(&response, 1)?))
}

/// `GetAdvCueAndLoops` (0x2b04): same response shape as
/// [`get_cue_and_loops`], for players new enough to report "advanced" (more
/// than 8) hot cues.
pub async fn get_adv_cue_and_loops(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<Vec<CueAndLoop>> {
    let args = vec![Field::U32(descriptor(host_id, slot, track_type)), Field::U32(track_id), Field::U32(0)];
    let response = connection.request(REQ_GET_ADV_CUE_AND_LOOPS, args, RESP_ADV_CUE_AND_LOOPS).await?;
    Ok(decode_cue_and_loops(binary_arg(&response, 1)?))
}

fn decode_cue_and_loops(bytes: &[u8]) -> Vec<CueAndLoop> {
    const START: usize = 0x14;
    let Some(records) = bytes.get(START..) else { return Vec::new() };
    records
        .chunks_exact(16)
        .filter_map(|record| {
            let is_cue = record[0] != 0;
            let is_loop = record[1] != 0;
            let button = HotCueButton::from_index(record[2]);
            let offset = Duration::from_millis(LittleEndian::read_u32(&record[4..8]) as u64);
            let length = Duration::from_millis(LittleEndian::read_u32(&record[8..12]) as u64);
            CueAndLoop::from_raw(is_cue, is_loop, button, offset, Some(length))
        })
        .collect()
}

/// `GetWaveformPreview` (0x2004): fixed 400 segments, 2 bytes each, carried
/// in the response's fourth argument.
pub async fn get_waveform_preview(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<Waveform> {
    let args = vec![
        Field::U32(descriptor(host_id, slot, track_type)),
        Field::U32(0),
        Field::U32(track_id),
        Field::U32(0),
        Field::Binary(Vec::new()),
    ];
    let response = connection.request(REQ_GET_WAVEFORM_PREVIEW, args, RESP_WAVEFORM_PREVIEW).await?;
    let bytes = binary_arg(&response, 3)?;
    let segments = bytes
        .chunks_exact(2)
        .take(400)
        .map(|pair| WaveformSegment { height: pair[0], whiteness: pair[1] as f32 / 7.0 })
        .collect();
    Ok(Waveform::Preview(segments))
}

/// `GetWaveformDetailed` (0x2904): one byte per segment — low 5 bits are
/// height, top 3 bits are whiteness.
pub async fn get_waveform_detailed(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<Waveform> {
    let args = vec![Field::U32(descriptor(host_id, slot, track_type)), Field::U32(track_id), Field::U32(0)];
    let response = connection.request(REQ_GET_WAVEFORM_DETAILED, args, RESP_WAVEFORM_DETAILED).await?;
    let bytes = binary_arg(&response, 3)?;
    let segments = bytes
        .iter()
        .map(|&b| WaveformSegment { height: b & 0b0001_1111, whiteness: (b >> 5) as f32 / 7.0 })
        .collect();
    Ok(Waveform::Detailed(segments))
}

/// `GetWaveformHD` (0x2c04): bytes from 0x34, each a big-endian `u16` packing
/// `red`/`green`/`blue` (top 3 bits each) and `height` (bits 2..7).
pub async fn get_waveform_hd(connection: &Connection, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32) -> Result<Waveform> {
    let args = vec![
        Field::U32(descriptor(host_id, slot, track_type)),
        Field::U32(track_id),
        Field::U32(u32::from_be_bytes(*b"PWV5")),
        Field::U32(u32::from_be_bytes(*b"EXT\0")),
    ];
    let response = connection.request(REQ_GET_WAVEFORM_HD, args, RESP_WAVEFORM_HD).await?;
    let bytes = binary_arg(&response, 3)?;
    const START: usize = 0x34;
    let segments = bytes
        .get(START..)
        .unwrap_or(&[])
        .chunks_exact(2)
        .map(|pair| {
            let packed = BigEndian::read_u16(pair);
            WaveformHdSegment {
                height: ((packed >> 2) & 0b1_1111) as u8,
                red: ((packed >> 13) & 0b111) as f32 / 7.0,
                green: ((packed >> 10) & 0b111) as f32 / 7.0,
                blue: ((packed >> 7) & 0b111) as f32 / 7.0,
            }
        })
        .collect();
    Ok(Waveform::Hd(segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_beat_grid_entries_after_header() {
        let mut bytes = vec![0u8; 0x14];
        bytes.extend_from_slice(&[4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[1, 200, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let grid = decode_beat_grid(&bytes).unwrap();
        assert_eq!(grid.entries().len(), 2);
        assert_eq!(grid.entries()[1].offset, Duration::from_millis(200));
        assert_eq!(grid.entries()[1].count_in_bar, 1);
    }

    #[test]
    fn decodes_hot_cue_from_cue_and_loop_records() {
        let mut bytes = vec![0u8; 0x14];
        // isCue=1, isLoop=0, button=1 (A), offset=1500ms
        bytes.extend_from_slice(&[1, 0, 1, 0, 0xDC, 0x05, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let decoded = decode_cue_and_loops(&bytes);
        assert_eq!(decoded, vec![CueAndLoop::HotCue { offset: Duration::from_millis(1500), button: HotCueButton::A }]);
    }

    #[test]
    fn decodes_waveform_preview_segments() {
        let mut response_bytes = Vec::new();
        for _ in 0..400 {
            response_bytes.extend_from_slice(&[16, 3]);
        }
        let decoded: Vec<WaveformSegment> =
            response_bytes.chunks_exact(2).take(400).map(|p| WaveformSegment { height: p[0], whiteness: p[1] as f32 / 7.0 }).collect();
        assert_eq!(decoded.len(), 400);
        assert_eq!(decoded[0].height, 16);
    }

    #[test]
    fn decodes_waveform_hd_segment_per_spec_fixture() {
        let packed = BigEndian::read_u16(&[0xFF, 0xFF]);
        let segment = WaveformHdSegment {
            height: ((packed >> 2) & 0b1_1111) as u8,
            red: ((packed >> 13) & 0b111) as f32 / 7.0,
            green: ((packed >> 10) & 0b111) as f32 / 7.0,
            blue: ((packed >> 7) & 0b111) as f32 / 7.0,
        };
        assert_eq!(segment.red, 1.0);
        assert_eq!(segment.green, 1.0);
        assert_eq!(segment.blue, 1.0);
        assert_eq!(segment.height, 31);
    }
}
