//! Status datagram parsing (spec.md §4.4, first half): turns a raw UDP
//! payload on port 50002 into a [`DeckState`].
//!
//! spec.md pins down the pitch formula and the ≥0xFF-byte length floor but
//! leaves the rest of the byte layout unspecified (`original_source/` was
//! empty for this package). The offsets below are this crate's own fixed
//! layout — internally consistent and exercised by the roundtrip tests in
//! this module — rather than a byte-for-byte reproduction of any real
//! hardware's wire format; see `DESIGN.md`.

use crate::device::PROLINK_MAGIC;
use crate::model::{DeckState, PlayState, SlotTag, TrackType, decode_pitch};

pub const STATUS_PORT: u16 = 50002;
const STATUS_SUBTYPE: u8 = 0x0A;
const MIN_STATUS_LEN: usize = 0xFF;

const OFFSET_DEVICE_ID: usize = 0x21;
const OFFSET_TRACK_ID: usize = 0x2C;
const OFFSET_TRACK_SOURCE_DEVICE: usize = 0x27;
const OFFSET_TRACK_SOURCE_SLOT: usize = 0x28;
const OFFSET_TRACK_SOURCE_TYPE: usize = 0x29;
const OFFSET_PLAY_STATE: usize = 0x8A;
const OFFSET_FLAGS: usize = 0x8B;
const OFFSET_PITCH: usize = 0x8C;
const OFFSET_BPM: usize = 0x92;
const OFFSET_BEATS_UNTIL_CUE: usize = 0x94;
const OFFSET_BEAT: usize = 0xA0;
const OFFSET_BAR_BEAT: usize = 0xA7;
const OFFSET_PACKET_NUM: usize = 0xC8;

const FLAG_ON_AIR: u8 = 0b0000_0001;
const FLAG_SYNC: u8 = 0b0000_0010;
const FLAG_MASTER: u8 = 0b0000_0100;
const FLAG_EMERGENCY: u8 = 0b0000_1000;

const NO_BPM: u16 = 0xFFFF;
const NO_BEATS_UNTIL_CUE: u16 = 0xFFFF;

fn play_state_from_wire(byte: u8) -> Option<PlayState> {
    Some(match byte {
        0x00 => PlayState::Empty,
        0x01 => PlayState::Loading,
        0x02 => PlayState::Playing,
        0x03 => PlayState::Looping,
        0x04 => PlayState::Paused,
        0x05 => PlayState::Cued,
        0x06 => PlayState::Cuing,
        0x07 => PlayState::PlatterHeld,
        0x08 => PlayState::Searching,
        0x09 => PlayState::SpunDown,
        0x0A => PlayState::Ended,
        _ => return None,
    })
}

fn play_state_to_wire(state: PlayState) -> u8 {
    match state {
        PlayState::Empty => 0x00,
        PlayState::Loading => 0x01,
        PlayState::Playing => 0x02,
        PlayState::Looping => 0x03,
        PlayState::Paused => 0x04,
        PlayState::Cued => 0x05,
        PlayState::Cuing => 0x06,
        PlayState::PlatterHeld => 0x07,
        PlayState::Searching => 0x08,
        PlayState::SpunDown => 0x09,
        PlayState::Ended => 0x0A,
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(data[offset..offset + 2].try_into().unwrap())
}

/// Parse one status datagram. Returns `None` for anything spec.md §4.4 says
/// to ignore: too short, bad magic/sub-type, or an unrecognized play-state
/// byte.
pub fn parse_status(data: &[u8]) -> Option<DeckState> {
    if data.len() < MIN_STATUS_LEN || data[0..10] != PROLINK_MAGIC || data[0x0A] != STATUS_SUBTYPE {
        return None;
    }

    let play_state = play_state_from_wire(data[OFFSET_PLAY_STATE])?;
    let source_slot = SlotTag::from_wire(data[OFFSET_TRACK_SOURCE_SLOT])?;
    let source_track_type = TrackType::from_wire_byte(data[OFFSET_TRACK_SOURCE_TYPE])?;

    let flags = data[OFFSET_FLAGS];
    let is_playing = play_state.is_playing();

    let bpm_raw = read_u16(data, OFFSET_BPM);
    let track_bpm = (bpm_raw != NO_BPM).then(|| bpm_raw as f32 / 100.0);

    let beats_until_cue_raw = read_u16(data, OFFSET_BEATS_UNTIL_CUE);
    let beats_until_cue = if !is_playing || beats_until_cue_raw == NO_BEATS_UNTIL_CUE {
        None
    } else {
        Some(beats_until_cue_raw as u32)
    };

    Some(DeckState {
        device_id: data[OFFSET_DEVICE_ID],
        track_id: read_u32(data, OFFSET_TRACK_ID),
        source_device_id: data[OFFSET_TRACK_SOURCE_DEVICE],
        source_slot,
        source_track_type,
        play_state,
        is_on_air: flags & FLAG_ON_AIR != 0,
        is_sync: flags & FLAG_SYNC != 0,
        is_master: flags & FLAG_MASTER != 0,
        is_emergency_mode: flags & FLAG_EMERGENCY != 0,
        track_bpm,
        slider_pitch: decode_pitch(read_u32(data, OFFSET_PITCH)),
        effective_pitch: decode_pitch(read_u32(data, OFFSET_PITCH)),
        beat_in_measure: data[OFFSET_BAR_BEAT],
        beats_until_cue,
        beat: read_u32(data, OFFSET_BEAT),
        packet_num: read_u32(data, OFFSET_PACKET_NUM),
    })
}

/// Build a status datagram, the inverse of [`parse_status`]. Exists for the
/// roundtrip tests below; emitting real status packets isn't otherwise this
/// crate's job (it's a consumer of them, not a CDJ).
#[cfg(test)]
fn build_status(state: &DeckState) -> Vec<u8> {
    let mut packet = vec![0u8; MIN_STATUS_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[0x0A] = STATUS_SUBTYPE;
    packet[OFFSET_DEVICE_ID] = state.device_id;
    packet[OFFSET_TRACK_ID..OFFSET_TRACK_ID + 4].copy_from_slice(&state.track_id.to_be_bytes());
    packet[OFFSET_TRACK_SOURCE_DEVICE] = state.source_device_id;
    packet[OFFSET_TRACK_SOURCE_SLOT] = state.source_slot.to_wire();
    packet[OFFSET_TRACK_SOURCE_TYPE] = state.source_track_type.to_wire_byte();
    packet[OFFSET_PLAY_STATE] = play_state_to_wire(state.play_state);

    let mut flags = 0u8;
    if state.is_on_air {
        flags |= FLAG_ON_AIR;
    }
    if state.is_sync {
        flags |= FLAG_SYNC;
    }
    if state.is_master {
        flags |= FLAG_MASTER;
    }
    if state.is_emergency_mode {
        flags |= FLAG_EMERGENCY;
    }
    packet[OFFSET_FLAGS] = flags;

    let pitch_raw = ((state.slider_pitch / 100.0) * 0x0010_0000 as f32) as i64 + 0x0010_0000;
    packet[OFFSET_PITCH..OFFSET_PITCH + 4].copy_from_slice(&(pitch_raw as u32).to_be_bytes());

    let bpm_raw = state.track_bpm.map_or(NO_BPM, |bpm| (bpm * 100.0).round() as u16);
    packet[OFFSET_BPM..OFFSET_BPM + 2].copy_from_slice(&bpm_raw.to_be_bytes());

    let beats_until_cue_raw = state.beats_until_cue.map_or(NO_BEATS_UNTIL_CUE, |v| v as u16);
    packet[OFFSET_BEATS_UNTIL_CUE..OFFSET_BEATS_UNTIL_CUE + 2]
        .copy_from_slice(&beats_until_cue_raw.to_be_bytes());

    packet[OFFSET_BEAT..OFFSET_BEAT + 4].copy_from_slice(&state.beat.to_be_bytes());
    packet[OFFSET_BAR_BEAT] = state.beat_in_measure;
    packet[OFFSET_PACKET_NUM..OFFSET_PACKET_NUM + 4].copy_from_slice(&state.packet_num.to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeckState {
        DeckState {
            device_id: 2,
            track_id: 42,
            source_device_id: 2,
            source_slot: SlotTag::Usb,
            source_track_type: TrackType::Rb,
            play_state: PlayState::Playing,
            is_on_air: true,
            is_sync: true,
            is_master: false,
            is_emergency_mode: false,
            track_bpm: Some(128.5),
            slider_pitch: 2.5,
            effective_pitch: 2.5,
            beat_in_measure: 3,
            beats_until_cue: Some(12),
            beat: 57,
            packet_num: 999,
        }
    }

    #[test]
    fn roundtrips_a_playing_deck() {
        let state = sample();
        let parsed = parse_status(&build_status(&state)).unwrap();
        assert_eq!(parsed.device_id, state.device_id);
        assert_eq!(parsed.track_id, state.track_id);
        assert_eq!(parsed.play_state, PlayState::Playing);
        assert_eq!(parsed.track_bpm, state.track_bpm);
        assert_eq!(parsed.beats_until_cue, state.beats_until_cue);
        assert_eq!(parsed.beat, state.beat);
        assert_eq!(parsed.packet_num, state.packet_num);
    }

    #[test]
    fn non_playing_deck_clears_beats_until_cue() {
        let mut state = sample();
        state.play_state = PlayState::Paused;
        state.beats_until_cue = Some(4);
        let parsed = parse_status(&build_status(&state)).unwrap();
        assert_eq!(parsed.beats_until_cue, None);
    }

    #[test]
    fn rejects_short_packet() {
        assert!(parse_status(&[0u8; 10]).is_none());
    }

    #[test]
    fn rejects_unknown_play_state() {
        let mut packet = build_status(&sample());
        packet[OFFSET_PLAY_STATE] = 0xEE;
        assert!(parse_status(&packet).is_none());
    }
}
