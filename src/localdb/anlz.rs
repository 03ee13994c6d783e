//! ANLZ (`.DAT`/`.EXT`) section parser (spec.md §4.7's `hydrateAnlz`).
//!
//! Grounded on `other_examples/cb5454af_Holzhaus-rekordcrate__src-anlz.rs.rs`:
//! same section-tag framing (`PMAI` file header, then a flat sequence of
//! four-byte-tagged sections each with a `size`/`total_size` pair), same
//! `nom` combinator style. Only the two section kinds spec.md §4.7 actually
//! hydrates are decoded (`PQTZ` beat grid, `PCOB`/`PCO2` cue lists);
//! everything else is read as an opaque blob and skipped, the same
//! treatment rekordcrate itself gives unrecognized tags.

use nom::bytes::complete::{tag, take};
use nom::multi::count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::IResult;

use crate::error::{Error, Result};
use crate::model::{CueAndLoop, HotCueButton};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    BeatGrid,
    CueList,
    ExtendedCueList,
    Unknown([u8; 4]),
}

fn content_kind(input: &[u8]) -> IResult<&[u8], ContentKind> {
    let (input, raw) = take(4usize)(input)?;
    let kind = match raw {
        b"PQTZ" => ContentKind::BeatGrid,
        b"PCOB" => ContentKind::CueList,
        b"PCO2" => ContentKind::ExtendedCueList,
        other => ContentKind::Unknown(other.try_into().unwrap()),
    };
    Ok((input, kind))
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub kind: ContentKind,
    pub size: u32,
    pub total_size: u32,
}

impl Header {
    fn remaining_size(&self) -> usize {
        self.size.saturating_sub(12) as usize
    }

    fn content_size(&self) -> usize {
        self.total_size.saturating_sub(self.size) as usize
    }
}

fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, kind) = content_kind(input)?;
    let (input, size) = be_u32(input)?;
    let (input, total_size) = be_u32(input)?;
    Ok((input, Header { kind, size, total_size }))
}

#[derive(Debug, Clone, Copy)]
struct Beat {
    beat_number: u16,
    tempo: u16,
    time_ms: u32,
}

fn beat(input: &[u8]) -> IResult<&[u8], Beat> {
    let (input, beat_number) = be_u16(input)?;
    let (input, tempo) = be_u16(input)?;
    let (input, time_ms) = be_u32(input)?;
    Ok((input, Beat { beat_number, tempo, time_ms }))
}

fn beat_grid_content<'a>(input: &'a [u8], header: &Header) -> IResult<&'a [u8], Vec<Beat>> {
    let (input, _unknown1) = be_u32(input)?;
    let (input, _unknown2) = be_u32(input)?;
    let (input, _header_tail) = take(header.remaining_size().saturating_sub(8))(input)?;
    let beat_count = header.content_size().saturating_sub(8) / 8;
    count(beat, beat_count)(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CueType {
    Point,
    Loop,
    Unknown(u8),
}

fn cue_type(input: &[u8]) -> IResult<&[u8], CueType> {
    let (input, raw) = be_u8(input)?;
    let kind = match raw {
        1 => CueType::Point,
        2 => CueType::Loop,
        other => CueType::Unknown(other),
    };
    Ok((input, kind))
}

#[derive(Debug, Clone, Copy)]
struct RawCue {
    hot_cue: u32,
    cue_type: CueType,
    time_ms: u32,
    loop_time_ms: u32,
}

/// One `PCOB` entry: hot_cue id, status, unknowns, order, type, unknowns,
/// then the two timestamps this module actually uses.
fn cue(input: &[u8]) -> IResult<&[u8], RawCue> {
    let (input, hot_cue) = be_u32(input)?;
    let (input, _status) = be_u32(input)?;
    let (input, _unknown1) = be_u32(input)?;
    let (input, _order_first) = be_u16(input)?;
    let (input, _order_last) = be_u16(input)?;
    let (input, cue_type) = cue_type(input)?;
    let (input, _unknown2) = be_u8(input)?;
    let (input, _unknown3) = be_u16(input)?;
    let (input, time_ms) = be_u32(input)?;
    let (input, loop_time_ms) = be_u32(input)?;
    let (input, _unknown4) = be_u32(input)?;
    let (input, _unknown5) = be_u32(input)?;
    let (input, _unknown6) = be_u32(input)?;
    let (input, _unknown7) = be_u32(input)?;
    Ok((input, RawCue { hot_cue, cue_type, time_ms, loop_time_ms }))
}

/// One `PCO2` entry: same leading fields as `RawCue`, plus a comment and
/// color that this module discards (not part of [`CueAndLoop`]).
fn extended_cue(input: &[u8]) -> IResult<&[u8], RawCue> {
    let (input, hot_cue) = be_u32(input)?;
    let (input, cue_type) = cue_type(input)?;
    let (input, _unknown1) = be_u8(input)?;
    let (input, _unknown2) = be_u16(input)?;
    let (input, time_ms) = be_u32(input)?;
    let (input, loop_time_ms) = be_u32(input)?;
    let (input, _color) = be_u8(input)?;
    let (input, _unknown3) = be_u8(input)?;
    let (input, _unknown4) = be_u16(input)?;
    let (input, _unknown5) = be_u32(input)?;
    let (input, _loop_numerator) = be_u16(input)?;
    let (input, _loop_denominator) = be_u16(input)?;
    let (input, len_comment) = be_u32(input)?;
    let (input, _comment_units) = take(len_comment.saturating_sub(4) as usize)(input)?;
    let (input, _hot_cue_color_index) = be_u8(input)?;
    let (input, _hot_cue_color_rgb) = take(3usize)(input)?;
    let (input, _unknown6) = be_u32(input)?;
    let (input, _unknown7) = be_u32(input)?;
    let (input, _unknown8) = be_u32(input)?;
    let (input, _unknown9) = be_u32(input)?;
    Ok((input, RawCue { hot_cue, cue_type, time_ms, loop_time_ms }))
}

fn cue_list_content<'a>(input: &'a [u8], extended: bool) -> IResult<&'a [u8], Vec<RawCue>> {
    if extended {
        let (input, len_cues) = be_u16(input)?;
        let (input, _unknown) = take(2usize)(input)?;
        count(extended_cue, len_cues as usize)(input)
    } else {
        let (input, len_cues) = be_u16(input)?;
        let (input, _memory_count) = be_u32(input)?;
        count(cue, len_cues as usize)(input)
    }
}

fn to_cue_and_loop(raw: RawCue) -> Option<CueAndLoop> {
    let offset = std::time::Duration::from_millis(raw.time_ms.into());
    let is_loop = raw.cue_type == CueType::Loop;
    let is_cue = raw.cue_type == CueType::Point;
    let button = (raw.hot_cue > 0).then(|| HotCueButton::from_index(raw.hot_cue as u8)).flatten();
    let length = is_loop.then(|| std::time::Duration::from_millis(raw.loop_time_ms.saturating_sub(raw.time_ms).into()));
    CueAndLoop::from_raw(is_cue, is_loop, button, offset, length)
}

/// One parsed section: its header plus whatever this module extracted from
/// the content that followed it (opaque for kinds it doesn't hydrate).
pub enum Section {
    BeatGrid { entries: Vec<crate::model::BeatGridEntry> },
    CueList { cues: Vec<CueAndLoop> },
    Opaque,
}

fn section(input: &[u8]) -> IResult<&[u8], Section> {
    let (rest, header) = header(input)?;
    match header.kind {
        ContentKind::BeatGrid => {
            let (rest, beats) = beat_grid_content(rest, &header)?;
            let entries = beats
                .into_iter()
                .map(|b| crate::model::BeatGridEntry {
                    offset: std::time::Duration::from_millis(b.time_ms.into()),
                    count_in_bar: (b.beat_number.clamp(1, 4)) as u8,
                    bpm: b.tempo as f32 / 100.0,
                })
                .collect();
            Ok((rest, Section::BeatGrid { entries }))
        }
        ContentKind::CueList => {
            let (rest, raw_cues) = cue_list_content(rest, false)?;
            Ok((rest, Section::CueList { cues: raw_cues.into_iter().filter_map(to_cue_and_loop).collect() }))
        }
        ContentKind::ExtendedCueList => {
            let (rest, raw_cues) = cue_list_content(rest, true)?;
            Ok((rest, Section::CueList { cues: raw_cues.into_iter().filter_map(to_cue_and_loop).collect() }))
        }
        ContentKind::Unknown(_) => {
            let (rest, _header_tail) = take(header.remaining_size())(rest)?;
            let (rest, _content) = take(header.content_size())(rest)?;
            Ok((rest, Section::Opaque))
        }
    }
}

/// Parse every section out of a whole `.DAT`/`.EXT` file, skipping the
/// leading `PMAI` file header. Malformed trailing bytes end the iteration
/// rather than erroring — rekordbox analysis files sometimes carry trailing
/// padding this parser doesn't need to understand.
fn skip(input: &[u8], n: usize) -> IResult<&[u8], &[u8]> {
    take(n)(input)
}

pub fn sections(data: &[u8]) -> Result<Vec<Section>> {
    let (input, file_header) = header(data).map_err(|e| Error::Protocol { reason: format!("anlz file header: {e}") })?;
    if !matches!(file_header.kind, ContentKind::Unknown(raw_tag) if &raw_tag == b"PMAI") {
        return Err(Error::Protocol { reason: "anlz: missing PMAI file header".to_string() });
    }
    let (mut input, _file_header_tail) = skip(input, file_header.remaining_size()).map_err(|e| Error::Protocol { reason: e.to_string() })?;

    let mut out = Vec::new();
    while !input.is_empty() {
        match section(input) {
            Ok((rest, parsed)) => {
                out.push(parsed);
                if rest.len() == input.len() {
                    break;
                }
                input = rest;
            }
            Err(_) => break,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_bytes(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let size = 12u32;
        let total_size = size + body.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&total_size.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn decodes_beat_grid_section() {
        let mut body = vec![0u8; 8]; // unknown1, unknown2
        for (beat_number, tempo, time_ms) in [(1u16, 12800u16, 0u32), (2, 12800, 500)] {
            body.extend_from_slice(&beat_number.to_be_bytes());
            body.extend_from_slice(&tempo.to_be_bytes());
            body.extend_from_slice(&time_ms.to_be_bytes());
        }
        let bytes = section_bytes(b"PQTZ", &body);
        let (_, parsed) = section(&bytes).unwrap();
        match parsed {
            Section::BeatGrid { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].bpm, 128.0);
                assert_eq!(entries[1].offset, std::time::Duration::from_millis(500));
            }
            _ => panic!("expected beat grid"),
        }
    }

    #[test]
    fn decodes_cue_list_section_with_hot_cue() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes()); // len_cues
        body.extend_from_slice(&0u32.to_be_bytes()); // memory_count
        body.extend_from_slice(&3u32.to_be_bytes()); // hot_cue = C
        body.extend_from_slice(&0u32.to_be_bytes()); // status
        body.extend_from_slice(&0u32.to_be_bytes()); // unknown1
        body.extend_from_slice(&0u16.to_be_bytes()); // order_first
        body.extend_from_slice(&0u16.to_be_bytes()); // order_last
        body.push(1); // cue_type = Point
        body.push(0); // unknown2
        body.extend_from_slice(&0u16.to_be_bytes()); // unknown3
        body.extend_from_slice(&1500u32.to_be_bytes()); // time_ms
        body.extend_from_slice(&0u32.to_be_bytes()); // loop_time_ms
        body.extend_from_slice(&[0u8; 16]); // unknown4..7

        let bytes = section_bytes(b"PCOB", &body);
        let (_, parsed) = section(&bytes).unwrap();
        match parsed {
            Section::CueList { cues } => {
                assert_eq!(cues.len(), 1);
                assert_eq!(cues[0], CueAndLoop::HotCue { offset: std::time::Duration::from_millis(1500), button: HotCueButton::C });
            }
            _ => panic!("expected cue list"),
        }
    }
}
