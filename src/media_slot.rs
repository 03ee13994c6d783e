//! Media-slot query (spec.md §6): a request/response pair on the status
//! socket (port 50002) that asks a device what's loaded in one of its
//! media slots.

use std::net::Ipv4Addr;

use crate::device::PROLINK_MAGIC;
use crate::model::{MediaSlotInfo, SlotTag, TrackType};

const QUERY_SUBTYPE: u8 = 0x05;
const REQUEST_LEN: usize = 0x31;
const MIN_RESPONSE_LEN: usize = 0xC0;

const REQ_OFFSET_HOST_NAME: usize = 0x0C;
const REQ_OFFSET_HOST_ID: usize = 0x22;
const REQ_OFFSET_HOST_IP: usize = 0x25;
const REQ_OFFSET_DEVICE_ID: usize = 0x2C;
const REQ_OFFSET_SLOT: usize = 0x30;

const RESP_OFFSET_DEVICE_ID: usize = 0x27;
const RESP_OFFSET_SLOT: usize = 0x2B;
const RESP_OFFSET_NAME: usize = 0x2C;
const RESP_NAME_LEN: usize = 0x53 - 0x2C;
const RESP_OFFSET_CREATED_DATE: usize = 0x6C;
const RESP_CREATED_DATE_LEN: usize = 0x83 - 0x6C;
const RESP_OFFSET_TRACK_COUNT: usize = 0xA6;
const RESP_OFFSET_COLOR: usize = 0xA8;
const RESP_OFFSET_TRACK_TYPE: usize = 0xAA;
const RESP_OFFSET_HAS_SETTINGS: usize = 0xAB;
const RESP_OFFSET_PLAYLIST_COUNT: usize = 0xAE;
const RESP_OFFSET_TOTAL_BYTES: usize = 0xB0;
const RESP_OFFSET_FREE_BYTES: usize = 0xB8;

/// Build the outbound query for `device_id`'s `slot`, sent from `host_id`/
/// `host_name`/`host_ip` (spec.md §6).
pub fn build_query(host_name: &str, host_id: u8, host_ip: Ipv4Addr, device_id: u8, slot: SlotTag) -> Vec<u8> {
    let mut packet = vec![0u8; REQUEST_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[0x0A] = QUERY_SUBTYPE;
    let name_bytes = host_name.as_bytes();
    let copy_len = name_bytes.len().min(20);
    packet[REQ_OFFSET_HOST_NAME..REQ_OFFSET_HOST_NAME + copy_len].copy_from_slice(&name_bytes[..copy_len]);
    packet[0x20] = 0x01;
    packet[REQ_OFFSET_HOST_ID] = host_id;
    packet[0x23] = 0x00;
    packet[0x24] = 0x0C;
    packet[REQ_OFFSET_HOST_IP..REQ_OFFSET_HOST_IP + 4].copy_from_slice(&host_ip.octets());
    packet[REQ_OFFSET_DEVICE_ID] = device_id;
    packet[REQ_OFFSET_SLOT] = slot.to_wire();
    packet
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(data[offset..offset + 8].try_into().unwrap())
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(data[offset..offset + 2].try_into().unwrap())
}

/// Parse a media-slot response. Returns `None` for anything too short,
/// with a bad magic, or carrying an unrecognized slot/track-type tag.
pub fn parse_response(data: &[u8]) -> Option<MediaSlotInfo> {
    if data.len() < MIN_RESPONSE_LEN || data[0..10] != PROLINK_MAGIC {
        return None;
    }

    let slot = SlotTag::from_wire(data[RESP_OFFSET_SLOT])?;
    let track_type = TrackType::from_wire_byte(data[RESP_OFFSET_TRACK_TYPE])?;

    let name = String::from_utf8_lossy(&data[RESP_OFFSET_NAME..RESP_OFFSET_NAME + RESP_NAME_LEN])
        .trim_end_matches('\0')
        .to_string();

    let created_date_raw =
        String::from_utf8_lossy(&data[RESP_OFFSET_CREATED_DATE..RESP_OFFSET_CREATED_DATE + RESP_CREATED_DATE_LEN])
            .trim_end_matches('\0')
            .to_string();
    let created_date = created_date_raw.parse::<jiff::civil::Date>().ok();

    let color = match data[RESP_OFFSET_COLOR] {
        0 => None,
        other => Some(other),
    };

    Some(MediaSlotInfo {
        device_id: data[RESP_OFFSET_DEVICE_ID],
        slot,
        name,
        created_date,
        free_bytes: read_u64(data, RESP_OFFSET_FREE_BYTES),
        total_bytes: read_u64(data, RESP_OFFSET_TOTAL_BYTES),
        track_count: read_u16(data, RESP_OFFSET_TRACK_COUNT),
        playlist_count: read_u16(data, RESP_OFFSET_PLAYLIST_COUNT),
        track_type,
        has_settings: data[RESP_OFFSET_HAS_SETTINGS] != 0,
        color,
    })
}

#[cfg(test)]
fn build_response(info: &MediaSlotInfo) -> Vec<u8> {
    let mut packet = vec![0u8; MIN_RESPONSE_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[RESP_OFFSET_DEVICE_ID] = info.device_id;
    packet[RESP_OFFSET_SLOT] = info.slot.to_wire();

    let name_bytes = info.name.as_bytes();
    let copy_len = name_bytes.len().min(RESP_NAME_LEN);
    packet[RESP_OFFSET_NAME..RESP_OFFSET_NAME + copy_len].copy_from_slice(&name_bytes[..copy_len]);

    if let Some(date) = info.created_date {
        let rendered = date.to_string();
        let copy_len = rendered.len().min(RESP_CREATED_DATE_LEN);
        packet[RESP_OFFSET_CREATED_DATE..RESP_OFFSET_CREATED_DATE + copy_len]
            .copy_from_slice(&rendered.as_bytes()[..copy_len]);
    }

    packet[RESP_OFFSET_TRACK_COUNT..RESP_OFFSET_TRACK_COUNT + 2]
        .copy_from_slice(&info.track_count.to_be_bytes());
    packet[RESP_OFFSET_COLOR] = info.color.unwrap_or(0);
    packet[RESP_OFFSET_TRACK_TYPE] = info.track_type.to_wire_byte();
    packet[RESP_OFFSET_HAS_SETTINGS] = info.has_settings as u8;
    packet[RESP_OFFSET_PLAYLIST_COUNT..RESP_OFFSET_PLAYLIST_COUNT + 2]
        .copy_from_slice(&info.playlist_count.to_be_bytes());
    packet[RESP_OFFSET_TOTAL_BYTES..RESP_OFFSET_TOTAL_BYTES + 8]
        .copy_from_slice(&info.total_bytes.to_be_bytes());
    packet[RESP_OFFSET_FREE_BYTES..RESP_OFFSET_FREE_BYTES + 8]
        .copy_from_slice(&info.free_bytes.to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_well_formed_query() {
        let packet = build_query("host", 3, Ipv4Addr::new(192, 168, 1, 10), 2, SlotTag::Usb);
        assert_eq!(&packet[0..10], &PROLINK_MAGIC);
        assert_eq!(packet[0x0A], QUERY_SUBTYPE);
        assert_eq!(packet[REQ_OFFSET_HOST_ID], 3);
        assert_eq!(&packet[REQ_OFFSET_HOST_IP..REQ_OFFSET_HOST_IP + 4], &[192, 168, 1, 10]);
        assert_eq!(packet[REQ_OFFSET_DEVICE_ID], 2);
        assert_eq!(packet[REQ_OFFSET_SLOT], SlotTag::Usb.to_wire());
    }

    #[test]
    fn roundtrips_a_response() {
        let info = MediaSlotInfo {
            device_id: 2,
            slot: SlotTag::Usb,
            name: "DENON DJ".to_string(),
            created_date: jiff::civil::date(2023, 6, 1).into(),
            free_bytes: 123,
            total_bytes: 456,
            track_count: 42,
            playlist_count: 3,
            track_type: TrackType::Rb,
            has_settings: true,
            color: Some(2),
        };
        let parsed = parse_response(&build_response(&info)).unwrap();
        pretty_assertions::assert_eq!(parsed, info);
    }

    #[test]
    fn rejects_short_packet() {
        assert!(parse_response(&[0u8; 10]).is_none());
    }

    #[test]
    fn unparseable_created_date_becomes_none() {
        let mut info = MediaSlotInfo {
            device_id: 2,
            slot: SlotTag::Usb,
            name: "X".to_string(),
            created_date: None,
            free_bytes: 1,
            total_bytes: 1,
            track_count: 0,
            playlist_count: 0,
            track_type: TrackType::Rb,
            has_settings: false,
            color: None,
        };
        let mut packet = build_response(&info);
        packet[RESP_OFFSET_CREATED_DATE..RESP_OFFSET_CREATED_DATE + 8].copy_from_slice(b"notadate");
        let parsed = parse_response(&packet).unwrap();
        assert_eq!(parsed.created_date, None);
        info.created_date = None;
        assert_eq!(parsed.name, info.name);
    }
}
