//! Remote transport control (spec.md §4.9): a fire-and-forget datagram on
//! the beat/control socket (port 50001) that asks a player to start playing
//! or cue up.

use crate::device::PROLINK_MAGIC;

pub const CONTROL_PORT: u16 = 50001;
const CONTROL_SUBTYPE: u8 = 0x02;
const PACKET_LEN: usize = 0x29;
const OFFSET_HOST_NAME: usize = 0x0C;
const OFFSET_HOST_ID: usize = 0x22;
const OFFSET_MASK: usize = 0x25;
const MASK_LEN: usize = 4;

/// The two transport states a Prolink control datagram can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ControlCommand {
    Play,
    Cue,
}

impl ControlCommand {
    const fn to_wire(self) -> u8 {
        match self {
            ControlCommand::Play => 0x00,
            ControlCommand::Cue => 0x01,
        }
    }
}

/// Build a control datagram requesting `command` of `device_id` (1-indexed
/// into the mask, spec.md §4.9). Returns `None` if `device_id` doesn't fit
/// the 4-slot mask — control only ever targets physical player slots 1..=4.
pub fn build_command(host_name: &str, host_id: u8, device_id: u8, command: ControlCommand) -> Option<Vec<u8>> {
    let mask_index = usize::from(device_id.checked_sub(1)?);
    if mask_index >= MASK_LEN {
        return None;
    }

    let mut packet = vec![0u8; PACKET_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[0x0A] = CONTROL_SUBTYPE;
    let name_bytes = host_name.as_bytes();
    let copy_len = name_bytes.len().min(20);
    packet[OFFSET_HOST_NAME..OFFSET_HOST_NAME + copy_len].copy_from_slice(&name_bytes[..copy_len]);
    packet[0x20] = 0x01;
    packet[OFFSET_HOST_ID] = host_id;
    packet[0x23] = 0x00;
    packet[0x24] = 0x04;
    packet[OFFSET_MASK + mask_index] = command.to_wire();
    Some(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_play_at_the_devices_mask_slot() {
        let packet = build_command("host", 7, 2, ControlCommand::Play).unwrap();
        assert_eq!(&packet[0..10], &PROLINK_MAGIC);
        assert_eq!(packet[0x0A], CONTROL_SUBTYPE);
        assert_eq!(packet[OFFSET_HOST_ID], 7);
        assert_eq!(packet[OFFSET_MASK + 1], 0x00);
    }

    #[test]
    fn encodes_cue_at_the_devices_mask_slot() {
        let packet = build_command("host", 7, 3, ControlCommand::Cue).unwrap();
        assert_eq!(packet[OFFSET_MASK + 2], 0x01);
    }

    #[test]
    fn rejects_device_id_outside_the_mask() {
        assert!(build_command("host", 7, 9, ControlCommand::Play).is_none());
        assert!(build_command("host", 7, 0, ControlCommand::Play).is_none());
    }
}
