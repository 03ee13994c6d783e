//! Virtual player: periodically broadcasts this host's own presence
//! (spec.md §4.3).
//!
//! Two datagrams keep the virtual player visible and "modern" to the rest of
//! the network: an announce packet every 1500 ms (port 50000, the same shape
//! [`crate::device`] parses) and a keepalive status packet on port 50002,
//! without which some players decide the virtual CDJ is running old firmware
//! and stop sending it metadata.

use std::net::Ipv4Addr;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::Context;
use tokio::net::UdpSocket;

use crate::device::{self, PROLINK_MAGIC};
use crate::model::DeviceType;

pub const STATUS_PORT: u16 = 50002;
const ANNOUNCE_INTERVAL: Duration = Duration::from_millis(1500);

/// Virtual-CDJ firmware string (spec.md §6's magic constants table). Reported
/// in the keepalive status packet so peers don't flag the host as outdated.
pub const FIRMWARE_VERSION: &str = "1.43";
pub const DEFAULT_VCDJ_ID: u8 = crate::config::DEFAULT_VCDJ_ID;

/// Status-packet length floor from spec.md §4.4 ("packets ≥ 0xFF bytes … are
/// decoded"); the keepalive must clear it or real players will ignore it as a
/// short/truncated status datagram.
const STATUS_PACKET_LEN: usize = 0xFF;
const STATUS_SUBTYPE: u8 = 0x0A;

pub struct Announcer {
    announce_socket: UdpSocket,
    status_socket: UdpSocket,
    broadcast_addr: Ipv4Addr,
    host_name: String,
    mac: [u8; 6],
    ip: Ipv4Addr,
    vcdj_id: u8,
}

impl Announcer {
    pub fn new(
        announce_socket: UdpSocket,
        status_socket: UdpSocket,
        broadcast_addr: Ipv4Addr,
        host_name: impl Into<String>,
        mac: [u8; 6],
        ip: Ipv4Addr,
        vcdj_id: u8,
    ) -> Self {
        Self {
            announce_socket,
            status_socket,
            broadcast_addr,
            host_name: host_name.into(),
            mac,
            ip,
            vcdj_id,
        }
    }

    /// Broadcasts forever at [`ANNOUNCE_INTERVAL`]. Run this as its own task.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(ANNOUNCE_INTERVAL);
        loop {
            ticker.tick().await;
            self.send_announce().await?;
            self.send_status().await?;
        }
    }

    async fn send_announce(&self) -> Result<()> {
        let packet = device::build_announce(
            &self.host_name,
            self.vcdj_id,
            self.mac,
            self.ip,
            DeviceType::Cdj,
        );
        self.announce_socket
            .send_to(&packet, (self.broadcast_addr, device::ANNOUNCE_PORT))
            .await
            .wrap_err("sending virtual-player announce")?;
        Ok(())
    }

    async fn send_status(&self) -> Result<()> {
        let packet = build_keepalive_status(&self.host_name, self.vcdj_id);
        self.status_socket
            .send_to(&packet, (self.broadcast_addr, STATUS_PORT))
            .await
            .wrap_err("sending virtual-player keepalive status")?;
        Ok(())
    }
}

/// Minimal status-shaped packet carrying the host name, id and firmware
/// string, padded to [`STATUS_PACKET_LEN`]. Spec.md §4.3 requires this
/// datagram's existence but not an exact byte layout beyond the length floor
/// and that it carry these three values; this layout mirrors the announce
/// packet's name/id placement for consistency with [`device::parse_announce`].
fn build_keepalive_status(host_name: &str, vcdj_id: u8) -> Vec<u8> {
    let mut packet = vec![0u8; STATUS_PACKET_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[0x0A] = STATUS_SUBTYPE;
    let name_bytes = host_name.as_bytes();
    let copy_len = name_bytes.len().min(20);
    packet[0x0C..0x0C + copy_len].copy_from_slice(&name_bytes[..copy_len]);
    packet[0x24] = vcdj_id;
    let firmware = FIRMWARE_VERSION.as_bytes();
    packet[0x28..0x28 + firmware.len()].copy_from_slice(firmware);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_status_clears_length_floor() {
        let packet = build_keepalive_status("host", DEFAULT_VCDJ_ID);
        assert!(packet.len() >= STATUS_PACKET_LEN);
    }

    #[test]
    fn keepalive_status_carries_name_id_and_firmware() {
        let packet = build_keepalive_status("CDJ-host", 3);
        assert_eq!(&packet[0..10], &PROLINK_MAGIC);
        assert_eq!(&packet[0x0C..0x0C + 8], b"CDJ-host");
        assert_eq!(packet[0x24], 3);
        assert_eq!(&packet[0x28..0x28 + 4], FIRMWARE_VERSION.as_bytes());
    }

    #[tokio::test]
    async fn send_announce_delivers_a_parseable_packet() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener_addr = listener.local_addr().unwrap();

        let announcer = Announcer::new(
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            Ipv4Addr::new(127, 0, 0, 1),
            "virtual-cdj",
            [0, 0, 0, 0, 0, 1],
            Ipv4Addr::new(127, 0, 0, 1),
            DEFAULT_VCDJ_ID,
        );
        announcer
            .announce_socket
            .send_to(
                &device::build_announce(
                    "virtual-cdj",
                    DEFAULT_VCDJ_ID,
                    [0, 0, 0, 0, 0, 1],
                    Ipv4Addr::new(127, 0, 0, 1),
                    DeviceType::Cdj,
                ),
                listener_addr,
            )
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = listener.recv_from(&mut buf).await.unwrap();
        let device = device::parse_announce(&buf[..len]).unwrap();
        assert_eq!(device.name, "virtual-cdj");
        assert_eq!(device.id, DEFAULT_VCDJ_ID);
    }
}
