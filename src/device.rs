//! Live device set derived from announce datagrams (spec.md §4.2).
//!
//! One task owns the announce socket and calls [`DeviceManager::handle_datagram`]
//! per packet plus a periodic sweep; everything else reads the live set through
//! [`DeviceManager::devices`]/[`DeviceManager::get`] or subscribes to
//! [`DeviceEvent`]s.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::Context;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::model::{Device, DeviceType};

pub const ANNOUNCE_PORT: u16 = 50000;
pub(crate) const PROLINK_MAGIC: [u8; 10] =
    [0x51, 0x73, 0x70, 0x74, 0x31, 0x57, 0x6d, 0x4a, 0x4f, 0x4c];
const ANNOUNCE_SUBTYPE: u8 = 0x06;
const ANNOUNCE_PACKET_LEN: usize = 0x35;

const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Device presence transition, spec.md §4.2's `on(connected|announced|disconnected, …)`
/// contract expressed as a broadcast stream. `Announced` fires on every packet
/// including the one that also fires `Connected`; `subscribe()` plus a single
/// `.recv()` covers the spec's `once`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(Device),
    Announced(Device),
    Disconnected(u8),
}

struct LiveDevice {
    device: Device,
    last_seen: Instant,
}

pub struct DeviceManager {
    live: RwLock<HashMap<u8, LiveDevice>>,
    events: broadcast::Sender<DeviceEvent>,
    host_name: String,
    device_timeout: RwLock<Duration>,
}

impl DeviceManager {
    pub fn new(host_name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            live: RwLock::new(HashMap::new()),
            events,
            host_name: host_name.into(),
            device_timeout: RwLock::new(DEFAULT_LIVENESS_TIMEOUT),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.live
            .read()
            .expect("device live-set lock poisoned")
            .values()
            .map(|entry| entry.device.clone())
            .collect()
    }

    pub fn get(&self, id: u8) -> Option<Device> {
        self.live
            .read()
            .expect("device live-set lock poisoned")
            .get(&id)
            .map(|entry| entry.device.clone())
    }

    /// Resolves immediately if `id` is already live; otherwise waits up to
    /// `timeout` for a matching `Connected` event. Never errors — absence is
    /// `None`, matching spec.md §4.2 ("never throws").
    pub async fn get_device_ensured(&self, id: u8, timeout: Duration) -> Option<Device> {
        if let Some(device) = self.get(id) {
            return Some(device);
        }

        let mut events = self.subscribe();
        let wait_for_connect = async {
            loop {
                match events.recv().await {
                    Ok(DeviceEvent::Connected(device)) if device.id == id => return Some(device),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        tokio::time::timeout(timeout, wait_for_connect)
            .await
            .ok()
            .flatten()
    }

    pub fn reconfigure(&self, device_timeout: Duration) {
        *self.device_timeout.write().expect("device timeout lock poisoned") = device_timeout;
    }

    /// Reads announce datagrams from `socket` until it errors. Intended to run
    /// as its own task for the lifetime of the connection to the network.
    pub async fn run(&self, socket: UdpSocket) -> Result<()> {
        let mut buf = [0u8; 1024];
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, _) = received.wrap_err("reading announce datagram")?;
                    self.handle_datagram(&buf[..len]);
                }
                _ = sweep.tick() => self.sweep_expired(),
            }
        }
    }

    pub(crate) fn handle_datagram(&self, data: &[u8]) {
        let Some(device) = parse_announce(data) else {
            return;
        };
        if device.name == self.host_name {
            return;
        }

        let now = Instant::now();
        let is_new = {
            let mut live = self.live.write().expect("device live-set lock poisoned");
            let is_new = !live.contains_key(&device.id);
            live.insert(
                device.id,
                LiveDevice { device: device.clone(), last_seen: now },
            );
            is_new
        };

        if is_new {
            let _ = self.events.send(DeviceEvent::Connected(device.clone()));
        }
        let _ = self.events.send(DeviceEvent::Announced(device));
    }

    fn sweep_expired(&self) {
        let timeout = *self.device_timeout.read().expect("device timeout lock poisoned");
        let now = Instant::now();
        let expired: Vec<u8> = {
            let live = self.live.read().expect("device live-set lock poisoned");
            live.iter()
                .filter(|(_, entry)| now.duration_since(entry.last_seen) > timeout)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return;
        }

        let mut live = self.live.write().expect("device live-set lock poisoned");
        for id in expired {
            live.remove(&id);
            let _ = self.events.send(DeviceEvent::Disconnected(id));
        }
    }
}

/// Parse an announce datagram per spec.md §4.2's fixed offsets. Returns `None`
/// on bad magic, wrong sub-type, short length, or an unrecognized device type
/// — all "malformed packet" cases the spec says to silently drop.
pub(crate) fn parse_announce(data: &[u8]) -> Option<Device> {
    if data.len() < ANNOUNCE_PACKET_LEN || data[0..10] != PROLINK_MAGIC {
        return None;
    }
    if data[0x0A] != ANNOUNCE_SUBTYPE {
        return None;
    }

    let name = String::from_utf8_lossy(&data[0x0C..0x20])
        .trim_end_matches('\0')
        .to_string();
    let id = data[0x24];
    let mac: [u8; 6] = data[0x26..0x2C].try_into().ok()?;
    let ip = Ipv4Addr::new(data[0x2C], data[0x2D], data[0x2E], data[0x2F]);
    let device_type = DeviceType::from_wire(data[0x34])?;

    Some(Device { id, name, device_type, mac, ip })
}

/// Build an announce datagram for `name`/`id`/`device_type`, the inverse of
/// [`parse_announce`]. Used both by [`crate::announcer`] and by this module's
/// roundtrip tests.
pub(crate) fn build_announce(name: &str, id: u8, mac: [u8; 6], ip: Ipv4Addr, device_type: DeviceType) -> Vec<u8> {
    let mut packet = vec![0u8; ANNOUNCE_PACKET_LEN];
    packet[0..10].copy_from_slice(&PROLINK_MAGIC);
    packet[0x0A] = ANNOUNCE_SUBTYPE;
    let name_bytes = name.as_bytes();
    let copy_len = name_bytes.len().min(20);
    packet[0x0C..0x0C + copy_len].copy_from_slice(&name_bytes[..copy_len]);
    packet[0x24] = id;
    packet[0x26..0x2C].copy_from_slice(&mac);
    packet[0x2C..0x30].copy_from_slice(&ip.octets());
    packet[0x34] = device_type.to_wire();
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Vec<u8> {
        build_announce(
            "CDJ-2000nexus",
            2,
            [0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f],
            Ipv4Addr::new(192, 168, 1, 43),
            DeviceType::Cdj,
        )
    }

    #[test]
    fn parses_well_formed_announce() {
        let device = parse_announce(&sample_packet()).unwrap();
        assert_eq!(device.id, 2);
        assert_eq!(device.name, "CDJ-2000nexus");
        assert_eq!(device.device_type, DeviceType::Cdj);
        assert_eq!(device.mac, [0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f]);
        assert_eq!(device.ip, Ipv4Addr::new(192, 168, 1, 43));
    }

    #[test]
    fn rejects_short_packet() {
        assert!(parse_announce(&[0u8; 10]).is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut packet = sample_packet();
        packet[0] = 0x00;
        assert!(parse_announce(&packet).is_none());
    }

    #[test]
    fn rejects_wrong_subtype() {
        let mut packet = sample_packet();
        packet[0x0A] = 0x09;
        assert!(parse_announce(&packet).is_none());
    }

    #[test]
    fn rejects_unknown_device_type() {
        let mut packet = sample_packet();
        packet[0x34] = 0xEE;
        assert!(parse_announce(&packet).is_none());
    }

    #[tokio::test]
    async fn connected_fires_once_then_announced_repeats() {
        let manager = DeviceManager::new("host");
        let mut events = manager.subscribe();
        let packet = sample_packet();

        manager.handle_datagram(&packet);
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Connected(parse_announce(&packet).unwrap())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Announced(parse_announce(&packet).unwrap())
        );

        manager.handle_datagram(&packet);
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Announced(parse_announce(&packet).unwrap())
        );
    }

    #[test]
    fn ignores_datagram_matching_host_name() {
        let manager = DeviceManager::new("CDJ-2000nexus");
        manager.handle_datagram(&sample_packet());
        assert!(manager.get(2).is_none());
    }

    #[tokio::test]
    async fn get_device_ensured_resolves_on_later_connect() {
        let manager = std::sync::Arc::new(DeviceManager::new("host"));
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_device_ensured(2, Duration::from_secs(1)).await })
        };
        tokio::task::yield_now().await;
        manager.handle_datagram(&sample_packet());

        let device = waiter.await.unwrap();
        assert_eq!(device.unwrap().id, 2);
    }

    #[tokio::test]
    async fn get_device_ensured_times_out() {
        let manager = DeviceManager::new("host");
        let device = manager.get_device_ensured(9, Duration::from_millis(20)).await;
        assert!(device.is_none());
    }
}
