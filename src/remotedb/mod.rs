//! Remote database client (spec.md §4.5): queries another device's own
//! rekordbox-compatible metadata server over TCP instead of reading its
//! exported database file directly.
//!
//! Shape: discover the dynamic service port from the well-known discovery
//! port, open a session, then serialize every request/response pair behind
//! one mutex per connection — mirroring the single-in-flight-request
//! assumption [`crate::mpd_client`]'s command loop makes about its own
//! socket, generalized from a text protocol to a framed binary one.

pub mod menu;
pub mod query;
pub mod wire;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::wire::field::Field;
use wire::Message;

pub const DISCOVERY_PORT: u16 = 12523;
const DISCOVERY_SERVICE_NAME: &str = "RemoteDBServer";
const SESSION_PREAMBLE: u32 = 0x0000_0001;
/// Transaction id reserved for connection-lifecycle messages that don't
/// belong to the normal per-request counter (introduce, disconnect).
const LIFECYCLE_TXID: u32 = 0xFFFF_FFFE;

const MSG_TYPE_INTRODUCE: u16 = 0x0000;
const MSG_TYPE_DISCONNECT: u16 = 0x0100;
pub(crate) const MSG_TYPE_SUCCESS: u16 = 0x4000;

/// Probe the well-known discovery port and return the dynamic port the
/// device's database server is actually listening on.
pub async fn discover_port(device_ip: Ipv4Addr) -> Result<u16> {
    let mut stream = TcpStream::connect((device_ip, DISCOVERY_PORT)).await?;

    let mut probe = Vec::with_capacity(4 + DISCOVERY_SERVICE_NAME.len() + 1);
    probe.extend_from_slice(&(DISCOVERY_SERVICE_NAME.len() as u32).to_be_bytes());
    probe.extend_from_slice(DISCOVERY_SERVICE_NAME.as_bytes());
    probe.push(0);
    stream.write_all(&probe).await?;

    Ok(stream.read_u16().await?)
}

/// One TCP connection to a device's database server: a single socket, one
/// mutex serializing every request/response pair, and a monotonically
/// increasing transaction id (spec.md §4.5).
pub struct Connection {
    stream: Mutex<BufWriter<BufReader<TcpStream>>>,
    next_txid: AtomicU32,
}

impl Connection {
    /// Connect to `device_ip:service_port` and run the session handshake:
    /// a 4-byte preamble, then an `Introduce` carrying `host_id`.
    pub async fn establish(device_ip: Ipv4Addr, service_port: u16, host_id: u8) -> Result<Self> {
        let mut stream = TcpStream::connect((device_ip, service_port)).await?;
        stream.write_u32(SESSION_PREAMBLE).await?;
        let echoed = stream.read_u32().await?;
        if echoed != SESSION_PREAMBLE {
            return Err(Error::Protocol {
                reason: format!("session preamble mismatch: expected {SESSION_PREAMBLE:#x}, got {echoed:#x}"),
            });
        }

        let connection = Self {
            stream: Mutex::new(BufWriter::new(BufReader::new(stream))),
            next_txid: AtomicU32::new(1),
        };

        let introduce = Message::new(LIFECYCLE_TXID, MSG_TYPE_INTRODUCE, vec![Field::U32(host_id as u32)]);
        let response = connection.exchange(introduce).await?;
        if response.msg_type != MSG_TYPE_SUCCESS {
            return Err(Error::UnexpectedMessageType { expected: MSG_TYPE_SUCCESS, got: response.msg_type });
        }
        Ok(connection)
    }

    /// Send `request` and read back exactly one response, holding the
    /// connection mutex for the whole round trip. Does not validate the
    /// response's txid/type — callers that expect a specific shape use
    /// [`Connection::request`].
    async fn exchange(&self, request: Message) -> Result<Message> {
        let mut stream = self.stream.lock().await;
        wire::write_message(&mut *stream, &request).await?;
        stream.flush().await?;
        wire::read_message(&mut *stream).await
    }

    /// Issue a request with a freshly allocated txid and validate the
    /// response matches both that txid and `expected_type`.
    pub async fn request(&self, msg_type: u16, args: Vec<Field>, expected_type: u16) -> Result<Message> {
        let txid = self.next_txid.fetch_add(1, Ordering::SeqCst);
        let response = self.exchange(Message::new(txid, msg_type, args)).await?;
        if response.txid != txid {
            return Err(Error::Protocol {
                reason: format!("txid mismatch: sent {txid}, got {}", response.txid),
            });
        }
        if response.msg_type != expected_type {
            return Err(Error::UnexpectedMessageType { expected: expected_type, got: response.msg_type });
        }
        Ok(response)
    }

    /// Allocate a txid without sending anything — used by callers (the
    /// paged menu renderer) that build their own [`Message`].
    pub(crate) fn alloc_txid(&self) -> u32 {
        self.next_txid.fetch_add(1, Ordering::SeqCst)
    }

    /// Send `request` and read back `replies` messages in sequence, holding
    /// the connection mutex for the whole exchange. Used by `RenderMenu`
    /// (spec.md §4.5), which answers one request with a `MenuHeader`, then
    /// `limit` `MenuItem`s, then a `MenuFooter` — not the usual one-reply
    /// shape [`Connection::request`] assumes.
    pub(crate) async fn request_many(&self, request: Message, replies: usize) -> Result<Vec<Message>> {
        let mut stream = self.stream.lock().await;
        wire::write_message(&mut *stream, &request).await?;
        stream.flush().await?;
        let mut out = Vec::with_capacity(replies);
        for _ in 0..replies {
            out.push(wire::read_message(&mut *stream).await?);
        }
        Ok(out)
    }

    /// Send an unsolicited `Disconnect` and drop the socket. Spec.md §4.5
    /// doesn't expect or wait for a reply.
    pub async fn disconnect(&self) -> Result<()> {
        let mut stream = self.stream.lock().await;
        wire::write_message(&mut *stream, &Message::new(LIFECYCLE_TXID, MSG_TYPE_DISCONNECT, vec![])).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Owns one [`Connection`] per device, handed out on first `connection()`
/// and reused afterward (spec.md §4.5's "QueryInterface" contract).
pub struct RemoteDatabaseClient {
    host_id: u8,
    connections: Mutex<HashMap<u8, Arc<Connection>>>,
}

impl RemoteDatabaseClient {
    pub fn new(host_id: u8) -> Self {
        Self { host_id, connections: Mutex::new(HashMap::new()) }
    }

    pub async fn connection(&self, device_id: u8, device_ip: Ipv4Addr) -> Result<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get(&device_id) {
            return Ok(connection.clone());
        }

        let service_port = discover_port(device_ip).await?;
        let connection = Arc::new(Connection::establish(device_ip, service_port, self.host_id).await?);
        connections.insert(device_id, connection.clone());
        Ok(connection)
    }

    /// Drop and disconnect the cached connection for `device_id`, if any.
    /// Called when [`crate::device::DeviceEvent::Disconnected`] fires.
    pub async fn drop_connection(&self, device_id: u8) {
        let connection = self.connections.lock().await.remove(&device_id);
        if let Some(connection) = connection {
            let _ = connection.disconnect().await;
        }
    }
}

/// Pack `[host_id, menu_target, slot, track_type]` into the single u32
/// descriptor argument every query in spec.md §4.5's catalog leads with.
pub(crate) fn descriptor(host_id: u8, slot: crate::model::SlotTag, track_type: crate::model::TrackType) -> u32 {
    const MENU_TARGET: u8 = 0x01;
    u32::from_be_bytes([host_id, MENU_TARGET, slot.to_wire(), track_type.to_wire_byte()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SlotTag, TrackType};

    #[test]
    fn descriptor_packs_four_bytes_big_endian() {
        let packed = descriptor(7, SlotTag::Usb, TrackType::Rb);
        assert_eq!(packed.to_be_bytes(), [7, 0x01, SlotTag::Usb.to_wire(), TrackType::Rb.to_wire_byte()]);
    }
}
