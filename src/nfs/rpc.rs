//! ONC-RPC call/reply framing (RFC 1057) over UDP (spec.md §4.6): the
//! generic envelope every portmap/mount/NFSv2 call rides inside.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::config::NfsRetryConfig;
use crate::error::{Error, Result};

use super::xdr::{self, write_u32};

const MSG_TYPE_CALL: u32 = 0;
const MSG_TYPE_REPLY: u32 = 1;
const RPC_VERSION: u32 = 2;
const REPLY_ACCEPTED: u32 = 0;
const ACCEPT_SUCCESS: u32 = 0;
const AUTH_NONE: u32 = 0;
const AUTH_UNIX: u32 = 1;
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Fixed stamp Pioneer's NFS server expects in the `AUTH_UNIX` credential
/// body (spec.md §4.6) in place of a real machine-local value.
const AUTH_STAMP: u32 = 0x967B8703;

/// One UDP socket per device/program, serialized by a mutex and a
/// monotonic xid — the same "one connection, one mutex" shape
/// [`crate::remotedb::Connection`] uses for its TCP session.
pub struct Connection {
    socket: UdpSocket,
    next_xid: AtomicU32,
    call_lock: Mutex<()>,
}

impl Connection {
    pub async fn connect(device_ip: Ipv4Addr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((device_ip, port)).await?;
        Ok(Self { socket, next_xid: AtomicU32::new(1), call_lock: Mutex::new(()) })
    }

    /// Issue `procedure` of `program`/`version` with `args` already XDR-encoded,
    /// retrying per `retry` on timeout or a malformed reply. Returns the
    /// proc-specific result bytes with the generic RPC envelope stripped.
    pub async fn call(&self, program: u32, version: u32, procedure: u32, args: &[u8], retry: &NfsRetryConfig) -> Result<Vec<u8>> {
        let _guard = self.call_lock.lock().await;
        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst);
        let request = Self::build_call(xid, program, version, procedure, args);

        let mut last_reason = String::new();
        for attempt in 0..retry.attempts.max(1) {
            if attempt > 0 {
                sleep(Self::backoff_delay(retry, attempt)).await;
            }
            if let Err(e) = self.socket.send(&request).await {
                last_reason = e.to_string();
                continue;
            }
            match timeout(REPLY_TIMEOUT, self.recv_matching(xid)).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => last_reason = e.to_string(),
                Err(_) => last_reason = "timed out awaiting rpc reply".to_string(),
            }
        }
        Err(Error::RpcRetriesExhausted { attempts: retry.attempts, reason: last_reason })
    }

    fn backoff_delay(retry: &NfsRetryConfig, attempt: u32) -> Duration {
        if retry.jitter.is_zero() {
            return retry.base_delay * attempt;
        }
        let nanos_now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        let jitter = Duration::from_nanos(nanos_now % retry.jitter.as_nanos().max(1) as u64);
        retry.base_delay * attempt + jitter
    }

    async fn recv_matching(&self, xid: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let len = self.socket.recv(&mut buf).await?;
            let data = &buf[..len];
            let mut offset = 0;
            let reply_xid = xdr::read_u32(data, &mut offset)?;
            if reply_xid != xid {
                continue;
            }
            let msg_type = xdr::read_u32(data, &mut offset)?;
            if msg_type != MSG_TYPE_REPLY {
                return Err(Error::Protocol { reason: "expected rpc reply, got a call".to_string() });
            }
            let reply_stat = xdr::read_u32(data, &mut offset)?;
            if reply_stat != REPLY_ACCEPTED {
                return Err(Error::Protocol { reason: format!("rpc call rejected, reply_stat {reply_stat}") });
            }
            let _verf_flavor = xdr::read_u32(data, &mut offset)?;
            let verf_len = xdr::read_u32(data, &mut offset)? as usize;
            offset += (verf_len + 3) & !3;
            let accept_stat = xdr::read_u32(data, &mut offset)?;
            if accept_stat != ACCEPT_SUCCESS {
                return Err(Error::Protocol { reason: format!("rpc call failed, accept_stat {accept_stat}") });
            }
            return Ok(data[offset..].to_vec());
        }
    }

    fn build_call(xid: u32, program: u32, version: u32, procedure: u32, args: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + args.len());
        write_u32(&mut buf, xid);
        write_u32(&mut buf, MSG_TYPE_CALL);
        write_u32(&mut buf, RPC_VERSION);
        write_u32(&mut buf, program);
        write_u32(&mut buf, version);
        write_u32(&mut buf, procedure);
        write_u32(&mut buf, AUTH_UNIX);
        xdr::write_opaque(&mut buf, &Self::auth_unix_body());
        write_u32(&mut buf, AUTH_NONE);
        xdr::write_opaque(&mut buf, &[]);
        buf.extend_from_slice(args);
        buf
    }

    fn auth_unix_body() -> Vec<u8> {
        let mut body = Vec::new();
        write_u32(&mut body, AUTH_STAMP);
        xdr::write_str_ascii(&mut body, "");
        write_u32(&mut body, 0); // uid
        write_u32(&mut body, 0); // gid
        write_u32(&mut body, 0); // auxiliary gids count
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_call_envelope_is_4_byte_aligned() {
        let call = Connection::build_call(1, 100000, 2, 3, &[]);
        assert_eq!(call.len() % 4, 0);
    }
}
