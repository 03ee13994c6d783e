//! Crate-wide error taxonomy.
//!
//! Matches spec.md §7: protocol violations and exhausted retries are the
//! only conditions that cross the public API boundary as `Err`. Timeouts,
//! strategy-unavailable and a missing rekordbox export are not errors — the
//! affected call returns `None` instead (see `device::DeviceManager::get_device_ensured`,
//! `facade`, and `localdb`).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, wrong message/sub-packet type, or an impossible declared
    /// length. The connection this occurred on should be considered dead.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// A response's message type didn't match what the caller sent the
    /// request expecting.
    #[error("unexpected message type: expected 0x{expected:04x}, got 0x{got:04x}")]
    UnexpectedMessageType { expected: u16, got: u16 },

    /// An ONC-RPC call exhausted its retry policy.
    #[error("rpc call failed after {attempts} attempt(s): {reason}")]
    RpcRetriesExhausted { attempts: u32, reason: String },

    /// NFS lookup/read failed on a freshly re-discovered root handle, i.e.
    /// the one eviction-and-retry the spec allows was not enough.
    #[error("nfs operation failed after refreshing the mount: {reason}")]
    TransientNfsFailure { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
