//! Local-media NFS client (spec.md §4.6): just enough of portmap → mount →
//! NFSv2 to pull one file off a player's exported media slot, ahead of the
//! PDB/ANLZ parsers in [`crate::localdb`] that consume it.

pub mod mount;
pub mod nfs2;
pub mod portmap;
pub mod rpc;
pub mod xdr;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::NfsRetryConfig;
use crate::error::{Error, Result};
use crate::model::SlotTag;
use mount::FileHandle;
use rpc::Connection;

struct DeviceConnections {
    mount: Connection,
    nfs: Connection,
}

/// Caches per spec.md §4.6: one set of connections per device address, and
/// one root file handle per `(address, slot)` once mounted. Both are
/// invalidated independently — a device drop clears everything for that
/// address; a stale handle is evicted and re-mounted once before a
/// [`Error::TransientNfsFailure`] is finally raised.
#[derive(Default)]
pub struct NfsClient {
    connections: Mutex<HashMap<Ipv4Addr, Arc<DeviceConnections>>>,
    root_handles: Mutex<HashMap<(Ipv4Addr, SlotTag), FileHandle>>,
}

impl NfsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached connection/root-handle for `device_ip` — called
    /// when [`crate::device::DeviceEvent::Disconnected`] fires for it.
    pub async fn forget_device(&self, device_ip: Ipv4Addr) {
        self.connections.lock().await.remove(&device_ip);
        self.root_handles.lock().await.retain(|(ip, _), _| *ip != device_ip);
    }

    async fn connections_for(&self, device_ip: Ipv4Addr, retry: &NfsRetryConfig) -> Result<Arc<DeviceConnections>> {
        if let Some(existing) = self.connections.lock().await.get(&device_ip) {
            return Ok(existing.clone());
        }

        let portmap_rpc = Connection::connect(device_ip, portmap::PORT).await?;
        let mount_port = portmap::get_port(&portmap_rpc, mount::PROGRAM, mount::VERSION, retry).await?;
        let nfs_port = portmap::get_port(&portmap_rpc, nfs2::PROGRAM, nfs2::VERSION, retry).await?;

        let entry = Arc::new(DeviceConnections {
            mount: Connection::connect(device_ip, mount_port).await?,
            nfs: Connection::connect(device_ip, nfs_port).await?,
        });
        self.connections.lock().await.insert(device_ip, entry.clone());
        Ok(entry)
    }

    async fn root_handle(&self, device_ip: Ipv4Addr, slot: SlotTag, connections: &DeviceConnections, retry: &NfsRetryConfig) -> Result<FileHandle> {
        if let Some(handle) = self.root_handles.lock().await.get(&(device_ip, slot)) {
            return Ok(*handle);
        }
        let export_path = slot.nfs_export_path().ok_or_else(|| Error::Protocol {
            reason: format!("slot {slot} has no NFS export"),
        })?;
        let handle = mount::mount(&connections.mount, export_path, retry).await?;
        self.root_handles.lock().await.insert((device_ip, slot), handle);
        Ok(handle)
    }

    async fn resolve_path(&self, device_ip: Ipv4Addr, slot: SlotTag, path: &str, connections: &DeviceConnections, retry: &NfsRetryConfig) -> Result<(FileHandle, u32)> {
        let mut handle = self.root_handle(device_ip, slot, connections, retry).await?;
        let mut size = 0;
        for component in path.trim_start_matches('/').split('/').filter(|c| !c.is_empty()) {
            let (next_handle, attrs) = nfs2::lookup(&connections.nfs, &handle, component, retry).await?;
            handle = next_handle;
            size = attrs.size;
        }
        Ok((handle, size))
    }

    /// Fetch `path` (relative to `slot`'s export root) off `device_ip`
    /// (spec.md §4.6's `fetchFile` sequence): resolve or mount the root
    /// handle, walk each path component with `lookup`, then read the whole
    /// file in [`nfs2::READ_SIZE`]-byte chunks, reporting `progress` as
    /// `(bytesRead, totalBytes)` after each one.
    ///
    /// A lookup/read failure against a cached root handle evicts that
    /// handle once and retries the whole resolve — a stale mount from a
    /// media swap is the common case. A second failure surfaces as
    /// [`Error::TransientNfsFailure`].
    pub async fn fetch_file(
        &self,
        device_ip: Ipv4Addr,
        slot: SlotTag,
        path: &str,
        retry: &NfsRetryConfig,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<Vec<u8>> {
        let connections = self.connections_for(device_ip, retry).await?;

        let (file_handle, size) = match self.resolve_path(device_ip, slot, path, &connections, retry).await {
            Ok(result) => result,
            Err(_) => {
                self.root_handles.lock().await.remove(&(device_ip, slot));
                self.resolve_path(device_ip, slot, path, &connections, retry)
                    .await
                    .map_err(|e| Error::TransientNfsFailure { reason: e.to_string() })?
            }
        };

        let mut buffer = Vec::with_capacity(size as usize);
        let mut read_offset = 0u32;
        while (buffer.len() as u32) < size {
            let chunk = nfs2::read(&connections.nfs, &file_handle, read_offset, retry).await?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
            read_offset += chunk.len() as u32;
            progress(buffer.len() as u64, size as u64);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forget_device_clears_both_caches() {
        let client = NfsClient::new();
        let addr: Ipv4Addr = "10.0.0.1".parse().unwrap();
        client.root_handles.lock().await.insert((addr, SlotTag::Usb), [0u8; 32]);
        client.forget_device(addr).await;
        assert!(client.root_handles.lock().await.is_empty());
    }
}
