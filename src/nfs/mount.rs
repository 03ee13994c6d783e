//! Mount protocol (RFC 1094 program 100005, version 1): turns a slot's
//! export path (`SlotTag::nfs_export_path`) into an NFS root file handle
//! (spec.md §4.6).

use super::rpc::Connection;
use super::xdr;
use crate::config::NfsRetryConfig;
use crate::error::{Error, Result};

pub const PROGRAM: u32 = 100005;
pub const VERSION: u32 = 1;
const PROC_MOUNT: u32 = 1;
const PROC_EXPORT: u32 = 5;
const STATUS_OK: u32 = 0;

pub type FileHandle = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub filesystem: String,
    pub groups: Vec<String>,
}

pub async fn mount(conn: &Connection, filesystem: &str, retry: &NfsRetryConfig) -> Result<FileHandle> {
    let mut args = Vec::new();
    xdr::write_str_utf16le(&mut args, filesystem);
    let reply = conn.call(PROGRAM, VERSION, PROC_MOUNT, &args, retry).await?;
    let mut offset = 0;
    let status = xdr::read_u32(&reply, &mut offset)?;
    if status != STATUS_OK {
        return Err(Error::Protocol { reason: format!("mount {filesystem} failed with status {status}") });
    }
    xdr::read_fixed_opaque::<32>(&reply, &mut offset)
}

/// Walks the linked list of export entries (each `{filesystem, groups}`, a
/// terminating zero `value_follows` flag) that `MOUNTPROC_EXPORT` returns.
pub async fn export(conn: &Connection, retry: &NfsRetryConfig) -> Result<Vec<ExportEntry>> {
    let reply = conn.call(PROGRAM, VERSION, PROC_EXPORT, &[], retry).await?;
    let mut offset = 0;
    let mut entries = Vec::new();
    loop {
        if xdr::read_u32(&reply, &mut offset)? == 0 {
            break;
        }
        let filesystem = xdr::read_str_utf16le(&reply, &mut offset)?;
        let mut groups = Vec::new();
        loop {
            if xdr::read_u32(&reply, &mut offset)? == 0 {
                break;
            }
            groups.push(xdr::read_str_utf16le(&reply, &mut offset)?);
        }
        entries.push(ExportEntry { filesystem, groups });
    }
    Ok(entries)
}
