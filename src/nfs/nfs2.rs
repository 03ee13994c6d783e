//! NFSv2 (RFC 1094 program 100003, version 2): just `lookup` and `read`,
//! the two calls spec.md §4.6 needs to walk a path from a root handle and
//! pull a file's bytes in `READ_SIZE` chunks.

use super::mount::FileHandle;
use super::rpc::Connection;
use super::xdr::{self, write_u32};
use crate::config::NfsRetryConfig;
use crate::error::{Error, Result};

pub const PROGRAM: u32 = 100003;
pub const VERSION: u32 = 2;
const PROC_LOOKUP: u32 = 4;
const PROC_READ: u32 = 6;
const STATUS_OK: u32 = 0;

/// Bytes requested per `read` call (spec.md §4.6).
pub const READ_SIZE: u32 = 2048;

#[derive(Debug, Clone, Copy)]
pub struct FileAttributes {
    pub file_type: u32,
    pub size: u32,
}

/// NFSv2 `fattr`: type, mode, nlink, uid, gid, size, blocksize, rdev,
/// blocks, fsid, fileid, then three `{seconds, useconds}` timestamps. Only
/// `file_type` and `size` are useful to this client; the rest is consumed
/// to keep the cursor aligned and discarded.
fn read_fattr(data: &[u8], offset: &mut usize) -> Result<FileAttributes> {
    let file_type = xdr::read_u32(data, offset)?;
    for _ in 0..4 {
        xdr::read_u32(data, offset)?; // mode, nlink, uid, gid
    }
    let size = xdr::read_u32(data, offset)?;
    for _ in 0..11 {
        xdr::read_u32(data, offset)?; // blocksize, rdev, blocks, fsid, fileid, 3x{seconds,useconds}
    }
    Ok(FileAttributes { file_type, size })
}

pub async fn lookup(conn: &Connection, dir: &FileHandle, filename: &str, retry: &NfsRetryConfig) -> Result<(FileHandle, FileAttributes)> {
    let mut args = Vec::new();
    xdr::write_fixed_opaque(&mut args, dir);
    xdr::write_str_utf16le(&mut args, filename);
    let reply = conn.call(PROGRAM, VERSION, PROC_LOOKUP, &args, retry).await?;
    let mut offset = 0;
    let status = xdr::read_u32(&reply, &mut offset)?;
    if status != STATUS_OK {
        return Err(Error::Protocol { reason: format!("nfs lookup {filename} failed with status {status}") });
    }
    let handle = xdr::read_fixed_opaque::<32>(&reply, &mut offset)?;
    let attrs = read_fattr(&reply, &mut offset)?;
    Ok((handle, attrs))
}

pub async fn read(conn: &Connection, handle: &FileHandle, offset_bytes: u32, retry: &NfsRetryConfig) -> Result<Vec<u8>> {
    let mut args = Vec::new();
    xdr::write_fixed_opaque(&mut args, handle);
    write_u32(&mut args, offset_bytes);
    write_u32(&mut args, READ_SIZE);
    write_u32(&mut args, 0);
    let reply = conn.call(PROGRAM, VERSION, PROC_READ, &args, retry).await?;
    let mut offset = 0;
    let status = xdr::read_u32(&reply, &mut offset)?;
    if status != STATUS_OK {
        return Err(Error::Protocol { reason: format!("nfs read failed with status {status}") });
    }
    let _attrs = read_fattr(&reply, &mut offset)?;
    xdr::read_opaque(&reply, &mut offset)
}
