//! Portmap (RFC 1057 program 100000, version 2): resolves the dynamic UDP
//! port a device's mount/NFS service is actually listening on (spec.md
//! §4.6) — analogous to `remotedb::discover_port`'s TCP equivalent.

use super::rpc::Connection;
use super::xdr::{self, write_u32};
use crate::config::NfsRetryConfig;
use crate::error::Result;

pub const PORT: u16 = 111;
const PROGRAM: u32 = 100000;
const VERSION: u32 = 2;
const PROC_GETPORT: u32 = 3;
const PROTOCOL_UDP: u32 = 17;

pub async fn get_port(conn: &Connection, program: u32, version: u32, retry: &NfsRetryConfig) -> Result<u16> {
    let mut args = Vec::new();
    write_u32(&mut args, program);
    write_u32(&mut args, version);
    write_u32(&mut args, PROTOCOL_UDP);
    write_u32(&mut args, 0);
    let reply = conn.call(PROGRAM, VERSION, PROC_GETPORT, &args, retry).await?;
    let mut offset = 0;
    Ok(xdr::read_u32(&reply, &mut offset)? as u16)
}
