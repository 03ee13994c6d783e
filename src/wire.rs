//! Typed binary field codec shared by the remote database protocol.
//!
//! Every argument on the remote database wire (see [`crate::remotedb`]) is
//! preceded by a one-byte type tag. This module knows how to read and write
//! exactly those five tagged shapes; it does not know anything about message
//! framing, argument counts, or the empty-binary quirk (see
//! `remotedb::wire`), which are a layer up.

pub mod field;

pub use field::{Field, FieldKind};
