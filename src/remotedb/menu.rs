//! Paged menu rendering (spec.md §4.5): the `RenderMenu` request answers
//! with a `MenuHeader`, then exactly `limit` `MenuItem` frames, then a
//! `MenuFooter` — never fewer, never more (spec.md §8 invariant 7). Every
//! catalog entry that returns a list (`GetMetadata`, `GetGenericMetadata`,
//! `GetTrackInfo`, `MenuPlaylist`) hands back a [`MenuPages`] over this
//! shared mechanism instead of repeating the paging logic per query.
//!
//! Byte layout for `MenuItem`'s 12 arguments, and the numeric `itemType`
//! codes matched in [`decode_menu_item`], aren't pinned by spec.md beyond
//! "decode per item type" — this module's assignment is internally
//! consistent but otherwise invented, the same way `status.rs` had to
//! invent a keepalive layout spec.md never specifies.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::wire::field::Field;

use super::Connection;
use super::wire::Message;

const MSG_TYPE_RENDER_MENU: u16 = 0x3000;
const MSG_TYPE_MENU_HEADER: u16 = 0x4001;
const MSG_TYPE_MENU_ITEM: u16 = 0x4101;
const MSG_TYPE_MENU_FOOTER: u16 = 0x4201;

/// Items fetched per `RenderMenu` round trip; the enumeration pre-fetches
/// the next page once the caller has drained the current one down to this
/// boundary.
const PAGE_SIZE: u32 = 64;

const ITEM_TYPE_FOLDER: u32 = 0x01;
const ITEM_TYPE_TRACK: u32 = 0x02;
const ITEM_TYPE_PLAYLIST: u32 = 0x03;
const ITEM_TYPE_ARTIST: u32 = 0x04;
const ITEM_TYPE_ALBUM: u32 = 0x05;
const ITEM_TYPE_GENRE: u32 = 0x06;
const ITEM_TYPE_YEAR: u32 = 0x09;
const ITEM_TYPE_TEMPO: u32 = 0x0A;
const ITEM_TYPE_PATH: u32 = 0x0B;
const ITEM_TYPE_COLOR: u32 = 0x0D;
const ITEM_TYPE_KEY: u32 = 0x0F;
const ITEM_TYPE_LABEL: u32 = 0x10;

/// One decoded `MenuItem` frame (spec.md §4.5's "per-itemType transformer"),
/// a closed sum with an explicit fallback for item types this client
/// doesn't recognize (spec.md §9's "tagged sums over raw codes").
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum MenuItem {
    Track { id: u32, title: String, artwork_id: u32 },
    Playlist { id: u32, name: String, is_folder: bool },
    Artist { id: u32, name: String },
    Album { id: u32, name: String },
    Genre { id: u32, name: String },
    Key { id: u32, name: String },
    Label { id: u32, name: String },
    Color { id: u32, name: String },
    Year { year: i32 },
    Tempo { bpm: f32 },
    Path { path: String },
    Unknown { item_type: u32 },
}

fn decode_menu_item(message: &Message, diagnostics: &Diagnostics) -> MenuItem {
    let as_u32 = |i: usize| message.args.get(i).and_then(Field::as_u32).unwrap_or(0);
    let as_str = |i: usize| message.args.get(i).and_then(Field::as_str).unwrap_or_default().to_string();

    let main_id = as_u32(1);
    let label1 = as_str(3);
    let item_type = as_u32(6);
    let artwork_id = as_u32(8);

    match item_type {
        ITEM_TYPE_TRACK => MenuItem::Track { id: main_id, title: label1, artwork_id },
        ITEM_TYPE_FOLDER => MenuItem::Playlist { id: main_id, name: label1, is_folder: true },
        ITEM_TYPE_PLAYLIST => MenuItem::Playlist { id: main_id, name: label1, is_folder: false },
        ITEM_TYPE_ARTIST => MenuItem::Artist { id: main_id, name: label1 },
        ITEM_TYPE_ALBUM => MenuItem::Album { id: main_id, name: label1 },
        ITEM_TYPE_GENRE => MenuItem::Genre { id: main_id, name: label1 },
        ITEM_TYPE_KEY => MenuItem::Key { id: main_id, name: label1 },
        ITEM_TYPE_LABEL => MenuItem::Label { id: main_id, name: label1 },
        ITEM_TYPE_COLOR => MenuItem::Color { id: main_id, name: label1 },
        ITEM_TYPE_YEAR => MenuItem::Year { year: main_id as i32 },
        ITEM_TYPE_TEMPO => MenuItem::Tempo { bpm: main_id as f32 / 100.0 },
        ITEM_TYPE_PATH => MenuItem::Path { path: label1 },
        other => {
            diagnostics.record("remotedb::menu", format!("unrecognized menu item type 0x{other:02x}"));
            MenuItem::Unknown { item_type: other }
        }
    }
}

/// Lazy, paged enumeration over one `RenderMenu` target. Reissues
/// `RenderMenu` with an advancing `offset` each time the buffered page runs
/// dry, until exactly `total_items()` items have been yielded.
pub struct MenuPages {
    connection: Arc<Connection>,
    descriptor: u32,
    total: u32,
    yielded: u32,
    buffer: VecDeque<MenuItem>,
    diagnostics: Arc<Diagnostics>,
}

impl MenuPages {
    pub(crate) fn new(connection: Arc<Connection>, descriptor: u32, total: u32, diagnostics: Arc<Diagnostics>) -> Self {
        Self { connection, descriptor, total, yielded: 0, buffer: VecDeque::new(), diagnostics }
    }

    /// Total item count this enumeration will yield (`itemsAvailable` from
    /// the request that created it).
    pub fn total_items(&self) -> u32 {
        self.total
    }

    /// Fetch the next item, paging in a fresh `RenderMenu` response as
    /// needed. `None` once `total_items()` items have all been yielded.
    pub async fn next(&mut self) -> Option<Result<MenuItem>> {
        if self.buffer.is_empty() {
            if self.yielded >= self.total {
                return None;
            }
            if let Err(e) = self.fetch_next_page().await {
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let offset = self.yielded;
        let limit = PAGE_SIZE.min(self.total - offset);
        let txid = self.connection.alloc_txid();
        let request = Message::new(
            txid,
            MSG_TYPE_RENDER_MENU,
            vec![
                Field::U32(self.descriptor),
                Field::U32(offset),
                Field::U32(limit),
                Field::U32(0),
                Field::U32(limit),
                Field::U32(0),
            ],
        );

        let replies = self.connection.request_many(request, 2 + limit as usize).await?;
        let mut replies = replies.into_iter();

        let header = replies.next().ok_or_else(|| Error::Protocol {
            reason: "render menu page missing header".to_string(),
        })?;
        if header.msg_type != MSG_TYPE_MENU_HEADER {
            return Err(Error::UnexpectedMessageType { expected: MSG_TYPE_MENU_HEADER, got: header.msg_type });
        }

        for _ in 0..limit {
            let item = replies.next().ok_or_else(|| Error::Protocol {
                reason: "render menu page missing item".to_string(),
            })?;
            if item.msg_type != MSG_TYPE_MENU_ITEM {
                return Err(Error::UnexpectedMessageType { expected: MSG_TYPE_MENU_ITEM, got: item.msg_type });
            }
            self.buffer.push_back(decode_menu_item(&item, &self.diagnostics));
        }

        let footer = replies.next().ok_or_else(|| Error::Protocol {
            reason: "render menu page missing footer".to_string(),
        })?;
        if footer.msg_type != MSG_TYPE_MENU_FOOTER {
            return Err(Error::UnexpectedMessageType { expected: MSG_TYPE_MENU_FOOTER, got: footer.msg_type });
        }

        self.yielded += limit;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(main_id: u32, label1: &str, item_type: u32, artwork_id: u32) -> Message {
        Message::new(
            0,
            MSG_TYPE_MENU_ITEM,
            vec![
                Field::U32(0),
                Field::U32(main_id),
                Field::U32(label1.len() as u32),
                Field::Str(label1.to_string()),
                Field::U32(0),
                Field::Str(String::new()),
                Field::U32(item_type),
                Field::U32(0),
                Field::U32(artwork_id),
                Field::U32(0),
                Field::U32(0),
                Field::U32(0),
            ],
        )
    }

    #[test]
    fn decodes_known_item_types() {
        let diagnostics = Diagnostics::new(8);
        let track = decode_menu_item(&item(42, "Voodoo Ray", ITEM_TYPE_TRACK, 7), &diagnostics);
        assert_eq!(track, MenuItem::Track { id: 42, title: "Voodoo Ray".to_string(), artwork_id: 7 });

        let artist = decode_menu_item(&item(1, "A Guy Called Gerald", ITEM_TYPE_ARTIST, 0), &diagnostics);
        assert_eq!(artist, MenuItem::Artist { id: 1, name: "A Guy Called Gerald".to_string() });

        let tempo = decode_menu_item(&item(12800, "", ITEM_TYPE_TEMPO, 0), &diagnostics);
        assert_eq!(tempo, MenuItem::Tempo { bpm: 128.0 });
    }

    #[test]
    fn unknown_item_type_degrades_and_is_logged() {
        let diagnostics = Diagnostics::new(8);
        let decoded = decode_menu_item(&item(1, "", 0xFF, 0), &diagnostics);
        assert_eq!(decoded, MenuItem::Unknown { item_type: 0xFF });
        assert_eq!(diagnostics.snapshot().len(), 1);
    }
}
