//! Local rekordbox database (spec.md §4.7): acquire a device's
//! `export.pdb` over NFS, hydrate it into in-memory tables, and serve
//! lookups against them without re-parsing the file per query.
//!
//! Grounded on teacher's `system.rs`, which builds its own sqlite schema
//! (`songs`/`queue`/`queue_state`) from scanned files with `rusqlite` and
//! serves lookups against it rather than re-scanning on every call — the
//! same acquire-once-query-many shape, generalized from "scan a directory
//! tree" to "parse one PDB file."

pub mod anlz;
pub mod pdb;
pub mod string;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::config::NfsRetryConfig;
use crate::error::{Error, Result};
use crate::model::{self, Fingerprint, MediaSlotInfo, SlotTag, TrackType};
use crate::nfs::NfsClient;

const EXPORT_PATHS_UNIX_FIRST: [&str; 2] = [".PIONEER/rekordbox/export.pdb", "PIONEER/rekordbox/export.pdb"];
const EXPORT_PATHS_WINDOWS_FIRST: [&str; 2] = ["PIONEER/rekordbox/export.pdb", ".PIONEER/rekordbox/export.pdb"];

/// Emitted once per inserted row while a database is being hydrated
/// (spec.md §4.7's `hydrationProgress`).
#[derive(Debug, Clone, Copy)]
pub struct HydrationProgress {
    pub table: &'static str,
    pub complete: u64,
    pub total: u64,
}

/// A hydrated `export.pdb`, held open as an in-memory sqlite schema for the
/// lifetime of the media it was read from.
pub struct LocalDatabase {
    conn: Mutex<Connection>,
}

impl LocalDatabase {
    fn open_schema() -> Result<Connection> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Protocol { reason: format!("local db schema: {e}") })?;
        conn.execute_batch(
            "CREATE TABLE artists (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE albums (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE genres (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE labels (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE keys (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE colors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE artwork (id INTEGER PRIMARY KEY, path TEXT NOT NULL);
             CREATE TABLE playlists (id INTEGER PRIMARY KEY, is_folder INTEGER NOT NULL, name TEXT NOT NULL, parent_id INTEGER);
             CREATE TABLE playlist_entries (id INTEGER PRIMARY KEY, sort_index INTEGER NOT NULL, playlist_id INTEGER NOT NULL, track_id INTEGER NOT NULL);
             CREATE INDEX playlist_entries_by_playlist ON playlist_entries(playlist_id);
             CREATE TABLE tracks (
                 id INTEGER PRIMARY KEY, title TEXT NOT NULL, file_path TEXT NOT NULL, file_name TEXT NOT NULL,
                 comment TEXT NOT NULL, mix_name TEXT NOT NULL, isrc TEXT NOT NULL, date_added TEXT, release_date TEXT,
                 analyze_date TEXT, analyze_path TEXT, duration_secs INTEGER, disc_number INTEGER, track_number INTEGER,
                 play_count INTEGER, year INTEGER, sample_depth INTEGER, sample_rate INTEGER, bitrate INTEGER,
                 file_size INTEGER, tempo REAL, rating INTEGER NOT NULL, kuvo_public INTEGER NOT NULL,
                 autoload_hotcues INTEGER NOT NULL, artist_id INTEGER, original_artist_id INTEGER, remixer_id INTEGER,
                 composer_id INTEGER, album_id INTEGER, label_id INTEGER, genre_id INTEGER, key_id INTEGER,
                 color_id INTEGER, artwork_id INTEGER
             );",
        )
        .map_err(|e| Error::Protocol { reason: format!("local db schema: {e}") })?;
        Ok(conn)
    }

    /// Parse `pdb_bytes` and insert every row into the schema, reporting
    /// `progress` after each one and yielding cooperatively so I/O and UI
    /// tasks can interleave (spec.md §4.7).
    async fn hydrate(pdb_bytes: &[u8], mut progress: impl FnMut(HydrationProgress)) -> Result<Self> {
        let tables = pdb::parse(pdb_bytes)?;
        let conn = Self::open_schema()?;

        let total = (tables.artists.len()
            + tables.albums.len()
            + tables.genres.len()
            + tables.labels.len()
            + tables.keys.len()
            + tables.colors.len()
            + tables.artwork.len()
            + tables.playlist_tree.len()
            + tables.playlist_entries.len()
            + tables.tracks.len()) as u64;
        let mut complete = 0u64;

        macro_rules! insert_named {
            ($table:literal, $rows:expr) => {
                for (id, name) in &$rows {
                    conn.execute(concat!("INSERT INTO ", $table, " (id, name) VALUES (?1, ?2)"), rusqlite::params![id, name])
                        .map_err(|e| Error::Protocol { reason: format!("insert into {}: {e}", $table) })?;
                    complete += 1;
                    progress(HydrationProgress { table: $table, complete, total });
                    tokio::task::yield_now().await;
                }
            };
        }
        insert_named!("artists", tables.artists);
        insert_named!("albums", tables.albums);
        insert_named!("genres", tables.genres);
        insert_named!("labels", tables.labels);
        insert_named!("keys", tables.keys);
        insert_named!("colors", tables.colors);

        for artwork in &tables.artwork {
            conn.execute("INSERT INTO artwork (id, path) VALUES (?1, ?2)", rusqlite::params![artwork.id, artwork.path.as_str()])
                .map_err(|e| Error::Protocol { reason: format!("insert into artwork: {e}") })?;
            complete += 1;
            progress(HydrationProgress { table: "artwork", complete, total });
            tokio::task::yield_now().await;
        }

        for playlist in &tables.playlist_tree {
            let parent_id = (playlist.parent_id != 0).then_some(playlist.parent_id);
            conn.execute(
                "INSERT INTO playlists (id, is_folder, name, parent_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![playlist.id, playlist.is_folder, playlist.name, parent_id],
            )
            .map_err(|e| Error::Protocol { reason: format!("insert into playlists: {e}") })?;
            complete += 1;
            progress(HydrationProgress { table: "playlists", complete, total });
            tokio::task::yield_now().await;
        }

        for entry in &tables.playlist_entries {
            conn.execute(
                "INSERT INTO playlist_entries (id, sort_index, playlist_id, track_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![entry.id, entry.sort_index, entry.playlist_id, entry.track_id],
            )
            .map_err(|e| Error::Protocol { reason: format!("insert into playlist_entries: {e}") })?;
            complete += 1;
            progress(HydrationProgress { table: "playlist_entries", complete, total });
            tokio::task::yield_now().await;
        }

        for row in &tables.tracks {
            let analyze_path = row.analyze_path.strip_suffix(".DAT").or(row.analyze_path.strip_suffix(".EXT")).unwrap_or(&row.analyze_path);
            conn.execute(
                "INSERT INTO tracks (id, title, file_path, file_name, comment, mix_name, isrc, date_added, release_date,
                    analyze_date, analyze_path, duration_secs, disc_number, track_number, play_count, year, sample_depth,
                    sample_rate, bitrate, file_size, tempo, rating, kuvo_public, autoload_hotcues, artist_id,
                    original_artist_id, remixer_id, composer_id, album_id, label_id, genre_id, key_id, color_id, artwork_id)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34)",
                rusqlite::params![
                    row.id,
                    row.title,
                    row.file_path,
                    row.file_name,
                    row.comment,
                    row.mix_name,
                    row.isrc,
                    parse_date(&row.date_added),
                    parse_date(&row.release_date),
                    parse_date(&row.analyze_date),
                    analyze_path,
                    row.duration_secs,
                    nonzero(row.disc_number as u32),
                    nonzero(row.track_number),
                    nonzero(row.play_count as u32),
                    nonzero(row.year as u32),
                    nonzero(row.sample_depth as u32),
                    nonzero(row.sample_rate),
                    nonzero(row.bitrate),
                    nonzero(row.file_size as u64),
                    row.tempo_raw as f64 / 100.0,
                    row.rating,
                    row.kuvo_public,
                    row.autoload_hotcues,
                    nonzero(row.artist_id),
                    nonzero(row.original_artist_id),
                    nonzero(row.remixer_id),
                    nonzero(row.composer_id),
                    nonzero(row.album_id),
                    nonzero(row.label_id),
                    nonzero(row.genre_id),
                    nonzero(row.key_id),
                    nonzero(row.color_index as u32),
                    nonzero(row.artwork_id),
                ],
            )
            .map_err(|e| Error::Protocol { reason: format!("insert into tracks: {e}") })?;
            complete += 1;
            progress(HydrationProgress { table: "tracks", complete, total });
            tokio::task::yield_now().await;
        }

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Resolve one track by primary key into the unified [`model::Track`]
    /// shape, joining its named-entity foreign keys.
    pub async fn track(&self, track_id: u32) -> Result<Option<model::Track>> {
        let conn = self.conn.lock().await;
        query_track(&conn, track_id)
    }

    /// Folders and playlists directly under `parent_id` (`None` for root).
    pub async fn playlist_children(&self, parent_id: Option<u32>) -> Result<Vec<model::Playlist>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, is_folder, name, parent_id FROM playlists WHERE parent_id IS ?1")
            .map_err(|e| Error::Protocol { reason: e.to_string() })?;
        let rows = stmt
            .query_map(rusqlite::params![parent_id], |row| {
                Ok(model::Playlist { id: row.get(0)?, is_folder: row.get(1)?, name: row.get(2)?, parent_id: row.get(3)? })
            })
            .map_err(|e| Error::Protocol { reason: e.to_string() })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::Protocol { reason: e.to_string() })
    }

    /// Track ids belonging to `playlist_id`, in `sortIndex` order.
    pub async fn playlist_track_ids(&self, playlist_id: u32) -> Result<Vec<u32>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT track_id FROM playlist_entries WHERE playlist_id = ?1 ORDER BY sort_index")
            .map_err(|e| Error::Protocol { reason: e.to_string() })?;
        let rows = stmt.query_map([playlist_id], |row| row.get(0)).map_err(|e| Error::Protocol { reason: e.to_string() })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::Protocol { reason: e.to_string() })
    }
}

fn nonzero<T: Default + PartialEq + Copy>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

fn parse_date(raw: &str) -> Option<String> {
    jiff::civil::Date::strptime("%Y-%m-%d", raw).ok().map(|d| d.to_string())
}

fn named_lookup(conn: &Connection, table: &str, id: Option<u32>) -> rusqlite::Result<Option<(u32, String)>> {
    let Some(id) = id else { return Ok(None) };
    conn.query_row(&format!("SELECT id, name FROM {table} WHERE id = ?1"), [id], |row| Ok((row.get(0)?, row.get(1)?))).optional()
}

fn query_track(conn: &Connection, track_id: u32) -> Result<Option<model::Track>> {
    let row = conn
        .query_row(
            "SELECT title, file_path, file_name, comment, mix_name, isrc, date_added, release_date, analyze_date,
                analyze_path, duration_secs, disc_number, track_number, play_count, year, sample_depth, sample_rate,
                bitrate, file_size, tempo, rating, kuvo_public, autoload_hotcues, artist_id, original_artist_id,
                remixer_id, album_id, label_id, genre_id, key_id, color_id, artwork_id
             FROM tracks WHERE id = ?1",
            [track_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, u16>(10)?,
                    row.get::<_, Option<u32>>(11)?,
                    row.get::<_, Option<u32>>(12)?,
                    row.get::<_, Option<u32>>(13)?,
                    row.get::<_, Option<u32>>(14)?,
                    row.get::<_, Option<u32>>(15)?,
                    row.get::<_, Option<u32>>(16)?,
                    row.get::<_, Option<u32>>(17)?,
                    row.get::<_, Option<u64>>(18)?,
                    row.get::<_, f32>(19)?,
                    row.get::<_, u8>(20)?,
                    row.get::<_, bool>(21)?,
                    row.get::<_, bool>(22)?,
                    row.get::<_, Option<u32>>(23)?,
                    row.get::<_, Option<u32>>(24)?,
                    row.get::<_, Option<u32>>(25)?,
                    row.get::<_, Option<u32>>(26)?,
                    row.get::<_, Option<u32>>(27)?,
                    row.get::<_, Option<u32>>(28)?,
                    row.get::<_, Option<u32>>(29)?,
                    row.get::<_, Option<u32>>(30)?,
                    row.get::<_, Option<u32>>(31)?,
                ))
            },
        )
        .optional()
        .map_err(|e| Error::Protocol { reason: e.to_string() })?;

    let Some((
        title,
        file_path,
        file_name,
        comment,
        mix_name,
        isrc,
        date_added,
        release_date,
        analyze_date,
        analyze_path,
        duration_secs,
        disc_number,
        track_number,
        play_count,
        year,
        sample_depth,
        sample_rate,
        bitrate,
        file_size,
        tempo,
        rating,
        kuvo_public,
        autoload_hotcues,
        artist_id,
        original_artist_id,
        remixer_id,
        album_id,
        label_id,
        genre_id,
        key_id,
        color_id,
        artwork_id,
    )) = row
    else {
        return Ok(None);
    };
    let _ = isrc;

    let as_named = |res: rusqlite::Result<Option<(u32, String)>>| -> Result<Option<(u32, String)>> { res.map_err(|e| Error::Protocol { reason: e.to_string() }) };

    let artist = as_named(named_lookup(conn, "artists", artist_id))?.map(|(id, name)| model::Artist { id, name });
    let original_artist = as_named(named_lookup(conn, "artists", original_artist_id))?.map(|(id, name)| model::Artist { id, name });
    let remixer = as_named(named_lookup(conn, "artists", remixer_id))?.map(|(id, name)| model::Artist { id, name });
    let album = as_named(named_lookup(conn, "albums", album_id))?.map(|(id, name)| model::Album { id, name });
    let label = as_named(named_lookup(conn, "labels", label_id))?.map(|(id, name)| model::Label { id, name });
    let genre = as_named(named_lookup(conn, "genres", genre_id))?.map(|(id, name)| model::Genre { id, name });
    let key = as_named(named_lookup(conn, "keys", key_id))?.map(|(id, name)| model::Key { id, name });
    let color = as_named(named_lookup(conn, "colors", color_id))?.map(|(id, name)| model::Color { id, name });
    let artwork = artwork_id
        .map(|id| conn.query_row("SELECT path FROM artwork WHERE id = ?1", [id], |row| row.get::<_, String>(0)).optional())
        .transpose()
        .map_err(|e| Error::Protocol { reason: e.to_string() })?
        .flatten()
        .map(|path| model::Artwork { id: artwork_id.unwrap(), path: path.into() });

    Ok(Some(model::Track {
        id: track_id,
        title,
        duration: std::time::Duration::from_secs(duration_secs.into()),
        bitrate,
        tempo: Some(tempo),
        rating,
        comment,
        file_path: file_path.into(),
        file_name,
        disc_number,
        track_number,
        sample_rate,
        sample_depth,
        play_count,
        year,
        mix_name,
        autoload_hotcues,
        kuvo_public,
        file_size,
        analyze_path: analyze_path.map(Into::into),
        release_date: release_date.and_then(|d| jiff::civil::Date::strptime("%Y-%m-%d", d).ok()),
        analyze_date: analyze_date.and_then(|d| jiff::civil::Date::strptime("%Y-%m-%d", d).ok()),
        date_added: date_added.and_then(|d| jiff::civil::Date::strptime("%Y-%m-%d", d).ok()),
        artist,
        original_artist,
        remixer,
        composer: None,
        album,
        label,
        genre,
        color,
        key,
        artwork,
        beat_grid: None,
        cue_and_loops: Vec::new(),
        waveform_hd: None,
    }))
}

/// Which `.DAT`/`.EXT` analysis file to fetch in [`hydrate_anlz`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnlzKind {
    Dat,
    Ext,
}

impl AnlzKind {
    const fn extension(self) -> &'static str {
        match self {
            AnlzKind::Dat => "DAT",
            AnlzKind::Ext => "EXT",
        }
    }
}

/// Fetch and apply one track's analysis file (spec.md §4.7's
/// `hydrateAnlz(track, 'DAT'|'EXT', loader)`): `loader` is caller-provided
/// so this module stays agnostic of how bytes actually get fetched (NFS in
/// practice, but tests pass an in-memory closure).
pub async fn hydrate_anlz<F, Fut>(track: &mut model::Track, kind: AnlzKind, mut loader: F) -> Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<u8>>>,
{
    let Some(analyze_path) = &track.analyze_path else {
        return Ok(());
    };
    let path = format!("{analyze_path}.{}", kind.extension());
    let bytes = loader(path).await?;

    let mut entries = Vec::new();
    let mut cues = Vec::new();
    for section in anlz::sections(&bytes)? {
        match section {
            anlz::Section::BeatGrid { entries: beat_entries } => entries = beat_entries,
            anlz::Section::CueList { cues: section_cues } => cues.extend(section_cues),
            anlz::Section::Opaque => {}
        }
    }
    if !entries.is_empty() {
        track.beat_grid = model::BeatGrid::new(entries);
    }
    if !cues.is_empty() {
        track.cue_and_loops = cues;
    }
    Ok(())
}

/// Per-`(device, slot)` acquisition and per-fingerprint reuse of
/// [`LocalDatabase`] instances (spec.md §4.7's "under a per-slot mutex,
/// check cache, else fetch").
#[derive(Default)]
pub struct LocalDbCache {
    slot_locks: Mutex<HashMap<(Ipv4Addr, SlotTag), Arc<Mutex<()>>>>,
    by_fingerprint: Mutex<HashMap<Fingerprint, Arc<LocalDatabase>>>,
    by_slot: Mutex<HashMap<(Ipv4Addr, SlotTag), Fingerprint>>,
}

impl LocalDbCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot_lock(&self, key: (Ipv4Addr, SlotTag)) -> Arc<Mutex<()>> {
        self.slot_locks.lock().await.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire the local database for `(device_ip, slot)`, fetching and
    /// hydrating it on a cache miss. Returns `None` when `media_info`
    /// reports non-rekordbox media (spec.md §4.7's "tracksType ≠ RB" case).
    pub async fn acquire(
        &self,
        device_ip: Ipv4Addr,
        slot: SlotTag,
        media_info: &MediaSlotInfo,
        nfs: &NfsClient,
        retry: &NfsRetryConfig,
        progress: impl FnMut(HydrationProgress),
    ) -> Result<Option<Arc<LocalDatabase>>> {
        if media_info.track_type != TrackType::Rb {
            return Ok(None);
        }

        let key = (device_ip, slot);
        let lock = self.slot_lock(key).await;
        let _guard = lock.lock().await;

        let fingerprint = Fingerprint::compute(media_info);
        if let Some(existing) = self.by_fingerprint.lock().await.get(&fingerprint) {
            return Ok(Some(existing.clone()));
        }

        let candidates: [&str; 2] = if cfg!(windows) { EXPORT_PATHS_WINDOWS_FIRST } else { EXPORT_PATHS_UNIX_FIRST };
        let mut bytes = None;
        for candidate in candidates {
            match nfs.fetch_file(device_ip, slot, candidate, retry, |_, _| {}).await {
                Ok(data) => {
                    bytes = Some(data);
                    break;
                }
                Err(_) => continue,
            }
        }
        let Some(bytes) = bytes else {
            return Err(Error::Protocol { reason: "no rekordbox export found on device".to_string() });
        };

        let database = Arc::new(LocalDatabase::hydrate(&bytes, progress).await?);
        self.by_fingerprint.lock().await.insert(fingerprint.clone(), database.clone());
        self.by_slot.lock().await.insert(key, fingerprint);
        Ok(Some(database))
    }

    /// Close and forget every database bound to `device_ip` (spec.md §4.7's
    /// disconnect handling).
    pub async fn forget_device(&self, device_ip: Ipv4Addr) {
        let mut by_slot = self.by_slot.lock().await;
        let mut by_fingerprint = self.by_fingerprint.lock().await;
        by_slot.retain(|(ip, _), fingerprint| {
            if *ip == device_ip {
                by_fingerprint.remove(fingerprint);
                false
            } else {
                true
            }
        });
        self.slot_locks.lock().await.retain(|(ip, _), _| *ip != device_ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hydrate_anlz_populates_beat_grid_and_cues() {
        let mut beat_body = vec![0u8; 8];
        beat_body.extend_from_slice(&1u16.to_be_bytes());
        beat_body.extend_from_slice(&12800u16.to_be_bytes());
        beat_body.extend_from_slice(&0u32.to_be_bytes());
        let beat_section = section_bytes(b"PQTZ", &beat_body);

        let mut file = Vec::new();
        file.extend_from_slice(&section_bytes(b"PMAI", &[0u8; 8]));
        file.extend_from_slice(&beat_section);

        let mut track = model::Track { analyze_path: Some("/path/to/track".into()), ..Default::default() };
        hydrate_anlz(&mut track, AnlzKind::Dat, |path| {
            assert_eq!(path, "/path/to/track.DAT");
            let file = file.clone();
            async move { Ok(file) }
        })
        .await
        .unwrap();

        assert!(track.beat_grid.is_some());
        assert_eq!(track.beat_grid.unwrap().entries()[0].bpm, 128.0);
    }

    fn section_bytes(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let size = 12u32;
        let total_size = size + body.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&total_size.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn forget_device_drops_cached_database() {
        let cache = LocalDbCache::new();
        let addr: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let fp = Fingerprint::compute(&MediaSlotInfo {
            device_id: 1,
            slot: SlotTag::Usb,
            name: "X".into(),
            created_date: None,
            free_bytes: 0,
            total_bytes: 0,
            track_count: 0,
            playlist_count: 0,
            track_type: TrackType::Rb,
            has_settings: false,
            color: None,
        });
        cache.by_slot.lock().await.insert((addr, SlotTag::Usb), fp.clone());
        cache.by_fingerprint.lock().await.insert(fp, Arc::new(LocalDatabase { conn: Mutex::new(LocalDatabase::open_schema().unwrap()) }));
        cache.forget_device(addr).await;
        assert!(cache.by_fingerprint.lock().await.is_empty());
    }
}
