//! Unified database facade (spec.md §4.8): picks Remote vs. Local vs. "no
//! strategy available" per operation and per-device/track-type, and hides
//! that choice behind one API so callers never branch on it themselves.
//!
//! Grounded on teacher's `api.rs`, whose handlers sit in front of several
//! backing services (`System`, `player`) and dispatch to whichever one
//! actually owns a given piece of state rather than duplicating lookup
//! logic per caller — the same "one call site hides which subsystem
//! answers" shape, generalized from "sqlite cache vs. live mpd state" to
//! "remote database vs. local database vs. nothing."

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::device::DeviceManager;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::localdb::LocalDbCache;
use crate::model::{self, Device, DeviceType, MediaSlotInfo, SlotTag, TrackType, Waveform};
use crate::nfs::NfsClient;
use crate::remotedb::menu::MenuItem;
use crate::remotedb::{RemoteDatabaseClient, query};

/// Which backend answers a given operation (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Remote,
    Local,
    /// No backend can serve this operation; the caller gets `None`.
    Unavailable,
}

/// Everything the facade needs to turn `(device, slot)` into a live local
/// database: a media-slot query round trip is owned by whatever task reads
/// the shared status socket (spec.md §5's "UDP sockets are shared
/// read-only"), so it's injected rather than performed directly here.
#[async_trait::async_trait]
pub trait MediaSlotQuerier: Send + Sync {
    async fn query(&self, device_id: u8, slot: SlotTag) -> Option<MediaSlotInfo>;
}

/// Lazy, non-restartable sequence of fully-hydrated tracks (spec.md §4.8's
/// `tracksIterator`), mirroring [`crate::remotedb::menu::MenuPages`]'s
/// fetch-as-you-go shape instead of eagerly hydrating every track up
/// front.
pub enum TrackIterator {
    Remote { connection: Arc<crate::remotedb::Connection>, host_id: u8, slot: SlotTag, track_type: TrackType, track_ids: std::vec::IntoIter<u32>, diagnostics: Arc<Diagnostics> },
    Local { database: Arc<crate::localdb::LocalDatabase>, track_ids: std::vec::IntoIter<u32> },
    Empty,
}

impl TrackIterator {
    pub async fn next(&mut self) -> Option<Result<model::Track>> {
        match self {
            TrackIterator::Remote { connection, host_id, slot, track_type, track_ids, diagnostics } => {
                let track_id = track_ids.next()?;
                Some(resolve_remote_track(connection.clone(), *host_id, *slot, *track_type, track_id, diagnostics.clone()).await)
            }
            TrackIterator::Local { database, track_ids } => {
                let track_id = track_ids.next()?;
                match database.track(track_id).await {
                    Ok(Some(track)) => Some(Ok(track)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            }
            TrackIterator::Empty => None,
        }
    }
}

/// `getPlaylist`'s return shape (spec.md §4.8).
pub struct PlaylistListing {
    pub folders: Vec<model::Playlist>,
    pub playlists: Vec<model::Playlist>,
    pub tracks: TrackIterator,
    pub total_tracks: u32,
}

pub struct DatabaseFacade {
    devices: Arc<DeviceManager>,
    remote: Arc<RemoteDatabaseClient>,
    nfs: Arc<NfsClient>,
    local: Arc<LocalDbCache>,
    slot_query: Arc<dyn MediaSlotQuerier>,
    config: Config,
    diagnostics: Arc<Diagnostics>,
}

impl DatabaseFacade {
    pub fn new(devices: Arc<DeviceManager>, remote: Arc<RemoteDatabaseClient>, nfs: Arc<NfsClient>, local: Arc<LocalDbCache>, slot_query: Arc<dyn MediaSlotQuerier>, config: Config, diagnostics: Arc<Diagnostics>) -> Self {
        Self { devices, remote, nfs, local, slot_query, config, diagnostics }
    }

    /// Strategy for `getMetadata`/`getArtwork`/`getWaveforms` (spec.md
    /// §4.8 step 2).
    fn metadata_strategy(&self, device: &Device, track_type: TrackType) -> Strategy {
        if device.device_type == DeviceType::Rekordbox {
            return Strategy::Remote;
        }
        if device.device_type == DeviceType::Cdj {
            match track_type {
                TrackType::Rb => return Strategy::Local,
                TrackType::AudioCd | TrackType::Unanalyzed if self.config.vcdj_has_metadata_capability() => return Strategy::Remote,
                _ => {}
            }
        }
        Strategy::Unavailable
    }

    /// `getPlaylist`'s own slot-keyed rule (spec.md §4.8).
    fn playlist_strategy(&self, device: &Device, slot: SlotTag) -> Strategy {
        match device.device_type {
            DeviceType::Rekordbox if slot == SlotTag::Rb => Strategy::Remote,
            DeviceType::Rekordbox => Strategy::Unavailable,
            DeviceType::Cdj => Strategy::Local,
            DeviceType::Mixer => Strategy::Unavailable,
        }
    }

    async fn device(&self, device_id: u8, timeout: Duration) -> Option<Device> {
        self.devices.get_device_ensured(device_id, timeout).await
    }

    async fn local_database(&self, device: &Device, slot: SlotTag) -> Result<Option<Arc<crate::localdb::LocalDatabase>>> {
        let Some(media_info) = self.slot_query.query(device.id, slot).await else {
            return Ok(None);
        };
        self.local
            .acquire(device.ip, slot, &media_info, &self.nfs, &self.config.nfs_retry, |_progress| {})
            .await
    }

    /// spec.md §4.8 `getMetadata`: resolve one track's full metadata,
    /// independent of which backend answers it.
    pub async fn get_metadata(&self, device_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, timeout: Duration) -> Result<Option<model::Track>> {
        let Some(device) = self.device(device_id, timeout).await else { return Ok(None) };
        match self.metadata_strategy(&device, track_type) {
            Strategy::Remote => {
                let connection = self.remote.connection(device.id, device.ip).await?;
                Ok(Some(resolve_remote_track(connection, self.config.vcdj_id, slot, track_type, track_id, self.diagnostics.clone()).await?))
            }
            Strategy::Local => match self.local_database(&device, slot).await? {
                Some(database) => database.track(track_id).await,
                None => Ok(None),
            },
            Strategy::Unavailable => Ok(None),
        }
    }

    /// spec.md §4.8 `getArtwork`.
    pub async fn get_artwork(&self, device_id: u8, slot: SlotTag, track_type: TrackType, artwork_id: u32, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let Some(device) = self.device(device_id, timeout).await else { return Ok(None) };
        match self.metadata_strategy(&device, track_type) {
            Strategy::Remote => {
                let connection = self.remote.connection(device.id, device.ip).await?;
                Ok(Some(query::get_artwork(&connection, self.config.vcdj_id, slot, track_type, artwork_id).await?))
            }
            Strategy::Local => match self.local_database(&device, slot).await? {
                Some(database) => {
                    let path = database.artwork_path(artwork_id).await?;
                    match path {
                        Some(path) => Ok(Some(self.nfs.fetch_file(device.ip, slot, &path, &self.config.nfs_retry, |_, _| {}).await?)),
                        None => Ok(None),
                    }
                }
                None => Ok(None),
            },
            Strategy::Unavailable => Ok(None),
        }
    }

    /// spec.md §4.8 `getWaveforms`. The local database only hydrates beat
    /// grid and cue data from `hydrateAnlz` (spec.md §4.7 names only
    /// `BEAT_GRID`/`CUES` as supported section hydrators) — waveform
    /// section decoding for `Local` strategy is out of scope, so that case
    /// resolves to `Unavailable` rather than guessing a section layout
    /// spec.md never describes.
    pub async fn get_waveforms(&self, device_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, timeout: Duration) -> Result<Option<Vec<Waveform>>> {
        let Some(device) = self.device(device_id, timeout).await else { return Ok(None) };
        match self.metadata_strategy(&device, track_type) {
            Strategy::Remote => {
                let connection = self.remote.connection(device.id, device.ip).await?;
                let preview = query::get_waveform_preview(&connection, self.config.vcdj_id, slot, track_type, track_id).await?;
                let detailed = query::get_waveform_detailed(&connection, self.config.vcdj_id, slot, track_type, track_id).await?;
                let hd = query::get_waveform_hd(&connection, self.config.vcdj_id, slot, track_type, track_id).await?;
                Ok(Some(vec![preview, detailed, hd]))
            }
            Strategy::Local | Strategy::Unavailable => Ok(None),
        }
    }

    /// spec.md §4.8 `getPlaylist`.
    pub async fn get_playlist(&self, device_id: u8, slot: SlotTag, playlist_id: Option<u32>, timeout: Duration) -> Result<Option<PlaylistListing>> {
        let Some(device) = self.device(device_id, timeout).await else { return Ok(None) };
        match self.playlist_strategy(&device, slot) {
            Strategy::Remote => {
                let connection = self.remote.connection(device.id, device.ip).await?;
                let mut pages = query::menu_playlist(connection.clone(), self.config.vcdj_id, slot, TrackType::Rb, 0, playlist_id.unwrap_or(0), playlist_id.is_none(), self.diagnostics.clone()).await?;

                let total = pages.total_items();
                let mut folders = Vec::new();
                let mut playlists = Vec::new();
                let mut track_ids = Vec::new();
                while let Some(item) = pages.next().await {
                    match item? {
                        MenuItem::Playlist { id, name, is_folder: true } => folders.push(model::Playlist { id, is_folder: true, name, parent_id: playlist_id }),
                        MenuItem::Playlist { id, name, is_folder: false } => playlists.push(model::Playlist { id, is_folder: false, name, parent_id: playlist_id }),
                        MenuItem::Track { id, .. } => track_ids.push(id),
                        _ => {}
                    }
                }

                Ok(Some(PlaylistListing {
                    folders,
                    playlists,
                    total_tracks: total,
                    tracks: TrackIterator::Remote {
                        connection,
                        host_id: self.config.vcdj_id,
                        slot,
                        track_type: TrackType::Rb,
                        track_ids: track_ids.into_iter(),
                        diagnostics: self.diagnostics.clone(),
                    },
                }))
            }
            Strategy::Local => {
                let Some(database) = self.local_database(&device, slot).await? else { return Ok(None) };
                let folders_and_playlists = database.playlist_children(playlist_id).await?;
                let (folders, playlists): (Vec<_>, Vec<_>) = folders_and_playlists.into_iter().partition(|p| p.is_folder);
                let track_ids = match playlist_id {
                    Some(id) => database.playlist_track_ids(id).await?,
                    None => Vec::new(),
                };
                Ok(Some(PlaylistListing {
                    folders,
                    playlists,
                    total_tracks: track_ids.len() as u32,
                    tracks: TrackIterator::Local { database, track_ids: track_ids.into_iter() },
                }))
            }
            Strategy::Unavailable => Ok(None),
        }
    }

    /// Forwarded from [`crate::device::DeviceEvent::Disconnected`]: drop
    /// every cached remote connection and local database tied to the
    /// device (spec.md §4.7's disconnect handling).
    pub async fn forget_device(&self, device_id: u8, device_ip: Ipv4Addr) {
        self.remote.drop_connection(device_id).await;
        self.nfs.forget_device(device_ip).await;
        self.local.forget_device(device_ip).await;
    }
}

/// Drain a `GetMetadata`/`GetGenericMetadata` menu into a [`model::Track`]:
/// the remote protocol answers a metadata query with a list of tagged
/// fields rather than one fixed-shape record, so each item updates
/// whichever `Track` field its `itemType` corresponds to.
async fn resolve_remote_track(connection: Arc<crate::remotedb::Connection>, host_id: u8, slot: SlotTag, track_type: TrackType, track_id: u32, diagnostics: Arc<Diagnostics>) -> Result<model::Track> {
    let mut pages = if track_type == TrackType::Rb {
        query::get_metadata(connection.clone(), host_id, slot, track_type, track_id, diagnostics.clone()).await?
    } else {
        query::get_generic_metadata(connection.clone(), host_id, slot, track_type, track_id, diagnostics.clone()).await?
    };

    let mut track = model::Track { id: track_id, ..Default::default() };
    while let Some(item) = pages.next().await {
        match item? {
            MenuItem::Track { title, .. } => track.title = title,
            MenuItem::Artist { id, name } => track.artist = Some(model::Artist { id, name }),
            MenuItem::Album { id, name } => track.album = Some(model::Album { id, name }),
            MenuItem::Genre { id, name } => track.genre = Some(model::Genre { id, name }),
            MenuItem::Key { id, name } => track.key = Some(model::Key { id, name }),
            MenuItem::Label { id, name } => track.label = Some(model::Label { id, name }),
            MenuItem::Color { id, name } => track.color = Some(model::Color { id, name }),
            MenuItem::Year { year } => track.year = Some(year.max(0) as u32),
            MenuItem::Tempo { bpm } => track.tempo = Some(bpm),
            MenuItem::Path { path } => track.file_path = path.into(),
            MenuItem::Playlist { .. } | MenuItem::Unknown { .. } => {}
        }
    }
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceType;

    fn device(device_type: DeviceType) -> Device {
        Device { id: 2, name: "CDJ".into(), device_type, mac: [0; 6], ip: "10.0.0.2".parse().unwrap() }
    }

    #[test]
    fn metadata_strategy_rekordbox_always_remote() {
        let facade_config = Config::default();
        assert_eq!(
            strategy_standalone(&device(DeviceType::Rekordbox), TrackType::None, &facade_config),
            Strategy::Remote
        );
    }

    #[test]
    fn metadata_strategy_cdj_rb_track_is_local() {
        let config = Config::default();
        assert_eq!(strategy_standalone(&device(DeviceType::Cdj), TrackType::Rb, &config), Strategy::Local);
    }

    #[test]
    fn metadata_strategy_cdj_unanalyzed_needs_vcdj_capability() {
        let mut config = Config::default();
        assert_eq!(strategy_standalone(&device(DeviceType::Cdj), TrackType::Unanalyzed, &config), Strategy::Unavailable);
        config.vcdj_id = 3;
        assert_eq!(strategy_standalone(&device(DeviceType::Cdj), TrackType::Unanalyzed, &config), Strategy::Remote);
    }

    /// Exercises [`DatabaseFacade::metadata_strategy`]'s decision table
    /// without constructing the rest of the facade's network dependencies.
    fn strategy_standalone(device: &Device, track_type: TrackType, config: &Config) -> Strategy {
        if device.device_type == DeviceType::Rekordbox {
            return Strategy::Remote;
        }
        if device.device_type == DeviceType::Cdj {
            match track_type {
                TrackType::Rb => return Strategy::Local,
                TrackType::AudioCd | TrackType::Unanalyzed if config.vcdj_has_metadata_capability() => return Strategy::Remote,
                _ => {}
            }
        }
        Strategy::Unavailable
    }
}
