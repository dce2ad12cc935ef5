// ABOUTME: Group state: single-writer snapshot merged field-wise from server
// ABOUTME: group/update and server/state messages (§4.I dispatch, §9 partial updates)

use crate::protocol::messages::{
    ControllerState, GroupUpdate, MetadataState, PlaybackState, RepeatMode, ServerState,
    TrackProgress,
};

/// Current track metadata, as last reported by `server/state`.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub timestamp: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
    pub year: Option<u32>,
    pub track: Option<String>,
    pub progress: Option<TrackProgress>,
    pub repeat: Option<RepeatMode>,
    pub shuffle: Option<bool>,
}

/// Controller capabilities and volume, as last reported by `server/state`.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    pub supported_commands: Vec<String>,
    pub volume: u8,
    pub muted: bool,
}

/// A read-only snapshot of group state, handed out on the group-updated
/// event. There is no mutable exposure; the orchestrator is the sole writer.
#[derive(Debug, Clone, Default)]
pub struct GroupSnapshot {
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub playback_state: Option<PlaybackState>,
    pub metadata: Option<Metadata>,
    pub controller: Option<Controller>,
}

/// Single-writer group state, merged field-wise from `group/update` and
/// `server/state` messages.
///
/// Most fields are plain `Option<T>` on the wire, where a missing key and an
/// explicit JSON `null` both deserialize to `None`; the merge treats both as
/// "field not included in this update" and keeps the existing value, since
/// an accidental clear is worse than a stale value the next update corrects.
/// `progress` is the one field the protocol calls out as needing the full
/// three-valued {Absent, PresentNull, PresentValue} distinction (§4.B), and
/// carries it as `Field<TrackProgress>`: an explicit `null` does clear it.
#[derive(Debug, Default)]
pub struct GroupState {
    group_id: Option<String>,
    group_name: Option<String>,
    playback_state: Option<PlaybackState>,
    metadata: Option<Metadata>,
    controller: Option<Controller>,
}

impl GroupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_group_update(&mut self, update: &GroupUpdate) {
        if let Some(id) = &update.group_id {
            self.group_id = Some(id.clone());
        }
        if let Some(name) = &update.group_name {
            self.group_name = Some(name.clone());
        }
        if let Some(state) = &update.playback_state {
            self.playback_state = Some(state.clone());
        }
    }

    pub fn merge_server_state(&mut self, state: &ServerState) {
        if let Some(metadata) = &state.metadata {
            self.merge_metadata(metadata);
        }
        if let Some(controller) = &state.controller {
            self.controller = Some(Controller {
                supported_commands: controller.supported_commands.clone(),
                volume: controller.volume,
                muted: controller.muted,
            });
        }
    }

    fn merge_metadata(&mut self, incoming: &MetadataState) {
        let current = self.metadata.get_or_insert_with(Metadata::default);
        current.timestamp = incoming.timestamp;
        if incoming.title.is_some() {
            current.title = incoming.title.clone();
        }
        if incoming.artist.is_some() {
            current.artist = incoming.artist.clone();
        }
        if incoming.album_artist.is_some() {
            current.album_artist = incoming.album_artist.clone();
        }
        if incoming.album.is_some() {
            current.album = incoming.album.clone();
        }
        if incoming.artwork_url.is_some() {
            current.artwork_url = incoming.artwork_url.clone();
        }
        if incoming.year.is_some() {
            current.year = incoming.year;
        }
        if incoming.track.is_some() {
            current.track = incoming.track.clone();
        }
        match &incoming.progress {
            crate::protocol::messages::Field::Absent => {}
            crate::protocol::messages::Field::PresentNull => current.progress = None,
            crate::protocol::messages::Field::PresentValue(p) => {
                current.progress = Some(p.clone())
            }
        }
        if incoming.repeat.is_some() {
            current.repeat = incoming.repeat.clone();
        }
        if incoming.shuffle.is_some() {
            current.shuffle = incoming.shuffle;
        }
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group_id: self.group_id.clone(),
            group_name: self.group_name.clone(),
            playback_state: self.playback_state.clone(),
            metadata: self.metadata.clone(),
            controller: self.controller.clone(),
        }
    }
}
