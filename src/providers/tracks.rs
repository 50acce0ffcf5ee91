//! Track data providers

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::provider::TrackDataProvider;
use crate::types::{TrackInfo, TrackMap};
use crate::{RaceControlError, Result};

/// Fixed table of track data, keyed by (track, layout).
#[derive(Default)]
pub struct StaticTrackProvider {
    tracks: HashMap<(String, String), (TrackInfo, Option<TrackMap>)>,
}

impl StaticTrackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track layout. A layout without a map yields map errors.
    pub fn with_track(
        mut self,
        track: impl Into<String>,
        layout: impl Into<String>,
        info: TrackInfo,
        map: Option<TrackMap>,
    ) -> Self {
        self.tracks.insert((track.into(), layout.into()), (info, map));
        self
    }

    fn lookup(&self, track: &str, layout: &str) -> Option<&(TrackInfo, Option<TrackMap>)> {
        self.tracks.get(&(track.to_owned(), layout.to_owned()))
    }
}

#[async_trait::async_trait]
impl TrackDataProvider for StaticTrackProvider {
    async fn track_info(&self, track: &str, layout: &str) -> Result<TrackInfo> {
        self.lookup(track, layout).map(|(info, _)| info.clone()).ok_or_else(|| {
            RaceControlError::TrackInfo {
                track: track.to_owned(),
                layout: layout.to_owned(),
                source: "unknown track".into(),
            }
        })
    }

    async fn track_map(&self, track: &str, layout: &str) -> Result<TrackMap> {
        self.lookup(track, layout).and_then(|(_, map)| map.clone()).ok_or_else(|| {
            RaceControlError::TrackMap {
                track: track.to_owned(),
                layout: layout.to_owned(),
                source: "no map registered".into(),
            }
        })
    }
}

/// Reads track data from a game content directory.
///
/// Metadata comes from `tracks/<track>/ui[/<layout>]/ui_track.json` and map
/// geometry from `tracks/<track>[/<layout>]/data/map.ini`.
pub struct ContentTrackProvider {
    content_root: PathBuf,
}

impl ContentTrackProvider {
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self { content_root: content_root.into() }
    }

    fn track_dir(&self, track: &str) -> PathBuf {
        self.content_root.join("tracks").join(track)
    }

    fn ui_track_path(&self, track: &str, layout: &str) -> PathBuf {
        let ui = self.track_dir(track).join("ui");
        let dir = if layout.is_empty() { ui } else { ui.join(layout) };
        dir.join("ui_track.json")
    }

    fn map_ini_path(&self, track: &str, layout: &str) -> PathBuf {
        let base = self.track_dir(track);
        let dir = if layout.is_empty() { base } else { base.join(layout) };
        dir.join("data").join("map.ini")
    }
}

#[async_trait::async_trait]
impl TrackDataProvider for ContentTrackProvider {
    async fn track_info(&self, track: &str, layout: &str) -> Result<TrackInfo> {
        let path = self.ui_track_path(track, layout);
        let fail = |source: crate::error::BoxError| RaceControlError::TrackInfo {
            track: track.to_owned(),
            layout: layout.to_owned(),
            source,
        };

        let raw = tokio::fs::read(&path).await.map_err(|e| fail(e.into()))?;
        // Some content tools write a UTF-8 BOM.
        let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw);
        let info: TrackInfo = serde_json::from_slice(raw).map_err(|e| fail(e.into()))?;

        debug!(path = %path.display(), name = %info.name, "Loaded track info");
        Ok(info)
    }

    async fn track_map(&self, track: &str, layout: &str) -> Result<TrackMap> {
        let path = self.map_ini_path(track, layout);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| RaceControlError::TrackMap {
            track: track.to_owned(),
            layout: layout.to_owned(),
            source: e.into(),
        })?;

        parse_map_ini(&raw, &path).map_err(|reason| RaceControlError::TrackMap {
            track: track.to_owned(),
            layout: layout.to_owned(),
            source: reason.into(),
        })
    }
}

/// Parse the `[PARAMETERS]` section of a `map.ini` file.
fn parse_map_ini(raw: &str, path: &Path) -> std::result::Result<TrackMap, String> {
    let mut map = TrackMap::default();
    let mut in_parameters = false;
    let mut seen_parameters = false;

    for line in raw.lines() {
        let line = line.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            in_parameters = line.eq_ignore_ascii_case("[PARAMETERS]");
            seen_parameters |= in_parameters;
            continue;
        }
        if !in_parameters {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value: f32 = value
            .trim()
            .parse()
            .map_err(|_| format!("{}: invalid value for {}", path.display(), key.trim()))?;

        match key.trim().to_ascii_uppercase().as_str() {
            "WIDTH" => map.width = value,
            "HEIGHT" => map.height = value,
            "MARGIN" => map.margin = value,
            "SCALE_FACTOR" => map.scale_factor = value,
            "X_OFFSET" => map.offset_x = value,
            "Z_OFFSET" => map.offset_z = value,
            "DRAWING_SIZE" => map.drawing_size = value,
            _ => {}
        }
    }

    if !seen_parameters {
        return Err(format!("{}: missing [PARAMETERS] section", path.display()));
    }
    Ok(map)
}
