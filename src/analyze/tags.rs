//! Tag reading (§1): `TagReader` is the normative interface; `LoftyTagReader`
//! is the one concrete implementation this crate ships, built the same way
//! the teacher's indexer reads tags.

use lofty::{Accessor, AudioFile, ItemKey, Probe, TaggedFileExt};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub albumartist: Option<String>,
    pub genres: HashSet<String>,
    pub duration: Option<i64>,
}

pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Option<TrackTags>;
}

pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Option<TrackTags> {
        let tagged_file = Probe::open(path).ok()?.read().ok()?;
        let duration = Some(tagged_file.properties().duration().as_secs() as i64);
        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag())?;

        let genres = tag
            .genre()
            .map(|g| {
                g.split(';')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Some(TrackTags {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            albumartist: tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()),
            genres,
            duration,
        })
    }
}
