//! Album-key derivation (§4.6), used for the album-repeat filter and the
//! style-track album sampling. Grounded in the source system's
//! `get_album_key` (`examples/original_source/lib/app.py`).

use crate::catalog::TrackRecord;
use crate::core::genre::is_various_artists;

/// `Some("<albumartist-or-artist>::<album>")`, or `None` when the
/// album-artist credit is a "Various Artists" spelling — such an album can
/// never collide under the album-repeat rule (§8's "Album-key law").
pub fn album_key(track: &TrackRecord) -> Option<String> {
    let album = track.album.as_deref()?;
    let credit = track
        .albumartist
        .as_deref()
        .filter(|a| !a.is_empty())
        .or(track.artist.as_deref())?;

    if is_various_artists(credit) {
        return None;
    }
    Some(format!("{credit}::{album}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn track(albumartist: Option<&str>, artist: Option<&str>, album: Option<&str>) -> TrackRecord {
        TrackRecord {
            id: 1,
            path: "/a.flac".to_string(),
            title: None,
            artist: artist.map(str::to_string),
            album: album.map(str::to_string),
            albumartist: albumartist.map(str::to_string),
            genres: HashSet::new(),
            duration: None,
            ignore: false,
            timbre_blob: None,
            descriptor_vec: None,
            attr_bpm: None,
            attr_key: None,
            attr_hl: None,
        }
    }

    #[test]
    fn test_prefers_albumartist() {
        let t = track(Some("The Band"), Some("Solo Guy"), Some("Album"));
        assert_eq!(album_key(&t), Some("The Band::Album".to_string()));
    }

    #[test]
    fn test_falls_back_to_artist() {
        let t = track(None, Some("Solo Guy"), Some("Album"));
        assert_eq!(album_key(&t), Some("Solo Guy::Album".to_string()));
    }

    #[test]
    fn test_various_artists_yields_none() {
        let t = track(Some("Various Artists"), Some("Solo Guy"), Some("Compilation"));
        assert_eq!(album_key(&t), None);
    }

    #[test]
    fn test_missing_album_yields_none() {
        let t = track(Some("The Band"), None, None);
        assert_eq!(album_key(&t), None);
    }
}
