//! Seed-path decode/encode (§4.6/§6): strips a `file://`/`tmp://` prefix and
//! the configured library root off an inbound seed path, and re-applies the
//! root (plus optional `file://`) on the way out. Cue tracks are re-encoded
//! to `<source>#start-end` instead of the internal `.CUE_TRACK.` form,
//! mirroring the source system's `decode`/`encode`
//! (`examples/original_source/lib/app.py`).

use crate::analyze::cue::{parse_virtual_path, CUE_TRACK_MARKER};
use urlencoding::{decode as url_decode, encode as url_encode};

/// Inverse of `encode`: strip protocol prefix and library root, then turn a
/// `#start-end` cue suffix back into the internal virtual-path form so it
/// can be looked up in the catalog.
pub fn decode(raw: &str, root: &str) -> String {
    let unescaped = url_decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string());

    let stripped = unescaped
        .strip_prefix("file://")
        .or_else(|| unescaped.strip_prefix("tmp://"))
        .unwrap_or(&unescaped);

    let without_root = stripped.strip_prefix(root).unwrap_or(stripped);

    convert_from_cue_url(without_root)
}

/// Re-attach `root`, optionally `file://`, and re-encode a cue virtual path
/// to its public `#start-end` form.
pub fn encode(root: &str, path: &str, add_file_protocol: bool) -> String {
    let full_path = format!("{root}{path}");

    if full_path.contains(CUE_TRACK_MARKER) {
        return convert_to_cue_url(&full_path);
    }

    if add_file_protocol {
        format!("file://{}", url_encode(&full_path))
    } else {
        full_path
    }
}

/// `"<source>#start-end"` -> the internal `.CUE_TRACK.<start>-<end>.mp3`
/// virtual path, if `raw` looks like a cue reference at all.
fn convert_from_cue_url(raw: &str) -> String {
    let Some((source, span)) = raw.rsplit_once('#') else {
        return raw.to_string();
    };
    if !span.contains('-') {
        return raw.to_string();
    }
    format!("{source}{CUE_TRACK_MARKER}{span}.mp3")
}

/// The internal virtual path -> its public `<source>#start-end` form.
fn convert_to_cue_url(full_path: &str) -> String {
    match parse_virtual_path(full_path) {
        Some((source, span)) => format!(
            "{}#{}-{}",
            source.display(),
            span.start_secs,
            span.end_secs
        ),
        None => full_path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_file_protocol_and_root() {
        let decoded = decode("file:///music/Artist/song.mp3", "/music/");
        assert_eq!(decoded, "Artist/song.mp3");
    }

    #[test]
    fn test_decode_cue_suffix() {
        let decoded = decode("/music/album.flac#0-183.5", "/music/");
        assert_eq!(decoded, "album.flac.CUE_TRACK.0-183.5.mp3");
    }

    #[test]
    fn test_encode_round_trips_cue() {
        let encoded = encode("/music/", "album.flac.CUE_TRACK.0-183.5.mp3", false);
        assert_eq!(encoded, "/music/album.flac#0-183.5");
    }

    #[test]
    fn test_encode_plain_path() {
        let encoded = encode("/music/", "Artist/song.mp3", false);
        assert_eq!(encoded, "/music/Artist/song.mp3");
    }
}
