//! Title/album/artist text normalization driven by `NormalizeCfg` (§6),
//! used when comparing candidates for title-dedup and artist-repeat
//! avoidance so that e.g. `"Song (Remastered 2009)"` and `"Song"` collide.
//! Bracket/dash stripping generalized to a configured suffix list rather
//! than a hardcoded one.

use crate::config::NormalizeCfg;
use regex::Regex;

/// Strip any configured suffix token found inside a trailing `(...)`/`[...]`
/// group or after a trailing ` - ` dash, then trim whitespace. Comparison
/// key only; never shown to the caller.
pub fn strip_suffixes(value: &str, suffixes: &[String]) -> String {
    if suffixes.is_empty() {
        return value.trim().to_lowercase();
    }

    let mut out = value.to_string();
    for suffix in suffixes {
        let escaped = regex::escape(suffix);
        if let Ok(bracket) = Regex::new(&format!(r"(?i)[\[\(][^\]\)]*{escaped}[^\]\)]*[\]\)]")) {
            out = bracket.replace_all(&out, "").to_string();
        }
        if let Ok(dash) = Regex::new(&format!(r"(?i)\s*[-\x{{2013}}\x{{2014}}]\s*{escaped}.*$")) {
            out = dash.replace_all(&out, "").to_string();
        }
    }
    out.trim().to_lowercase()
}

/// Split a credit string (`"Artist feat. Someone"`) at the first configured
/// boundary token, returning the primary artist. With no configured tokens
/// the credit is returned unchanged (lowercased for comparison).
pub fn primary_artist(credit: &str, boundary_tokens: &[String]) -> String {
    let lower = credit.to_lowercase();
    let mut cut = lower.len();
    for token in boundary_tokens {
        let needle = token.to_lowercase();
        if let Some(pos) = lower.find(&needle) {
            cut = cut.min(pos);
        }
    }
    lower[..cut].trim().trim_end_matches(['(', '[']).trim().to_string()
}

pub fn normalize_title(title: &str, cfg: &NormalizeCfg) -> String {
    strip_suffixes(title, &cfg.title)
}

pub fn normalize_album(album: &str, cfg: &NormalizeCfg) -> String {
    strip_suffixes(album, &cfg.album)
}

pub fn normalize_artist(artist: &str, cfg: &NormalizeCfg) -> String {
    primary_artist(artist, &cfg.artist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_remaster_suffix() {
        let suffixes = vec!["remaster".to_string()];
        assert_eq!(
            strip_suffixes("Song (Remastered 2009)", &suffixes),
            "song"
        );
    }

    #[test]
    fn test_strip_dash_suffix() {
        let suffixes = vec!["deluxe".to_string()];
        assert_eq!(strip_suffixes("Album - Deluxe Edition", &suffixes), "album");
    }

    #[test]
    fn test_primary_artist_splits_on_feat() {
        let tokens = vec!["feat.".to_string(), "ft.".to_string()];
        assert_eq!(primary_artist("Artist feat. Guest", &tokens), "artist");
        assert_eq!(primary_artist("Solo Artist", &tokens), "solo artist");
    }

    #[test]
    fn test_no_suffixes_just_lowercases() {
        assert_eq!(strip_suffixes("Song Title", &[]), "song title");
    }
}
