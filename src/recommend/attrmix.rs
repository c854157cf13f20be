//! The `attrmix` endpoint (§4.7): a pure scalar/attribute playlist builder
//! with no similarity scoring at all, walking the catalog in id order and
//! keeping whatever passes the requested thresholds. Grounded in the source
//! system's `attrmix_api` (`examples/original_source/lib/app.py`).

use crate::catalog::TrackRecord;
use crate::config::Settings;
use crate::core::genre::{genre_compatible, is_christmas};
use crate::engine::Engine;
use crate::recommend::album_key::album_key;
use crate::recommend::options::{AttribFilterValue, AttrmixOptions};
use crate::recommend::path_codec::encode;
use std::collections::{HashMap, HashSet};

/// A resolved attribute threshold: keep rows whose value is `<= val` (a
/// "low" requirement) or `>= val` (a "high" requirement). `val == 0.5`
/// carries no filtering information and is dropped, matching the source
/// system's `attrmix_api`.
enum AttribThreshold {
    AtMost(f64),
    AtLeast(f64),
}

fn resolve_attrib_threshold(value: AttribFilterValue, settings: &Settings) -> Option<AttribThreshold> {
    let val = match value {
        AttribFilterValue::Yes => settings.essentia.attrmix_yes,
        AttribFilterValue::No => settings.essentia.attrmix_no,
        AttribFilterValue::Percent(pct) => pct as f64 / 100.0,
    };
    if val > 0.0 && val < 0.5 {
        Some(AttribThreshold::AtMost(val))
    } else if val > 0.5 {
        Some(AttribThreshold::AtLeast(val))
    } else {
        None
    }
}

fn passes_attrib_thresholds(track: &TrackRecord, thresholds: &[(String, AttribThreshold)]) -> bool {
    let Some(hl) = &track.attr_hl else { return thresholds.is_empty() };
    thresholds.iter().all(|(name, threshold)| {
        let Some(v) = hl.get(name) else { return false };
        match threshold {
            AttribThreshold::AtMost(limit) => v <= *limit,
            AttribThreshold::AtLeast(limit) => v >= *limit,
        }
    })
}

/// Build the scalar-constraint filter set once, returning `None` if the
/// request names no usable filter at all (§4.7: the endpoint requires at
/// least one).
fn build_thresholds(opts: &AttrmixOptions, settings: &Settings) -> Option<Vec<(String, AttribThreshold)>> {
    let mut thresholds = Vec::new();
    for (name, raw) in &opts.attribs {
        if let Some(t) = resolve_attrib_threshold(*raw, settings) {
            thresholds.push((name.clone(), t));
        }
    }
    let has_duration = opts.min_duration > 0 || opts.max_duration > 0;
    let has_bpm = opts.min_bpm > 0 || opts.max_bpm > 0;
    if thresholds.is_empty() && !has_duration && !has_bpm {
        return None;
    }
    Some(thresholds)
}

/// Walk the catalog in id order, keeping rows that pass every requested
/// scalar/attribute/genre filter plus christmas/title/artist/album repeat
/// avoidance, until `count` tracks are collected. Returns `None` if the
/// request names no usable filter (the handler should answer 400).
pub fn attrmix(engine: &Engine, settings: &Settings, opts: &AttrmixOptions) -> Option<Vec<String>> {
    if !(settings.essentia.enabled && settings.essentia.highlevel) {
        return None;
    }
    let thresholds = build_thresholds(opts, settings)?;

    let root = opts
        .mpath
        .clone()
        .or_else(|| settings.paths.lms.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();
    let root = if root.is_empty() || root.ends_with('/') { root } else { format!("{root}/") };

    let (min_duration, max_duration) = (opts.min_duration.max(0), opts.max_duration.max(0));
    let (min_bpm, max_bpm) = if opts.min_bpm > 0 && opts.max_bpm > 0 && opts.min_bpm > opts.max_bpm {
        (opts.max_bpm, opts.min_bpm)
    } else {
        (opts.min_bpm, opts.max_bpm)
    };

    let requested_genres: HashSet<String> = opts.genres.clone().unwrap_or_default().into_iter().collect();
    let all_genres_universe: HashSet<String> = HashSet::new();

    let mut titles: HashSet<String> = HashSet::new();
    let mut artist_last_index: HashMap<String, usize> = HashMap::new();
    let mut album_last_index: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for track in engine.records() {
        if track.ignore {
            continue;
        }
        if let Some(duration) = track.duration {
            if min_duration > 0 && duration < min_duration {
                continue;
            }
            if max_duration > 0 && duration > max_duration {
                continue;
            }
        }
        if let Some(bpm) = track.attr_bpm {
            if min_bpm > 0 && bpm < min_bpm {
                continue;
            }
            if max_bpm > 0 && bpm > max_bpm {
                continue;
            }
        }
        if !passes_attrib_thresholds(track, &thresholds) {
            continue;
        }
        if !requested_genres.is_empty() && !genre_compatible(&requested_genres, &all_genres_universe, &track.genres) {
            continue;
        }
        if opts.filter_xmas && is_christmas(&track.genres) {
            continue;
        }
        if let Some(title) = &track.title {
            let lowered = title.to_lowercase();
            if titles.contains(&lowered) {
                continue;
            }
        }
        if opts.no_repeat_artist > 0 {
            if let Some(artist) = &track.artist {
                let lowered = artist.to_lowercase();
                if let Some(&last) = artist_last_index.get(&lowered) {
                    if (out.len() as i64 - last as i64) < opts.no_repeat_artist {
                        continue;
                    }
                }
            }
        }
        if opts.no_repeat_album > 0 {
            if let Some(key) = album_key(track) {
                if let Some(&last) = album_last_index.get(&key) {
                    if (out.len() as i64 - last as i64) < opts.no_repeat_album {
                        continue;
                    }
                }
            }
        }

        if let Some(title) = &track.title {
            titles.insert(title.to_lowercase());
        }
        if let Some(artist) = &track.artist {
            artist_last_index.insert(artist.to_lowercase(), out.len());
        }
        if let Some(key) = album_key(track) {
            album_last_index.insert(key, out.len());
        }

        out.push(encode(&root, &track.path, opts.add_file_protocol));
        if out.len() >= opts.count {
            break;
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_threshold_skips_midpoint() {
        let settings = Settings::default();
        assert!(resolve_attrib_threshold(AttribFilterValue::Percent(50), &settings).is_none());
    }

    #[test]
    fn test_resolve_threshold_low_and_high() {
        let settings = Settings::default();
        assert!(matches!(
            resolve_attrib_threshold(AttribFilterValue::Percent(20), &settings),
            Some(AttribThreshold::AtMost(v)) if (v - 0.2).abs() < 1e-9
        ));
        assert!(matches!(
            resolve_attrib_threshold(AttribFilterValue::Percent(80), &settings),
            Some(AttribThreshold::AtLeast(v)) if (v - 0.8).abs() < 1e-9
        ));
    }

    #[test]
    fn test_resolve_threshold_yes_no_use_configured_defaults() {
        let settings = Settings::default();
        assert!(matches!(
            resolve_attrib_threshold(AttribFilterValue::Yes, &settings),
            Some(AttribThreshold::AtLeast(v)) if (v - settings.essentia.attrmix_yes).abs() < 1e-9
        ));
        assert!(matches!(
            resolve_attrib_threshold(AttribFilterValue::No, &settings),
            Some(AttribThreshold::AtMost(v)) if (v - settings.essentia.attrmix_no).abs() < 1e-9
        ));
    }
}
