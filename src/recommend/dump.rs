//! The `dump` endpoint (§4.7): a single seed's raw neighbor list, lightly
//! filtered (or, in `raw` mode, not filtered at all), returned as JSON or
//! text. Grounded in the source system's `dump_api`
//! (`examples/original_source/lib/app.py`).

use crate::config::Settings;
use crate::core::genre::{genre_adjust, GenreGroups};
use crate::engine::Engine;
use crate::recommend::options::{DumpOptions, MIN_NUM_SIM};
use crate::recommend::path_codec::{decode, encode};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DumpEntry {
    pub file: String,
    pub sim: f64,
}

/// `raw = false`: same genre/christmas/title-dedup/attribute gating as
/// `similar`'s per-candidate table, minus the repeat-avoidance state (a
/// `dump` has no "previous tracks" concept). `raw = true` bypasses every
/// filter and genre adjustment, returning the neighbor list as the index
/// computed it (§4.7's documented escape hatch for debugging a fusion mode).
pub fn dump(engine: &Engine, settings: &Settings, opts: &DumpOptions) -> Vec<DumpEntry> {
    let root = opts
        .mpath
        .clone()
        .or_else(|| settings.paths.lms.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();
    let root = if root.is_empty() || root.ends_with('/') { root } else { format!("{root}/") };

    let decoded = decode(&opts.track, &root);
    let Some(seed_pos) = engine.pos_for_path(&decoded) else { return Vec::new() };
    let Some(seed) = engine.record_at(seed_pos) else { return Vec::new() };

    let genre_cfg = GenreGroups::new(settings.genres.clone());
    let acceptable_genres = genre_cfg.expand(&seed.genres);

    let num_sim = MIN_NUM_SIM.max(opts.count * 50).min(engine.record_count());
    let neighbors = engine.knn(seed_pos, num_sim);

    let mut out = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    for neighbor in neighbors {
        if neighbor.sim.is_nan() {
            continue;
        }
        // dump_api stops at the first repeated row rather than skipping it.
        if !seen_ids.insert(neighbor.row_id) {
            break;
        }

        if opts.raw {
            out.push(DumpEntry { file: encode(&root, &neighbor.path, false), sim: neighbor.sim });
            if out.len() >= opts.count {
                break;
            }
            continue;
        }

        let Some(candidate_pos) = engine.pos_for_id(neighbor.row_id) else { continue };
        let Some(candidate) = engine.record_at(candidate_pos) else { continue };

        if opts.filter_artist {
            if seed.artist.is_none() || candidate.artist != seed.artist {
                continue;
            }
        } else {
            if candidate.ignore {
                continue;
            }
            if candidate.path != seed.path && seed.title.is_some() && candidate.title == seed.title {
                continue;
            }
        }

        let adjust = genre_adjust(
            &seed.genres,
            &candidate.genres,
            &acceptable_genres,
            &settings.all_genres,
            opts.no_genre_match_adj,
            opts.genre_group_adj,
        );

        out.push(DumpEntry { file: encode(&root, &candidate.path, false), sim: neighbor.sim + adjust });
        if out.len() >= opts.count {
            break;
        }
    }

    out.sort_by(|a, b| a.sim.partial_cmp(&b.sim).unwrap_or(std::cmp::Ordering::Equal));
    out.truncate(opts.count);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_entry_serializes_file_and_sim() {
        let entry = DumpEntry { file: "Artist/song.mp3".to_string(), sim: 0.42 };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"file":"Artist/song.mp3","sim":0.42}"#);
    }
}
