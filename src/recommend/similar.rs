//! The `similar` recommendation pipeline (§4.6): resolves one or more seed
//! tracks to their nearest neighbors, runs every candidate through the
//! filter table, backfills from the softly-filtered pool when too few
//! tracks survive, and returns an ordered, optionally shuffled playlist.
//! Grounded in the source system's `similar_api` and its helpers
//! `get_similars`/`genre_adjust`/`append_list`/`set_filtered`
//! (`examples/original_source/lib/app.py`).

use crate::config::Settings;
use crate::core::genre::{genre_adjust, genre_compatible, is_christmas, GenreGroups};
use crate::engine::Engine;
use crate::recommend::album_key::album_key;
use crate::recommend::attrib_filter::{fails_attrib_filter, SeedAttribProfile};
use crate::recommend::options::{SimilarOptions, MIN_NUM_SIM, SHUFFLE_FACTOR};
use crate::recommend::path_codec::{decode, encode};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct FilterOut {
    artists: HashSet<String>,
    albums: HashSet<String>,
    titles: HashSet<String>,
}

#[derive(Debug, Clone)]
struct FilteredEntry {
    path: String,
    row_id: i64,
    sim: f64,
}

#[derive(Debug, Clone)]
struct Accepted {
    path: String,
    similarity: f64,
}

struct MatchedArtist {
    /// The raw (pre-adjustment) similarity of the track that first matched
    /// this artist, used to bound how close an alternative must be.
    raw_similarity: f64,
    alternatives: Vec<(String, f64)>,
    pos: usize,
}

const MAX_ARTIST_ALTERNATIVES: usize = 5;
const ARTIST_ALTERNATIVE_MAX_SIM_DIFF: f64 = 0.1;
const BACKFILL_MIN_COUNT: usize = 2;

/// Run the full pipeline and return encoded output paths, ready to be
/// serialized by the `/api/similar` handler.
pub fn similar(engine: &Engine, settings: &Settings, opts: &SimilarOptions) -> Vec<String> {
    let root = opts
        .mpath
        .clone()
        .or_else(|| settings.paths.lms.as_ref().map(|p| p.display().to_string()))
        .unwrap_or_default();
    let root = if root.is_empty() || root.ends_with('/') {
        root
    } else {
        format!("{root}/")
    };

    let add_file_protocol = opts.tracks.first().map(|t| t.starts_with("file://")).unwrap_or(false);

    let genre_cfg = match &opts.genre_groups {
        Some(groups) => GenreGroups::new(groups.iter().map(|g| g.iter().cloned().collect()).collect()),
        None => GenreGroups::new(settings.genres.clone()),
    };

    let max_bpm_diff = opts.max_bpm_diff.unwrap_or(settings.essentia.bpm);
    let filter_key = opts.filter_key.unwrap_or(settings.essentia.filterkey);
    let filter_attrib = opts.filter_attrib.unwrap_or(settings.essentia.filterattrib);
    let attrib_enabled = settings.essentia.enabled && settings.essentia.highlevel;

    let min_duration = if opts.min_duration > 0 { opts.min_duration } else { settings.minduration };
    let max_duration = if opts.max_duration > 0 { opts.max_duration } else { settings.maxduration };

    let mut seed_positions = Vec::new();
    let mut skip_ids: HashSet<i64> = HashSet::new();
    let mut filter_out = FilterOut::default();
    let mut seed_genres: HashSet<String> = HashSet::new();
    let mut acceptable_genres: HashSet<String> = HashSet::new();

    let have_prev = !opts.previous.is_empty();

    for (trk_count, raw) in opts.tracks.iter().enumerate() {
        let decoded = decode(raw, &root);
        let Some(pos) = engine.pos_for_path(&decoded) else { continue };
        let Some(meta) = engine.record_at(pos) else { continue };

        seed_positions.push(pos);
        skip_ids.insert(meta.id);

        if let Some(title) = &meta.title {
            filter_out.titles.insert(title.to_lowercase());
        }
        if !have_prev {
            if (trk_count as i64) < opts.no_repeat_artist {
                if let Some(artist) = &meta.artist {
                    filter_out.artists.insert(artist.to_lowercase());
                }
            }
            if (trk_count as i64) < opts.no_repeat_album {
                if let Some(key) = album_key(meta) {
                    filter_out.albums.insert(key);
                }
            }
        }

        if !meta.genres.is_empty() {
            seed_genres.extend(meta.genres.iter().cloned());
            let expanded = genre_cfg.expand(&meta.genres);
            acceptable_genres.extend(expanded.iter().cloned());
            seed_genres.extend(expanded);
        }
    }

    if have_prev {
        for (trk_count, raw) in opts.previous.iter().enumerate() {
            let decoded = decode(raw, &root);
            let Some(pos) = engine.pos_for_path(&decoded) else { continue };
            let Some(meta) = engine.record_at(pos) else { continue };

            if let Some(title) = &meta.title {
                filter_out.titles.insert(title.to_lowercase());
            }
            if (trk_count as i64) < opts.no_repeat_artist {
                if let Some(artist) = &meta.artist {
                    filter_out.artists.insert(artist.to_lowercase());
                }
            }
            if (trk_count as i64) < opts.no_repeat_album {
                if let Some(key) = album_key(meta) {
                    filter_out.albums.insert(key);
                }
            }
            if opts.filter_genre && !meta.genres.is_empty() {
                acceptable_genres.extend(genre_cfg.expand(&meta.genres));
            }
        }
    }

    if seed_positions.is_empty() {
        return Vec::new();
    }

    let seed_count = seed_positions.len();
    let mut similarity_count = opts.count;
    if opts.shuffle && (opts.count < 20 || seed_count < 10) {
        similarity_count = opts.count * SHUFFLE_FACTOR;
    }
    if seed_count == 1 {
        similarity_count *= 2;
    }
    let tracks_per_seed = if similarity_count < 15 {
        (similarity_count as f64 * 2.5) as usize
    } else {
        similarity_count
    };
    let num_sim = (MIN_NUM_SIM.max(opts.count * seed_count * 50)).min(engine.record_count());

    let mut accepted: Vec<Accepted> = Vec::new();
    let mut similar_track_positions: HashMap<i64, usize> = HashMap::new();
    let mut matched_artists: HashMap<String, MatchedArtist> = HashMap::new();
    let mut filtered_meta: Vec<FilteredEntry> = Vec::new();
    let mut filtered_attribs: Vec<FilteredEntry> = Vec::new();
    let mut filtered_ids_meta: HashSet<i64> = HashSet::new();
    let mut filtered_ids_attribs: HashSet<i64> = HashSet::new();

    for &seed_pos in &seed_positions {
        let seed = match engine.record_at(seed_pos) {
            Some(s) => s,
            None => continue,
        };
        let seed_profile = seed.attr_hl.map(|hl| {
            SeedAttribProfile::compute(&hl, settings.essentia.filterattrib_lim, settings.essentia.filterattrib_count)
        });

        let neighbors = engine.knn(seed_pos, num_sim);
        let mut accepted_for_seed = 0usize;

        for neighbor in neighbors {
            if neighbor.sim.is_nan() {
                continue;
            }
            if neighbor.sim > opts.max_similarity {
                break;
            }
            if neighbor.sim <= 0.0 || skip_ids.contains(&neighbor.row_id) {
                continue;
            }

            if let Some(&prev_idx) = similar_track_positions.get(&neighbor.row_id) {
                let Some(candidate) = engine.pos_for_id(neighbor.row_id).and_then(|p| engine.record_at(p)) else {
                    continue;
                };
                let adjust = genre_adjust(
                    &seed.genres,
                    &candidate.genres,
                    &seed_genres,
                    &settings.all_genres,
                    opts.no_genre_match_adj,
                    opts.genre_group_adj,
                );
                let sim = neighbor.sim + adjust;
                if sim < accepted[prev_idx].similarity {
                    accepted[prev_idx].similarity = sim;
                }
                continue;
            }

            let Some(candidate_pos) = engine.pos_for_id(neighbor.row_id) else {
                skip_ids.insert(neighbor.row_id);
                continue;
            };
            let Some(candidate) = engine.record_at(candidate_pos) else {
                skip_ids.insert(neighbor.row_id);
                continue;
            };

            if candidate.ignore {
                skip_ids.insert(neighbor.row_id);
                continue;
            }
            if let Some(duration) = candidate.duration {
                if duration < min_duration || (max_duration > 0 && duration > max_duration) {
                    skip_ids.insert(neighbor.row_id);
                    continue;
                }
            }
            if opts.filter_genre && !genre_compatible(&acceptable_genres, &settings.all_genres, &candidate.genres) {
                skip_ids.insert(neighbor.row_id);
                continue;
            }
            if opts.filter_xmas && is_christmas(&candidate.genres) {
                skip_ids.insert(neighbor.row_id);
                continue;
            }

            if attrib_enabled
                && fails_attrib_filter(
                    seed,
                    candidate,
                    seed_profile.as_ref(),
                    max_bpm_diff,
                    filter_key,
                    filter_attrib,
                    settings.essentia.filterattrib_cand,
                    settings.essentia.filterattrib_lim,
                )
            {
                set_filtered_attribs(
                    neighbor.row_id,
                    &candidate.path,
                    neighbor.sim,
                    &mut filtered_attribs,
                    &mut filtered_ids_attribs,
                    &filtered_ids_meta,
                );
                continue;
            }

            let artist_lower = candidate.artist.as_deref().map(str::to_lowercase);
            if opts.no_repeat_artist > 0 {
                if let Some(artist) = &artist_lower {
                    if filter_out.artists.contains(artist) {
                        set_filtered_meta(
                            neighbor.row_id,
                            &candidate.path,
                            neighbor.sim,
                            &mut filtered_meta,
                            &mut filtered_ids_meta,
                            &mut filtered_attribs,
                            &mut filtered_ids_attribs,
                        );
                        if let Some(matched) = matched_artists.get_mut(artist) {
                            if matched.alternatives.len() < MAX_ARTIST_ALTERNATIVES
                                && (neighbor.sim - matched.raw_similarity).abs() <= ARTIST_ALTERNATIVE_MAX_SIM_DIFF
                            {
                                let album_ok = album_key(candidate)
                                    .map(|k| !filter_out.albums.contains(&k))
                                    .unwrap_or(true);
                                if album_ok {
                                    let adjust = genre_adjust(
                                        &seed.genres,
                                        &candidate.genres,
                                        &seed_genres,
                                        &settings.all_genres,
                                        opts.no_genre_match_adj,
                                        opts.genre_group_adj,
                                    );
                                    matched.alternatives.push((candidate.path.clone(), neighbor.sim + adjust));
                                }
                            }
                        }
                        continue;
                    }
                }
            }

            if opts.no_repeat_album > 0 {
                if let Some(key) = album_key(candidate) {
                    if filter_out.albums.contains(&key) {
                        set_filtered_meta(
                            neighbor.row_id,
                            &candidate.path,
                            neighbor.sim,
                            &mut filtered_meta,
                            &mut filtered_ids_meta,
                            &mut filtered_attribs,
                            &mut filtered_ids_attribs,
                        );
                        continue;
                    }
                }
            }

            if let Some(title) = &candidate.title {
                if filter_out.titles.contains(&title.to_lowercase()) {
                    set_filtered_meta(
                        neighbor.row_id,
                        &candidate.path,
                        neighbor.sim,
                        &mut filtered_meta,
                        &mut filtered_ids_meta,
                        &mut filtered_attribs,
                        &mut filtered_ids_attribs,
                    );
                    continue;
                }
            }

            let adjust = genre_adjust(
                &seed.genres,
                &candidate.genres,
                &seed_genres,
                &settings.all_genres,
                opts.no_genre_match_adj,
                opts.genre_group_adj,
            );
            let sim = neighbor.sim + adjust;

            accepted.push(Accepted { path: candidate.path.clone(), similarity: sim });
            let accepted_pos = accepted.len() - 1;
            similar_track_positions.insert(neighbor.row_id, accepted_pos);

            if let Some(artist) = &artist_lower {
                matched_artists.insert(
                    artist.clone(),
                    MatchedArtist {
                        raw_similarity: neighbor.sim,
                        alternatives: vec![(candidate.path.clone(), sim)],
                        pos: accepted_pos,
                    },
                );
                if opts.no_repeat_artist > 0 {
                    filter_out.artists.insert(artist.clone());
                }
            }
            if let Some(title) = &candidate.title {
                filter_out.titles.insert(title.to_lowercase());
            }
            if opts.no_repeat_album > 0 {
                if let Some(key) = album_key(candidate) {
                    filter_out.albums.insert(key);
                }
            }

            accepted_for_seed += 1;
            if accepted_for_seed >= tracks_per_seed {
                break;
            }
        }
    }

    // Coalesce: every artist matched more than once gets a random alternative
    // swapped into its original slot, keeping the originally accepted score.
    let mut rng = rand::thread_rng();
    for matched in matched_artists.values() {
        if matched.alternatives.len() > 1 {
            if let Some((path, _)) = matched.alternatives.choose(&mut rng) {
                let kept_sim = accepted[matched.pos].similarity;
                accepted[matched.pos] = Accepted { path: path.clone(), similarity: kept_sim };
            }
        }
    }

    if accepted.len() < BACKFILL_MIN_COUNT {
        append_list(&mut accepted, &filtered_meta, BACKFILL_MIN_COUNT);
    }
    if accepted.len() < BACKFILL_MIN_COUNT {
        append_list(&mut accepted, &filtered_attribs, BACKFILL_MIN_COUNT);
    }

    accepted.sort_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal));

    if opts.shuffle {
        accepted.truncate(similarity_count);
        accepted.shuffle(&mut rng);
    }
    accepted.truncate(opts.count);

    accepted.into_iter().map(|t| encode(&root, &t.path, add_file_protocol)).collect()
}

/// Mark a candidate filtered for a metadata reason (artist/album/title
/// repeat), promoting it out of `attribs` if it had already landed there —
/// `meta` discards outrank `attribs` discards for backfill purposes.
/// Mirrors the source system's `set_filtered(..., key='meta')`.
fn set_filtered_meta(
    row_id: i64,
    path: &str,
    sim: f64,
    meta: &mut Vec<FilteredEntry>,
    meta_ids: &mut HashSet<i64>,
    attribs: &mut Vec<FilteredEntry>,
    attrib_ids: &mut HashSet<i64>,
) {
    if meta_ids.contains(&row_id) {
        return;
    }
    if attrib_ids.remove(&row_id) {
        attribs.retain(|e| e.row_id != row_id);
    }
    meta.push(FilteredEntry { path: path.to_string(), row_id, sim });
    meta_ids.insert(row_id);
}

/// Mark a candidate filtered for the attribute soft filter. A no-op if it is
/// already filtered under `meta`, since that discard outranks this one.
/// Mirrors the source system's `set_filtered(..., key='attribs')`.
fn set_filtered_attribs(
    row_id: i64,
    path: &str,
    sim: f64,
    attribs: &mut Vec<FilteredEntry>,
    attrib_ids: &mut HashSet<i64>,
    meta_ids: &HashSet<i64>,
) {
    if attrib_ids.contains(&row_id) || meta_ids.contains(&row_id) {
        return;
    }
    attribs.push(FilteredEntry { path: path.to_string(), row_id, sim });
    attrib_ids.insert(row_id);
}

/// Sort `to_add` by similarity and append non-duplicate paths to `into`
/// until it reaches `min_count`. Mirrors `append_list`.
fn append_list(into: &mut Vec<Accepted>, to_add: &[FilteredEntry], min_count: usize) {
    let existing: HashSet<String> = into.iter().map(|t| t.path.clone()).collect();
    let mut sorted: Vec<&FilteredEntry> = to_add.iter().collect();
    sorted.sort_by(|a, b| a.sim.partial_cmp(&b.sim).unwrap_or(std::cmp::Ordering::Equal));
    for entry in sorted {
        if into.len() >= min_count {
            break;
        }
        if existing.contains(&entry.path) {
            continue;
        }
        into.push(Accepted { path: entry.path.clone(), similarity: entry.sim });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_list_fills_to_min_count_sorted_by_similarity() {
        let mut into = vec![Accepted { path: "a.flac".to_string(), similarity: 0.1 }];
        let pool = vec![
            FilteredEntry { path: "c.flac".to_string(), row_id: 3, sim: 0.4 },
            FilteredEntry { path: "b.flac".to_string(), row_id: 2, sim: 0.2 },
        ];
        append_list(&mut into, &pool, 2);
        assert_eq!(into.len(), 2);
        assert_eq!(into[1].path, "b.flac");
    }

    #[test]
    fn test_append_list_skips_duplicate_paths() {
        let mut into = vec![Accepted { path: "a.flac".to_string(), similarity: 0.1 }];
        let pool = vec![FilteredEntry { path: "a.flac".to_string(), row_id: 1, sim: 0.2 }];
        append_list(&mut into, &pool, 2);
        assert_eq!(into.len(), 1);
    }

    #[test]
    fn test_set_filtered_meta_promotes_out_of_attribs() {
        let mut meta: Vec<FilteredEntry> = Vec::new();
        let mut attribs: Vec<FilteredEntry> = Vec::new();
        let mut meta_ids = HashSet::new();
        let mut attrib_ids = HashSet::new();

        set_filtered_attribs(7, "x.flac", 0.3, &mut attribs, &mut attrib_ids, &meta_ids);
        assert_eq!(attribs.len(), 1);

        set_filtered_meta(7, "x.flac", 0.3, &mut meta, &mut meta_ids, &mut attribs, &mut attrib_ids);
        assert_eq!(meta.len(), 1, "promoted into meta");
        assert_eq!(attribs.len(), 0, "removed from attribs once promoted");
    }

    #[test]
    fn test_set_filtered_attribs_noop_if_already_meta() {
        let mut meta: Vec<FilteredEntry> = Vec::new();
        let mut attribs: Vec<FilteredEntry> = Vec::new();
        let mut meta_ids = HashSet::new();
        let mut attrib_ids = HashSet::new();

        set_filtered_meta(9, "y.flac", 0.1, &mut meta, &mut meta_ids, &mut attribs, &mut attrib_ids);
        set_filtered_attribs(9, "y.flac", 0.1, &mut attribs, &mut attrib_ids, &meta_ids);
        assert_eq!(attribs.len(), 0, "meta discard outranks attribs discard");
    }
}
