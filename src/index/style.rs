//! Style-track subsetting (§4.4 supplemental): when the catalog outgrows
//! `styletracks`, the timbre jukebox's internal style centroid is derived
//! from a representative subset rather than every row, grounded in the
//! source system's jukebox builder (`examples/original_source/lib/
//! musly.py`'s `add_tracks`).

use crate::catalog::TrackRecord;
use crate::config::StyleTracksMethod;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;

/// Returns catalog-row positions (indices into `rows`) to use as the style
/// subset. If `rows.len() <= target`, every row is used.
pub fn select_style_subset(
    rows: &[TrackRecord],
    method: StyleTracksMethod,
    target: usize,
) -> Vec<usize> {
    if rows.len() <= target {
        return (0..rows.len()).collect();
    }

    let mut chosen = match method {
        StyleTracksMethod::Albums => sample_one_per_album(rows),
        StyleTracksMethod::Genres => sample_by_genre_share(rows, target),
    };

    let mut rng = thread_rng();
    if chosen.len() > target {
        chosen.shuffle(&mut rng);
        chosen.truncate(target);
    } else if chosen.len() < target {
        let chosen_set: std::collections::HashSet<usize> = chosen.iter().copied().collect();
        let mut remaining: Vec<usize> = (0..rows.len()).filter(|i| !chosen_set.contains(i)).collect();
        remaining.shuffle(&mut rng);
        chosen.extend(remaining.into_iter().take(target - chosen.len()));
    }

    chosen
}

fn sample_one_per_album(rows: &[TrackRecord]) -> Vec<usize> {
    let mut by_album: HashMap<String, usize> = HashMap::new();
    for (pos, row) in rows.iter().enumerate() {
        let key = format!(
            "{}::{}",
            row.albumartist.as_deref().unwrap_or(""),
            row.album.as_deref().unwrap_or("")
        );
        by_album.entry(key).or_insert(pos);
    }
    by_album.into_values().collect()
}

fn sample_by_genre_share(rows: &[TrackRecord], target: usize) -> Vec<usize> {
    let mut by_genre: HashMap<String, Vec<usize>> = HashMap::new();
    let mut ungenred = Vec::new();
    for (pos, row) in rows.iter().enumerate() {
        match row.genres.iter().next() {
            Some(genre) => by_genre.entry(genre.clone()).or_default().push(pos),
            None => ungenred.push(pos),
        }
    }

    let total = rows.len().max(1);
    let mut rng = thread_rng();
    let mut chosen = Vec::new();
    for positions in by_genre.values() {
        let share = ((positions.len() as f64 / total as f64) * target as f64).round() as usize;
        let mut positions = positions.clone();
        positions.shuffle(&mut rng);
        chosen.extend(positions.into_iter().take(share.max(1)));
    }
    if chosen.len() < target {
        let mut extra = ungenred;
        extra.shuffle(&mut rng);
        chosen.extend(extra.into_iter().take(target - chosen.len()));
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fixture(n: usize) -> Vec<TrackRecord> {
        (0..n)
            .map(|i| TrackRecord {
                id: i as i64 + 1,
                path: format!("/music/{i}.flac"),
                title: None,
                artist: None,
                album: Some(format!("album-{}", i % 3)),
                albumartist: None,
                genres: HashSet::new(),
                duration: None,
                ignore: false,
                timbre_blob: None,
                descriptor_vec: None,
                attr_bpm: None,
                attr_key: None,
                attr_hl: None,
            })
            .collect()
    }

    #[test]
    fn test_subset_returns_everything_under_threshold() {
        let rows = fixture(5);
        let subset = select_style_subset(&rows, StyleTracksMethod::Albums, 10);
        assert_eq!(subset.len(), 5);
    }

    #[test]
    fn test_albums_method_caps_at_target() {
        let rows = fixture(100);
        let subset = select_style_subset(&rows, StyleTracksMethod::Albums, 10);
        assert_eq!(subset.len(), 10);
    }
}
