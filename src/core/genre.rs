//! Genre groups, compatibility, and the genre-score adjustment (§3/§4.6),
//! ported from the source system's `genre_matches`/`genre_adjust`/
//! `is_christmas` (`examples/original_source/lib/filters.py`).

use std::collections::HashSet;

pub const CHRISTMAS_GENRES: [&str; 2] = ["Christmas", "Xmas"];
pub const VARIOUS_ARTISTS: [&str; 2] = ["various", "various artists"];

/// A configured (or request-overridden) set of genre groups, plus their
/// union, used to expand a seed's genres into its "acceptable" set (§4.6).
#[derive(Debug, Clone, Default)]
pub struct GenreGroups {
    pub groups: Vec<HashSet<String>>,
    pub all_genres: HashSet<String>,
}

impl GenreGroups {
    pub fn new(groups: Vec<HashSet<String>>) -> Self {
        let all_genres = groups.iter().flatten().cloned().collect();
        Self { groups, all_genres }
    }

    /// Every configured group that intersects `genres`, unioned together.
    pub fn expand(&self, genres: &HashSet<String>) -> HashSet<String> {
        let mut out = HashSet::new();
        for group in &self.groups {
            if !group.is_disjoint(genres) {
                out.extend(group.iter().cloned());
            }
        }
        out
    }
}

/// `true` iff `candidate_genres` passes the genre-compatibility gate against
/// `acceptable_genres` (§4.6's "Genre compatibility"):
/// - no genres on the candidate -> always accept (nothing to conflict with)
/// - no acceptable genres but the candidate has genres known to the
///   configured universe -> reject, it can't be placed
/// - otherwise accept iff the two genre sets intersect
pub fn genre_compatible(
    acceptable_genres: &HashSet<String>,
    all_genres: &HashSet<String>,
    candidate_genres: &HashSet<String>,
) -> bool {
    if candidate_genres.is_empty() {
        return true;
    }
    if acceptable_genres.is_empty() {
        return candidate_genres.is_disjoint(all_genres);
    }
    !acceptable_genres.is_disjoint(candidate_genres)
}

/// `true` iff any of `genres` names a Christmas genre.
pub fn is_christmas(genres: &HashSet<String>) -> bool {
    genres.iter().any(|g| CHRISTMAS_GENRES.contains(&g.as_str()))
}

/// The additive genre-score adjustment (§4.6's "Genre score adjustment"):
/// `0.0` on exact intersection; `no_genre_match_adj` if either side has no
/// genres, or neither intersects; `genre_group_adj` if the candidate only
/// matches through an expanded group.
pub fn genre_adjust(
    seed_genres: &HashSet<String>,
    candidate_genres: &HashSet<String>,
    acceptable_genres: &HashSet<String>,
    all_genres: &HashSet<String>,
    no_genre_match_adj: f64,
    genre_group_adj: f64,
) -> f64 {
    if seed_genres.is_empty() || candidate_genres.is_empty() {
        return no_genre_match_adj;
    }
    if !seed_genres.is_disjoint(candidate_genres) {
        return 0.0;
    }
    let matches_universe = if !acceptable_genres.is_empty() {
        !candidate_genres.is_disjoint(acceptable_genres)
    } else {
        !all_genres.is_empty() && !candidate_genres.is_disjoint(all_genres)
    };
    if !matches_universe {
        return no_genre_match_adj;
    }
    genre_group_adj
}

/// `true` iff `various_value` is a recognized "Various Artists" spelling
/// (case-insensitive), used by the album-key rule (§4.6).
pub fn is_various_artists(value: &str) -> bool {
    VARIOUS_ARTISTS.contains(&value.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_genre_adjust_law() {
        let seed = set(&["Rock"]);
        let cand = set(&["Rock", "Pop"]);
        assert_eq!(genre_adjust(&seed, &cand, &set(&[]), &set(&[]), 0.15, 0.07), 0.0);

        let cand2 = set(&["Jazz"]);
        let acceptable = set(&["Rock", "Pop"]);
        let all = set(&["Rock", "Pop", "Jazz", "Classical"]);
        assert_eq!(genre_adjust(&seed, &cand2, &acceptable, &all, 0.15, 0.07), 0.15);
    }

    #[test]
    fn test_genre_adjust_group_match() {
        let seed = set(&["Rock"]);
        let cand = set(&["Pop"]);
        let acceptable = set(&["Rock", "Pop"]);
        let all = set(&["Rock", "Pop"]);
        assert_eq!(genre_adjust(&seed, &cand, &acceptable, &all, 0.15, 0.07), 0.07);
    }

    #[test]
    fn test_genre_compatible_no_candidate_genres_always_accepts() {
        assert!(genre_compatible(&set(&[]), &set(&["Rock"]), &set(&[])));
    }

    #[test]
    fn test_genre_compatible_rejects_when_no_acceptable_but_known_universe() {
        assert!(!genre_compatible(
            &set(&[]),
            &set(&["Classical"]),
            &set(&["Classical"])
        ));
    }

    #[test]
    fn test_various_artists_case_insensitive() {
        assert!(is_various_artists("Various Artists"));
        assert!(is_various_artists("VARIOUS"));
        assert!(!is_various_artists("The Beatles"));
    }
}
