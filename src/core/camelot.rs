//! The Camelot wheel key-compatibility map (§3), ported from the source
//! system's `CAMELOT` table and `init_camelot` compatible-set builder
//! (`examples/original_source/lib/filters.py`).

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Musical key string -> Camelot code. Includes the flat spellings Essentia
/// sometimes emits, same as the source table.
static CAMELOT: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("BM", "1B"), ("F#M", "2B"), ("C#M", "3B"), ("G#M", "4B"), ("D#M", "5B"), ("A#M", "6B"),
        ("FM", "7B"), ("CM", "8B"), ("GM", "9B"), ("DM", "10B"), ("AM", "11B"), ("EM", "12B"),
        ("G#m", "1A"), ("D#m", "2A"), ("A#m", "3A"), ("Fm", "4A"), ("Cm", "5A"), ("Gm", "6A"),
        ("Dm", "7A"), ("Am", "8A"), ("Em", "9A"), ("Bm", "10A"), ("F#m", "11A"), ("C#m", "12A"),
        // flats, just in case an analyzer emits these
        ("GbM", "2B"), ("DbM", "3B"), ("AbM", "4B"), ("EbM", "5B"), ("BbM", "6B"),
        ("Abm", "1A"), ("Ebm", "2A"), ("Bbm", "3A"), ("Gbm", "11A"), ("Dbm", "12A"),
    ]
    .into_iter()
    .collect()
});

/// Camelot code -> its 4-code compatible set (self, parallel major/minor,
/// ±1 around the wheel), built once from `CAMELOT`'s codomain.
static COMPATIBLE: Lazy<HashMap<&'static str, [String; 4]>> = Lazy::new(|| {
    let mut codes: Vec<&'static str> = CAMELOT.values().copied().collect();
    codes.sort_unstable();
    codes.dedup();

    codes
        .into_iter()
        .map(|code| {
            let (num, letter) = split_code(code);
            let other_letter = if letter == 'A' { 'B' } else { 'A' };
            let prev = if num > 1 { num - 1 } else { 12 };
            let next = if num < 12 { num + 1 } else { 1 };
            (
                code,
                [
                    code.to_string(),
                    format!("{num}{other_letter}"),
                    format!("{prev}{letter}"),
                    format!("{next}{letter}"),
                ],
            )
        })
        .collect()
});

fn split_code(code: &str) -> (u32, char) {
    let letter = code.chars().last().unwrap();
    let num: u32 = code[..code.len() - 1].parse().unwrap();
    (num, letter)
}

/// Resolve a raw key string (e.g. `"Am"`, `"F#M"`) to its Camelot code.
pub fn camelot_code(key: &str) -> Option<&'static str> {
    CAMELOT.get(key).copied()
}

/// The 4 Camelot codes compatible with `code` (self included).
pub fn compatible_codes(code: &str) -> Option<&'static [String; 4]> {
    COMPATIBLE.get(code)
}

/// `true` iff `candidate_key`'s Camelot code is in `seed_key`'s compatible
/// set. Unknown keys on either side are treated as incompatible.
pub fn camelot_compatible(seed_key: &str, candidate_key: &str) -> bool {
    let Some(seed_code) = camelot_code(seed_key) else {
        return false;
    };
    let Some(candidate_code) = camelot_code(candidate_key) else {
        return false;
    };
    compatible_codes(seed_code)
        .map(|set| set.iter().any(|c| c == candidate_code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_is_self_compatible() {
        for key in CAMELOT.keys() {
            assert!(camelot_compatible(key, key), "{key} not self-compatible");
        }
    }

    #[test]
    fn test_every_code_has_four_compatible_codes() {
        for code in COMPATIBLE.values() {
            let unique: std::collections::HashSet<&String> = code.iter().collect();
            assert_eq!(unique.len(), 4, "{code:?} has duplicate compatible codes");
        }
    }

    #[test]
    fn test_known_compatible_pair() {
        // 8A (Am) <-> 8B (CM) are parallel major/minor
        assert!(camelot_compatible("Am", "CM"));
        // 8A (Am) <-> 9A (Em) are adjacent on the wheel
        assert!(camelot_compatible("Am", "Em"));
        // 8A (Am) is not compatible with, say, 2B (F#M)
        assert!(!camelot_compatible("Am", "F#M"));
    }

    #[test]
    fn test_unknown_key_is_incompatible() {
        assert!(!camelot_compatible("Zz", "Am"));
        assert!(!camelot_compatible("Am", "Zz"));
    }
}
