//! BPM/key/high-level-attribute soft filtering (§4.6's "attributes" and
//! "bpm"/"key" filter-pipeline steps), grounded in the source system's
//! `check_attribs` (`examples/original_source/lib/filters.py`).

use crate::catalog::{HighLevelAttribs, TrackRecord, HL_ATTRIB_NAMES};
use crate::core::camelot::camelot_code;

/// The seed's "most-extreme" hl attributes (§4.6), computed once per seed
/// and reused for every candidate it is compared against.
#[derive(Debug, Clone, Default)]
pub struct SeedAttribProfile {
    extreme: Vec<(&'static str, f64)>,
}

impl SeedAttribProfile {
    pub fn compute(hl: &HighLevelAttribs, low_lim: f64, count: usize) -> Self {
        let high_lim = 1.0 - low_lim;
        let mut extreme: Vec<(&'static str, f64)> = HL_ATTRIB_NAMES
            .iter()
            .filter_map(|name| {
                let v = hl.get(name)?;
                let is_high = v >= high_lim && v < 1.0;
                let is_low = v > 0.000_001 && v <= low_lim;
                (is_high || is_low).then_some((*name, v))
            })
            .collect();
        extreme.sort_by(|a, b| (0.5 - b.1).abs().partial_cmp(&(0.5 - a.1).abs()).unwrap());
        extreme.truncate(count);
        Self { extreme }
    }
}

/// `true` iff `candidate` fails the bpm/key/attribute soft filter against
/// `seed` (§4.6's per-candidate filter table, "bpm"/"key"/"attributes"
/// rows). A `false` result means the candidate passes through unfiltered.
#[allow(clippy::too_many_arguments)]
pub fn fails_attrib_filter(
    seed: &TrackRecord,
    candidate: &TrackRecord,
    seed_profile: Option<&SeedAttribProfile>,
    max_bpm_diff: i32,
    filter_key: bool,
    filter_attrib: bool,
    filterattrib_cand: f64,
    filterattrib_lim: f64,
) -> bool {
    let (Some(seed_bpm), Some(cand_bpm)) = (seed.attr_bpm, candidate.attr_bpm) else {
        return false;
    };

    if max_bpm_diff > 0 && max_bpm_diff < 150 && (seed_bpm - cand_bpm).abs() > max_bpm_diff {
        return true;
    }

    if filter_key {
        if let Some(seed_key) = seed.attr_key.as_deref() {
            if let Some(seed_code) = camelot_code(seed_key) {
                let Some(cand_code) = candidate.attr_key.as_deref().and_then(camelot_code) else {
                    return true;
                };
                let compatible = crate::core::camelot::compatible_codes(seed_code)
                    .map(|set| set.iter().any(|c| c == cand_code))
                    .unwrap_or(false);
                if !compatible {
                    return true;
                }
            }
        }
    }

    if filter_attrib {
        if let (Some(profile), Some(cand_hl)) = (seed_profile, candidate.attr_hl.as_ref()) {
            let high_lim = 1.0 - filterattrib_lim;
            let cand_high = 1.0 - filterattrib_cand;
            for (name, seed_val) in &profile.extreme {
                let Some(cand_val) = cand_hl.get(name) else {
                    continue;
                };
                let fails_high = *seed_val >= high_lim && cand_val < cand_high;
                let fails_low = *seed_val <= filterattrib_lim && cand_val > filterattrib_cand;
                if fails_high || fails_low {
                    return true;
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn track(bpm: Option<i32>, key: Option<&str>, hl: Option<HighLevelAttribs>) -> TrackRecord {
        TrackRecord {
            id: 1,
            path: "/a.flac".to_string(),
            title: None,
            artist: None,
            album: None,
            albumartist: None,
            genres: HashSet::new(),
            duration: None,
            ignore: false,
            timbre_blob: None,
            descriptor_vec: None,
            attr_bpm: bpm,
            attr_key: key.map(str::to_string),
            attr_hl: hl,
        }
    }

    #[test]
    fn test_bpm_outside_tolerance_fails() {
        let seed = track(Some(120), None, None);
        let cand = track(Some(160), None, None);
        assert!(fails_attrib_filter(&seed, &cand, None, 20, false, false, 0.4, 0.2));
    }

    #[test]
    fn test_bpm_within_tolerance_passes() {
        let seed = track(Some(120), None, None);
        let cand = track(Some(125), None, None);
        assert!(!fails_attrib_filter(&seed, &cand, None, 20, false, false, 0.4, 0.2));
    }

    #[test]
    fn test_incompatible_key_fails() {
        let seed = track(Some(120), Some("Am"), None);
        let cand = track(Some(120), Some("F#M"), None);
        assert!(fails_attrib_filter(&seed, &cand, None, 20, true, false, 0.4, 0.2));
    }

    #[test]
    fn test_compatible_key_passes() {
        let seed = track(Some(120), Some("Am"), None);
        let cand = track(Some(120), Some("CM"), None);
        assert!(!fails_attrib_filter(&seed, &cand, None, 20, true, false, 0.4, 0.2));
    }

    #[test]
    fn test_extreme_attrib_opposite_tail_fails() {
        let mut hl = HighLevelAttribs::default();
        hl.danceable = 0.95;
        let profile = SeedAttribProfile::compute(&hl, 0.2, 4);
        let seed = track(Some(120), None, Some(hl));
        let mut cand_hl = HighLevelAttribs::default();
        cand_hl.danceable = 0.05;
        let cand = track(Some(120), None, Some(cand_hl));
        assert!(fails_attrib_filter(&seed, &cand, Some(&profile), 20, false, true, 0.4, 0.2));
    }
}
