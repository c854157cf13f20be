//! The catalog row type (§3) and the small input structs used to build one
//! up incrementally as analyzers complete.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The 11 mood/character outputs of the high-level attribute analyzer, each
/// in `[0,1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HighLevelAttribs {
    pub danceable: f64,
    pub aggressive: f64,
    pub electronic: f64,
    pub acoustic: f64,
    pub happy: f64,
    pub party: f64,
    pub relaxed: f64,
    pub sad: f64,
    pub dark: f64,
    pub tonal: f64,
    pub voice: f64,
}

/// Stable ordering of the 11 attributes, used wherever code needs to
/// iterate them by name (most-extreme selection, `attrmix` thresholds).
pub const HL_ATTRIB_NAMES: [&str; 11] = [
    "danceable",
    "aggressive",
    "electronic",
    "acoustic",
    "happy",
    "party",
    "relaxed",
    "sad",
    "dark",
    "tonal",
    "voice",
];

impl HighLevelAttribs {
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "danceable" => Some(self.danceable),
            "aggressive" => Some(self.aggressive),
            "electronic" => Some(self.electronic),
            "acoustic" => Some(self.acoustic),
            "happy" => Some(self.happy),
            "party" => Some(self.party),
            "relaxed" => Some(self.relaxed),
            "sad" => Some(self.sad),
            "dark" => Some(self.dark),
            "tonal" => Some(self.tonal),
            "voice" => Some(self.voice),
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: f64) {
        match name {
            "danceable" => self.danceable = value,
            "aggressive" => self.aggressive = value,
            "electronic" => self.electronic = value,
            "acoustic" => self.acoustic = value,
            "happy" => self.happy = value,
            "party" => self.party = value,
            "relaxed" => self.relaxed = value,
            "sad" => self.sad = value,
            "dark" => self.dark = value,
            "tonal" => self.tonal = value,
            "voice" => self.voice = value,
            _ => {}
        }
    }
}

/// Tag fields, written by `upsert_tags` (§4.1).
#[derive(Debug, Clone, Default)]
pub struct Tags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub albumartist: Option<String>,
    pub genres: Option<HashSet<String>>,
    pub duration: Option<i64>,
}

/// Per-analyzer feature payloads, written by `upsert_features` (§4.1). Any
/// field left `None` is left untouched on an existing row.
#[derive(Debug, Clone, Default)]
pub struct FeatureUpdate {
    pub timbre: Option<Vec<u8>>,
    pub descriptor: Option<Vec<f32>>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub hl: Option<HighLevelAttribs>,
}

/// A single catalog row (§3).
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: i64,
    pub path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub albumartist: Option<String>,
    pub genres: HashSet<String>,
    pub duration: Option<i64>,
    pub ignore: bool,
    pub timbre_blob: Option<Vec<u8>>,
    pub descriptor_vec: Option<Vec<f32>>,
    pub attr_bpm: Option<i32>,
    pub attr_key: Option<String>,
    pub attr_hl: Option<HighLevelAttribs>,
}

impl TrackRecord {
    pub fn has_timbre(&self) -> bool {
        self.timbre_blob.is_some()
    }
    pub fn has_descriptor(&self) -> bool {
        self.descriptor_vec.is_some()
    }
    pub fn has_attrib(&self) -> bool {
        self.attr_bpm.is_some() || self.attr_key.is_some() || self.attr_hl.is_some()
    }
}

/// Scalar constraints used by `select_where` (§4.1) and the `attrmix`
/// endpoint (§4.7).
#[derive(Debug, Clone, Default)]
pub struct ScalarConstraints {
    pub min_duration: Option<i64>,
    pub max_duration: Option<i64>,
    pub min_bpm: Option<i32>,
    pub max_bpm: Option<i32>,
    /// `(attribute name, minimum value)` pairs; a row must meet every one.
    pub attrib_thresholds: Vec<(String, f64)>,
    pub genres: Option<HashSet<String>>,
}
