//! Request-option parsing and defaults for the three query endpoints (§6).
//! Handlers translate an actix `Query`/JSON body into these plain structs;
//! everything here is decoupled from the HTTP layer so the pipeline logic
//! in `similar`/`dump`/`attrmix` is independently testable.
//!
//! The `Raw*Options` structs derive `Deserialize` directly so the same type
//! serves as both the GET query-string extractor (repeated keys fold into
//! `Vec` fields via `serde_urlencoded`) and the POST JSON body extractor.

use chrono::{Datelike, Local};
use serde::Deserialize;

pub const DEFAULT_TRACKS_TO_RETURN: usize = 5;
pub const MIN_TRACKS_TO_RETURN: usize = 1;
pub const MAX_TRACKS_TO_RETURN: usize = 50;
pub const DEFAULT_ATTRMIX_COUNT: usize = 100;
pub const DEFAULT_NUM_PREV_TRACKS_FILTER_ARTIST: i64 = 15;
pub const DEFAULT_NUM_PREV_TRACKS_FILTER_ALBUM: i64 = 25;
pub const SHUFFLE_FACTOR: usize = 5;
pub const MIN_NUM_SIM: usize = 5000;
pub const DEFAULT_NO_GENRE_MATCH_ADJ_PCT: i32 = 15;
pub const DEFAULT_GENRE_GROUP_ADJ_PCT: i32 = 7;

/// `filterxmas=1` only excludes Christmas genres outside of December (§4.6).
fn exclude_christmas(filterxmas: Option<i32>) -> bool {
    filterxmas.unwrap_or(0) == 1 && Local::now().month() != 12
}

#[derive(Debug, Clone)]
pub struct SimilarOptions {
    pub tracks: Vec<String>,
    pub previous: Vec<String>,
    pub count: usize,
    pub filter_genre: bool,
    pub shuffle: bool,
    pub max_similarity: f64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub no_repeat_artist: i64,
    pub no_repeat_album: i64,
    pub filter_xmas: bool,
    pub no_genre_match_adj: f64,
    pub genre_group_adj: f64,
    pub max_bpm_diff: Option<i32>,
    pub filter_key: Option<bool>,
    pub filter_attrib: Option<bool>,
    pub genre_groups: Option<Vec<Vec<String>>>,
    pub mpath: Option<String>,
    pub format: String,
}

/// The raw, un-clamped fields a handler reads off its query/body type.
/// Separated from `SimilarOptions` so `normalize()` applies the exact
/// clamping rules once, the same way for GET and POST.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSimilarOptions {
    #[serde(default, rename = "track")]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub previous: Vec<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub filtergenre: Option<i32>,
    #[serde(default)]
    pub shuffle: Option<i32>,
    #[serde(default)]
    pub maxsim: Option<i32>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub norepart: Option<i64>,
    #[serde(default)]
    pub norepalb: Option<i64>,
    #[serde(default)]
    pub filterxmas: Option<i32>,
    #[serde(default)]
    pub nogenrematchadj: Option<i32>,
    #[serde(default)]
    pub genregroupadj: Option<i32>,
    #[serde(default)]
    pub maxbpmdiff: Option<i32>,
    #[serde(default)]
    pub filterkey: Option<i32>,
    #[serde(default)]
    pub filterattrib: Option<i32>,
    #[serde(default)]
    pub genregroups: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub mpath: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl RawSimilarOptions {
    pub fn normalize(self) -> SimilarOptions {
        let mut count = self.count.unwrap_or(DEFAULT_TRACKS_TO_RETURN as i64);
        if count < MIN_TRACKS_TO_RETURN as i64 {
            count = MIN_TRACKS_TO_RETURN as i64;
        } else if count > MAX_TRACKS_TO_RETURN as i64 {
            count = MAX_TRACKS_TO_RETURN as i64;
        }

        let mut no_repeat_artist = self.norepart.unwrap_or(0);
        if !(0..=200).contains(&no_repeat_artist) {
            no_repeat_artist = DEFAULT_NUM_PREV_TRACKS_FILTER_ARTIST;
        }
        let mut no_repeat_album = self.norepalb.unwrap_or(0);
        if !(0..=200).contains(&no_repeat_album) {
            no_repeat_album = DEFAULT_NUM_PREV_TRACKS_FILTER_ALBUM;
        }

        SimilarOptions {
            tracks: self.tracks,
            previous: self.previous,
            count: count as usize,
            filter_genre: self.filtergenre.unwrap_or(0) == 1,
            shuffle: self.shuffle.unwrap_or(1) == 1,
            max_similarity: self.maxsim.unwrap_or(75) as f64 / 100.0,
            min_duration: self.min.unwrap_or(0),
            max_duration: self.max.unwrap_or(0),
            no_repeat_artist,
            no_repeat_album,
            filter_xmas: exclude_christmas(self.filterxmas),
            no_genre_match_adj: self.nogenrematchadj.unwrap_or(DEFAULT_NO_GENRE_MATCH_ADJ_PCT) as f64 / 100.0,
            genre_group_adj: self.genregroupadj.unwrap_or(DEFAULT_GENRE_GROUP_ADJ_PCT) as f64 / 100.0,
            max_bpm_diff: self.maxbpmdiff,
            filter_key: self.filterkey.map(|v| v == 1),
            filter_attrib: self.filterattrib.map(|v| v == 1),
            genre_groups: self.genregroups,
            mpath: self.mpath,
            format: self.format.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub track: String,
    pub count: usize,
    pub raw: bool,
    pub filter_artist: bool,
    pub no_genre_match_adj: f64,
    pub genre_group_adj: f64,
    pub mpath: Option<String>,
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDumpOptions {
    #[serde(default)]
    pub track: String,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub raw: Option<i32>,
    #[serde(default)]
    pub filterartist: Option<i32>,
    #[serde(default)]
    pub nogenrematchadj: Option<i32>,
    #[serde(default)]
    pub genregroupadj: Option<i32>,
    #[serde(default)]
    pub mpath: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl RawDumpOptions {
    pub fn normalize(self) -> DumpOptions {
        DumpOptions {
            track: self.track,
            count: self.count.unwrap_or(1000).max(1) as usize,
            raw: self.raw.unwrap_or(0) == 1,
            filter_artist: self.filterartist.unwrap_or(0) == 1,
            no_genre_match_adj: self.nogenrematchadj.unwrap_or(DEFAULT_NO_GENRE_MATCH_ADJ_PCT) as f64 / 100.0,
            genre_group_adj: self.genregroupadj.unwrap_or(DEFAULT_GENRE_GROUP_ADJ_PCT) as f64 / 100.0,
            mpath: self.mpath,
            format: self.format.unwrap_or_default(),
        }
    }
}

/// One hl-attribute request value: `y`/`n` map to configured thresholds,
/// anything else is a literal `0..100` percentage (§4.7).
#[derive(Debug, Clone, Copy)]
pub enum AttribFilterValue {
    Yes,
    No,
    Percent(i32),
}

impl AttribFilterValue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" => None,
            "y" => Some(Self::Yes),
            "n" => Some(Self::No),
            other => other.parse::<i32>().ok().map(Self::Percent),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttrmixOptions {
    pub min_duration: i64,
    pub max_duration: i64,
    pub min_bpm: i32,
    pub max_bpm: i32,
    pub attribs: Vec<(String, AttribFilterValue)>,
    pub genres: Option<Vec<String>>,
    pub filter_xmas: bool,
    pub no_repeat_artist: i64,
    pub no_repeat_album: i64,
    pub count: usize,
    pub add_file_protocol: bool,
    pub mpath: Option<String>,
    pub format: String,
}

/// The hl-attribute names (`danceable`, `aggressive`, ...) are flattened
/// into the catch-all map since they're request keys, not fixed struct
/// fields; `normalize()` picks the eleven it recognizes out of it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttrmixOptions {
    #[serde(default)]
    pub minduration: Option<i64>,
    #[serde(default)]
    pub maxduration: Option<i64>,
    #[serde(default)]
    pub minbpm: Option<i32>,
    #[serde(default)]
    pub maxbpm: Option<i32>,
    #[serde(default, rename = "genre")]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub filterxmas: Option<i32>,
    #[serde(default)]
    pub norepart: Option<i64>,
    #[serde(default)]
    pub norepalb: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub addfp: Option<i32>,
    #[serde(default)]
    pub mpath: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(flatten)]
    pub attribs: std::collections::HashMap<String, String>,
}

impl RawAttrmixOptions {
    pub fn normalize(self) -> AttrmixOptions {
        let attribs = crate::catalog::HL_ATTRIB_NAMES
            .iter()
            .filter_map(|name| {
                self.attribs
                    .get(*name)
                    .and_then(|raw| AttribFilterValue::parse(raw))
                    .map(|v| (name.to_string(), v))
            })
            .collect();

        let mut no_repeat_artist = self.norepart.unwrap_or(0);
        if !(0..=200).contains(&no_repeat_artist) {
            no_repeat_artist = DEFAULT_NUM_PREV_TRACKS_FILTER_ARTIST;
        }
        let mut no_repeat_album = self.norepalb.unwrap_or(0);
        if !(0..=200).contains(&no_repeat_album) {
            no_repeat_album = DEFAULT_NUM_PREV_TRACKS_FILTER_ALBUM;
        }

        AttrmixOptions {
            min_duration: self.minduration.unwrap_or(0),
            max_duration: self.maxduration.unwrap_or(0),
            min_bpm: self.minbpm.unwrap_or(0),
            max_bpm: self.maxbpm.unwrap_or(0),
            attribs,
            genres: self.genres,
            filter_xmas: exclude_christmas(self.filterxmas),
            no_repeat_artist,
            no_repeat_album,
            count: self.count.unwrap_or(DEFAULT_ATTRMIX_COUNT as i64).max(1) as usize,
            add_file_protocol: self.addfp.unwrap_or(0) == 1,
            mpath: self.mpath,
            format: self.format.unwrap_or_default(),
        }
    }
}
