//! Library/server configuration, loaded once from the JSON config file
//! named by `--config` (§6).
//!
//! Unlike a typical settings file that materializes a default on first run,
//! this one is a required input: `paths.db` (and `paths.local` when
//! analyzing) must already exist on disk, matching the source system's
//! `read_config` behavior of exiting with a fatal error rather than
//! silently inventing a library root.

use crate::error::ConfigError;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static SETTINGS: OnceCell<Arc<RwLock<Settings>>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimAlgo {
    Musly,
    Essentia,
    Bliss,
    Mixed,
    Simplemixed,
}

impl Default for SimAlgo {
    fn default() -> Self {
        SimAlgo::Musly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleTracksMethod {
    Albums,
    Genres,
}

impl Default for StyleTracksMethod {
    fn default() -> Self {
        StyleTracksMethod::Genres
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsCfg {
    #[serde(default)]
    pub db: PathBuf,
    pub local: Option<PathBuf>,
    pub lms: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub tmp: Option<PathBuf>,
    pub lmsdb: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuslyCfg {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub lib: Option<String>,
    #[serde(default = "default_extractlen")]
    pub extractlen: f32,
    #[serde(default = "default_extractstart")]
    pub extractstart: f32,
    #[serde(default = "default_styletracks")]
    pub styletracks: usize,
    #[serde(default)]
    pub styletracksmethod: StyleTracksMethod,
}

impl Default for MuslyCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            lib: None,
            extractlen: default_extractlen(),
            extractstart: default_extractstart(),
            styletracks: default_styletracks(),
            styletracksmethod: StyleTracksMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssentiaCfg {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub extractor: Option<String>,
    #[serde(default = "default_bpm_tolerance")]
    pub bpm: i32,
    #[serde(default = "default_true")]
    pub filterkey: bool,
    #[serde(default)]
    pub highlevel: bool,
    #[serde(default = "default_true")]
    pub filterattrib: bool,
    #[serde(default = "default_filterattrib_lim")]
    pub filterattrib_lim: f64,
    #[serde(default = "default_filterattrib_cand")]
    pub filterattrib_cand: f64,
    #[serde(default = "default_filterattrib_count")]
    pub filterattrib_count: usize,
    #[serde(default = "default_attrmix_yes")]
    pub attrmix_yes: f64,
    #[serde(default = "default_attrmix_no")]
    pub attrmix_no: f64,
}

impl Default for EssentiaCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            extractor: None,
            bpm: default_bpm_tolerance(),
            filterkey: true,
            highlevel: false,
            filterattrib: true,
            filterattrib_lim: default_filterattrib_lim(),
            filterattrib_cand: default_filterattrib_cand(),
            filterattrib_count: default_filterattrib_count(),
            attrmix_yes: default_attrmix_yes(),
            attrmix_no: default_attrmix_no(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlissCfg {
    #[serde(default)]
    pub enabled: bool,
    pub analyser: Option<String>,
}

impl Default for BlissCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            analyser: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeCfg {
    /// Parenthetical/bracketed suffixes stripped from album titles before
    /// comparison, e.g. "(Remastered 2009)".
    #[serde(default)]
    pub album: Vec<String>,
    /// Same, for track titles.
    #[serde(default)]
    pub title: Vec<String>,
    /// Tokens ("feat.", "ft.", "with", ...) that mark a featuring-artist
    /// boundary when splitting a credit string down to its primary artist.
    #[serde(default)]
    pub artist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub paths: PathsCfg,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub simalgo: SimAlgo,
    #[serde(default)]
    pub musly: MuslyCfg,
    #[serde(default)]
    pub essentia: EssentiaCfg,
    #[serde(default)]
    pub bliss: BlissCfg,
    /// Integer percentage weights per analyzer id (`musly`, `essentia`,
    /// `bliss`), used by `FusionPlan` when more than one is enabled.
    #[serde(default)]
    pub mixed: std::collections::HashMap<String, u32>,
    #[serde(default)]
    pub genres: Vec<HashSet<String>>,
    #[serde(skip)]
    pub all_genres: HashSet<String>,
    #[serde(default)]
    pub excludegenres: Option<HashSet<String>>,
    #[serde(default)]
    pub ignoregenre: HashSet<String>,
    #[serde(default = "default_minduration")]
    pub minduration: i64,
    #[serde(default = "default_maxduration")]
    pub maxduration: i64,
    #[serde(default)]
    pub normalize: NormalizeCfg,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    11000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_extractlen() -> f32 {
    120.0
}
fn default_extractstart() -> f32 {
    -210.0
}
fn default_styletracks() -> usize {
    1000
}
fn default_bpm_tolerance() -> i32 {
    20
}
fn default_filterattrib_lim() -> f64 {
    0.2
}
fn default_filterattrib_cand() -> f64 {
    0.4
}
fn default_filterattrib_count() -> usize {
    4
}
fn default_attrmix_yes() -> f64 {
    0.6
}
fn default_attrmix_no() -> f64 {
    0.4
}
fn default_minduration() -> i64 {
    30
}
fn default_maxduration() -> i64 {
    30 * 60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load and validate a config file, mirroring the source system's
    /// `read_config`: required keys are checked, paths are normalized and
    /// existence-checked, and per-analyzer defaults are filled in.
    ///
    /// The file is layered under a `MUSICSIM__`-prefixed, double-underscore
    /// nested environment override (§6 ambient additions) — e.g.
    /// `MUSICSIM__PORT=11001` or `MUSICSIM__MUSLY__ENABLED=false` — so an
    /// operator can override a single key without editing the file.
    pub fn load(path: &Path, analyse: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let layered = config::Config::builder()
            .add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Json))
            .add_source(config::Environment::with_prefix("MUSICSIM").separator("__"))
            .build()
            .map_err(|source| ConfigError::Layered {
                path: path.to_path_buf(),
                source,
            })?;

        let mut settings: Settings = layered.try_deserialize().map_err(|source| ConfigError::Layered {
            path: path.to_path_buf(),
            source,
        })?;

        if settings.paths.db.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey("paths.db"));
        }
        if analyse && settings.paths.local.is_none() {
            return Err(ConfigError::MissingKey("paths.local"));
        }

        settings.paths.db = fix_path(&settings.paths.db);
        if let Some(local) = &settings.paths.local {
            settings.paths.local = Some(fix_path(local));
        }

        if analyse {
            if let Some(local) = &settings.paths.local {
                if !local.exists() {
                    return Err(ConfigError::PathNotFound(local.clone()));
                }
            }
        }

        settings.all_genres = settings.genres.iter().flatten().cloned().collect();

        settings.ignoregenre = settings
            .ignoregenre
            .into_iter()
            .map(|name| crate::utils::hashing::create_hash(&[&name], true))
            .collect();

        Ok(settings)
    }

    pub fn global() -> Arc<RwLock<Settings>> {
        SETTINGS
            .get_or_init(|| Arc::new(RwLock::new(Settings::default())))
            .clone()
    }

    /// Install a loaded settings value as the process-wide global. Called
    /// once at startup after `Settings::load` succeeds.
    pub fn install(settings: Settings) {
        let global = Self::global();
        *global.write() = settings;
    }

    /// Short machine string summarizing which analyzers are active, for
    /// `/api/features` (§4.7).
    pub fn features_string(&self) -> String {
        let mut parts = Vec::new();
        if self.musly.enabled {
            parts.push("musly");
        }
        if self.essentia.enabled {
            parts.push(if self.essentia.highlevel {
                "essentia+highlevel"
            } else {
                "essentia"
            });
        }
        if self.bliss.enabled {
            parts.push("bliss");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(",")
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paths: PathsCfg::default(),
            port: default_port(),
            host: default_host(),
            threads: default_threads(),
            simalgo: SimAlgo::default(),
            musly: MuslyCfg::default(),
            essentia: EssentiaCfg::default(),
            bliss: BlissCfg::default(),
            mixed: std::collections::HashMap::new(),
            genres: Vec::new(),
            all_genres: HashSet::new(),
            excludegenres: None,
            ignoregenre: HashSet::new(),
            minduration: default_minduration(),
            maxduration: default_maxduration(),
            normalize: NormalizeCfg::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Expand `$HOME`/`%USERPROFILE%`/`%TMP%`/leading `~` in a configured path.
fn fix_path(path: &Path) -> PathBuf {
    let mut s = path.to_string_lossy().to_string();

    for var in ["HOME", "USERPROFILE", "TMP"] {
        if let Ok(val) = std::env::var(var) {
            s = s.replace(&format!("${}", var), &val);
            s = s.replace(&format!("%{}%", var), &val);
        }
    }

    if cfg!(target_os = "linux") {
        if let Ok(home) = std::env::var("HOME") {
            if let Some(rest) = s.strip_prefix("~/") {
                s = format!("{}/{}", home, rest);
            } else if s == "~" {
                s = home;
            }
        }
    }

    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert_eq!(s.port, 11000);
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.minduration, 30);
        assert_eq!(s.maxduration, 1800);
        assert_eq!(s.essentia.filterattrib_count, 4);
    }

    #[test]
    fn test_load_requires_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("config.json");
        std::fs::write(&cfg_path, r#"{"paths":{}}"#).unwrap();
        let err = Settings::load(&cfg_path, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("paths.db")));
    }

    #[test]
    fn test_load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");
        let cfg_path = dir.path().join("config.json");
        std::fs::write(
            &cfg_path,
            format!(r#"{{"paths":{{"db":"{}"}}}}"#, db_path.display()),
        )
        .unwrap();
        let settings = Settings::load(&cfg_path, false).unwrap();
        assert_eq!(settings.paths.db, db_path);
        assert_eq!(settings.simalgo, SimAlgo::Musly);
    }

    #[test]
    fn test_features_string() {
        let mut s = Settings::default();
        s.bliss.enabled = false;
        assert_eq!(s.features_string(), "musly,essentia");
    }
}
