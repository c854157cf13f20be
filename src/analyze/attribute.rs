//! High/low-level attribute analyzer adapter: BPM, key, and (when enabled)
//! the 11 mood/character outputs, with a JSON result cache under the
//! configured cache root (§4.2).

use super::adapter::{spawn_once, Analyzer, FeatureOutput};
use crate::catalog::HighLevelAttribs;
use crate::error::AnalyzerError;
use crate::utils::hashing::path_cache_key;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub struct AttributeAnalyzer {
    pub program: String,
    pub highlevel: bool,
    pub cache_dir: Option<PathBuf>,
    pub gzip_cache: bool,
}

impl Analyzer for AttributeAnalyzer {
    fn kind_letter(&self) -> char {
        'e'
    }

    fn analyze(&self, path: &Path) -> Result<FeatureOutput, AnalyzerError> {
        let cache_path = self.cache_path(path);

        let value = match &cache_path {
            Some(cp) => match self.read_cache(cp) {
                Some(cached) => cached,
                None => {
                    let value = self.run_extractor(path)?;
                    self.write_cache(cp, &value);
                    value
                }
            },
            None => self.run_extractor(path)?,
        };

        Ok(FeatureOutput::Attribute {
            bpm: extract_bpm(&value),
            key: extract_key(&value).map(|(key, _scale)| key),
            hl: if self.highlevel {
                extract_highlevel(&value)
            } else {
                None
            },
        })
    }
}

impl AttributeAnalyzer {
    fn run_extractor(&self, path: &Path) -> Result<Value, AnalyzerError> {
        let path_str = path.to_string_lossy();
        let bytes = spawn_once(&self.program, &[&path_str])?;
        serde_json::from_slice(&bytes).map_err(|e| AnalyzerError::BadOutput(e.to_string()))
    }

    fn cache_path(&self, path: &Path) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let key = path_cache_key(&path.to_string_lossy());
        let ext = if self.gzip_cache { "json.gz" } else { "json" };
        Some(dir.join(format!("{key}.{ext}")))
    }

    fn read_cache(&self, cache_path: &Path) -> Option<Value> {
        let raw = std::fs::read(cache_path).ok()?;
        let text = if self.gzip_cache {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = String::new();
            decoder.read_to_string(&mut out).ok()?;
            out
        } else {
            String::from_utf8(raw).ok()?
        };
        serde_json::from_str(&text).ok()
    }

    fn write_cache(&self, cache_path: &Path, value: &Value) {
        let Ok(text) = serde_json::to_string(value) else {
            return;
        };
        if let Some(parent) = cache_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if self.gzip_cache {
            if let Ok(file) = std::fs::File::create(cache_path) {
                let mut encoder = GzEncoder::new(file, Compression::default());
                let _ = encoder.write_all(text.as_bytes());
                let _ = encoder.finish();
            }
        } else {
            let _ = std::fs::write(cache_path, text);
        }
    }
}

/// BPM lives at `rhythm.bpm` across every observed schema version.
fn extract_bpm(value: &Value) -> Option<i32> {
    value
        .pointer("/rhythm/bpm")
        .and_then(Value::as_f64)
        .map(|v| v.round() as i32)
}

/// Key extraction tolerates schema drift (§4.2): prefer a canonical
/// `key_key`/`key_scale` pair; otherwise fall back to whichever of the
/// parallel key estimators reports the highest `strength`. New schema
/// versions add another arm here rather than branching on a single dict.
fn extract_key(value: &Value) -> Option<(String, String)> {
    let tonal = value.get("tonal")?;

    if let (Some(key), Some(scale)) = (
        tonal.get("key_key").and_then(Value::as_str),
        tonal.get("key_scale").and_then(Value::as_str),
    ) {
        return Some((format!("{key}{}", scale_suffix(scale)), scale.to_string()));
    }

    let estimators = ["key_temperley", "key_krumhansl", "key_edma"];
    let mut best: Option<(f64, String, String)> = None;
    for name in estimators {
        let Some(node) = tonal.get(name) else {
            continue;
        };
        let (Some(key), Some(scale), Some(strength)) = (
            node.get("key").and_then(Value::as_str),
            node.get("scale").and_then(Value::as_str),
            node.get("strength").and_then(Value::as_f64),
        ) else {
            continue;
        };
        if best.as_ref().map(|(s, ..)| strength > *s).unwrap_or(true) {
            best = Some((strength, key.to_string(), scale.to_string()));
        }
    }
    best.map(|(_, key, scale)| (format!("{key}{}", scale_suffix(&scale)), scale))
}

fn scale_suffix(scale: &str) -> &'static str {
    if scale.eq_ignore_ascii_case("minor") {
        "m"
    } else {
        "M"
    }
}

fn extract_highlevel(value: &Value) -> Option<HighLevelAttribs> {
    let hl = value.get("highlevel")?;
    let get = |name: &str| -> f64 {
        hl.pointer(&format!("/{name}/all/{name}"))
            .and_then(Value::as_f64)
            .or_else(|| {
                hl.pointer(&format!("/{name}/probability"))
                    .and_then(Value::as_f64)
            })
            .unwrap_or(0.0)
    };
    Some(HighLevelAttribs {
        danceable: get("danceability"),
        aggressive: get("mood_aggressive"),
        electronic: get("mood_electronic"),
        acoustic: get("mood_acoustic"),
        happy: get("mood_happy"),
        party: get("mood_party"),
        relaxed: get("mood_relaxed"),
        sad: get("mood_sad"),
        dark: get("timbre"),
        tonal: get("tonal_atonal"),
        voice: get("voice_instrumental"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bpm() {
        let value = serde_json::json!({"rhythm": {"bpm": 127.6}});
        assert_eq!(extract_bpm(&value), Some(128));
    }

    #[test]
    fn test_extract_key_canonical() {
        let value = serde_json::json!({"tonal": {"key_key": "A", "key_scale": "minor"}});
        assert_eq!(extract_key(&value), Some(("Am".to_string(), "minor".to_string())));
    }

    #[test]
    fn test_extract_key_fallback_to_strongest_estimator() {
        let value = serde_json::json!({
            "tonal": {
                "key_temperley": {"key": "C", "scale": "major", "strength": 0.6},
                "key_krumhansl": {"key": "F#", "scale": "major", "strength": 0.9},
            }
        });
        assert_eq!(extract_key(&value), Some(("F#M".to_string(), "major".to_string())));
    }

    #[test]
    fn test_cache_round_trip_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = AttributeAnalyzer {
            program: "unused".to_string(),
            highlevel: false,
            cache_dir: Some(dir.path().to_path_buf()),
            gzip_cache: true,
        };
        let cache_path = analyzer.cache_path(Path::new("/music/a.flac")).unwrap();
        let value = serde_json::json!({"rhythm": {"bpm": 120.0}});
        analyzer.write_cache(&cache_path, &value);
        let read_back = analyzer.read_cache(&cache_path).unwrap();
        assert_eq!(extract_bpm(&read_back), Some(120));
    }
}
