//! Timbre analyzer adapter: wraps the native timbre-fingerprint extractor
//! (out of scope, §1). Invoked as `<program> extract <path> <len> <start>`,
//! expected to write its opaque track blob to stdout.

use super::adapter::{spawn_once, Analyzer, FeatureOutput};
use crate::error::AnalyzerError;
use std::path::Path;

pub struct TimbreAnalyzer {
    pub program: String,
    pub extract_len: f32,
    pub extract_start: f32,
}

impl Analyzer for TimbreAnalyzer {
    fn kind_letter(&self) -> char {
        'm'
    }

    fn analyze(&self, path: &Path) -> Result<FeatureOutput, AnalyzerError> {
        let len = self.extract_len.to_string();
        let start = self.extract_start.to_string();
        let path_str = path.to_string_lossy();
        let bytes = spawn_once(&self.program, &["extract", &path_str, &len, &start])?;
        Ok(FeatureOutput::Timbre(bytes))
    }
}
