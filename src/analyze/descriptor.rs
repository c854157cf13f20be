//! Multi-dimensional descriptor analyzer adapter (§4.2): a fixed-length
//! float vector, first dimension tempo-like, used directly as a similarity
//! index key.

use super::adapter::{spawn_once, Analyzer, FeatureOutput};
use crate::error::AnalyzerError;
use std::path::Path;

pub const DESCRIPTOR_DIMS: usize = 20;

pub struct DescriptorAnalyzer {
    pub program: String,
}

impl Analyzer for DescriptorAnalyzer {
    fn kind_letter(&self) -> char {
        'b'
    }

    fn analyze(&self, path: &Path) -> Result<FeatureOutput, AnalyzerError> {
        let path_str = path.to_string_lossy();
        let bytes = spawn_once(&self.program, &[&path_str])?;
        let text =
            std::str::from_utf8(&bytes).map_err(|e| AnalyzerError::BadOutput(e.to_string()))?;

        let values: Vec<f32> = text
            .split_whitespace()
            .map(|tok| tok.parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|e| AnalyzerError::BadOutput(e.to_string()))?;

        if values.len() != DESCRIPTOR_DIMS {
            return Err(AnalyzerError::BadOutput(format!(
                "expected {DESCRIPTOR_DIMS} descriptor dims, got {}",
                values.len()
            )));
        }

        Ok(FeatureOutput::Descriptor(values))
    }
}
