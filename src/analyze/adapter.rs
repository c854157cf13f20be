//! Uniform child-process adapter over the external feature extractors
//! (§4.2). The extractors themselves are out of scope (§1) — this module
//! defines only the process-isolation primitive and the `Analyzer` seam
//! the three concrete wrappers implement.

use crate::catalog::HighLevelAttribs;
use crate::error::AnalyzerError;
use std::path::Path;
use std::process::{Command, Stdio};

/// Parsed analyzer output, before it is folded into a `FeatureUpdate`.
#[derive(Debug, Clone)]
pub enum FeatureOutput {
    Timbre(Vec<u8>),
    Attribute {
        bpm: Option<i32>,
        key: Option<String>,
        hl: Option<HighLevelAttribs>,
    },
    Descriptor(Vec<f32>),
}

/// One analyzer adapter.
pub trait Analyzer: Send + Sync {
    /// The letter used in `--force <letters>` and the per-file decision
    /// matrix (§4.3): `m` timbre, `e` attribute, `b` descriptor.
    fn kind_letter(&self) -> char;
    fn analyze(&self, path: &Path) -> Result<FeatureOutput, AnalyzerError>;
}

/// Run `program` with `args` in a fresh child process, capture its stdout as
/// the single result message, and unconditionally reap the child before
/// returning.
///
/// This is the "one extraction per child, kill on return" contract (§4.2/§9):
/// native extractors are known to leak or corrupt process state between
/// calls, so isolation is load-bearing, not an optimization.
pub fn spawn_once(program: &str, args: &[&str]) -> Result<Vec<u8>, AnalyzerError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(AnalyzerError::Spawn)?;

    let output = child.wait_with_output().map_err(AnalyzerError::Spawn)?;

    if !output.status.success() {
        return Err(AnalyzerError::ChildFailed(
            output.status.code().unwrap_or(-1),
        ));
    }
    if output.stdout.is_empty() {
        return Err(AnalyzerError::NoOutput);
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_once_missing_program() {
        let err = spawn_once("musicsim-definitely-not-a-real-binary", &[]).unwrap_err();
        assert!(matches!(err, AnalyzerError::Spawn(_)));
    }

    #[test]
    fn test_spawn_once_nonzero_exit() {
        let err = spawn_once("false", &[]).unwrap_err();
        assert!(matches!(err, AnalyzerError::ChildFailed(_)));
    }
}
