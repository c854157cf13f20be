//! Minimal `.cue` sheet parser: turns a cue file's `FILE`/`TRACK`/`INDEX 01`
//! directives into a list of `CueEntry` spans, each ending at the next
//! track's start (or the backing file's full duration for the last track).

use crate::analyze::cue::{CueEntry, CueSpan};
use lofty::{AudioFile, Probe};
use std::path::{Path, PathBuf};

pub fn parse_cue_sheet(cue_path: &Path) -> anyhow::Result<Vec<CueEntry>> {
    let content = std::fs::read_to_string(cue_path)?;
    let dir = cue_path.parent().unwrap_or_else(|| Path::new("."));

    let mut source: Option<PathBuf> = None;
    let mut starts: Vec<f64> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("FILE ") {
            source = Some(dir.join(extract_quoted(rest).unwrap_or(rest).trim()));
        } else if line.starts_with("INDEX 01 ") {
            if let Some(ts) = line.strip_prefix("INDEX 01 ") {
                if let Some(secs) = parse_cue_timestamp(ts.trim()) {
                    starts.push(secs);
                }
            }
        }
    }

    let Some(source) = source else {
        return Ok(Vec::new());
    };

    let total_duration = Probe::open(&source)
        .ok()
        .and_then(|p| p.read().ok())
        .map(|f| f.properties().duration().as_secs_f64())
        .unwrap_or(0.0);

    let mut entries = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(total_duration);
        if end <= start {
            continue;
        }
        entries.push(CueEntry {
            source: source.clone(),
            span: CueSpan {
                start_secs: start,
                end_secs: end,
            },
        });
    }
    Ok(entries)
}

fn extract_quoted(s: &str) -> Option<&str> {
    let start = s.find('"')? + 1;
    let end = start + s[start..].find('"')?;
    Some(&s[start..end])
}

/// Parse a cue `mm:ss:ff` timestamp (frames are 1/75s) into seconds.
fn parse_cue_timestamp(ts: &str) -> Option<f64> {
    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let minutes: f64 = parts[0].parse().ok()?;
    let seconds: f64 = parts[1].parse().ok()?;
    let frames: f64 = parts[2].parse().ok()?;
    Some(minutes * 60.0 + seconds + frames / 75.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cue_timestamp() {
        assert_eq!(parse_cue_timestamp("03:02:37"), Some(182.4933333333333));
    }

    #[test]
    fn test_extract_quoted() {
        assert_eq!(extract_quoted(r#""album.flac" WAVE"#), Some("album.flac"));
    }

    #[test]
    fn test_parse_cue_sheet_builds_spans_between_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let cue_path = dir.path().join("album.cue");
        std::fs::write(
            &cue_path,
            "FILE \"album.flac\" WAVE\n  TRACK 01 AUDIO\n    INDEX 01 00:00:00\n  TRACK 02 AUDIO\n    INDEX 01 03:00:00\n",
        )
        .unwrap();
        // no backing audio file present, so the final (unterminated) span's
        // end falls back to 0.0 and is dropped — only the first span survives.
        let entries = parse_cue_sheet(&cue_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].span.start_secs, 0.0);
        assert_eq!(entries[0].span.end_secs, 180.0);
    }
}
