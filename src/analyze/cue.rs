//! Cue-sheet track splitting (§1, §4.3): a `CueSplitter` interface plus one
//! concrete implementation that shells out to `ffmpeg`, the same way the
//! source system's `split_cue_track` invokes `ffmpeg` via a subprocess
//! (`examples/original_source/lib/cue.py`).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Marker embedded in a virtual path produced for one cue-sheet entry:
/// `"<source>.CUE_TRACK.<start>-<end>.mp3"` (§4.3).
pub const CUE_TRACK_MARKER: &str = ".CUE_TRACK.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// One entry parsed out of a `.cue` sheet alongside its backing audio file.
#[derive(Debug, Clone)]
pub struct CueEntry {
    pub source: PathBuf,
    pub span: CueSpan,
}

impl CueEntry {
    /// The virtual path scheduled into the analysis pipeline in place of a
    /// normal file path.
    pub fn virtual_path(&self) -> String {
        format!(
            "{}{}{}-{}.mp3",
            self.source.display(),
            CUE_TRACK_MARKER,
            self.span.start_secs,
            self.span.end_secs
        )
    }
}

/// Parse a virtual cue path back into its source file and span, the inverse
/// of `CueEntry::virtual_path`.
pub fn parse_virtual_path(virtual_path: &str) -> Option<(PathBuf, CueSpan)> {
    let (source, rest) = virtual_path.split_once(CUE_TRACK_MARKER)?;
    let rest = rest.strip_suffix(".mp3")?;
    let (start, end) = rest.split_once('-')?;
    Some((
        PathBuf::from(source),
        CueSpan {
            start_secs: start.parse().ok()?,
            end_secs: end.parse().ok()?,
        },
    ))
}

pub trait CueSplitter: Send + Sync {
    /// Extract `entry`'s span from its source file into a scratch file under
    /// `scratch_dir`, returning the path to the extracted audio.
    fn split(&self, entry: &CueEntry, scratch_dir: &Path) -> std::io::Result<PathBuf>;
}

pub struct FfmpegCueSplitter;

impl CueSplitter for FfmpegCueSplitter {
    fn split(&self, entry: &CueEntry, scratch_dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(scratch_dir)?;
        let out_path = scratch_dir.join(format!(
            "{}-{}.mp3",
            entry.span.start_secs, entry.span.end_secs
        ));

        let duration = entry.span.end_secs - entry.span.start_secs;
        let status = Command::new("ffmpeg")
            .args([
                "-y",
                "-ss",
                &entry.span.start_secs.to_string(),
                "-t",
                &duration.to_string(),
                "-i",
            ])
            .arg(&entry.source)
            .args(["-vn", "-acodec", "libmp3lame"])
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if !status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("ffmpeg exited with status {status}"),
            ));
        }
        Ok(out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_path_round_trip() {
        let entry = CueEntry {
            source: PathBuf::from("/music/album.flac"),
            span: CueSpan {
                start_secs: 0.0,
                end_secs: 183.5,
            },
        };
        let virtual_path = entry.virtual_path();
        assert_eq!(virtual_path, "/music/album.flac.CUE_TRACK.0-183.5.mp3");

        let (source, span) = parse_virtual_path(&virtual_path).unwrap();
        assert_eq!(source, PathBuf::from("/music/album.flac"));
        assert_eq!(span, entry.span);
    }
}
