//! Timbre similarity index (§4.4): wraps the native timbre-fingerprint
//! library's own "jukebox" object (out of scope, §1). Like the per-file
//! analyzer adapters, every jukebox operation is isolated in a child
//! process; the jukebox itself persists to a single binary file the
//! library defines.

use crate::error::IndexError;
use crate::index::neighbor::Neighbor;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

pub struct TimbreIndex {
    program: String,
    jukebox_path: std::path::PathBuf,
    /// Index position -> catalog path/id, in the order tracks were added.
    paths: Vec<String>,
    row_ids: Vec<i64>,
}

impl TimbreIndex {
    /// Build a fresh jukebox from every row's timbre blob, writing style
    /// subset positions so the library can derive its internal style
    /// centroid from a representative sample (§4.4).
    pub fn build(
        program: &str,
        jukebox_path: &Path,
        rows: &[(i64, String, Vec<u8>)],
        style_subset_positions: &[usize],
    ) -> Result<Self, IndexError> {
        if rows.is_empty() {
            return Err(IndexError::Empty);
        }

        let input_path = scratch_input_path(jukebox_path, "build");
        write_build_input(&input_path, rows, style_subset_positions)
            .map_err(|e| IndexError::Jukebox(e.to_string()))?;

        run_jukebox_command(
            program,
            &["build", &input_path.to_string_lossy(), &jukebox_path.to_string_lossy()],
        )?;
        let _ = std::fs::remove_file(&input_path);

        Ok(Self {
            program: program.to_string(),
            jukebox_path: jukebox_path.to_path_buf(),
            paths: rows.iter().map(|(_, path, _)| path.clone()).collect(),
            row_ids: rows.iter().map(|(id, _, _)| *id).collect(),
        })
    }

    /// Load a previously-built jukebox, rejecting it if the track count no
    /// longer matches the catalog (§4.4: a mismatch forces a rebuild).
    pub fn load(
        program: &str,
        jukebox_path: &Path,
        rows: &[(i64, String)],
    ) -> Option<Self> {
        if !jukebox_path.exists() {
            return None;
        }
        let count = run_jukebox_command(
            program,
            &["count", &jukebox_path.to_string_lossy()],
        )
        .ok()
        .and_then(|out| String::from_utf8_lossy(&out).trim().parse::<usize>().ok())?;

        if count != rows.len() {
            return None;
        }

        Some(Self {
            program: program.to_string(),
            jukebox_path: jukebox_path.to_path_buf(),
            paths: rows.iter().map(|(_, path)| path.clone()).collect(),
            row_ids: rows.iter().map(|(id, _)| *id).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn pos_for_path(&self, path: &str) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    /// Native similarity query: not a k-d tree, normalized by the library's
    /// own convention. May contain NaN (skipped, including at position 0)
    /// and may repeat a row; the scan stops at the first repeat (§4.4/§9).
    pub fn most_similar(&self, pos: usize, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        let raw = run_jukebox_command(
            &self.program,
            &[
                "similar",
                &self.jukebox_path.to_string_lossy(),
                &pos.to_string(),
                &k.to_string(),
            ],
        )?;
        let text = String::from_utf8_lossy(&raw);

        let mut out = Vec::with_capacity(k);
        let mut seen = std::collections::HashSet::new();
        for line in text.lines() {
            let Some((pos_str, sim_str)) = line.split_once(':') else {
                continue;
            };
            let Ok(neighbor_pos) = pos_str.parse::<usize>() else {
                continue;
            };
            let Ok(sim) = sim_str.parse::<f64>() else {
                continue;
            };
            if sim.is_nan() {
                continue;
            }
            if !seen.insert(neighbor_pos) {
                break;
            }
            if neighbor_pos >= self.paths.len() {
                continue;
            }
            out.push(Neighbor {
                row_id: self.row_ids[neighbor_pos],
                path: self.paths[neighbor_pos].clone(),
                sim: sim.clamp(0.0, 1.0),
            });
            if out.len() >= k {
                break;
            }
        }
        Ok(out)
    }
}

fn scratch_input_path(jukebox_path: &Path, suffix: &str) -> std::path::PathBuf {
    jukebox_path.with_extension(format!("{suffix}.in"))
}

fn write_build_input(
    path: &Path,
    rows: &[(i64, String, Vec<u8>)],
    style_subset_positions: &[usize],
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", style_subset_positions.len())?;
    for pos in style_subset_positions {
        writeln!(file, "{pos}")?;
    }
    writeln!(file, "{}", rows.len())?;
    for (_, _, blob) in rows {
        writeln!(file, "{}", blob.len())?;
        file.write_all(blob)?;
    }
    Ok(())
}

fn run_jukebox_command(program: &str, args: &[&str]) -> Result<Vec<u8>, IndexError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| IndexError::Jukebox(e.to_string()))?;

    let output = child
        .wait_with_output()
        .map_err(|e| IndexError::Jukebox(e.to_string()))?;

    if !output.status.success() {
        return Err(IndexError::Jukebox(format!(
            "jukebox command exited with status {}",
            output.status
        )));
    }
    Ok(output.stdout)
}
