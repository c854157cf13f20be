//! Analysis pipeline (§4.3): discovers files, decides per-file which
//! analyzers must run, schedules extraction over a worker pool with
//! per-file child-process isolation, commits results in batches, and
//! supports cooperative cancellation.

use crate::analyze::adapter::{Analyzer, FeatureOutput};
use crate::analyze::cue::{parse_virtual_path, CueEntry, CueSpan, CueSplitter};
use crate::analyze::tags::{TagReader, TrackTags};
use crate::catalog::{Catalog, FeatureUpdate, Tags};
use crate::error::FileOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "wma", "opus", "aiff", "alac",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub threads: usize,
    /// Analyzer letters (`m`/`e`/`b`) to force-rerun even if already cached.
    pub force: HashSet<char>,
    pub min_duration: i64,
    pub max_duration: i64,
    pub exclude_genres: HashSet<String>,
    pub dry_run: bool,
    pub max_tracks: Option<usize>,
    pub commit_interval: usize,
    pub show_progress: bool,
    /// `--meta-only` (§6): read and upsert tags only, skipping every
    /// analyzer even if one is configured.
    pub meta_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub ok: usize,
    pub filtered: usize,
    pub error: usize,
    /// Whether any row was added, so the caller knows whether to rebuild the
    /// timbre jukebox (§4.3's "post-analysis" step).
    pub changed: bool,
}

/// Tracks which analyzer kinds already have data for a path, queried from
/// the catalog once before the parallel pass begins.
#[derive(Default, Clone, Copy)]
struct ExistingFeatures {
    timbre: bool,
    descriptor: bool,
    attrib: bool,
}

struct FileResult {
    catalog_path: String,
    tags: Option<TrackTags>,
    features: FeatureUpdate,
    outcome: FileOutcome,
}

pub struct Pipeline {
    catalog: Catalog,
    tag_reader: Arc<dyn TagReader>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    cue_splitter: Arc<dyn CueSplitter>,
    should_stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        catalog: Catalog,
        tag_reader: Arc<dyn TagReader>,
        analyzers: Vec<Arc<dyn Analyzer>>,
        cue_splitter: Arc<dyn CueSplitter>,
    ) -> Self {
        Self {
            catalog,
            tag_reader,
            analyzers,
            cue_splitter,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to flip on SIGINT (§4.3/§5).
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.should_stop)
    }

    pub async fn run(&self, library_root: &Path, cfg: &PipelineConfig) -> anyhow::Result<AnalysisSummary> {
        let scratch_dir = std::env::temp_dir().join(format!("musicsim-cue-{}", std::process::id()));
        let mut discovered = discover_files(library_root, &scratch_dir, cfg.max_tracks)?;
        if cfg.max_tracks.is_none() {
            discovered.sort_by(|a, b| a.catalog_path.cmp(&b.catalog_path));
        }

        let total = discovered.len();
        if total == 0 {
            tracing::info!("no audio files found under {}", library_root.display());
            return Ok(AnalysisSummary::default());
        }

        let existing = self.load_existing(&discovered).await?;

        let progress = if cfg.show_progress {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                    .unwrap()
                    .progress_chars("##-"),
            );
            Some(Arc::new(pb))
        } else {
            None
        };

        let processed = Arc::new(AtomicUsize::new(0));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.threads.max(1))
            .build()?;

        let should_stop = Arc::clone(&self.should_stop);
        let tag_reader = Arc::clone(&self.tag_reader);
        let analyzers = self.analyzers.clone();
        let cue_splitter = Arc::clone(&self.cue_splitter);

        let results: Vec<FileResult> = pool.install(|| {
            discovered
                .par_iter()
                .filter_map(|item| {
                    if should_stop.load(Ordering::Relaxed) {
                        return None;
                    }
                    let result = process_file(
                        item,
                        tag_reader.as_ref(),
                        &analyzers,
                        cue_splitter.as_ref(),
                        &scratch_dir,
                        cfg,
                        existing.get(&item.catalog_path).copied().unwrap_or_default(),
                    );
                    let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(pb) = &progress {
                        pb.set_position(count as u64);
                    }
                    Some(result)
                })
                .collect()
        });

        let _ = std::fs::remove_dir_all(&scratch_dir);

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        let mut summary = AnalysisSummary::default();
        if !cfg.dry_run {
            let mut writer = self.catalog.writer(cfg.commit_interval);
            for result in &results {
                match &result.outcome {
                    FileOutcome::Ok => {
                        if let Some(tags) = &result.tags {
                            let tags = Tags {
                                title: tags.title.clone(),
                                artist: tags.artist.clone(),
                                album: tags.album.clone(),
                                albumartist: tags.albumartist.clone(),
                                genres: Some(tags.genres.clone()),
                                duration: tags.duration,
                            };
                            writer.upsert_tags(&result.catalog_path, &tags).await?;
                        }
                        writer.upsert_features(&result.catalog_path, &result.features).await?;
                        summary.changed = true;
                        summary.ok += 1;
                    }
                    FileOutcome::Filtered(_) => summary.filtered += 1,
                    FileOutcome::Error(_) => summary.error += 1,
                }
            }
            writer.finish().await?;
        } else {
            for result in &results {
                match &result.outcome {
                    FileOutcome::Ok => summary.ok += 1,
                    FileOutcome::Filtered(_) => summary.filtered += 1,
                    FileOutcome::Error(_) => summary.error += 1,
                }
            }
        }

        tracing::info!(
            ok = summary.ok,
            filtered = summary.filtered,
            error = summary.error,
            "analysis pass complete"
        );

        Ok(summary)
    }

    async fn load_existing(&self, discovered: &[DiscoveredFile]) -> anyhow::Result<HashMap<String, ExistingFeatures>> {
        let rows = self.catalog.scan_ordered().await?;
        let by_path: HashMap<&str, _> = rows.iter().map(|r| (r.path.as_str(), r)).collect();
        let mut out = HashMap::with_capacity(discovered.len());
        for item in discovered {
            if let Some(row) = by_path.get(item.catalog_path.as_str()) {
                out.insert(
                    item.catalog_path.clone(),
                    ExistingFeatures {
                        timbre: row.has_timbre(),
                        descriptor: row.has_descriptor(),
                        attrib: row.has_attrib(),
                    },
                );
            }
        }
        Ok(out)
    }
}

struct DiscoveredFile {
    /// The path actually handed to `TagReader`/analyzers on disk.
    physical_path: PathBuf,
    /// The key stored in the catalog (may be a `.CUE_TRACK.` virtual path).
    catalog_path: String,
    cue: Option<CueEntry>,
}

/// Sorted lexicographic directory walk (§4.3), expanding any `.cue` sheet
/// found alongside its audio file into one virtual entry per track.
fn discover_files(
    root: &Path,
    scratch_dir: &Path,
    max_tracks: Option<usize>,
) -> anyhow::Result<Vec<DiscoveredFile>> {
    let mut audio_files = Vec::new();
    let mut cue_files = Vec::new();

    let mut entries: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    entries.sort();

    for path in entries {
        match path.extension().and_then(|e| e.to_str()).map(|s| s.to_lowercase()) {
            Some(ext) if ext == "cue" => cue_files.push(path),
            Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => audio_files.push(path),
            _ => {}
        }
    }

    let cue_sources: HashSet<PathBuf> = cue_files
        .iter()
        .filter_map(|cue_path| crate::analyze::cuesheet::parse_cue_sheet(cue_path).ok())
        .flat_map(|entries| entries.into_iter().map(|e| e.source))
        .collect();

    let mut discovered = Vec::new();
    for cue_path in &cue_files {
        if let Ok(entries) = crate::analyze::cuesheet::parse_cue_sheet(cue_path) {
            for entry in entries {
                discovered.push(DiscoveredFile {
                    physical_path: entry.source.clone(),
                    catalog_path: entry.virtual_path(),
                    cue: Some(entry),
                });
            }
        }
    }
    for path in audio_files {
        if cue_sources.contains(&path) {
            continue;
        }
        discovered.push(DiscoveredFile {
            catalog_path: path.to_string_lossy().replace('\\', "/"),
            physical_path: path,
            cue: None,
        });
    }

    discovered.sort_by(|a, b| a.catalog_path.cmp(&b.catalog_path));
    if let Some(max) = max_tracks {
        discovered.truncate(max);
    }
    let _ = scratch_dir;
    Ok(discovered)
}

/// Every catalog path a fresh walk of `root` would discover, independent of
/// any `max_tracks` cap applied to the analysis pass itself. Used to build
/// the `present_paths` set for `Catalog::forget_missing` (§4.3), since a
/// capped or subtree-scoped `--analyse` run must not cause an unrelated
/// sibling subtree to be swept away.
pub fn discover_catalog_paths(root: &Path) -> anyhow::Result<HashSet<String>> {
    let scratch_dir = std::env::temp_dir();
    Ok(discover_files(root, &scratch_dir, None)?
        .into_iter()
        .map(|f| f.catalog_path)
        .collect())
}

fn process_file(
    item: &DiscoveredFile,
    tag_reader: &dyn TagReader,
    analyzers: &[Arc<dyn Analyzer>],
    cue_splitter: &dyn CueSplitter,
    scratch_dir: &Path,
    cfg: &PipelineConfig,
    existing: ExistingFeatures,
) -> FileResult {
    let physical_path = match &item.cue {
        None => item.physical_path.clone(),
        Some(entry) => match cue_splitter.split(entry, scratch_dir) {
            Ok(p) => p,
            Err(e) => {
                return FileResult {
                    catalog_path: item.catalog_path.clone(),
                    tags: None,
                    features: FeatureUpdate::default(),
                    outcome: FileOutcome::Error(format!("cue split failed: {e}")),
                }
            }
        },
    };

    let tags = match tag_reader.read(&physical_path) {
        Some(t) if t.title.is_some() => t,
        _ => {
            return FileResult {
                catalog_path: item.catalog_path.clone(),
                tags: None,
                features: FeatureUpdate::default(),
                outcome: FileOutcome::Error("Tags".to_string()),
            }
        }
    };

    if let Some(duration) = tags.duration {
        if duration < cfg.min_duration || duration > cfg.max_duration {
            return FileResult {
                catalog_path: item.catalog_path.clone(),
                tags: Some(tags),
                features: FeatureUpdate::default(),
                outcome: FileOutcome::Filtered("Duration".to_string()),
            };
        }
    }

    if !cfg.exclude_genres.is_empty() && tags.genres.iter().any(|g| cfg.exclude_genres.contains(g)) {
        return FileResult {
            catalog_path: item.catalog_path.clone(),
            tags: Some(tags),
            features: FeatureUpdate::default(),
            outcome: FileOutcome::Filtered("Genre".to_string()),
        };
    }

    if cfg.meta_only {
        return FileResult {
            catalog_path: item.catalog_path.clone(),
            tags: Some(tags),
            features: FeatureUpdate::default(),
            outcome: FileOutcome::Ok,
        };
    }

    if analyzers.is_empty() {
        return FileResult {
            catalog_path: item.catalog_path.clone(),
            tags: Some(tags),
            features: FeatureUpdate::default(),
            outcome: FileOutcome::Error("Config".to_string()),
        };
    }

    let mut features = FeatureUpdate::default();
    let mut ran_any = false;
    let mut last_err = None;

    for analyzer in analyzers {
        let letter = analyzer.kind_letter();
        let already_has = match letter {
            'm' => existing.timbre,
            'b' => existing.descriptor,
            'e' => existing.attrib,
            _ => false,
        };
        if already_has && !cfg.force.contains(&letter) {
            continue;
        }

        match analyzer.analyze(&physical_path) {
            Ok(FeatureOutput::Timbre(blob)) => {
                features.timbre = Some(blob);
                ran_any = true;
            }
            Ok(FeatureOutput::Descriptor(vec)) => {
                features.descriptor = Some(vec);
                ran_any = true;
            }
            Ok(FeatureOutput::Attribute { bpm, key, hl }) => {
                features.bpm = bpm;
                features.key = key;
                features.hl = hl;
                ran_any = true;
            }
            Err(e) => {
                tracing::debug!("analyzer '{}' failed for {}: {}", letter, physical_path.display(), e);
                last_err = Some(e);
            }
        }
    }

    let outcome = if ran_any || existing.timbre || existing.descriptor || existing.attrib {
        FileOutcome::Ok
    } else if let Some(e) = last_err {
        FileOutcome::Error(e.to_string())
    } else {
        FileOutcome::Ok
    };

    FileResult {
        catalog_path: item.catalog_path.clone(),
        tags: Some(tags),
        features,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_virtual_path_used_for_catalog_key() {
        let entry = CueEntry {
            source: PathBuf::from("/music/album.flac"),
            span: CueSpan {
                start_secs: 10.0,
                end_secs: 200.0,
            },
        };
        let catalog_path = entry.virtual_path();
        let (source, span) = parse_virtual_path(&catalog_path).unwrap();
        assert_eq!(source, entry.source);
        assert_eq!(span, entry.span);
    }
}
