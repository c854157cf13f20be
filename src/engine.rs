//! Process-wide read model (§9 "owned by a Server value at startup"):
//! catalog snapshot, per-analyzer similarity indexes, and the resolved
//! fusion plan, built once when the server starts and shared read-only
//! across every request thereafter.

use crate::analyze::descriptor::DESCRIPTOR_DIMS;
use crate::catalog::{Catalog, HL_ATTRIB_NAMES, TrackRecord};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::index::fusion::{combine_kdtree_mixed, combine_simple_mixed, AnalyzerId, FusionPlan};
use crate::index::jukebox::TimbreIndex;
use crate::index::kdtree::VectorIndex;
use crate::index::neighbor::Neighbor;
use crate::index::style::select_style_subset;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub const ATTRIB_DIMS: usize = 11;

static ENGINE: OnceCell<Arc<Engine>> = OnceCell::new();

/// Everything a request needs to answer a similarity query: the catalog
/// snapshot (for tag/metadata lookups) plus the indexes built from it.
pub struct Engine {
    catalog: Catalog,
    /// `id`-ascending, matching every index's position mapping (§3/§9).
    records: Vec<TrackRecord>,
    path_to_pos: HashMap<String, usize>,
    id_to_pos: HashMap<i64, usize>,
    musly: Option<TimbreIndex>,
    essentia: Option<VectorIndex<ATTRIB_DIMS>>,
    bliss: Option<VectorIndex<DESCRIPTOR_DIMS>>,
    fusion: FusionPlan,
}

fn hl_to_vector(attribs: &crate::catalog::HighLevelAttribs) -> [f64; ATTRIB_DIMS] {
    let mut out = [0.0; ATTRIB_DIMS];
    for (i, name) in HL_ATTRIB_NAMES.iter().enumerate() {
        out[i] = attribs.get(name).unwrap_or(0.0);
    }
    out
}

fn descriptor_to_vector(values: &[f32]) -> Option<[f64; DESCRIPTOR_DIMS]> {
    if values.len() != DESCRIPTOR_DIMS {
        return None;
    }
    let mut out = [0.0; DESCRIPTOR_DIMS];
    for (i, v) in values.iter().enumerate() {
        out[i] = *v as f64;
    }
    Some(out)
}

impl Engine {
    /// Build every enabled analyzer's index from a fresh catalog scan, then
    /// resolve the score-fusion plan from whichever indexes actually ended
    /// up with data (§4.4/§4.5/§7's startup fallback chain).
    pub async fn build(
        catalog: Catalog,
        settings: &Settings,
        jukebox_program: Option<&str>,
        jukebox_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let records = catalog.scan_ordered().await?;

        let mut path_to_pos = HashMap::with_capacity(records.len());
        let mut id_to_pos = HashMap::with_capacity(records.len());
        for (pos, row) in records.iter().enumerate() {
            path_to_pos.insert(row.path.clone(), pos);
            id_to_pos.insert(row.id, pos);
        }

        let mut available = Vec::new();

        let musly = if settings.musly.enabled {
            build_musly_index(&records, settings, jukebox_program, jukebox_path)
        } else {
            None
        };
        if musly.is_some() {
            available.push(AnalyzerId::Musly);
        }

        let essentia = if settings.essentia.enabled && settings.essentia.highlevel {
            build_essentia_index(&records)
        } else {
            None
        };
        if essentia.is_some() {
            available.push(AnalyzerId::Essentia);
        }

        let bliss = if settings.bliss.enabled {
            build_bliss_index(&records)
        } else {
            None
        };
        if bliss.is_some() {
            available.push(AnalyzerId::Bliss);
        }

        let fusion = FusionPlan::resolve(settings.simalgo, &settings.mixed, &available)
            .ok_or(ConfigError::NoUsableSimalgo)?;

        Ok(Self {
            catalog,
            records,
            path_to_pos,
            id_to_pos,
            musly,
            essentia,
            bliss,
            fusion,
        })
    }

    /// Install the process-wide engine instance. Called once at startup
    /// (§9); request handlers reach it through [`Engine::get`].
    pub fn install(engine: Engine) -> Arc<Engine> {
        let engine = Arc::new(engine);
        let _ = ENGINE.set(Arc::clone(&engine));
        engine
    }

    /// The process-wide engine instance, or `None` before [`Engine::install`]
    /// has run.
    pub fn get() -> Option<Arc<Engine>> {
        ENGINE.get().map(Arc::clone)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn records(&self) -> &[TrackRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn pos_for_path(&self, path: &str) -> Option<usize> {
        self.path_to_pos.get(path).copied()
    }

    pub fn pos_for_id(&self, id: i64) -> Option<usize> {
        self.id_to_pos.get(&id).copied()
    }

    pub fn record_at(&self, pos: usize) -> Option<&TrackRecord> {
        self.records.get(pos)
    }

    pub fn record_by_path(&self, path: &str) -> Option<&TrackRecord> {
        self.pos_for_path(path).and_then(|pos| self.records.get(pos))
    }

    pub fn fusion(&self) -> &FusionPlan {
        &self.fusion
    }

    /// `knn(seed_pos, k)` dispatched across whichever fusion mode was
    /// resolved at startup (§4.5). `exclude_path` is always the seed itself;
    /// the self-row (`sim == 0`) is filtered by callers that need it, per
    /// §8's "self is nearest" invariant — `dump`/`raw` modes want it kept.
    pub fn knn(&self, seed_pos: usize, k: usize) -> Vec<Neighbor> {
        let Some(seed) = self.records.get(seed_pos) else {
            return Vec::new();
        };
        let exclude_path = seed.path.clone();

        match &self.fusion {
            FusionPlan::Single(id) => self.knn_single(*id, seed_pos, k),
            FusionPlan::SimpleMixed(weights) => {
                let columns = self.distance_columns(weights, seed_pos);
                combine_simple_mixed(weights, &columns, &exclude_path, k)
            }
            FusionPlan::KdTreeMixed(weights) => {
                let columns = self.distance_columns(weights, seed_pos);
                combine_kdtree_mixed(weights, &columns, &exclude_path, k)
            }
        }
    }

    fn knn_single(&self, id: AnalyzerId, seed_pos: usize, k: usize) -> Vec<Neighbor> {
        match id {
            AnalyzerId::Musly => self
                .musly
                .as_ref()
                .and_then(|idx| idx.most_similar(seed_pos, k).ok())
                .unwrap_or_default(),
            AnalyzerId::Essentia => self
                .essentia
                .as_ref()
                .and_then(|idx| idx.vector_at(seed_pos).copied().map(|v| idx.knn(&v, k)))
                .unwrap_or_default(),
            AnalyzerId::Bliss => self
                .bliss
                .as_ref()
                .and_then(|idx| idx.vector_at(seed_pos).copied().map(|v| idx.knn(&v, k)))
                .unwrap_or_default(),
        }
    }

    /// Full per-row `(row_id, normalized distance)` column for one analyzer,
    /// keyed by path, needed by the mixed fusion modes (§4.5) which operate
    /// over every row rather than just the top-k.
    fn distance_column(&self, id: AnalyzerId, seed_pos: usize) -> HashMap<String, (i64, f64)> {
        match id {
            AnalyzerId::Musly => self
                .musly
                .as_ref()
                .map(|idx| {
                    idx.most_similar(seed_pos, idx.len())
                        .map(|neighbors| {
                            neighbors
                                .into_iter()
                                .map(|n| (n.path, (n.row_id, n.sim)))
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .unwrap_or_default(),
            AnalyzerId::Essentia => self
                .essentia
                .as_ref()
                .and_then(|idx| idx.vector_at(seed_pos).map(|q| (idx, *q)))
                .map(|(idx, q)| {
                    idx.distances_to_all(&q)
                        .into_iter()
                        .enumerate()
                        .map(|(pos, dist)| {
                            let path = idx.path_at(pos).unwrap_or_default().to_string();
                            let row_id = self.records[pos].id;
                            (path, (row_id, (dist / idx.max_distance()).min(1.0)))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            AnalyzerId::Bliss => self
                .bliss
                .as_ref()
                .and_then(|idx| idx.vector_at(seed_pos).map(|q| (idx, *q)))
                .map(|(idx, q)| {
                    idx.distances_to_all(&q)
                        .into_iter()
                        .enumerate()
                        .map(|(pos, dist)| {
                            let path = idx.path_at(pos).unwrap_or_default().to_string();
                            let row_id = self.records[pos].id;
                            (path, (row_id, (dist / idx.max_distance()).min(1.0)))
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn distance_columns(
        &self,
        weights: &[(AnalyzerId, f64)],
        seed_pos: usize,
    ) -> HashMap<AnalyzerId, HashMap<String, (i64, f64)>> {
        weights
            .iter()
            .map(|(id, _)| (*id, self.distance_column(*id, seed_pos)))
            .collect()
    }
}

fn build_essentia_index(records: &[TrackRecord]) -> Option<VectorIndex<ATTRIB_DIMS>> {
    let rows: Vec<(i64, String, [f64; ATTRIB_DIMS])> = records
        .iter()
        .filter_map(|r| r.attr_hl.map(|hl| (r.id, r.path.clone(), hl_to_vector(&hl))))
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(VectorIndex::build(&rows))
}

fn build_bliss_index(records: &[TrackRecord]) -> Option<VectorIndex<DESCRIPTOR_DIMS>> {
    let rows: Vec<(i64, String, [f64; DESCRIPTOR_DIMS])> = records
        .iter()
        .filter_map(|r| {
            r.descriptor_vec
                .as_deref()
                .and_then(descriptor_to_vector)
                .map(|v| (r.id, r.path.clone(), v))
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(VectorIndex::build(&rows))
}

fn build_musly_index(
    records: &[TrackRecord],
    settings: &Settings,
    jukebox_program: Option<&str>,
    jukebox_path: Option<&Path>,
) -> Option<TimbreIndex> {
    let (program, path) = (jukebox_program?, jukebox_path?);

    let rows: Vec<(i64, String, Vec<u8>)> = records
        .iter()
        .filter_map(|r| r.timbre_blob.as_ref().map(|blob| (r.id, r.path.clone(), blob.clone())))
        .collect();
    if rows.is_empty() {
        return None;
    }

    let load_rows: Vec<(i64, String)> = rows.iter().map(|(id, path, _)| (*id, path.clone())).collect();
    if let Some(index) = TimbreIndex::load(program, path, &load_rows) {
        return Some(index);
    }

    let style_records: Vec<TrackRecord> = records
        .iter()
        .filter(|r| r.has_timbre())
        .cloned()
        .collect();
    let subset = select_style_subset(&style_records, settings.musly.styletracksmethod, settings.musly.styletracks);

    match TimbreIndex::build(program, path, &rows, &subset) {
        Ok(index) => Some(index),
        Err(err) => {
            tracing::warn!("failed to build timbre index: {err}");
            None
        }
    }
}

