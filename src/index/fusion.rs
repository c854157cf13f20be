//! Score fusion (§4.5/§9): an immutable `FusionPlan` built once at server
//! start from config, carrying `(analyzer_id, weight, max_distance)`
//! triples. The mixed modes are plan variants rather than call-site
//! branches.

use crate::config::SimAlgo;
use crate::index::neighbor::Neighbor;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerId {
    Musly,
    Essentia,
    Bliss,
}

impl AnalyzerId {
    pub fn config_key(self) -> &'static str {
        match self {
            AnalyzerId::Musly => "musly",
            AnalyzerId::Essentia => "essentia",
            AnalyzerId::Bliss => "bliss",
        }
    }
}

#[derive(Debug, Clone)]
pub enum FusionPlan {
    /// Only one analyzer is in play; forward its `knn` directly (§4.5).
    Single(AnalyzerId),
    /// `combined[i] = Σ weight_a * normalized_dist_a[i]`, sorted by row.
    SimpleMixed(Vec<(AnalyzerId, f64)>),
    /// A k-d tree built over the weighted distance columns, queried at the
    /// origin.
    KdTreeMixed(Vec<(AnalyzerId, f64)>),
}

impl FusionPlan {
    /// Resolve `simalgo` plus the set of analyzers that actually have
    /// analyzed data (`available`) into a concrete plan. Falls back through
    /// `requested -> bliss -> musly -> essentia` per §7 when the requested
    /// algorithm has no backing data; returns `None` if nothing is usable.
    pub fn resolve(simalgo: SimAlgo, mixed_weights: &HashMap<String, u32>, available: &[AnalyzerId]) -> Option<Self> {
        let is_available = |id: AnalyzerId| available.contains(&id);

        match simalgo {
            SimAlgo::Musly | SimAlgo::Essentia | SimAlgo::Bliss => {
                let requested = match simalgo {
                    SimAlgo::Musly => AnalyzerId::Musly,
                    SimAlgo::Essentia => AnalyzerId::Essentia,
                    SimAlgo::Bliss => AnalyzerId::Bliss,
                    _ => unreachable!(),
                };
                for candidate in [requested, AnalyzerId::Bliss, AnalyzerId::Musly, AnalyzerId::Essentia] {
                    if is_available(candidate) {
                        return Some(FusionPlan::Single(candidate));
                    }
                }
                None
            }
            SimAlgo::Mixed | SimAlgo::Simplemixed => {
                let mut weights: Vec<(AnalyzerId, f64)> = [AnalyzerId::Musly, AnalyzerId::Essentia, AnalyzerId::Bliss]
                    .into_iter()
                    .filter(|id| is_available(*id))
                    .filter_map(|id| {
                        let raw = *mixed_weights.get(id.config_key()).unwrap_or(&0);
                        (raw > 0).then_some((id, raw as f64))
                    })
                    .collect();

                if weights.is_empty() {
                    return available.first().copied().map(FusionPlan::Single);
                }
                if weights.len() == 1 {
                    return Some(FusionPlan::Single(weights[0].0));
                }

                let total: f64 = weights.iter().map(|(_, w)| w).sum();
                for (_, w) in weights.iter_mut() {
                    *w /= total;
                }

                Some(if matches!(simalgo, SimAlgo::Simplemixed) {
                    FusionPlan::SimpleMixed(weights)
                } else {
                    FusionPlan::KdTreeMixed(weights)
                })
            }
        }
    }

    pub fn weights(&self) -> Vec<(AnalyzerId, f64)> {
        match self {
            FusionPlan::Single(id) => vec![(*id, 1.0)],
            FusionPlan::SimpleMixed(w) | FusionPlan::KdTreeMixed(w) => w.clone(),
        }
    }
}

/// Combine per-analyzer `(path -> normalized distance)` columns into a
/// single ordered neighbor list, per the plan's mode. All columns must
/// already be restricted to rows holding every weighted analyzer's feature.
pub fn combine_simple_mixed(
    weights: &[(AnalyzerId, f64)],
    columns: &HashMap<AnalyzerId, HashMap<String, (i64, f64)>>,
    exclude_path: &str,
    k: usize,
) -> Vec<Neighbor> {
    let Some((first_id, _)) = weights.first() else {
        return Vec::new();
    };
    let Some(base) = columns.get(first_id) else {
        return Vec::new();
    };

    let mut scored: Vec<Neighbor> = base
        .keys()
        .filter(|path| path.as_str() != exclude_path)
        .filter_map(|path| {
            let mut combined = 0.0;
            for (id, weight) in weights {
                let (_, dist) = columns.get(id)?.get(path)?;
                combined += weight * dist;
            }
            let (row_id, _) = base.get(path)?;
            Some(Neighbor {
                row_id: *row_id,
                path: path.clone(),
                sim: combined.min(1.0),
            })
        })
        .collect();

    scored.sort_by(|a, b| a.sim.partial_cmp(&b.sim).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Build a fresh k-d tree over the weighted per-analyzer distance columns
/// and query the origin for the `k` globally closest-to-"all-similar" rows
/// (§4.5's `kdtree-mixed` mode). Distances here ARE the fused score, unlike
/// `SimpleMixed`'s running sum.
pub fn combine_kdtree_mixed(
    weights: &[(AnalyzerId, f64)],
    columns: &HashMap<AnalyzerId, HashMap<String, (i64, f64)>>,
    exclude_path: &str,
    k: usize,
) -> Vec<Neighbor> {
    match weights.len() {
        1 => combine_kdtree_mixed_dim::<1>(weights, columns, exclude_path, k),
        2 => combine_kdtree_mixed_dim::<2>(weights, columns, exclude_path, k),
        3 => combine_kdtree_mixed_dim::<3>(weights, columns, exclude_path, k),
        _ => Vec::new(),
    }
}

fn combine_kdtree_mixed_dim<const DIM: usize>(
    weights: &[(AnalyzerId, f64)],
    columns: &HashMap<AnalyzerId, HashMap<String, (i64, f64)>>,
    exclude_path: &str,
    k: usize,
) -> Vec<Neighbor> {
    use kiddo::distance::SquaredEuclidean;
    use kiddo::KdTree;

    let Some((first_id, _)) = weights.first() else {
        return Vec::new();
    };
    let Some(base) = columns.get(first_id) else {
        return Vec::new();
    };

    let mut tree: KdTree<f64, DIM> = KdTree::new();
    let mut row_ids = Vec::new();
    let mut paths = Vec::new();

    for path in base.keys() {
        if path == exclude_path {
            continue;
        }
        let mut point = [0.0; DIM];
        let mut complete = true;
        for (i, (id, weight)) in weights.iter().enumerate() {
            match columns.get(id).and_then(|c| c.get(path)) {
                Some((_, dist)) => point[i] = weight * dist,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }
        let Some((row_id, _)) = base.get(path) else {
            continue;
        };
        tree.add(&point, row_ids.len() as u64);
        row_ids.push(*row_id);
        paths.push(path.clone());
    }

    if row_ids.is_empty() {
        return Vec::new();
    }
    let k = k.min(row_ids.len());
    let origin = [0.0; DIM];

    tree.nearest_n::<SquaredEuclidean>(&origin, k)
        .into_iter()
        .map(|found| {
            let pos = found.item as usize;
            Neighbor {
                row_id: row_ids[pos],
                path: paths[pos].clone(),
                sim: found.distance.sqrt().min(1.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_analyzer_available_only() {
        let plan = FusionPlan::resolve(SimAlgo::Musly, &HashMap::new(), &[AnalyzerId::Essentia]).unwrap();
        assert!(matches!(plan, FusionPlan::Single(AnalyzerId::Essentia)));
    }

    #[test]
    fn test_mixed_single_nonzero_weight_degrades_to_single() {
        let mut weights = HashMap::new();
        weights.insert("musly".to_string(), 100u32);
        weights.insert("essentia".to_string(), 0u32);
        let plan = FusionPlan::resolve(
            SimAlgo::Mixed,
            &weights,
            &[AnalyzerId::Musly, AnalyzerId::Essentia],
        )
        .unwrap();
        assert!(matches!(plan, FusionPlan::Single(AnalyzerId::Musly)));
    }

    #[test]
    fn test_mixed_weights_normalize_to_one() {
        let mut weights = HashMap::new();
        weights.insert("musly".to_string(), 75u32);
        weights.insert("essentia".to_string(), 25u32);
        let plan = FusionPlan::resolve(
            SimAlgo::Simplemixed,
            &weights,
            &[AnalyzerId::Musly, AnalyzerId::Essentia],
        )
        .unwrap();
        let w = plan.weights();
        let total: f64 = w.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
