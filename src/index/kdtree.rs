//! Per-analyzer k-d tree vector index (§4.4): built once at server startup
//! from a catalog scan, queried for k-nearest neighbors with distances
//! normalized by `max_distance = √dim`.

use crate::index::neighbor::Neighbor;
use kiddo::distance::SquaredEuclidean;
use kiddo::KdTree;
use std::collections::HashMap;

/// A k-d tree over fixed-length `DIM`-dimensional feature vectors, one per
/// catalog row. `DIM` is 11 for the attribute (essentia) index and 20 for
/// the descriptor (bliss) index.
pub struct VectorIndex<const DIM: usize> {
    tree: KdTree<f64, DIM>,
    /// Index position -> catalog path, built in `id`-ascending order (§3/§9).
    paths: Vec<String>,
    row_ids: Vec<i64>,
    id_to_pos: HashMap<i64, usize>,
    vectors: Vec<[f64; DIM]>,
    max_distance: f64,
}

impl<const DIM: usize> VectorIndex<DIM> {
    /// `rows` must already be in `id`-ascending order (the catalog's
    /// `scan_ordered` contract, §4.1).
    pub fn build(rows: &[(i64, String, [f64; DIM])]) -> Self {
        let mut tree = KdTree::new();
        let mut paths = Vec::with_capacity(rows.len());
        let mut row_ids = Vec::with_capacity(rows.len());
        let mut id_to_pos = HashMap::with_capacity(rows.len());

        for (pos, (id, path, vector)) in rows.iter().enumerate() {
            tree.add(vector, pos as u64);
            paths.push(path.clone());
            row_ids.push(*id);
            id_to_pos.insert(*id, pos);
        }

        let vectors = rows.iter().map(|(_, _, v)| *v).collect();

        Self {
            tree,
            paths,
            row_ids,
            id_to_pos,
            vectors,
            max_distance: (DIM as f64).sqrt(),
        }
    }

    pub fn path_at(&self, pos: usize) -> Option<&str> {
        self.paths.get(pos).map(|s| s.as_str())
    }

    pub fn vector_at(&self, pos: usize) -> Option<&[f64; DIM]> {
        self.vectors.get(pos)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Raw (unnormalized) euclidean distance from `query` to every stored
    /// row, in index-position order. Used by the `simplemixed`/`kdtree-
    /// mixed` fusion modes (§4.5), which need a full per-row distance
    /// column rather than just the nearest few.
    pub fn distances_to_all(&self, query: &[f64; DIM]) -> Vec<f64> {
        self.vectors
            .iter()
            .map(|v| {
                v.iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect()
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn pos_for_id(&self, row_id: i64) -> Option<usize> {
        self.id_to_pos.get(&row_id).copied()
    }

    /// `k` is clamped to the number of rows; results ascending by `sim`
    /// (§4.4).
    pub fn knn(&self, query: &[f64; DIM], k: usize) -> Vec<Neighbor> {
        let k = k.min(self.paths.len());
        if k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|found| {
                let pos = found.item as usize;
                Neighbor {
                    row_id: self.row_ids[pos],
                    path: self.paths[pos].clone(),
                    sim: (found.distance.sqrt() / self.max_distance).min(1.0),
                }
            })
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_nearest_with_zero_distance() {
        let rows = vec![
            (1i64, "/a.flac".to_string(), [0.0, 0.0]),
            (2, "/b.flac".to_string(), [1.0, 0.0]),
            (3, "/c.flac".to_string(), [0.0, 5.0]),
        ];
        let index: VectorIndex<2> = VectorIndex::build(&rows);
        let neighbors = index.knn(&[0.0, 0.0], 3);
        assert_eq!(neighbors[0].row_id, 1);
        assert_eq!(neighbors[0].sim, 0.0);
        assert!(neighbors.windows(2).all(|w| w[0].sim <= w[1].sim));
    }

    #[test]
    fn test_k_clamped_to_row_count() {
        let rows = vec![(1i64, "/a.flac".to_string(), [0.0; 11])];
        let index: VectorIndex<11> = VectorIndex::build(&rows);
        assert_eq!(index.knn(&[0.0; 11], 50).len(), 1);
    }
}
