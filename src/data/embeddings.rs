use crate::error::{Result, SynrouteError};
use crate::types::{CatalogIndex, DistanceMetric};
use std::cmp::Ordering;

/// Building-block embeddings, row `i` belonging to catalog entry `i`.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    rows: Vec<Vec<f32>>,
    dim: usize,
}

impl EmbeddingStore {
    pub fn new(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(SynrouteError::Validation(format!(
                "Embedding {} has length {}, expected {}",
                i,
                row.len(),
                dim
            )));
        }
        Ok(Self { rows, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: CatalogIndex) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Candidates ordered by distance to `query`, ties broken by catalog index.
    /// `candidates` restricts the search; `None` searches every row.
    pub fn ranked(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        candidates: Option<&[CatalogIndex]>,
    ) -> Vec<(CatalogIndex, f32)> {
        let mut scored: Vec<(CatalogIndex, f32)> = match candidates {
            Some(subset) => subset
                .iter()
                .filter_map(|&i| self.get(i).map(|row| (i, metric.distance(query, row))))
                .collect(),
            None => self
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| (i, metric.distance(query, row)))
                .collect(),
        };
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }

    pub fn nearest(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        candidates: Option<&[CatalogIndex]>,
    ) -> Option<(CatalogIndex, f32)> {
        self.kth(query, metric, candidates, 1)
    }

    /// The `rank`-th nearest candidate (1-based).
    pub fn kth(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        candidates: Option<&[CatalogIndex]>,
        rank: usize,
    ) -> Option<(CatalogIndex, f32)> {
        if rank == 0 {
            return None;
        }
        self.ranked(query, metric, candidates).get(rank - 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EmbeddingStore {
        EmbeddingStore::new(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![3.0, 3.0]])
            .unwrap()
    }

    #[test]
    fn test_ties_resolve_to_lower_index() {
        let s = store();
        let ranked = s.ranked(&[0.5, 0.5], DistanceMetric::Manhattan, None);
        let order: Vec<_> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(s.kth(&[1.0, 1.0], DistanceMetric::Manhattan, None, 1).unwrap().0, 1);
    }

    #[test]
    fn test_restricted_candidates() {
        let s = store();
        let hit = s.nearest(&[0.0, 0.0], DistanceMetric::Euclidean, Some(&[2, 3])).unwrap();
        assert_eq!(hit.0, 2);
        assert!(s.kth(&[0.0, 0.0], DistanceMetric::Euclidean, Some(&[2, 3]), 3).is_none());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        assert!(EmbeddingStore::new(vec![vec![0.0], vec![0.0, 1.0]]).is_err());
    }
}
