//! Exact cosine-distance nearest-neighbour index.
//!
//! Route sets are small (tens to a few thousand phrases), so an exhaustive
//! scan is both fast enough and exact.  Distances are `1 - cosine`, in
//! `[0, 2]`, which is what the kernel's threshold arithmetic expects from
//! any ANN collaborator.  Ties are broken by lower index, so results are
//! deterministic for a fixed build.

use async_trait::async_trait;
use chatsroute_kernel::matcher::cosine_similarity;
use chatsroute_kernel::{AnnIndex, AnnIndexBuilder, Neighbor, Result as RouterResult};

use crate::error::{ProviderError, Result};

/// Exhaustive cosine index over a fixed vector collection.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl FlatIndex {
    /// Index `vectors`, which must all share one dimension.
    pub fn new(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map_or(0, Vec::len);
        if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(ProviderError::Dimension {
                index,
                expected: dimension,
                actual: v.len(),
            });
        }
        Ok(Self { vectors, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Up to `k` nearest vectors, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if !self.vectors.is_empty() && query.len() != self.dimension {
            return Err(ProviderError::Dimension {
                index: 0,
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(index, v)| Neighbor {
                index,
                distance: (1.0 - cosine_similarity(query, v)).clamp(0.0, 2.0),
            })
            .collect();

        // Stable sort: equal distances keep index order.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait]
impl AnnIndex for FlatIndex {
    async fn knn(&self, query: &[f32], k: usize) -> RouterResult<Vec<Neighbor>> {
        Ok(self.search(query, k)?)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

/// Builds [`FlatIndex`]es.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatIndexBuilder;

#[async_trait]
impl AnnIndexBuilder for FlatIndexBuilder {
    async fn build(&self, vectors: &[Vec<f32>]) -> RouterResult<Box<dyn AnnIndex>> {
        let index = FlatIndex::new(vectors.to_vec())?;
        tracing::debug!(vectors = index.len(), dimension = index.dimension(), "flat index built");
        Ok(Box::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_first() {
        let index = FlatIndex::new(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]]).unwrap();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 1);
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].index, 2);
        assert!((hits[1].distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn opposite_vector_has_distance_two() {
        let index = FlatIndex::new(vec![vec![-1.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert!((hits[0].distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ties_resolve_to_lower_index() {
        let index = FlatIndex::new(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<_> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, [1, 2, 0]);
    }

    #[test]
    fn k_larger_than_collection() {
        let index = FlatIndex::new(vec![vec![1.0]]).unwrap();
        assert_eq!(index.search(&[1.0], 5).unwrap().len(), 1);
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let err = FlatIndex::new(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ProviderError::Dimension { index: 1, expected: 2, actual: 1 }));

        let index = FlatIndex::new(vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0], 1).is_err());
    }
}
