//! Spatial index over cluster centroids

use rstar::primitives::GeomWithData;
use rstar::RTree;

type Entry = GeomWithData<[f64; 2], usize>;

/// R-tree of centroids, owned by a single clustering pass.
///
/// Each entry carries the position of its cluster in the caller's output
/// list. Insertion keeps the tree balanced whatever order centroids arrive in.
#[derive(Default)]
pub struct CentroidIndex {
    tree: RTree<Entry>,
}

impl CentroidIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn insert(&mut self, x: f64, y: f64, id: usize) {
        self.tree.insert(GeomWithData::new([x, y], id));
    }

    /// Ids of all centroids within Euclidean `radius` of `(x, y)`, in no
    /// particular order
    pub fn within(&self, x: f64, y: f64, radius: f64) -> Vec<usize> {
        self.tree
            .locate_within_distance([x, y], radius * radius)
            .map(|entry| entry.data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_matches_linear_scan() {
        let points: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let t = i as f64;
                ((t * 37.0) % 101.0, (t * 53.0) % 97.0)
            })
            .collect();

        let mut index = CentroidIndex::new();
        for (id, (x, y)) in points.iter().enumerate() {
            index.insert(*x, *y, id);
        }
        assert_eq!(index.len(), 200);

        for (qx, qy, r) in [(50.0, 50.0, 10.0), (0.0, 0.0, 25.0), (100.0, 3.0, 7.5)] {
            let mut got = index.within(qx, qy, r);
            got.sort_unstable();
            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| (x - qx).powi(2) + (y - qy).powi(2) <= r * r)
                .map(|(id, _)| id)
                .collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_sorted_insertion_stays_shallow() {
        // Points arriving in x order, as they do after a z sort that follows position
        let mut index = CentroidIndex::new();
        for i in 0..20_000 {
            index.insert(i as f64, 0.0, i);
        }
        assert_eq!(index.len(), 20_000);

        for i in 0..20_000 {
            assert_eq!(index.within(i as f64, 0.0, 0.25), vec![i]);
        }
    }

    #[test]
    fn test_duplicates_and_empty() {
        let mut index = CentroidIndex::new();
        assert!(index.within(0.0, 0.0, 1.0).is_empty());

        index.insert(1.0, 1.0, 0);
        index.insert(1.0, 1.0, 1);
        index.insert(1.0, 1.0, 2);
        let mut got = index.within(1.0, 1.0, 0.0);
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2]);
    }
}
