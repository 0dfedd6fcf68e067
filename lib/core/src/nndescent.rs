//! Approximate kNN graph construction by nearest-neighbor descent
//!
//! Every point starts with random neighbors. Each round, points exchange
//! candidates through a local join: for every node, pairs drawn from its
//! forward and reverse neighbor lists are compared, and each pair may improve
//! both members' lists. Rounds stop once updates dry up or the iteration
//! budget runs out.
//!
//! Working lists hold [`NnDescentConfig::pool_size`] entries, more than `k`.
//! Only the closest `k` of each list are returned.
//!
//! Candidate generation is parallel; heap updates are applied in node order so
//! the result only depends on the seed.

use crate::distance::checked_distance;
use crate::{Error, Metric, NeighborGraph, Result};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// Tuning knobs for [`NnDescent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NnDescentConfig {
    /// Upper bound on new and old candidates sampled per node and round
    pub max_candidates: usize,
    /// Round budget, `None` means `max(5, round(log2 n))`
    pub n_iters: Option<usize>,
    /// Length of the working neighbor lists, `None` means `max(2k, 10)`
    ///
    /// Never below `k` and never above `n - 1`.
    pub pool_size: Option<usize>,
    /// Early termination once a round makes fewer than `delta * pool_size * n` updates
    pub delta: f32,
    pub seed: u64,
}

impl Default for NnDescentConfig {
    fn default() -> Self {
        Self {
            max_candidates: 60,
            n_iters: None,
            pool_size: None,
            delta: 0.001,
            seed: 42,
        }
    }
}

type CandidateList = SmallVec<[usize; 32]>;

#[derive(Debug, Clone, Copy)]
struct Entry {
    idx: usize,
    dist: f32,
    is_new: bool,
}

impl Entry {
    #[inline]
    fn key(&self) -> (OrderedFloat<f32>, usize) {
        (OrderedFloat(self.dist), self.idx)
    }
}

/// Bounded neighbor list of a single node, sorted ascending
#[derive(Debug, Clone)]
struct NeighborHeap {
    entries: SmallVec<[Entry; 16]>,
    capacity: usize,
}

impl NeighborHeap {
    fn new(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Distance a candidate has to beat to get in
    #[inline]
    fn threshold(&self) -> f32 {
        if self.entries.len() < self.capacity {
            f32::INFINITY
        } else {
            self.entries.last().map_or(f32::INFINITY, |e| e.dist)
        }
    }

    /// Insert unless the list is full of closer points or already holds `idx`
    fn push(&mut self, idx: usize, dist: f32, is_new: bool) -> bool {
        let key = (OrderedFloat(dist), idx);
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(worst) if key < worst.key() => {}
                _ => return false,
            }
        }
        if self.entries.iter().any(|e| e.idx == idx) {
            return false;
        }
        let pos = self.entries.partition_point(|e| e.key() < key);
        self.entries.insert(pos, Entry { idx, dist, is_new });
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
        true
    }
}

/// Per-query visited marks, reset in O(1) by bumping the epoch
struct VisitedSet {
    stamps: Vec<u32>,
    epoch: u32,
}

impl VisitedSet {
    fn new(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            epoch: 0,
        }
    }

    fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.stamps.fill(0);
            self.epoch = 1;
        }
    }

    /// Returns true the first time `idx` is seen since the last clear
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        if self.stamps[idx] == self.epoch {
            false
        } else {
            self.stamps[idx] = self.epoch;
            true
        }
    }
}

#[inline]
fn stream_rng(seed: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Nearest-neighbor descent graph builder
#[derive(Debug, Clone, Default)]
pub struct NnDescent {
    config: NnDescentConfig,
}

impl NnDescent {
    pub fn new(config: NnDescentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NnDescentConfig {
        &self.config
    }

    fn n_iters(&self, n: usize) -> usize {
        self.config
            .n_iters
            .unwrap_or_else(|| ((n.max(2) as f64).log2().round() as usize).max(5))
    }

    fn pool_size(&self, n: usize, k: usize) -> usize {
        self.config
            .pool_size
            .unwrap_or_else(|| (2 * k).max(10))
            .max(k)
            .min(n.saturating_sub(1))
    }

    /// Build an approximate kNN graph of `points` against themselves
    pub fn build<P, M>(&self, points: &[P], k: usize, metric: &M) -> Result<NeighborGraph>
    where
        P: Sync,
        M: Metric<P> + ?Sized,
    {
        let n = points.len();
        if k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".to_string()));
        }
        if k > n.saturating_sub(1) {
            return Err(Error::InsufficientNeighbors {
                k,
                available: n.saturating_sub(1),
            });
        }
        if self.config.max_candidates == 0 {
            return Err(Error::InvalidConfig(
                "max_candidates must be at least 1".to_string(),
            ));
        }

        let seed = self.config.seed;
        let pool = self.pool_size(n, k);
        let mut heaps: Vec<NeighborHeap> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rng = stream_rng(seed, i as u64);
                let mut heap = NeighborHeap::new(pool);
                for j in index::sample(&mut rng, n - 1, pool) {
                    let j = if j >= i { j + 1 } else { j };
                    let d = checked_distance(metric, &points[i], &points[j])?;
                    heap.push(j, d, true);
                }
                Ok::<_, Error>(heap)
            })
            .collect::<Result<_>>()?;

        let n_iters = self.n_iters(n);
        let min_updates = (self.config.delta as f64 * pool as f64 * n as f64).max(0.0);

        for iteration in 0..n_iters {
            let (new_candidates, old_candidates) =
                self.sample_candidates(&mut heaps, iteration as u64);

            let thresholds: Vec<f32> = heaps.iter().map(NeighborHeap::threshold).collect();
            let proposals: Vec<Vec<(usize, usize, f32)>> = (0..n)
                .into_par_iter()
                .map(|u| {
                    local_join(
                        points,
                        metric,
                        &new_candidates[u],
                        &old_candidates[u],
                        &thresholds,
                    )
                })
                .collect::<Result<_>>()?;

            let mut updates = 0usize;
            for (p, q, d) in proposals.into_iter().flatten() {
                updates += usize::from(heaps[p].push(q, d, true));
                updates += usize::from(heaps[q].push(p, d, true));
            }

            debug!(iteration, updates, n, k, pool, "nn-descent round");
            if (updates as f64) <= min_updates {
                break;
            }
        }

        let columns = heaps
            .into_iter()
            .map(|heap| heap.entries.iter().take(k).map(|e| (e.idx, e.dist)).collect())
            .collect();
        NeighborGraph::from_columns(k, columns)
    }

    /// Split every node's forward and reverse neighbors into sampled new and old lists
    ///
    /// Forward entries that made it into the new sample are flagged old so they
    /// are not joined again next round.
    fn sample_candidates(
        &self,
        heaps: &mut [NeighborHeap],
        iteration: u64,
    ) -> (Vec<CandidateList>, Vec<CandidateList>) {
        let n = heaps.len();
        let mut new_candidates: Vec<CandidateList> = vec![CandidateList::new(); n];
        let mut old_candidates: Vec<CandidateList> = vec![CandidateList::new(); n];

        for (u, heap) in heaps.iter().enumerate() {
            for entry in &heap.entries {
                let v = entry.idx;
                if entry.is_new {
                    new_candidates[u].push(v);
                    new_candidates[v].push(u);
                } else {
                    old_candidates[u].push(v);
                    old_candidates[v].push(u);
                }
            }
        }

        let max_candidates = self.config.max_candidates;
        let round_seed = self.config.seed.wrapping_add((iteration + 1) << 32);
        new_candidates
            .par_iter_mut()
            .zip(old_candidates.par_iter_mut())
            .enumerate()
            .for_each(|(u, (new, old))| {
                let mut rng = stream_rng(round_seed, u as u64);
                for list in [&mut *new, &mut *old] {
                    list.sort_unstable();
                    list.dedup();
                    if list.len() > max_candidates {
                        list.shuffle(&mut rng);
                        list.truncate(max_candidates);
                        list.sort_unstable();
                    }
                }
            });

        for (u, heap) in heaps.iter_mut().enumerate() {
            for entry in heap.entries.iter_mut() {
                if entry.is_new && new_candidates[u].binary_search(&entry.idx).is_ok() {
                    entry.is_new = false;
                }
            }
        }

        (new_candidates, old_candidates)
    }

    /// Search `queries` against an already built graph of `reference`
    ///
    /// Best-first traversal over the undirected reference graph from random
    /// entry points. At most `max_candidates` results are kept per query.
    pub fn query<P, M>(
        &self,
        reference: &[P],
        graph: &NeighborGraph,
        queries: &[P],
        k: usize,
        metric: &M,
        max_candidates: usize,
    ) -> Result<NeighborGraph>
    where
        P: Sync,
        M: Metric<P> + ?Sized,
    {
        let n = reference.len();
        if graph.len() != n {
            return Err(Error::MalformedInput(format!(
                "reference graph has {} columns but there are {} reference points",
                graph.len(),
                n
            )));
        }
        graph.check_bounds(n)?;
        if k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".to_string()));
        }
        if k > n {
            return Err(Error::InsufficientNeighbors { k, available: n });
        }

        let ef = max_candidates.max(k);
        let adjacency = undirected_adjacency(graph);
        let n_entries = n.min(k.max(4));
        let seed = self.config.seed;

        let columns: Vec<Vec<(usize, f32)>> = queries
            .par_iter()
            .enumerate()
            .map_init(
                || VisitedSet::new(n),
                |visited, (qi, query)| {
                    visited.clear();
                    let mut rng = stream_rng(seed.rotate_left(17), qi as u64);
                    let entries: Vec<usize> = index::sample(&mut rng, n, n_entries).into_vec();
                    let mut found =
                        best_first(reference, &adjacency, query, &entries, ef, metric, visited)?;
                    found.truncate(k);
                    Ok::<_, Error>(found)
                },
            )
            .collect::<Result<_>>()?;

        NeighborGraph::from_columns(k, columns)
    }
}

/// Compare all new-new and new-old pairs of one node's candidates
///
/// Only pairs that could enter at least one of the two heaps are proposed.
fn local_join<P, M>(
    points: &[P],
    metric: &M,
    new: &[usize],
    old: &[usize],
    thresholds: &[f32],
) -> Result<Vec<(usize, usize, f32)>>
where
    M: Metric<P> + ?Sized,
{
    let mut out = Vec::new();
    for (i, &p) in new.iter().enumerate() {
        for &q in new[i + 1..].iter().chain(old.iter()) {
            if p == q {
                continue;
            }
            let d = checked_distance(metric, &points[p], &points[q])?;
            if d < thresholds[p] || d < thresholds[q] {
                out.push((p, q, d));
            }
        }
    }
    Ok(out)
}

fn undirected_adjacency(graph: &NeighborGraph) -> Vec<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::with_capacity(graph.k() * 2); graph.len()];
    for (u, v, _) in graph.iter() {
        if u != v {
            adjacency[u].push(v);
            adjacency[v].push(u);
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }
    adjacency
}

/// Greedy best-first search, returns up to `ef` results sorted ascending
fn best_first<P, M>(
    reference: &[P],
    adjacency: &[Vec<usize>],
    query: &P,
    entries: &[usize],
    ef: usize,
    metric: &M,
    visited: &mut VisitedSet,
) -> Result<Vec<(usize, f32)>>
where
    M: Metric<P> + ?Sized,
{
    // Min-heap of nodes to expand, max-heap of the best `ef` so far
    let mut frontier: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> =
        BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(ef + 1);

    for &entry in entries {
        if visited.insert(entry) {
            let d = checked_distance(metric, query, &reference[entry])?;
            frontier.push(Reverse((OrderedFloat(d), entry)));
            results.push((OrderedFloat(d), entry));
            if results.len() > ef {
                results.pop();
            }
        }
    }

    while let Some(Reverse((dist, current))) = frontier.pop() {
        if results.len() >= ef {
            if let Some(&(worst, _)) = results.peek() {
                if dist > worst {
                    break;
                }
            }
        }

        for &neighbor in &adjacency[current] {
            if !visited.insert(neighbor) {
                continue;
            }
            let d = OrderedFloat(checked_distance(metric, query, &reference[neighbor])?);
            let admit = results.len() < ef || results.peek().map_or(true, |&(worst, _)| d < worst);
            if admit {
                frontier.push(Reverse((d, neighbor)));
                results.push((d, neighbor));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    Ok(results
        .into_sorted_vec()
        .into_iter()
        .map(|(d, idx)| (idx, d.into_inner()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{distance, Distance, Vector};
    use rand::Rng;

    fn random_points(n: usize, dim: usize, seed: u64) -> Vec<Vector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Vector::new((0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect()))
            .collect()
    }

    fn exact_graph(points: &[Vector], k: usize) -> NeighborGraph {
        let d = distance::pairwise(points, &Distance::Euclidean).unwrap();
        let columns = (0..points.len())
            .map(|j| {
                crate::neighbors::select_nearest(
                    d.row(j).iter().copied().enumerate().filter(|&(i, _)| i != j),
                    k,
                )
            })
            .collect();
        NeighborGraph::from_columns(k, columns).unwrap()
    }

    fn recall(found: &NeighborGraph, truth: &NeighborGraph) -> f64 {
        let mut hits = 0;
        for j in 0..truth.len() {
            hits += found
                .indices(j)
                .iter()
                .filter(|i| truth.indices(j).contains(i))
                .count();
        }
        hits as f64 / (truth.len() * truth.k()) as f64
    }

    #[test]
    fn test_neighbor_heap_keeps_closest() {
        let mut heap = NeighborHeap::new(2);
        assert!(heap.push(1, 3.0, true));
        assert!(heap.push(2, 1.0, true));
        assert_eq!(heap.threshold(), 3.0);
        assert!(!heap.push(1, 3.0, true));
        assert!(!heap.push(3, 5.0, true));
        assert!(heap.push(4, 2.0, true));
        let kept: Vec<usize> = heap.entries.iter().map(|e| e.idx).collect();
        assert_eq!(kept, vec![2, 4]);
    }

    #[test]
    fn test_visited_set() {
        let mut vs = VisitedSet::new(10);
        vs.clear();
        assert!(vs.insert(5));
        assert!(!vs.insert(5));
        vs.clear();
        assert!(vs.insert(5));
    }

    #[test]
    fn test_build_recall() {
        let points = random_points(200, 4, 7);
        let truth = exact_graph(&points, 10);
        let graph = NnDescent::default()
            .build(&points, 10, &Distance::Euclidean)
            .unwrap();

        assert!(graph.validate(true).is_ok());
        assert!(recall(&graph, &truth) > 0.9);
    }

    #[test]
    fn test_small_graph_recall_per_point() {
        for seed in 0..8 {
            let points = random_points(50, 8, 100 + seed);
            let truth = exact_graph(&points, 5);
            let graph = NnDescent::new(NnDescentConfig {
                seed,
                ..Default::default()
            })
            .build(&points, 5, &Distance::Euclidean)
            .unwrap();

            for j in 0..points.len() {
                let hits = graph
                    .indices(j)
                    .iter()
                    .filter(|i| truth.indices(j).contains(i))
                    .count();
                assert!(hits >= 5, "seed {seed}, point {j}: {hits} of 5 neighbors found");
            }
        }
    }

    #[test]
    fn test_pool_size_bounds() {
        let builder = NnDescent::default();
        assert_eq!(builder.pool_size(50, 5), 10);
        assert_eq!(builder.pool_size(50, 15), 30);
        assert_eq!(builder.pool_size(8, 5), 7);

        let narrow = NnDescent::new(NnDescentConfig {
            pool_size: Some(2),
            ..Default::default()
        });
        assert_eq!(narrow.pool_size(50, 5), 5);
    }

    #[test]
    fn test_build_is_deterministic() {
        let points = random_points(120, 3, 3);
        let builder = NnDescent::new(NnDescentConfig {
            seed: 99,
            ..Default::default()
        });
        let a = builder.build(&points, 5, &Distance::Euclidean).unwrap();
        let b = builder.build(&points, 5, &Distance::Euclidean).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_insufficient_neighbors() {
        let points = random_points(5, 2, 1);
        let err = NnDescent::default()
            .build(&points, 5, &Distance::Euclidean)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientNeighbors { k: 5, available: 4 }));
    }

    #[test]
    fn test_query_against_graph() {
        let reference = random_points(300, 3, 11);
        let queries = random_points(20, 3, 12);
        let builder = NnDescent::default();
        let graph = builder.build(&reference, 8, &Distance::Euclidean).unwrap();

        let found = builder
            .query(&reference, &graph, &queries, 8, &Distance::Euclidean, 64)
            .unwrap();
        assert_eq!(found.len(), 20);
        assert!(found.validate(false).is_ok());

        let exact = distance::cross(&queries, &reference, &Distance::Euclidean).unwrap();
        let truth = NeighborGraph::from_columns(
            8,
            (0..queries.len())
                .map(|q| {
                    crate::neighbors::select_nearest(exact.row(q).iter().copied().enumerate(), 8)
                })
                .collect(),
        )
        .unwrap();
        assert!(recall(&found, &truth) > 0.9);
    }

    #[test]
    fn test_query_graph_mismatch() {
        let reference = random_points(30, 2, 5);
        let builder = NnDescent::default();
        let graph = builder.build(&reference, 3, &Distance::Euclidean).unwrap();
        let err = builder
            .query(&reference[..20], &graph, &reference[..2], 3, &Distance::Euclidean, 24)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_query_rejects_unknown_neighbor_ids() {
        let reference = random_points(10, 2, 8);
        let graph =
            NeighborGraph::from_columns(1, (0..10).map(|j| vec![(j + 20, 1.0)]).collect()).unwrap();
        let err = NnDescent::default()
            .query(&reference, &graph, &reference[..2], 1, &Distance::Euclidean, 8)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }
}
