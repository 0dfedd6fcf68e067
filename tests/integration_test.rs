// Integration tests for fuzzgraph
use fuzzgraph::prelude::*;
use fuzzgraph::{CurveFitter, NnDescent, NnDescentConfig, SearchStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn random_points(n: usize, dim: usize, seed: u64) -> Vec<Vector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Vector::new((0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect()))
        .collect()
}

fn approximate_config() -> KnnConfig {
    KnnConfig {
        exact_threshold: 0,
        ..KnnConfig::default()
    }
}

fn recall(approx: &NeighborGraph, exact: &NeighborGraph) -> Vec<f32> {
    (0..exact.len())
        .map(|j| {
            let truth: HashSet<usize> = exact.indices(j).iter().copied().collect();
            let hits = approx.indices(j).iter().filter(|i| truth.contains(i)).count();
            hits as f32 / exact.k() as f32
        })
        .collect()
}

#[test]
fn test_toy_line_neighbors() {
    let points: Vec<Vector> = [0.0, 1.0, 3.0, 7.0]
        .iter()
        .map(|&x| Vector::new(vec![x]))
        .collect();

    let graph = KnnSearch::default()
        .search(SampleSet::Points(&points), 2, MetricSpec::Function(&Distance::Euclidean))
        .unwrap();

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.indices(0), &[1, 2]);
    assert_eq!(graph.distances(0), &[1.0, 3.0]);
    assert_eq!(graph.indices(1), &[0, 2]);
    assert_eq!(graph.distances(1), &[1.0, 2.0]);
    assert_eq!(graph.indices(2), &[1, 0]);
    assert_eq!(graph.distances(2), &[2.0, 3.0]);
    assert_eq!(graph.indices(3), &[2, 1]);
    assert_eq!(graph.distances(3), &[4.0, 6.0]);
}

#[test]
fn test_exact_and_approximate_agree() {
    let metric: MetricSpec<'_, Vector> = MetricSpec::Function(&Distance::Euclidean);
    let exact_search = KnnSearch::default();

    for seed in 0..5 {
        let points = random_points(50, 8, 7 + seed);
        assert_eq!(
            exact_search.strategy(&SampleSet::Points(&points), &metric).unwrap(),
            SearchStrategy::Exact
        );
        let exact = exact_search.search(SampleSet::Points(&points), 5, metric).unwrap();
        exact.validate(true).unwrap();

        let approx_search = KnnSearch::new(KnnConfig {
            exact_threshold: 0,
            nndescent: NnDescentConfig {
                seed,
                ..NnDescentConfig::default()
            },
            ..KnnConfig::default()
        });
        assert_eq!(
            approx_search.strategy(&SampleSet::Points(&points), &metric).unwrap(),
            SearchStrategy::Approximate
        );
        let approx = approx_search.search(SampleSet::Points(&points), 5, metric).unwrap();
        approx.validate(true).unwrap();

        let per_point = recall(&approx, &exact);
        assert!(
            per_point.iter().all(|&r| r >= 0.9),
            "seed {seed}: per point recall {per_point:?}"
        );
    }
}

#[test]
fn test_precomputed_matches_points() {
    let points = random_points(30, 3, 11);
    let rows: Vec<Vec<f32>> = points
        .iter()
        .map(|a| {
            points
                .iter()
                .map(|b| Distance::Euclidean.eval(a.as_slice(), b.as_slice()))
                .collect()
        })
        .collect();
    let matrix = Matrix::from_rows(&rows).unwrap();

    let search = KnnSearch::default();
    let from_points = search
        .search(SampleSet::Points(&points), 4, MetricSpec::Function(&Distance::Euclidean))
        .unwrap();
    let from_matrix = search
        .search(SampleSet::<Vector>::Precomputed(&matrix), 4, MetricSpec::Precomputed)
        .unwrap();

    for j in 0..points.len() {
        assert_eq!(from_points.indices(j), from_matrix.indices(j));
    }
}

#[test]
fn test_query_against_reference_graph() {
    let reference = random_points(300, 3, 21);
    let queries = random_points(30, 3, 22);
    let metric = Distance::Euclidean;

    let search = KnnSearch::new(approximate_config());
    let graph = search
        .search(SampleSet::Points(&reference), 10, MetricSpec::Function(&metric))
        .unwrap();
    let approx = search.query(&reference, &graph, &queries, 5, &metric).unwrap();
    approx.validate(false).unwrap();
    assert_eq!(approx.len(), queries.len());

    let exact = KnnSearch::default()
        .query(&reference, &graph, &queries, 5, &metric)
        .unwrap();
    let per_query = recall(&approx, &exact);
    let mean = per_query.iter().sum::<f32>() / per_query.len() as f32;
    assert!(mean >= 0.8, "mean query recall {mean}");
}

#[test]
fn test_nndescent_is_reproducible() {
    let points = random_points(120, 5, 3);
    let config = NnDescentConfig {
        seed: 99,
        ..NnDescentConfig::default()
    };
    let first = NnDescent::new(config.clone())
        .build(&points, 6, &Distance::Euclidean)
        .unwrap();
    let second = NnDescent::new(config)
        .build(&points, 6, &Distance::Euclidean)
        .unwrap();
    for j in 0..points.len() {
        assert_eq!(first.indices(j), second.indices(j));
    }
}

#[test]
fn test_insufficient_neighbors() {
    let points = random_points(4, 2, 1);
    let result = KnnSearch::default().search(
        SampleSet::Points(&points),
        4,
        MetricSpec::Function(&Distance::Euclidean),
    );
    assert!(matches!(
        result,
        Err(Error::InsufficientNeighbors { k: 4, available: 3 })
    ));
}

#[test]
fn test_full_pipeline() {
    let points = random_points(60, 3, 5);
    let graph = KnnSearch::default()
        .search(SampleSet::Points(&points), 6, MetricSpec::Function(&Distance::Euclidean))
        .unwrap();

    let strengths: Vec<f32> = graph.iter().map(|(_, _, d)| (-d).exp()).collect();
    let directed = CsrMatrix::from_neighbor_graph(&graph, &strengths).unwrap();
    assert_eq!(directed.nnz(), 60 * 6);

    let combined = combine_sparse(&directed, 1.0).unwrap();
    assert!(combined.is_symmetric(1e-6));
    assert!(combined.nnz() >= directed.nnz());
    assert!(combined.values().iter().all(|&w| (0.0..=1.0).contains(&w)));

    let labels: Vec<Label<u32>> = (0..60)
        .map(|i| if i % 7 == 0 { Label::Unknown } else { Label::Known(i % 3) })
        .collect();
    let supervised = reweight(&combined, &labels, LabelPenalties::default()).unwrap();
    assert!(supervised.same_pattern(&combined));
    for ((_, _, before), (_, _, after)) in combined.iter().zip(supervised.iter()) {
        assert!(after <= before);
    }

    let curve = fit_ab(0.1, 1.0, None).unwrap();
    assert!((curve.a - 1.577).abs() < 0.01);
    assert!((curve.b - 0.895).abs() < 0.01);
}

#[test]
fn test_combine_endpoints() {
    // 0 -> 1 with 0.8, 1 -> 0 with 0.5, 1 -> 2 with 0.4
    let s = CsrMatrix::from_triplets(3, 3, &[0, 1, 1], &[1, 0, 2], &[0.8, 0.5, 0.4]).unwrap();

    let union = combine_sparse(&s, 1.0).unwrap();
    assert!((union.get(0, 1).unwrap() - 0.9).abs() < 1e-6);
    assert!((union.get(1, 2).unwrap() - 0.4).abs() < 1e-6);

    let intersection = combine_sparse(&s, 0.0).unwrap();
    assert!((intersection.get(0, 1).unwrap() - 0.4).abs() < 1e-6);
    assert_eq!(intersection.get(2, 1), Some(0.0));

    let half = combine_sparse(&s, 0.5).unwrap();
    assert!((half.get(1, 0).unwrap() - 0.65).abs() < 1e-6);
    assert!(half.is_symmetric(0.0));
}

#[test]
fn test_reweight_unknown_label() {
    let graph = CsrMatrix::from_triplets(2, 2, &[0, 1], &[1, 0], &[1.0, 1.0]).unwrap();
    let labels = vec![Label::Known("a"), Label::Unknown];
    let out = reweight(
        &graph,
        &labels,
        LabelPenalties {
            far_dist: 5.0,
            unknown_dist: 1.0,
        },
    )
    .unwrap();
    assert_eq!(out.nnz(), 2);
    assert!((out.get(0, 1).unwrap() - 0.367_879_44).abs() < 1e-6);
    assert!((out.get(1, 0).unwrap() - 0.367_879_44).abs() < 1e-6);
}

#[test]
fn test_curve_preset_bypasses_fit() {
    let preset = CurveParams::new(1.929, 0.7915);
    assert_eq!(fit_ab(0.1, 1.0, Some(preset)).unwrap(), preset);

    // A preset skips validation of the fitting inputs too
    let fitter = CurveFitter::new(Default::default());
    assert_eq!(fitter.fit(0.1, -1.0, Some(preset)).unwrap(), preset);
    assert!(matches!(fitter.fit(0.1, -1.0, None), Err(Error::InvalidConfig(_))));
}
