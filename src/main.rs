use anyhow::Context;
use clap::{Parser, Subcommand};
use fuzzgraph::{
    fit_ab, CurveParams, Distance, KnnConfig, KnnSearch, Matrix, MetricSpec, NeighborGraph,
    SampleSet, SearchStrategy, Vector,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Neighbor graphs and fuzzy topology for manifold learning
#[derive(Parser, Debug)]
#[command(name = "fuzzgraph")]
#[command(about = "kNN graphs and membership curve fitting", long_about = None)]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the k nearest neighbors of every point
    Knn {
        /// JSON array of points, or a square distance matrix with `--metric precomputed`
        #[arg(short, long)]
        input: PathBuf,

        /// Neighbors per point
        #[arg(short, default_value_t = 15)]
        k: usize,

        /// euclidean, squared_euclidean, manhattan, chebyshev, cosine or precomputed
        #[arg(long, default_value = "euclidean")]
        metric: String,

        /// JSON file with search configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the graph here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit the (a, b) parameters of the membership curve
    FitCurve {
        #[arg(long, default_value_t = 0.1)]
        min_dist: f64,

        #[arg(long, default_value_t = 1.0)]
        spread: f64,

        /// Use this `a` instead of fitting (requires `-b`)
        #[arg(short, requires = "b")]
        a: Option<f64>,

        /// Use this `b` instead of fitting (requires `-a`)
        #[arg(short, requires = "a")]
        b: Option<f64>,
    },
}

#[derive(Serialize)]
struct KnnOutput<'a> {
    strategy: SearchStrategy,
    graph: &'a NeighborGraph,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<KnnConfig> {
    let Some(path) = path else {
        return Ok(KnnConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn run_knn(
    input: &Path,
    k: usize,
    metric: &str,
    config: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let search = KnnSearch::new(load_config(config)?);
    let raw = fs::read_to_string(input)
        .with_context(|| format!("reading input {}", input.display()))?;
    let rows: Vec<Vec<f32>> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing input {}", input.display()))?;
    info!("Loaded {} rows from {:?}", rows.len(), input);

    let (strategy, graph) = if metric.eq_ignore_ascii_case("precomputed") {
        let matrix = Matrix::from_rows(&rows)?;
        let samples = SampleSet::<Vector>::Precomputed(&matrix);
        let strategy = search.strategy(&samples, &MetricSpec::Precomputed)?;
        (strategy, search.search(samples, k, MetricSpec::Precomputed)?)
    } else {
        let distance: Distance = metric.parse()?;
        let points: Vec<Vector> = rows.into_iter().map(Vector::new).collect();
        let samples = SampleSet::Points(&points);
        let spec: MetricSpec<'_, Vector> = MetricSpec::Function(&distance);
        let strategy = search.strategy(&samples, &spec)?;
        (strategy, search.search(samples, k, spec)?)
    };
    info!("Found {} neighbors for {} points ({:?})", k, graph.len(), strategy);

    let json = serde_json::to_string_pretty(&KnnOutput {
        strategy,
        graph: &graph,
    })?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Graph written to {:?}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_fit_curve(
    min_dist: f64,
    spread: f64,
    a: Option<f64>,
    b: Option<f64>,
) -> anyhow::Result<()> {
    let preset = a.zip(b).map(|(a, b)| CurveParams::new(a, b));
    let params = fit_ab(min_dist, spread, preset)?;
    info!("Curve parameters a = {}, b = {}", params.a, params.b);
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the JSON result
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fuzzgraph v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Knn {
            input,
            k,
            metric,
            config,
            output,
        } => run_knn(&input, k, &metric, config.as_deref(), output.as_deref()),
        Command::FitCurve {
            min_dist,
            spread,
            a,
            b,
        } => run_fit_curve(min_dist, spread, a, b),
    }
}
