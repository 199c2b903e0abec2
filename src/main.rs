use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use yarrow_io::CsvDatasetReader;
use yarrow_rf::{Dataset, Forest, RfParameters, class_of_max_prob, resolve_seed};

#[derive(Parser)]
#[command(name = "yarrow")]
#[command(about = "Random Forest classification over CSV datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed; 0 derives the seed from wall-clock time
    #[arg(long, default_value_t = 25, global = true)]
    seed: u64,

    /// Diagnostic verbosity
    #[arg(long, value_enum, default_value_t = ReportingLevel::Info, global = true)]
    reporting_level: ReportingLevel,
}

/// Diagnostic output levels, most to least severe.
#[derive(Clone, Copy, ValueEnum)]
enum ReportingLevel {
    Error,
    Warning,
    Info,
    Debug1,
    Debug2,
}

impl ReportingLevel {
    fn filter(self) -> &'static str {
        match self {
            ReportingLevel::Error => "error",
            ReportingLevel::Warning => "warn",
            ReportingLevel::Info => "info",
            ReportingLevel::Debug1 => "debug",
            ReportingLevel::Debug2 => "trace",
        }
    }
}

impl std::fmt::Display for ReportingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReportingLevel::Error => "error",
            ReportingLevel::Warning => "warning",
            ReportingLevel::Info => "info",
            ReportingLevel::Debug1 => "debug1",
            ReportingLevel::Debug2 => "debug2",
        };
        f.write_str(name)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Train a forest, report OOB error and variable importance, optionally save the model
    Train {
        /// Input CSV; the last column is the integer class label
        #[arg(long)]
        input: PathBuf,

        /// Number of trees in the forest
        #[arg(long, default_value_t = 10)]
        num_trees: usize,

        /// Features tested per node; 0 means ceil(sqrt(num_features))
        #[arg(long, default_value_t = 0)]
        num_split_features: usize,

        /// Minimum information gain required to accept a split
        #[arg(long, default_value_t = 1e-6)]
        min_score: f64,

        /// Where to save the trained model
        #[arg(long)]
        model: Option<PathBuf>,

        /// Print every tree after training
        #[arg(long)]
        show_trees: bool,
    },
    /// Load a model and print the predicted class of every dataset sample
    Predict {
        /// Input CSV; the last column is the integer class label
        #[arg(long)]
        input: PathBuf,

        /// Path to a saved model
        #[arg(long)]
        model: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.reporting_level.filter())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Train {
            input,
            num_trees,
            num_split_features,
            min_score,
            model,
            show_trees,
        } => run_train(
            &input,
            num_trees,
            num_split_features,
            min_score,
            model.as_deref(),
            show_trees,
            cli.seed,
        ),
        Command::Predict { input, model } => run_predict(&input, &model),
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.4}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    input: &std::path::Path,
    num_trees: usize,
    num_split_features: usize,
    min_score: f64,
    model: Option<&std::path::Path>,
    show_trees: bool,
    seed: u64,
) -> Result<()> {
    let data = CsvDatasetReader::new(input)
        .read()
        .with_context(|| format!("reading dataset {}", input.display()))?;

    let split_features = if num_split_features == 0 {
        (data.num_features() as f64).sqrt().ceil() as usize
    } else {
        num_split_features
    };
    let params = RfParameters::new(num_trees)?
        .with_num_split_features(split_features)
        .with_min_score(min_score);

    // Training and variable importance share one RNG stream, so a fixed
    // seed fixes the entire run.
    let mut rng = ChaCha8Rng::seed_from_u64(resolve_seed(seed));
    let forest = Forest::grow(&data, params, &mut rng)?;

    if show_trees {
        for (i, tree) in forest.trees().iter().enumerate() {
            println!("\nTree {i}");
            print!("{}", tree.root());
        }
    }

    let (err, tree_errs) = forest.oob_errors()?;
    for (i, per_class) in tree_errs.iter().enumerate() {
        println!("OOB error tree {i}:\t{}", join(per_class));
    }
    println!("\nOOB error: {}", join(&err));

    let (imp, tree_imps) = forest.var_imp(&mut rng)?;
    for (i, per_feature) in tree_imps.iter().enumerate() {
        println!("Feature importance tree {i}:\t{}", join(per_feature));
    }
    println!("\nFeature importance: {}", join(&imp));

    if let Some(path) = model {
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        forest.save(&mut file)?;
        info!(model = %path.display(), "model written");
    }

    Ok(())
}

fn run_predict(input: &std::path::Path, model: &std::path::Path) -> Result<()> {
    let data = CsvDatasetReader::new(input)
        .read()
        .with_context(|| format!("reading dataset {}", input.display()))?;

    let mut file = File::open(model).with_context(|| format!("opening {}", model.display()))?;
    let forest = Forest::load(&mut file, &data)?;

    for id in data.ids() {
        let dist = forest.predict(&data.sample(id)?)?;
        println!("{}", class_of_max_prob(&dist));
    }
    Ok(())
}
