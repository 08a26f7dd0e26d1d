extern crate clap;
extern crate failure;
extern crate rand;
extern crate serde_json;
extern crate slope_one;
extern crate tracing;
extern crate tracing_subscriber;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use slope_one::data::{train_test_split, Ratings};
use slope_one::datasets::load_movielens;
use slope_one::evaluation::accuracy_score;
use slope_one::models::slope_one::Hyperparameters;

#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Measure Slope One prediction error on held-out ratings")]
struct Args {
    /// MovieLens-style ratings.csv
    #[arg(short, long)]
    ratings: PathBuf,

    /// Fraction of ratings held out for testing
    #[arg(long, default_value = "0.2")]
    test_fraction: f32,

    /// Seed for the train/test split
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Worker threads used to build the difference matrix
    #[arg(long)]
    threads: Option<usize>,

    /// Logging level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<(), failure::Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    if !(0.0..=1.0).contains(&args.test_fraction) {
        return Err(failure::err_msg(format!(
            "--test-fraction must be between 0 and 1, got {}",
            args.test_fraction
        )));
    }

    let mut data = Ratings::from_records(load_movielens(&args.ratings)?)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let (train, test) = train_test_split(&mut data, &mut rng, args.test_fraction);
    info!(train = train.len(), test = test.len(), "Split ratings");

    let mut hyperparameters = Hyperparameters::new();
    if let Some(threads) = args.threads {
        hyperparameters = hyperparameters.num_threads(threads);
    }

    let start = Instant::now();
    let model = hyperparameters.fit(train.to_index())?;
    let accuracy = accuracy_score(&model, &test)?;

    info!(elapsed = ?start.elapsed(), "Evaluation finished");
    println!("{}", serde_json::to_string_pretty(&accuracy)?);

    Ok(())
}
