extern crate clap;
extern crate failure;
extern crate serde_json;
extern crate slope_one;
extern crate tracing;
extern crate tracing_subscriber;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use slope_one::data::RatingIndex;
use slope_one::datasets::load_movielens;
use slope_one::models::slope_one::Hyperparameters;

#[derive(Parser)]
#[command(name = "recommend")]
#[command(about = "Recommend unrated items to a user with Slope One")]
struct Args {
    /// MovieLens-style ratings.csv
    #[arg(short, long)]
    ratings: PathBuf,

    /// User to recommend for
    #[arg(short, long)]
    user: String,

    /// Number of recommendations
    #[arg(short, long, default_value = "5")]
    num: usize,

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

    let index = RatingIndex::build(load_movielens(&args.ratings)?)?;

    let mut hyperparameters = Hyperparameters::new();
    if let Some(threads) = args.threads {
        hyperparameters = hyperparameters.num_threads(threads);
    }

    let model = hyperparameters.fit(index)?;
    let recommendations = model.recommend(&args.user, args.num)?;

    info!(user = %args.user, "Recommendations ready");
    println!("{}", serde_json::to_string_pretty(&recommendations)?);

    Ok(())
}
