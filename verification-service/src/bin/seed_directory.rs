use anyhow::{bail, Context, Result};
use std::{env, fs::File};
use verification_service::{config::AppConfig, observability, seed, store};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: seed_directory <csv_file_path>");
    }
    let file_path = &args[1];

    let file = File::open(file_path).with_context(|| format!("opening {file_path}"))?;
    let entries = seed::parse_directory_csv(file)?;

    let cfg = AppConfig::load()?;
    let store = store::connect(&cfg).await?;
    let written = seed::seed_directory(store.as_ref(), &entries).await?;

    println!("upserted {written} directory entries from {file_path}");
    Ok(())
}
