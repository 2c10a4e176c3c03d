use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{debug, info};
use prize_harvester::{
    runner::{Runner, RunnerOptions},
    utils::{BASE_URL, DATA_DIR, FIRST_YEAR, LAST_WINNER_YEAR, LAST_YEAR},
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Pulitzer prize winner harvester", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Directory the year and winner files are written to
    #[arg(short = 'd', long, default_value = DATA_DIR)]
    data_dir: PathBuf,
    /// Site the year and node pages are loaded from
    #[arg(long, default_value_t = BASE_URL.to_string())]
    base_url: String,
    /// First year to crawl
    #[arg(long, default_value_t = FIRST_YEAR)]
    first_year: u16,
    /// Last year of the year index crawl
    #[arg(long, default_value_t = LAST_YEAR)]
    last_year: u16,
    /// Year the winner crawl starts from, walking down to the first year
    #[arg(long, default_value_t = LAST_WINNER_YEAR)]
    last_winner_year: u16,
    /// Total number of winner pages open at once, 0 for no limit
    #[arg(short = 't', long, default_value_t = 10)]
    concurrent_tabs: usize,
    /// Maximum time in seconds a page may take to reach network idle
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,
    /// Maximum time the browser will wait for an event before timing out
    #[arg(long, default_value_t = 120)]
    browser_timeout: u64,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Capture the finalist and winner listings of every year
    Years,
    /// Capture the detail record of every winner, using the year files
    Winners,
    /// Run the year crawl, then the winner crawl
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    if let Ok(env) = std::env::var("RUST_LOG") {
        if env == "debug" {
            println!("{number:/>width$}", number = "", width = 20);
            println!("{}", "Debug mode enabled");
            println!("{number:/>width$}", number = "", width = 20);
            println!();
        }
    }

    debug!("Starting harvester with {:#?}", args.clone());

    let options = RunnerOptions::default_builder()
        .data_dir(args.data_dir)
        .base_url(args.base_url)
        .first_year(args.first_year)
        .last_year(args.last_year)
        .last_winner_year(args.last_winner_year)
        .concurrent_tabs(args.concurrent_tabs)
        .idle_timeout(args.idle_timeout)
        .browser_timeout(args.browser_timeout)
        .build()?;

    let runner = Runner::new(options).await?;

    match args.command {
        Command::Years => {
            let res = runner.run_year_index().await?;
            info!("incomplete years: {:?}", res.incomplete);
        }
        Command::Winners => {
            let res = runner.run_winner_details().await?;
            info!("{} winner records captured", res.records);
        }
        Command::All => {
            let (years, winners) = runner.run_all().await?;
            info!(
                "incomplete years: {:?}, {} winner records captured",
                years.incomplete, winners.records
            );
        }
    }

    Ok(())
}
