use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
};

use anyhow::Context;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    SigId,
};

use crate::{
    browser_controller::BrowserController,
    crawler::Crawler,
    session::SessionFactory,
    store::DataStore,
    types::{WinnerDetailResult, YearIndexResult},
    utils::{BASE_URL, DATA_DIR, FIRST_YEAR, LAST_WINNER_YEAR, LAST_YEAR},
};

pub struct Runner {
    crawler: Crawler,
    options: RunnerOptions,
    should_terminate: Arc<AtomicBool>,
    signals: Vec<SigId>,
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct RunnerOptions {
    // directory receiving <year>.json and winners-<year>.json
    #[builder(default = "self.default_data_dir()")]
    data_dir: PathBuf,
    #[builder(default = "self.default_base_url()")]
    base_url: String,
    // first and last year of the year index crawl, inclusive
    #[builder(default = "FIRST_YEAR")]
    first_year: u16,
    #[builder(default = "LAST_YEAR")]
    last_year: u16,
    // the winner crawl walks from here down to first_year
    #[builder(default = "LAST_WINNER_YEAR")]
    last_winner_year: u16,
    // maximum number of detail pages open at once, 0 for no limit
    #[builder(default = "10")]
    concurrent_tabs: usize,
    // seconds a page may take to reach network idle
    #[builder(default = "30")]
    idle_timeout: u64,
    // seconds the browser may stay silent before it is considered dead
    #[builder(default = "120")]
    browser_timeout: u64,
    #[builder(default = "self.default_sandbox()")]
    sandbox: bool,
}

impl RunnerOptions {
    pub fn default_builder() -> RunnerOptionsBuilder {
        RunnerOptionsBuilder::default()
    }

    pub fn years(&self) -> impl Iterator<Item = u16> {
        self.first_year..=self.last_year
    }

    pub fn winner_years(&self) -> impl Iterator<Item = u16> {
        (self.first_year..=self.last_winner_year).rev()
    }
}

impl RunnerOptionsBuilder {
    fn default_data_dir(&self) -> PathBuf {
        PathBuf::from(DATA_DIR)
    }
    fn default_base_url(&self) -> String {
        BASE_URL.clone()
    }
    fn default_sandbox(&self) -> bool {
        std::env::var("IN_DOCKER").is_err()
    }
}

impl Runner {
    /// Launches headless Chrome and prepares the data directory.
    pub async fn new(options: RunnerOptions) -> anyhow::Result<Self> {
        let (browser_timeout, idle_timeout, sandbox) =
            (options.browser_timeout, options.idle_timeout, options.sandbox);
        let browser = tokio::task::spawn_blocking(move || {
            BrowserController::new(browser_timeout, idle_timeout, sandbox)
        })
        .await?
        .context("could not start browser")?;

        Self::with_sessions(options, Arc::new(browser)).await
    }

    pub async fn with_sessions(
        options: RunnerOptions,
        sessions: Arc<dyn SessionFactory>,
    ) -> anyhow::Result<Self> {
        let store = DataStore::open(&options.data_dir).await?;
        let crawler = Crawler::new(sessions, store, &options.base_url, options.concurrent_tabs);

        let should_terminate = Arc::new(AtomicBool::new(false));
        let signals = vec![
            signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?,
            signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?,
        ];

        Ok(Runner {
            crawler,
            options,
            should_terminate,
            signals,
        })
    }

    pub fn terminate(&self) {
        self.should_terminate.store(true, Ordering::Relaxed);
    }

    pub async fn run_year_index(&self) -> anyhow::Result<YearIndexResult> {
        info!(
            "initializing year index crawl of {}..={} into {:?}",
            self.options.first_year,
            self.options.last_year,
            self.crawler.store().dir()
        );
        self.crawler
            .crawl_years(self.options.years(), self.should_terminate.clone())
            .await
    }

    pub async fn run_winner_details(&self) -> anyhow::Result<WinnerDetailResult> {
        info!(
            "initializing winner crawl of {}..={} with {} tabs",
            self.options.last_winner_year, self.options.first_year, self.options.concurrent_tabs
        );
        self.crawler
            .crawl_winners(self.options.winner_years(), self.should_terminate.clone())
            .await
    }

    pub async fn run_all(&self) -> anyhow::Result<(YearIndexResult, WinnerDetailResult)> {
        let years = self.run_year_index().await?;

        if self.should_terminate.load(Ordering::Relaxed) {
            return Ok((years, WinnerDetailResult::default()));
        }
        let winners = self.run_winner_details().await?;

        Ok((years, winners))
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        debug!("{}", "terminating runner...");
        for id in self.signals.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
