use futures::StreamExt;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::{sync::mpsc, task};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    session::{ResponseObserver, SessionFactory},
    store::DataStore,
    types::{HarvestError, WinnerDetailResult, WinnerEntry, YearIndexResult, YearRecord},
    utils::{classify_listing_response, is_detail_response, node_url, year_url},
};

pub struct Crawler {
    sessions: Arc<dyn SessionFactory>,
    store: DataStore,
    base_url: String,
    // 0 lets every winner of a year load at once
    concurrent_tabs: usize,
}

impl Crawler {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        store: DataStore,
        base_url: &str,
        concurrent_tabs: usize,
    ) -> Crawler {
        Crawler {
            sessions,
            store,
            base_url: base_url.trim_end_matches('/').into(),
            concurrent_tabs,
        }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Loads the listing page of `year` and returns whatever listings were
    /// captured. Page failures are logged and yield a partial record.
    pub async fn fetch_year(&self, year: u16) -> YearRecord {
        let sessions = self.sessions.clone();
        let url = year_url(&self.base_url, year);

        match task::spawn_blocking(move || Self::capture_listings(sessions, &url)).await {
            Ok(record) => record,
            Err(e) => {
                error!("problem spawning a blocking thread for {} {}", year, e);
                YearRecord::default()
            }
        }
    }

    pub async fn crawl_years(
        &self,
        years: impl IntoIterator<Item = u16>,
        should_terminate: Arc<AtomicBool>,
    ) -> anyhow::Result<YearIndexResult> {
        let mut result = YearIndexResult::default();

        for year in years {
            if should_terminate.load(Ordering::Relaxed) {
                warn!("year index crawl terminated before {}", year);
                break;
            }
            info!("{}", year);
            let record = self.fetch_year(year).await;
            if !record.is_complete() {
                debug!("year {} is incomplete {:?}", year, record);
                result.incomplete.push(year);
            }
            result.written.push(self.store.write_year(year, &record).await?);
        }

        info!(
            "year index crawl wrote {} files, {} incomplete",
            result.written.len(),
            result.incomplete.len()
        );
        Ok(result)
    }

    /// Fetches the detail document of every winner listed in the year file
    /// of `year`. Winners whose page fails contribute nothing.
    pub async fn fetch_winners(&self, year: u16) -> anyhow::Result<Vec<String>> {
        let record = self.store.read_year(year).await?;
        let winners = record.winners.ok_or(HarvestError::MissingWinners(year))?;
        let winners = WinnerEntry::parse_list(year, &winners)?;
        debug!("{} winners listed for {}", winners.len(), year);

        let (body_tx, mut body_rx) = mpsc::unbounded_channel::<String>();
        let active_tabs = Arc::new(AtomicUsize::new(0));

        futures::stream::iter(winners)
            .for_each_concurrent(self.concurrent_tabs, |winner| {
                let sessions = self.sessions.clone();
                let body_tx = body_tx.clone();
                let url = node_url(&self.base_url, &winner.nid.to_string());
                let at = active_tabs.clone();

                async move {
                    let nid = winner.nid.to_string();
                    info!("winner {} {}", nid, winner.title().unwrap_or_default());
                    at.fetch_add(1, Ordering::SeqCst);
                    debug!("{} tabs active", at.load(Ordering::SeqCst));

                    let fetched = task::spawn_blocking(move || {
                        Self::capture_detail(sessions, &nid, &url, body_tx)
                    })
                    .await;
                    if let Err(e) = fetched {
                        error!("problem spawning a blocking thread {}", e);
                    }
                    at.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        drop(body_tx);
        // observers of sessions that failed to close may still hold a sender
        body_rx.close();
        Ok(UnboundedReceiverStream::new(body_rx)
            .collect::<Vec<String>>()
            .await)
    }

    pub async fn crawl_winners(
        &self,
        years: impl IntoIterator<Item = u16>,
        should_terminate: Arc<AtomicBool>,
    ) -> anyhow::Result<WinnerDetailResult> {
        let mut result = WinnerDetailResult::default();

        for year in years {
            if should_terminate.load(Ordering::Relaxed) {
                warn!("winner crawl terminated before {}", year);
                break;
            }
            info!("winners of {}", year);
            let records = self.fetch_winners(year).await?;
            result.records += records.len();
            result.written.push(self.store.write_winners(year, &records).await?);
        }

        info!(
            "winner crawl wrote {} files with {} records",
            result.written.len(),
            result.records
        );
        Ok(result)
    }

    fn capture_listings(sessions: Arc<dyn SessionFactory>, url: &str) -> YearRecord {
        let record = Arc::new(Mutex::new(YearRecord::default()));

        let mut session = match sessions.open() {
            Ok(s) => s,
            Err(e) => {
                error!("could not open a page for {} {:#}", url, e);
                return YearRecord::default();
            }
        };

        let bucket = record.clone();
        let observer: ResponseObserver = Box::new(
            move |response_url: &str, body: &dyn Fn() -> anyhow::Result<String>| {
                let kind = match classify_listing_response(response_url) {
                    Some(kind) => kind,
                    None => return,
                };
                info!("{}", response_url);
                match body() {
                    Ok(text) => {
                        if let Ok(mut record) = bucket.lock() {
                            record.set(kind, text);
                        }
                    }
                    Err(e) => warn!("could not read body of {} {:#}", response_url, e),
                }
            },
        );

        let browsed = session
            .observe_responses(observer)
            .and_then(|_| session.navigate_until_idle(url));
        if let Err(e) = browsed {
            error!("error browsing {} {:#}", url, e);
        }
        if let Err(e) = session.close() {
            warn!("could not close page for {} {:#}", url, e);
        }

        let captured = record.lock().map(|r| r.clone()).unwrap_or_default();
        captured
    }

    fn capture_detail(
        sessions: Arc<dyn SessionFactory>,
        nid: &str,
        url: &str,
        body_tx: mpsc::UnboundedSender<String>,
    ) {
        let mut session = match sessions.open() {
            Ok(s) => s,
            Err(e) => {
                error!("could not open a page for {} {:#}", url, e);
                return;
            }
        };

        let target = nid.to_string();
        let observer: ResponseObserver = Box::new(
            move |response_url: &str, body: &dyn Fn() -> anyhow::Result<String>| {
                if !is_detail_response(response_url, &target) {
                    return;
                }
                info!("{}", response_url);
                match body() {
                    Ok(text) => {
                        if body_tx.send(text).is_err() {
                            warn!("detail of {} arrived after its year was written", target);
                        }
                    }
                    Err(e) => warn!("could not read body of {} {:#}", response_url, e),
                }
            },
        );

        let browsed = session
            .observe_responses(observer)
            .and_then(|_| session.navigate_until_idle(url));
        if let Err(e) = browsed {
            error!("error browsing {} {:#}", url, e);
        }
        if let Err(e) = session.close() {
            warn!("could not close page for {} {:#}", url, e);
        }
    }
}
