use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use headless_chrome::browser::tab::EventListener;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::Tab;
use headless_chrome::{browser::default_executable, Browser, LaunchOptions};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

use crate::session::{IdleWatch, PageSession, ResponseObserver, SessionFactory};
use crate::types::HarvestError;

type Listener = Weak<dyn EventListener<Event> + Send + Sync>;

pub struct BrowserController {
    browser: Browser,
    idle_timeout: Duration,
}

impl BrowserController {
    pub fn new(browser_timeout: u64, idle_timeout: u64, sandbox: bool) -> Result<Self> {
        let path = default_executable().map_err(HarvestError::BrowserLaunch)?;
        let options = LaunchOptions::default_builder()
            .path(Some(path))
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(browser_timeout))
            // warning only disable this in a docker env
            .sandbox(sandbox)
            .build()
            .map_err(|e| HarvestError::BrowserLaunch(e.to_string()))?;
        let browser = Browser::new(options).context("browser launching error")?;

        Ok(BrowserController {
            browser,
            idle_timeout: Duration::from_secs(idle_timeout),
        })
    }

    pub fn kill(&self) -> bool {
        let pid = match self.browser.get_process_id() {
            Some(pid) => Pid::from_u32(pid),
            None => return false,
        };
        let mut s = System::new();
        if !s.refresh_process(pid) {
            return false;
        }
        if let Some(process) = s.process(pid) {
            debug!("killing process with id {}", pid);
            return process.kill();
        }
        false
    }
}

impl SessionFactory for BrowserController {
    fn open(&self) -> Result<Box<dyn PageSession>> {
        let tab = self.browser.new_tab().context("could not create new tab")?;
        tab.set_default_timeout(self.idle_timeout);
        tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })
            .context("could not enable lifecycle events")?;

        Ok(Box::new(ChromeSession {
            tab,
            idle_timeout: self.idle_timeout,
            observers: Arc::new(Mutex::new(vec![])),
            network_listener: None,
            closed: false,
        }))
    }
}

impl Drop for BrowserController {
    fn drop(&mut self) {
        debug!("killing browser process...");
        self.kill();
    }
}

/// A single Chrome tab. Response observers live in the tab's event listener
/// and are dropped together with it.
pub struct ChromeSession {
    tab: Arc<Tab>,
    idle_timeout: Duration,
    observers: Arc<Mutex<Vec<ResponseObserver>>>,
    network_listener: Option<Listener>,
    closed: bool,
}

impl ChromeSession {
    fn listen_to_network(&mut self) -> Result<()> {
        self.tab
            .call_method(Network::Enable {
                max_total_buffer_size: None,
                max_resource_buffer_size: None,
                max_post_data_size: None,
            })
            .context("could not enable network events")?;

        let observers = self.observers.clone();
        let tab = Arc::downgrade(&self.tab);
        // request id -> url of responses whose body is still loading
        let loading: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());

        let listener = self.tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::NetworkResponseReceived(received) => {
                if let Ok(mut loading) = loading.lock() {
                    loading.insert(
                        received.params.request_id.clone(),
                        received.params.response.url.clone(),
                    );
                }
            }
            Event::NetworkLoadingFailed(failed) => {
                if let Ok(mut loading) = loading.lock() {
                    loading.remove(&failed.params.request_id);
                }
            }
            Event::NetworkLoadingFinished(finished) => {
                let request_id = finished.params.request_id.clone();
                let url = match loading.lock() {
                    Ok(mut loading) => loading.remove(&request_id),
                    Err(_) => None,
                };
                let url = match url {
                    Some(url) => url,
                    None => return,
                };
                let fetch_body = || response_body(&tab, &request_id);
                if let Ok(observers) = observers.lock() {
                    for observer in observers.iter() {
                        observer(url.as_str(), &fetch_body);
                    }
                }
            }
            _ => {}
        }))?;

        self.network_listener = Some(listener);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(listener) = self.network_listener.take() {
            if let Err(e) = self.tab.remove_event_listener(&listener) {
                warn!("could not remove network listener {}", e);
            }
        }
        if let Ok(mut observers) = self.observers.lock() {
            observers.clear();
        }
        self.tab.close(true).context("could not close tab")?;
        Ok(())
    }
}

impl PageSession for ChromeSession {
    fn observe_responses(&mut self, observer: ResponseObserver) -> Result<()> {
        if self.network_listener.is_none() {
            self.listen_to_network()?;
        }
        self.observers
            .lock()
            .map_err(|_| anyhow!("response observers poisoned"))?
            .push(observer);
        Ok(())
    }

    fn navigate_until_idle(&mut self, url: &str) -> Result<()> {
        let (tx, rx) = mpsc::channel::<String>();
        let tx = Mutex::new(tx);
        let main_frame = self.tab.get_target_id().clone();

        let lifecycle = self.tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::PageLifecycleEvent(lifecycle) = event {
                if lifecycle.params.frame_id == main_frame {
                    if let Ok(tx) = tx.lock() {
                        let _ = tx.send(lifecycle.params.name.clone());
                    }
                }
            }
        }))?;

        let navigated = self
            .tab
            .navigate_to(url)
            .map(|_| ())
            .and_then(|_| IdleWatch::new().wait(&rx, self.idle_timeout))
            .context(format!("could not navigate to {}", url));

        if let Err(e) = self.tab.remove_event_listener(&lifecycle) {
            warn!("could not remove lifecycle listener for {} {}", url, e);
        }
        navigated
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("tab already gone {}", e);
        }
    }
}

fn response_body(tab: &Weak<Tab>, request_id: &str) -> Result<String> {
    let tab = tab.upgrade().ok_or_else(|| anyhow!("tab closed before body was read"))?;
    let response = tab.call_method(Network::GetResponseBody {
        request_id: request_id.to_string(),
    })?;
    if response.base_64_encoded {
        let bytes = STANDARD
            .decode(&response.body)
            .context(format!("invalid base64 body for request {}", request_id))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Ok(response.body)
    }
}
