use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use anyhow::anyhow;

/// Called once for every response a page finishes receiving. The second
/// argument fetches the response body; observers only call it for urls they
/// are interested in.
pub type ResponseObserver =
    Box<dyn Fn(&str, &dyn Fn() -> anyhow::Result<String>) + Send + Sync>;

/// One browser page, owned by the task that opened it.
pub trait PageSession: Send {
    /// Subscribes `observer` to the responses of this page. The subscription
    /// ends when the session is closed.
    fn observe_responses(&mut self, observer: ResponseObserver) -> anyhow::Result<()>;

    /// Navigates to `url` and returns once the network went idle.
    fn navigate_until_idle(&mut self, url: &str) -> anyhow::Result<()>;

    fn close(self: Box<Self>) -> anyhow::Result<()>;
}

pub trait SessionFactory: Send + Sync {
    fn open(&self) -> anyhow::Result<Box<dyn PageSession>>;
}

/// Tracks the lifecycle events of a navigating frame. Events emitted before
/// the new document is initialised belong to the previous page and are
/// ignored.
#[derive(Debug, Default)]
pub struct IdleWatch {
    started: bool,
    idle: bool,
}

impl IdleWatch {
    pub fn new() -> Self {
        IdleWatch::default()
    }

    pub fn observe(&mut self, lifecycle_event: &str) -> bool {
        match lifecycle_event {
            "init" => {
                self.started = true;
                self.idle = false;
            }
            "networkIdle" if self.started => self.idle = true,
            _ => {}
        }
        self.idle
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Consumes lifecycle event names from `events` until the frame reports
    /// network idle or `timeout` elapses.
    pub fn wait(mut self, events: &Receiver<String>, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(name) => {
                    self.observe(&name);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(anyhow!(
                        "network did not go idle within {} seconds",
                        timeout.as_secs()
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("page stopped reporting lifecycle events"))
                }
            }
        }
        Ok(())
    }
}
