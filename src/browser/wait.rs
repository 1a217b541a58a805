use std::time::{Duration, Instant};

use super::{Browser, BrowserError, By, ElementRef};

/// Bounded poll budget used in place of fixed sleeps.
#[derive(Debug, Clone, Copy)]
pub struct Wait {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Wait {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn start(&self) -> Deadline {
        Deadline {
            at: Instant::now() + self.timeout,
            interval: self.interval,
        }
    }

    /// Poll until `by` matches an element. Reports `NoSuchElement` once the
    /// budget is spent; any other error is returned immediately.
    pub async fn find<B: Browser>(&self, browser: &mut B, by: &By) -> Result<ElementRef, BrowserError> {
        let deadline = self.start();
        loop {
            match browser.find(by).await {
                Err(e) if e.is_not_found() && !deadline.expired() => deadline.pause().await,
                other => return other,
            }
        }
    }

    pub async fn switch_to_frame<B: Browser>(&self, browser: &mut B, name: &str) -> Result<(), BrowserError> {
        let deadline = self.start();
        loop {
            match browser.switch_to_frame(name).await {
                Err(e) if e.is_not_found() && !deadline.expired() => deadline.pause().await,
                other => return other,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    interval: Duration,
}

impl Deadline {
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub async fn pause(&self) {
        tokio::time::sleep(self.interval).await;
    }
}
