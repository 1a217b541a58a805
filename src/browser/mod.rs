//! Browser-automation capability consumed by the harvester and extractor.

#[cfg(test)]
pub mod mock;
pub mod wait;
pub mod webdriver;

use std::fmt;

use thiserror::Error;
use tracing::warn;

/// Element locator strategies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum By {
    Id(String),
    XPath(String),
    LinkText(String),
    ClassName(String),
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            By::Id(v) => write!(f, "id={v}"),
            By::XPath(v) => write!(f, "xpath={v}"),
            By::LinkText(v) => write!(f, "link text={v}"),
            By::ClassName(v) => write!(f, "class={v}"),
        }
    }
}

/// Opaque handle to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no element matches {0}")]
    NoSuchElement(By),
    #[error("no frame named {0:?}")]
    NoSuchFrame(String),
    #[error("webdriver {kind}: {message}")]
    Driver { kind: String, message: String },
    #[error("webdriver transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Element or frame lookup failed, as opposed to the session failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BrowserError::NoSuchElement(_) | BrowserError::NoSuchFrame(_))
    }

    /// The page changed under a handle that was read before.
    pub fn is_stale(&self) -> bool {
        matches!(self, BrowserError::Driver { kind, .. } if kind == "stale element reference")
    }
}

/// One browser session driving one page at a time.
pub trait Browser {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn find(&mut self, by: &By) -> Result<ElementRef, BrowserError>;
    async fn find_all(&mut self, by: &By) -> Result<Vec<ElementRef>, BrowserError>;
    async fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError>;
    async fn attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;
    async fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError>;
    async fn switch_to_frame(&mut self, name: &str) -> Result<(), BrowserError>;
    async fn quit(&mut self) -> Result<(), BrowserError>;
}

/// Close the session and hand back the outcome of the work done with it.
/// A failing quit is logged and never replaces the outcome.
pub async fn release<B: Browser, T>(browser: &mut B, outcome: anyhow::Result<T>) -> anyhow::Result<T> {
    if let Err(e) = browser.quit().await {
        warn!(error = %e, "Failed to close browser session");
    }
    outcome
}
