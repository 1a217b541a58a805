use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::browser::wait::Wait;
use crate::browser::{Browser, BrowserError, By};
use crate::config::{
    COOKIE_BUTTON_ID, DISPLAY_LIST_TEXT, LAST_PAGE_TEXT, LINK_CLASS, NEXT_PAGE_TEXT,
    REFERENCE_MARKER, SEARCH_BUTTON_XPATH, SEARCH_FRAME, SEARCH_URL,
};

/// Walk the whole result listing and return every record reference once.
pub async fn harvest_references<B: Browser>(browser: &mut B, wait: &Wait) -> Result<BTreeSet<String>> {
    open_listing(browser, wait).await?;
    let total = total_pages(browser, wait).await?;
    info!("Listing has {} pages", total);
    collect_references(browser, wait, total).await
}

/// Search page → cookie banner → search frame → full list view.
async fn open_listing<B: Browser>(browser: &mut B, wait: &Wait) -> Result<()> {
    browser
        .navigate(SEARCH_URL)
        .await
        .context("Failed to open search page")?;

    let cookies = wait
        .find(browser, &By::Id(COOKIE_BUTTON_ID.into()))
        .await
        .context("Cookie banner not found")?;
    browser.click(&cookies).await?;

    wait.switch_to_frame(browser, SEARCH_FRAME)
        .await
        .context("Search frame not found")?;
    let search = wait
        .find(browser, &By::XPath(SEARCH_BUTTON_XPATH.into()))
        .await
        .context("Search button not found")?;
    browser.click(&search).await?;

    let display = wait
        .find(browser, &By::LinkText(DISPLAY_LIST_TEXT.into()))
        .await
        .context("List view link not found")?;
    browser.click(&display).await?;
    Ok(())
}

/// Page count from the last-page control. There is no fallback.
pub async fn total_pages<B: Browser>(browser: &mut B, wait: &Wait) -> Result<usize> {
    let last = wait
        .find(browser, &By::LinkText(LAST_PAGE_TEXT.into()))
        .await
        .context("Last-page control not found")?;
    let href = browser
        .attribute(&last, "href")
        .await?
        .ok_or_else(|| anyhow!("Last-page control has no href"))?;
    parse_page_number(&href).ok_or_else(|| anyhow!("Cannot read page count from {href:?}"))
}

/// Page number quoted in a pager href such as `javascript:goPage('57')`.
pub fn parse_page_number(href: &str) -> Option<usize> {
    href.split('\'').nth(1)?.trim().parse().ok()
}

async fn collect_references<B: Browser>(
    browser: &mut B,
    wait: &Wait,
    total: usize,
) -> Result<BTreeSet<String>> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut seen = Vec::new();
    let mut current = wait_for_links(browser, wait, &[]).await?;

    for page in 1..=total {
        seen.extend(current.iter().cloned());
        pb.inc(1);

        if page < total {
            let next = wait
                .find(browser, &By::LinkText(NEXT_PAGE_TEXT.into()))
                .await
                .with_context(|| format!("Next-page control missing on page {page}"))?;
            browser.click(&next).await?;
            current = wait_for_links(browser, wait, &current).await?;
        }
    }
    pb.finish_and_clear();

    let raw = seen.len();
    let references: BTreeSet<String> = seen.into_iter().collect();
    info!(raw, distinct = references.len(), "Harvested references");
    Ok(references)
}

/// Read the page's references once they differ from `previous`, i.e. once
/// the next page has replaced the old one. Reads anyway when the budget
/// runs out; stale duplicates are dropped by the caller's set.
async fn wait_for_links<B: Browser>(browser: &mut B, wait: &Wait, previous: &[String]) -> Result<Vec<String>> {
    let deadline = wait.start();
    loop {
        match page_references(browser).await {
            Ok(links) if links.as_slice() != previous => return Ok(links),
            Ok(links) if deadline.expired() => {
                warn!(links = links.len(), "Page content unchanged after waiting");
                return Ok(links);
            }
            Err(e) if !e.is_stale() || deadline.expired() => return Err(e.into()),
            _ => deadline.pause().await,
        }
    }
}

async fn page_references<B: Browser>(browser: &mut B) -> Result<Vec<String>, BrowserError> {
    let links = browser.find_all(&By::ClassName(LINK_CLASS.into())).await?;
    let mut references = Vec::new();
    for link in &links {
        if let Some(href) = browser.attribute(link, "href").await? {
            if href.contains(REFERENCE_MARKER) {
                references.push(href);
            }
        }
    }
    Ok(references)
}
