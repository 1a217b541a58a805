use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::wait::Wait;
use crate::browser::{Browser, By};
use crate::config::{DOCUMENT_BASE_URL, LINK_CLASS};

static WINDOW_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\.open\('([^']*)'").unwrap());

const DOSSIER_LABEL: &str = "Numéro du dossier : ";
const COMMITTEE_LABEL: &str = "Comité technique national : ";
const COMPANY_LABEL: &str = "Code entreprise : ";
const EQUIPMENT_LABEL: &str = "Matériel en cause : ";
const SUMMARY_LABEL: &str = "Résumé de ";

/// Shorter `window.open` targets are decorative links, not documents.
const MIN_DOCUMENT_PATH_CHARS: usize = 10;

/// Fields read from one accident detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub numero_dossier: Option<String>,
    pub comite: Option<String>,
    pub code_entreprise: Option<String>,
    pub materiel: Option<String>,
    pub resume: Option<String>,
    pub documents: Vec<String>,
}

impl DetailRecord {
    pub fn missing_fields(&self) -> usize {
        [
            &self.numero_dossier,
            &self.comite,
            &self.code_entreprise,
            &self.materiel,
            &self.resume,
        ]
        .iter()
        .filter(|f| f.is_none())
        .count()
    }
}

/// XPath of the cell following the `td` labelled `label`. The page pads
/// labels with non-breaking spaces, so those are folded before matching.
pub fn label_xpath(label: &str) -> String {
    format!(
        "//td[contains(translate(., '\u{a0}', ' '), '{}')]/following-sibling::td[1]",
        label.replace('\u{a0}', " ")
    )
}

pub fn summary_xpath(label: &str) -> String {
    format!("{}//div", label_xpath(label))
}

/// Relative document path embedded in an `onclick` handler.
pub fn document_path(onclick: &str) -> Option<&str> {
    let inner = WINDOW_OPEN_RE.captures(onclick)?.get(1)?.as_str();
    (inner.chars().count() > MIN_DOCUMENT_PATH_CHARS).then(|| inner.trim())
}

pub fn flatten_lines(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Visit one record and read its labelled fields and document links.
///
/// A label that is not on the page leaves its field empty, unless `strict`
/// is set, in which case the whole record fails. Session errors always fail.
pub async fn extract_record<B: Browser>(
    browser: &mut B,
    reference: &str,
    wait: &Wait,
    strict: bool,
) -> Result<DetailRecord> {
    browser
        .navigate(reference)
        .await
        .with_context(|| format!("Cannot open {reference}"))?;

    // The dossier number is the first thing rendered; wait for it.
    let dossier_by = By::XPath(label_xpath(DOSSIER_LABEL));
    let dossier = match wait.find(browser, &dossier_by).await {
        Ok(cell) => Some(browser.text(&cell).await?.trim().to_string()),
        Err(e) if e.is_not_found() && !strict => {
            warn!(reference, label = DOSSIER_LABEL, "Label not found");
            None
        }
        Err(e) => return Err(e).context(format!("{DOSSIER_LABEL:?} on {reference}")),
    };

    let mut record = DetailRecord {
        numero_dossier: dossier,
        comite: labelled_text(browser, reference, COMMITTEE_LABEL, strict).await?,
        code_entreprise: labelled_text(browser, reference, COMPANY_LABEL, strict).await?,
        materiel: labelled_text(browser, reference, EQUIPMENT_LABEL, strict).await?,
        resume: None,
        documents: Vec::new(),
    };

    let summary_by = By::XPath(summary_xpath(SUMMARY_LABEL));
    record.resume = read_optional(browser, reference, SUMMARY_LABEL, &summary_by, strict)
        .await?
        .map(|text| flatten_lines(&text));
    record.documents = document_links(browser).await?;

    debug!(reference, documents = record.documents.len(), "Extracted record");
    Ok(record)
}

async fn labelled_text<B: Browser>(
    browser: &mut B,
    reference: &str,
    label: &str,
    strict: bool,
) -> Result<Option<String>> {
    let by = By::XPath(label_xpath(label));
    Ok(read_optional(browser, reference, label, &by, strict)
        .await?
        .map(|text| text.trim().to_string()))
}

async fn read_optional<B: Browser>(
    browser: &mut B,
    reference: &str,
    label: &str,
    by: &By,
    strict: bool,
) -> Result<Option<String>> {
    match browser.find(by).await {
        Ok(cell) => Ok(Some(browser.text(&cell).await?)),
        Err(e) if e.is_not_found() && !strict => {
            warn!(reference, label, "Label not found");
            Ok(None)
        }
        Err(e) => Err(e).context(format!("{label:?} on {reference}")),
    }
}

async fn document_links<B: Browser>(browser: &mut B) -> Result<Vec<String>> {
    let links = browser.find_all(&By::ClassName(LINK_CLASS.into())).await?;
    let mut documents = Vec::new();
    for link in &links {
        let Some(onclick) = browser.attribute(link, "onclick").await? else {
            continue;
        };
        if let Some(path) = document_path(&onclick) {
            documents.push(format!("{DOCUMENT_BASE_URL}{}", path.trim_start_matches('/')));
        }
    }
    Ok(documents)
}
