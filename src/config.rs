use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config, Environment};
use serde::Deserialize;

use crate::browser::wait::Wait;

// ── Source site ──

pub const SEARCH_URL: &str = "https://www.inrs.fr/publications/bdd/epicea/recherche.html";
pub const DOCUMENT_BASE_URL: &str = "https://epicea.inrs.fr/";
pub const COOKIE_BUTTON_ID: &str = "onetrust-accept-btn-handler";
pub const SEARCH_FRAME: &str = "siteExterneIframe";
pub const SEARCH_BUTTON_XPATH: &str = r#"//img[@src="/EPICEA/epicea.nsf/Rechercher.jpg"]"#;
pub const DISPLAY_LIST_TEXT: &str = "afficher la liste";
pub const LAST_PAGE_TEXT: &str = ">>";
pub const NEXT_PAGE_TEXT: &str = ">";
pub const LINK_CLASS: &str = "lien";
pub const REFERENCE_MARKER: &str = "unid";

// ── Datasets ──

pub const REFERENCES_FILE: &str = "Accident_IDs.csv";
pub const RESULTS_FILE: &str = "Accident_database.csv";
pub const CLASSIFIED_FILE: &str = "Accident_classification.csv";

/// Runtime settings: built-in defaults, then `EPICEA_*` environment
/// variables, then command-line overrides applied by `main`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub webdriver_url: String,
    pub browser: String,
    pub headless: bool,
    pub record_delay_ms: u64,
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub classifier_url: String,
    pub classifier_model: String,
    pub classifier_delay_ms: u64,
    #[serde(default)]
    pub classifier_api_key: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(Environment::with_prefix("EPICEA").try_parsing(true))
    }

    fn load_from(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("data_dir", "data")?
            .set_default("webdriver_url", "http://localhost:9515")?
            .set_default("browser", "chrome")?
            .set_default("headless", true)?
            .set_default("record_delay_ms", 1500_i64)?
            .set_default("wait_timeout_ms", 10_000_i64)?
            .set_default("poll_interval_ms", 250_i64)?
            .set_default("classifier_url", "https://api.openai.com/v1")?
            .set_default("classifier_model", "gpt-4o-mini")?
            .set_default("classifier_delay_ms", 0_i64)?
            .add_source(env)
            .build()?
            .try_deserialize()
            .context("Invalid EPICEA_* settings")
    }

    pub fn wait(&self) -> Wait {
        Wait::new(
            Duration::from_millis(self.wait_timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }

    pub fn classifier_delay(&self) -> Duration {
        Duration::from_millis(self.classifier_delay_ms)
    }

    pub fn references_path(&self) -> PathBuf {
        self.data_dir.join(REFERENCES_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join(RESULTS_FILE)
    }

    pub fn classified_path(&self) -> PathBuf {
        self.data_dir.join(CLASSIFIED_FILE)
    }
}
