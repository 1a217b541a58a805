use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Settings;
use crate::content::{normalize, repair};
use crate::store::{self, ClassifiedRow, ResultRow};

const SYSTEM_PROMPT: &str = "Tu analyses des résumés d'accidents du travail. \
Réponds uniquement par un objet JSON avec les clés suivantes : \
Metier (métier de la victime), Sexe, Age, Type_accident, Blessure, \
Deces (booléen), Circulation (booléen), Malaise (booléen), Suicide (booléen), \
Machine, Cause, Zone (partie du corps touchée). \
Utilise null quand l'information n'est pas présente dans le texte.";

/// Turns an accident narrative into a structured-content payload.
pub trait NarrativeClassifier {
    async fn classify(&self, narrative: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatClassifier {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatClassifier {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .classifier_api_key
            .clone()
            .ok_or_else(|| anyhow!("EPICEA_CLASSIFIER_API_KEY environment variable must be set"))?;
        Ok(Self {
            client: Client::new(),
            endpoint: format!("{}/chat/completions", settings.classifier_url.trim_end_matches('/')),
            model: settings.classifier_model.clone(),
            api_key,
        })
    }
}

impl NarrativeClassifier for ChatClassifier {
    async fn classify(&self, narrative: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": narrative },
            ],
        });
        let response: Value = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No content in classifier response"))
    }
}

#[derive(Debug)]
pub struct ClassifyStats {
    pub pending: usize,
    pub classified: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Rows with a summary that have no classification yet.
pub fn unclassified<'a>(results: &'a [ResultRow], done: &[ClassifiedRow]) -> Vec<&'a ResultRow> {
    let mut seen: HashSet<&str> = done.iter().map(|r| r.reference.as_str()).collect();
    results
        .iter()
        .filter(|r| r.resume.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .filter(|r| seen.insert(r.reference.as_str()))
        .collect()
}

/// Classify every pending summary, rewriting the dataset after each row.
/// Payloads that cannot be repaired are logged and skipped.
pub async fn classify_pending<C: NarrativeClassifier>(
    classifier: &C,
    results: &[ResultRow],
    classified_path: &Path,
    limit: Option<usize>,
    delay: Duration,
) -> Result<ClassifyStats> {
    let mut rows = store::load_classified(classified_path)?;
    let mut pending = unclassified(results, &rows);
    if let Some(n) = limit {
        pending.truncate(n);
    }
    info!(done = rows.len(), pending = pending.len(), "Planned classification");

    let mut stats = ClassifyStats {
        pending: pending.len(),
        classified: 0,
        rejected: 0,
        failed: 0,
    };

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (i, row) in pending.iter().enumerate() {
        pb.inc(1);
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let narrative = row.resume.as_deref().unwrap_or_default();

        let payload = match classifier.classify(narrative).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(reference = %row.reference, error = %e, "Classifier call failed");
                stats.failed += 1;
                continue;
            }
        };
        let Some(content) = repair::repair_payload(&payload) else {
            warn!(reference = %row.reference, "Unusable classification, skipping");
            stats.rejected += 1;
            continue;
        };

        rows.push(ClassifiedRow {
            reference: row.reference.clone(),
            fields: normalize::standardize(&content),
        });
        store::save_classified(classified_path, &rows)?;
        stats.classified += 1;
    }

    pb.finish_and_clear();
    Ok(stats)
}
