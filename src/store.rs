//! Delimited-file datasets. Every save rewrites the whole file through a
//! sibling temp file and a rename, so readers never see a partial row.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::content::{NormalizedDict, EXPECTED_KEYS, ZONE_KEY};
use crate::extract::DetailRecord;

const REFERENCE_HEADER: &str = "Reference";
const DATASET_DELIMITER: u8 = b'|';

pub const RESULT_HEADERS: [&str; 7] = [
    "Ref",
    "Numero_dossier",
    "Comite",
    "Code_entreprise",
    "Materiel",
    "Resume",
    "Adresse_pdf",
];

// ── Reference list ──

pub fn save_references(path: &Path, references: &BTreeSet<String>) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record([REFERENCE_HEADER])?;
    for reference in references {
        wtr.write_record([reference])?;
    }
    write_atomic(path, &finish(wtr)?)
}

pub fn load_references(path: &Path) -> Result<Vec<String>> {
    let mut rdr = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Cannot read reference list {}", path.display()))?;
    let column = rdr
        .headers()?
        .iter()
        .position(|h| h == REFERENCE_HEADER)
        .ok_or_else(|| anyhow!("{} has no {REFERENCE_HEADER} column", path.display()))?;

    let mut references = Vec::new();
    for record in rdr.records() {
        if let Some(value) = record?.get(column).map(str::trim).filter(|v| !v.is_empty()) {
            references.push(value.to_string());
        }
    }
    Ok(references)
}

// ── Results dataset ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Ref")]
    pub reference: String,
    #[serde(rename = "Numero_dossier")]
    pub numero_dossier: Option<String>,
    #[serde(rename = "Comite")]
    pub comite: Option<String>,
    #[serde(rename = "Code_entreprise")]
    pub code_entreprise: Option<String>,
    #[serde(rename = "Materiel")]
    pub materiel: Option<String>,
    #[serde(rename = "Resume")]
    pub resume: Option<String>,
    #[serde(rename = "Adresse_pdf", with = "document_list")]
    pub documents: Vec<String>,
}

impl ResultRow {
    pub fn from_record(reference: String, record: DetailRecord) -> Self {
        Self {
            reference,
            numero_dossier: record.numero_dossier,
            comite: record.comite,
            code_entreprise: record.code_entreprise,
            materiel: record.materiel,
            resume: record.resume,
            documents: record.documents,
        }
    }
}

/// Load the results dataset. A missing file is an empty dataset.
pub fn load_results(path: &Path) -> Result<Vec<ResultRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = ReaderBuilder::new()
        .delimiter(DATASET_DELIMITER)
        .from_path(path)
        .with_context(|| format!("Cannot read results {}", path.display()))?;
    rdr.deserialize()
        .collect::<Result<Vec<ResultRow>, _>>()
        .with_context(|| format!("Malformed row in {}", path.display()))
}

pub fn save_results(path: &Path, rows: &[ResultRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(DATASET_DELIMITER)
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(RESULT_HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    write_atomic(path, &finish(wtr)?)
}

/// `Adresse_pdf` cell codec: a JSON array of URLs. Python list literals
/// such as `['a.pdf', 'b.pdf']` from older datasets are read too.
mod document_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(urls: &[String], s: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(urls).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let cell = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(parse(&cell))
    }

    pub fn parse(cell: &str) -> Vec<String> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Vec::new();
        }
        if let Ok(urls) = serde_json::from_str::<Vec<String>>(cell) {
            return urls;
        }
        cell.trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

// ── Classification dataset ──

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRow {
    pub reference: String,
    pub fields: NormalizedDict,
}

fn classified_columns() -> impl Iterator<Item = &'static str> {
    EXPECTED_KEYS.into_iter().chain([ZONE_KEY])
}

pub fn load_classified(path: &Path) -> Result<Vec<ClassifiedRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = ReaderBuilder::new()
        .delimiter(DATASET_DELIMITER)
        .from_path(path)
        .with_context(|| format!("Cannot read classifications {}", path.display()))?;
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let mut reference = None;
        let mut fields = NormalizedDict::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            if header == "Ref" {
                reference = Some(cell.to_string());
            } else {
                let value = (!cell.is_empty()).then(|| cell.to_string());
                fields.insert(header.to_string(), value);
            }
        }
        let reference = reference.ok_or_else(|| anyhow!("{} has no Ref column", path.display()))?;
        rows.push(ClassifiedRow { reference, fields });
    }
    Ok(rows)
}

pub fn save_classified(path: &Path, rows: &[ClassifiedRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(DATASET_DELIMITER)
        .from_writer(Vec::new());

    let mut header = vec!["Ref"];
    header.extend(classified_columns());
    wtr.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.reference.as_str()];
        record.extend(classified_columns().map(|key| {
            row.fields.get(key).and_then(|v| v.as_deref()).unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }
    write_atomic(path, &finish(wtr)?)
}

// ── Files ──

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    wtr.into_inner().map_err(|e| anyhow!("Cannot flush CSV buffer: {}", e.error()))
}

/// Replace `path` with `bytes` in one rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("Cannot create {}", tmp.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("Cannot replace {}", path.display()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(reference: &str, documents: &[&str]) -> ResultRow {
        ResultRow {
            reference: reference.to_string(),
            numero_dossier: Some("12345".into()),
            comite: Some("B".into()),
            code_entreprise: None,
            materiel: Some("Échafaudage | roulant".into()),
            resume: Some("Chute de hauteur lors du montage.".into()),
            documents: documents.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn results_round_trip_with_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.csv");
        let rows = vec![
            row("https://x/1?unid=A", &["https://epicea.inrs.fr/a.pdf", "https://epicea.inrs.fr/b.pdf"]),
            row("https://x/2?unid=B", &[]),
        ];
        save_results(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Ref|Numero_dossier|Comite|Code_entreprise|Materiel|Resume|Adresse_pdf\n"));
        assert!(!temp_path(&path).exists());
        assert_eq!(load_results(&path).unwrap(), rows);
    }

    #[test]
    fn empty_dataset_keeps_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save_results(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), RESULT_HEADERS.join("|"));
        assert!(load_results(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_results_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load_results(&dir.path().join("absent.csv")).unwrap().is_empty());
    }

    #[test]
    fn legacy_list_literal_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            "Ref|Numero_dossier|Comite|Code_entreprise|Materiel|Resume|Adresse_pdf\n\
             R1|001|||||['https://epicea.inrs.fr/a.pdf', 'https://epicea.inrs.fr/b.pdf']\n\
             R2|002|||||[]\n",
        )
        .unwrap();
        let rows = load_results(&path).unwrap();
        assert_eq!(rows[0].documents, vec!["https://epicea.inrs.fr/a.pdf", "https://epicea.inrs.fr/b.pdf"]);
        assert_eq!(rows[0].comite, None);
        assert!(rows[1].documents.is_empty());
    }

    #[test]
    fn references_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        let refs: BTreeSet<String> = ["b?unid=2", "a?unid=1"].iter().map(|s| s.to_string()).collect();
        save_references(&path, &refs).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Reference\na?unid=1\nb?unid=2\n");
        assert_eq!(load_references(&path).unwrap(), vec!["a?unid=1", "b?unid=2"]);
    }

    #[test]
    fn missing_reference_list_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_references(&dir.path().join("none.csv")).is_err());
    }

    #[test]
    fn classified_round_trip_keeps_null_sex() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classified.csv");
        let mut fields = NormalizedDict::new();
        fields.insert("Metier".into(), Some("soudeur".into()));
        fields.insert("Sexe".into(), None);
        fields.insert("Zone".into(), Some("main".into()));
        let rows = vec![ClassifiedRow { reference: "R1".into(), fields }];
        save_classified(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Ref|Metier|Sexe|Age|"));
        let loaded = load_classified(&path).unwrap();
        assert_eq!(loaded[0].reference, "R1");
        assert_eq!(loaded[0].fields["Metier"].as_deref(), Some("soudeur"));
        assert_eq!(loaded[0].fields["Sexe"], None);
        assert_eq!(loaded[0].fields["Zone"].as_deref(), Some("main"));
    }
}
