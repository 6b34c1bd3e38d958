use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::leaderboard::{EvaluationRecord, JobStatus};

/// Fixed on-disk column order. Loading a file with any other column set is a
/// fatal startup error.
pub const COLUMNS: [&str; 12] = [
    "hash",
    "repo_namespace",
    "repo_name",
    "chat_template_type",
    "model_size_score",
    "qualitative_score",
    "latency_score",
    "vibe_score",
    "total_score",
    "timestamp",
    "status",
    "notes",
];

/// Not-yet-computed scores are stored as this literal value, never as an
/// empty field, so the file stays loadable by strict numeric parsers.
const SCORE_SENTINEL: &str = "-1.0";

pub fn write_csv(path: &Path, rows: &[EvaluationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed opening leaderboard for write: {}", path.display()))?;
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.hash.clone(),
            row.repo_namespace.clone(),
            row.repo_name.clone(),
            row.chat_template_type.clone(),
            score_field(row.model_size_score),
            score_field(row.qualitative_score),
            score_field(row.latency_score),
            score_field(row.vibe_score),
            score_field(row.total_score),
            row.timestamp.to_rfc3339(),
            row.status.as_str().to_string(),
            row.notes.clone(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed writing leaderboard: {}", path.display()))?;
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<EvaluationRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed opening leaderboard: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed reading leaderboard header: {}", path.display()))?
        .clone();
    let headers: Vec<&str> = headers.iter().collect();
    if headers != COLUMNS {
        bail!(
            "leaderboard file {} has columns {headers:?}, expected exactly {COLUMNS:?}",
            path.display()
        );
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result
            .with_context(|| format!("failed reading leaderboard row {index}: {}", path.display()))?;
        let row = parse_row(&record)
            .with_context(|| format!("invalid leaderboard row {index}: {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_row(record: &csv::StringRecord) -> Result<EvaluationRecord> {
    let raw_timestamp = field(record, 9)?;
    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .with_context(|| format!("invalid timestamp: {raw_timestamp}"))?
        .with_timezone(&Utc);
    let status: JobStatus = field(record, 10)?.parse()?;
    Ok(EvaluationRecord {
        hash: field(record, 0)?.to_string(),
        repo_namespace: field(record, 1)?.to_string(),
        repo_name: field(record, 2)?.to_string(),
        chat_template_type: field(record, 3)?.to_string(),
        model_size_score: parse_score(field(record, 4)?)?,
        qualitative_score: parse_score(field(record, 5)?)?,
        latency_score: parse_score(field(record, 6)?)?,
        vibe_score: parse_score(field(record, 7)?)?,
        total_score: parse_score(field(record, 8)?)?,
        timestamp,
        status,
        notes: field(record, 11)?.to_string(),
    })
}

fn field<'a>(record: &'a csv::StringRecord, index: usize) -> Result<&'a str> {
    record
        .get(index)
        .with_context(|| format!("missing column {}", COLUMNS[index]))
}

fn score_field(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value}"),
        None => SCORE_SENTINEL.to_string(),
    }
}

fn parse_score(raw: &str) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("invalid score value: {trimmed}"))?;
    if value == -1.0 {
        return Ok(None);
    }
    Ok(Some(value))
}
