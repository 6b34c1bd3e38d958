use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use serde::Serialize;

use crate::leaderboard::{EvaluationRecord, JobStatus};

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn render_leaderboard_table(records: &[EvaluationRecord]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Hash",
        "Repository",
        "Template",
        "Status",
        "Total",
        "Submitted",
        "Notes",
    ]);

    for record in records {
        let status_cell = match record.status {
            JobStatus::Completed => Cell::new(record.status.as_str()).fg(Color::Green),
            JobStatus::Failed => Cell::new(record.status.as_str()).fg(Color::Red),
            JobStatus::Running => Cell::new(record.status.as_str()).fg(Color::Yellow),
            JobStatus::Queued => Cell::new(record.status.as_str()),
        };
        table.add_row(Row::from(vec![
            Cell::new(&record.hash),
            Cell::new(format!("{}/{}", record.repo_namespace, record.repo_name)),
            Cell::new(&record.chat_template_type),
            status_cell,
            Cell::new(
                record
                    .total_score
                    .map(|score| format!("{score:.3}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(&record.notes),
        ]));
    }
    table.to_string()
}

pub fn leaderboard_to_csv(records: &[EvaluationRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "hash",
        "repository",
        "template",
        "status",
        "total_score",
        "submitted",
        "notes",
    ])?;
    for record in records {
        writer.write_record([
            record.hash.clone(),
            format!("{}/{}", record.repo_namespace, record.repo_name),
            record.chat_template_type.clone(),
            record.status.as_str().to_string(),
            record
                .total_score
                .map(|score| format!("{score:.4}"))
                .unwrap_or_default(),
            record.timestamp.to_rfc3339(),
            record.notes.clone(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
