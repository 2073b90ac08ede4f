//! Ticket export conversion.
//!
//! Turns exported ticket JSON into [`IngestDocument`]s. This is a pure
//! format conversion; nothing here talks to a ticket system.
//!
//! | `data_type` | Title | Text | Source type |
//! |-------------|-------|------|-------------|
//! | `helpdesk` | `title` or `subject` | description, category, priority, status, resolution | `zendesk` |
//! | `zendesk` | `subject` | description, priority, status, comment bodies | `zendesk` |
//! | `custom` | `title` or `name` | `content`/`body`/`text`, else every scalar field | `txt` |
//!
//! Ticket titles are prefixed with the ticket id so two tickets with the
//! same subject stay separate documents.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use support_harness_core::ingest::IngestDocument;
use support_harness_core::models::SourceType;
use support_harness_core::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TicketFormat {
    Helpdesk,
    Zendesk,
    Custom,
}

impl TicketFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpdesk => "helpdesk",
            Self::Zendesk => "zendesk",
            Self::Custom => "custom",
        }
    }
}

/// A record that produced no document, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TicketImport {
    pub documents: Vec<IngestDocument>,
    pub skipped: Vec<SkippedRecord>,
}

/// Convert an export (an array of records or a single record).
///
/// Every document gets `product_version` when given, and records its
/// origin in `extra` as `{"source": "json_upload", "data_type": ...}`.
pub fn documents_from_export(
    format: TicketFormat,
    export: &Value,
    product_version: Option<&str>,
) -> Result<TicketImport> {
    let records: Vec<&Value> = match export {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![export],
        _ => {
            return Err(RagError::invalid(
                "ticket export must be a JSON array of objects or a single object",
            ))
        }
    };

    let mut import = TicketImport::default();
    for (index, record) in records.into_iter().enumerate() {
        let Some(fields) = record.as_object() else {
            import.skipped.push(SkippedRecord {
                index,
                reason: "record is not a JSON object".into(),
            });
            continue;
        };
        match convert(format, fields) {
            Some(mut doc) => {
                doc.product_version = product_version.map(String::from);
                doc.extra
                    .insert("source".into(), Value::String("json_upload".into()));
                doc.extra
                    .insert("data_type".into(), Value::String(format.as_str().into()));
                import.documents.push(doc);
            }
            None => import.skipped.push(SkippedRecord {
                index,
                reason: "record has no usable text".into(),
            }),
        }
    }
    Ok(import)
}

fn convert(format: TicketFormat, fields: &Map<String, Value>) -> Option<IngestDocument> {
    match format {
        TicketFormat::Helpdesk => {
            let subject = first_str(fields, &["title", "subject"]);
            let lines = labeled(
                fields,
                &[
                    ("Description", "description"),
                    ("Category", "category"),
                    ("Priority", "priority"),
                    ("Status", "status"),
                    ("Resolution", "resolution"),
                ],
            );
            ticket(fields, subject, lines, &["ticket_id", "id"], "Helpdesk Ticket")
        }
        TicketFormat::Zendesk => {
            let subject = first_str(fields, &["subject"]);
            let mut lines = labeled(
                fields,
                &[
                    ("Description", "description"),
                    ("Priority", "priority"),
                    ("Status", "status"),
                ],
            );
            let comments: Vec<String> = fields
                .get("comments")
                .and_then(Value::as_array)
                .map(|cs| {
                    cs.iter()
                        .filter_map(|c| c.get("body").and_then(Value::as_str))
                        .map(str::trim)
                        .filter(|b| !b.is_empty())
                        .map(|b| format!("- {}", b))
                        .collect()
                })
                .unwrap_or_default();
            if !comments.is_empty() {
                lines.push(format!("Comments:\n{}", comments.join("\n")));
            }
            ticket(fields, subject, lines, &["id", "ticket_id"], "Zendesk Ticket")
        }
        TicketFormat::Custom => {
            let text = first_str(fields, &["content", "body", "text"])
                .map(String::from)
                .unwrap_or_else(|| scalar_lines(fields));
            if text.trim().is_empty() {
                return None;
            }
            let title = first_str(fields, &["title", "name"]).unwrap_or("Custom Document");
            let mut doc = IngestDocument::new(title, SourceType::Txt, text);
            doc.tags = tags(fields);
            Some(doc)
        }
    }
}

fn ticket(
    fields: &Map<String, Value>,
    subject: Option<&str>,
    lines: Vec<String>,
    id_keys: &[&str],
    default_title: &str,
) -> Option<IngestDocument> {
    if lines.is_empty() && subject.is_none() {
        return None;
    }
    let ticket_id = id_keys.iter().find_map(|k| fields.get(*k).and_then(scalar));
    let subject = subject.unwrap_or(default_title);

    let mut text = format!("Subject: {}", subject);
    for line in &lines {
        text.push('\n');
        text.push_str(line);
    }
    let title = match &ticket_id {
        Some(id) => format!("Ticket {}: {}", id, subject),
        None => subject.to_string(),
    };

    let mut doc = IngestDocument::new(title, SourceType::Zendesk, text);
    doc.ticket_id = ticket_id;
    doc.tags = tags(fields);
    Some(doc)
}

fn first_str<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn labeled(fields: &Map<String, Value>, pairs: &[(&str, &str)]) -> Vec<String> {
    pairs
        .iter()
        .filter_map(|(label, key)| {
            fields
                .get(*key)
                .and_then(scalar)
                .map(|v| format!("{}: {}", label, v))
        })
        .collect()
}

fn scalar_lines(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(scalar).collect();
                (!parts.is_empty()).then(|| format!("{}: {}", key, parts.join(", ")))
            }
            other => scalar(other).map(|v| format!("{}: {}", key, v)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn tags(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get("tags")
        .and_then(Value::as_array)
        .map(|ts| ts.iter().filter_map(scalar).collect())
        .unwrap_or_default()
}
