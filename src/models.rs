use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const EMAIL_COLUMNS: [&str; 11] = [
    "email_id",
    "thread_id",
    "snippet",
    "label_ids",
    "from",
    "to",
    "cc",
    "subject",
    "date_received",
    "plain_text",
    "html_body",
];

pub const ATTACHMENT_COLUMNS: [&str; 5] = ["email_id", "filename", "mime_type", "size", "saved_path"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub email_id: String,
    pub thread_id: String,
    pub snippet: String,
    pub label_ids: String, // ';'-joined
    pub from: String,
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub date_received: Option<String>,
    pub plain_text: String,
    pub html_body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub email_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub saved_path: PathBuf,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub emails: usize,
    pub attachments: usize,
    pub failed: usize,
}
