use crate::body;
use crate::models::EmailRecord;
use chrono::{DateTime, FixedOffset, Utc};
use google_gmail1::api::{Message, MessagePart};
use std::collections::HashMap;

const FALLBACK_DATE_FORMATS: [&str; 3] = [
    "%a, %e %b %Y %H:%M:%S %z",
    "%e %b %Y %H:%M:%S %z",
    "%a, %e %b %Y %H:%M %z",
];

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentSource {
    /// Must be fetched with `attachments.get`.
    Remote(String),
    /// Small parts carry their data in the message itself.
    Inline(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPart {
    pub filename: String,
    pub mime_type: String,
    pub declared_size: u64,
    pub source: AttachmentSource,
}

#[derive(Debug, Default)]
struct Bodies {
    plain: Vec<String>,
    html: Vec<String>,
}

/// Lower-cased header name to value. Later duplicates win.
pub fn header_map(payload: &MessagePart) -> HashMap<String, String> {
    payload
        .headers
        .iter()
        .flatten()
        .filter_map(|h| match (&h.name, &h.value) {
            (Some(name), Some(value)) => Some((name.to_lowercase(), value.clone())),
            _ => None,
        })
        .collect()
}

fn has_filename(part: &MessagePart) -> bool {
    part.filename.as_deref().is_some_and(|f| !f.is_empty())
}

fn collect_bodies(part: &MessagePart, out: &mut Bodies) {
    if let Some(parts) = part.parts.as_ref().filter(|p| !p.is_empty()) {
        for p in parts {
            collect_bodies(p, out);
        }
        return;
    }

    let is_remote = part
        .body
        .as_ref()
        .is_some_and(|b| b.attachment_id.is_some());
    if has_filename(part) && is_remote {
        return;
    }

    let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) else {
        return;
    };

    let mime = part
        .mime_type
        .as_deref()
        .unwrap_or("text/plain")
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/plain" => {
            let text = body::clean_text(&body::decode_text(data));
            if !text.is_empty() {
                out.plain.push(text);
            }
        }
        "text/html" => {
            let html = body::decode_text(data);
            if !html.is_empty() {
                out.html.push(html);
            }
        }
        _ => {}
    }
}

/// Every part in the tree that carries a named attachment.
pub fn attachment_parts(payload: &MessagePart) -> Vec<AttachmentPart> {
    let mut found = Vec::new();
    walk_attachments(payload, &mut found);
    found
}

fn walk_attachments(part: &MessagePart, found: &mut Vec<AttachmentPart>) {
    if has_filename(part) {
        let body = part.body.as_ref();
        let source = body.and_then(|b| {
            b.attachment_id
                .clone()
                .map(AttachmentSource::Remote)
                .or_else(|| b.data.clone().map(AttachmentSource::Inline))
        });

        if let Some(source) = source {
            found.push(AttachmentPart {
                filename: part.filename.clone().unwrap_or_default(),
                mime_type: part.mime_type.clone().unwrap_or_default(),
                declared_size: body.and_then(|b| b.size).unwrap_or(0).max(0) as u64,
                source,
            });
            return;
        }
    }

    for p in part.parts.iter().flatten() {
        walk_attachments(p, found);
    }
}

fn strip_trailing_comment(value: &str) -> &str {
    let trimmed = value.trim();
    match (trimmed.ends_with(')'), trimmed.rfind('(')) {
        (true, Some(open)) => trimmed[..open].trim_end(),
        _ => trimmed,
    }
}

fn parse_header_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = strip_trailing_comment(value);
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(value).ok().or_else(|| {
        FALLBACK_DATE_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
    })
}

/// RFC 3339 timestamp for a message.
///
/// Prefers the `Date` header and keeps its offset. Falls back to Gmail's
/// `internalDate` (epoch milliseconds) in UTC.
pub fn normalize_date(header: Option<&str>, internal_date_ms: Option<i64>) -> Option<String> {
    header
        .and_then(parse_header_date)
        .map(|dt| dt.to_rfc3339())
        .or_else(|| {
            internal_date_ms
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| dt.to_rfc3339())
        })
}

/// Flattens a fetched message into its CSV row.
pub fn to_email_record(msg: &Message) -> EmailRecord {
    let payload = msg.payload.clone().unwrap_or_default();
    let headers = header_map(&payload);
    let header = |name: &str| headers.get(name).cloned().unwrap_or_default();

    let mut bodies = Bodies::default();
    collect_bodies(&payload, &mut bodies);

    let html_body = bodies.html.join("\n");
    let plain_text = if bodies.plain.is_empty() {
        body::clean_text(&body::html_to_text(&html_body))
    } else {
        bodies
            .plain
            .iter()
            .map(|p| format!("{}\n", p))
            .collect::<String>()
            .trim()
            .to_string()
    };

    EmailRecord {
        email_id: msg.id.clone().unwrap_or_default(),
        thread_id: msg.thread_id.clone().unwrap_or_default(),
        snippet: msg
            .snippet
            .as_deref()
            .map(|s| html_escape::decode_html_entities(s).into_owned())
            .unwrap_or_default(),
        label_ids: msg.label_ids.clone().unwrap_or_default().join(";"),
        from: header("from"),
        to: header("to"),
        cc: header("cc"),
        subject: header("subject"),
        date_received: normalize_date(headers.get("date").map(String::as_str), msg.internal_date),
        plain_text,
        html_body,
    }
}
