use crate::error::Result;
use crate::models::{ATTACHMENT_COLUMNS, AttachmentRecord, EMAIL_COLUMNS, EmailRecord};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const MAX_FILENAME_LEN: usize = 255;

/// Writes attachment bytes under one folder without overwriting earlier files.
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, email_id: &str, filename: &str, data: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let name = sanitize_filename(&format!("{}_{}", email_id, filename));
        let path = unique_path(&self.dir, &name);
        fs::write(&path, data)?;

        info!("Saved attachment: {}", path.display());
        Ok(path)
    }
}

fn sanitize_filename(filename: &str) -> String {
    let filename = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let filename = filename.trim_matches(|c| c == '.' || c == ' ');

    if filename.is_empty() {
        return "attachment".to_string();
    }
    if filename.len() <= MAX_FILENAME_LEN {
        return filename.to_string();
    }

    let (base, ext) = split_extension(filename);
    let ext = if ext.len() > 50 { "" } else { ext };
    format!("{}{}", truncate_to_boundary(base, MAX_FILENAME_LEN - ext.len()), ext)
}

/// Splits `name` into stem and extension, the extension keeping its dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_extension(name);
    let (stem, ext) = if ext.len() > 50 { (name, "") } else { (stem, ext) };
    (1..)
        .map(|n| {
            let suffix = format!("-{}", n);
            let room = MAX_FILENAME_LEN.saturating_sub(suffix.len() + ext.len());
            dir.join(format!("{}{}{}", truncate_to_boundary(stem, room), suffix, ext))
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

fn write_csv<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `emails.csv`. The header row is present even when `rows` is empty.
pub fn write_emails_csv(path: &Path, rows: &[EmailRecord]) -> Result<()> {
    write_csv(path, &EMAIL_COLUMNS, rows)?;
    info!("Emails data saved to {}", path.display());
    Ok(())
}

pub fn write_attachments_csv(path: &Path, rows: &[AttachmentRecord]) -> Result<()> {
    write_csv(path, &ATTACHMENT_COLUMNS, rows)?;
    info!("Attachments data saved to {}", path.display());
    Ok(())
}
