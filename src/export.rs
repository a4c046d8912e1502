use crate::config::Config;
use crate::error::Result;
use crate::gmail::Mailbox;
use crate::message::{self, AttachmentPart, AttachmentSource};
use crate::models::{AttachmentRecord, EmailRecord, ExportSummary};
use crate::output::{self, AttachmentStore};
use std::fs;
use tracing::{error, info, warn};

/// One run of the export: list, fetch, decode, save, write.
pub struct Exporter<'a, M: Mailbox> {
    mailbox: &'a M,
    config: &'a Config,
    store: AttachmentStore,
}

impl<'a, M: Mailbox> Exporter<'a, M> {
    pub fn new(mailbox: &'a M, config: &'a Config) -> Self {
        Self {
            mailbox,
            config,
            store: AttachmentStore::new(&config.attachments_dir),
        }
    }

    pub async fn run(&self) -> Result<ExportSummary> {
        fs::create_dir_all(&self.config.data_dir)?;
        if self.config.download_attachments {
            fs::create_dir_all(&self.config.attachments_dir)?;
        }

        let email_ids = self.collect_ids().await?;
        info!("Found {} emails to export", email_ids.len());

        let mut summary = ExportSummary::default();
        let mut emails = Vec::with_capacity(email_ids.len());
        let mut attachments = Vec::new();

        for email_id in &email_ids {
            info!("Processing email ID: {}", email_id);
            match self.process_email(email_id).await {
                Some((email, email_attachments)) => {
                    emails.push(email);
                    attachments.extend(email_attachments);
                }
                None => summary.failed += 1,
            }
        }

        output::write_emails_csv(&self.config.emails_csv_path(), &emails)?;

        if attachments.is_empty() {
            info!("No attachments found.");
        } else {
            output::write_attachments_csv(&self.config.attachments_csv_path(), &attachments)?;
        }

        summary.emails = emails.len();
        summary.attachments = attachments.len();
        Ok(summary)
    }

    /// Pages through `messages.list` until the limit or the last page.
    async fn collect_ids(&self) -> Result<Vec<String>> {
        let limit = match self.config.max_messages {
            0 => usize::MAX,
            n => n,
        };
        let mut query = self.config.list_query();
        let mut ids = Vec::new();
        let mut page_token = None;

        loop {
            let remaining = limit - ids.len();
            query.page_size = query.page_size.min(u32::try_from(remaining).unwrap_or(u32::MAX));

            let (page, next_page_token) = self
                .mailbox
                .list_message_ids(&query, page_token)
                .await
                .inspect_err(|e| error!("Error fetching email list: {}", e))?;

            ids.extend(page.into_iter().take(remaining));

            match next_page_token {
                Some(token) if ids.len() < limit => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn process_email(&self, email_id: &str) -> Option<(EmailRecord, Vec<AttachmentRecord>)> {
        let msg = match self.mailbox.get_message(email_id).await {
            Ok(msg) => msg,
            Err(e) => {
                error!("Error fetching email ID {}: {}", email_id, e);
                return None;
            }
        };

        let email = message::to_email_record(&msg);

        let mut attachments = Vec::new();
        if self.config.download_attachments {
            if let Some(payload) = &msg.payload {
                for part in message::attachment_parts(payload) {
                    if let Some(record) = self.save_attachment(email_id, part).await {
                        attachments.push(record);
                    }
                }
            }
        }

        Some((email, attachments))
    }

    async fn save_attachment(&self, email_id: &str, part: AttachmentPart) -> Option<AttachmentRecord> {
        let data = match part.source {
            AttachmentSource::Inline(data) => data,
            AttachmentSource::Remote(attachment_id) => {
                match self.mailbox.get_attachment(email_id, &attachment_id).await {
                    Ok(data) => data,
                    Err(e) => {
                        error!("{}", e);
                        return None;
                    }
                }
            }
        };

        if data.is_empty() {
            warn!("Attachment {} of email {} is empty", part.filename, email_id);
        }

        match self.store.save(email_id, &part.filename, &data) {
            Ok(saved_path) => Some(AttachmentRecord {
                email_id: email_id.to_string(),
                size: if data.is_empty() { part.declared_size } else { data.len() as u64 },
                filename: part.filename,
                mime_type: part.mime_type,
                saved_path,
            }),
            Err(e) => {
                error!("Error saving attachment {}: {}", part.filename, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::gmail::ListQuery;
    use crate::message::tests::{header, multipart, remote_attachment, text_part};
    use async_trait::async_trait;
    use google_gmail1::api::Message;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct FakeMailbox {
        pages: Vec<Vec<String>>,
        messages: HashMap<String, Message>,
        attachments: HashMap<String, Vec<u8>>,
        list_calls: Mutex<Vec<(Option<String>, u32)>>,
        fail_list: bool,
    }

    fn not_found(what: &str) -> ExportError {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, what.to_string()))
    }

    #[async_trait]
    impl Mailbox for FakeMailbox {
        async fn list_message_ids(
            &self,
            query: &ListQuery,
            page_token: Option<String>,
        ) -> Result<(Vec<String>, Option<String>)> {
            self.list_calls
                .lock()
                .unwrap()
                .push((page_token.clone(), query.page_size));

            if self.fail_list {
                return Err(not_found("message list"));
            }

            let index: usize = page_token.as_deref().map_or(0, |t| t.parse().unwrap());
            let page = self.pages.get(index).cloned().unwrap_or_default();
            let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok((page, next))
        }

        async fn get_message(&self, id: &str) -> Result<Message> {
            self.messages.get(id).cloned().ok_or_else(|| not_found(id))
        }

        async fn get_attachment(&self, _message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
            self.attachments
                .get(attachment_id)
                .cloned()
                .ok_or_else(|| not_found(attachment_id))
        }
    }

    fn plain_message(id: &str, subject: &str) -> Message {
        let payload = google_gmail1::api::MessagePart {
            headers: Some(vec![header("Subject", subject), header("From", "alice@example.com")]),
            ..text_part("text/plain", "hello")
        };
        Message {
            id: Some(id.to_string()),
            thread_id: Some(format!("t-{}", id)),
            payload: Some(payload),
            ..Default::default()
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().join("data"),
            attachments_dir: dir.path().join("attachments"),
            ..Config::default()
        }
    }

    fn read_emails(config: &Config) -> Vec<EmailRecord> {
        csv::Reader::from_path(config.emails_csv_path())
            .unwrap()
            .deserialize()
            .map(|r| r.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_exports_one_row_per_message() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        let mailbox = FakeMailbox {
            pages: vec![vec!["a".to_string(), "b".to_string()]],
            messages: HashMap::from([
                ("a".to_string(), plain_message("a", "First")),
                ("b".to_string(), plain_message("b", "Second")),
            ]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary, ExportSummary { emails: 2, attachments: 0, failed: 0 });

        let rows = read_emails(&config);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email_id, "a");
        assert_eq!(rows[0].subject, "First");
        assert_eq!(rows[1].thread_id, "t-b");
        assert_eq!(rows[1].plain_text, "hello");
        assert!(!config.attachments_csv_path().exists());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_skipped() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        let mailbox = FakeMailbox {
            pages: vec![vec!["a".to_string(), "missing".to_string(), "c".to_string()]],
            messages: HashMap::from([
                ("a".to_string(), plain_message("a", "First")),
                ("c".to_string(), plain_message("c", "Third")),
            ]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary.emails, 2);
        assert_eq!(summary.failed, 1);

        let ids: Vec<String> = read_emails(&config).into_iter().map(|r| r.email_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_attachments_saved_and_listed() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        let payload = multipart(
            "multipart/mixed",
            vec![
                text_part("text/plain", "see attached"),
                remote_attachment("report.pdf", "att-1", 4),
                remote_attachment("lost.pdf", "att-missing", 9),
            ],
        );
        let msg = Message {
            id: Some("m1".to_string()),
            payload: Some(payload),
            ..Default::default()
        };
        let mailbox = FakeMailbox {
            pages: vec![vec!["m1".to_string()]],
            messages: HashMap::from([("m1".to_string(), msg)]),
            attachments: HashMap::from([("att-1".to_string(), b"%PDF".to_vec())]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary, ExportSummary { emails: 1, attachments: 1, failed: 0 });

        let saved = config.attachments_dir.join("m1_report.pdf");
        assert_eq!(fs::read(&saved).unwrap(), b"%PDF");

        let rows: Vec<AttachmentRecord> = csv::Reader::from_path(config.attachments_csv_path())
            .unwrap()
            .deserialize()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            rows,
            vec![AttachmentRecord {
                email_id: "m1".to_string(),
                filename: "report.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                size: 4,
                saved_path: saved,
            }]
        );
    }

    #[tokio::test]
    async fn test_list_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        let mailbox = FakeMailbox {
            pages: vec![vec!["a".to_string()]],
            messages: HashMap::from([("a".to_string(), plain_message("a", "First"))]),
            fail_list: true,
            ..Default::default()
        };

        let result = Exporter::new(&mailbox, &config).run().await;
        assert!(result.is_err());
        assert!(!config.emails_csv_path().exists());
        assert!(!config.attachments_csv_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_attachment_save_failure_skips_only_that_attachment() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        // A dangling symlink makes writing m1_report.pdf fail.
        fs::create_dir_all(&config.attachments_dir).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("missing").join("report.pdf"),
            config.attachments_dir.join("m1_report.pdf"),
        )
        .unwrap();

        let msg = Message {
            id: Some("m1".to_string()),
            payload: Some(multipart(
                "multipart/mixed",
                vec![
                    text_part("text/plain", "two files"),
                    remote_attachment("report.pdf", "att-1", 4),
                    remote_attachment("summary.pdf", "att-2", 3),
                ],
            )),
            ..Default::default()
        };
        let mailbox = FakeMailbox {
            pages: vec![vec!["m1".to_string()]],
            messages: HashMap::from([("m1".to_string(), msg)]),
            attachments: HashMap::from([
                ("att-1".to_string(), b"%PDF".to_vec()),
                ("att-2".to_string(), b"PDF".to_vec()),
            ]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary, ExportSummary { emails: 1, attachments: 1, failed: 0 });

        let rows: Vec<AttachmentRecord> = csv::Reader::from_path(config.attachments_csv_path())
            .unwrap()
            .deserialize()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "summary.pdf");
        assert_eq!(fs::read(&rows[0].saved_path).unwrap(), b"PDF");
    }

    #[tokio::test]
    async fn test_attachments_skipped_when_disabled() {
        let dir = tempdir().unwrap();
        let config = Config {
            download_attachments: false,
            ..test_config(&dir)
        };
        let msg = Message {
            id: Some("m1".to_string()),
            payload: Some(multipart(
                "multipart/mixed",
                vec![remote_attachment("report.pdf", "att-1", 4)],
            )),
            ..Default::default()
        };
        let mailbox = FakeMailbox {
            pages: vec![vec!["m1".to_string()]],
            messages: HashMap::from([("m1".to_string(), msg)]),
            attachments: HashMap::from([("att-1".to_string(), b"%PDF".to_vec())]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary.attachments, 0);
        assert!(!config.attachments_dir.exists());
    }

    #[tokio::test]
    async fn test_pagination_stops_at_max_messages() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_messages: 3,
            page_size: 2,
            ..test_config(&dir)
        };
        let ids = ["1", "2", "3", "4", "5"];
        let mailbox = FakeMailbox {
            pages: vec![
                vec!["1".to_string(), "2".to_string()],
                vec!["3".to_string(), "4".to_string()],
                vec!["5".to_string()],
            ],
            messages: ids
                .iter()
                .map(|id| (id.to_string(), plain_message(id, id)))
                .collect(),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary.emails, 3);

        let calls = mailbox.list_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(None, 2), (Some("1".to_string()), 1)]);
    }

    #[tokio::test]
    async fn test_pagination_unlimited_reads_every_page() {
        let dir = tempdir().unwrap();
        let config = Config {
            max_messages: 0,
            ..test_config(&dir)
        };
        let mailbox = FakeMailbox {
            pages: vec![vec!["1".to_string()], vec![], vec!["2".to_string()]],
            messages: HashMap::from([
                ("1".to_string(), plain_message("1", "one")),
                ("2".to_string(), plain_message("2", "two")),
            ]),
            ..Default::default()
        };

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary.emails, 2);
        assert_eq!(mailbox.list_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_mailbox_still_writes_header() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);
        let mailbox = FakeMailbox::default();

        let summary = Exporter::new(&mailbox, &config).run().await.unwrap();
        assert_eq!(summary, ExportSummary::default());

        let content = fs::read_to_string(config.emails_csv_path()).unwrap();
        assert!(content.starts_with("email_id,thread_id,snippet"));
    }
}
