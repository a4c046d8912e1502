use crate::error::{ExportError, Result};
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::Message;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use tracing::debug;

const USER_ID: &str = "me";

/// Filters for `messages.list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    pub include_spam_trash: bool,
    pub page_size: u32,
}

/// The three mailbox calls an export needs.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_message_ids(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)>;

    async fn get_message(&self, id: &str) -> Result<Message>;

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailClient {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_message_ids(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut req = self
            .hub
            .users()
            .messages_list(USER_ID)
            .max_results(query.page_size)
            .include_spam_trash(query.include_spam_trash);

        for label_id in &query.label_ids {
            req = req.add_label_ids(label_id);
        }

        if let Some(q) = &query.query {
            req = req.q(q);
        }

        if let Some(token) = &page_token {
            req = req.page_token(token);
        }

        let (_, message_list) = req
            .doit()
            .await
            .map_err(|e| ExportError::api("Failed to list messages", e))?;

        let ids: Vec<String> = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        debug!(
            "Listed {} message IDs, next_page={}",
            ids.len(),
            message_list.next_page_token.is_some()
        );

        Ok((ids, message_list.next_page_token))
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get(USER_ID, id)
            .format("full")
            .doit()
            .await
            .map_err(|e| ExportError::api(format!("Failed to get message {}", id), e))?;

        Ok(msg)
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let (_, part_body) = self
            .hub
            .users()
            .messages_attachments_get(USER_ID, message_id, attachment_id)
            .doit()
            .await
            .map_err(|e| {
                ExportError::api(
                    format!(
                        "Failed to download attachment {} from email {}",
                        attachment_id, message_id
                    ),
                    e,
                )
            })?;

        // Already base64url-decoded by the client.
        Ok(part_body.data.unwrap_or_default())
    }
}
