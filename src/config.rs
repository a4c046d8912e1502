use crate::error::{ExportError, Result};
use crate::gmail::ListQuery;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "settings.toml";

/// Gmail caps `maxResults` for `messages.list` at 500.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TokenStore {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub token_store: TokenStore,
    pub data_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub log_file: PathBuf,
    /// 0 means no limit.
    pub max_messages: usize,
    pub page_size: u32,
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    pub include_spam_trash: bool,
    pub download_attachments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            token_store: TokenStore::File,
            data_dir: PathBuf::from("./data"),
            attachments_dir: PathBuf::from("./attachments"),
            log_file: PathBuf::from("gmail_export.log"),
            max_messages: 10,
            page_size: 100,
            query: None,
            label_ids: Vec::new(),
            include_spam_trash: false,
            download_attachments: true,
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| ExportError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn emails_csv_path(&self) -> PathBuf {
        self.data_dir.join("emails.csv")
    }

    pub fn attachments_csv_path(&self) -> PathBuf {
        self.data_dir.join("attachments.csv")
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            query: self.query.clone().filter(|q| !q.trim().is_empty()),
            label_ids: self.label_ids.clone(),
            include_spam_trash: self.include_spam_trash,
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }
}
