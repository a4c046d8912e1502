use crate::config::{Config, TokenStore};
use crate::error::{ExportError, Result};
use crate::gmail::GmailClient;
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::oauth2::authenticator_delegate::InstalledFlowDelegate;
use google_gmail1::oauth2::storage::{TokenInfo, TokenStorage};
use google_gmail1::oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

const APP_NAME: &str = "gmail-export";
const TOKEN_KEY: &str = "gmail_token";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Keeps the OAuth token in the OS keyring instead of `token.json`.
pub struct RingStorage;

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let entry = Entry::new(APP_NAME, TOKEN_KEY)?;

        let data = TokenData {
            tokens: vec![token],
        };
        let serialized = serde_json::to_string(&data)?;
        entry.set_password(&serialized)?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.get_all()
            .ok()
            .and_then(|data| data.tokens.into_iter().next())
    }
}

impl RingStorage {
    fn get_all(&self) -> anyhow::Result<TokenData> {
        let entry = Entry::new(APP_NAME, TOKEN_KEY)?;

        match entry.get_password() {
            Ok(serialized) => Ok(serde_json::from_str(&serialized)?),
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear_token(&self) -> Result<()> {
        let entry =
            Entry::new(APP_NAME, TOKEN_KEY).map_err(|e| ExportError::Auth(e.to_string()))?;

        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ExportError::Auth(e.to_string())),
        }
    }
}

/// Shows the consent URL and opens it in the browser.
pub struct BrowserDelegate;

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            info!("Please authorize this app by visiting: {}", url);
            if let Err(e) = open::that(url) {
                warn!("Could not open a browser: {}", e);
            }

            if !need_code {
                return Ok(String::new());
            }

            println!("Enter the authorization code:");
            let mut code = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut code)
                .await
                .map_err(|e| format!("Failed to read authorization code: {}", e))?;
            Ok(code.trim().to_string())
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        let path = path.as_ref();
        if !path.exists() {
            error!(
                "Missing {}. Please provide it in the project directory.",
                path.display()
            );
            return Err(ExportError::MissingCredentials(path.to_path_buf()));
        }

        read_application_secret(path)
            .await
            .map_err(|e| ExportError::Auth(format!("Failed to read application secret: {}", e)))
    }

    /// Runs (or reuses) the installed-app flow and builds a Gmail client.
    pub async fn connect(config: &Config) -> Result<GmailClient> {
        let secret = Self::load_secret(&config.credentials_path).await?;

        let builder =
            InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                .flow_delegate(Box::new(BrowserDelegate));

        let builder = match config.token_store {
            TokenStore::File => builder.persist_tokens_to_disk(&config.token_path),
            TokenStore::Keyring => builder.with_storage(Box::new(RingStorage)),
        };

        let auth = builder
            .build()
            .await
            .map_err(|e| ExportError::Auth(format!("Failed to build authenticator: {}", e)))?;

        // Forces the consent flow up front instead of on the first API call.
        auth.token(SCOPES)
            .await
            .map_err(|e| ExportError::Auth(e.to_string()))?;
        info!("Authenticated with Gmail");

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_only()
            .enable_http1()
            .build();

        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);
        Ok(GmailClient::new(hub))
    }

    /// Forgets the stored token so the next run asks for consent again.
    pub fn reset_token(config: &Config) -> Result<()> {
        match config.token_store {
            TokenStore::File => match std::fs::remove_file(&config.token_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            TokenStore::Keyring => RingStorage.clear_token(),
        }
    }
}
