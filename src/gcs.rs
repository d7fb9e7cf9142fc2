//! Google Cloud Storage backend for the synchroniser.
//!
//! Talks to the GCS JSON API directly over `reqwest`:
//! - `GET  /storage/v1/b/{bucket}` to check the bucket exists
//! - `GET  /storage/v1/b/{bucket}/o/{key}` for an object's size (404 means absent)
//! - `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}` to upload
//!
//! Access tokens come from a JSON credential file:
//! - `service_account` key files, exchanged through the JWT-bearer grant with an RS256
//!   assertion signed by the account's private key
//! - `authorized_user` files (as written by `gcloud auth application-default login`),
//!   exchanged through the refresh-token grant
//! - `access_token` files holding a pre-issued bearer token, used as is
//!
//! Exchanged tokens are cached until a minute before they expire.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use camsnap_core::contract::ObjectStore;
use camsnap_core::error::StorageError;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Contents of a credential file, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialFile {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default = "default_token_uri")]
        token_uri: String,
    },
    AccessToken {
        access_token: String,
    },
    #[serde(other)]
    Unsupported,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_ENDPOINT.to_string()
}

impl CredentialFile {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let parsed: CredentialFile =
            serde_json::from_str(raw).map_err(|e| StorageError::Auth {
                message: format!("invalid credential file: {e}"),
            })?;
        if parsed == CredentialFile::Unsupported {
            return Err(StorageError::Auth {
                message: "unsupported credential type; expected 'service_account', 'authorized_user' or 'access_token'"
                    .into(),
            });
        }
        Ok(parsed)
    }

    pub async fn from_path(path: &Path) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::parse(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Claims of the self-signed assertion a service account trades for an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl AssertionClaims {
    pub fn new(client_email: &str, token_uri: &str, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            iss: client_email.to_string(),
            scope: STORAGE_SCOPE.to_string(),
            aud: token_uri.to_string(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// Signs the JWT-bearer assertion for a service account with its PEM private key.
pub fn sign_assertion(
    client_email: &str,
    private_key: &str,
    token_uri: &str,
    now: DateTime<Utc>,
) -> Result<String, StorageError> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| StorageError::Auth {
        message: format!("invalid service account private key: {e}"),
    })?;
    let claims = AssertionClaims::new(client_email, token_uri, now);
    encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| StorageError::Auth {
        message: format!("failed to sign service account assertion: {e}"),
    })
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    /// The JSON API encodes 64-bit integers as strings.
    size: String,
}

/// Maps a file extension to the content type the object is stored with.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub struct GcsClient {
    http: Client,
    endpoint: Url,
    token_endpoint: String,
    bucket: String,
    credentials: CredentialFile,
    token_cache: RwLock<Option<CachedToken>>,
}

impl GcsClient {
    pub fn new(bucket: impl Into<String>, credentials: CredentialFile) -> Result<Self, StorageError> {
        Self::with_endpoints(bucket, credentials, GCS_ENDPOINT, GOOGLE_TOKEN_ENDPOINT)
    }

    /// Same as [`GcsClient::new`] against custom endpoints, e.g. a local emulator.
    pub fn with_endpoints(
        bucket: impl Into<String>,
        credentials: CredentialFile,
        endpoint: &str,
        token_endpoint: &str,
    ) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint).map_err(|e| StorageError::Other {
            message: format!("invalid storage endpoint '{endpoint}': {e}"),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::Other {
                message: format!("storage endpoint '{endpoint}' cannot be a base URL"),
            });
        }
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Network {
                message: e.to_string(),
            })?;

        let bucket = bucket.into();
        info!(bucket = %bucket, endpoint = %endpoint, "[GCS] Client initialised");
        Ok(Self {
            http,
            endpoint,
            token_endpoint: token_endpoint.to_string(),
            bucket,
            credentials,
            token_cache: RwLock::new(None),
        })
    }

    /// Reads the credential file at `path` and builds a client for `bucket`.
    pub async fn from_credentials_file(
        bucket: impl Into<String>,
        path: &Path,
        endpoint: Option<&str>,
    ) -> Result<Self, StorageError> {
        let credentials = CredentialFile::from_path(path).await?;
        Self::with_endpoints(
            bucket,
            credentials,
            endpoint.unwrap_or(GCS_ENDPOINT),
            GOOGLE_TOKEN_ENDPOINT,
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn bucket_url(&self) -> Url {
        self.url(&["storage", "v1", "b", self.bucket.as_str()])
    }

    /// The object key is pushed as a single segment, so `/` inside it is percent-encoded.
    pub fn object_url(&self, key: &str) -> Url {
        self.url(&["storage", "v1", "b", self.bucket.as_str(), "o", key])
    }

    pub fn upload_url(&self, key: &str) -> Url {
        let mut url = self.url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        url
    }

    async fn access_token(&self) -> Result<String, StorageError> {
        if let CredentialFile::AccessToken { access_token } = &self.credentials {
            return Ok(access_token.clone());
        }

        if let Some(cached) = self.token_cache.read().await.as_ref() {
            if cached.expires_at > Utc::now() + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.token_cache.write().await;
        // another upload may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Utc::now() + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) {
                return Ok(cached.token.clone());
            }
        }

        let token = self.request_token().await?;
        debug!(expires_in = token.expires_in, "[GCS] Access token refreshed");

        *cache = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }

    /// Exchanges the credential for a fresh access token at its OAuth2 token endpoint.
    async fn request_token(&self) -> Result<TokenResponse, StorageError> {
        let (token_url, params): (&str, Vec<(&str, String)>) = match &self.credentials {
            CredentialFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => (
                self.token_endpoint.as_str(),
                vec![
                    ("client_id", client_id.clone()),
                    ("client_secret", client_secret.clone()),
                    ("refresh_token", refresh_token.clone()),
                    ("grant_type", "refresh_token".to_string()),
                ],
            ),
            CredentialFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let assertion = sign_assertion(client_email, private_key, token_uri, Utc::now())?;
                (
                    token_uri.as_str(),
                    vec![
                        ("grant_type", JWT_BEARER_GRANT.to_string()),
                        ("assertion", assertion),
                    ],
                )
            }
            CredentialFile::AccessToken { .. } | CredentialFile::Unsupported => {
                return Err(StorageError::Auth {
                    message: "credential type cannot be exchanged for a token".into(),
                })
            }
        };

        let response = self
            .http
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), "[GCS] Token request rejected");
            return Err(StorageError::Auth {
                message: format!("token request failed with {status}: {}", truncate(&body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| StorageError::Auth {
            message: format!("failed to parse token response: {e}"),
        })
    }

    fn status_error(&self, key: &str, status: StatusCode, body: &str) -> StorageError {
        match status {
            StatusCode::UNAUTHORIZED => StorageError::Auth {
                message: truncate(body),
            },
            StatusCode::FORBIDDEN => StorageError::AccessDenied {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: truncate(body),
            },
            other => StorageError::Api {
                key: key.to_string(),
                status: other.as_u16(),
                message: truncate(body),
            },
        }
    }
}

fn network_error(e: reqwest::Error) -> StorageError {
    StorageError::Network {
        message: e.to_string(),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn bucket_exists(&self) -> Result<bool, StorageError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.bucket_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(self.status_error("", status, &body))
            }
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.object_url(key))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(network_error)?;
        if !status.is_success() {
            return Err(self.status_error(key, status, &body));
        }

        let metadata: ObjectMetadata =
            serde_json::from_str(&body).map_err(|e| StorageError::Other {
                message: format!("unexpected metadata for {key}: {e}"),
            })?;
        let size = metadata.size.parse::<u64>().map_err(|e| StorageError::Other {
            message: format!("invalid size '{}' for {key}: {e}", metadata.size),
        })?;
        Ok(Some(size))
    }

    async fn put_object_from_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| StorageError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.upload_url(key))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(path))
            .body(bytes)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.status_error(key, status, &body))
    }
}
