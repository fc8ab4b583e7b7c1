//! AT Protocol XRPC client
//!
//! A thin reqwest-based client for the handful of `com.atproto.*` methods the
//! composer needs. It implements both [`Repository`] and [`HandleResolver`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{Credentials, HttpConfig};
use crate::error::{Result, SkycastError};
use crate::repository::{HandleResolver, Repository};
use crate::types::{AtUri, BlobRef, CreatedRecord, FetchedRecord, RecordPage};

/// Map an XRPC error response to SkycastError
///
/// AT Protocol errors carry an HTTP status plus an `error` code such as
/// `InvalidRequest` or `ExpiredToken`; both are considered.
///
/// # Arguments
///
/// * `status` - HTTP status code of the response
/// * `code` - The XRPC `error` field, empty when absent
/// * `message` - The XRPC `message` field, empty when absent
/// * `context` - The operation context (e.g., "login", "createRecord")
fn map_xrpc_error(status: u16, code: &str, message: &str, context: &str) -> SkycastError {
    let detail = match (code.is_empty(), message.is_empty()) {
        (false, false) => format!("{} ({})", code, message),
        (false, true) => code.to_string(),
        (true, false) => message.to_string(),
        (true, true) => format!("HTTP {}", status),
    };

    if matches!(code, "InvalidCredentials" | "AccountNotFound" | "AuthFactorTokenRequired")
        || (context == "login" && status == 401)
    {
        return SkycastError::Authentication(format!(
            "Invalid Bluesky credentials: {}. Please check your handle and app password.",
            detail
        ));
    }

    if status == 401
        || status == 403
        || matches!(
            code,
            "AuthenticationRequired" | "InvalidToken" | "ExpiredToken" | "AccountTakedown"
        )
    {
        return SkycastError::Authentication(format!(
            "Bluesky authentication failed during {}: {}",
            context, detail
        ));
    }

    if status == 429 || code == "RateLimitExceeded" {
        return SkycastError::Transport(format!(
            "Bluesky rate limit exceeded during {}: {}. Please wait before trying again.",
            context, detail
        ));
    }

    if status == 400 || matches!(code, "InvalidRequest" | "InvalidRecord" | "RecordNotFound") {
        return SkycastError::Validation(format!(
            "Bluesky rejected {}: {}",
            context, detail
        ));
    }

    SkycastError::Transport(format!("Bluesky {} failed: {}", context, detail))
}

#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ResolveHandleResponse {
    did: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: BlobRef,
}

/// Logged-in account on a PDS.
struct Session {
    did: String,
    handle: String,
    access_jwt: SecretString,
}

pub struct XrpcClient {
    http: reqwest::Client,
    service: String,
    session: Option<Session>,
}

impl XrpcClient {
    /// Create an anonymous client. Only public reads work without a session.
    pub fn new(service: &str, config: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SkycastError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            service: service.trim_end_matches('/').to_string(),
            session: None,
        })
    }

    /// Create a client and log in with an app password.
    pub async fn login(credentials: &Credentials, config: &HttpConfig) -> Result<Self> {
        let mut client = Self::new(&credentials.service, config)?;
        client.create_session(credentials).await?;
        Ok(client)
    }

    async fn create_session(&mut self, credentials: &Credentials) -> Result<()> {
        tracing::debug!("Creating Bluesky session for handle: {}", credentials.handle);

        let response = self
            .http
            .post(self.endpoint("com.atproto.server.createSession"))
            .json(&CreateSessionRequest {
                identifier: &credentials.handle,
                password: credentials.app_password.expose_secret(),
            })
            .send()
            .await?;
        let session: SessionResponse = Self::decode(response, "login").await?;

        tracing::debug!("Bluesky session created for {}", session.did);
        self.session = Some(Session {
            did: session.did,
            handle: session.handle,
            access_jwt: SecretString::from(session.access_jwt),
        });
        Ok(())
    }

    /// DID of the logged-in account.
    pub fn did(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.did.as_str())
    }

    /// Handle of the logged-in account, as reported by the server.
    pub fn handle(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.handle.as_str())
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    fn session(&self, context: &str) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            SkycastError::Authentication(format!("{} requires a logged-in session", context))
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session {
            Some(session) => builder.bearer_auth(session.access_jwt.expose_secret()),
            None => builder,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        let response = Self::check(response, context).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let parsed: XrpcErrorBody = serde_json::from_str(&body).unwrap_or_default();
        tracing::debug!("XRPC {} returned {}: {}", context, status, body);
        Err(map_xrpc_error(status.as_u16(), &parsed.error, &parsed.message, context))
    }
}

#[async_trait]
impl Repository for XrpcClient {
    async fn get_record(&self, uri: &AtUri) -> Result<FetchedRecord> {
        let request = self.http.get(self.endpoint("com.atproto.repo.getRecord")).query(&[
            ("repo", uri.authority.as_str()),
            ("collection", uri.collection.as_str()),
            ("rkey", uri.rkey.as_str()),
        ]);
        let response = self.authorized(request).send().await?;
        Self::decode(response, "getRecord").await
    }

    async fn create_record(
        &self,
        collection: &str,
        record: &serde_json::Value,
    ) -> Result<CreatedRecord> {
        let session = self.session("createRecord")?;
        let request = self
            .http
            .post(self.endpoint("com.atproto.repo.createRecord"))
            .json(&json!({
                "repo": session.did,
                "collection": collection,
                "record": record,
            }));
        let response = self.authorized(request).send().await?;
        Self::decode(response, "createRecord").await
    }

    async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        self.session("uploadBlob")?;
        let request = self
            .http
            .post(self.endpoint("com.atproto.repo.uploadBlob"))
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes);
        let response = self.authorized(request).send().await?;
        let uploaded: UploadBlobResponse = Self::decode(response, "uploadBlob").await?;
        Ok(uploaded.blob)
    }

    async fn delete_record(&self, collection: &str, rkey: &str) -> Result<()> {
        let session = self.session("deleteRecord")?;
        let request = self
            .http
            .post(self.endpoint("com.atproto.repo.deleteRecord"))
            .json(&json!({
                "repo": session.did,
                "collection": collection,
                "rkey": rkey,
            }));
        let response = self.authorized(request).send().await?;
        Self::check(response, "deleteRecord").await?;
        Ok(())
    }

    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<RecordPage> {
        let limit = limit.to_string();
        let mut query = vec![
            ("repo", repo),
            ("collection", collection),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let request = self
            .http
            .get(self.endpoint("com.atproto.repo.listRecords"))
            .query(&query);
        let response = self.authorized(request).send().await?;
        Self::decode(response, "listRecords").await
    }
}

#[async_trait]
impl HandleResolver for XrpcClient {
    async fn resolve_handle(&self, handle: &str) -> Result<String> {
        let request = self
            .http
            .get(self.endpoint("com.atproto.identity.resolveHandle"))
            .query(&[("handle", handle)]);
        let response = self.authorized(request).send().await?;
        let resolved: ResolveHandleResponse = Self::decode(response, "resolveHandle").await?;
        Ok(resolved.did)
    }
}
