//! vSphere REST API HTTP client with session-based authentication.
//!
//! Communicates with vCenter via `{base_url}/api/...`. A session is created
//! once with Basic credentials; every later call carries only the
//! `vmware-api-session-id` header. There is no refresh: an expired token
//! surfaces as an HTTP error on the next call.
//!
//! The session is owned by one client instance and mutated through
//! `&mut self`; share a client across tasks behind a lock.

use crate::error::{VcenterError, VcenterErrorKind, VcenterResult};
use crate::types::{VsphereConfig, VsphereSession};

use base64::Engine;
use log::{debug, info, trace, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// vSphere REST API client.
pub struct VsphereClient {
    client: Client,
    base_url: String,
    session: Option<VsphereSession>,
    config: VsphereConfig,
}

impl VsphereClient {
    /// Build a new client from config (does NOT create a session yet).
    pub fn new(config: &VsphereConfig) -> VcenterResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| VcenterError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            session: None,
            config: config.clone(),
        })
    }

    /// Base URL for API calls.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether we have an active session.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Current session (if any).
    pub fn session(&self) -> Option<&VsphereSession> {
        self.session.as_ref()
    }

    /// Current session ID (if any).
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Current config.
    pub fn config(&self) -> &VsphereConfig {
        &self.config
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a session with the configured credentials.
    pub async fn login(&mut self) -> VcenterResult<String> {
        let (login, password) = (self.config.username.clone(), self.config.password.clone());
        self.authenticate(&login, &password).await
    }

    /// Create a new API session (POST /api/session) with Basic credentials.
    pub async fn authenticate(&mut self, login: &str, password: &str) -> VcenterResult<String> {
        let url = self.url("/api/session");
        let token = basic_token(login, password);

        debug!("Creating vSphere session for {login} at {}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Basic {token}"))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(VcenterError::auth("Invalid credentials"));
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VcenterError::api(
                status.as_u16(),
                format!("Login failed: {body}"),
            ));
        }

        // Session ID comes back as a quoted JSON string
        let session_id: String = resp.json().await.map_err(|e| {
            VcenterError::parse(format!("Failed to parse session response: {e}"))
        })?;

        info!("vSphere session established for {login}");
        self.session = Some(VsphereSession {
            base_url: self.base_url.clone(),
            username: login.to_string(),
            session_id: session_id.clone(),
            connected_at: chrono::Utc::now(),
        });
        Ok(session_id)
    }

    /// Delete the current session (DELETE /api/session).
    pub async fn logout(&mut self) -> VcenterResult<()> {
        if let Some(ref session) = self.session {
            let url = self.url("/api/session");
            if let Err(e) = self
                .client
                .delete(&url)
                .header(SESSION_HEADER, session.session_id.as_str())
                .send()
                .await
            {
                warn!("Ignoring failed session delete: {e}");
            }
        }
        self.session = None;
        Ok(())
    }

    /// Check if the session is still valid (GET /api/session).
    pub async fn check_session(&self) -> VcenterResult<bool> {
        let sid = self.require_session()?;
        let resp = self
            .client
            .get(self.url("/api/session"))
            .header(SESSION_HEADER, sid)
            .send()
            .await?;

        Ok(resp.status().is_success())
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn require_session(&self) -> VcenterResult<&str> {
        self.session_id()
            .ok_or_else(|| VcenterError::auth("Not logged in: no active session"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> VcenterResult<T> {
        self.get_with_params(path, &[]).await
    }

    /// GET a JSON response with query params; repeated keys are sent as-is.
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> VcenterResult<T> {
        let sid = self.require_session()?;
        trace!("GET {path} ({} params)", params.len());
        let resp = self
            .client
            .get(self.url(path))
            .header(SESSION_HEADER, sid)
            .query(params)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with no body and return the HTTP status without judging it.
    pub async fn post_status(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> VcenterResult<StatusCode> {
        let sid = self.require_session()?;
        trace!("POST {path} ({} params)", params.len());
        let resp = self
            .client
            .post(self.url(path))
            .header(SESSION_HEADER, sid)
            .query(params)
            .send()
            .await?;
        Ok(resp.status())
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> VcenterResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => Err(VcenterError::auth(format!("Session expired or invalid: {body}"))),
            StatusCode::FORBIDDEN => Err(VcenterError::new(
                VcenterErrorKind::AccessDenied,
                format!("Access denied: {body}"),
            )),
            StatusCode::NOT_FOUND => Err(VcenterError::not_found(format!("Resource not found: {body}"))),
            _ => Err(VcenterError::api(code, format!("API error {code}: {body}"))),
        }
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> VcenterResult<T> {
        let text = resp.text().await.map_err(|e| {
            VcenterError::parse(format!("Failed to read response body: {e}"))
        })?;

        if text.is_empty() {
            return serde_json::from_str("null").map_err(|e| {
                VcenterError::parse(format!("Cannot deserialise empty response: {e}"))
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            let end = text.char_indices().nth(500).map(|(i, _)| i).unwrap_or(text.len());
            VcenterError::parse(format!("JSON parse error: {e}; body: {}", &text[..end]))
        })
    }
}

/// `base64(login:password)` as used in the Basic `Authorization` header.
pub fn basic_token(login: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{login}:{password}"))
}
