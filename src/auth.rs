//! Credential/Auth engine: bearer-token gate for the data plane plus the
//! OAuth2 authorization-code and refresh flows.
//!
//! All token material is random and process-local. The validation order of
//! each flow is fixed and first-failure-wins, so client test suites can
//! assert on exactly which parameter was rejected.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::error::{DriveError, DriveResult};
use crate::util::{generate_id, rfc3339_now};

/// The single authorization code this simulator ever hands out.
pub const DRIVE_AUTH_CODE: &str = "drive_auth_code";
/// The only scope the authorize endpoint accepts.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
/// Out-of-band redirect sentinel: the code is returned in the response body
/// instead of via redirect.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Snapshot of the currently valid credentials, derived on demand.
#[derive(Debug, Clone)]
pub struct Creds {
    pub client_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expiration: DateTime<Utc>,
}

/// Outcome of a successful authorize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// OOB flow: respond with `{"code": ..}`.
    Code(String),
    /// Normal flow: 303 redirect to this URL.
    Redirect(String),
}

#[derive(Debug)]
pub struct AuthState {
    access_token: String,
    refresh_token: String,
    default_client_id: String,
    default_client_secret: String,
    custom_client_id: String,
    custom_client_secret: String,
    /// One-shot legacy-compat escape hatch: an extra client id accepted in
    /// combination with the default secret. No scope, no expiry.
    client_id_override: Option<String>,
}

impl AuthState {
    pub fn new(default_client_id: String, default_client_secret: String) -> Self {
        AuthState {
            // Empty until the first refresh; a client presenting "Bearer "
            // verbatim matches, which is harmless in a test double.
            access_token: String::new(),
            refresh_token: "test_refresh_token".to_string(),
            default_client_id,
            default_client_secret,
            custom_client_id: generate_id(5),
            custom_client_secret: generate_id(5),
            client_id_override: None,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token_value(&self) -> &str {
        &self.refresh_token
    }

    pub fn custom_client(&self) -> (&str, &str) {
        (&self.custom_client_id, &self.custom_client_secret)
    }

    pub fn default_client(&self) -> (&str, &str) {
        (&self.default_client_id, &self.default_client_secret)
    }

    /// Derived credentials with the fixed one-hour expiry offset.
    pub fn creds(&self) -> Creds {
        Creds {
            client_id: self.default_client_id.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiration: Utc::now() + Duration::hours(1),
        }
    }

    /// Bearer-token precondition applied to every data-plane endpoint.
    pub fn check_headers(&self, authorization: Option<&str>) -> DriveResult<()> {
        let expected = format!("Bearer {}", self.access_token);
        if authorization.unwrap_or("") != expected {
            return Err(DriveError::Unauthorized);
        }
        Ok(())
    }

    /// OAuth2 authorization entry point. Checks run in fixed order; the
    /// first mismatch wins.
    pub fn authorize(&self, query: &HashMap<String, String>) -> DriveResult<AuthorizeOutcome> {
        let client_id = query.get("client_id").map(String::as_str);
        if client_id != Some(self.default_client_id.as_str())
            && client_id != Some(self.custom_client_id.as_str())
        {
            return Err(DriveError::Unauthorized);
        }
        if query.get("scope").map(String::as_str) != Some(DRIVE_FILE_SCOPE) {
            return Err(DriveError::Unauthorized);
        }
        if query.get("response_type").map(String::as_str) != Some("code") {
            return Err(DriveError::Unauthorized);
        }
        if query.get("include_granted_scopes").map(String::as_str) != Some("true") {
            return Err(DriveError::Unauthorized);
        }
        if query.get("access_type").map(String::as_str) != Some("offline") {
            return Err(DriveError::Unauthorized);
        }
        if !query.contains_key("state") {
            return Err(DriveError::Unauthorized);
        }
        let Some(redirect_uri) = query.get("redirect_uri") else {
            return Err(DriveError::Unauthorized);
        };
        if query.get("prompt").map(String::as_str) != Some("consent") {
            return Err(DriveError::Unauthorized);
        }
        if redirect_uri == OOB_REDIRECT_URI {
            return Ok(AuthorizeOutcome::Code(DRIVE_AUTH_CODE.to_string()));
        }
        let state = query.get("state").map(String::as_str).unwrap_or("");
        let sep = if redirect_uri.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}code={}&state={}",
            redirect_uri,
            sep,
            urlencoding::encode(DRIVE_AUTH_CODE),
            urlencoding::encode(state)
        );
        Ok(AuthorizeOutcome::Redirect(url))
    }

    /// Exchange the authorization code for a token pair. Rotates the refresh
    /// token on success.
    pub fn exchange_code(
        &mut self,
        form: &HashMap<String, String>,
        http_port: u16,
    ) -> DriveResult<Value> {
        let loopback = format!("http://localhost:{}/drive/authorize", http_port);
        let redirect_uri = form.get("redirect_uri").map(String::as_str).unwrap_or("");
        if redirect_uri != loopback && redirect_uri != OOB_REDIRECT_URI {
            return Err(DriveError::Unauthorized);
        }
        if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
            return Err(DriveError::Unauthorized);
        }
        let client_id = form.get("client_id").map(String::as_str).unwrap_or("");
        let client_secret = form.get("client_secret").map(String::as_str).unwrap_or("");
        if !self.validate_client(client_id, client_secret) {
            return Err(DriveError::Unauthorized);
        }
        if form.get("code").map(String::as_str) != Some(DRIVE_AUTH_CODE) {
            return Err(DriveError::Unauthorized);
        }
        self.generate_new_refresh_token();
        Ok(json!({
            "access_token": self.access_token,
            "refresh_token": self.refresh_token,
            "client_id": client_id,
            "client_secret": self.default_client_secret,
            "token_expiry": rfc3339_now(),
        }))
    }

    /// Refresh-token grant. Rotates the access token on success.
    pub fn refresh(&mut self, form: &HashMap<String, String>) -> DriveResult<Value> {
        let client_id = form.get("client_id").map(String::as_str).unwrap_or("");
        let client_secret = form.get("client_secret").map(String::as_str).unwrap_or("");
        if !self.validate_client(client_id, client_secret) {
            return Err(DriveError::Unauthorized);
        }
        if form.get("refresh_token").map(String::as_str) != Some(self.refresh_token.as_str()) {
            return Err(DriveError::Unauthorized);
        }
        if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
            return Err(DriveError::Unauthorized);
        }
        self.generate_new_access_token();
        Ok(json!({
            "access_token": self.access_token,
            "expires_in": 3600,
            "token_type": "doesn't matter",
        }))
    }

    /// A client pair is valid if it is the custom generated pair, the
    /// configured default pair, or the override id with the default secret.
    pub fn validate_client(&self, client_id: &str, client_secret: &str) -> bool {
        if client_id == self.custom_client_id && client_secret == self.custom_client_secret {
            return true;
        }
        if client_id == self.default_client_id && client_secret == self.default_client_secret {
            return true;
        }
        if let Some(hack) = &self.client_id_override {
            if client_id == hack && client_secret == self.default_client_secret {
                return true;
            }
        }
        false
    }

    // --- test controls ---

    pub fn generate_new_access_token(&mut self) {
        self.access_token = generate_id(20);
    }

    pub fn generate_new_refresh_token(&mut self) {
        self.refresh_token = generate_id(20);
    }

    /// Invalidate both tokens, simulating full credential expiry.
    pub fn expire_creds(&mut self) {
        self.generate_new_access_token();
        self.generate_new_refresh_token();
    }

    pub fn expire_refresh_token(&mut self) {
        self.generate_new_refresh_token();
    }

    /// Expire both tokens and regenerate the configured default client pair,
    /// forcing a full re-authorization.
    pub fn reset_auth(&mut self) {
        self.expire_creds();
        self.default_client_id = generate_id(5);
        self.default_client_secret = generate_id(5);
    }

    pub fn set_client_id_override(&mut self, client_id: Option<String>) {
        self.client_id_override = client_id;
    }
}
