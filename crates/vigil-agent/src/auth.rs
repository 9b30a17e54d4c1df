use serde::Deserialize;

use crate::config::LoginSettings;
use crate::error::AgentError;

/// An opaque bearer token with a server-defined expiry. The agent never
/// parses or predicts expiry; it reacts to a 401 by obtaining a fresh one.
#[derive(Debug, Clone)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Obtains a fresh bearer credential on demand. Retry policy belongs to the
/// caller, not to implementations.
pub trait CredentialSource {
    fn obtain(&self) -> Result<Credential, AgentError>;
}

/// Performs the synchronous login exchange against the collector. Tokens are
/// held in process memory only; every restart logs in again.
pub struct CredentialManager {
    client: reqwest::blocking::Client,
    login_url: String,
    login: LoginSettings,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

impl CredentialManager {
    pub fn new(
        client: reqwest::blocking::Client,
        login_url: String,
        login: LoginSettings,
    ) -> Self {
        Self {
            client,
            login_url,
            login,
        }
    }
}

impl CredentialSource for CredentialManager {
    fn obtain(&self) -> Result<Credential, AgentError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(&serde_json::json!({
                "username": self.login.username,
                "password": self.login.password,
            }))
            .send()
            .map_err(|e| AgentError::Auth(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Auth(format!(
                "login rejected with status {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .map_err(|e| AgentError::Auth(format!("malformed login response: {e}")))?;

        match body.token {
            Some(token) if !token.is_empty() => Ok(Credential::new(token)),
            _ => Err(AgentError::Auth(
                "login response carried no token".to_string(),
            )),
        }
    }
}
