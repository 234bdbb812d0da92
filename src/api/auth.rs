//! Password login against the service's token endpoint.
//!
//! - Credentials are posted form-encoded to `/login`
//! - The returned token is wrapped in `SecretString` immediately
//! - A 401 here means bad credentials, not an expired session

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info};

use crate::api::transport::{ApiRequest, RequestBody, Transport};
use crate::error::AppError;
use crate::session::Session;

const LOGIN_PATH: &str = "login";

/// Token response from `/login`.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Exchanges a username and password for a session.
///
/// The caller installs the result with `SessionStore::establish`.
///
/// # Errors
///
/// * `LoginFailed` when the server rejects the credentials or answers with
///   an unusable token payload.
/// * `ServerRejection` for other non-2xx responses, or a transport-class
///   error if the server cannot be reached.
pub async fn login(
    transport: &dyn Transport,
    username: &str,
    password: &SecretString,
) -> Result<Session, AppError> {
    if username.trim().is_empty() {
        return Err(AppError::LoginFailed("Username is required".into()));
    }

    let request = ApiRequest::new(Method::POST, [LOGIN_PATH]).body(RequestBody::Form(vec![
        ("username".to_string(), username.to_string()),
        ("password".to_string(), password.expose_secret().to_string()),
    ]));

    let response = transport.send(request).await?;

    if response.is_unauthorized() {
        error!("[AUTH] Login rejected");
        let message = response
            .detail()
            .unwrap_or_else(|| "Incorrect username or password".to_string());
        return Err(AppError::LoginFailed(message));
    }
    if !response.is_success() {
        return Err(response.into_error("Login endpoint not found"));
    }

    let token: TokenResponse = serde_json::from_str(&response.body)
        .map_err(|_| AppError::LoginFailed("Invalid token response".into()))?;
    if token.access_token.is_empty() {
        return Err(AppError::LoginFailed("Server returned an empty token".into()));
    }

    info!("[AUTH] Login successful");
    Ok(Session::with_type(token.access_token, token.token_type))
}
