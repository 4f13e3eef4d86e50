use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ApiError, FieldErrors, Outcome};
use crate::token_store::TokenStore;

/// Uniform request timeout; there is no per-call override.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether an endpoint can be called without a session.
///
/// A stored token is attached either way; `Required` additionally fails fast
/// with `AuthExpired` when no token exists, saving a round trip that could
/// only end in a 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Public,
    Required,
}

type AuthExpiredListener = Box<dyn Fn() + Send + Sync>;

/// Single choke point for every call to the remote API.
///
/// Injects the bearer token, bounds every request with [`REQUEST_TIMEOUT`],
/// and classifies every failure into the closed [`ApiError`] set. A 401 from
/// any call additionally notifies the registered auth-expiry listeners.
pub struct RequestGateway {
    base_url: String,
    client: Client,
    tokens: Arc<TokenStore>,
    auth_listeners: Mutex<Vec<AuthExpiredListener>>,
}

impl RequestGateway {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Result<Self> {
        let base_url = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url,
            client,
            tokens,
            auth_listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registers a callback invoked whenever any call comes back 401.
    /// Coalescing of repeated notifications is the subscriber's concern.
    pub fn on_auth_expired(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.auth_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, auth: Auth) -> Outcome<T> {
        let response = self
            .execute(Method::GET, path, &[], Option::<&()>::None, auth)
            .await?;
        decode(response).await
    }

    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        auth: Auth,
    ) -> Outcome<T> {
        let response = self
            .execute(Method::GET, path, query, Option::<&()>::None, auth)
            .await?;
        decode(response).await
    }

    pub async fn post<T, B>(&self, path: &str, body: Option<&B>, auth: Auth) -> Outcome<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.execute(Method::POST, path, &[], body, auth).await?;
        decode(response).await
    }

    /// POST where the caller only cares about success (201/204-style replies).
    pub async fn post_empty<B>(&self, path: &str, body: Option<&B>, auth: Auth) -> Outcome<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(Method::POST, path, &[], body, auth).await?;
        Ok(())
    }

    pub async fn put<T, B>(&self, path: &str, body: Option<&B>, auth: Auth) -> Outcome<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.execute(Method::PUT, path, &[], body, auth).await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str, auth: Auth) -> Outcome<()> {
        self.execute(Method::DELETE, path, &[], Option::<&()>::None, auth)
            .await?;
        Ok(())
    }

    async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        auth: Auth,
    ) -> Outcome<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let token = self.tokens.get().map(|session| session.token);
        if auth == Auth::Required && token.is_none() {
            return Err(ApiError::AuthExpired);
        }

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "sending API request");

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "API response received");

        if status == StatusCode::UNAUTHORIZED {
            self.notify_auth_expired();
            return Err(ApiError::AuthExpired);
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Validation(FieldErrors::from_body(&body)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response)
    }

    fn notify_auth_expired(&self) {
        let listeners = self
            .auth_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener();
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Outcome<T> {
    let status = response.status().as_u16();
    response.json().await.map_err(|err| ApiError::Server {
        status,
        detail: format!("malformed response body: {err}"),
    })
}

fn classify_transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Network("request timed out".to_string())
    } else if err.is_connect() {
        ApiError::Network(format!("connection failed: {err}"))
    } else {
        ApiError::Network(err.to_string())
    }
}

fn sanitize_base_url(mut base: String) -> Result<String> {
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    // Validate once
    let _ = reqwest::Url::parse(&base).context("invalid API base URL")?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_scheme_and_loses_trailing_slash() {
        assert_eq!(
            sanitize_base_url("localhost:8000/".into()).expect("sanitize"),
            "http://localhost:8000"
        );
        assert_eq!(
            sanitize_base_url("https://blog.example.com".into()).expect("sanitize"),
            "https://blog.example.com"
        );
    }

    #[test]
    fn garbage_base_url_is_rejected() {
        assert!(sanitize_base_url("http://".into()).is_err());
    }
}
