//! HTTP implementation of the auth API
//!
//! Talks to the blogging backend with reqwest. The refresh credential is an
//! HTTP-only cookie, so the client keeps a cookie jar; when a credential store
//! is attached the refresh cookie is copied into it after login/refresh and
//! seeded back into the jar on construction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::base::{AccessGrant, ApiError, AuthApi};
use crate::auth::CredentialStore;
use crate::config::ApiConfig;
use crate::security::{redact, Token};
use crate::session::{Profile, Session};

/// Header the backend reads the CSRF token from
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Token payload of the login and refresh endpoints
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access", alias = "accessToken")]
    access_token: Token,
    #[serde(default, alias = "csrfToken")]
    csrf_token: Option<Token>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Error body shape used by the backend (`{"detail": "..."}`)
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Auth API over HTTP
pub struct HttpAuthApi {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
    login_url: Url,
    refresh_url: Url,
    current_user_url: Url,
    logout_url: Url,
    refresh_cookie: String,
    csrf_cookie: String,
    vault: Option<Arc<dyn CredentialStore>>,
}

impl HttpAuthApi {
    /// Creates a client without credential persistence
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::build(config, None)
    }

    /// Creates a client that persists the refresh cookie in `vault`
    pub fn with_vault(
        config: &ApiConfig,
        vault: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiError> {
        Self::build(config, Some(vault))
    }

    fn build(
        config: &ApiConfig,
        vault: Option<Arc<dyn CredentialStore>>,
    ) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&config.base_url)?;
        let join = |path: &str| {
            base_url
                .join(path.trim_start_matches('/'))
                .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
        };

        let jar = Arc::new(Jar::default());
        let mut builder = Client::builder().cookie_provider(Arc::clone(&jar));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let api = Self {
            client: builder.build()?,
            login_url: join(&config.endpoints.login)?,
            refresh_url: join(&config.endpoints.refresh)?,
            current_user_url: join(&config.endpoints.current_user)?,
            logout_url: join(&config.endpoints.logout)?,
            base_url,
            jar,
            refresh_cookie: config.refresh_cookie_name.clone(),
            csrf_cookie: config.csrf_cookie_name.clone(),
            vault,
        };
        tracing::debug!("Auth API at {}", redact::url(api.base_url.as_str()));
        api.seed_from_vault();
        Ok(api)
    }

    /// Key under which the refresh cookie is persisted, scoped per backend
    fn vault_key(&self) -> String {
        format!(
            "refresh-cookie@{}",
            self.base_url.host_str().unwrap_or("localhost")
        )
    }

    /// Puts a previously persisted refresh cookie back into the jar
    fn seed_from_vault(&self) {
        let Some(vault) = &self.vault else {
            return;
        };
        match vault.load(&self.vault_key()) {
            Ok(Some(pair)) => {
                tracing::debug!("Restoring persisted credential {}", redact::cookie(&pair));
                self.jar
                    .add_cookie_str(&format!("{}; Path=/", pair), &self.base_url);
            }
            Ok(None) => tracing::debug!("No persisted credential"),
            Err(e) => tracing::warn!("Failed to read persisted credential: {}", e),
        }
    }

    /// Copies the current refresh cookie from the jar into the vault
    fn persist_refresh_cookie(&self) {
        let Some(vault) = &self.vault else {
            return;
        };
        let Some(pair) = self.cookie_pair(&self.refresh_url, &self.refresh_cookie) else {
            tracing::debug!("Backend did not set a refresh cookie");
            return;
        };
        if let Err(e) = vault.save(&self.vault_key(), &pair) {
            tracing::warn!("Failed to persist credential: {}", e);
        }
    }

    /// Drops the refresh cookie from the jar and the vault
    fn forget_refresh_cookie(&self) -> Result<(), ApiError> {
        self.jar.add_cookie_str(
            &format!("{}=; Max-Age=0; Path=/", self.refresh_cookie),
            &self.base_url,
        );
        if let Some(vault) = &self.vault {
            vault.delete(&self.vault_key())?;
        }
        Ok(())
    }

    /// Returns `name=value` for a cookie the jar would send to `url`
    fn cookie_pair(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let header = header.to_str().ok()?;
        header
            .split(';')
            .map(str::trim)
            .find(|pair| pair.split_once('=').is_some_and(|(n, _)| n == name))
            .map(str::to_string)
    }

    fn cookie_value(&self, url: &Url, name: &str) -> Option<String> {
        self.cookie_pair(url, name)
            .and_then(|pair| pair.split_once('=').map(|(_, v)| v.to_string()))
            .filter(|v| !v.is_empty())
    }

    /// Adds the CSRF header from the explicit token or the jar's CSRF cookie
    fn with_csrf(
        &self,
        request: RequestBuilder,
        url: &Url,
        csrf: Option<&Token>,
    ) -> RequestBuilder {
        let value = csrf
            .map(|t| t.expose().to_string())
            .or_else(|| self.cookie_value(url, &self.csrf_cookie));
        match value {
            Some(value) => request.header(CSRF_HEADER, value),
            None => request,
        }
    }

    /// Sends a request and decodes a JSON body, aborting on cancellation
    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            result = async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.bytes().await?;
                check_status(status, &body)?;
                serde_json::from_slice::<T>(&body).map_err(|e| ApiError::Parse(e.to_string()))
            } => result,
        }
    }

    /// Sends a request whose body is ignored
    async fn call_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        check_status(status, &body)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        email: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessGrant, ApiError> {
        tracing::info!("Logging in as {}", redact::email(email));

        let request = self
            .client
            .post(self.login_url.clone())
            .json(&LoginRequest { email, password });
        let response: TokenResponse = self.call(request, cancel).await?;

        let csrf_token = response.csrf_token.or_else(|| {
            self.cookie_value(&self.base_url, &self.csrf_cookie)
                .map(Token::new)
        });
        self.persist_refresh_cookie();

        Ok(AccessGrant {
            access_token: response.access_token,
            csrf_token,
        })
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<Token, ApiError> {
        if self.cookie_pair(&self.refresh_url, &self.refresh_cookie).is_none() {
            return Err(ApiError::AuthFailed("no persisted credential".into()));
        }

        let request = self.with_csrf(
            self.client.post(self.refresh_url.clone()),
            &self.refresh_url,
            None,
        );
        let response: TokenResponse = match self.call(request, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_auth() => {
                tracing::info!("Persisted credential rejected, forgetting it");
                if let Err(forget) = self.forget_refresh_cookie() {
                    tracing::warn!("Failed to forget credential: {}", forget);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.persist_refresh_cookie();

        tracing::debug!("Refreshed access token {}", response.access_token.redacted());
        Ok(response.access_token)
    }

    async fn current_user(
        &self,
        access_token: &Token,
        cancel: &CancellationToken,
    ) -> Result<Profile, ApiError> {
        let request = self
            .client
            .get(self.current_user_url.clone())
            .header(reqwest::header::AUTHORIZATION, access_token.bearer());
        self.call(request, cancel).await
    }

    async fn logout(&self, session: &Session) -> Result<(), ApiError> {
        let mut request = self.client.post(self.logout_url.clone());
        if let Some(token) = &session.access_token {
            request = request.header(reqwest::header::AUTHORIZATION, token.bearer());
        }
        let request = self.with_csrf(request, &self.logout_url, session.csrf_token.as_ref());

        let result = self.call_empty(request).await;
        self.forget_refresh_cookie()?;
        result
    }
}

/// Parses the base URL, making sure endpoint paths join beneath it
fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Maps a response status to the error taxonomy
fn check_status(status: StatusCode, body: &[u8]) -> Result<(), ApiError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let detail = serde_json::from_slice::<ErrorBody>(body)
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| status.to_string());
            Err(ApiError::AuthFailed(detail))
        }
        _ => Err(ApiError::Http(status)),
    }
}
