//! blogroll - Session lifecycle client for a social-blogging backend
//!
//! Handles the part of a blogging client that has to get authentication
//! right: logging in, restoring a previous login silently at start-up, and
//! refreshing the access token when the backend rejects it.
//!
//! ## Architecture
//!
//! - **Session**: the session store, the persisted-login gate and
//!   refresh-on-demand
//! - **Api**: the backend contract and its reqwest implementation
//! - **Auth**: persistence of the refresh credential between runs
//! - **Security**: token handling and log redaction
//!
//! Everything hangs off an [`App`] created at the application root and torn
//! down with [`App::shutdown`].

pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod security;
pub mod session;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use api::{ApiError, AuthApi, HttpAuthApi};
use auth::{CredentialStore, KeyringStore};
use config::AppConfig;
use session::{PersistLoginGate, SessionStore};

/// Application root: configuration, session store and backend client
pub struct App {
    pub config: AppConfig,
    /// Session shared with every component
    pub session: Arc<SessionStore>,
    pub api: Arc<dyn AuthApi>,
    /// Parent of every gate's cancellation token
    cancel: CancellationToken,
}

impl App {
    /// Creates the application with the HTTP backend client
    pub fn new(config: AppConfig) -> Result<Self, ApiError> {
        let api = if config.remember_login {
            let vault: Arc<dyn CredentialStore> =
                Arc::new(KeyringStore::with_service(config.keyring_service.clone()));
            HttpAuthApi::with_vault(&config.api, vault)?
        } else {
            HttpAuthApi::new(&config.api)?
        };
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Creates the application over any backend implementation
    pub fn with_api(config: AppConfig, api: Arc<dyn AuthApi>) -> Self {
        Self {
            config,
            session: Arc::new(SessionStore::new()),
            api,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a login gate bound to this application's lifetime
    pub fn gate(&self) -> PersistLoginGate {
        PersistLoginGate::with_parent(
            Arc::clone(&self.session),
            Arc::clone(&self.api),
            &self.cancel,
        )
    }

    /// Token cancelled on shutdown
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels every outstanding gate and request
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down");
        self.cancel.cancel();
    }
}

/// Initializes logging
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at debug and
/// everything else at info.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,blogroll_lib=debug,blogroll=debug")
    });

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        tracing::debug!("Tracing already initialized: {}", e);
    }
}
