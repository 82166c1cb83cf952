//! Front-end commands
//!
//! The operations a user interface drives. Errors are flattened to strings
//! for display.

use serde::Serialize;

use crate::security::redact;
use crate::session::{GateState, Profile};
use crate::App;

/// Summary of the current session, safe to print
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub username: Option<String>,
    pub gate: String,
}

/// Logs in and loads the profile
///
/// A login whose profile cannot be loaded is undone, so a failed login never
/// leaves a session behind.
pub async fn login(app: &App, email: &str, password: &str) -> Result<Profile, String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err("Email and password are required".to_string());
    }

    let cancel = app.cancel_token();
    let grant = app
        .api
        .login(email.trim(), password, &cancel)
        .await
        .map_err(|e| e.to_string())?;

    app.session.set_access_token(Some(grant.access_token.clone())).await;
    app.session.set_csrf_token(grant.csrf_token).await;

    let profile = match app.api.current_user(&grant.access_token, &cancel).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Profile fetch failed, undoing login: {}", e);
            logout(app).await?;
            return Err(e.to_string());
        }
    };
    app.session.set_user(Some(profile.clone())).await;

    tracing::info!("Logged in as {} ({})", profile.username, redact::email(email));
    Ok(profile)
}

/// Ends the session locally and on the backend
///
/// The local session is cleared even when the backend call fails.
pub async fn logout(app: &App) -> Result<(), String> {
    let session = app.session.snapshot().await;
    if let Err(e) = app.api.logout(&session).await {
        tracing::warn!("Backend logout failed: {}", e);
    }
    app.session.clear().await;
    tracing::info!("Logged out");
    Ok(())
}

/// Silently restores a previous login
pub async fn restore(app: &App) -> Result<GateState, String> {
    let gate = app.gate();
    Ok(gate.mount().await)
}

/// Restores the session and returns the logged-in profile, if any
pub async fn whoami(app: &App) -> Result<Option<Profile>, String> {
    restore(app).await?;
    Ok(app.session.user().await)
}

/// Restores the session and summarizes it
pub async fn status(app: &App) -> Result<SessionStatus, String> {
    let gate = restore(app).await?;
    let session = app.session.snapshot().await;
    Ok(SessionStatus {
        authenticated: session.is_authenticated(),
        username: session.user.map(|u| u.username),
        gate: format!("{:?}", gate),
    })
}
