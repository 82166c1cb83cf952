//! Refresh-on-demand for authenticated requests
//!
//! Wraps a request that needs the access token. A rejected token triggers one
//! refresh and one retry; a failed refresh ends the session.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::store::SessionStore;
use crate::api::{ApiError, AuthApi};
use crate::security::Token;

/// Exchanges the persisted credential for a new access token and stores it
///
/// Any failure other than cancellation clears the session.
pub async fn refresh_session(
    store: &SessionStore,
    api: &dyn AuthApi,
    cancel: &CancellationToken,
) -> Result<Token, ApiError> {
    match api.refresh(cancel).await {
        Ok(token) => {
            tracing::debug!("Access token refreshed ({})", token.redacted());
            store.set_access_token(Some(token.clone())).await;
            Ok(token)
        }
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(e) => {
            tracing::warn!("Refresh failed, ending session: {}", e);
            store.clear().await;
            Err(e)
        }
    }
}

/// Runs `op` with the current access token, refreshing once if rejected
///
/// Without a token in the store the refresh happens first. Only
/// [`ApiError::AuthFailed`] triggers the retry.
pub async fn with_refresh<T, F, Fut>(
    store: &SessionStore,
    api: &dyn AuthApi,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut(Token) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let token = match store.access_token().await {
        Some(token) => token,
        None => refresh_session(store, api, cancel).await?,
    };

    match op(token).await {
        Err(e) if e.is_auth() => {
            tracing::debug!("Access token rejected ({}), refreshing", e);
            let token = refresh_session(store, api, cancel).await?;
            op(token).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use crate::session::Profile;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_valid_token_no_refresh() {
        let store = SessionStore::new();
        store.set_access_token(Some(Token::new("tok-1"))).await;
        let mut api = MockAuthApi::new();
        api.expect_refresh().never();

        let result = with_refresh(&store, &api, &CancellationToken::new(), |token| async move {
            Ok::<_, ApiError>(token.expose().to_string())
        })
        .await
        .unwrap();

        assert_eq!(result, "tok-1");
    }

    #[tokio::test]
    async fn test_rejected_token_refreshes_and_retries_once() {
        let store = SessionStore::new();
        store.set_access_token(Some(Token::new("old"))).await;
        store.set_user(Some(Profile::new(1, "alice"))).await;

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Ok(Token::new("new")));

        let attempts = Arc::new(AtomicU32::new(0));
        let result = with_refresh(&store, &api, &CancellationToken::new(), |token| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if token == "old" {
                    Err(ApiError::AuthFailed("Token is expired".into()))
                } else {
                    Ok(token.expose().to_string())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "new");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.access_token().await, Some(Token::new("new")));
        assert_eq!(store.user().await.map(|u| u.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_second_rejection_is_returned() {
        let store = SessionStore::new();
        store.set_access_token(Some(Token::new("old"))).await;

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Ok(Token::new("new")));

        let result: Result<(), ApiError> =
            with_refresh(&store, &api, &CancellationToken::new(), |_| async {
                Err(ApiError::AuthFailed("forbidden".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_token_refreshes_first() {
        let store = SessionStore::new();
        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|_| Ok(Token::new("fresh")));

        let result = with_refresh(&store, &api, &CancellationToken::new(), |token| async move {
            Ok::<_, ApiError>(token.len())
        })
        .await
        .unwrap();

        assert_eq!(result, 5);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_session() {
        let store = SessionStore::new();
        store.set_access_token(Some(Token::new("old"))).await;
        store.set_csrf_token(Some(Token::new("csrf"))).await;

        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .returning(|_| Err(ApiError::AuthFailed("expired".into())));

        let result: Result<(), ApiError> =
            with_refresh(&store, &api, &CancellationToken::new(), |_| async {
                Err(ApiError::AuthFailed("expired".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(!store.is_authenticated().await);
        assert!(store.csrf_token().await.is_none());
    }

    #[tokio::test]
    async fn test_non_auth_error_is_not_retried() {
        let store = SessionStore::new();
        store.set_access_token(Some(Token::new("tok"))).await;
        let mut api = MockAuthApi::new();
        api.expect_refresh().never();

        let result: Result<(), ApiError> =
            with_refresh(&store, &api, &CancellationToken::new(), |_| async {
                Err(ApiError::Http(reqwest::StatusCode::SERVICE_UNAVAILABLE))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Http(_))));
        assert!(store.is_authenticated().await);
    }
}
