//! HTTP endpoints for the ephemeral token store
//!
//! - POST /store - persist a payload, mint a short id
//! - GET /t/:id - HTML reveal page (does not consume)
//! - GET /consume/:id - one-time retrieval, deletes on success

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use dropwire_core::TokenStore;

/// Build the token endpoint router
pub fn build_router(store: TokenStore) -> Router {
    Router::new()
        .route("/store", post(store_handler))
        .route("/t/:id", get(reveal_handler))
        .route("/consume/:id", get(consume_handler))
        .with_state(store)
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
}

/// Request body for POST /store
#[derive(Debug, Deserialize)]
struct StoreRequest {
    #[serde(default)]
    token: Option<String>,
}

/// Response body for POST /store
#[derive(Debug, Serialize)]
struct StoreResponse {
    id: String,
}

/// Response body for GET /consume/:id
#[derive(Debug, Serialize)]
struct ConsumeResponse {
    token: String,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// POST /store - store a payload and return its generated id
async fn store_handler(
    State(store): State<TokenStore>,
    Json(request): Json<StoreRequest>,
) -> std::result::Result<Json<StoreResponse>, (StatusCode, Json<ErrorResponse>)> {
    let token = match request.token {
        Some(token) if !token.is_empty() => token,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "token required".to_string(),
                }),
            ))
        }
    };

    let id = store.store(token).await;
    tracing::debug!(id = %id, "Stored token via HTTP");

    Ok(Json(StoreResponse { id }))
}

/// GET /t/:id - render the reveal page without consuming the token
///
/// A QR scanner or link-preview bot can fetch this page freely; only the
/// page's explicit reveal action hits /consume and burns the token.
async fn reveal_handler(
    State(store): State<TokenStore>,
    Path(id): Path<String>,
) -> std::result::Result<Html<String>, StatusCode> {
    if !store.contains(&id).await {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Html(render_reveal_page(&id)))
}

/// GET /consume/:id - return the payload and delete the entry
async fn consume_handler(
    State(store): State<TokenStore>,
    Path(id): Path<String>,
) -> std::result::Result<Json<ConsumeResponse>, (StatusCode, Json<ErrorResponse>)> {
    match store.consume(&id).await {
        Ok(token) => Ok(Json(ConsumeResponse { token })),
        Err(e) => {
            tracing::debug!(id = %id, "Consume failed: {}", e);
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "expired".to_string(),
                }),
            ))
        }
    }
}

fn render_reveal_page(id: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>dropwire</title>
</head>
<body>
  <h1>dropwire transfer</h1>
  <p>This link is single use. Reveal it only on the device that will receive the file.</p>
  <button id="reveal">Reveal token</button>
  <pre id="token"></pre>
  <script>
    document.getElementById('reveal').addEventListener('click', async () => {{
      const res = await fetch('/consume/{id}');
      const body = await res.json();
      document.getElementById('token').textContent =
        res.ok ? body.token : 'This link has expired.';
    }});
  </script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_mints_an_id() {
        let store = TokenStore::new();
        let response = store_handler(
            State(store.clone()),
            Json(StoreRequest {
                token: Some("OFFER_SDP".to_string()),
            }),
        )
        .await
        .unwrap();

        assert!(!response.0.id.is_empty());
        assert!(store.contains(&response.0.id).await);
    }

    #[tokio::test]
    async fn test_store_without_token_is_rejected() {
        let store = TokenStore::new();
        let err = store_handler(State(store), Json(StoreRequest { token: None }))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1 .0.error, "token required");
    }

    #[tokio::test]
    async fn test_store_with_empty_token_is_rejected() {
        let store = TokenStore::new();
        let err = store_handler(
            State(store),
            Json(StoreRequest {
                token: Some(String::new()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reveal_renders_without_consuming() {
        let store = TokenStore::new();
        let id = store.store("OFFER_SDP").await;

        let page = reveal_handler(State(store.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert!(page.0.contains(&id));

        // Still consumable afterwards
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn test_reveal_unknown_id_is_404() {
        let store = TokenStore::new();
        let status = reveal_handler(State(store), Path("nosuchid00".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_consume_deletes_the_entry() {
        let store = TokenStore::new();
        let id = store.store("OFFER_SDP_X").await;

        let response = consume_handler(State(store.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(response.0.token, "OFFER_SDP_X");

        let err = consume_handler(State(store), Path(id)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert_eq!(err.1 .0.error, "expired");
    }
}
