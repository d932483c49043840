//! Liveness ping.

use axum::Json;
use serde_json::{json, Value};

/// GET /ping — always `{"message": "pong"}`.
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_returns_pong() {
        let Json(body) = ping().await;
        assert_eq!(body["message"], "pong");
    }
}
