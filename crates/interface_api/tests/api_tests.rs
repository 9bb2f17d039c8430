//! HTTP tests against the in-memory adapters

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};

use core_kernel::{AccountId, Amount};
use domain_ledger::memory::{InMemoryLedgerStore, MockRemoteBehavior, MockRemoteFunding, RecordingEventPublisher};
use domain_ledger::{EngineConfig, LedgerEngine};
use interface_api::config::ApiConfig;
use interface_api::create_router;

struct TestApp {
    server: TestServer,
    engine: Arc<LedgerEngine>,
    remote: Arc<MockRemoteFunding>,
}

impl TestApp {
    fn new() -> Self {
        let remote = Arc::new(MockRemoteFunding::approving());
        let config = EngineConfig {
            remote_timeout_ms: 200,
            stale_threshold_secs: 60,
            ..Default::default()
        };
        let engine = Arc::new(
            LedgerEngine::new(
                Arc::new(InMemoryLedgerStore::new()),
                remote.clone(),
                Arc::new(RecordingEventPublisher::new()),
                config,
            )
            .unwrap(),
        );
        let server = TestServer::new(create_router(engine.clone(), ApiConfig::default())).unwrap();
        Self { server, engine, remote }
    }

    fn as_user(request: TestRequest, user: &str) -> TestRequest {
        request.add_header(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_str(user).unwrap(),
        )
    }

    async fn open_account(&self, user: &str, balance: i64) -> AccountId {
        let response = Self::as_user(self.server.post("/api/v1/accounts"), user)
            .json(&json!({ "kind": "PERSONAL" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let id: AccountId = serde_json::from_value(response.json::<Value>()["accountId"].clone()).unwrap();

        if balance > 0 {
            self.engine
                .accounts
                .charge(id, Amount::new(balance).unwrap())
                .await
                .unwrap();
        }
        id
    }

    async fn balance(&self, user: &str, account_id: AccountId) -> i64 {
        let response = Self::as_user(
            self.server.get(&format!("/api/v1/accounts/{}/balance", account_id)),
            user,
        )
        .await;
        response.assert_status_ok();
        response.json::<Value>()["balance"].as_i64().unwrap()
    }

    async fn pay(&self, user: &str, payer: AccountId, amount: i64, key: &str) -> axum_test::TestResponse {
        Self::as_user(self.server.post("/api/v1/payments"), user)
            .json(&json!({
                "idempotencyKey": key,
                "payerAccountId": payer,
                "amount": amount,
                "recipient": { "name": "Corner Cafe" }
            }))
            .await
    }
}

// ============================================================================
// Health and Identity Tests
// ============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let app = TestApp::new();
        let response = app.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_with_in_memory_store() {
        let app = TestApp::new();
        let response = app.server.get("/health/ready").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ready");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = TestApp::new();
        let response = app.server.get("/api/v1/accounts").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["code"], "MISSING_IDENTITY");
    }
}

// ============================================================================
// Account Tests
// ============================================================================

mod account_tests {
    use super::*;

    #[tokio::test]
    async fn test_audit_recomputes_balance_for_owner_only() {
        let app = TestApp::new();
        let id = app.open_account("alice", 1_200).await;

        let response = TestApp::as_user(app.server.get(&format!("/api/v1/accounts/{}/audit", id)), "alice").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["balance"], 1_200);
        assert_eq!(body["cachedBalance"], 1_200);
        assert_eq!(body["entryCount"], 1);
        assert_eq!(body["consistent"], true);

        let foreign = TestApp::as_user(app.server.get(&format!("/api/v1/accounts/{}/audit", id)), "bob").await;
        foreign.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_open_list_and_read() {
        let app = TestApp::new();
        let id = app.open_account("alice", 2_500).await;

        let list = TestApp::as_user(app.server.get("/api/v1/accounts"), "alice").await;
        list.assert_status_ok();
        let accounts = list.json::<Value>();
        assert_eq!(accounts.as_array().unwrap().len(), 1);
        assert_eq!(accounts[0]["balance"], 2_500);

        let one = TestApp::as_user(app.server.get(&format!("/api/v1/accounts/{}", id)), "alice").await;
        one.assert_status_ok();
        assert_eq!(one.json::<Value>()["ownerId"], "alice");
    }

    #[tokio::test]
    async fn test_foreign_account_is_forbidden_and_unknown_is_not_found() {
        let app = TestApp::new();
        let id = app.open_account("alice", 0).await;

        let foreign = TestApp::as_user(app.server.get(&format!("/api/v1/accounts/{}/balance", id)), "mallory").await;
        foreign.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(foreign.json::<Value>()["code"], "ACCOUNT_NOT_OWNED");

        let unknown = TestApp::as_user(
            app.server.get(&format!("/api/v1/accounts/{}", AccountId::new())),
            "alice",
        )
        .await;
        unknown.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(unknown.json::<Value>()["code"], "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_close_requires_empty_account() {
        let app = TestApp::new();
        let funded = app.open_account("alice", 100).await;
        let empty = app.open_account("alice", 0).await;

        let refused = TestApp::as_user(app.server.post(&format!("/api/v1/accounts/{}/close", funded)), "alice").await;
        refused.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let closed = TestApp::as_user(app.server.post(&format!("/api/v1/accounts/{}/close", empty)), "alice").await;
        closed.assert_status_ok();
        assert_eq!(closed.json::<Value>()["isActive"], false);

        let list = TestApp::as_user(app.server.get("/api/v1/accounts"), "alice").await;
        assert_eq!(list.json::<Value>().as_array().unwrap().len(), 1);
    }
}

// ============================================================================
// Payment Tests
// ============================================================================

mod payment_tests {
    use super::*;

    #[tokio::test]
    async fn test_payment_then_replay() {
        let app = TestApp::new();
        let account = app.open_account("bob", 10_000).await;

        let first = app.pay("bob", account, 3_000, "order-42").await;
        first.assert_status(StatusCode::CREATED);
        let body = first.json::<Value>();
        assert_eq!(body["status"], "SUCCEEDED");
        assert_eq!(body["balanceAfter"], 7_000);
        assert_eq!(body["replayed"], false);

        let replay = app.pay("bob", account, 3_000, "order-42").await;
        replay.assert_status_ok();
        let replayed = replay.json::<Value>();
        assert_eq!(replayed["replayed"], true);
        assert_eq!(replayed["code"], "DUPLICATE_REQUEST");
        assert_eq!(replayed["paymentId"], body["paymentId"]);

        assert_eq!(app.balance("bob", account).await, 7_000);
    }

    #[tokio::test]
    async fn test_insufficient_funds_lists_alternatives() {
        let app = TestApp::new();
        let poor = app.open_account("bob", 1_000).await;
        let rich = app.open_account("bob", 50_000).await;

        let response = app.pay("bob", poor, 5_000, "order-43").await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["alternatives"][0]["accountId"], json!(rich));

        assert_eq!(app.balance("bob", poor).await, 1_000);
    }

    #[tokio::test]
    async fn test_invalid_body_is_rejected() {
        let app = TestApp::new();
        let account = app.open_account("bob", 1_000).await;

        let response = app.pay("bob", account, 0, "order-44").await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_key_reuse_with_other_amount_conflicts() {
        let app = TestApp::new();
        let account = app.open_account("bob", 10_000).await;

        app.pay("bob", account, 1_000, "order-45").await.assert_status(StatusCode::CREATED);
        let conflict = app.pay("bob", account, 2_000, "order-45").await;
        conflict.assert_status(StatusCode::CONFLICT);
        assert_eq!(conflict.json::<Value>()["code"], "IDEMPOTENCY_KEY_CONFLICT");
        assert_eq!(app.balance("bob", account).await, 9_000);
    }
}

// ============================================================================
// Transfer Tests
// ============================================================================

mod transfer_tests {
    use super::*;

    #[tokio::test]
    async fn test_internal_transfer_moves_funds() {
        let app = TestApp::new();
        let source = app.open_account("carol", 8_000).await;
        let destination = app.open_account("carol", 0).await;

        let response = TestApp::as_user(app.server.post("/api/v1/transfers"), "carol")
            .json(&json!({
                "idempotencyKey": "move-1",
                "destinationAccountId": destination,
                "amount": 3_000,
                "funding": { "mode": "INTERNAL", "sourceAccountId": source }
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["destinationBalanceAfter"], 3_000);
        assert_eq!(body["sourceBalanceAfter"], 5_000);

        assert_eq!(app.balance("carol", source).await, 5_000);
        assert_eq!(app.balance("carol", destination).await, 3_000);
    }

    #[tokio::test]
    async fn test_remote_rejection_is_bad_gateway_without_credit() {
        let app = TestApp::new();
        let destination = app.open_account("dave", 0).await;
        app.remote.set_behavior(MockRemoteBehavior::Reject("insufficient remote balance".into()));

        let response = TestApp::as_user(app.server.post("/api/v1/transfers"), "dave")
            .json(&json!({
                "idempotencyKey": "fund-1",
                "destinationAccountId": destination,
                "amount": 50_000,
                "funding": { "mode": "REMOTE" }
            }))
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json::<Value>()["code"], "REMOTE_FUNDING_FAILED");
        assert_eq!(app.balance("dave", destination).await, 0);
    }

    #[tokio::test]
    async fn test_remote_funding_for_another_owner_is_unprocessable() {
        let app = TestApp::new();
        let destination = app.open_account("mallory", 0).await;

        let response = TestApp::as_user(app.server.post("/api/v1/transfers"), "mallory")
            .json(&json!({
                "idempotencyKey": "fund-foreign",
                "destinationAccountId": destination,
                "amount": 50_000,
                "funding": { "mode": "REMOTE", "remoteOwnerId": "alice" }
            }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["code"], "VALIDATION_ERROR");
        assert_eq!(app.remote.call_count(), 0);
        assert_eq!(app.balance("mallory", destination).await, 0);
    }

    #[tokio::test]
    async fn test_remote_timeout_is_gateway_timeout() {
        let app = TestApp::new();
        let destination = app.open_account("erin", 0).await;
        app.remote.set_behavior(MockRemoteBehavior::Hang);

        let response = TestApp::as_user(app.server.post("/api/v1/transfers"), "erin")
            .json(&json!({
                "idempotencyKey": "fund-2",
                "destinationAccountId": destination,
                "amount": 1_000,
                "funding": { "mode": "REMOTE" }
            }))
            .await;
        response.assert_status(StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(app.balance("erin", destination).await, 0);
    }
}

// ============================================================================
// History Tests
// ============================================================================

mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_pages_follow_the_cursor() {
        let app = TestApp::new();
        let account = app.open_account("frank", 10_000).await;
        for i in 0..3 {
            app.pay("frank", account, 100, &format!("h-{}", i))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let first = TestApp::as_user(
            app.server
                .get(&format!("/api/v1/history?accountId={}&size=2&type=payments", account)),
            "frank",
        )
        .await;
        first.assert_status_ok();
        let page = first.json::<Value>();
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["hasMore"], true);

        let cursor_at = page["nextCursorCreatedAt"].as_str().unwrap().to_string();
        let cursor_id = page["nextCursorId"].as_i64().unwrap();
        let second = TestApp::as_user(
            app.server.get("/api/v1/history").add_query_params(json!({
                "accountId": account,
                "size": 2,
                "type": "payments",
                "cursorCreatedAt": cursor_at,
                "cursorId": cursor_id,
            })),
            "frank",
        )
        .await;
        second.assert_status_ok();
        let page = second.json::<Value>();
        assert_eq!(page["items"].as_array().unwrap().len(), 1);
        assert_eq!(page["hasMore"], false);
        assert!(page["nextCursorId"].is_null());
    }

    #[tokio::test]
    async fn test_foreign_history_is_forbidden() {
        let app = TestApp::new();
        let account = app.open_account("frank", 0).await;

        let response = TestApp::as_user(
            app.server.get(&format!("/api/v1/history?accountId={}", account)),
            "grace",
        )
        .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_half_cursor_is_rejected() {
        let app = TestApp::new();
        let account = app.open_account("frank", 0).await;

        let response = TestApp::as_user(
            app.server
                .get(&format!("/api/v1/history?accountId={}&cursorId=5", account)),
            "frank",
        )
        .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
}
