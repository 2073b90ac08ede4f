//! End-to-end HTTP tests against a server bound to an ephemeral port.
//!
//! Uses the offline stack (hashing embedder, SQLite vectors, extractive
//! generator) so no network access is needed.

use serde_json::{json, Value};
use tempfile::TempDir;

use support_harness::config::Config;
use support_harness::providers::Providers;
use support_harness::server::{serve, AppState};

struct TestServer {
    base: String,
    client: reqwest::Client,
    _tmp: TempDir,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::with_db_path(tmp.path().join("support.sqlite"));
    config.retrieval.similarity_threshold = 0.25;

    let providers = Providers::from_config(&config).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, AppState::new(config, providers)));

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _tmp: tmp,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn ingest_password_guide(&self) -> Value {
        let (status, body) = self
            .post(
                "/ingest",
                json!({
                    "source_type": "md",
                    "filters": {
                        "title": "account-guide.md",
                        "text": "To reset your password, open Settings and choose Reset password.",
                        "product_version": "2.1",
                        "tags": ["account"]
                    }
                }),
            )
            .await;
        assert_eq!(status, 200, "ingest failed: {}", body);
        body
    }
}

#[tokio::test]
async fn test_health_reports_providers() {
    let server = start_server().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["providers"]["embedding"], "hash");
    assert_eq!(body["providers"]["vector_store"], "sqlite");
    assert_eq!(body["providers"]["generation"], "extractive");
    assert!(body["providers"]["generation_model"].as_str().is_some());
    assert_eq!(body["chunks"], 0);
}

#[tokio::test]
async fn test_chat_answers_with_sources_and_records_conversation() {
    let server = start_server().await;
    let report = server.ingest_password_guide().await;
    assert_eq!(report["chunks_created"], 1);

    let (status, chat) = server
        .post(
            "/chat",
            json!({"user_id": "alice", "query": "How do I reset my password?"}),
        )
        .await;
    assert_eq!(status, 200, "chat failed: {}", chat);
    assert_eq!(chat["fallback_triggered"], false);
    assert_eq!(chat["sources"][0]["document_title"], "account-guide.md");
    assert_eq!(chat["sources"][0]["source_type"], "md");
    assert!(chat["answer"].as_str().unwrap().contains("reset your password"));
    let confidence = chat["confidence"].as_f64().unwrap();
    assert!(confidence > 0.25 && confidence <= 1.0);

    let conversation_id = chat["conversation_id"].as_str().unwrap().to_string();
    let (status, conversation) = server
        .get(&format!("/conversations/{}", conversation_id))
        .await;
    assert_eq!(status, 200);
    assert_eq!(conversation["user_id"], "alice");
    let messages = conversation["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");

    let (status, feedback) = server
        .post(
            "/feedback",
            json!({"conversation_id": conversation_id, "user_id": "alice", "rating": 5}),
        )
        .await;
    assert_eq!(status, 200);
    assert!(feedback["feedback_id"].as_str().is_some());

    let (status, listed) = server
        .get(&format!("/conversations/{}/feedback", conversation_id))
        .await;
    assert_eq!(status, 200);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["rating"], 5);
    assert_eq!(listed[0]["id"], feedback["feedback_id"]);
}

#[tokio::test]
async fn test_follow_up_appends_to_conversation() {
    let server = start_server().await;
    server.ingest_password_guide().await;

    let (_, first) = server
        .post("/chat", json!({"user_id": "bob", "query": "reset password"}))
        .await;
    let id = first["conversation_id"].as_str().unwrap().to_string();

    let (status, second) = server
        .post(
            "/chat",
            json!({"user_id": "bob", "query": "where are the settings?", "conversation_id": id}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(second["conversation_id"], id.as_str());

    let (_, conversation) = server.get(&format!("/conversations/{}", id)).await;
    assert_eq!(conversation["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_unrelated_question_falls_back() {
    let server = start_server().await;
    server.ingest_password_guide().await;

    let (status, chat) = server
        .post(
            "/chat",
            json!({"user_id": "carol", "query": "invoice refund shipping delay"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(chat["fallback_triggered"], true);
    assert_eq!(chat["sources"].as_array().unwrap().len(), 0);
    assert_eq!(chat["confidence"], 0.0);
}

#[tokio::test]
async fn test_product_version_filter_excludes_other_versions() {
    let server = start_server().await;
    server.ingest_password_guide().await;

    let (_, chat) = server
        .post(
            "/chat",
            json!({"user_id": "dan", "query": "How do I reset my password?", "product_version": "3.0"}),
        )
        .await;
    assert_eq!(chat["fallback_triggered"], true);

    let (_, docs) = server.get("/documents?product_version=3.0").await;
    assert_eq!(docs.as_array().unwrap().len(), 0);
    let (_, docs) = server.get("/documents?product_version=2.1").await;
    assert_eq!(docs[0]["title"], "account-guide.md");
    assert_eq!(docs[0]["chunks_count"], 1);
}

#[tokio::test]
async fn test_same_title_keeps_each_product_version() {
    let server = start_server().await;
    server.ingest_password_guide().await;
    let (status, body) = server
        .post(
            "/ingest",
            json!({
                "source_type": "md",
                "filters": {
                    "title": "account-guide.md",
                    "text": "To reset your password, open Settings and choose Reset password. The Security tab lists active sessions.",
                    "product_version": "2.2"
                }
            }),
        )
        .await;
    assert_eq!(status, 200, "ingest failed: {}", body);

    let (_, old) = server.get("/documents?product_version=2.1").await;
    let (_, new) = server.get("/documents?product_version=2.2").await;
    assert_eq!(old.as_array().unwrap().len(), 1);
    assert_eq!(new.as_array().unwrap().len(), 1);
    assert_ne!(old[0]["chunk_ids"][0], new[0]["chunk_ids"][0]);

    for (version, docs) in [("2.1", &old), ("2.2", &new)] {
        let (status, chat) = server
            .post(
                "/chat",
                json!({"user_id": "dan", "query": "How do I reset my password?", "product_version": version}),
            )
            .await;
        assert_eq!(status, 200, "chat failed: {}", chat);
        assert_eq!(chat["fallback_triggered"], false);
        assert_eq!(chat["sources"].as_array().unwrap().len(), 1);
        assert_eq!(chat["sources"][0]["chunk_id"], docs[0]["chunk_ids"][0]);
    }
}

#[tokio::test]
async fn test_invalid_requests_use_error_envelope() {
    let server = start_server().await;

    let (status, body) = server
        .post("/chat", json!({"user_id": "alice", "query": "   "}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = server
        .client
        .post(format!("{}/chat", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server.get("/conversations/does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = server
        .post(
            "/chat",
            json!({"user_id": "alice", "query": "hi", "conversation_id": "missing"}),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_feedback_validation() {
    let server = start_server().await;
    server.ingest_password_guide().await;
    let (_, chat) = server
        .post("/chat", json!({"user_id": "eve", "query": "reset password"}))
        .await;
    let id = chat["conversation_id"].as_str().unwrap();

    let (status, body) = server
        .post(
            "/feedback",
            json!({"conversation_id": id, "user_id": "eve", "rating": 9}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = server
        .post(
            "/feedback",
            json!({"conversation_id": "nope", "user_id": "eve", "rating": 3}),
        )
        .await;
    assert_eq!(status, 404);

    let (status, body) = server.get("/conversations/nope/feedback").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_ticket_upload_and_document_deletion() {
    let server = start_server().await;
    let (status, body) = server
        .post(
            "/upload/tickets",
            json!({
                "data_type": "zendesk",
                "records": [
                    {
                        "id": 42,
                        "subject": "Login loop",
                        "description": "User is redirected back to the login page.",
                        "comments": [{"body": "Clearing cookies fixed it."}]
                    },
                    {"unrelated": null}
                ]
            }),
        )
        .await;
    assert_eq!(status, 200, "upload failed: {}", body);
    assert_eq!(body["documents"], 1);
    assert_eq!(body["skipped"].as_array().unwrap().len(), 1);

    let (_, docs) = server.get("/documents").await;
    let doc = &docs[0];
    assert_eq!(doc["source_type"], "zendesk");
    let title = doc["title"].as_str().unwrap().to_string();
    assert!(title.contains("42"));

    let (status, chat) = server
        .post(
            "/chat",
            json!({"user_id": "frank", "query": "login page redirected loop cookies"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(chat["sources"][0]["ticket_id"], "42");

    let encoded = title.replace(' ', "%20").replace(':', "%3A");
    let (status, deleted) = server
        .delete(&format!("/documents/zendesk/{}", encoded))
        .await;
    assert_eq!(status, 200);
    assert_eq!(deleted["deleted"], 1);

    let (status, _) = server
        .delete(&format!("/documents/zendesk/{}", encoded))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_chunk_ingest_scope_and_delete() {
    let server = start_server().await;
    let (status, report) = server
        .post(
            "/ingest",
            json!({
                "source_type": "txt",
                "filters": {
                    "chunks": [
                        {"id": "faq-1", "title": "faq", "source_type": "txt",
                         "text": "Reset your password from the login page."},
                        {"id": "faq-2", "title": "faq", "source_type": "txt",
                         "text": "Reset your password by contacting support."}
                    ]
                }
            }),
        )
        .await;
    assert_eq!(status, 200, "ingest failed: {}", report);
    assert_eq!(report["chunks_created"], 2);

    let (_, chat) = server
        .post(
            "/chat",
            json!({"user_id": "gina", "query": "reset password support", "document_ids": ["faq-2"]}),
        )
        .await;
    let sources = chat["sources"].as_array().unwrap();
    assert!(sources.iter().all(|s| s["chunk_id"] == "faq-2"));

    let (status, _) = server.delete("/chunks/faq-1").await;
    assert_eq!(status, 200);
    let (status, body) = server.delete("/chunks/faq-1").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (_, health) = server.get("/health").await;
    assert_eq!(health["chunks"], 1);
}

#[tokio::test]
async fn test_upload_infers_source_type() {
    let server = start_server().await;
    let (status, report) = server
        .post(
            "/upload",
            json!({"title": "billing.md", "text": "Invoices are emailed monthly."}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["chunks_created"], 1);

    let (_, docs) = server.get("/documents").await;
    assert_eq!(docs[0]["source_type"], "md");

    let (status, body) = server
        .post("/upload", json!({"title": "empty.txt", "text": "  "}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}
