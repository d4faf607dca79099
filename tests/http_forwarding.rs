//! Forwarding to the next stage over HTTP push, against a local axum
//! receiver.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use echo::{
    Disposition, Document, EchoConfig, PipelineError, PipelineResources, TOPIC_ANALYZED,
    decode_stage_message,
};
use serde_json::Value;

type Received = Arc<Mutex<Vec<Value>>>;

async fn spawn(router: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

fn receiver(received: Received, status: StatusCode) -> Router {
    Router::new()
        .route(
            "/summarize",
            post(
                move |State(received): State<Received>, Json(body): Json<Value>| async move {
                    received.lock().unwrap().push(body);
                    status
                },
            ),
        )
        .with_state(received)
}

fn http_config(endpoint: String, push_envelope: bool) -> EchoConfig {
    let mut config = EchoConfig::default();
    config.queue.backend = "http".into();
    config.queue.push_envelope = push_envelope;
    config
        .queue
        .endpoints
        .insert(TOPIC_ANALYZED.to_string(), endpoint);
    config
}

#[tokio::test]
async fn forwards_push_envelope_to_next_stage() -> anyhow::Result<()> {
    let received: Received = Arc::default();
    let base = spawn(receiver(received.clone(), StatusCode::NO_CONTENT)).await?;
    let resources = PipelineResources::init(http_config(format!("{base}/summarize"), true))?;
    assert!(resources.memory_queue().is_none());

    resources
        .documents()
        .put_document(&Document::new("doc-h", "Wind turbines", "blade icing"))?;
    resources.runner().process("doc-h").await?;

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["subscription"], TOPIC_ANALYZED);
    let forwarded = decode_stage_message(serde_json::to_string(&bodies[0])?.as_bytes())?;
    assert_eq!(forwarded.doc_id, "doc-h");
    Ok(())
}

#[tokio::test]
async fn forwards_bare_message_when_envelope_disabled() -> anyhow::Result<()> {
    let received: Received = Arc::default();
    let base = spawn(receiver(received.clone(), StatusCode::OK)).await?;
    let resources = PipelineResources::init(http_config(format!("{base}/summarize"), false))?;

    resources
        .documents()
        .put_document(&Document::new("doc-b", "Lunar regolith", "oxygen extraction"))?;
    resources.runner().process("doc-b").await?;

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies, vec![serde_json::json!({ "doc_id": "doc-b" })]);
    Ok(())
}

#[tokio::test]
async fn rejected_push_leaves_message_for_redelivery() -> anyhow::Result<()> {
    let received: Received = Arc::default();
    let base = spawn(receiver(received.clone(), StatusCode::INTERNAL_SERVER_ERROR)).await?;
    let resources = PipelineResources::init(http_config(format!("{base}/summarize"), false))?;

    resources
        .documents()
        .put_document(&Document::new("doc-x", "Battery chemistry", "sodium ion"))?;
    let err = resources.runner().process("doc-x").await.unwrap_err();

    assert!(matches!(err, PipelineError::ForwardFailed { .. }));
    assert_eq!(err.disposition(), Disposition::Retry);
    assert!(resources.analyses().get_analysis("doc-x")?.is_some());
    Ok(())
}
