use crate::auto_reply::AutoReplyService;
use crate::db::Db;
use crate::models::{AutoSendStats, FullRunReport};
use crate::pipeline::PipelineCoordinator;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, catch, get, post};
use std::sync::Arc;

#[get("/api/v1/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hostdesk",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/api/v1/stats")]
pub fn stats(db: &State<Db>) -> Json<serde_json::Value> {
    let conn = db.conn();

    let message_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM incoming_messages", [], |r| r.get(0))
        .unwrap_or(0);
    let needs_reply: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM incoming_messages WHERE actionability = 'NEEDS_REPLY'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let outgoing_copies: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM incoming_messages WHERE actionability = 'OUTGOING_COPY'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let reply_logs: i64 = conn
        .query_row("SELECT COUNT(*) FROM auto_reply_logs", [], |r| r.get(0))
        .unwrap_or(0);
    let replies_sent: i64 = conn
        .query_row("SELECT COUNT(*) FROM auto_reply_logs WHERE sent = 1", [], |r| {
            r.get(0)
        })
        .unwrap_or(0);
    let open_notifications: i64 = conn
        .query_row("SELECT COUNT(*) FROM staff_notifications WHERE done = 0", [], |r| {
            r.get(0)
        })
        .unwrap_or(0);
    let eligible_gates: i64 = conn
        .query_row("SELECT COUNT(*) FROM auto_send_stats WHERE eligible = 1", [], |r| {
            r.get(0)
        })
        .unwrap_or(0);
    let embeddings: i64 = conn
        .query_row("SELECT COUNT(*) FROM answer_embeddings", [], |r| r.get(0))
        .unwrap_or(0);

    Json(serde_json::json!({
        "messages": message_count,
        "needs_reply": needs_reply,
        "outgoing_copies": outgoing_copies,
        "reply_logs": reply_logs,
        "replies_sent": replies_sent,
        "open_staff_notifications": open_notifications,
        "eligible_auto_send_keys": eligible_gates,
        "answer_embeddings": embeddings,
    }))
}

/// Per-FAQ-key auto-send statistics for one property, busiest keys first.
#[get("/api/v1/auto-send-stats?<property_code>")]
pub fn auto_send_stats(
    db: &State<Db>,
    service: &State<Arc<AutoReplyService>>,
    property_code: &str,
) -> Json<Vec<AutoSendStats>> {
    let conn = db.conn();
    Json(service.gate.list_for_property(&conn, property_code))
}

/// Operator-triggered pipeline run. `mode=ingest` skips the reply phase.
#[post("/api/v1/pipeline/run?<mode>&<max>&<since_days>&<force>")]
pub async fn run_pipeline(
    coordinator: &State<Arc<PipelineCoordinator>>,
    mode: Option<&str>,
    max: Option<usize>,
    since_days: Option<u32>,
    force: Option<bool>,
) -> Result<Json<FullRunReport>, (Status, Json<serde_json::Value>)> {
    let max = max.unwrap_or(coordinator.default_batch);
    let since_days = since_days.unwrap_or(coordinator.default_since_days);

    let result = if mode == Some("ingest") {
        coordinator
            .run_ingest_only(max, since_days)
            .await
            .map(|tick| FullRunReport {
                tick,
                ..FullRunReport::default()
            })
    } else {
        coordinator
            .run_full_tick(max, since_days, force.unwrap_or(false))
            .await
    };

    result.map(Json).map_err(|e| {
        (
            Status::BadGateway,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })
}

#[catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}
