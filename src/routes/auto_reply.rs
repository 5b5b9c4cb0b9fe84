use crate::auto_reply::{self, AutoReplyService};
use crate::db::{self, Db};
use crate::events::EventHub;
use crate::models::{AutoReplyLogEntry, AutoReplyRequest, AutoReplySuggestion, ReplyFeedback};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use std::sync::Arc;

#[post("/api/v1/messages/<message_id>/auto-reply", format = "json", data = "<body>")]
pub async fn suggest_auto_reply(
    db: &State<Db>,
    hub: &State<Arc<EventHub>>,
    service: &State<Arc<AutoReplyService>>,
    message_id: i64,
    body: Json<AutoReplyRequest>,
) -> Result<Json<AutoReplySuggestion>, (Status, Json<serde_json::Value>)> {
    let exists = {
        let conn = db.conn();
        db::get_message(&conn, message_id).is_some()
    };
    if !exists {
        return Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Message not found"})),
        ));
    }

    match service.suggest_reply(db, hub, message_id, &body).await {
        Ok(Some(suggestion)) => Ok(Json(suggestion)),
        Ok(None) => Err((
            Status::UnprocessableEntity,
            Json(serde_json::json!({"error": "Message does not need a reply"})),
        )),
        Err(e) => Err((
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )),
    }
}

#[get("/api/v1/auto-replies?<limit>&<property_code>&<ota>")]
pub fn list_auto_replies(
    db: &State<Db>,
    limit: Option<usize>,
    property_code: Option<&str>,
    ota: Option<&str>,
) -> Json<Vec<AutoReplyLogEntry>> {
    let limit = limit.unwrap_or(50).clamp(1, 200);
    let conn = db.conn();
    Json(auto_reply::list_recent(&conn, limit, property_code, ota))
}

#[post("/api/v1/auto-replies/<log_id>/feedback", format = "json", data = "<body>")]
pub async fn reply_feedback(
    db: &State<Db>,
    hub: &State<Arc<EventHub>>,
    service: &State<Arc<AutoReplyService>>,
    log_id: i64,
    body: Json<ReplyFeedback>,
) -> Result<Json<crate::models::AutoReplyLog>, (Status, Json<serde_json::Value>)> {
    if !body.approved
        && body
            .edited_text
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(true)
    {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "edited_text is required when not approved"})),
        ));
    }

    match service.record_feedback(db, hub, log_id, &body).await {
        Ok(Some(log)) => Ok(Json(log)),
        Ok(None) => Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Auto-reply log not found"})),
        )),
        Err(e) => Err((
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )),
    }
}
