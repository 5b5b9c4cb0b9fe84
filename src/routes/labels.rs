use crate::db::{self, Db};
use crate::events::EventHub;
use crate::labels;
use crate::models::{Intent, IntentLabel, IntentLabelCreate};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use std::sync::Arc;

#[post("/api/v1/messages/<message_id>/intent-label", format = "json", data = "<body>")]
pub fn create_intent_label(
    db: &State<Db>,
    hub: &State<Arc<EventHub>>,
    message_id: i64,
    body: Json<IntentLabelCreate>,
) -> Result<Json<IntentLabel>, (Status, Json<serde_json::Value>)> {
    let Some(intent) = Intent::parse_strict(&body.intent) else {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": format!("Unknown intent '{}'", body.intent)})),
        ));
    };

    let conn = db.conn();
    if db::get_message(&conn, message_id).is_none() {
        return Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Message not found"})),
        ));
    }

    let label = labels::append_human(&conn, message_id, intent).map_err(|e| {
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": e.to_string()})),
        )
    })?;

    hub.broadcast_refresh("conversations", "intent_relabel");
    Ok(Json(label))
}

#[get("/api/v1/messages/<message_id>/intent-labels")]
pub fn list_intent_labels(
    db: &State<Db>,
    message_id: i64,
) -> Result<Json<Vec<IntentLabel>>, (Status, Json<serde_json::Value>)> {
    let conn = db.conn();
    if db::get_message(&conn, message_id).is_none() {
        return Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Message not found"})),
        ));
    }
    Ok(Json(labels::history(&conn, message_id)))
}
