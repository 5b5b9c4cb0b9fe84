use crate::db::Db;
use crate::models::{MarkDone, StaffNotification};
use crate::notifications;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};

#[get("/api/v1/staff-notifications?<include_done>&<limit>")]
pub fn list_staff_notifications(
    db: &State<Db>,
    include_done: Option<bool>,
    limit: Option<usize>,
) -> Json<Vec<StaffNotification>> {
    let conn = db.conn();
    Json(notifications::list(
        &conn,
        include_done.unwrap_or(false),
        limit.unwrap_or(50).clamp(1, 200),
    ))
}

#[post("/api/v1/staff-notifications/<id>/done", format = "json", data = "<body>")]
pub fn resolve_staff_notification(
    db: &State<Db>,
    id: i64,
    body: Option<Json<MarkDone>>,
) -> Result<Json<StaffNotification>, (Status, Json<serde_json::Value>)> {
    let by = body.as_ref().and_then(|b| b.by.clone());
    let conn = db.conn();
    match notifications::mark_done(&conn, id, by.as_deref()) {
        Some(updated) => Ok(Json(updated)),
        None => Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Staff notification not found"})),
        )),
    }
}
