use crate::common::{open_db, seed_guest_message, test_client};
use rocket::http::Status;

#[test]
fn test_health() {
    let client = test_client();
    let res = client.get("/api/v1/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "hostdesk");
}

#[test]
fn test_stats_counts() {
    let client = test_client();
    let db = open_db(&client.db_path);
    seed_guest_message(&db, "ext-st-1", "t-st-1", "s", "체크인 가능한가요?", None);
    seed_guest_message(&db, "ext-st-2", "t-st-2", "s", "주차는요?", None);
    drop(db);

    let res = client.get("/api/v1/stats").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["messages"].as_i64(), Some(2));
    assert_eq!(body["needs_reply"].as_i64(), Some(2));
    assert_eq!(body["reply_logs"].as_i64(), Some(0));
}

#[test]
fn test_events_status() {
    let client = test_client();
    let res = client.get("/api/v1/events/status").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["websocket_clients"].as_i64(), Some(0));
}

#[test]
fn test_unknown_route_is_json_404() {
    let client = test_client();
    let res = client.get("/api/v1/nope").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}
