use crate::models::StaffNotification;
use rusqlite::{Connection, Row, params};

/// Staff notification records raised by escalating action decisions.
/// The core exposes exactly one resolution transition: mark_done(id, by).

fn map_row(row: &Row<'_>) -> rusqlite::Result<StaffNotification> {
    Ok(StaffNotification {
        id: row.get(0)?,
        message_id: row.get(1)?,
        level: row.get::<_, i64>(2)? as u8,
        reason: row.get(3)?,
        done: row.get(4)?,
        done_by: row.get(5)?,
        done_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const COLS: &str = "id, message_id, level, reason, done, done_by, done_at, created_at";

pub fn create(
    conn: &Connection,
    message_id: i64,
    level: u8,
    reason: &str,
) -> rusqlite::Result<StaffNotification> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO staff_notifications (message_id, level, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![message_id, level as i64, reason, now],
    )?;
    Ok(StaffNotification {
        id: conn.last_insert_rowid(),
        message_id,
        level,
        reason: reason.to_string(),
        done: false,
        done_by: None,
        done_at: None,
        created_at: now,
    })
}

/// Open notifications first, newest within each group.
pub fn list(conn: &Connection, include_done: bool, limit: usize) -> Vec<StaffNotification> {
    let sql = if include_done {
        format!("SELECT {COLS} FROM staff_notifications ORDER BY done ASC, created_at DESC LIMIT ?1")
    } else {
        format!("SELECT {COLS} FROM staff_notifications WHERE done = 0 ORDER BY created_at DESC LIMIT ?1")
    };
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    stmt.query_map(params![limit as i64], map_row)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

/// Resolve a notification. Returns the updated row, or None if it does not
/// exist. Marking an already-done row again is a no-op that keeps the
/// original resolver.
pub fn mark_done(conn: &Connection, id: i64, by: Option<&str>) -> Option<StaffNotification> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE staff_notifications SET done = 1, done_by = COALESCE(done_by, ?2), done_at = COALESCE(done_at, ?3) WHERE id = ?1",
        params![id, by.unwrap_or("operator"), now],
    )
    .ok()?;
    conn.query_row(
        &format!("SELECT {COLS} FROM staff_notifications WHERE id = ?1"),
        params![id],
        map_row,
    )
    .ok()
}
