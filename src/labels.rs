use crate::db;
use crate::models::{Intent, IntentLabel, IntentSource};
use rusqlite::{Connection, params};

/// Append-only ledger of intent labels. Rows are never updated or deleted;
/// history for a message is ordered by creation.

pub fn append(
    conn: &Connection,
    message_id: i64,
    intent: Intent,
    source: IntentSource,
) -> rusqlite::Result<IntentLabel> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO message_intent_labels (message_id, intent, source, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![message_id, intent.as_str(), source.as_str(), now],
    )?;
    Ok(IntentLabel {
        id: conn.last_insert_rowid(),
        message_id,
        intent,
        source,
        created_at: now,
    })
}

/// A human relabel also updates the denormalized intent on the message.
pub fn append_human(
    conn: &Connection,
    message_id: i64,
    intent: Intent,
) -> rusqlite::Result<IntentLabel> {
    let label = append(conn, message_id, intent, IntentSource::Human)?;
    db::set_message_intent_human(conn, message_id, intent)?;
    Ok(label)
}

/// Label history for a message, in creation order.
pub fn history(conn: &Connection, message_id: i64) -> Vec<IntentLabel> {
    let mut stmt = match conn.prepare(
        "SELECT id, message_id, intent, source, created_at FROM message_intent_labels
         WHERE message_id = ?1 ORDER BY created_at ASC, id ASC",
    ) {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    stmt.query_map(params![message_id], |row| {
        let intent: String = row.get(2)?;
        let source: String = row.get(3)?;
        Ok(IntentLabel {
            id: row.get(0)?,
            message_id: row.get(1)?,
            intent: Intent::parse(&intent),
            source: IntentSource::parse(&source),
            created_at: row.get(4)?,
        })
    })
    .map(|rows| rows.filter_map(|r| r.ok()).collect())
    .unwrap_or_default()
}
