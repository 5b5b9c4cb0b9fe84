use crate::models::AutoSendStats;
use rusqlite::{Connection, Row, TransactionBehavior, params};

/// Per-(property, FAQ-key) approval statistics gating autonomous sends.
///
/// Eligibility: `total >= min_total && approved/total >= min_rate`.
/// Read-modify-write runs inside an IMMEDIATE transaction so concurrent
/// feedback recordings compose instead of clobbering each other.
#[derive(Debug, Clone, Copy)]
pub struct AutoSendGate {
    pub min_total: i64,
    pub min_rate: f64,
}

impl Default for AutoSendGate {
    fn default() -> Self {
        AutoSendGate {
            min_total: 5,
            min_rate: 0.8,
        }
    }
}

fn map_stats_row(row: &Row<'_>) -> rusqlite::Result<AutoSendStats> {
    Ok(AutoSendStats {
        id: row.get(0)?,
        property_code: row.get(1)?,
        faq_key: row.get(2)?,
        total_count: row.get(3)?,
        approved_count: row.get(4)?,
        edited_count: row.get(5)?,
        approval_rate: row.get(6)?,
        eligible: row.get(7)?,
        last_approved_at: row.get(8)?,
        last_edited_at: row.get(9)?,
    })
}

const STATS_COLS: &str = "id, property_code, faq_key, total_count, approved_count, edited_count, \
     approval_rate, eligible, last_approved_at, last_edited_at";

impl AutoSendGate {
    pub fn new(min_total: i64, min_rate: f64) -> Self {
        AutoSendGate { min_total, min_rate }
    }

    /// True iff every key has stats for this property and each row is
    /// individually eligible. Empty key lists are never eligible.
    pub fn eligible(&self, conn: &Connection, property_code: &str, faq_keys: &[String]) -> bool {
        if property_code.is_empty() || faq_keys.is_empty() {
            return false;
        }
        faq_keys.iter().all(|key| {
            conn.query_row(
                "SELECT eligible FROM auto_send_stats WHERE property_code = ?1 AND faq_key = ?2",
                params![property_code, key],
                |r| r.get::<_, bool>(0),
            )
            .unwrap_or(false)
        })
    }

    pub fn get(
        &self,
        conn: &Connection,
        property_code: &str,
        faq_key: &str,
    ) -> Option<AutoSendStats> {
        conn.query_row(
            &format!(
                "SELECT {STATS_COLS} FROM auto_send_stats WHERE property_code = ?1 AND faq_key = ?2"
            ),
            params![property_code, faq_key],
            map_stats_row,
        )
        .ok()
    }

    pub fn list_for_property(&self, conn: &Connection, property_code: &str) -> Vec<AutoSendStats> {
        let sql = format!(
            "SELECT {STATS_COLS} FROM auto_send_stats WHERE property_code = ?1 ORDER BY total_count DESC"
        );
        let mut stmt = match conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![property_code], map_stats_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Record an unedited operator approval for each key.
    pub fn record_approved(
        &self,
        conn: &mut Connection,
        property_code: &str,
        faq_keys: &[String],
    ) -> rusqlite::Result<()> {
        self.record(conn, property_code, faq_keys, true)
    }

    /// Record an operator edit for each key.
    pub fn record_edited(
        &self,
        conn: &mut Connection,
        property_code: &str,
        faq_keys: &[String],
    ) -> rusqlite::Result<()> {
        self.record(conn, property_code, faq_keys, false)
    }

    fn record(
        &self,
        conn: &mut Connection,
        property_code: &str,
        faq_keys: &[String],
        approved: bool,
    ) -> rusqlite::Result<()> {
        if property_code.is_empty() || faq_keys.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for key in faq_keys {
            tx.execute(
                "INSERT OR IGNORE INTO auto_send_stats (property_code, faq_key) VALUES (?1, ?2)",
                params![property_code, key],
            )?;

            let (total, approved_count): (i64, i64) = tx.query_row(
                "SELECT total_count, approved_count FROM auto_send_stats
                 WHERE property_code = ?1 AND faq_key = ?2",
                params![property_code, key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            let total = total + 1;
            let approved_count = approved_count + if approved { 1 } else { 0 };
            let rate = approved_count as f64 / total as f64;
            let eligible = total >= self.min_total && rate >= self.min_rate;

            if approved {
                tx.execute(
                    "UPDATE auto_send_stats SET total_count = ?3, approved_count = ?4,
                        approval_rate = ?5, eligible = ?6, last_approved_at = ?7
                     WHERE property_code = ?1 AND faq_key = ?2",
                    params![property_code, key, total, approved_count, rate, eligible, now],
                )?;
            } else {
                tx.execute(
                    "UPDATE auto_send_stats SET total_count = ?3, edited_count = edited_count + 1,
                        approval_rate = ?5, eligible = ?6, last_edited_at = ?7
                     WHERE property_code = ?1 AND faq_key = ?2",
                    params![property_code, key, total, approved_count, rate, eligible, now],
                )?;
            }
        }
        tx.commit()
    }
}
