use crate::clients::MailboxClient;
use crate::db::{self, Db};
use crate::error::PipelineResult;
use crate::models::*;
use crate::{intent, labels, origin, parser};
use std::sync::Arc;
use std::time::Duration;

const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_CAP_MS: u64 = 30_000;
const MAX_ATTEMPTS: u32 = 4;

/// Retry a transient-failing step with bounded exponential backoff
/// (100ms base, factor 2, 30s cap). Non-transient errors abort at once.
/// The backoff is scoped to the current step; a tick never blocks the next.
pub async fn with_backoff<T, F, Fut>(op: &str, mut f: F) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let mut delay_ms = BACKOFF_BASE_MS;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                eprintln!("⚠️ {op} failed (attempt {attempt}): {e}, retrying in {delay_ms}ms");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(BACKOFF_CAP_MS);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pulls new OTA mail from the operator mailbox and ingests it.
///
/// Dedup by provider message id makes delivery at-least-once but ingestion
/// exactly-once; individual message failures are counted and never abort
/// the tick.
pub struct MailboxPoller {
    pub mailbox: Arc<dyn MailboxClient>,
    pub query_base: String,
}

impl MailboxPoller {
    pub fn new(mailbox: Arc<dyn MailboxClient>, query_base: &str) -> Self {
        MailboxPoller {
            mailbox,
            query_base: query_base.to_string(),
        }
    }

    /// One poll cycle: list candidates, skip known ids, fetch + parse +
    /// classify + store the rest.
    pub async fn tick(&self, db: &Db, max: usize, since_days: u32) -> PipelineResult<TickReport> {
        let query = format!("{} newer_than:{}d", self.query_base, since_days);
        let refs = with_backoff("mailbox list", || self.mailbox.list(&query, max)).await?;

        let mut report = TickReport {
            fetched: refs.len(),
            ..TickReport::default()
        };

        for msg_ref in refs {
            let known = {
                let conn = db.conn();
                db::message_exists(&conn, &msg_ref.id)
            };
            if known {
                // Duplicate: treated as success, no new row.
                continue;
            }

            let payload = match with_backoff("mailbox get", || self.mailbox.get(&msg_ref.id)).await
            {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("⚠️ fetch failed for message {}: {e}", msg_ref.id);
                    report.failed += 1;
                    continue;
                }
            };

            match parser::parse_payload(&payload) {
                Ok(parsed) => {
                    report.parsed += 1;
                    match ingest_parsed(db, &parsed) {
                        Ok(true) => report.newly_ingested += 1,
                        Ok(false) => {}
                        Err(e) => {
                            eprintln!("⚠️ ingest failed for message {}: {e}", parsed.external_id);
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    eprintln!("⚠️ parse failed for message {}: {e}", payload.id);
                    report.failed += 1;
                    // Malformed mail still gets a row, with UNKNOWN
                    // actor/actionability, so it is never auto-replied but
                    // stays visible to operators.
                    if let Err(e) = ingest_unparsed(db, &payload.id, &payload.thread_id) {
                        eprintln!("⚠️ stub ingest failed for message {}: {e}", payload.id);
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Store one parsed message: origin classification, guest-segment intent
/// (rule stage only — deterministic, no external calls at ingest time),
/// listing-to-property resolution, and the SYSTEM intent label.
///
/// Only a confident rule outcome is persisted; an ambiguous one leaves the
/// intent NULL so the reply path still consults the LLM stage.
///
/// Returns true when a new row was created, false for a duplicate.
pub fn ingest_parsed(db: &Db, parsed: &ParsedMessage) -> PipelineResult<bool> {
    let origin = origin::classify_origin(
        parsed.text_body.as_deref().unwrap_or(""),
        &parsed.subject,
        parsed.snippet.as_deref(),
        parsed.sender_role.as_deref(),
    );

    let outcome = if origin.actor == SenderActor::Guest
        && origin.actionability == Actionability::NeedsReply
    {
        Some(intent::rule_stage(
            parsed.guest_segment.as_deref().unwrap_or(""),
            &parsed.subject,
            parsed.snippet.as_deref(),
        ))
        .filter(|o| !o.is_ambiguous())
    } else {
        None
    };

    let conn = db.conn();
    let property_code = parsed
        .listing_id
        .as_deref()
        .and_then(|listing| db::resolve_listing(&conn, &parsed.ota, listing));

    let existed = db::message_exists(&conn, &parsed.external_id);
    let message_id = db::insert_message(
        &conn,
        parsed,
        &origin,
        outcome.as_ref(),
        property_code.as_deref(),
    )?;

    if existed {
        return Ok(false);
    }

    if let Some(ref outcome) = outcome {
        labels::append(&conn, message_id, outcome.intent(), IntentSource::System)?;
    }

    Ok(true)
}

/// Row for a payload the parser rejected: UNKNOWN origin, no bodies.
fn ingest_unparsed(db: &Db, external_id: &str, thread_id: &str) -> PipelineResult<bool> {
    let parsed = ParsedMessage {
        external_id: external_id.to_string(),
        thread_id: thread_id.to_string(),
        received_at: chrono::Utc::now().to_rfc3339(),
        from_email: String::new(),
        subject: String::new(),
        snippet: None,
        text_body: None,
        html_body: None,
        guest_segment: None,
        ota: "unknown".to_string(),
        listing_id: None,
        sender_role: None,
        booking: BookingMeta::default(),
        rfc822_message_id: None,
    };
    let origin = OriginResult {
        actor: SenderActor::Unknown,
        actionability: Actionability::Unknown,
        confidence: 0.0,
        reasons: vec!["payload could not be parsed".to_string()],
        raw_role_label: None,
    };
    let conn = db.conn();
    let existed = db::message_exists(&conn, external_id);
    db::insert_message(&conn, &parsed, &origin, None, None)?;
    Ok(!existed)
}
