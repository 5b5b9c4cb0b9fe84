use crate::autosend::AutoSendGate;
use crate::clients::ClientSet;
use crate::context::{self, ReplyContext};
use crate::db::{self, Db};
use crate::embeddings::EmbeddingStore;
use crate::error::PipelineResult;
use crate::events::EventHub;
use crate::models::*;
use crate::{action, intent as intent_classifier, labels, mail, notifications};
use rusqlite::{Connection, Row, params};

/// Locale-appropriate generic replies, the last rung of the generation
/// ladder when both the LLM and the template tier are unavailable.
const FALLBACK_KO: &str =
    "안녕하세요, 메시지 잘 받았습니다. 확인 후 빠르게 답변드리겠습니다. 감사합니다 :)";
const FALLBACK_EN: &str =
    "Hello, thank you for your message. We will review it and get back to you shortly.";

/// Orchestrates classification, context building, drafting, gating and
/// sending for one message. All external transports arrive injected; the
/// service holds no connection of its own.
pub struct AutoReplyService {
    pub clients: ClientSet,
    pub gate: AutoSendGate,
    pub store: EmbeddingStore,
    pub operator_address: String,
    /// Per-message draft locks: at most one concurrent draft per message
    /// id. A second caller waits, then the idempotence check hands it the
    /// log the first one produced.
    drafting: std::sync::Mutex<std::collections::HashMap<i64, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

impl AutoReplyService {
    pub fn new(clients: ClientSet, gate: AutoSendGate, store: EmbeddingStore, operator_address: String) -> Self {
        AutoReplyService {
            clients,
            gate,
            store,
            operator_address,
            drafting: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn draft_lock(&self, message_id: i64) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        let mut map = self.drafting.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(message_id)
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_draft_lock(&self, message_id: i64) {
        let mut map = self.drafting.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = map.get(&message_id)
            && std::sync::Arc::strong_count(lock) <= 1
        {
            map.remove(&message_id);
        }
    }

    /// Produce (or re-fetch) the auto-reply suggestion for a message.
    ///
    /// Returns `Ok(None)` when the message is not NEEDS_REPLY. Repeated
    /// calls for a message that already has a log return the existing log
    /// unless `force` is set, in which case a fresh log row is created and
    /// the prior one left intact.
    pub async fn suggest_reply(
        &self,
        db: &Db,
        hub: &EventHub,
        message_id: i64,
        request: &AutoReplyRequest,
    ) -> PipelineResult<Option<AutoReplySuggestion>> {
        let lock = self.draft_lock(message_id);
        let guard = lock.lock().await;
        let result = self.suggest_reply_inner(db, hub, message_id, request).await;
        drop(guard);
        drop(lock);
        self.release_draft_lock(message_id);
        result
    }

    async fn suggest_reply_inner(
        &self,
        db: &Db,
        hub: &EventHub,
        message_id: i64,
        request: &AutoReplyRequest,
    ) -> PipelineResult<Option<AutoReplySuggestion>> {
        // Step 1: load. Lock is dropped before any suspension point.
        let Some(mut message) = ({
            let conn = db.conn();
            db::get_message(&conn, message_id)
        }) else {
            return Ok(None);
        };
        if message.actionability != Actionability::NeedsReply {
            return Ok(None);
        }

        // Idempotence: an existing log wins unless forced.
        if !request.force
            && let Some(existing) = ({
                let conn = db.conn();
                latest_log_for_message(&conn, message_id)
            })
        {
            return Ok(Some(suggestion_from_log(&existing)));
        }

        // Step 2: classify if the message arrived unlabeled.
        let outcome = match (message.intent, message.intent_confidence) {
            (Some(intent), Some(confidence)) => IntentOutcome::Confident {
                intent,
                fine_intent: message.fine_intent,
                confidence,
                reasons: vec!["stored classification".to_string()],
            },
            _ => {
                let guest_segment = message.guest_segment.clone().unwrap_or_default();
                let outcome = intent_classifier::classify(
                    self.clients.llm.as_ref(),
                    &guest_segment,
                    &message.subject,
                    message.snippet.as_deref(),
                    request.use_llm,
                )
                .await;
                let decision = action::decide(&outcome);
                {
                    let conn = db.conn();
                    db::set_message_intent(&conn, message_id, &outcome, Some(decision.action))?;
                    labels::append(&conn, message_id, outcome.intent(), IntentSource::System)?;
                }
                message.intent = Some(outcome.intent());
                message.intent_confidence = Some(outcome.confidence());
                message.fine_intent = outcome.fine_intent();
                outcome
            }
        };

        // Step 3: decide the action.
        let decision = action::decide(&outcome);
        if decision.escalation_level >= 1 {
            let conn = db.conn();
            notifications::create(&conn, message_id, decision.escalation_level, &decision.reason)?;
        }

        let property_code = request
            .property_code
            .clone()
            .or_else(|| message.property_code.clone());
        let ota = request.ota.clone().unwrap_or_else(|| message.ota.clone());

        // Step 4: build the context bundle.
        let profile = property_code.as_deref().and_then(|code| {
            let conn = db.conn();
            db::get_property_profile(&conn, code)
        });
        let locale = normalize_locale(
            request
                .locale
                .as_deref()
                .or(profile.as_ref().map(|p| p.locale.as_str())),
        );
        let ctx = context::build(
            profile.as_ref(),
            &message,
            Some(outcome.intent()),
            outcome.fine_intent(),
            &locale,
        );

        if decision.block_auto_reply {
            let log = self.persist_log(
                db,
                &message,
                &decision,
                &outcome,
                property_code.as_deref(),
                &ota,
                fallback_text(&locale).to_string(),
                GenerationMode::Fallback,
                SendMode::Hitl,
                &ctx.faq_keys,
            )?;
            hub.broadcast_refresh("conversations", "auto_reply");
            return Ok(Some(suggestion_from_log(&log)));
        }

        // Step 5: generation ladder — LLM (with optional few-shot), then
        // template by (intent, locale), then the generic fallback.
        let (reply_text, generation_mode) = self
            .generate_reply(db, &message, &ctx, &outcome, profile.as_ref(), &locale, request.use_llm)
            .await;

        // Step 6: combine the decision with the per-property gate.
        let gate_open = property_code
            .as_deref()
            .map(|code| {
                let conn = db.conn();
                self.gate.eligible(&conn, code, &ctx.faq_keys)
            })
            .unwrap_or(false);
        let send_mode = if decision.action == ActionType::AutoReply
            && decision.allow_auto_send
            && gate_open
            && generation_mode != GenerationMode::Fallback
        {
            SendMode::Autopilot
        } else {
            SendMode::Hitl
        };

        // Step 7: persist, then send when flying autopilot.
        let mut log = self.persist_log(
            db,
            &message,
            &decision,
            &outcome,
            property_code.as_deref(),
            &ota,
            reply_text,
            generation_mode,
            send_mode,
            &ctx.faq_keys,
        )?;

        if send_mode == SendMode::Autopilot {
            match self.send_reply(&message, &log.reply_text).await {
                Ok(()) => {
                    let sent_at = chrono::Utc::now().to_rfc3339();
                    let conn = db.conn();
                    mark_sent(&conn, log.id, &sent_at)?;
                    db::touch_last_auto_reply(&conn, message.id, &sent_at)?;
                    log.sent = true;
                    log.sent_at = Some(sent_at);
                }
                Err(e) => {
                    eprintln!("⚠️ auto-reply send failed for message {}: {e}", message.id);
                    let conn = db.conn();
                    set_failure_reason(&conn, log.id, &e.to_string())?;
                    log.failure_reason = Some(e.to_string());
                }
            }
        }

        // Step 8: tell connected clients there is new work.
        hub.broadcast_refresh("conversations", "auto_reply");

        Ok(Some(suggestion_from_log(&log)))
    }

    async fn generate_reply(
        &self,
        db: &Db,
        message: &IngestedMessage,
        ctx: &ReplyContext,
        outcome: &IntentOutcome,
        profile: Option<&PropertyProfile>,
        locale: &str,
        use_llm: bool,
    ) -> (String, GenerationMode) {
        if use_llm {
            let few_shot = match message.guest_segment.as_deref() {
                Some(segment) if !segment.trim().is_empty() => {
                    // Retrieval failures only cost us the examples.
                    fetch_few_shot(
                        &self.store,
                        db,
                        self.clients.embedder.as_ref(),
                        segment,
                        message.property_code.as_deref(),
                    )
                    .await
                }
                _ => None,
            };

            match self.draft_with_llm(ctx, message, locale, few_shot.as_deref()).await {
                Ok(text) => {
                    let mode = if few_shot.is_some() {
                        GenerationMode::LlmWithFewshot
                    } else {
                        GenerationMode::Llm
                    };
                    return (text, mode);
                }
                Err(e) => {
                    eprintln!("⚠️ LLM draft failed for message {}: {e}", message.id);
                }
            }
        }

        // Template tier needs a profile to fill its placeholders.
        if let Some(profile) = profile {
            let template = {
                let conn = db.conn();
                db::get_reply_template(&conn, outcome.intent(), locale)
            };
            if let Some(body) = template {
                let rendered = render_template(&body, profile);
                if !rendered.trim().is_empty() {
                    return (rendered, GenerationMode::Template);
                }
            }
        }

        (fallback_text(locale).to_string(), GenerationMode::Fallback)
    }

    async fn draft_with_llm(
        &self,
        ctx: &ReplyContext,
        message: &IngestedMessage,
        locale: &str,
        few_shot: Option<&str>,
    ) -> PipelineResult<String> {
        let system = format!(
            "You reply to short-term-rental guests on behalf of the host. \
Use only facts present in the property context; never invent prices, times or policies. \
Write in locale '{locale}', plain text, warm and concise, and end with a polite closing line."
        );

        let mut user = format!("[Context]\n{}\n", ctx.to_json());
        if let Some(block) = few_shot {
            user.push_str(&format!("\n[{block}]\n"));
        }
        user.push_str(&format!(
            "\n[Guest message]\n{}\n\nWrite the reply only, no preamble.",
            message.guest_segment.as_deref().unwrap_or(&message.subject)
        ));

        let text = self.clients.llm.chat(&system, &user, 0.4).await?;
        Ok(text.trim().to_string())
    }

    async fn send_reply(&self, message: &IngestedMessage, reply_text: &str) -> PipelineResult<()> {
        let raw = mail::compose_reply(
            &message.from_email,
            &message.subject,
            &self.operator_address,
            reply_text,
            message.rfc822_message_id.as_deref(),
        )?;
        self.clients.mailbox.send(&raw, &message.thread_id).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_log(
        &self,
        db: &Db,
        message: &IngestedMessage,
        decision: &ActionDecision,
        outcome: &IntentOutcome,
        property_code: Option<&str>,
        ota: &str,
        reply_text: String,
        generation_mode: GenerationMode,
        send_mode: SendMode,
        faq_keys: &[String],
    ) -> PipelineResult<AutoReplyLog> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO auto_reply_logs (
                message_id, property_code, ota, intent, fine_intent, intent_confidence,
                generation_mode, reply_text, send_mode, sent, allow_auto_send, faq_keys, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12)",
            params![
                message.id,
                property_code,
                ota,
                outcome.intent().as_str(),
                outcome.fine_intent().map(|f| f.as_str()),
                outcome.confidence(),
                generation_mode.as_str(),
                reply_text,
                send_mode.as_str(),
                decision.allow_auto_send,
                serde_json::to_string(faq_keys).unwrap_or_else(|_| "[]".to_string()),
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(AutoReplyLog {
            id,
            message_id: message.id,
            property_code: property_code.map(String::from),
            ota: ota.to_string(),
            intent: outcome.intent(),
            fine_intent: outcome.fine_intent(),
            intent_confidence: outcome.confidence(),
            generation_mode,
            reply_text,
            send_mode,
            sent: false,
            sent_at: None,
            allow_auto_send: decision.allow_auto_send,
            faq_keys: faq_keys.to_vec(),
            edited: false,
            edited_text: None,
            edited_by: None,
            failure_reason: None,
            created_at: now,
        })
    }

    /// Operator feedback on a suggestion: approval as-is feeds the gate's
    /// success counter and stores an approved-answer embedding; an edit
    /// feeds the failure counter and stores the corrected answer. Either
    /// way an unsent reply goes out now with the final text.
    pub async fn record_feedback(
        &self,
        db: &Db,
        hub: &EventHub,
        log_id: i64,
        feedback: &ReplyFeedback,
    ) -> PipelineResult<Option<AutoReplyLog>> {
        let Some((mut log, message)) = ({
            let conn = db.conn();
            get_log(&conn, log_id).and_then(|log| {
                db::get_message(&conn, log.message_id).map(|m| (log, m))
            })
        }) else {
            return Ok(None);
        };

        let final_text = if feedback.approved {
            log.reply_text.clone()
        } else {
            match feedback.edited_text.as_deref() {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => log.reply_text.clone(),
            }
        };

        if !feedback.approved {
            let conn = db.conn();
            mark_edited(&conn, log.id, &final_text, feedback.by.as_deref())?;
            log.edited = true;
            log.edited_text = Some(final_text.clone());
            log.edited_by = feedback.by.clone();
        }

        if !log.sent {
            match self.send_reply(&message, &final_text).await {
                Ok(()) => {
                    let sent_at = chrono::Utc::now().to_rfc3339();
                    let conn = db.conn();
                    mark_sent(&conn, log.id, &sent_at)?;
                    db::touch_last_auto_reply(&conn, message.id, &sent_at)?;
                    log.sent = true;
                    log.sent_at = Some(sent_at);
                }
                Err(e) => {
                    eprintln!("⚠️ feedback send failed for log {}: {e}", log.id);
                    let conn = db.conn();
                    set_failure_reason(&conn, log.id, &e.to_string())?;
                    log.failure_reason = Some(e.to_string());
                }
            }
        }

        // Gate statistics, keyed by the knowledge the draft used.
        if let Some(code) = log.property_code.clone() {
            let mut conn = db.conn();
            if feedback.approved {
                self.gate.record_approved(&mut conn, &code, &log.faq_keys)?;
            } else {
                self.gate.record_edited(&mut conn, &code, &log.faq_keys)?;
            }
        }

        // Approved answers become retrieval examples for future drafts.
        if let Some(segment) = message.guest_segment.as_deref()
            && !segment.trim().is_empty()
        {
            let store_result = self
                .store
                .store(
                    db,
                    self.clients.embedder.as_ref(),
                    segment,
                    &final_text,
                    log.property_code.as_deref(),
                    !feedback.approved,
                    Some(&log.id.to_string()),
                    Some(&message.thread_id),
                )
                .await;
            if let Err(e) = store_result {
                eprintln!("⚠️ answer embedding store failed for log {}: {e}", log.id);
            }
        }

        hub.broadcast_refresh("conversations", "reply_feedback");
        Ok(Some(log))
    }
}

/// Few-shot retrieval with failures degraded to "no examples".
async fn fetch_few_shot(
    store: &EmbeddingStore,
    db: &Db,
    embedder: &dyn crate::clients::Embedder,
    segment: &str,
    property_code: Option<&str>,
) -> Option<String> {
    match store
        .few_shot_block(db, embedder, segment, property_code, 3)
        .await
    {
        Ok(block) => block,
        Err(e) => {
            eprintln!("⚠️ few-shot retrieval failed: {e}");
            None
        }
    }
}

fn normalize_locale(locale: Option<&str>) -> String {
    let raw = locale.unwrap_or("ko");
    raw.split(['-', '_'])
        .next()
        .unwrap_or("ko")
        .to_lowercase()
}

pub fn fallback_text(locale: &str) -> &'static str {
    if locale.starts_with("ko") {
        FALLBACK_KO
    } else {
        FALLBACK_EN
    }
}

/// Substitute `{field}` placeholders with property profile values.
/// Unresolved placeholders collapse to nothing; whitespace is squeezed.
pub fn render_template(body: &str, profile: &PropertyProfile) -> String {
    let fields: [(&str, Option<&str>); 12] = [
        ("checkin_from", profile.checkin_from.as_deref()),
        ("checkin_to", profile.checkin_to.as_deref()),
        ("checkout_until", profile.checkout_until.as_deref()),
        ("parking_info", profile.parking_info.as_deref()),
        ("pet_policy", profile.pet_policy.as_deref()),
        ("smoking_policy", profile.smoking_policy.as_deref()),
        ("noise_policy", profile.noise_policy.as_deref()),
        ("address_summary", profile.address_summary.as_deref()),
        ("location_guide", profile.location_guide.as_deref()),
        ("access_guide", profile.access_guide.as_deref()),
        ("house_rules", profile.house_rules.as_deref()),
        ("space_overview", profile.space_overview.as_deref()),
    ];

    let mut out = body.to_string();
    for (name, value) in fields {
        out = out.replace(&format!("{{{name}}}"), value.unwrap_or(""));
    }

    let squeezed = out
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    squeezed.trim().to_string()
}

// --- Log row access ---

const LOG_COLS: &str = "id, message_id, property_code, ota, intent, fine_intent, intent_confidence, \
     generation_mode, reply_text, send_mode, sent, sent_at, allow_auto_send, faq_keys, \
     edited, edited_text, edited_by, failure_reason, created_at";

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<AutoReplyLog> {
    let intent: String = row.get(4)?;
    let fine: Option<String> = row.get(5)?;
    let generation_mode: String = row.get(7)?;
    let send_mode: String = row.get(9)?;
    let faq_keys: String = row.get(13)?;
    Ok(AutoReplyLog {
        id: row.get(0)?,
        message_id: row.get(1)?,
        property_code: row.get(2)?,
        ota: row.get(3)?,
        intent: Intent::parse(&intent),
        fine_intent: fine.as_deref().and_then(FineIntent::parse),
        intent_confidence: row.get(6)?,
        generation_mode: GenerationMode::parse(&generation_mode),
        reply_text: row.get(8)?,
        send_mode: SendMode::parse(&send_mode),
        sent: row.get(10)?,
        sent_at: row.get(11)?,
        allow_auto_send: row.get(12)?,
        faq_keys: serde_json::from_str(&faq_keys).unwrap_or_default(),
        edited: row.get(14)?,
        edited_text: row.get(15)?,
        edited_by: row.get(16)?,
        failure_reason: row.get(17)?,
        created_at: row.get(18)?,
    })
}

pub fn get_log(conn: &Connection, id: i64) -> Option<AutoReplyLog> {
    conn.query_row(
        &format!("SELECT {LOG_COLS} FROM auto_reply_logs WHERE id = ?1"),
        params![id],
        map_log_row,
    )
    .ok()
}

pub fn latest_log_for_message(conn: &Connection, message_id: i64) -> Option<AutoReplyLog> {
    conn.query_row(
        &format!(
            "SELECT {LOG_COLS} FROM auto_reply_logs WHERE message_id = ?1 ORDER BY id DESC LIMIT 1"
        ),
        params![message_id],
        map_log_row,
    )
    .ok()
}

/// `sent` only moves false → true, and sent_at is set exactly then.
fn mark_sent(conn: &Connection, log_id: i64, sent_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE auto_reply_logs SET sent = 1, sent_at = COALESCE(sent_at, ?2), failure_reason = NULL WHERE id = ?1",
        params![log_id, sent_at],
    )?;
    Ok(())
}

fn mark_edited(
    conn: &Connection,
    log_id: i64,
    edited_text: &str,
    edited_by: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE auto_reply_logs SET edited = 1, edited_text = ?2, edited_by = ?3 WHERE id = ?1",
        params![log_id, edited_text, edited_by],
    )?;
    Ok(())
}

fn set_failure_reason(conn: &Connection, log_id: i64, reason: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE auto_reply_logs SET failure_reason = ?2 WHERE id = ?1",
        params![log_id, reason],
    )?;
    Ok(())
}

/// Recent logs joined with their messages, restricted to guest-authored
/// NEEDS_REPLY mail, newest first.
pub fn list_recent(
    conn: &Connection,
    limit: usize,
    property_code: Option<&str>,
    ota: Option<&str>,
) -> Vec<AutoReplyLogEntry> {
    let sql = format!(
        "SELECT {}, m.subject, m.guest_segment FROM auto_reply_logs l
         JOIN incoming_messages m ON m.id = l.message_id
         WHERE m.sender_actor = 'GUEST' AND m.actionability = 'NEEDS_REPLY'
           AND (?2 IS NULL OR l.property_code = ?2)
           AND (?3 IS NULL OR l.ota = ?3)
         ORDER BY l.id DESC LIMIT ?1",
        LOG_COLS
            .split(", ")
            .map(|c| format!("l.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    stmt.query_map(params![limit as i64, property_code, ota], |row| {
        let log = map_log_row(row)?;
        Ok(AutoReplyLogEntry {
            log,
            subject: row.get(19)?,
            guest_segment: row.get(20)?,
        })
    })
    .map(|rows| rows.filter_map(|r| r.ok()).collect())
    .unwrap_or_default()
}

fn suggestion_from_log(log: &AutoReplyLog) -> AutoReplySuggestion {
    AutoReplySuggestion {
        log_id: log.id,
        message_id: log.message_id,
        intent: log.intent,
        fine_intent: log.fine_intent,
        intent_confidence: log.intent_confidence,
        reply_text: log.reply_text.clone(),
        generation_mode: log.generation_mode,
        send_mode: log.send_mode,
        sent: log.sent,
        allow_auto_send: log.allow_auto_send,
        faq_keys: log.faq_keys.clone(),
    }
}
