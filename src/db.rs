use crate::models::*;
use rusqlite::{Connection, Row, params};
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )
        .expect("Failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    /// Lock the connection, recovering from a poisoned mutex.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS incoming_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mailbox_message_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL DEFAULT '',
                received_at TEXT NOT NULL,
                from_email TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                snippet TEXT,
                text_body TEXT,
                html_body TEXT,
                guest_segment TEXT,
                sender_actor TEXT NOT NULL DEFAULT 'UNKNOWN',
                actionability TEXT NOT NULL DEFAULT 'UNKNOWN',
                intent TEXT,
                intent_confidence REAL,
                fine_intent TEXT,
                suggested_action TEXT,
                property_code TEXT,
                ota TEXT NOT NULL DEFAULT 'airbnb',
                listing_id TEXT,
                guest_name TEXT,
                checkin_date TEXT,
                checkout_date TEXT,
                reservation_code TEXT,
                raw_role_label TEXT,
                rfc822_message_id TEXT,
                last_auto_reply_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_thread ON incoming_messages(thread_id, received_at);
            CREATE INDEX IF NOT EXISTS idx_messages_actionability ON incoming_messages(actionability);
            CREATE INDEX IF NOT EXISTS idx_messages_property ON incoming_messages(property_code);

            CREATE TABLE IF NOT EXISTS message_intent_labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES incoming_messages(id) ON DELETE CASCADE,
                intent TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_labels_message ON message_intent_labels(message_id, created_at);

            CREATE TABLE IF NOT EXISTS auto_reply_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES incoming_messages(id) ON DELETE CASCADE,
                property_code TEXT,
                ota TEXT NOT NULL DEFAULT 'airbnb',
                intent TEXT NOT NULL,
                fine_intent TEXT,
                intent_confidence REAL NOT NULL DEFAULT 0,
                generation_mode TEXT NOT NULL,
                reply_text TEXT NOT NULL,
                send_mode TEXT NOT NULL DEFAULT 'HITL',
                sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT,
                allow_auto_send INTEGER NOT NULL DEFAULT 0,
                faq_keys TEXT NOT NULL DEFAULT '[]',
                edited INTEGER NOT NULL DEFAULT 0,
                edited_text TEXT,
                edited_by TEXT,
                failure_reason TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reply_logs_message ON auto_reply_logs(message_id);
            CREATE INDEX IF NOT EXISTS idx_reply_logs_created ON auto_reply_logs(created_at);

            CREATE TABLE IF NOT EXISTS property_profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                property_code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                locale TEXT NOT NULL DEFAULT 'ko',
                checkin_from TEXT,
                checkin_to TEXT,
                checkout_until TEXT,
                parking_info TEXT,
                pet_policy TEXT,
                smoking_policy TEXT,
                noise_policy TEXT,
                amenities TEXT NOT NULL DEFAULT '{}',
                address_summary TEXT,
                location_guide TEXT,
                access_guide TEXT,
                house_rules TEXT,
                space_overview TEXT,
                extra_metadata TEXT NOT NULL DEFAULT '{}',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ota_listing_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ota TEXT NOT NULL,
                listing_id TEXT NOT NULL,
                property_code TEXT,
                group_code TEXT,
                UNIQUE(ota, listing_id),
                CHECK(property_code IS NOT NULL OR group_code IS NOT NULL)
            );

            CREATE TABLE IF NOT EXISTS answer_embeddings (
                id TEXT PRIMARY KEY,
                guest_message TEXT NOT NULL,
                final_answer TEXT NOT NULL,
                embedding BLOB NOT NULL,
                property_code TEXT,
                was_edited INTEGER NOT NULL DEFAULT 0,
                conversation_ref TEXT,
                thread_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_embeddings_property ON answer_embeddings(property_code);

            CREATE TABLE IF NOT EXISTS auto_send_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                property_code TEXT NOT NULL,
                faq_key TEXT NOT NULL,
                total_count INTEGER NOT NULL DEFAULT 0,
                approved_count INTEGER NOT NULL DEFAULT 0,
                edited_count INTEGER NOT NULL DEFAULT 0,
                approval_rate REAL NOT NULL DEFAULT 0,
                eligible INTEGER NOT NULL DEFAULT 0,
                last_approved_at TEXT,
                last_edited_at TEXT,
                UNIQUE(property_code, faq_key),
                CHECK(total_count >= 0),
                CHECK(approval_rate >= 0 AND approval_rate <= 1)
            );

            CREATE TABLE IF NOT EXISTS staff_notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES incoming_messages(id) ON DELETE CASCADE,
                level INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL DEFAULT '',
                done INTEGER NOT NULL DEFAULT 0,
                done_by TEXT,
                done_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_staff_notifications_done ON staff_notifications(done, created_at);

            CREATE TABLE IF NOT EXISTS reply_templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                intent TEXT NOT NULL,
                locale TEXT NOT NULL,
                body TEXT NOT NULL,
                UNIQUE(intent, locale)
            );",
        )
        .expect("Failed to run migrations");

        seed_reply_templates(&conn);
    }
}

/// Seed the default (intent, locale) reply templates. Idempotent — existing
/// rows (possibly operator-tuned) are left alone.
fn seed_reply_templates(conn: &Connection) {
    const SEEDS: &[(&str, &str, &str)] = &[
        (
            "CHECKIN_QUESTION",
            "ko",
            "안녕하세요! 체크인은 {checkin_from}부터 {checkin_to}까지 가능합니다. {access_guide} 편안한 여행 되세요 :)",
        ),
        (
            "CHECKIN_QUESTION",
            "en",
            "Hello! Check-in is available from {checkin_from} to {checkin_to}. {access_guide} Safe travels!",
        ),
        (
            "CHECKOUT_QUESTION",
            "ko",
            "안녕하세요! 체크아웃은 {checkout_until}까지입니다. 이용해 주셔서 감사합니다 :)",
        ),
        (
            "CHECKOUT_QUESTION",
            "en",
            "Hello! Check-out is by {checkout_until}. Thank you for staying with us!",
        ),
        (
            "LOCATION_QUESTION",
            "ko",
            "안녕하세요! 숙소 위치를 안내드립니다. {address_summary} {location_guide} 감사합니다 :)",
        ),
        (
            "LOCATION_QUESTION",
            "en",
            "Hello! Here is how to find us. {address_summary} {location_guide} Thank you!",
        ),
        (
            "AMENITY_QUESTION",
            "ko",
            "안녕하세요! 숙소 편의시설을 안내드립니다. {space_overview} 더 궁금하신 점이 있으면 말씀해주세요 :)",
        ),
        (
            "AMENITY_QUESTION",
            "en",
            "Hello! About our amenities: {space_overview} Let us know if you have any other questions!",
        ),
        (
            "PET_POLICY_QUESTION",
            "ko",
            "안녕하세요! 반려동물 정책을 안내드립니다. {pet_policy} 감사합니다 :)",
        ),
        (
            "PET_POLICY_QUESTION",
            "en",
            "Hello! Our pet policy: {pet_policy} Thank you!",
        ),
        (
            "HOUSE_RULE_QUESTION",
            "ko",
            "안녕하세요! 숙소 이용 규칙을 안내드립니다. {house_rules} 감사합니다 :)",
        ),
        (
            "HOUSE_RULE_QUESTION",
            "en",
            "Hello! Our house rules: {house_rules} Thank you!",
        ),
    ];

    for (intent, locale, body) in SEEDS {
        conn.execute(
            "INSERT OR IGNORE INTO reply_templates (intent, locale, body) VALUES (?1, ?2, ?3)",
            params![intent, locale, body],
        )
        .ok();
    }
}

// --- Row mapping ---

pub const MESSAGE_COLS: &str = "id, mailbox_message_id, thread_id, received_at, from_email, subject, snippet, \
     text_body, html_body, guest_segment, sender_actor, actionability, intent, \
     intent_confidence, fine_intent, suggested_action, property_code, ota, listing_id, \
     guest_name, checkin_date, checkout_date, reservation_code, raw_role_label, \
     rfc822_message_id, last_auto_reply_at, created_at";

pub fn map_message_row(row: &Row<'_>) -> rusqlite::Result<IngestedMessage> {
    let actor: String = row.get(10)?;
    let actionability: String = row.get(11)?;
    let intent: Option<String> = row.get(12)?;
    let fine_intent: Option<String> = row.get(14)?;
    let suggested_action: Option<String> = row.get(15)?;
    Ok(IngestedMessage {
        id: row.get(0)?,
        mailbox_message_id: row.get(1)?,
        thread_id: row.get(2)?,
        received_at: row.get(3)?,
        from_email: row.get(4)?,
        subject: row.get(5)?,
        snippet: row.get(6)?,
        text_body: row.get(7)?,
        html_body: row.get(8)?,
        guest_segment: row.get(9)?,
        sender_actor: SenderActor::parse(&actor),
        actionability: Actionability::parse(&actionability),
        intent: intent.map(|s| Intent::parse(&s)),
        intent_confidence: row.get(13)?,
        fine_intent: fine_intent.as_deref().and_then(FineIntent::parse),
        suggested_action: suggested_action.as_deref().and_then(ActionType::parse),
        property_code: row.get(16)?,
        ota: row.get(17)?,
        listing_id: row.get(18)?,
        guest_name: row.get(19)?,
        checkin_date: row.get(20)?,
        checkout_date: row.get(21)?,
        reservation_code: row.get(22)?,
        raw_role_label: row.get(23)?,
        rfc822_message_id: row.get(24)?,
        last_auto_reply_at: row.get(25)?,
        created_at: row.get(26)?,
    })
}

// --- Incoming message helpers ---

pub fn message_exists(conn: &Connection, mailbox_message_id: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM incoming_messages WHERE mailbox_message_id = ?1",
        params![mailbox_message_id],
        |r| r.get::<_, i64>(0),
    )
    .map(|c| c > 0)
    .unwrap_or(false)
}

/// Insert a parsed + classified message. Duplicate external ids are treated
/// as success: the existing row's id is returned and nothing is written.
/// Actor and actionability are set exactly once, here.
pub fn insert_message(
    conn: &Connection,
    parsed: &ParsedMessage,
    origin: &OriginResult,
    outcome: Option<&IntentOutcome>,
    property_code: Option<&str>,
) -> rusqlite::Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO incoming_messages (
            mailbox_message_id, thread_id, received_at, from_email, subject, snippet,
            text_body, html_body, guest_segment, sender_actor, actionability,
            intent, intent_confidence, fine_intent, property_code, ota, listing_id,
            guest_name, checkin_date, checkout_date, reservation_code,
            raw_role_label, rfc822_message_id, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        params![
            parsed.external_id,
            parsed.thread_id,
            parsed.received_at,
            parsed.from_email,
            parsed.subject,
            parsed.snippet,
            parsed.text_body,
            parsed.html_body,
            parsed.guest_segment,
            origin.actor.as_str(),
            origin.actionability.as_str(),
            outcome.map(|o| o.intent().as_str()),
            outcome.map(|o| o.confidence()),
            outcome.and_then(|o| o.fine_intent()).map(|f| f.as_str()),
            property_code,
            parsed.ota,
            parsed.listing_id,
            parsed.booking.guest_name,
            parsed.booking.checkin_date,
            parsed.booking.checkout_date,
            parsed.booking.reservation_code,
            parsed.sender_role,
            parsed.rfc822_message_id,
            now,
        ],
    )?;

    if inserted > 0 {
        Ok(conn.last_insert_rowid())
    } else {
        conn.query_row(
            "SELECT id FROM incoming_messages WHERE mailbox_message_id = ?1",
            params![parsed.external_id],
            |r| r.get(0),
        )
    }
}

pub fn get_message(conn: &Connection, id: i64) -> Option<IngestedMessage> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM incoming_messages WHERE id = ?1"),
        params![id],
        map_message_row,
    )
    .ok()
}

pub fn get_message_by_external(conn: &Connection, external_id: &str) -> Option<IngestedMessage> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM incoming_messages WHERE mailbox_message_id = ?1"),
        params![external_id],
        map_message_row,
    )
    .ok()
}

/// Persist a classification outcome on the message row. Actor and
/// actionability are deliberately not touched.
pub fn set_message_intent(
    conn: &Connection,
    id: i64,
    outcome: &IntentOutcome,
    suggested_action: Option<ActionType>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE incoming_messages SET intent = ?1, intent_confidence = ?2, fine_intent = ?3, suggested_action = ?4 WHERE id = ?5",
        params![
            outcome.intent().as_str(),
            outcome.confidence(),
            outcome.fine_intent().map(|f| f.as_str()),
            suggested_action.map(|a| a.as_str()),
            id
        ],
    )?;
    Ok(())
}

/// Denormalized intent update for an operator relabel.
pub fn set_message_intent_human(
    conn: &Connection,
    id: i64,
    intent: Intent,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE incoming_messages SET intent = ?1, intent_confidence = 1.0 WHERE id = ?2",
        params![intent.as_str(), id],
    )?;
    Ok(())
}

/// Advance last_auto_reply_at. The timestamp only moves forward.
pub fn touch_last_auto_reply(conn: &Connection, id: i64, at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE incoming_messages SET last_auto_reply_at = ?1
         WHERE id = ?2 AND (last_auto_reply_at IS NULL OR last_auto_reply_at < ?1)",
        params![at, id],
    )?;
    Ok(())
}

/// NEEDS_REPLY messages still owed a reply attempt, oldest first. Without
/// `force` any existing log disqualifies; with `force` only a sent one does.
pub fn list_reply_candidates(conn: &Connection, limit: usize, force: bool) -> Vec<IngestedMessage> {
    let filter = if force {
        "NOT EXISTS (SELECT 1 FROM auto_reply_logs l WHERE l.message_id = m.id AND l.sent = 1)"
    } else {
        "NOT EXISTS (SELECT 1 FROM auto_reply_logs l WHERE l.message_id = m.id)"
    };
    let sql = format!(
        "SELECT {MESSAGE_COLS} FROM incoming_messages m
         WHERE m.actionability = 'NEEDS_REPLY' AND {filter}
         ORDER BY m.received_at ASC LIMIT ?1"
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return vec![],
    };
    stmt.query_map(params![limit as i64], map_message_row)
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}

// --- Property profiles ---

const PROFILE_COLS: &str = "id, property_code, name, locale, checkin_from, checkin_to, checkout_until, \
     parking_info, pet_policy, smoking_policy, noise_policy, amenities, address_summary, \
     location_guide, access_guide, house_rules, space_overview, extra_metadata, is_active, \
     created_at, updated_at";

fn map_profile_row(row: &Row<'_>) -> rusqlite::Result<PropertyProfile> {
    let amenities: String = row.get(11)?;
    let extra: String = row.get(17)?;
    Ok(PropertyProfile {
        id: row.get(0)?,
        property_code: row.get(1)?,
        name: row.get(2)?,
        locale: row.get(3)?,
        checkin_from: row.get(4)?,
        checkin_to: row.get(5)?,
        checkout_until: row.get(6)?,
        parking_info: row.get(7)?,
        pet_policy: row.get(8)?,
        smoking_policy: row.get(9)?,
        noise_policy: row.get(10)?,
        amenities: serde_json::from_str(&amenities).unwrap_or(serde_json::json!({})),
        address_summary: row.get(12)?,
        location_guide: row.get(13)?,
        access_guide: row.get(14)?,
        house_rules: row.get(15)?,
        space_overview: row.get(16)?,
        extra_metadata: serde_json::from_str(&extra).unwrap_or(serde_json::json!({})),
        is_active: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

pub fn get_property_profile(conn: &Connection, property_code: &str) -> Option<PropertyProfile> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLS} FROM property_profiles WHERE property_code = ?1 AND is_active = 1"),
        params![property_code],
        map_profile_row,
    )
    .ok()
}

pub fn upsert_property_profile(
    conn: &Connection,
    profile: &PropertyProfile,
) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO property_profiles (
            property_code, name, locale, checkin_from, checkin_to, checkout_until,
            parking_info, pet_policy, smoking_policy, noise_policy, amenities,
            address_summary, location_guide, access_guide, house_rules, space_overview,
            extra_metadata, is_active, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
         ON CONFLICT(property_code) DO UPDATE SET
            name = excluded.name, locale = excluded.locale,
            checkin_from = excluded.checkin_from, checkin_to = excluded.checkin_to,
            checkout_until = excluded.checkout_until, parking_info = excluded.parking_info,
            pet_policy = excluded.pet_policy, smoking_policy = excluded.smoking_policy,
            noise_policy = excluded.noise_policy, amenities = excluded.amenities,
            address_summary = excluded.address_summary, location_guide = excluded.location_guide,
            access_guide = excluded.access_guide, house_rules = excluded.house_rules,
            space_overview = excluded.space_overview, extra_metadata = excluded.extra_metadata,
            is_active = excluded.is_active, updated_at = excluded.updated_at",
        params![
            profile.property_code,
            profile.name,
            profile.locale,
            profile.checkin_from,
            profile.checkin_to,
            profile.checkout_until,
            profile.parking_info,
            profile.pet_policy,
            profile.smoking_policy,
            profile.noise_policy,
            serde_json::to_string(&profile.amenities).unwrap_or_else(|_| "{}".to_string()),
            profile.address_summary,
            profile.location_guide,
            profile.access_guide,
            profile.house_rules,
            profile.space_overview,
            serde_json::to_string(&profile.extra_metadata).unwrap_or_else(|_| "{}".to_string()),
            profile.is_active,
            now,
        ],
    )?;
    Ok(())
}

// --- OTA listing mappings ---

/// Resolve a parsed listing id to a property code through the mapping table.
pub fn resolve_listing(conn: &Connection, ota: &str, listing_id: &str) -> Option<String> {
    conn.query_row(
        "SELECT property_code FROM ota_listing_mappings WHERE ota = ?1 AND listing_id = ?2",
        params![ota, listing_id],
        |r| r.get::<_, Option<String>>(0),
    )
    .ok()
    .flatten()
}

pub fn upsert_listing_mapping(
    conn: &Connection,
    ota: &str,
    listing_id: &str,
    property_code: Option<&str>,
    group_code: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO ota_listing_mappings (ota, listing_id, property_code, group_code)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(ota, listing_id) DO UPDATE SET
            property_code = excluded.property_code, group_code = excluded.group_code",
        params![ota, listing_id, property_code, group_code],
    )?;
    Ok(())
}

// --- Reply templates ---

pub fn get_reply_template(conn: &Connection, intent: Intent, locale: &str) -> Option<String> {
    conn.query_row(
        "SELECT body FROM reply_templates WHERE intent = ?1 AND locale = ?2",
        params![intent.as_str(), locale],
        |r| r.get(0),
    )
    .ok()
}
