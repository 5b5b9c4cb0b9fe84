use async_trait::async_trait;
use hostdesk::clients::{
    ClientSet, Embedder, LlmClient, MailboxClient, MailboxPayload, MessageRef,
};
use hostdesk::config::AppConfig;
use hostdesk::db::{self, Db};
use hostdesk::error::{PipelineError, PipelineResult};
use hostdesk::models::*;
use rocket::local::blocking::Client;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Wrapper around Client that auto-deletes the temp DB on drop.
/// Uses Option<Client> so we can drop the DB connection before deleting the file.
pub struct TestClient {
    client: Option<Client>,
    pub db_path: String,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        // Drop client first to release SQLite connection (WAL mode holds the file)
        drop(self.client.take());
        cleanup_db(&self.db_path);
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub fn cleanup_db(db_path: &str) {
    let _ = std::fs::remove_file(db_path);
    let _ = std::fs::remove_file(format!("{}-wal", db_path));
    let _ = std::fs::remove_file(format!("{}-shm", db_path));
}

pub fn temp_db_path() -> String {
    format!(
        "/tmp/hostdesk_test_{}.db",
        uuid::Uuid::new_v4().to_string().split('-').next().unwrap()
    )
}

pub fn test_config(db_path: &str) -> AppConfig {
    AppConfig {
        db_path: db_path.to_string(),
        mailbox_address: "host@example.com".to_string(),
        poller_enabled: false,
        ..AppConfig::default()
    }
}

/// Boot the service with fake external capabilities against a unique temp DB.
pub fn test_client_with(clients: ClientSet) -> TestClient {
    let db_path = temp_db_path();
    let rocket = hostdesk::rocket_with_state(test_config(&db_path), clients);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient {
        client: Some(client),
        db_path,
    }
}

pub fn test_client() -> TestClient {
    test_client_with(fake_clients())
}

pub fn fake_clients() -> ClientSet {
    ClientSet {
        mailbox: Arc::new(FakeMailbox::default()),
        llm: Arc::new(FakeLlm::failing()),
        embedder: Arc::new(FakeEmbedder),
    }
}

// --- Fake mailbox ---

#[derive(Default)]
pub struct FakeMailbox {
    pub payloads: Mutex<Vec<MailboxPayload>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: AtomicBool,
}

impl FakeMailbox {
    pub fn with_payloads(payloads: Vec<MailboxPayload>) -> Self {
        FakeMailbox {
            payloads: Mutex::new(payloads),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list(&self, _query: &str, max: usize) -> PipelineResult<Vec<MessageRef>> {
        Ok(self
            .payloads
            .lock()
            .unwrap()
            .iter()
            .take(max)
            .map(|p| MessageRef {
                id: p.id.clone(),
                thread_id: p.thread_id.clone(),
            })
            .collect())
    }

    async fn get(&self, id: &str) -> PipelineResult<MailboxPayload> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PipelineError::Transport(format!("no payload {id}")))
    }

    async fn send(&self, raw_b64: &str, thread_id: &str) -> PipelineResult<String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PipelineError::Transport("send rejected".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((raw_b64.to_string(), thread_id.to_string()));
        Ok(format!("sent-{}", self.sent_count()))
    }
}

// --- Fake LLM ---

pub struct FakeLlm {
    responses: Mutex<VecDeque<String>>,
    fail: bool,
}

impl FakeLlm {
    /// Every call errors, as a dead transport would.
    pub fn failing() -> Self {
        FakeLlm {
            responses: Mutex::new(VecDeque::new()),
            fail: true,
        }
    }

    /// Calls pop scripted responses in order; running out is an error.
    pub fn scripted(responses: Vec<&str>) -> Self {
        FakeLlm {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            fail: false,
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn chat(&self, _system: &str, _user: &str, _temperature: f64) -> PipelineResult<String> {
        if self.fail {
            return Err(PipelineError::Transport("LLM unavailable".to_string()));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::Transport("no scripted response left".to_string()))
    }
}

// --- Fake embedder ---
// Deterministic keyword-slot vectors: texts sharing a topic keyword come
// out colinear, disjoint topics orthogonal.

const EMBED_KEYWORDS: [&str; 8] = [
    "체크인", "체크아웃", "수건", "주차", "와이파이", "바베큐", "침대", "주소",
];

pub struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>> {
        Ok(EMBED_KEYWORDS
            .iter()
            .map(|kw| if text.contains(kw) { 1.0 } else { 0.0 })
            .collect())
    }

    fn dim(&self) -> usize {
        EMBED_KEYWORDS.len()
    }
}

// --- Seeding helpers ---

pub fn open_db(db_path: &str) -> Db {
    Db::new(db_path)
}

pub fn guest_parsed(external_id: &str, thread_id: &str, subject: &str, segment: &str) -> ParsedMessage {
    ParsedMessage {
        external_id: external_id.to_string(),
        thread_id: thread_id.to_string(),
        received_at: chrono::Utc::now().to_rfc3339(),
        from_email: "guest-reply@airbnb.com".to_string(),
        subject: subject.to_string(),
        snippet: Some(segment.chars().take(40).collect()),
        text_body: Some(segment.to_string()),
        html_body: None,
        guest_segment: Some(segment.to_string()),
        ota: "airbnb".to_string(),
        listing_id: None,
        sender_role: Some("게스트".to_string()),
        booking: BookingMeta::default(),
        rfc822_message_id: Some(format!("<{external_id}@mail.airbnb.com>")),
    }
}

pub fn guest_origin() -> OriginResult {
    OriginResult {
        actor: SenderActor::Guest,
        actionability: Actionability::NeedsReply,
        confidence: 0.95,
        reasons: vec!["seeded".to_string()],
        raw_role_label: Some("게스트".to_string()),
    }
}

/// Insert a guest NEEDS_REPLY message and return its id.
pub fn seed_guest_message(
    db: &Db,
    external_id: &str,
    thread_id: &str,
    subject: &str,
    segment: &str,
    property_code: Option<&str>,
) -> i64 {
    let parsed = guest_parsed(external_id, thread_id, subject, segment);
    let conn = db.conn();
    db::insert_message(&conn, &parsed, &guest_origin(), None, property_code).expect("seed message")
}

/// A host-notification email body in the OTA's Korean layout: tracking
/// noise, sender profile block, guest message, then the CTA/footer region.
pub const SAMPLE_GUEST_EMAIL: &str = "%opentrack%
https://www.airbnb.co.kr/help/tracking

김철수

게스트

South Korea
가입 연도: 2019

체크인 몇 시부터 가능한가요?

짐을 미리 맡길 수도 있을까요?

예약 사전 승인 또는 거절
24시간 이내에 답장해주세요
자주 묻는 질문
https://www.airbnb.co.kr/help
Airbnb Ireland UC
";

/// Build a provider-shaped payload with a base64url-encoded plain body.
pub fn mailbox_payload(id: &str, thread_id: &str, subject: &str, text_body: &str) -> MailboxPayload {
    use base64::Engine;
    use hostdesk::clients::{Header, MimePart, PartBody};

    MailboxPayload {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        snippet: text_body.chars().take(40).collect(),
        internal_date: Some("1754000000000".to_string()),
        payload: MimePart {
            mime_type: "multipart/alternative".to_string(),
            headers: vec![
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
                Header {
                    name: "From".to_string(),
                    value: "Airbnb <automated@airbnb.com>".to_string(),
                },
                Header {
                    name: "Message-ID".to_string(),
                    value: format!("<{id}@mail.airbnb.com>"),
                },
            ],
            body: PartBody { data: None },
            parts: vec![MimePart {
                mime_type: "text/plain".to_string(),
                headers: vec![],
                body: PartBody {
                    data: Some(base64::engine::general_purpose::URL_SAFE.encode(text_body)),
                },
                parts: vec![],
            }],
        },
    }
}

/// An AutoReplyService wired to the given fakes with default gate/store
/// thresholds.
pub fn service_with(clients: ClientSet) -> hostdesk::auto_reply::AutoReplyService {
    hostdesk::auto_reply::AutoReplyService::new(
        clients,
        hostdesk::autosend::AutoSendGate::default(),
        hostdesk::embeddings::EmbeddingStore::default(),
        "host@example.com".to_string(),
    )
}

/// Insert a property profile with a 14:00-22:00 check-in window.
pub fn seed_profile(db: &Db, property_code: &str) {
    let profile = PropertyProfile {
        id: 0,
        property_code: property_code.to_string(),
        name: "공릉 101호".to_string(),
        locale: "ko".to_string(),
        checkin_from: Some("14:00".to_string()),
        checkin_to: Some("22:00".to_string()),
        checkout_until: Some("11:00".to_string()),
        parking_info: Some("건물 뒤편 전용 주차 1대 가능".to_string()),
        pet_policy: Some("반려동물 동반 불가".to_string()),
        smoking_policy: Some("전 구역 금연".to_string()),
        noise_policy: Some("22시 이후 소음 자제".to_string()),
        amenities: serde_json::json!({"wifi": true, "washer": true}),
        address_summary: Some("서울 노원구 공릉동".to_string()),
        location_guide: Some("공릉역 2번 출구 도보 5분".to_string()),
        access_guide: Some("1층 공동현관 비밀번호는 체크인 당일 안내됩니다.".to_string()),
        house_rules: Some("파티 금지, 추가 인원 사전 문의".to_string()),
        space_overview: Some("침실 1, 욕실 1, 주방을 갖춘 아파트".to_string()),
        extra_metadata: serde_json::json!({}),
        is_active: true,
        created_at: String::new(),
        updated_at: String::new(),
    };
    let conn = db.conn();
    db::upsert_property_profile(&conn, &profile).expect("seed profile");
}
