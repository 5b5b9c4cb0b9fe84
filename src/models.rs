use serde::{Deserialize, Serialize};

// --- Closed enums ---
// Stored in SQLite as their SCREAMING_SNAKE_CASE names; the same names are
// what the LLM prompt lists and what the API emits.

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderActor {
    Guest,
    Host,
    System,
    Unknown,
}

impl SenderActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderActor::Guest => "GUEST",
            SenderActor::Host => "HOST",
            SenderActor::System => "SYSTEM",
            SenderActor::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "GUEST" => SenderActor::Guest,
            "HOST" => SenderActor::Host,
            "SYSTEM" => SenderActor::System,
            _ => SenderActor::Unknown,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actionability {
    NeedsReply,
    OutgoingCopy,
    SystemNotification,
    Fyi,
    Unknown,
}

impl Actionability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actionability::NeedsReply => "NEEDS_REPLY",
            Actionability::OutgoingCopy => "OUTGOING_COPY",
            Actionability::SystemNotification => "SYSTEM_NOTIFICATION",
            Actionability::Fyi => "FYI",
            Actionability::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "NEEDS_REPLY" => Actionability::NeedsReply,
            "OUTGOING_COPY" => Actionability::OutgoingCopy,
            "SYSTEM_NOTIFICATION" => Actionability::SystemNotification,
            "FYI" => Actionability::Fyi,
            _ => Actionability::Unknown,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CheckinQuestion,
    CheckoutQuestion,
    ReservationChange,
    Cancellation,
    Complaint,
    LocationQuestion,
    AmenityQuestion,
    PetPolicyQuestion,
    HouseRuleQuestion,
    GeneralQuestion,
    ThanksOrGoodReview,
    Other,
}

impl Intent {
    /// Every member of the closed set, in prompt/display order.
    pub const ALL: [Intent; 12] = [
        Intent::CheckinQuestion,
        Intent::CheckoutQuestion,
        Intent::ReservationChange,
        Intent::Cancellation,
        Intent::Complaint,
        Intent::LocationQuestion,
        Intent::AmenityQuestion,
        Intent::PetPolicyQuestion,
        Intent::HouseRuleQuestion,
        Intent::GeneralQuestion,
        Intent::ThanksOrGoodReview,
        Intent::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CheckinQuestion => "CHECKIN_QUESTION",
            Intent::CheckoutQuestion => "CHECKOUT_QUESTION",
            Intent::ReservationChange => "RESERVATION_CHANGE",
            Intent::Cancellation => "CANCELLATION",
            Intent::Complaint => "COMPLAINT",
            Intent::LocationQuestion => "LOCATION_QUESTION",
            Intent::AmenityQuestion => "AMENITY_QUESTION",
            Intent::PetPolicyQuestion => "PET_POLICY_QUESTION",
            Intent::HouseRuleQuestion => "HOUSE_RULE_QUESTION",
            Intent::GeneralQuestion => "GENERAL_QUESTION",
            Intent::ThanksOrGoodReview => "THANKS_OR_GOOD_REVIEW",
            Intent::Other => "OTHER",
        }
    }

    /// Maps an enum name back to the variant. Unknown names become `Other`
    /// so a degraded LLM answer can never widen the closed set.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "CHECKIN_QUESTION" => Intent::CheckinQuestion,
            "CHECKOUT_QUESTION" => Intent::CheckoutQuestion,
            "RESERVATION_CHANGE" => Intent::ReservationChange,
            "CANCELLATION" => Intent::Cancellation,
            "COMPLAINT" => Intent::Complaint,
            "LOCATION_QUESTION" => Intent::LocationQuestion,
            "AMENITY_QUESTION" => Intent::AmenityQuestion,
            "PET_POLICY_QUESTION" => Intent::PetPolicyQuestion,
            "HOUSE_RULE_QUESTION" => Intent::HouseRuleQuestion,
            "GENERAL_QUESTION" => Intent::GeneralQuestion,
            "THANKS_OR_GOOD_REVIEW" => Intent::ThanksOrGoodReview,
            _ => Intent::Other,
        }
    }

    /// Strict variant of [`Intent::parse`]: `None` unless the name is an
    /// exact member of the set. Used for operator-supplied labels.
    pub fn parse_strict(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        let parsed = Self::parse(&upper);
        if parsed == Intent::Other && upper != "OTHER" {
            None
        } else {
            Some(parsed)
        }
    }
}

/// Finer sub-topics under the same taxonomy. Optional, never changes the
/// action decision on its own.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FineIntent {
    EarlyCheckin,
    LateCheckout,
    LuggageStorage,
    WifiInfo,
    ParkingInfo,
    ExtraBedding,
}

impl FineIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineIntent::EarlyCheckin => "EARLY_CHECKIN",
            FineIntent::LateCheckout => "LATE_CHECKOUT",
            FineIntent::LuggageStorage => "LUGGAGE_STORAGE",
            FineIntent::WifiInfo => "WIFI_INFO",
            FineIntent::ParkingInfo => "PARKING_INFO",
            FineIntent::ExtraBedding => "EXTRA_BEDDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EARLY_CHECKIN" => Some(FineIntent::EarlyCheckin),
            "LATE_CHECKOUT" => Some(FineIntent::LateCheckout),
            "LUGGAGE_STORAGE" => Some(FineIntent::LuggageStorage),
            "WIFI_INFO" => Some(FineIntent::WifiInfo),
            "PARKING_INFO" => Some(FineIntent::ParkingInfo),
            "EXTRA_BEDDING" => Some(FineIntent::ExtraBedding),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentSource {
    System,
    Human,
    Ml,
    Corrected,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::System => "SYSTEM",
            IntentSource::Human => "HUMAN",
            IntentSource::Ml => "ML",
            IntentSource::Corrected => "CORRECTED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "HUMAN" => IntentSource::Human,
            "ML" => IntentSource::Ml,
            "CORRECTED" => IntentSource::Corrected,
            _ => IntentSource::System,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AutoReply,
    DraftOnly,
    StaffReviewRequired,
    StaffAlert,
    NoAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AutoReply => "AUTO_REPLY",
            ActionType::DraftOnly => "DRAFT_ONLY",
            ActionType::StaffReviewRequired => "STAFF_REVIEW_REQUIRED",
            ActionType::StaffAlert => "STAFF_ALERT",
            ActionType::NoAction => "NO_ACTION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_REPLY" => Some(ActionType::AutoReply),
            "DRAFT_ONLY" => Some(ActionType::DraftOnly),
            "STAFF_REVIEW_REQUIRED" => Some(ActionType::StaffReviewRequired),
            "STAFF_ALERT" => Some(ActionType::StaffAlert),
            "NO_ACTION" => Some(ActionType::NoAction),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationMode {
    Template,
    Llm,
    LlmWithFewshot,
    Fallback,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Template => "TEMPLATE",
            GenerationMode::Llm => "LLM",
            GenerationMode::LlmWithFewshot => "LLM_WITH_FEWSHOT",
            GenerationMode::Fallback => "FALLBACK",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "TEMPLATE" => GenerationMode::Template,
            "LLM" => GenerationMode::Llm,
            "LLM_WITH_FEWSHOT" => GenerationMode::LlmWithFewshot,
            _ => GenerationMode::Fallback,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendMode {
    Autopilot,
    Hitl,
}

impl SendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMode::Autopilot => "AUTOPILOT",
            SendMode::Hitl => "HITL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "AUTOPILOT" => SendMode::Autopilot,
            _ => SendMode::Hitl,
        }
    }
}

// --- Parser output ---

/// Booking metadata pulled out of the notification body by the parser's
/// small grammar. Everything is optional; absence is normal.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BookingMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_code: Option<String>,
}

/// Normalized view of one mailbox message after MIME decoding.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ParsedMessage {
    pub external_id: String,
    pub thread_id: String,
    pub received_at: String,
    pub from_email: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_segment: Option<String>,
    pub ota: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    /// Raw role label found in the body ("호스트", "게스트", "Host", ...),
    /// kept verbatim for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,
    pub booking: BookingMeta,
    /// RFC 5322 Message-ID of the original, used for reply threading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfc822_message_id: Option<String>,
}

// --- Classification outputs ---

#[derive(Debug, Serialize, Clone)]
pub struct OriginResult {
    pub actor: SenderActor,
    pub actionability: Actionability,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_role_label: Option<String>,
}

/// Outcome of intent classification. The action decider branches on the
/// tag, so "low confidence", "unknown category" and "LLM parse failure"
/// stay distinguishable instead of collapsing into one nullable field.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentOutcome {
    Confident {
        intent: Intent,
        #[serde(skip_serializing_if = "Option::is_none")]
        fine_intent: Option<FineIntent>,
        confidence: f64,
        reasons: Vec<String>,
    },
    Ambiguous {
        candidate: Intent,
        confidence: f64,
        reasons: Vec<String>,
    },
    Failed {
        reason: String,
    },
}

impl IntentOutcome {
    pub fn intent(&self) -> Intent {
        match self {
            IntentOutcome::Confident { intent, .. } => *intent,
            IntentOutcome::Ambiguous { candidate, .. } => *candidate,
            IntentOutcome::Failed { .. } => Intent::Other,
        }
    }

    pub fn fine_intent(&self) -> Option<FineIntent> {
        match self {
            IntentOutcome::Confident { fine_intent, .. } => *fine_intent,
            _ => None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            IntentOutcome::Confident { confidence, .. } => *confidence,
            IntentOutcome::Ambiguous { confidence, .. } => *confidence,
            IntentOutcome::Failed { .. } => 0.3,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        !matches!(self, IntentOutcome::Confident { .. })
    }

    pub fn reasons(&self) -> Vec<String> {
        match self {
            IntentOutcome::Confident { reasons, .. } => reasons.clone(),
            IntentOutcome::Ambiguous { reasons, .. } => reasons.clone(),
            IntentOutcome::Failed { reason } => vec![reason.clone()],
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ActionDecision {
    pub action: ActionType,
    pub reason: String,
    pub escalation_level: u8,
    pub allow_auto_send: bool,
    pub block_auto_reply: bool,
}

// --- Persisted rows ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IngestedMessage {
    pub id: i64,
    pub mailbox_message_id: String,
    pub thread_id: String,
    pub received_at: String,
    pub from_email: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_segment: Option<String>,
    pub sender_actor: SenderActor,
    pub actionability: Actionability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_intent: Option<FineIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<ActionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_code: Option<String>,
    pub ota: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_role_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rfc822_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_auto_reply_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IntentLabel {
    pub id: i64,
    pub message_id: i64,
    pub intent: Intent,
    pub source: IntentSource,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutoReplyLog {
    pub id: i64,
    pub message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_code: Option<String>,
    pub ota: String,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_intent: Option<FineIntent>,
    pub intent_confidence: f64,
    pub generation_mode: GenerationMode,
    pub reply_text: String,
    pub send_mode: SendMode,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    pub allow_auto_send: bool,
    pub faq_keys: Vec<String>,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PropertyProfile {
    pub id: i64,
    pub property_code: String,
    pub name: String,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkin_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoking_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_policy: Option<String>,
    pub amenities: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_guide: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_guide: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_overview: Option<String>,
    pub extra_metadata: serde_json::Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OtaListingMapping {
    pub id: i64,
    pub ota: String,
    pub listing_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AutoSendStats {
    pub id: i64,
    pub property_code: String,
    pub faq_key: String,
    pub total_count: i64,
    pub approved_count: i64,
    pub edited_count: i64,
    pub approval_rate: f64,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_approved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaffNotification {
    pub id: i64,
    pub message_id: i64,
    pub level: u8,
    pub reason: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
    pub created_at: String,
}

/// A past approved answer returned by similarity search.
#[derive(Debug, Serialize, Clone)]
pub struct SimilarAnswer {
    pub guest_message: String,
    pub final_answer: String,
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_code: Option<String>,
    pub was_edited: bool,
}

// --- Pipeline reporting ---

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct TickReport {
    pub fetched: usize,
    pub parsed: usize,
    pub newly_ingested: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct FullRunReport {
    #[serde(flatten)]
    pub tick: TickReport,
    pub replies_attempted: usize,
    pub replies_sent: usize,
    pub replies_failed: usize,
}

// --- API request/response bodies ---

#[derive(Debug, Deserialize)]
pub struct AutoReplyRequest {
    #[serde(default)]
    pub ota: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub property_code: Option<String>,
    #[serde(default = "default_true")]
    pub use_llm: bool,
    #[serde(default)]
    pub force: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IntentLabelCreate {
    pub intent: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyFeedback {
    pub approved: bool,
    #[serde(default)]
    pub edited_text: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkDone {
    #[serde(default)]
    pub by: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct AutoReplySuggestion {
    pub log_id: i64,
    pub message_id: i64,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_intent: Option<FineIntent>,
    pub intent_confidence: f64,
    pub reply_text: String,
    pub generation_mode: GenerationMode,
    pub send_mode: SendMode,
    pub sent: bool,
    pub allow_auto_send: bool,
    pub faq_keys: Vec<String>,
}

/// Auto-reply log joined with its message, as listed by `GET /auto-replies`.
#[derive(Debug, Serialize, Clone)]
pub struct AutoReplyLogEntry {
    #[serde(flatten)]
    pub log: AutoReplyLog,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_segment: Option<String>,
}
