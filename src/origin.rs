use crate::models::{Actionability, OriginResult, SenderActor};
use crate::parser;

// Subject/body phrases that mark platform-generated notifications rather
// than person-to-person messages.
const SYSTEM_KEYWORDS: &[&str] = &[
    "예약이 확정되었습니다",
    "예약이 취소되었습니다",
    "리뷰를 남겨보세요",
    "리뷰를 남기실래요",
    "체크인까지 남은 시간",
    "새로운 알림",
    "Reservation confirmed",
    "Reservation canceled",
    "Reservation cancelled",
    "Leave a review",
    "Time until check-in",
];

fn looks_like_system_notification(text: &str, subject: &str) -> bool {
    let haystack = format!("{subject}\n{text}");
    SYSTEM_KEYWORDS.iter().any(|k| haystack.contains(k))
}

/// Decide who authored a message and whether it needs a reply.
///
/// Deterministic and free of external calls. The parser's role label (when
/// it found one) wins at 0.95; otherwise system-notification keywords, then
/// an in-body role line at 0.9; with no signal at all the message is filed
/// as FYI at 0.3 for a human to glance at.
pub fn classify_origin(
    text_body: &str,
    subject: &str,
    _snippet: Option<&str>,
    sender_role: Option<&str>,
) -> OriginResult {
    if let Some(role) = sender_role {
        if parser::is_host_role(role) {
            return OriginResult {
                actor: SenderActor::Host,
                actionability: Actionability::OutgoingCopy,
                confidence: 0.95,
                reasons: vec![format!("parser classified sender role '{role}'")],
                raw_role_label: Some(role.to_string()),
            };
        }
        if parser::is_guest_role(role) {
            return OriginResult {
                actor: SenderActor::Guest,
                actionability: Actionability::NeedsReply,
                confidence: 0.95,
                reasons: vec![format!("parser classified sender role '{role}'")],
                raw_role_label: Some(role.to_string()),
            };
        }
    }

    let role_label = parser::detect_role_label(text_body);

    if looks_like_system_notification(text_body, subject) {
        return OriginResult {
            actor: SenderActor::System,
            actionability: Actionability::SystemNotification,
            confidence: 0.9,
            reasons: vec!["system notification keyword matched".to_string()],
            raw_role_label: role_label,
        };
    }

    if let Some(ref role) = role_label {
        if parser::is_host_role(role) {
            return OriginResult {
                actor: SenderActor::Host,
                actionability: Actionability::OutgoingCopy,
                confidence: 0.9,
                reasons: vec![format!("role line '{role}' found in body")],
                raw_role_label: role_label.clone(),
            };
        }
        if parser::is_guest_role(role) {
            return OriginResult {
                actor: SenderActor::Guest,
                actionability: Actionability::NeedsReply,
                confidence: 0.9,
                reasons: vec![format!("role line '{role}' found in body")],
                raw_role_label: role_label.clone(),
            };
        }
    }

    OriginResult {
        actor: SenderActor::Unknown,
        actionability: Actionability::Fyi,
        confidence: 0.3,
        reasons: vec!["no role label or system keyword detected".to_string()],
        raw_role_label: role_label,
    }
}
