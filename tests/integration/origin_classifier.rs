use crate::common::SAMPLE_GUEST_EMAIL;
use hostdesk::models::{Actionability, SenderActor};
use hostdesk::origin::classify_origin;

#[test]
fn test_parser_role_guest_wins() {
    let result = classify_origin("본문 내용", "subject", None, Some("게스트"));
    assert_eq!(result.actor, SenderActor::Guest);
    assert_eq!(result.actionability, Actionability::NeedsReply);
    assert_eq!(result.confidence, 0.95);
    assert_eq!(result.raw_role_label.as_deref(), Some("게스트"));
}

#[test]
fn test_parser_role_host_is_outgoing_copy() {
    for role in ["호스트", "공동 호스트", "Host"] {
        let result = classify_origin("본문 내용", "subject", None, Some(role));
        assert_eq!(result.actor, SenderActor::Host);
        assert_eq!(result.actionability, Actionability::OutgoingCopy);
        assert_eq!(result.confidence, 0.95);
    }
}

#[test]
fn test_system_notification_keywords() {
    let result = classify_origin(
        "안녕하세요. 예약이 확정되었습니다. 즐거운 여행 되세요.",
        "Airbnb 알림",
        None,
        None,
    );
    assert_eq!(result.actor, SenderActor::System);
    assert_eq!(result.actionability, Actionability::SystemNotification);
    assert_eq!(result.confidence, 0.9);
}

#[test]
fn test_system_keyword_in_subject_only() {
    let result = classify_origin("본문은 평범합니다", "리뷰를 남겨보세요", None, None);
    assert_eq!(result.actor, SenderActor::System);
    assert_eq!(result.actionability, Actionability::SystemNotification);
}

#[test]
fn test_body_role_line_at_lower_confidence() {
    let result = classify_origin(SAMPLE_GUEST_EMAIL, "Airbnb: new message", None, None);
    assert_eq!(result.actor, SenderActor::Guest);
    assert_eq!(result.actionability, Actionability::NeedsReply);
    assert_eq!(result.confidence, 0.9);

    let host_body = "낭그늘\n\n호스트\n\n안녕하세요, 체크인은 오후 3시부터 가능합니다.";
    let result = classify_origin(host_body, "Airbnb: new message", None, None);
    assert_eq!(result.actor, SenderActor::Host);
    assert_eq!(result.actionability, Actionability::OutgoingCopy);
    assert_eq!(result.confidence, 0.9);
}

#[test]
fn test_no_signal_is_fyi() {
    let result = classify_origin("그냥 평범한 안내문입니다.", "정보", None, None);
    assert_eq!(result.actor, SenderActor::Unknown);
    assert_eq!(result.actionability, Actionability::Fyi);
    assert_eq!(result.confidence, 0.3);
}

#[test]
fn test_deterministic() {
    let a = classify_origin(SAMPLE_GUEST_EMAIL, "Airbnb: new message", None, None);
    let b = classify_origin(SAMPLE_GUEST_EMAIL, "Airbnb: new message", None, None);
    assert_eq!(a.actor, b.actor);
    assert_eq!(a.actionability, b.actionability);
    assert_eq!(a.confidence, b.confidence);
}
