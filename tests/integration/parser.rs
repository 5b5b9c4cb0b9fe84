use crate::common::{SAMPLE_GUEST_EMAIL, mailbox_payload};
use hostdesk::parser;

// --- Guest-segment extraction ---

#[test]
fn test_segment_after_profile_anchor() {
    let segment = parser::extract_guest_segment(SAMPLE_GUEST_EMAIL).unwrap();
    assert_eq!(
        segment,
        "체크인 몇 시부터 가능한가요?\n\n짐을 미리 맡길 수도 있을까요?"
    );
}

#[test]
fn test_segment_stops_at_cta() {
    let segment = parser::extract_guest_segment(SAMPLE_GUEST_EMAIL).unwrap();
    assert!(!segment.contains("예약 사전 승인"));
    assert!(!segment.contains("24시간"));
    assert!(!segment.contains("Airbnb Ireland"));
}

#[test]
fn test_segment_fallback_last_block_before_cta() {
    // No profile anchor: the extractor cuts at the earliest CTA marker and
    // keeps the last paragraph block.
    let body = "안내 문구입니다.\n\n주차장이 어디에 있나요?\n도착이 늦을 것 같아요.\n\n자주 묻는 질문\n고객지원\n";
    let segment = parser::extract_guest_segment(body).unwrap();
    assert_eq!(segment, "주차장이 어디에 있나요?\n도착이 늦을 것 같아요.");
}

#[test]
fn test_segment_strips_tracking_noise() {
    let segment = parser::extract_guest_segment(SAMPLE_GUEST_EMAIL).unwrap();
    assert!(!segment.contains("%opentrack%"));
    assert!(!segment.contains("airbnb.co.kr"));
}

#[test]
fn test_segment_empty_body() {
    assert_eq!(parser::extract_guest_segment(""), None);
    assert_eq!(parser::extract_guest_segment("   \n\n  "), None);
}

#[test]
fn test_segment_collapses_blank_runs() {
    let body = "가입 연도: 2021\n\n안녕하세요\n\n\n\n늦은 체크인 가능한가요?\n\n고객지원\n";
    let segment = parser::extract_guest_segment(body).unwrap();
    assert_eq!(segment, "안녕하세요\n\n늦은 체크인 가능한가요?");
}

// --- Role detection ---

#[test]
fn test_role_label_guest() {
    assert_eq!(
        parser::detect_role_label(SAMPLE_GUEST_EMAIL).as_deref(),
        Some("게스트")
    );
}

#[test]
fn test_role_label_host_and_cohost() {
    assert_eq!(
        parser::detect_role_label("낭그늘\n\n호스트\n\n안녕하세요 게스트님").as_deref(),
        Some("호스트")
    );
    assert_eq!(
        parser::detect_role_label("민지\n\n공동 호스트\n\n네 가능합니다").as_deref(),
        Some("공동 호스트")
    );
    assert_eq!(parser::detect_role_label("그냥 본문에 호스트라는 단어만 있음"), None);
}

#[test]
fn test_role_helpers() {
    assert!(parser::is_host_role("호스트"));
    assert!(parser::is_host_role("공동 호스트"));
    assert!(parser::is_host_role("Co-host"));
    assert!(parser::is_guest_role("게스트"));
    assert!(parser::is_guest_role("예약자"));
    assert!(parser::is_guest_role("Guest"));
    assert!(!parser::is_guest_role("호스트"));
}

// --- Header decoding ---

#[test]
fn test_decode_encoded_words() {
    // "안녕하세요" in RFC 2047 base64 form
    assert_eq!(
        parser::decode_encoded_words("=?UTF-8?B?7JWI64WV7ZWY7IS47JqU?="),
        "안녕하세요"
    );
    assert_eq!(parser::decode_encoded_words("Airbnb: new message"), "Airbnb: new message");
}

#[test]
fn test_extract_address() {
    assert_eq!(
        parser::extract_address("Airbnb <automated@airbnb.com>"),
        "automated@airbnb.com"
    );
    assert_eq!(parser::extract_address("plain@example.com"), "plain@example.com");
}

// --- Full payload parsing ---

#[test]
fn test_parse_payload_full() {
    let payload = mailbox_payload("m-100", "t-100", "Airbnb: new message", SAMPLE_GUEST_EMAIL);
    let parsed = parser::parse_payload(&payload).unwrap();

    assert_eq!(parsed.external_id, "m-100");
    assert_eq!(parsed.thread_id, "t-100");
    assert_eq!(parsed.subject, "Airbnb: new message");
    assert_eq!(parsed.from_email, "automated@airbnb.com");
    assert_eq!(parsed.ota, "airbnb");
    assert_eq!(parsed.sender_role.as_deref(), Some("게스트"));
    assert!(parsed.guest_segment.unwrap().starts_with("체크인 몇 시부터"));
    assert_eq!(
        parsed.rfc822_message_id.as_deref(),
        Some("<m-100@mail.airbnb.com>")
    );
    assert!(parsed.received_at.starts_with("2025-"));
}

#[test]
fn test_parse_payload_encoded_subject() {
    let payload = mailbox_payload("m-101", "t-101", "=?UTF-8?B?7JWI64WV7ZWY7IS47JqU?=", SAMPLE_GUEST_EMAIL);
    let parsed = parser::parse_payload(&payload).unwrap();
    assert_eq!(parsed.subject, "안녕하세요");
}

#[test]
fn test_parse_payload_no_body_is_error() {
    let mut payload = mailbox_payload("m-102", "t-102", "subject", "body");
    payload.payload.parts.clear();
    assert!(parser::parse_payload(&payload).is_err());
}

#[test]
fn test_listing_id_from_rooms_url() {
    let body = format!(
        "{}\nhttps://www.airbnb.com/rooms/48291734?adults=2\n",
        SAMPLE_GUEST_EMAIL
    );
    let payload = mailbox_payload("m-103", "t-103", "subject", &body);
    let parsed = parser::parse_payload(&payload).unwrap();
    assert_eq!(parsed.listing_id.as_deref(), Some("48291734"));
}

#[test]
fn test_booking_metadata_grammar() {
    let body = "김철수\n\n게스트\n\n가입 연도: 2020\n\n체크인: 2026-08-15\n체크아웃: 2026-08-17\n예약 코드: HMABCD1234\n\n잘 부탁드립니다!\n\n고객지원\n";
    let payload = mailbox_payload("m-104", "t-104", "subject", body);
    let parsed = parser::parse_payload(&payload).unwrap();

    assert_eq!(parsed.booking.checkin_date.as_deref(), Some("2026-08-15"));
    assert_eq!(parsed.booking.checkout_date.as_deref(), Some("2026-08-17"));
    assert_eq!(parsed.booking.reservation_code.as_deref(), Some("HMABCD1234"));
    assert_eq!(parsed.booking.guest_name.as_deref(), Some("김철수"));
}
