use crate::common::FakeLlm;
use hostdesk::intent::{classify, rule_stage};
use hostdesk::models::{FineIntent, Intent, IntentOutcome};

// --- Rule stage ---

#[test]
fn test_checkin_question() {
    let outcome = rule_stage("체크인 몇 시부터 가능한가요?", "Airbnb: new message", None);
    match outcome {
        IntentOutcome::Confident {
            intent, confidence, ..
        } => {
            assert_eq!(intent, Intent::CheckinQuestion);
            assert!(confidence >= 0.7);
        }
        other => panic!("expected confident check-in intent, got {other:?}"),
    }
}

#[test]
fn test_complaint_english() {
    let outcome = rule_stage("The bathroom is filthy and the AC is broken.", "", None);
    assert_eq!(outcome.intent(), Intent::Complaint);
    assert!(!outcome.is_ambiguous());
    assert!(outcome.confidence() >= 0.7);
}

#[test]
fn test_pet_policy_question() {
    let outcome = rule_stage("강아지 데려가도 되나요?", "", None);
    assert_eq!(outcome.intent(), Intent::PetPolicyQuestion);
    assert!(!outcome.is_ambiguous());
}

#[test]
fn test_thanks_without_question() {
    let outcome = rule_stage("덕분에 잘 머물렀습니다. 감사합니다!", "", None);
    assert_eq!(outcome.intent(), Intent::ThanksOrGoodReview);
    assert!(!outcome.is_ambiguous());
}

#[test]
fn test_question_vetoes_thanks() {
    // A thanks phrase plus an actual question must not be filed as thanks.
    let outcome = rule_stage("감사합니다! 그런데 주차 가능한가요?", "", None);
    assert_eq!(outcome.intent(), Intent::LocationQuestion);
}

#[test]
fn test_competing_categories_are_ambiguous() {
    let outcome = rule_stage("체크인 시간이랑 주차 가능한지 알려주세요", "", None);
    assert!(outcome.is_ambiguous());
    assert!(outcome.confidence() < 0.7);
}

#[test]
fn test_bare_question_is_general() {
    let outcome = rule_stage("혹시 내일 이용 가능할까요?", "", None);
    match outcome {
        IntentOutcome::Ambiguous {
            candidate,
            confidence,
            ..
        } => {
            assert_eq!(candidate, Intent::GeneralQuestion);
            assert_eq!(confidence, 0.5);
        }
        other => panic!("expected ambiguous general question, got {other:?}"),
    }
}

#[test]
fn test_no_signal_is_other() {
    let outcome = rule_stage("asdf qwer zxcv", "", None);
    assert_eq!(outcome.intent(), Intent::Other);
    assert!(outcome.is_ambiguous());
}

#[test]
fn test_fine_intent_detection() {
    let outcome = rule_stage("얼리 체크인 가능한가요?", "", None);
    assert_eq!(outcome.intent(), Intent::CheckinQuestion);
    assert_eq!(outcome.fine_intent(), Some(FineIntent::EarlyCheckin));

    let outcome = rule_stage("와이파이 비밀번호 알려주세요", "", None);
    assert_eq!(outcome.intent(), Intent::AmenityQuestion);
    assert_eq!(outcome.fine_intent(), Some(FineIntent::WifiInfo));
}

/// Same inputs, same output — the rule stage is a pure function.
#[test]
fn test_rule_stage_deterministic() {
    for text in [
        "체크인 몇 시부터 가능한가요?",
        "The bathroom is filthy and the AC is broken.",
        "감사합니다! 그런데 주차 가능한가요?",
        "asdf qwer zxcv",
    ] {
        let a = rule_stage(text, "subject", Some("snippet"));
        let b = rule_stage(text, "subject", Some("snippet"));
        assert_eq!(a, b);
    }
}

// --- Hybrid classify ---

#[rocket::async_test]
async fn test_confident_rule_skips_llm() {
    // A failing LLM is never consulted when the rules are sure.
    let llm = FakeLlm::failing();
    let outcome = classify(&llm, "체크인 몇 시부터 가능한가요?", "", None, true).await;
    assert_eq!(outcome.intent(), Intent::CheckinQuestion);
    assert!(!outcome.is_ambiguous());
}

#[rocket::async_test]
async fn test_llm_resolves_unmatched_text() {
    let llm = FakeLlm::scripted(vec![
        r#"{"intent": "PET_POLICY_QUESTION", "confidence": 0.9, "reasons": ["asks about an animal companion"]}"#,
    ]);
    let outcome = classify(&llm, "우리 집 친구 한 마리와 같이 가도 되나요?", "", None, true).await;
    assert_eq!(outcome.intent(), Intent::PetPolicyQuestion);
    assert!(!outcome.is_ambiguous());
    assert!(outcome.confidence() >= 0.9);
}

#[rocket::async_test]
async fn test_llm_unknown_name_maps_to_other() {
    let llm = FakeLlm::scripted(vec![
        r#"{"intent": "SOMETHING_NEW", "confidence": 0.9, "reasons": []}"#,
    ]);
    let outcome = classify(&llm, "uncategorizable text", "", None, true).await;
    assert_eq!(outcome.intent(), Intent::Other);
}

#[rocket::async_test]
async fn test_llm_parse_failure_degrades() {
    let llm = FakeLlm::scripted(vec!["I think it's a check-in question."]);
    let outcome = classify(&llm, "혹시 내일 이용 가능할까요?", "", None, true).await;
    // The rule stage's general-question candidate survives, but ambiguous.
    assert!(outcome.is_ambiguous());
    assert_eq!(outcome.intent(), Intent::GeneralQuestion);
}

#[rocket::async_test]
async fn test_llm_failure_with_no_rule_signal() {
    let llm = FakeLlm::failing();
    let outcome = classify(&llm, "asdf qwer zxcv", "", None, true).await;
    assert_eq!(outcome.intent(), Intent::Other);
    assert!(outcome.is_ambiguous());
    assert!((outcome.confidence() - 0.3).abs() < 1e-9);
}

#[rocket::async_test]
async fn test_use_llm_false_is_rule_only() {
    let llm = FakeLlm::scripted(vec![
        r#"{"intent": "CANCELLATION", "confidence": 0.99, "reasons": []}"#,
    ]);
    let outcome = classify(&llm, "asdf qwer zxcv", "", None, false).await;
    // LLM never consulted, so the scripted response is untouched.
    assert_eq!(outcome.intent(), Intent::Other);
}

/// With the LLM stage stubbed out the whole classifier is deterministic.
#[rocket::async_test]
async fn test_classify_deterministic_with_stubbed_llm() {
    let texts = ["체크인 몇 시부터 가능한가요?", "혹시 내일 이용 가능할까요?", "asdf"];
    for text in texts {
        let a = classify(&FakeLlm::failing(), text, "s", None, true).await;
        let b = classify(&FakeLlm::failing(), text, "s", None, true).await;
        assert_eq!(a, b);
    }
}
