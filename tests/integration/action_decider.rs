use hostdesk::action::decide;
use hostdesk::models::{ActionType, Intent, IntentOutcome};

fn confident(intent: Intent, confidence: f64) -> IntentOutcome {
    IntentOutcome::Confident {
        intent,
        fine_intent: None,
        confidence,
        reasons: vec![],
    }
}

fn expected_action(intent: Intent) -> ActionType {
    match intent {
        Intent::Complaint => ActionType::StaffAlert,
        Intent::ReservationChange | Intent::Cancellation => ActionType::StaffReviewRequired,
        Intent::CheckinQuestion
        | Intent::CheckoutQuestion
        | Intent::LocationQuestion
        | Intent::AmenityQuestion
        | Intent::HouseRuleQuestion
        | Intent::PetPolicyQuestion => ActionType::AutoReply,
        Intent::ThanksOrGoodReview => ActionType::NoAction,
        Intent::GeneralQuestion | Intent::Other => ActionType::DraftOnly,
    }
}

/// Every (intent, confidence, ambiguous) combination yields a decision and
/// the decision matches the rule table.
#[test]
fn test_decider_total_over_intent_set() {
    for intent in Intent::ALL {
        // Confident and above the floor: the per-intent rule applies.
        let decision = decide(&confident(intent, 0.9));
        assert_eq!(decision.action, expected_action(intent), "intent {intent:?}");

        // Low confidence always routes to staff review.
        let decision = decide(&confident(intent, 0.3));
        assert_eq!(decision.action, ActionType::StaffReviewRequired);
        assert!(!decision.allow_auto_send);

        // Ambiguity always routes to staff review, whatever the candidate.
        let decision = decide(&IntentOutcome::Ambiguous {
            candidate: intent,
            confidence: 0.65,
            reasons: vec![],
        });
        assert_eq!(decision.action, ActionType::StaffReviewRequired);
        assert_eq!(decision.escalation_level, 0);
    }
}

#[test]
fn test_complaint_escalates_level_two() {
    let decision = decide(&confident(Intent::Complaint, 0.9));
    assert_eq!(decision.action, ActionType::StaffAlert);
    assert_eq!(decision.escalation_level, 2);
    assert!(!decision.allow_auto_send);
    assert!(!decision.block_auto_reply);
}

#[test]
fn test_booking_changes_escalate_level_one() {
    for intent in [Intent::ReservationChange, Intent::Cancellation] {
        let decision = decide(&confident(intent, 0.9));
        assert_eq!(decision.action, ActionType::StaffReviewRequired);
        assert_eq!(decision.escalation_level, 1);
        assert!(!decision.allow_auto_send);
    }
}

#[test]
fn test_profile_questions_allow_auto_send() {
    for intent in [
        Intent::CheckinQuestion,
        Intent::CheckoutQuestion,
        Intent::LocationQuestion,
        Intent::AmenityQuestion,
        Intent::HouseRuleQuestion,
        Intent::PetPolicyQuestion,
    ] {
        let decision = decide(&confident(intent, 0.9));
        assert_eq!(decision.action, ActionType::AutoReply);
        assert!(decision.allow_auto_send);
        assert!(!decision.block_auto_reply);
    }
}

#[test]
fn test_thanks_blocks_auto_reply() {
    let decision = decide(&confident(Intent::ThanksOrGoodReview, 0.9));
    assert_eq!(decision.action, ActionType::NoAction);
    assert!(decision.block_auto_reply);
    assert!(!decision.allow_auto_send);
}

#[test]
fn test_classification_failure_goes_to_staff() {
    let decision = decide(&IntentOutcome::Failed {
        reason: "LLM response was not valid JSON".to_string(),
    });
    assert_eq!(decision.action, ActionType::StaffReviewRequired);
    assert!(!decision.allow_auto_send);
}
