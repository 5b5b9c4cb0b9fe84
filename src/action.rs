use crate::models::{ActionDecision, ActionType, Intent, IntentOutcome};

/// Map a classified intent to the operator-facing action.
///
/// Total over the intent set; rules apply in order, first match wins.
pub fn decide(outcome: &IntentOutcome) -> ActionDecision {
    let intent = outcome.intent();
    let fine = outcome.fine_intent();
    let confidence = outcome.confidence();
    let ambiguous = outcome.is_ambiguous();

    // Low confidence or an ambiguous/failed classification goes to a human
    // first; a draft may still be produced.
    if ambiguous || confidence < 0.5 {
        return ActionDecision {
            action: ActionType::StaffReviewRequired,
            reason: format!(
                "intent={}, fine={}, confidence={confidence:.2}, ambiguous={ambiguous}",
                intent.as_str(),
                fine.map(|f| f.as_str()).unwrap_or("-"),
            ),
            escalation_level: 0,
            allow_auto_send: false,
            block_auto_reply: false,
        };
    }

    match intent {
        Intent::Complaint => ActionDecision {
            action: ActionType::StaffAlert,
            reason: "COMPLAINT intent requires immediate staff attention".to_string(),
            escalation_level: 2,
            allow_auto_send: false,
            block_auto_reply: false,
        },
        Intent::ReservationChange | Intent::Cancellation => ActionDecision {
            action: ActionType::StaffReviewRequired,
            reason: format!("{} touches the booking, human review required", intent.as_str()),
            escalation_level: 1,
            allow_auto_send: false,
            block_auto_reply: false,
        },
        Intent::CheckinQuestion
        | Intent::CheckoutQuestion
        | Intent::LocationQuestion
        | Intent::AmenityQuestion
        | Intent::HouseRuleQuestion
        | Intent::PetPolicyQuestion => ActionDecision {
            action: ActionType::AutoReply,
            reason: format!("{} is answerable from the property profile", intent.as_str()),
            escalation_level: 0,
            allow_auto_send: true,
            block_auto_reply: false,
        },
        Intent::ThanksOrGoodReview => ActionDecision {
            action: ActionType::NoAction,
            reason: "thanks/positive feedback needs no reply".to_string(),
            escalation_level: 0,
            allow_auto_send: false,
            block_auto_reply: true,
        },
        Intent::GeneralQuestion => ActionDecision {
            action: ActionType::DraftOnly,
            reason: "GENERAL_QUESTION gets a draft for human review".to_string(),
            escalation_level: 0,
            allow_auto_send: false,
            block_auto_reply: false,
        },
        Intent::Other => ActionDecision {
            action: ActionType::DraftOnly,
            reason: format!("{} (uncategorized) gets a draft for human review", intent.as_str()),
            escalation_level: 0,
            allow_auto_send: false,
            block_auto_reply: false,
        },
    }
}
