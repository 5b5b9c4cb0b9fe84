use crate::models::{FineIntent, IngestedMessage, Intent, PropertyProfile};
use serde::Serialize;
use serde_json::{Value, json};

/// Knowledge bundle handed to the reply generator: the relevant slice of
/// the property profile, the message metadata, and the classified intent.
#[derive(Debug, Serialize, Clone)]
pub struct ReplyContext {
    pub property: Option<Value>,
    pub message: Value,
    pub intent: Value,
    pub locale: String,
    /// FAQ keys covering the knowledge used by a draft built from this
    /// context; auto-send statistics are keyed by these.
    pub faq_keys: Vec<String>,
}

impl ReplyContext {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// Which profile fields each intent needs. Unknown intents get the broad
/// projection so the generator still has something to work with.
fn projected_fields(intent: Option<Intent>) -> &'static [&'static str] {
    match intent {
        Some(Intent::CheckinQuestion) | Some(Intent::CheckoutQuestion) => &[
            "checkin_from",
            "checkin_to",
            "checkout_until",
            "access_guide",
            "location_guide",
            "house_rules",
        ],
        Some(Intent::PetPolicyQuestion) => &["pet_policy", "house_rules"],
        Some(Intent::LocationQuestion) => &["address_summary", "location_guide", "amenities"],
        Some(Intent::AmenityQuestion) => &["amenities", "space_overview"],
        Some(Intent::HouseRuleQuestion) => &["house_rules", "smoking_policy", "noise_policy"],
        _ => &[
            "space_overview",
            "amenities",
            "parking_info",
            "pet_policy",
            "location_guide",
            "house_rules",
            "noise_policy",
        ],
    }
}

/// FAQ keys implied by an intent (refined by the fine intent when present).
pub fn faq_keys_for(intent: Option<Intent>, fine: Option<FineIntent>) -> Vec<String> {
    let mut keys: Vec<String> = match intent {
        Some(Intent::CheckinQuestion) => vec!["CHECKIN_INFO".to_string()],
        Some(Intent::CheckoutQuestion) => vec!["CHECKOUT_INFO".to_string()],
        Some(Intent::LocationQuestion) => vec!["LOCATION_INFO".to_string()],
        Some(Intent::AmenityQuestion) => vec!["AMENITIES_INFO".to_string()],
        Some(Intent::PetPolicyQuestion) => vec!["PET_POLICY".to_string()],
        Some(Intent::HouseRuleQuestion) => vec!["HOUSE_RULES".to_string()],
        _ => vec![
            "CHECKIN_INFO".to_string(),
            "LOCATION_INFO".to_string(),
            "HOUSE_RULES".to_string(),
        ],
    };
    if let Some(fine) = fine {
        let key = fine.as_str().to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn profile_context(profile: &PropertyProfile, intent: Option<Intent>) -> Value {
    let mut ctx = json!({
        "property_code": profile.property_code,
        "name": profile.name,
        "locale": profile.locale,
    });

    let common = json!({
        "checkin_from": profile.checkin_from,
        "checkin_to": profile.checkin_to,
        "checkout_until": profile.checkout_until,
        "parking_info": profile.parking_info,
        "pet_policy": profile.pet_policy,
        "smoking_policy": profile.smoking_policy,
        "noise_policy": profile.noise_policy,
        "amenities": profile.amenities,
        "address_summary": profile.address_summary,
        "location_guide": profile.location_guide,
        "access_guide": profile.access_guide,
        "house_rules": profile.house_rules,
        "space_overview": profile.space_overview,
        "extra_metadata": profile.extra_metadata,
    });

    let fields = projected_fields(intent);
    if let (Some(obj), Some(src)) = (ctx.as_object_mut(), common.as_object()) {
        for field in fields {
            if let Some(v) = src.get(*field)
                && !v.is_null()
            {
                obj.insert((*field).to_string(), v.clone());
            }
        }
    }
    ctx
}

/// Assemble the context bundle for one message. Pure: the profile lookup
/// happens in the caller.
pub fn build(
    profile: Option<&PropertyProfile>,
    message: &IngestedMessage,
    intent: Option<Intent>,
    fine: Option<FineIntent>,
    locale: &str,
) -> ReplyContext {
    let property = profile.map(|p| profile_context(p, intent));

    let message_ctx = json!({
        "id": message.id,
        "mailbox_message_id": message.mailbox_message_id,
        "thread_id": message.thread_id,
        "subject": message.subject,
        "from_email": message.from_email,
        "received_at": message.received_at,
        "guest_segment": message.guest_segment,
        "sender_actor": message.sender_actor,
        "actionability": message.actionability,
        "guest_name": message.guest_name,
        "checkin_date": message.checkin_date,
        "checkout_date": message.checkout_date,
    });

    let intent_ctx = json!({
        "intent": intent.map(|i| i.as_str()),
        "fine_intent": fine.map(|f| f.as_str()),
    });

    ReplyContext {
        property,
        message: message_ctx,
        intent: intent_ctx,
        locale: locale.to_string(),
        faq_keys: faq_keys_for(intent, fine),
    }
}
