use crate::clients::LlmClient;
use crate::models::{FineIntent, Intent, IntentOutcome};
use serde::Deserialize;

/// Confidence below which the rule stage defers to the LLM stage.
pub const RULE_CONFIDENCE_FLOOR: f64 = 0.7;

// Keyword tables for the rule stage, checked against the guest segment,
// subject and snippet. Korean phrases match the OTA's home market; the
// English set covers international guests.
const RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Complaint,
        &[
            "불만", "더럽", "더러", "고장", "시끄럽", "최악", "냄새", "벌레", "환불해",
            "dirty", "filthy", "broken", "not working", "terrible", "awful", "complaint", "smell",
        ],
    ),
    (
        Intent::Cancellation,
        &["취소", "환불", "cancel", "refund"],
    ),
    (
        Intent::ReservationChange,
        &[
            "날짜 변경", "날짜를 변경", "인원 변경", "인원 추가", "일정 변경", "변경 가능",
            "change the date", "change my reservation", "change our reservation", "add a guest",
        ],
    ),
    (
        Intent::CheckinQuestion,
        &["체크인", "입실", "얼리 체크인", "check-in", "check in", "checkin", "early check"],
    ),
    (
        Intent::CheckoutQuestion,
        &["체크아웃", "퇴실", "레이트 체크아웃", "check-out", "check out", "checkout", "late check"],
    ),
    (
        Intent::PetPolicyQuestion,
        &["반려동물", "반려견", "강아지", "고양이", "애견", "pet", "dog", "cat"],
    ),
    (
        Intent::LocationQuestion,
        &[
            "위치", "주소", "찾아가", "가는 법", "오시는 길", "주차", "주차장",
            "location", "address", "how to get", "directions", "parking",
        ],
    ),
    (
        Intent::HouseRuleQuestion,
        &[
            "흡연", "금연", "파티", "소음", "이용 규칙", "하우스 룰",
            "smoking", "smoke", "party", "house rules", "quiet hours",
        ],
    ),
    (
        Intent::AmenityQuestion,
        &[
            "수건", "침구", "비품", "와이파이", "와이파이 비밀번호", "세탁기", "건조기",
            "에어컨", "주방", "바베큐", "수영장",
            "towel", "wifi", "wi-fi", "washer", "dryer", "amenities", "bbq", "pool", "kitchen",
        ],
    ),
    (
        Intent::ThanksOrGoodReview,
        &[
            "감사합니다", "감사해요", "고맙습니다", "덕분에", "잘 도착", "잘 이용", "잘 머물렀",
            "좋은 하루", "수고하세요",
            "thank you", "thanks", "great stay", "wonderful stay", "appreciate",
        ],
    ),
];

// Question/request markers: their presence vetoes a thanks-only reading
// and upgrades an unmatched message to GENERAL_QUESTION.
const QUESTION_MARKERS: &[&str] = &[
    "?", "문의", "궁금", "알려", "가능할까요", "될까요", "혹시",
    "could you", "can you", "please let", "is it possible",
];

// Fine-grained sub-topics, each tied to the coarse intent it refines.
const FINE_RULES: &[(FineIntent, Intent, &[&str])] = &[
    (FineIntent::EarlyCheckin, Intent::CheckinQuestion, &["얼리 체크인", "일찍 체크인", "early check"]),
    (FineIntent::LateCheckout, Intent::CheckoutQuestion, &["레이트 체크아웃", "늦게 체크아웃", "late check"]),
    (FineIntent::LuggageStorage, Intent::CheckinQuestion, &["짐 보관", "짐을 맡", "luggage", "baggage"]),
    (FineIntent::WifiInfo, Intent::AmenityQuestion, &["와이파이", "wifi", "wi-fi"]),
    (FineIntent::ParkingInfo, Intent::LocationQuestion, &["주차", "parking"]),
    (FineIntent::ExtraBedding, Intent::AmenityQuestion, &["추가 침구", "이불 추가", "extra bed", "extra bedding"]),
];

/// Keyword containment check. Short English keywords ("pet", "cat") only
/// count on word boundaries, so "uncategorizable" never reads as a pet
/// question; non-ASCII keywords match as plain substrings.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    let bounded = keyword
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-');
    if !bounded {
        return haystack.contains(keyword);
    }

    let mut search_from = 0;
    while let Some(offset) = haystack[search_from..].find(keyword) {
        let start = search_from + offset;
        let end = start + keyword.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        search_from = end;
    }
    false
}

/// Deterministic keyword pass over the guest segment, subject and snippet.
///
/// A single matched category scores 0.85; competing categories drop to 0.6
/// (the LLM stage arbitrates); no match at all yields OTHER at 0.0, or
/// GENERAL_QUESTION at 0.5 when the text clearly asks something.
pub fn rule_stage(guest_segment: &str, subject: &str, snippet: Option<&str>) -> IntentOutcome {
    let haystack = format!("{}\n{}\n{}", guest_segment, subject, snippet.unwrap_or(""))
        .to_lowercase();

    let has_question = QUESTION_MARKERS.iter().any(|m| haystack.contains(m));

    let mut hits: Vec<(Intent, usize, &str)> = Vec::new();
    for (intent, keywords) in RULES {
        let mut count = 0usize;
        let mut first = "";
        for kw in *keywords {
            if contains_keyword(&haystack, &kw.to_lowercase()) {
                if count == 0 {
                    first = kw;
                }
                count += 1;
            }
        }
        if count > 0 {
            // A thanks reading only survives when nothing is being asked.
            if *intent == Intent::ThanksOrGoodReview && has_question {
                continue;
            }
            hits.push((*intent, count, first));
        }
    }

    let fine_intent = FINE_RULES
        .iter()
        .find(|(_, coarse, keywords)| {
            hits.iter().any(|(i, _, _)| i == coarse)
                && keywords
                    .iter()
                    .any(|kw| contains_keyword(&haystack, &kw.to_lowercase()))
        })
        .map(|(fine, _, _)| *fine);

    match hits.len() {
        0 => {
            if has_question {
                IntentOutcome::Ambiguous {
                    candidate: Intent::GeneralQuestion,
                    confidence: 0.5,
                    reasons: vec!["question marker without a category keyword".to_string()],
                }
            } else {
                IntentOutcome::Ambiguous {
                    candidate: Intent::Other,
                    confidence: 0.0,
                    reasons: vec!["no rule keyword matched".to_string()],
                }
            }
        }
        1 => {
            let (intent, _, kw) = hits[0];
            IntentOutcome::Confident {
                intent,
                fine_intent,
                confidence: 0.85,
                reasons: vec![format!("rule keyword '{kw}' matched {}", intent.as_str())],
            }
        }
        _ => {
            // Competing categories: keep the strongest hit (table order
            // breaks ties, which puts escalation-heavy intents first).
            hits.sort_by(|a, b| b.1.cmp(&a.1));
            let (intent, _, kw) = hits[0];
            let competitors: Vec<&str> = hits[1..].iter().map(|(i, _, _)| i.as_str()).collect();
            IntentOutcome::Ambiguous {
                candidate: intent,
                confidence: 0.6,
                reasons: vec![format!(
                    "rule keyword '{kw}' matched {} but {} also matched",
                    intent.as_str(),
                    competitors.join(", ")
                )],
            }
        }
    }
}

// --- LLM stage ---

#[derive(Debug, Deserialize)]
struct LlmIntentRaw {
    intent: String,
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
}

fn llm_system_prompt() -> String {
    let mut names = String::new();
    for intent in Intent::ALL {
        names.push_str("- ");
        names.push_str(intent.as_str());
        names.push('\n');
    }
    format!(
        "You classify guest messages sent to a short-term-rental host. \
Read the Korean or English message and pick exactly one intent from this list:\n\n{names}\n\
Respond with JSON only, no prose:\n\
{{\"intent\": \"<INTENT_NAME>\", \"confidence\": 0.0-1.0, \"reasons\": [\"short reason\", ...]}}"
    )
}

// The original deployment's prompt accepted short Korean labels too; keep
// that tolerance so a drifting model stays inside the closed set.
fn map_intent_name(name: &str) -> Intent {
    let korean = match name.trim() {
        "체크인" => Some(Intent::CheckinQuestion),
        "체크아웃" => Some(Intent::CheckoutQuestion),
        "예약변경" => Some(Intent::ReservationChange),
        "취소" => Some(Intent::Cancellation),
        "불만" => Some(Intent::Complaint),
        "위치문의" => Some(Intent::LocationQuestion),
        "편의시설문의" => Some(Intent::AmenityQuestion),
        "반려동물문의" => Some(Intent::PetPolicyQuestion),
        "일반문의" => Some(Intent::GeneralQuestion),
        "감사인사" => Some(Intent::ThanksOrGoodReview),
        _ => None,
    };
    korean.unwrap_or_else(|| Intent::parse(name))
}

/// Ask the LLM for an intent. Transport or parse failures degrade to
/// `(OTHER, 0.3, ambiguous)` — never an error.
async fn llm_stage(
    llm: &dyn LlmClient,
    guest_segment: &str,
    subject: &str,
    snippet: Option<&str>,
) -> IntentOutcome {
    let mut user = String::new();
    if !subject.is_empty() {
        user.push_str(&format!("[Subject]\n{subject}\n\n"));
    }
    if let Some(snippet) = snippet {
        user.push_str(&format!("[Snippet]\n{snippet}\n\n"));
    }
    user.push_str(&format!("[Guest message]\n{guest_segment}"));

    let raw = match llm.chat(&llm_system_prompt(), &user, 0.2).await {
        Ok(text) => text,
        Err(e) => {
            return IntentOutcome::Failed {
                reason: format!("LLM call failed: {e}"),
            };
        }
    };

    match serde_json::from_str::<LlmIntentRaw>(raw.trim()) {
        Ok(parsed) => {
            let intent = map_intent_name(&parsed.intent);
            let mut reasons = parsed.reasons;
            reasons.push(format!("LLM predicted intent={} -> {}", parsed.intent, intent.as_str()));
            IntentOutcome::Confident {
                intent,
                fine_intent: None,
                confidence: parsed.confidence.clamp(0.0, 1.0),
                reasons,
            }
        }
        Err(_) => IntentOutcome::Failed {
            reason: format!("LLM response was not valid JSON: {}", truncate(&raw, 200)),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// Two-stage hybrid classification.
///
/// The rule stage runs first; the LLM stage is consulted only when the
/// rules are unsure (confidence < 0.7 or OTHER). The merged primary intent
/// is the higher-confidence of the two, with ambiguity set when the stages
/// disagree and neither clears 0.7. Pure in its inputs and the LlmClient —
/// no database access.
pub async fn classify(
    llm: &dyn LlmClient,
    guest_segment: &str,
    subject: &str,
    snippet: Option<&str>,
    use_llm: bool,
) -> IntentOutcome {
    let rule = rule_stage(guest_segment, subject, snippet);

    let rule_confident =
        !rule.is_ambiguous() && rule.confidence() >= RULE_CONFIDENCE_FLOOR && rule.intent() != Intent::Other;
    if rule_confident || !use_llm {
        return rule;
    }

    let llm_outcome = llm_stage(llm, guest_segment, subject, snippet).await;

    merge(rule, llm_outcome)
}

fn merge(rule: IntentOutcome, llm: IntentOutcome) -> IntentOutcome {
    // An LLM failure leaves only the rule view; a rule view with no signal
    // at all degrades to the documented (OTHER, 0.3, ambiguous).
    if let IntentOutcome::Failed { reason } = &llm {
        return if rule.confidence() > 0.3 {
            IntentOutcome::Ambiguous {
                candidate: rule.intent(),
                confidence: rule.confidence(),
                reasons: [rule.reasons(), vec![reason.clone()]].concat(),
            }
        } else {
            IntentOutcome::Failed {
                reason: reason.clone(),
            }
        };
    }

    let reasons = [rule.reasons(), llm.reasons()].concat();
    let (winner_intent, winner_conf) = if llm.confidence() > rule.confidence() {
        (llm.intent(), llm.confidence())
    } else {
        (rule.intent(), rule.confidence())
    };

    let disagree = rule.intent() != llm.intent();
    if disagree && rule.confidence() <= 0.7 && llm.confidence() <= 0.7 {
        return IntentOutcome::Ambiguous {
            candidate: winner_intent,
            confidence: winner_conf,
            reasons,
        };
    }

    IntentOutcome::Confident {
        intent: winner_intent,
        fine_intent: rule.fine_intent(),
        confidence: winner_conf,
        reasons,
    }
}
