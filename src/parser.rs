use crate::clients::{MailboxPayload, MimePart};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{BookingMeta, ParsedMessage};
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use regex::Regex;
use std::sync::LazyLock;

// CTA / FAQ / footer markers that terminate the guest-authored region.
// The Korean set matches the OTA's host-notification layout; English
// equivalents cover the same mails rendered in an English locale.
static CTA_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"예약\s*사전\s*승인",
        r"24시간\s*이내에\s*답장해주세요",
        r"자주\s*묻는\s*질문",
        r"고객지원",
        r"Pre-approve",
        r"(?i)respond within 24 hours",
        r"(?i)frequently asked questions",
        r"(?i)help cent(er|re)",
        r"Airbnb Ireland UC",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid CTA pattern"))
    .collect()
});

// Profile-block anchors: the "joined <year>" label, or a stand-alone
// locality/country line. Guest text starts after this block.
static JOINED_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"가입 연도|Joined in \d{4}").expect("valid anchor pattern"));
static LOCALITY_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w\-가-힣]+,\s*(South\s)?(Korea|대한민국)$").expect("valid locality pattern")
});
const COUNTRY_LINES: &[&str] = &["South Korea", "Korea", "대한민국"];

// Line-anchored role labels. The raw matched label is stored verbatim.
static ROLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*(공동\s*호스트)\s*$",
        r"(?m)^\s*(호스트)\s*$",
        r"(?m)^\s*(게스트)\s*$",
        r"(?m)^\s*(예약자)\s*$",
        r"(?m)^\s*(Co-?[Hh]ost)\s*$",
        r"(?m)^\s*(Host)\s*$",
        r"(?m)^\s*(Guest)\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid role pattern"))
    .collect()
});

static LISTING_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/rooms/(\d+)").expect("valid listing pattern"));

static RESERVATION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:예약 코드|[Cc]onfirmation code)[:\s]*([A-Z0-9]{6,12})|\b(HM[A-Z0-9]{8})\b")
        .expect("valid reservation code pattern")
});

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}[./-]\s?\d{1,2}[./-]\s?\d{1,2}|\d{1,2}월\s?\d{1,2}일")
        .expect("valid date pattern")
});
static CHECKIN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"체크인|[Cc]heck-?in").expect("valid check-in pattern"));
static CHECKOUT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"체크아웃|[Cc]heck-?out").expect("valid check-out pattern"));

/// Whether a raw role label denotes the host side (outgoing copy).
pub fn is_host_role(label: &str) -> bool {
    let l = label.trim();
    l == "호스트" || l == "공동 호스트" || l == "공동호스트" || l.eq_ignore_ascii_case("host")
        || l.to_lowercase().replace('-', "") == "cohost"
}

/// Whether a raw role label denotes the guest side.
pub fn is_guest_role(label: &str) -> bool {
    let l = label.trim();
    l == "게스트" || l == "예약자" || l.eq_ignore_ascii_case("guest")
}

/// Parse one raw mailbox payload into a normalized message.
pub fn parse_payload(payload: &MailboxPayload) -> PipelineResult<ParsedMessage> {
    let subject_raw = header_value(&payload.payload, "Subject").unwrap_or_default();
    let from_raw = header_value(&payload.payload, "From").unwrap_or_default();
    let rfc822_message_id = header_value(&payload.payload, "Message-ID")
        .or_else(|| header_value(&payload.payload, "Message-Id"));

    let subject = decode_encoded_words(&subject_raw);
    let from_email = extract_address(&decode_encoded_words(&from_raw));

    let (text_body, html_body) = collect_bodies(&payload.payload);
    if text_body.is_none() && html_body.is_none() {
        return Err(PipelineError::Parse(format!(
            "message {} has no decodable body",
            payload.id
        )));
    }

    let received_at = payload
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(chrono::DateTime::from_timestamp_millis)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339();

    let text = text_body.clone().unwrap_or_default();
    let combined = format!("{}\n{}", text, html_body.clone().unwrap_or_default());

    let guest_segment = extract_guest_segment(&text);
    let sender_role = detect_role_label(&text);
    let listing_id = LISTING_URL
        .captures(&combined)
        .map(|c| c[1].to_string());
    let booking = extract_booking_meta(&text, sender_role.as_deref());

    let ota = detect_ota(&from_email);

    Ok(ParsedMessage {
        external_id: payload.id.clone(),
        thread_id: payload.thread_id.clone(),
        received_at,
        from_email,
        subject,
        snippet: if payload.snippet.is_empty() {
            None
        } else {
            Some(payload.snippet.clone())
        },
        text_body,
        html_body,
        guest_segment,
        ota,
        listing_id,
        sender_role,
        booking,
        rfc822_message_id,
    })
}

fn detect_ota(from_email: &str) -> String {
    let lower = from_email.to_lowercase();
    if lower.contains("airbnb") {
        "airbnb".to_string()
    } else if lower.contains("booking.com") {
        "booking".to_string()
    } else {
        "unknown".to_string()
    }
}

fn header_value(part: &MimePart, name: &str) -> Option<String> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Decode RFC 2047 encoded-words ("=?UTF-8?B?...?=") in a header value.
/// Plain values pass through untouched.
pub fn decode_encoded_words(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.trim().to_string();
    }
    let synthetic = format!("Subject: {}\r\n\r\n", raw.replace(['\r', '\n'], " "));
    mail_parser::MessageParser::default()
        .parse(synthetic.as_bytes())
        .and_then(|m| m.subject().map(|s| s.trim().to_string()))
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Pull the bare address out of a "Display Name <addr@host>" header.
pub fn extract_address(from: &str) -> String {
    if let (Some(start), Some(end)) = (from.find('<'), from.rfind('>'))
        && start < end
    {
        return from[start + 1..end].trim().to_string();
    }
    from.trim().to_string()
}

/// Decode a base64url part body. The provider pads inconsistently, so both
/// alphabets are tried.
fn decode_part_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Walk the MIME tree collecting the first text/plain and text/html bodies.
fn collect_bodies(part: &MimePart) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;
    collect_bodies_inner(part, &mut text, &mut html);
    (text, html)
}

fn collect_bodies_inner(part: &MimePart, text: &mut Option<String>, html: &mut Option<String>) {
    if let Some(ref data) = part.body.data {
        let decoded = decode_part_data(data);
        if part.mime_type.starts_with("text/plain") && text.is_none() {
            *text = decoded;
            return;
        }
        if part.mime_type.starts_with("text/html") && html.is_none() {
            *html = decoded;
            return;
        }
        // Single-part messages sometimes carry the body at the top level
        // with a multipart mime type left blank.
        if part.mime_type.is_empty() && text.is_none() {
            *text = decoded;
            return;
        }
    }
    for child in &part.parts {
        collect_bodies_inner(child, text, html);
    }
}

// --- Guest-segment extraction ---

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Drop tracking tokens and stand-alone OTA links — lines that can never be
/// guest-authored. Blank lines survive as block separators.
fn strip_noise_lines(lines: &[&str]) -> Vec<String> {
    let mut cleaned = Vec::with_capacity(lines.len());
    for line in lines {
        let s = line.trim();
        if s.is_empty() {
            cleaned.push(String::new());
            continue;
        }
        if s.starts_with("%opentrack%") {
            continue;
        }
        if (s.starts_with("http://") || s.starts_with("https://"))
            && (s.contains("airbnb.co.kr") || s.contains("airbnb.com"))
        {
            continue;
        }
        cleaned.push((*line).to_string());
    }
    cleaned
}

fn is_cta_line(line: &str) -> bool {
    CTA_PATTERNS.iter().any(|p| p.is_match(line))
}

/// Index of the profile-anchor line, if any: the "joined <year>" label
/// first, then a stand-alone country or locality-country line.
fn find_profile_anchor(lines: &[String]) -> Option<usize> {
    if let Some(i) = lines.iter().position(|l| JOINED_ANCHOR.is_match(l)) {
        return Some(i);
    }
    if let Some(i) = lines
        .iter()
        .position(|l| COUNTRY_LINES.contains(&l.trim()))
    {
        return Some(i);
    }
    lines
        .iter()
        .position(|l| LOCALITY_ANCHOR.is_match(l.trim()))
}

/// Collect the guest message that follows the profile block: start at the
/// first non-empty line after the anchor, stop at the first CTA marker,
/// collapse blank-line runs to one.
fn extract_after_profile_anchor(lines: &[String]) -> Option<String> {
    let base = find_profile_anchor(lines)?;

    let mut start = base + 1;
    while start < lines.len() && lines[start].trim().is_empty() {
        start += 1;
    }
    if start >= lines.len() {
        return None;
    }

    let mut collected: Vec<String> = Vec::new();
    let mut prev_empty = false;
    for raw in &lines[start..] {
        let line = raw.trim();
        if is_cta_line(line) {
            break;
        }
        if line.is_empty() {
            if !prev_empty && !collected.is_empty() {
                collected.push(String::new());
            }
            prev_empty = true;
        } else {
            collected.push(line.to_string());
            prev_empty = false;
        }
    }
    while collected.last().is_some_and(|l| l.is_empty()) {
        collected.pop();
    }

    let block = collected.join("\n").trim().to_string();
    if block.is_empty() { None } else { Some(block) }
}

/// Cut everything from the earliest CTA marker onward.
fn cut_before_cta(text: &str) -> &str {
    let earliest = CTA_PATTERNS
        .iter()
        .filter_map(|p| p.find(text).map(|m| m.start()))
        .min();
    match earliest {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// The last run of consecutive non-empty lines, as one trimmed block.
fn last_non_empty_block(text: &str) -> Option<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let candidate = blocks.pop()?;
    let block = candidate
        .iter()
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if block.is_empty() { None } else { Some(block) }
}

/// Extract the guest-authored segment from a notification's text body.
///
/// Primary strategy keys off the sender profile block (covers both inquiry
/// and confirmed-booking layouts); the fallback cuts at the earliest CTA
/// marker and keeps the last paragraph block before it.
pub fn extract_guest_segment(raw_text_body: &str) -> Option<String> {
    if raw_text_body.trim().is_empty() {
        return None;
    }

    let text = normalize_newlines(raw_text_body);
    let raw_lines: Vec<&str> = text.split('\n').collect();
    let lines = strip_noise_lines(&raw_lines);

    if let Some(primary) = extract_after_profile_anchor(&lines) {
        return Some(primary);
    }

    let rejoined = lines.join("\n");
    last_non_empty_block(cut_before_cta(&rejoined))
}

// --- Role detection ---

/// Find a line-anchored role label ("호스트", "게스트", "Host", ...) in the
/// body. Returns the raw label verbatim.
pub fn detect_role_label(text: &str) -> Option<String> {
    let normalized = normalize_newlines(text);
    ROLE_PATTERNS
        .iter()
        .filter_map(|p| p.captures(&normalized).map(|c| c[1].trim().to_string()))
        .next()
}

// --- Booking metadata grammar ---

fn extract_booking_meta(text: &str, sender_role: Option<&str>) -> BookingMeta {
    let normalized = normalize_newlines(text);
    let lines: Vec<&str> = normalized.split('\n').collect();

    let reservation_code = RESERVATION_CODE.captures(&normalized).map(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });

    let mut checkin_date = None;
    let mut checkout_date = None;
    for line in &lines {
        if checkin_date.is_none()
            && CHECKIN_LINE.is_match(line)
            && let Some(m) = DATE_TOKEN.find(line)
        {
            checkin_date = Some(m.as_str().to_string());
        }
        if checkout_date.is_none()
            && CHECKOUT_LINE.is_match(line)
            && let Some(m) = DATE_TOKEN.find(line)
        {
            checkout_date = Some(m.as_str().to_string());
        }
    }

    // The sender's display name sits on the non-empty line right above the
    // role label; it names the guest only for guest-authored messages.
    let mut guest_name = None;
    if let Some(role) = sender_role
        && is_guest_role(role)
        && let Some(role_idx) = lines.iter().position(|l| l.trim() == role.trim())
    {
        guest_name = lines[..role_idx]
            .iter()
            .rev()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .map(|l| l.to_string());
    }

    BookingMeta {
        guest_name,
        checkin_date,
        checkout_date,
        reservation_code,
    }
}
