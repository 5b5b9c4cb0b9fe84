use crate::error::{PipelineError, PipelineResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use mail_builder::MessageBuilder;
use mail_builder::headers::raw::Raw;

/// Compose an RFC 5322 reply and return it base64url-encoded, ready for
/// the mailbox `send` call.
///
/// Subject gains a "Re: " prefix unless one is already present; when the
/// original Message-ID is known it is carried in In-Reply-To/References so
/// mail clients keep the thread together. Body is UTF-8 plain text.
pub fn compose_reply(
    to_email: &str,
    subject: &str,
    from_address: &str,
    reply_text: &str,
    original_message_id: Option<&str>,
) -> PipelineResult<String> {
    let subject = if subject.to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    };

    let mut builder = MessageBuilder::new()
        .to(to_email)
        .subject(subject)
        .text_body(reply_text);

    if !from_address.is_empty() {
        builder = builder.from(from_address);
    }

    if let Some(orig) = original_message_id {
        builder = builder
            .header("In-Reply-To", Raw::new(orig))
            .header("References", Raw::new(orig));
    }

    let raw = builder
        .write_to_vec()
        .map_err(|e| PipelineError::Parse(format!("failed to build reply message: {e}")))?;

    Ok(URL_SAFE.encode(raw))
}
