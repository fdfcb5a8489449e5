//! Readable bodies out of MIME messages
//!
//! Decoding never fails. Every fetch error or undecodable part counts
//! as empty content and the next fallback is tried, down to the
//! [`EMPTY_BODY`] placeholder.

use crate::mailbox::MessageSource;
use crate::message::{Headers, Message, Part, Section, Structure, TransferEncoding};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

/// Shown when no section of a message yields any text.
pub const EMPTY_BODY: &str = "(Empty body)";

const NO_SUBJECT: &str = "No Subject";
const UNKNOWN_SENDER: &str = "Unknown";
const UNKNOWN_DATE: &str = "Unknown Date";

/// Undo a transfer encoding. Input that does not decode is returned
/// unchanged.
#[must_use]
pub fn decode(raw: &[u8], encoding: TransferEncoding) -> Vec<u8> {
    match encoding {
        TransferEncoding::PlainText | TransferEncoding::Unknown => raw.to_vec(),
        TransferEncoding::Base64 => {
            let cleaned: Vec<u8> = raw
                .iter()
                .filter(|b| !b.is_ascii_whitespace())
                .copied()
                .collect();
            STANDARD.decode(&cleaned).unwrap_or_else(|_| raw.to_vec())
        }
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(raw, quoted_printable::ParseMode::Robust)
                .unwrap_or_else(|_| raw.to_vec())
        }
    }
}

/// Decode `text` only if it is canonical base64: it must decode and
/// encode back to exactly the same characters.
#[must_use]
pub fn strict_base64(text: &str) -> Option<Vec<u8>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let decoded = STANDARD.decode(trimmed).ok()?;
    (STANDARD.encode(&decoded) == trimmed).then_some(decoded)
}

#[must_use]
pub fn html_to_text(html: &str) -> String {
    nanohtml2text::html2text(html)
}

fn render(raw: &[u8], part: &Part) -> String {
    let text = String::from_utf8_lossy(&decode(raw, part.encoding)).into_owned();
    if part.is_html() {
        html_to_text(&text)
    } else {
        text
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Extract a readable body for message `sequence`.
pub async fn body<S: MessageSource>(source: &mut S, sequence: u32, structure: &Structure) -> String {
    match structure {
        Structure::Multipart(parts) => {
            for (part, n) in parts.iter().zip(1u32..) {
                if !part.is_readable() {
                    continue;
                }
                let raw = source
                    .section(sequence, Section::Part(n))
                    .await
                    .unwrap_or_default();
                let text = render(&raw, part);
                if !is_blank(&text) {
                    return text;
                }
            }
        }
        Structure::Single(part) => {
            let raw = source
                .section(sequence, Section::Text)
                .await
                .unwrap_or_default();
            let text = render(&raw, part);
            if !is_blank(&text) {
                return text;
            }
        }
    }

    debug!("Falling back to raw sections for message {}", sequence);

    for n in [1, 2] {
        let raw = source
            .section(sequence, Section::Part(n))
            .await
            .unwrap_or_default();
        let raw = String::from_utf8_lossy(&raw).into_owned();
        if is_blank(&raw) {
            continue;
        }

        let bytes = strict_base64(&raw)
            .unwrap_or_else(|| decode(raw.as_bytes(), TransferEncoding::QuotedPrintable));
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if !is_blank(&text) {
            return text;
        }
    }

    EMPTY_BODY.to_string()
}

/// Build the displayed message from already-fetched headers.
pub async fn assemble<S: MessageSource>(source: &mut S, sequence: u32, headers: &Headers) -> Message {
    let structure = match source.structure(sequence).await {
        Ok(structure) => structure,
        Err(e) => {
            debug!("No structure for message {}: {}", sequence, e);
            Structure::unknown()
        }
    };

    Message {
        subject: headers
            .subject
            .clone()
            .unwrap_or_else(|| NO_SUBJECT.to_string()),
        from: headers
            .from
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        date: headers
            .date
            .clone()
            .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        body: body(source, sequence, &structure).await,
        sequence,
    }
}

/// Fetch headers and body of message `sequence`.
pub async fn read_message<S: MessageSource>(source: &mut S, sequence: u32) -> Message {
    let headers = source
        .header(sequence)
        .await
        .map(|raw| Headers::parse(&raw))
        .unwrap_or_default();
    assemble(source, sequence, &headers).await
}
