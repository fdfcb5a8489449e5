//! Message model: headers, MIME structure and the decoded view
//!
//! The mailbox hands back raw header bytes and a `BODYSTRUCTURE`; this
//! module turns both into small owned types so the locator and decoder
//! never touch protocol types directly.

use async_imap::imap_proto::types::{BodyStructure, ContentEncoding};
use mail_parser::MessageParser;
use serde::Serialize;
use std::fmt;

/// Content-Transfer-Encoding of a single MIME part, resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// `7bit`, `8bit` or `binary`: bytes are used as-is.
    PlainText,
    Base64,
    QuotedPrintable,
    /// Anything else; bytes are used as-is.
    #[default]
    Unknown,
}

impl TransferEncoding {
    /// Resolve an encoding name as found in a MIME header or a
    /// `BODYSTRUCTURE` (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "7bit" | "8bit" | "binary" => Self::PlainText,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Unknown,
        }
    }
}

impl From<&ContentEncoding<'_>> for TransferEncoding {
    fn from(encoding: &ContentEncoding<'_>) -> Self {
        match encoding {
            ContentEncoding::SevenBit | ContentEncoding::EightBit | ContentEncoding::Binary => {
                Self::PlainText
            }
            ContentEncoding::Base64 => Self::Base64,
            ContentEncoding::QuotedPrintable => Self::QuotedPrintable,
            ContentEncoding::Other(name) => Self::from_name(name),
        }
    }
}

/// One leaf of a message's MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Lowercase top-level media type (`text`, `image`, ...).
    pub media_type: String,
    /// Lowercase subtype (`plain`, `html`, ...).
    pub subtype: String,
    pub encoding: TransferEncoding,
}

impl Part {
    #[must_use]
    pub fn new(media_type: &str, subtype: &str, encoding: TransferEncoding) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            encoding,
        }
    }

    #[must_use]
    pub fn is_html(&self) -> bool {
        self.media_type == "text" && self.subtype == "html"
    }

    /// Plain text or HTML: the parts worth showing as a body.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.media_type == "text" && (self.subtype == "plain" || self.subtype == "html")
    }
}

/// The top level of a message's MIME structure.
///
/// Only the first level of a multipart is kept; nested multiparts show
/// up as a single non-readable part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    Single(Part),
    Multipart(Vec<Part>),
}

impl Structure {
    /// Structure assumed when the server could not describe the
    /// message: one part of unknown encoding.
    #[must_use]
    pub fn unknown() -> Self {
        Self::Single(Part::new("text", "plain", TransferEncoding::Unknown))
    }
}

impl From<&BodyStructure<'_>> for Structure {
    fn from(body: &BodyStructure<'_>) -> Self {
        match body {
            BodyStructure::Multipart { bodies, .. } => {
                Self::Multipart(bodies.iter().map(leaf).collect())
            }
            other => Self::Single(leaf(other)),
        }
    }
}

fn leaf(body: &BodyStructure<'_>) -> Part {
    match body {
        BodyStructure::Basic { common, other, .. }
        | BodyStructure::Text { common, other, .. }
        | BodyStructure::Message { common, other, .. } => Part::new(
            &common.ty.ty,
            &common.ty.subtype,
            TransferEncoding::from(&other.transfer_encoding),
        ),
        BodyStructure::Multipart { common, .. } => Part::new(
            &common.ty.ty,
            &common.ty.subtype,
            TransferEncoding::Unknown,
        ),
    }
}

/// A body section that can be fetched on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// The body without the header (`BODY[TEXT]`).
    Text,
    /// A 1-based top-level part (`BODY[n]`).
    Part(u32),
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("TEXT"),
            Self::Part(n) => write!(f, "{n}"),
        }
    }
}

/// The header fields this crate cares about, decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    /// Recipient addresses from `To`, as written.
    pub to: Vec<String>,
    /// First `From` address, or its display name when it has none.
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub message_id: Option<String>,
}

impl Headers {
    /// Parse a raw RFC 2822 header block. Malformed input yields empty
    /// fields rather than an error.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let Some(parsed) = MessageParser::default().parse(raw) else {
            return Self::default();
        };

        let to = parsed
            .to()
            .map(|list| {
                list.iter()
                    .filter_map(|addr| addr.address())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let from = parsed.from().and_then(|list| list.first()).and_then(|addr| {
            addr.address()
                .or_else(|| addr.name())
                .map(ToString::to_string)
        });

        Self {
            to,
            from,
            subject: parsed.subject().map(ToString::to_string),
            date: parsed.date().map(mail_parser::DateTime::to_rfc822),
            message_id: parsed.message_id().map(ToString::to_string),
        }
    }
}

/// A message as shown in an inbox. Rebuilt from the mailbox on every
/// view; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub subject: String,
    pub from: String,
    pub date: String,
    pub body: String,
    /// Mailbox sequence number at the time of the view.
    pub sequence: u32,
}
