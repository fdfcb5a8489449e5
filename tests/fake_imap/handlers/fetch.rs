//! FETCH command handler.
//!
//! Message data is transferred as **counted literals**:
//!
//! ```text
//! * <seq> FETCH (BODY[HEADER] {<length>}
//! <exactly length bytes>
//!  BODYSTRUCTURE (...))
//! ```
//!
//! The `{length}\r\n` marker tells the client that the next `length`
//! bytes are raw data, not protocol text. A section that does not
//! exist is sent as `NIL`.
//!
//! Supported data items: `BODY[]`, `BODY[HEADER]`, `BODY[TEXT]`,
//! `BODY[n]` (also in their `BODY.PEEK` forms) and `BODYSTRUCTURE`.

use crate::fake_imap::io::{write_bytes, write_line};
use crate::fake_imap::mailbox::Mailbox;
use crate::fake_imap::mime;
use imap_codec::imap_types::fetch::{
    MacroOrMessageDataItemNames, MessageDataItemName, Part, Section,
};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Extract sequence numbers from a `SequenceSet`. Only single values
/// are supported, since that's what the client sends for individual
/// fetches.
fn extract_seqs(seq_set: &SequenceSet) -> Vec<u32> {
    seq_set
        .0
        .as_ref()
        .iter()
        .filter_map(|seq| match seq {
            Sequence::Single(SeqOrUid::Value(v)) => Some(v.get()),
            _ => None,
        })
        .collect()
}

/// Append `name` followed by `data` as a literal, or `NIL`.
fn push_item(out: &mut Vec<u8>, name: &str, data: Option<&str>) {
    out.extend_from_slice(name.as_bytes());
    match data {
        Some(data) => {
            out.extend_from_slice(format!(" {{{}}}\r\n", data.len()).as_bytes());
            out.extend_from_slice(data.as_bytes());
        }
        None => out.extend_from_slice(b" NIL"),
    }
}

fn single_part(part: &Part) -> Option<u32> {
    match part.0.as_ref() {
        [n] => Some(n.get()),
        _ => None,
    }
}

/// Render one requested data item for message `raw`.
fn render_item(out: &mut Vec<u8>, raw: &str, item: &MessageDataItemName<'_>) {
    match item {
        MessageDataItemName::BodyStructure => {
            out.extend_from_slice(format!("BODYSTRUCTURE {}", mime::bodystructure(raw)).as_bytes());
        }
        MessageDataItemName::BodyExt { section, .. } => match section {
            None => push_item(out, "BODY[]", Some(raw)),
            Some(Section::Header(None)) => push_item(out, "BODY[HEADER]", Some(mime::split(raw).0)),
            Some(Section::Text(None)) => push_item(out, "BODY[TEXT]", Some(mime::split(raw).1)),
            Some(Section::Part(part)) => {
                let n = single_part(part).unwrap_or(0);
                let data = mime::section(raw, n);
                push_item(out, &format!("BODY[{n}]"), data.as_deref());
            }
            Some(_) => out.extend_from_slice(b"BODY[] NIL"),
        },
        _ => out.extend_from_slice(b"FLAGS ()"),
    }
}

/// Handle the FETCH command.
pub async fn handle_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    items: &MacroOrMessageDataItemNames<'_>,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let MacroOrMessageDataItemNames::MessageDataItemNames(items) = items else {
        let resp = format!("{tag} BAD Fetch macros not supported\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    for seq in extract_seqs(sequence_set) {
        let Some(raw) = folder.message(seq) else {
            continue;
        };
        let raw = String::from_utf8_lossy(raw);

        let mut out = format!("* {seq} FETCH (").into_bytes();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            render_item(&mut out, &raw, item);
        }
        out.extend_from_slice(b")\r\n");

        if write_bytes(stream, &out).await.is_err() {
            return;
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;
    use tokio::io::BufReader;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    fn seq_set(seq: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(
                NonZeroU32::new(seq).unwrap(),
            ))]
            .try_into()
            .unwrap(),
        )
    }

    fn body(section: Option<Section<'static>>) -> MacroOrMessageDataItemNames<'static> {
        MacroOrMessageDataItemNames::MessageDataItemNames(vec![MessageDataItemName::BodyExt {
            section,
            partial: None,
            peek: true,
        }])
    }

    fn part(n: u32) -> Section<'static> {
        Section::Part(Part(
            vec![NonZeroU32::new(n).unwrap()].try_into().unwrap(),
        ))
    }

    async fn run(
        tag: &str,
        sequence_set: &SequenceSet,
        items: &MacroOrMessageDataItemNames<'_>,
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(8192);
        let mut stream = BufReader::new(server);

        handle_fetch(tag, sequence_set, items, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn inbox() -> Mailbox {
        MailboxBuilder::new().folder("INBOX").email(RAW).build()
    }

    #[tokio::test]
    async fn fetches_header_as_literal() {
        let output = run("A1", &seq_set(1), &body(Some(Section::Header(None))), &inbox(), Some("INBOX")).await;

        let header = "From: a@b.com\r\nSubject: Test\r\n\r\n";
        assert!(output.starts_with(&format!("* 1 FETCH (BODY[HEADER] {{{}}}\r\n{header})", header.len())));
        assert!(output.contains("A1 OK FETCH completed"));
    }

    #[tokio::test]
    async fn fetches_text_and_part_one() {
        let output = run("A1", &seq_set(1), &body(Some(Section::Text(None))), &inbox(), Some("INBOX")).await;
        assert!(output.contains("BODY[TEXT] {4}\r\nBody)"));

        let output = run("A2", &seq_set(1), &body(Some(part(1))), &inbox(), Some("INBOX")).await;
        assert!(output.contains("BODY[1] {4}\r\nBody)"));
    }

    #[tokio::test]
    async fn missing_part_is_nil() {
        let output = run("A1", &seq_set(1), &body(Some(part(2))), &inbox(), Some("INBOX")).await;
        assert!(output.contains("* 1 FETCH (BODY[2] NIL)"));
    }

    #[tokio::test]
    async fn fetches_bodystructure() {
        let items =
            MacroOrMessageDataItemNames::MessageDataItemNames(vec![MessageDataItemName::BodyStructure]);
        let output = run("A1", &seq_set(1), &items, &inbox(), Some("INBOX")).await;
        assert!(output.contains("* 1 FETCH (BODYSTRUCTURE (\"TEXT\" \"PLAIN\""));
    }

    #[tokio::test]
    async fn missing_message_returns_only_ok() {
        let output = run("A1", &seq_set(9), &body(None), &inbox(), Some("INBOX")).await;

        assert!(!output.contains("FETCH ("));
        assert!(output.contains("A1 OK FETCH completed"));
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let output = run("A1", &seq_set(1), &body(None), &inbox(), None).await;

        assert!(output.contains("A1 BAD No folder selected"));
    }
}
