//! Just enough MIME for the fake server to answer section fetches.
//!
//! IMAP servers parse each message once and serve its pieces on demand:
//!
//! - `BODY[HEADER]` -- the header block, including the blank line
//! - `BODY[TEXT]` -- everything after the header
//! - `BODY[n]` -- the body of top-level part `n` of a multipart
//!   message; for a single-part message only `BODY[1]` exists and is
//!   the whole body
//! - `BODYSTRUCTURE` -- a parenthesized description of the parts
//!
//! Only one level of multipart is understood. Test messages are ASCII.

/// Split a message into header (with the terminating blank line) and
/// body.
pub fn split(raw: &str) -> (&str, &str) {
    if let Some(pos) = raw.find("\r\n\r\n") {
        return raw.split_at(pos + 4);
    }
    if let Some(pos) = raw.find("\n\n") {
        return raw.split_at(pos + 2);
    }
    (raw, "")
}

/// Value of header field `name`, with folded lines joined.
pub fn header_value(header: &str, name: &str) -> Option<String> {
    let mut value: Option<String> = None;
    for line in header.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(v) = value.as_mut() {
                v.push(' ');
                v.push_str(line.trim());
            }
            continue;
        }
        if value.is_some() {
            break;
        }
        if let Some((field, rest)) = line.split_once(':') {
            if field.trim().eq_ignore_ascii_case(name) {
                value = Some(rest.trim().to_string());
            }
        }
    }
    value
}

/// Bare, lowercased addresses listed in `To`.
pub fn recipients(raw: &str) -> Vec<String> {
    let (header, _) = split(raw);
    header_value(header, "To")
        .map(|to| {
            to.split(',')
                .map(|entry| {
                    let entry = entry.trim();
                    let addr = match (entry.find('<'), entry.rfind('>')) {
                        (Some(start), Some(end)) if start < end => &entry[start + 1..end],
                        _ => entry,
                    };
                    addr.trim().to_lowercase()
                })
                .filter(|addr| !addr.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

struct ContentType {
    ty: String,
    subtype: String,
    boundary: Option<String>,
}

fn content_type(header: &str) -> ContentType {
    let value = header_value(header, "Content-Type").unwrap_or_else(|| "text/plain".into());
    let mut params = value.split(';');
    let (ty, subtype) = params
        .next()
        .and_then(|mime| mime.trim().split_once('/'))
        .map_or(("text".to_string(), "plain".to_string()), |(t, s)| {
            (t.trim().to_string(), s.trim().to_string())
        });

    let boundary = params.find_map(|param| {
        let (key, val) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| val.trim().trim_matches('"').to_string())
    });

    ContentType {
        ty,
        subtype,
        boundary,
    }
}

fn transfer_encoding(header: &str) -> String {
    header_value(header, "Content-Transfer-Encoding")
        .unwrap_or_else(|| "7bit".into())
        .to_uppercase()
}

/// Raw top-level parts (each with its own header), or `None` if the
/// message is not multipart.
fn parts(raw: &str) -> Option<Vec<&str>> {
    let (header, body) = split(raw);
    let ct = content_type(header);
    if !ct.ty.eq_ignore_ascii_case("multipart") {
        return None;
    }
    let delimiter = format!("--{}", ct.boundary?);

    let mut parts = Vec::new();
    for chunk in body.split(delimiter.as_str()).skip(1) {
        if chunk.starts_with("--") {
            break;
        }
        let chunk = chunk.strip_prefix("\r\n").unwrap_or(chunk);
        parts.push(chunk.strip_suffix("\r\n").unwrap_or(chunk));
    }
    Some(parts)
}

/// Contents of `BODY[n]`, if that part exists.
pub fn section(raw: &str, n: u32) -> Option<String> {
    let idx = usize::try_from(n).ok()?.checked_sub(1)?;
    match parts(raw) {
        Some(parts) => parts.get(idx).map(|part| split(part).1.to_string()),
        None if idx == 0 => Some(split(raw).1.to_string()),
        None => None,
    }
}

fn leaf_structure(part: &str) -> String {
    let (header, body) = split(part);
    let ct = content_type(header);
    let encoding = transfer_encoding(header);
    let ty = ct.ty.to_uppercase();
    let subtype = ct.subtype.to_uppercase();
    let octets = body.len();

    if ty == "TEXT" {
        let lines = body.lines().count();
        format!(
            "(\"{ty}\" \"{subtype}\" (\"CHARSET\" \"UTF-8\") NIL NIL \"{encoding}\" {octets} {lines})"
        )
    } else {
        format!("(\"{ty}\" \"{subtype}\" NIL NIL NIL \"{encoding}\" {octets})")
    }
}

/// The `BODYSTRUCTURE` of a message.
pub fn bodystructure(raw: &str) -> String {
    match parts(raw) {
        Some(parts) if !parts.is_empty() => {
            let (header, _) = split(raw);
            let subtype = content_type(header).subtype.to_uppercase();
            let inner: String = parts.iter().map(|p| leaf_structure(p)).collect();
            format!("({inner} \"{subtype}\")")
        }
        _ => leaf_structure(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "To: Someone <A@d.test>, b@d.test\r\n\
        Content-Type: multipart/alternative;\r\n boundary=\"XYZ\"\r\n\
        \r\n\
        --XYZ\r\n\
        Content-Type: text/plain\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        aGVsbG8=\r\n\
        --XYZ\r\n\
        Content-Type: text/html\r\n\
        \r\n\
        <p>hi</p>\r\n\
        --XYZ--\r\n";

    #[test]
    fn recipients_are_bare_and_lowercase() {
        assert_eq!(recipients(MULTIPART), vec!["a@d.test", "b@d.test"]);
    }

    #[test]
    fn folded_boundary_is_found() {
        assert_eq!(section(MULTIPART, 1).as_deref(), Some("aGVsbG8="));
        assert_eq!(section(MULTIPART, 2).as_deref(), Some("<p>hi</p>"));
        assert!(section(MULTIPART, 3).is_none());
    }

    #[test]
    fn multipart_structure() {
        let bs = bodystructure(MULTIPART);
        assert!(bs.starts_with("((\"TEXT\" \"PLAIN\""));
        assert!(bs.contains("\"BASE64\" 8 1)(\"TEXT\" \"HTML\""));
        assert!(bs.ends_with(" \"ALTERNATIVE\")"));
    }

    #[test]
    fn single_part_has_only_section_one() {
        let raw = "To: a@d.test\r\n\r\nbody text";
        assert_eq!(section(raw, 1).as_deref(), Some("body text"));
        assert!(section(raw, 2).is_none());
        assert_eq!(
            bodystructure(raw),
            "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" 9 1)"
        );
    }
}
