//! Reply framing.
//!
//! A reply is complete once it carries a terminal marker:
//! - `#OK` as the last token of the buffer (trailing whitespace ignored)
//! - `#NG` followed by its message and a newline
//!
//! Markers are case-sensitive and must end at a token boundary, so `#OKAY`
//! or `#NGX` never terminate a reply.

use crate::error::{NevError, NevResult};

/// Success marker.
pub const OK_MARKER: &str = "#OK";
/// Error marker.
pub const NG_MARKER: &str = "#NG";

/// Decoded reply: optional echo header plus body, marker stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// First line when it starts with `#` (e.g. `#PSADATA 0 5`)
    pub header: Option<String>,
    /// Everything between the header and the marker, trimmed
    pub body: String,
}

impl Reply {
    /// Header tokens after `tag`, failing when the header is missing or different.
    pub fn expect_header(&self, tag: &str) -> NevResult<Vec<&str>> {
        let header = self
            .header
            .as_deref()
            .ok_or_else(|| NevError::parse(format!("'{tag}' header"), &self.body))?;
        let mut tokens = header.split_whitespace();
        match tokens.next() {
            Some(first) if first == tag => Ok(tokens.collect()),
            _ => Err(NevError::parse(format!("'{tag}' header"), header)),
        }
    }

    /// Non-empty body lines, trimmed.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.body.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

fn is_boundary(byte: Option<&u8>) -> bool {
    byte.map_or(true, |b| b.is_ascii_whitespace())
}

/// First `#NG` that ends at a token boundary.
fn find_ng(buf: &[u8]) -> Option<usize> {
    let marker = NG_MARKER.as_bytes();
    buf.windows(marker.len())
        .enumerate()
        .find(|(pos, window)| *window == marker && is_boundary(buf.get(pos + marker.len())))
        .map(|(pos, _)| pos)
}

fn ends_with_ok(buf: &[u8]) -> bool {
    let end = buf
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    buf[..end].ends_with(OK_MARKER.as_bytes())
}

/// Length of the complete reply at the front of `buf`, if one is there yet.
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find_ng(buf) {
        let after = pos + NG_MARKER.len();
        if let Some(nl) = buf[after..].iter().position(|b| *b == b'\n') {
            return Some(after + nl + 1);
        }
        return ends_with_ok(buf).then_some(buf.len());
    }
    ends_with_ok(buf).then_some(buf.len())
}

/// Split a complete raw reply into header and body.
///
/// `#NG` replies become [`NevError::Protocol`] carrying the server's message.
pub fn parse_reply(raw: &str) -> NevResult<Reply> {
    if let Some(pos) = find_ng(raw.as_bytes()) {
        let tail = &raw[pos + NG_MARKER.len()..];
        let message = tail.lines().next().unwrap_or("").trim();
        let message = message.strip_suffix(OK_MARKER).unwrap_or(message).trim();
        let message = if message.is_empty() {
            "unspecified server error".to_string()
        } else {
            message.to_string()
        };
        return Err(NevError::Protocol(message));
    }

    let text = raw
        .trim_end()
        .strip_suffix(OK_MARKER)
        .ok_or_else(|| NevError::parse("reply terminated by #OK", raw))?
        .trim();

    if text.starts_with('#') {
        let (header, body) = text.split_once('\n').unwrap_or((text, ""));
        Ok(Reply {
            header: Some(header.trim().to_string()),
            body: body.trim().to_string(),
        })
    } else {
        Ok(Reply {
            header: None,
            body: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_terminates_only_at_end() {
        assert_eq!(frame_len(b"#NSUNUM\n1\n#OK"), Some(13));
        assert_eq!(frame_len(b"#NSUNUM\n1\n#OK\n"), Some(14));
        assert_eq!(frame_len(b"#NSUNUM\n1\n#O"), None);
        assert_eq!(frame_len(b"#OKAY"), None);
        assert_eq!(frame_len(b"#PSASTAT\n 3 1.5 RUNNING#OK"), Some(26));
    }

    #[test]
    fn ng_waits_for_its_message_line() {
        assert_eq!(frame_len(b"#NG syntax"), None);
        assert_eq!(frame_len(b"#NG syntax error\n"), Some(17));
        assert_eq!(frame_len(b"#NGX\n"), None);
    }

    #[test]
    fn header_and_body_are_split() {
        let reply = parse_reply("#NSUDEVS 0\n2 [0 1]\n#OK\n").unwrap();
        assert_eq!(reply.header.as_deref(), Some("#NSUDEVS 0"));
        assert_eq!(reply.body, "2 [0 1]");
        assert_eq!(reply.expect_header("#NSUDEVS").unwrap(), vec!["0"]);
        assert!(reply.expect_header("#NSUCHAN").is_err());
    }

    #[test]
    fn bare_ok_has_empty_body() {
        let reply = parse_reply("#OK").unwrap();
        assert_eq!(reply.header, None);
        assert!(reply.body.is_empty());

        let reply = parse_reply("#SETDAO 3 #OK").unwrap();
        assert_eq!(reply.header.as_deref(), Some("#SETDAO 3"));
    }

    #[test]
    fn ng_message_is_verbatim() {
        match parse_reply("#NG syntax error: SET NSU DLEN\n") {
            Err(NevError::Protocol(msg)) => assert_eq!(msg, "syntax error: SET NSU DLEN"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_marker_is_parse_error() {
        assert!(matches!(parse_reply("#NSUNUM\n1\n"), Err(NevError::Parse { .. })));
    }
}
