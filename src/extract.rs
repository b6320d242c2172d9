//! Payload extraction: MIME walking, markup stripping, and boilerplate
//! trimming.
//!
//! Converts a parsed mail message into a single plain-text payload. Text
//! parts are decoded per their declared transfer encoding, non-text parts
//! (attachments) are discarded, HTML-only messages fall back to a stripped
//! text rendering, and trailing signatures/quoted replies are cut off by an
//! ordered list of marker predicates.

use std::sync::OnceLock;

use mailparse::ParsedMail;
use regex::Regex;

/// A line predicate that, when matched, truncates the payload at that line.
#[derive(Debug, Clone)]
pub enum TrimMarker {
    /// Whole-line regex match.
    Pattern(Regex),
    /// Line starts with the given prefix.
    Prefix(String),
    /// Line equals the given text exactly (after trailing-whitespace trim).
    Exact(String),
}

impl TrimMarker {
    fn matches(&self, line: &str) -> bool {
        match self {
            TrimMarker::Pattern(re) => re.is_match(line),
            TrimMarker::Prefix(prefix) => line.starts_with(prefix.as_str()),
            TrimMarker::Exact(text) => line.trim_end() == text,
        }
    }
}

/// Ordered boilerplate markers applied to a payload.
///
/// The first matching line truncates the payload from that line onward, and
/// the scan restarts from the top of the shortened text. Each pass can only
/// shorten the payload, so the iteration reaches a fixed point.
#[derive(Debug, Clone)]
pub struct TrimRules {
    markers: Vec<TrimMarker>,
}

impl Default for TrimRules {
    fn default() -> Self {
        let markers = vec![
            TrimMarker::Pattern(Regex::new(r".*--.*Original Message.*--.*").unwrap()),
            TrimMarker::Pattern(Regex::new(r"^On .*wrote:").unwrap()),
            TrimMarker::Pattern(Regex::new(r".*--.*Forwarded Message.*--.*").unwrap()),
            TrimMarker::Prefix("--".to_string()),
            TrimMarker::Prefix("m!".to_string()),
            TrimMarker::Prefix("k;".to_string()),
            TrimMarker::Exact("ttul,".to_string()),
            TrimMarker::Exact("Cheers".to_string()),
        ];
        Self { markers }
    }
}

impl TrimRules {
    /// Extend the default marker set with personal sign-off lines.
    pub fn with_signoffs(mut self, signoffs: &[String]) -> Self {
        for signoff in signoffs {
            self.markers.push(TrimMarker::Exact(signoff.clone()));
        }
        self
    }

    fn first_match(&self, lines: &[&str]) -> Option<usize> {
        lines
            .iter()
            .position(|line| self.markers.iter().any(|m| m.matches(line)))
    }

    /// Truncate the payload at boilerplate markers until no marker matches.
    pub fn trim(&self, payload: &str) -> String {
        let mut lines: Vec<&str> = payload.lines().collect();
        while let Some(idx) = self.first_match(&lines) {
            lines.truncate(idx);
        }
        lines.join("\n")
    }
}

/// Map non-ASCII code points to `?` and drop NUL characters.
pub fn to_printable_ascii(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\0')
        .map(|c| if (c as u32) < 128 { c } else { '?' })
        .collect()
}

// Decode a leaf part's body, falling back to a lossy re-decode when the
// declared charset lies about the bytes.
fn decode_body(part: &ParsedMail) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(_) => part
            .get_body_raw()
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default(),
    }
}

fn collect_plain_parts(mail: &ParsedMail, out: &mut Vec<String>) {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.starts_with("text/plain") {
            out.push(decode_body(mail));
        }
        return;
    }
    for part in &mail.subparts {
        collect_plain_parts(part, out);
    }
}

fn find_html_part<'a>(mail: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.starts_with("text/html") {
            return Some(mail);
        }
        return None;
    }
    mail.subparts.iter().find_map(find_html_part)
}

/// Extract the cleaned plain-text payload of a message.
///
/// A message with no decodable text parts yields an empty payload rather
/// than an error; the caller decides whether to keep it.
pub fn extract_payload(mail: &ParsedMail, rules: &TrimRules) -> String {
    let mut parts = Vec::new();
    collect_plain_parts(mail, &mut parts);

    let text = if parts.is_empty() {
        // No plain-text leaves; fall back to the HTML alternative.
        match find_html_part(mail) {
            Some(html_part) => {
                let html = decode_body(html_part);
                html2text::from_read(html.as_bytes(), 80).unwrap_or(html)
            }
            None => String::new(),
        }
    } else {
        parts.join("\n")
    };

    rules.trim(&to_printable_ascii(&text))
}

// Header values are stored flattened; CR/LF would corrupt the one-line form.
fn line_clean_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\r\n]+").unwrap())
}

/// Serialize all header fields, in original order, as a JSON array of
/// `"Name: value"` strings.
pub fn headers_json(mail: &ParsedMail) -> String {
    let headers: Vec<String> = mail
        .headers
        .iter()
        .map(|h| {
            let flat = format!("{}: {}", h.get_key(), h.get_value());
            line_clean_re().replace_all(&flat, " ").into_owned()
        })
        .collect();
    serde_json::to_string(&headers).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::parse_mail;

    fn parse(raw: &str) -> mailparse::ParsedMail<'_> {
        parse_mail(raw.as_bytes()).expect("parse mail")
    }

    #[test]
    fn test_plain_text_payload() {
        let mail = parse(
            "From: a@example.com\r\n\
             To: b@example.com\r\n\
             Subject: test\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             Hi",
        );
        let payload = extract_payload(&mail, &TrimRules::default());
        assert_eq!(payload.trim(), "Hi");
    }

    #[test]
    fn test_signature_is_trimmed() {
        let mail = parse(
            "From: a@example.com\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             Hi\r\n\
             -- \r\n\
             Sent from my phone",
        );
        let payload = extract_payload(&mail, &TrimRules::default());
        assert_eq!(payload, "Hi");
    }

    #[test]
    fn test_quote_reply_header_is_trimmed() {
        let rules = TrimRules::default();
        let payload = "Sounds good.\nOn Mon, Jan 2 2023, J. Doe wrote:\n> earlier text";
        assert_eq!(rules.trim(payload), "Sounds good.");
    }

    #[test]
    fn test_original_message_separator_is_trimmed() {
        let rules = TrimRules::default();
        let payload = "Agreed.\n-----Original Message-----\nFrom: someone";
        assert_eq!(rules.trim(payload), "Agreed.");
    }

    #[test]
    fn test_trim_is_a_fixed_point() {
        let rules = TrimRules::default();
        let once = rules.trim("Hi\n--\nsig\nCheers\nmore");
        let twice = rules.trim(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "Hi");
    }

    #[test]
    fn test_custom_signoff_marker() {
        let rules = TrimRules::default().with_signoffs(&["Talk soon,".to_string()]);
        assert_eq!(rules.trim("Hi\nTalk soon,\nJ."), "Hi");
    }

    #[test]
    fn test_attachments_are_discarded() {
        let mail = parse(
            "From: a@example.com\r\n\
             Content-Type: multipart/mixed; boundary=\"b\"\r\n\
             \r\n\
             --b\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             body text\r\n\
             --b\r\n\
             Content-Type: application/octet-stream\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             AAAA\r\n\
             --b--\r\n",
        );
        let payload = extract_payload(&mail, &TrimRules::default());
        assert_eq!(payload.trim(), "body text");
    }

    #[test]
    fn test_html_fallback_strips_markup() {
        let mail = parse(
            "From: a@example.com\r\n\
             Content-Type: text/html\r\n\
             \r\n\
             <html><body><p>Hello <b>world</b></p></body></html>",
        );
        let payload = extract_payload(&mail, &TrimRules::default());
        assert!(payload.contains("Hello"));
        assert!(payload.contains("world"));
        assert!(!payload.contains('<'));
    }

    #[test]
    fn test_no_text_parts_yields_empty_payload() {
        let mail = parse(
            "From: a@example.com\r\n\
             Content-Type: application/pdf\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             AAAA",
        );
        let payload = extract_payload(&mail, &TrimRules::default());
        assert!(payload.is_empty());
    }

    #[test]
    fn test_non_ascii_becomes_placeholder() {
        assert_eq!(to_printable_ascii("caf\u{e9}"), "caf?");
        assert_eq!(to_printable_ascii("a\0b"), "ab");
    }

    #[test]
    fn test_headers_json_preserves_order() {
        let mail = parse(
            "From: a@example.com\r\n\
             To: b@example.com\r\n\
             Subject: hi\r\n\
             \r\n\
             body",
        );
        let json = headers_json(&mail);
        let headers: Vec<String> = serde_json::from_str(&json).expect("json");
        assert_eq!(headers[0], "From: a@example.com");
        assert_eq!(headers[1], "To: b@example.com");
        assert_eq!(headers[2], "Subject: hi");
    }
}
