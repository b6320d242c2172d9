//! Address normalization: raw header values into canonical
//! (display name, email) pairs.
//!
//! Email address data is dirty. Headers carry nested quotes, doubly-wrapped
//! brackets, group syntax with no members, and placeholder recipients like
//! "undisclosed recipients". Rather than failing the pipeline, anything that
//! cannot be resolved degrades to a fixed junk sentinel so downstream code
//! never sees an empty address.

use std::str::FromStr;

use email_address::EmailAddress;
use mailparse::{addrparse, MailAddr, SingleInfo};
use unicode_normalization::UnicodeNormalization;

/// Header tokens marking placeholder recipients with no usable address.
const JUNK_TOKENS: &[&str] = &["undisclosed", "suppressed", "[*to]"];

/// Which side of the message a header belongs to. Junk sentinels differ
/// per side so audits can tell a broken sender from a broken receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    /// The fixed placeholder identity for malformed data on this side.
    pub fn junk_sentinel(self) -> Address {
        match self {
            Role::Sender => Address {
                name: "Junk Sender".to_string(),
                email: "broked_sender@example.com".to_string(),
            },
            Role::Receiver => Address {
                name: "Junk Receiver".to_string(),
                email: "broked_receiver@example.com".to_string(),
            },
        }
    }
}

/// A cleaned (display name, email) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: String,
    pub email: String,
}

impl Address {
    /// Whether this is one of the junk sentinels.
    pub fn is_junk(&self) -> bool {
        self.name.contains("Junk")
    }

    /// Canonical `Name <email>` presentation.
    pub fn pretty(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

// NFKD-normalize, strip quote characters, drop non-ASCII, trim.
fn clean_display_name(name: &str) -> String {
    name.nfkd()
        .filter(|c| *c != '"' && *c != '\'')
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

// NFKD-normalize, drop non-ASCII, trim, lowercase.
fn clean_email(email: &str) -> String {
    email
        .nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_lowercase()
}

fn clean_pair(info: &SingleInfo) -> Option<Address> {
    let name = info
        .display_name
        .as_deref()
        .map(clean_display_name)
        .unwrap_or_default();
    let email = clean_email(&info.addr);
    if email.is_empty() {
        return None;
    }
    Some(Address { name, email })
}

// Flatten address groups into their member addresses; an empty group
// ("Undisclosed recipients":;) contributes nothing.
fn flatten(addrs: &[MailAddr]) -> Vec<SingleInfo> {
    let mut singles = Vec::new();
    for addr in addrs {
        match addr {
            MailAddr::Single(single) => singles.push(single.clone()),
            MailAddr::Group(group) => singles.extend(group.addrs.iter().cloned()),
        }
    }
    singles
}

/// Normalize a raw `From`/`To` header value into cleaned address pairs.
///
/// Always returns at least one entry: irrecoverable values collapse to the
/// role's junk sentinel. Callers typically use only the first entry; the full
/// list is preserved so multi-recipient messages can be detected.
pub fn normalize_header(raw: &str, role: Role) -> Vec<Address> {
    let parsed = addrparse(raw)
        .map(|list| flatten(&list))
        .unwrap_or_default();
    let mut cleaned: Vec<Address> = parsed.iter().filter_map(clean_pair).collect();

    // Single-entry (or empty) lists are where placeholder recipients and
    // doubly-wrapped headers hide; multi-entry lists pass through.
    if cleaned.len() <= 1 {
        let raw_lower = raw.to_lowercase();
        let junky = match cleaned.first() {
            None => true,
            Some(first) => {
                JUNK_TOKENS.iter().any(|t| raw_lower.contains(t))
                    || JUNK_TOKENS.iter().any(|t| first.email.contains(t))
                    || first.email.matches('<').count() > 1
            }
        };
        if junky {
            return vec![role.junk_sentinel()];
        }
    }

    // The sender side additionally gets RFC syntax validation (no
    // deliverability checks) on its first candidate.
    if role == Role::Sender {
        if let Some(first) = cleaned.first() {
            if EmailAddress::from_str(&first.email).is_err() {
                log::debug!("invalid sender address {:?}, using sentinel", first.email);
                return vec![role.junk_sentinel()];
            }
        }
    }

    cleaned
}
