//! Two-pass relevance filtering over an mbox archive.
//!
//! A message's relevance to the subject cannot always be decided on first
//! sight: mail *from* the subject is always relevant, but mail from an
//! unknown address only becomes relevant in retrospect, once the subject is
//! confirmed to correspond with that address.
//!
//! Pass 1 sweeps the archive once: it triages each message, writes every
//! retained message to `raw_msgs`, writes subject-sent mail to `msgs`, and
//! accumulates the addresses the subject wrote to in a [`RecipientTally`].
//! Pass 2 consumes the tally read-only and promotes the mail those
//! correspondents sent back into `msgs`. Pass 2 only ever adds rows, and
//! every insert is idempotent, so re-running an ingestion is safe.

use std::collections::HashMap;
use std::path::Path;

use mailparse::{parse_mail, MailHeaderMap, ParsedMail};

use crate::address::{normalize_header, Role};
use crate::config::SubjectConfig;
use crate::db::messages::MessageTable;
use crate::db::{ArchiveDb, DbMessage};
use crate::error::IngestError;
use crate::extract::{extract_payload, headers_json, TrimRules};
use crate::mbox::{parse_envelope_date, MboxMessage, MboxReader};

/// Subject lines of automated dumps that carry no personal signal.
const NOISE_SUBJECT: &str = "SQL dump -";

/// Receiver addresses the subject is confirmed to have written to, with the
/// best display name seen for each. Built during pass 1, consumed read-only
/// by pass 2, rebuilt from scratch every run.
#[derive(Debug, Default)]
pub struct RecipientTally {
    entries: HashMap<String, String>,
}

impl RecipientTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a recipient, preferring the longer non-empty name on conflict.
    pub fn add(&mut self, email: &str, name: &str) {
        match self.entries.get_mut(email) {
            None => {
                self.entries.insert(email.to_string(), name.to_string());
            }
            Some(existing) => {
                if existing.is_empty() || name.len() > existing.len() {
                    *existing = name.to_string();
                }
            }
        }
    }

    pub fn get(&self, email: &str) -> Option<&str> {
        self.entries.get(email).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    /// Messages seen in the archive.
    pub processed: usize,
    /// Messages excluded by label/noise/header/junk triage.
    pub skipped: usize,
    /// New rows written to `raw_msgs`.
    pub raw_inserted: usize,
    /// New rows written to `msgs` during pass 1.
    pub subject_inserted: usize,
    /// Rows promoted into `msgs` during pass 2.
    pub promoted: usize,
}

/// Drives both passes over one archive against one store.
pub struct Ingestor<'a> {
    db: &'a ArchiveDb,
    config: &'a SubjectConfig,
    rules: TrimRules,
}

impl<'a> Ingestor<'a> {
    pub fn new(db: &'a ArchiveDb, config: &'a SubjectConfig) -> Self {
        let rules = TrimRules::default().with_signoffs(&config.signoff_markers);
        Self { db, config, rules }
    }

    /// Ingest an mbox archive: pass 1 over every message, then pass 2 over
    /// the accumulated recipient tally.
    pub fn run(&self, mbox_path: &Path) -> Result<IngestStats, IngestError> {
        let reader = MboxReader::open(mbox_path)?;
        let mut tally = RecipientTally::new();
        let mut stats = IngestStats::default();

        for message in reader {
            let message = message?;
            stats.processed += 1;
            if !self.pass_one(&message, &mut tally, &mut stats)? {
                stats.skipped += 1;
            }
        }

        log::info!(
            "pass 1 complete: {} processed, {} skipped, {} raw, {} subject-authored",
            stats.processed,
            stats.skipped,
            stats.raw_inserted,
            stats.subject_inserted
        );

        self.pass_two(&tally, &mut stats)?;

        log::info!(
            "pass 2 complete: {} messages promoted from {} correspondents",
            stats.promoted,
            tally.len()
        );

        Ok(stats)
    }

    /// Triage and store one message. Returns whether it was retained.
    fn pass_one(
        &self,
        message: &MboxMessage,
        tally: &mut RecipientTally,
        stats: &mut IngestStats,
    ) -> Result<bool, IngestError> {
        let Ok(mail) = parse_mail(&message.raw) else {
            log::warn!("unparseable message, skipping: {}", message.from_line);
            return Ok(false);
        };

        if let Some(reason) = skip_reason(&mail) {
            log::debug!("skipping ({reason}): {}", message.from_line);
            return Ok(false);
        }

        // skip_reason guarantees both headers are present and non-empty.
        let from_raw = mail.headers.get_first_value("From").unwrap_or_default();
        let to_raw = mail.headers.get_first_value("To").unwrap_or_default();

        let senders = normalize_header(&from_raw, Role::Sender);
        let receivers = normalize_header(&to_raw, Role::Receiver);
        let sender = &senders[0];
        let receiver = &receivers[0];

        // Mail blasted to many recipients, or with a junk receiver, says
        // little about the subject — unless the subject wrote it.
        if (receivers.len() > 1 || receiver.is_junk())
            && !self.config.is_known_address(&sender.email)
        {
            log::debug!("skipping (multi-recipient noise): {}", message.from_line);
            return Ok(false);
        }

        // Symmetrically for a junk sender, unless addressed to the subject.
        if sender.is_junk() && !self.config.is_known_address(&receiver.email) {
            log::debug!("skipping (junk sender): {}", message.from_line);
            return Ok(false);
        }

        // Fatal on failure: the timestamp orders the corpus.
        let msg_date = parse_envelope_date(&message.from_line)?;

        let record = DbMessage {
            from_line: message.from_line.clone(),
            msg_date: msg_date.to_rfc3339(),
            sender: sender.email.clone(),
            receiver: receiver.email.clone(),
            subject: mail.headers.get_first_value("Subject"),
            headers: headers_json(&mail),
            payload: extract_payload(&mail, &self.rules),
        };

        // Every retained message lands in raw_msgs for pass 2.
        if self.db.insert_message(MessageTable::Raw, &record)? {
            stats.raw_inserted += 1;
        }

        if self.config.is_known_address(&sender.email) {
            if self.config.is_subject_address(&sender.email)
                && self.db.insert_message(MessageTable::Subject, &record)?
            {
                stats.subject_inserted += 1;
            }
            // The subject wrote to this address: remember it for pass 2 and
            // grow the address book on both sides.
            tally.add(&receiver.email, &receiver.name);
            self.db.add_address(&sender.email, &sender.name)?;
            self.db.add_address(&receiver.email, &receiver.name)?;
        }

        Ok(true)
    }

    /// Promote mail from confirmed correspondents into the subject corpus.
    fn pass_two(
        &self,
        tally: &RecipientTally,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        for (email, _name) in tally.iter() {
            log::info!("checking messages from {email}");
            for msg in self.db.messages_from_sender(email)? {
                if self.db.insert_message(MessageTable::Subject, &msg)? {
                    stats.promoted += 1;
                }
            }
        }
        Ok(())
    }
}

// Triage rules that exclude a message before any parsing effort is spent:
// archive labels, automated noise subjects, and missing to/from headers.
fn skip_reason(mail: &ParsedMail) -> Option<&'static str> {
    if let Some(labels) = mail.headers.get_first_value("X-Gmail-Labels") {
        if labels.contains("Chat") || labels.contains("Spam") {
            return Some("archive label");
        }
    }
    if let Some(subject) = mail.headers.get_first_value("Subject") {
        if subject.contains(NOISE_SUBJECT) {
            return Some("noise subject");
        }
    }
    if mail
        .headers
        .get_first_value("From")
        .map_or(true, |v| v.trim().is_empty())
    {
        return Some("missing from header");
    }
    if mail
        .headers
        .get_first_value("To")
        .map_or(true, |v| v.trim().is_empty())
    {
        return Some("missing to header");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use std::collections::HashMap as Map;
    use std::io::Write;

    fn subject_config() -> SubjectConfig {
        let mut addresses = Map::new();
        addresses.insert("me@example.com".to_string(), "Subject Person".to_string());
        SubjectConfig {
            subject_name: "Subject Person".to_string(),
            addresses,
            signoff_markers: vec![],
        }
    }

    fn write_mbox(content: &str) -> std::path::PathBuf {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("archive.mbox");
        std::mem::forget(dir);
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(content.as_bytes()).expect("write");
        path
    }

    // One message from the subject to J. Doe, one reply back, one message
    // from a stranger, and one spam-labelled message.
    const ARCHIVE: &str = "\
From me@example.com Mon May 09 10:06:02 +0000 2022
From: \"Subject Person\" <me@example.com>
To: \"J. Doe\" <jd@example.com>
Subject: plans

Want to meet up?
From jd@example.com Sat Dec  6 13:41:10 2003
From: \"J. Doe\" <jd@example.com>
To: \"Subject Person\" <me@example.com>
Subject: hello

Hi
--
Sent from my phone
From stranger@example.net Sat Dec  6 14:00:00 2003
From: Stranger <stranger@example.net>
To: someone@example.org
Subject: unrelated

Nothing to see
From spammer@example.net Sat Dec  6 15:00:00 2003
From: Spammer <spammer@example.net>
To: me@example.com
Subject: buy now
X-Gmail-Labels: Spam,Inbox

Cheap offers
";

    #[test]
    fn test_tally_prefers_longer_name() {
        let mut tally = RecipientTally::new();
        tally.add("jd@example.com", "JD");
        tally.add("jd@example.com", "J");
        assert_eq!(tally.get("jd@example.com"), Some("JD"));
        tally.add("jd@example.com", "Jane Doe");
        assert_eq!(tally.get("jd@example.com"), Some("Jane Doe"));
    }

    #[test]
    fn test_tally_fills_empty_name() {
        let mut tally = RecipientTally::new();
        tally.add("jd@example.com", "");
        tally.add("jd@example.com", "J");
        assert_eq!(tally.get("jd@example.com"), Some("J"));
    }

    #[test]
    fn test_two_pass_promotion() {
        let db = test_db();
        let config = subject_config();
        let path = write_mbox(ARCHIVE);

        let stats = Ingestor::new(&db, &config).run(&path).expect("run");

        assert_eq!(stats.processed, 4);
        // The spam message is skipped entirely.
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.raw_inserted, 3);
        // Pass 1 only catches the subject-sent message.
        assert_eq!(stats.subject_inserted, 1);
        // Pass 2 promotes J. Doe's reply, since the subject wrote to them.
        assert_eq!(stats.promoted, 1);

        assert_eq!(db.message_count(MessageTable::Raw).expect("count"), 3);
        assert_eq!(db.message_count(MessageTable::Subject).expect("count"), 2);

        // The stranger's message stays out of the subject corpus.
        let senders: Vec<String> = {
            let mut stmt = db
                .conn_ref()
                .prepare("SELECT sender FROM msgs ORDER BY id")
                .expect("prepare");
            stmt.query_map([], |row| row.get(0))
                .expect("query")
                .collect::<Result<_, _>>()
                .expect("rows")
        };
        assert!(senders.contains(&"me@example.com".to_string()));
        assert!(senders.contains(&"jd@example.com".to_string()));
        assert!(!senders.contains(&"stranger@example.net".to_string()));
    }

    #[test]
    fn test_reingestion_is_idempotent() {
        let db = test_db();
        let config = subject_config();
        let path = write_mbox(ARCHIVE);

        let ingestor = Ingestor::new(&db, &config);
        ingestor.run(&path).expect("first run");
        let raw_before = db.message_count(MessageTable::Raw).expect("count");
        let subject_before = db.message_count(MessageTable::Subject).expect("count");

        let stats = ingestor.run(&path).expect("second run");
        assert_eq!(stats.raw_inserted, 0);
        assert_eq!(stats.subject_inserted, 0);
        assert_eq!(stats.promoted, 0);
        assert_eq!(db.message_count(MessageTable::Raw).expect("count"), raw_before);
        assert_eq!(
            db.message_count(MessageTable::Subject).expect("count"),
            subject_before
        );
    }

    #[test]
    fn test_pass_two_is_monotone() {
        let db = test_db();
        let config = subject_config();
        let path = write_mbox(ARCHIVE);

        // Run pass 1 only by replaying triage without the promotion step.
        let ingestor = Ingestor::new(&db, &config);
        let mut tally = RecipientTally::new();
        let mut stats = IngestStats::default();
        for message in MboxReader::open(&path).expect("open") {
            let message = message.expect("read");
            stats.processed += 1;
            ingestor
                .pass_one(&message, &mut tally, &mut stats)
                .expect("pass 1");
        }
        let after_pass_one = db.message_count(MessageTable::Subject).expect("count");

        ingestor.pass_two(&tally, &mut stats).expect("pass 2");
        let after_pass_two = db.message_count(MessageTable::Subject).expect("count");

        assert!(after_pass_two >= after_pass_one);
    }

    #[test]
    fn test_multi_recipient_from_stranger_is_dropped() {
        let db = test_db();
        let config = subject_config();
        let archive = "\
From list@example.net Sat Dec  6 13:41:10 2003
From: List <list@example.net>
To: me@example.com, other@example.org
Subject: newsletter

Bulk content
";
        let path = write_mbox(archive);
        let stats = Ingestor::new(&db, &config).run(&path).expect("run");

        assert_eq!(stats.skipped, 1);
        assert_eq!(db.message_count(MessageTable::Raw).expect("count"), 0);
        assert_eq!(db.message_count(MessageTable::Subject).expect("count"), 0);
    }

    #[test]
    fn test_multi_recipient_from_subject_is_kept() {
        let db = test_db();
        let config = subject_config();
        let archive = "\
From me@example.com Sat Dec  6 13:41:10 2003
From: me@example.com
To: bob@example.com, carol@example.com
Subject: group plans

Dinner on Friday?
";
        let path = write_mbox(archive);
        let stats = Ingestor::new(&db, &config).run(&path).expect("run");

        assert_eq!(stats.skipped, 0);
        assert_eq!(db.message_count(MessageTable::Raw).expect("count"), 1);
        assert_eq!(db.message_count(MessageTable::Subject).expect("count"), 1);
    }

    #[test]
    fn test_missing_headers_are_skipped() {
        let db = test_db();
        let config = subject_config();
        let archive = "\
From nobody Sat Dec  6 13:41:10 2003
From: someone@example.com
Subject: no recipient

Body
";
        let path = write_mbox(archive);
        let stats = Ingestor::new(&db, &config).run(&path).expect("run");

        assert_eq!(stats.skipped, 1);
        assert_eq!(db.message_count(MessageTable::Raw).expect("count"), 0);
    }

    #[test]
    fn test_bad_envelope_date_aborts_run() {
        let db = test_db();
        let config = subject_config();
        let archive = "\
From me@example.com not a date
From: me@example.com
To: jd@example.com
Subject: broken envelope

Body
";
        let path = write_mbox(archive);
        let err = Ingestor::new(&db, &config).run(&path).unwrap_err();
        assert!(matches!(err, IngestError::EnvelopeDate(_)));
    }

    #[test]
    fn test_address_book_grows_from_subject_mail() {
        let db = test_db();
        let config = subject_config();
        let path = write_mbox(ARCHIVE);

        Ingestor::new(&db, &config).run(&path).expect("run");

        let entries = db.all_addresses().expect("all");
        let emails: Vec<&str> = entries.iter().map(|e| e.email_addr.as_str()).collect();
        assert!(emails.contains(&"me@example.com"));
        assert!(emails.contains(&"jd@example.com"));
        // The stranger never corresponded with the subject.
        assert!(!emails.contains(&"stranger@example.net"));
    }

    #[test]
    fn test_signature_trimmed_before_storage() {
        let db = test_db();
        let config = subject_config();
        let path = write_mbox(ARCHIVE);

        Ingestor::new(&db, &config).run(&path).expect("run");

        let payload: String = db
            .conn_ref()
            .query_row(
                "SELECT payload FROM raw_msgs WHERE sender = 'jd@example.com'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(payload.trim(), "Hi");
        assert!(!payload.contains("Sent from my phone"));
    }
}
