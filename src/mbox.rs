//! Streaming reader for mbox-format archive files.
//!
//! An mbox file is a concatenation of RFC-2822 messages, each introduced by
//! an envelope line of the form `From sender date`. The envelope line is the
//! natural unique key of a message and is preserved verbatim; everything up
//! to the next envelope line (or EOF) is the raw message.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::IngestError;

/// One raw message sliced out of an mbox file.
#[derive(Debug, Clone)]
pub struct MboxMessage {
    /// The `From ` separator line, verbatim, without the trailing newline.
    pub from_line: String,
    /// Raw message bytes (headers + body), excluding the envelope line.
    pub raw: Vec<u8>,
}

/// Iterator over the messages of an mbox stream.
pub struct MboxReader<R> {
    inner: R,
    pending_from: Option<String>,
    current: Vec<u8>,
    done: bool,
}

impl MboxReader<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> MboxReader<BufReader<R>> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead> MboxReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending_from: None,
            current: Vec::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = io::Result<MboxMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.inner.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    self.done = true;
                    return self.pending_from.take().map(|from_line| {
                        Ok(MboxMessage {
                            from_line,
                            raw: std::mem::take(&mut self.current),
                        })
                    });
                }
                Ok(_) => {
                    if buf.starts_with(b"From ") {
                        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                        if let Some(previous) = self.pending_from.replace(line) {
                            return Some(Ok(MboxMessage {
                                from_line: previous,
                                raw: std::mem::take(&mut self.current),
                            }));
                        }
                        // First envelope line of the file.
                    } else if self.pending_from.is_some() {
                        self.current.extend_from_slice(&buf);
                    }
                    // Bytes before the first envelope line are not a message.
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// Matches asctime-style dates in envelope lines, with or without a zone:
// "Sat Dec  6 13:41:10 2003" or "Mon May 09 10:06:02 +0000 2022".
fn envelope_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun)\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}(?:\s+[+-]\d{4})?\s+\d{4}",
        )
        .unwrap()
    })
}

/// Parse the timestamp out of an envelope `From ` line.
///
/// The timestamp orders the whole corpus, so failure here is fatal for the
/// run rather than degraded.
pub fn parse_envelope_date(from_line: &str) -> Result<DateTime<Utc>, IngestError> {
    let matched = envelope_date_re()
        .find(from_line)
        .ok_or_else(|| IngestError::EnvelopeDate(from_line.to_string()))?;

    // Collapse runs of whitespace ("Dec  6") before handing to chrono.
    let normalized = matched
        .as_str()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // Six fields means a zone offset is present; five means none.
    let with_zone = normalized.split(' ').count() == 6;
    if with_zone {
        DateTime::parse_from_str(&normalized, "%a %b %e %H:%M:%S %z %Y")
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| IngestError::EnvelopeDate(from_line.to_string()))
    } else {
        NaiveDateTime::parse_from_str(&normalized, "%a %b %e %H:%M:%S %Y")
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| IngestError::EnvelopeDate(from_line.to_string()))
    }
}
