use rusqlite::params;

use super::*;

/// Which message table an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTable {
    /// Every retained message.
    Raw,
    /// The subject-authored subset.
    Subject,
}

impl MessageTable {
    pub fn name(self) -> &'static str {
        match self {
            MessageTable::Raw => "raw_msgs",
            MessageTable::Subject => "msgs",
        }
    }
}

impl ArchiveDb {
    /// Insert a message, keyed on its envelope line.
    ///
    /// Duplicate envelope lines are expected (re-ingestion, pass-2
    /// promotion of an already-promoted row); they are logged and skipped,
    /// never treated as an error. Returns whether a row was inserted.
    pub fn insert_message(&self, table: MessageTable, msg: &DbMessage) -> Result<bool, DbError> {
        let sql = format!(
            "INSERT INTO {} (from_line, msg_date, sender, receiver, subject, headers, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(from_line) DO NOTHING",
            table.name()
        );
        let rows = self.conn_ref().execute(
            &sql,
            params![
                msg.from_line,
                msg.msg_date,
                msg.sender,
                msg.receiver,
                msg.subject,
                msg.headers,
                msg.payload,
            ],
        )?;
        if rows == 0 {
            log::debug!("record already exists in {}: {}", table.name(), msg.from_line);
        }
        Ok(rows > 0)
    }

    /// Messages in `raw_msgs` whose stored sender contains `fragment`.
    ///
    /// Pass 2 calls this once per tallied recipient address to find the mail
    /// they sent back.
    pub fn messages_from_sender(&self, fragment: &str) -> Result<Vec<DbMessage>, DbError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT from_line, msg_date, sender, receiver, subject, headers, payload
             FROM raw_msgs
             WHERE sender LIKE '%' || ?1 || '%'",
        )?;
        let mapped = stmt.query_map([fragment], |row| {
            Ok(DbMessage {
                from_line: row.get(0)?,
                msg_date: row.get(1)?,
                sender: row.get(2)?,
                receiver: row.get(3)?,
                subject: row.get(4)?,
                headers: row.get(5)?,
                payload: row.get(6)?,
            })
        })?;
        let mut messages = Vec::new();
        for row in mapped {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Row count of a message table.
    pub fn message_count(&self, table: MessageTable) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(self.conn_ref().query_row(&sql, [], |row| row.get(0))?)
    }
}
