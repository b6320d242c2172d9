use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::*;

// Quote characters survive header cleaning often enough that the address
// book strips them again at the door.
fn strip_quotes(s: &str) -> String {
    s.replace(['"', '\''], "")
}

impl ArchiveDb {
    /// Record a best-effort identity for `email`.
    ///
    /// No-op when the name is empty or textually contains the email (a
    /// name-less auto-generated header carries no information). An existing
    /// entry is never overwritten here — first writer wins; corrections go
    /// through [`ArchiveDb::apply_name_corrections`]. Returns whether a row
    /// was inserted.
    pub fn add_address(&self, email: &str, name: &str) -> Result<bool, DbError> {
        let email = strip_quotes(email);
        let name = strip_quotes(name);

        if name.is_empty() || name.contains(&email) {
            return Ok(false);
        }

        let existing: Option<String> = self
            .conn_ref()
            .query_row(
                "SELECT display_name FROM address_book WHERE email_addr LIKE '%' || ?1 || '%'",
                [&email],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(false);
        }

        let rows = self.conn_ref().execute(
            "INSERT INTO address_book (email_addr, display_name) VALUES (?1, ?2)
             ON CONFLICT(email_addr) DO NOTHING",
            params![email, name],
        )?;
        Ok(rows > 0)
    }

    /// All address book entries, ordered by insertion.
    pub fn all_addresses(&self) -> Result<Vec<DbAddressEntry>, DbError> {
        let mut stmt = self
            .conn_ref()
            .prepare("SELECT email_addr, display_name FROM address_book ORDER BY id")?;
        let mapped = stmt.query_map([], |row| {
            Ok(DbAddressEntry {
                email_addr: row.get(0)?,
                display_name: row.get(1)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in mapped {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Row count of the address book.
    pub fn address_count(&self) -> Result<i64, DbError> {
        Ok(self
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM address_book", [], |row| row.get(0))?)
    }

    /// Rewrite display names from an authoritative `{email: name}` mapping,
    /// then propagate every entry's canonical `Name <email>` presentation
    /// into the subject-authored message rows referencing that address.
    ///
    /// Returns the number of message fields rewritten.
    pub fn apply_name_corrections(
        &self,
        mapping: &HashMap<String, String>,
    ) -> Result<usize, DbError> {
        for (email, name) in mapping {
            let updated = self.conn_ref().execute(
                "UPDATE address_book SET display_name = ?1
                 WHERE email_addr LIKE '%' || ?2 || '%'",
                params![name, email],
            )?;
            if updated > 0 {
                log::info!("corrected display name for {email} ({updated} entries)");
            }
        }

        let mut rewritten = 0;
        for entry in self.all_addresses()? {
            let pretty = format!("{} <{}>", entry.display_name, entry.email_addr);
            for column in ["sender", "receiver"] {
                let sql = format!(
                    "UPDATE msgs SET {column} = ?1 WHERE {column} LIKE '%' || ?2 || '%'"
                );
                rewritten += self
                    .conn_ref()
                    .execute(&sql, params![pretty, entry.email_addr])?;
            }
        }
        Ok(rewritten)
    }
}
