use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// A raw settings row. `value` is ciphertext when `is_encrypted` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSetting {
    pub value: String,
    pub is_encrypted: bool,
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<StoredSetting>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT value, is_encrypted FROM settings WHERE key = ?1")?;
    match stmt.query_row([key], |row| {
        Ok(StoredSetting {
            value: row.get(0)?,
            is_encrypted: row.get::<_, i32>(1)? != 0,
        })
    }) {
        Ok(setting) => Ok(Some(setting)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Set a setting (upsert).
pub fn set_setting(
    conn: &Connection,
    key: &str,
    value: &str,
    is_encrypted: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO settings (key, value, is_encrypted, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, is_encrypted = ?3, updated_at = datetime('now')",
        params![key, value, is_encrypted as i32],
    )?;
    Ok(())
}

pub fn delete_setting(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
    Ok(())
}
