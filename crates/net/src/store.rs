//! Named realm data for the offline relay
//!
//! Values are keyed by (realm, name). An absent realm is stored as `-1`,
//! the number a client reports before it has joined anything.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use relay_core::RealmNumber;

use crate::error::Result;

const NO_REALM: i64 = -1;

/// SQLite-backed key/value store
pub struct DataStore {
    conn: Connection,
}

impl DataStore {
    /// Open or create a store at `path`
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Store that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS realm_data (
                realm INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at TEXT,
                PRIMARY KEY (realm, name)
            );",
        )?;
        Ok(())
    }

    /// Save a value; an empty value deletes the entry
    pub fn save(
        &self,
        realm: Option<RealmNumber>,
        name: &str,
        value: &str,
        duration_secs: Option<u32>,
    ) -> Result<()> {
        self.save_at(realm, name, value, duration_secs, Utc::now())
    }

    fn save_at(
        &self,
        realm: Option<RealmNumber>,
        name: &str,
        value: &str,
        duration_secs: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let realm = realm_key(realm);

        if value.is_empty() {
            self.conn.execute(
                "DELETE FROM realm_data WHERE realm = ?1 AND name = ?2",
                params![realm, name],
            )?;
            debug!(realm, name, "Deleted data");
            return Ok(());
        }

        let expires_at = duration_secs
            .filter(|secs| *secs > 0)
            .map(|secs| (now + Duration::seconds(i64::from(secs))).to_rfc3339());

        self.conn.execute(
            "INSERT OR REPLACE INTO realm_data (realm, name, value, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![realm, name, value, expires_at],
        )?;
        debug!(realm, name, "Saved data");
        Ok(())
    }

    /// Load a value, or `None` if it is missing or expired
    pub fn load(&self, realm: Option<RealmNumber>, name: &str) -> Result<Option<String>> {
        self.load_at(realm, name, Utc::now())
    }

    fn load_at(
        &self,
        realm: Option<RealmNumber>,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let row = self
            .conn
            .query_row(
                "SELECT value, expires_at FROM realm_data WHERE realm = ?1 AND name = ?2",
                params![realm_key(realm), name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        let expired = expires_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .is_some_and(|at| at.with_timezone(&Utc) <= now);

        Ok(if expired { None } else { Some(value) })
    }
}

fn realm_key(realm: Option<RealmNumber>) -> i64 {
    realm.map_or(NO_REALM, i64::from)
}
