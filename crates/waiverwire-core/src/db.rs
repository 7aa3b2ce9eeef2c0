// SQLite persistence layer for rosters, claims, and lineups.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::WaiverError;
use crate::lineup::SchedulingPeriod;
use crate::player::Player;
use crate::store::RosterStore;

/// SQLite-backed storage shared by every store in the engine.
///
/// The connection sits behind a mutex. Resolutions take it with `try_lock`
/// and fail fast when another resolution holds it; everything else blocks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// How long SQLite waits on a locked database file before giving up.
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_timeout(path, Self::DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`Database::open`], with an explicit SQLite busy timeout.
    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;
        conn.busy_timeout(busy_timeout)
            .context("failed to set busy timeout")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id        INTEGER PRIMARY KEY,
                name      TEXT NOT NULL,
                position  TEXT NOT NULL,
                nfl_team  TEXT
            );

            CREATE TABLE IF NOT EXISTS roster_assignments (
                player_id        INTEGER PRIMARY KEY REFERENCES players(id),
                team_id          INTEGER NOT NULL,
                acquisition_type TEXT NOT NULL,
                acquired_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS waiver_claims (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id          INTEGER NOT NULL,
                pickup_player_id INTEGER NOT NULL REFERENCES players(id),
                drop_player_id   INTEGER NOT NULL REFERENCES players(id),
                round            INTEGER NOT NULL,
                submission_order INTEGER NOT NULL,
                status           TEXT NOT NULL DEFAULT 'pending'
                                 CHECK (status IN ('pending', 'approved', 'rejected')),
                resolution_note  TEXT,
                submitted_at     TEXT NOT NULL,
                processed_at     TEXT,
                processed_by     TEXT
            );

            CREATE TABLE IF NOT EXISTS lineup_entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id         INTEGER NOT NULL,
                season          INTEGER NOT NULL,
                week            INTEGER NOT NULL,
                position        TEXT NOT NULL,
                player_id       INTEGER NOT NULL REFERENCES players(id),
                sort_order      INTEGER NOT NULL,
                entry_status    TEXT NOT NULL
                                CHECK (entry_status IN ('pending_waiver', 'rostered')),
                source_claim_id INTEGER,
                UNIQUE (team_id, season, week, player_id)
            );

            CREATE TABLE IF NOT EXISTS league_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_roster_team ON roster_assignments(team_id);
            CREATE INDEX IF NOT EXISTS idx_claims_status ON waiver_claims(status);
            CREATE INDEX IF NOT EXISTS idx_lineup_claim ON lineup_entries(source_claim_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection, waiting for any in-flight operation.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, WaiverError> {
        self.conn
            .lock()
            .map_err(|_| WaiverError::StorageUnavailable("database mutex poisoned".into()))
    }

    /// Acquire the connection without waiting. A held lock means another
    /// resolution is running, reported as [`WaiverError::ResolutionBusy`].
    pub(crate) fn try_lock(&self) -> Result<MutexGuard<'_, Connection>, WaiverError> {
        match self.conn.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(WaiverError::ResolutionBusy),
            Err(TryLockError::Poisoned(_)) => Err(WaiverError::StorageUnavailable(
                "database mutex poisoned".into(),
            )),
        }
    }

    /// Persist an arbitrary JSON value under `key`. Repeated saves overwrite
    /// the previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<(), WaiverError> {
        let conn = self.lock()?;
        let json_str = serde_json::to_string(value)?;
        conn.execute(
            "INSERT OR REPLACE INTO league_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>, WaiverError> {
        let conn = self.lock()?;
        load_state_in(&conn, key)
    }

    /// The stored scheduling period, or `default` when none was ever set.
    pub fn current_period(
        &self,
        default: SchedulingPeriod,
    ) -> Result<SchedulingPeriod, WaiverError> {
        let conn = self.lock()?;
        current_period_in(&conn, default)
    }

    pub fn set_current_period(&self, period: SchedulingPeriod) -> Result<(), WaiverError> {
        self.save_state(CURRENT_PERIOD_KEY, &serde_json::to_value(period)?)
    }

    /// Insert a player or refresh their name/position/team.
    pub fn upsert_player(&self, player: &Player) -> Result<(), WaiverError> {
        let conn = self.lock()?;
        RosterStore::new(&conn).upsert_player(player)
    }

    /// Whether any roster assignment exists yet (used to decide on import).
    pub fn has_rosters(&self) -> Result<bool, WaiverError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM roster_assignments)",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

/// Key in `league_state` holding the current scheduling period.
const CURRENT_PERIOD_KEY: &str = "current_period";

/// [`Database::load_state`] against a connection the caller already holds.
pub(crate) fn load_state_in(
    conn: &Connection,
    key: &str,
) -> Result<Option<serde_json::Value>, WaiverError> {
    let json_str: Option<String> = conn
        .query_row(
            "SELECT value FROM league_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match json_str {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

/// [`Database::current_period`] against a connection the caller already holds.
pub(crate) fn current_period_in(
    conn: &Connection,
    default: SchedulingPeriod,
) -> Result<SchedulingPeriod, WaiverError> {
    match load_state_in(conn, CURRENT_PERIOD_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PositionGroup;
    use crate::ids::PlayerId;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.lock().unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "players",
            "roster_assignments",
            "waiver_claims",
            "lineup_entries",
            "league_state",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn save_and_load_state_round_trip() {
        let db = test_db();
        let value = json!({"note": "trade deadline", "weeks": [9, 10]});
        db.save_state("deadline", &value).unwrap();
        assert_eq!(db.load_state("deadline").unwrap(), Some(value));
        assert!(db.load_state("missing").unwrap().is_none());
    }

    #[test]
    fn save_state_overwrites_previous_value() {
        let db = test_db();
        db.save_state("key", &json!(1)).unwrap();
        db.save_state("key", &json!(2)).unwrap();
        assert_eq!(db.load_state("key").unwrap(), Some(json!(2)));
    }

    #[test]
    fn current_period_defaults_until_set() {
        let db = test_db();
        let default = SchedulingPeriod::new(2025, 1);
        assert_eq!(db.current_period(default).unwrap(), default);

        db.set_current_period(SchedulingPeriod::new(2025, 6)).unwrap();
        assert_eq!(
            db.current_period(default).unwrap(),
            SchedulingPeriod::new(2025, 6)
        );
    }

    #[test]
    fn try_lock_reports_busy_while_held() {
        let db = test_db();
        let _held = db.lock().unwrap();
        assert!(matches!(db.try_lock(), Err(WaiverError::ResolutionBusy)));
    }

    #[test]
    fn claim_status_check_constraint_rejects_unknown_strings() {
        let db = test_db();
        db.upsert_player(&Player {
            id: PlayerId(1),
            name: "Ka'imi Fairbairn".into(),
            position: PositionGroup::PlaceKicker,
            nfl_team: Some("HOU".into()),
        })
        .unwrap();
        let conn = db.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO waiver_claims
                (team_id, pickup_player_id, drop_player_id, round, submission_order, status, submitted_at)
             VALUES (1, 1, 1, 1, 1, 'processing', '2025-09-01T00:00:00.000Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        let conn = db.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO roster_assignments (player_id, team_id, acquisition_type, acquired_at)
             VALUES (9999, 1, 'Draft', '2025-09-01T00:00:00.000Z')",
            [],
        );
        assert!(result.is_err());
    }
}
