//! SQLite-based store implementation

use buildmode_api::{GameMode, InventorySnapshot, ItemStack};
use buildmode_util::{from_epoch_millis, to_epoch_millis, UserId};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    AuditEvent, CooldownRecord, PendingRestoreRecord, PersistedState, SessionRecord, Store,
    StoreError, StoreResult,
};

/// Database file name inside the data directory
pub const DATABASE_FILENAME: &str = "buildmoded.db";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open `buildmoded.db` inside `data_dir`, creating the directory if needed
    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Self::open(data_dir.join(DATABASE_FILENAME))
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Active sessions; deadline_ms NULL means unlimited
            CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                started_at_ms INTEGER NOT NULL,
                deadline_ms INTEGER,
                prior_mode TEXT NOT NULL,
                storage_json TEXT NOT NULL,
                armor_json TEXT NOT NULL,
                offhand_json TEXT NOT NULL
            );

            -- Last session end per user
            CREATE TABLE IF NOT EXISTS cooldowns (
                user_id TEXT PRIMARY KEY,
                last_end_ms INTEGER NOT NULL
            );

            -- Restores waiting for reconnect
            CREATE TABLE IF NOT EXISTS pending_restores (
                user_id TEXT PRIMARY KEY,
                expired_at_ms INTEGER NOT NULL,
                prior_mode TEXT NOT NULL,
                storage_json TEXT NOT NULL,
                armor_json TEXT NOT NULL,
                offhand_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Inventory split into the three persisted columns
struct InventoryColumns {
    storage: String,
    armor: String,
    offhand: String,
}

impl InventoryColumns {
    fn encode(inventory: &InventorySnapshot) -> StoreResult<Self> {
        Ok(Self {
            storage: serde_json::to_string(&inventory.storage)?,
            armor: serde_json::to_string(&inventory.armor)?,
            offhand: serde_json::to_string(&inventory.offhand)?,
        })
    }

    fn decode(&self) -> StoreResult<InventorySnapshot> {
        Ok(InventorySnapshot {
            storage: serde_json::from_str::<Vec<Option<ItemStack>>>(&self.storage)?,
            armor: serde_json::from_str::<Vec<Option<ItemStack>>>(&self.armor)?,
            offhand: serde_json::from_str::<Option<ItemStack>>(&self.offhand)?,
        })
    }
}

fn decode_user(raw: &str) -> StoreResult<UserId> {
    raw.parse()
        .map_err(|e| StoreError::Serialization(format!("bad user id '{}': {}", raw, e)))
}

fn decode_time(millis: i64) -> StoreResult<DateTime<Local>> {
    from_epoch_millis(millis)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {}", millis)))
}

fn decode_mode(raw: &str) -> StoreResult<GameMode> {
    raw.parse().map_err(StoreError::Serialization)
}

struct RawSessionRow {
    user_id: String,
    started_at_ms: i64,
    deadline_ms: Option<i64>,
    prior_mode: String,
    inventory: InventoryColumns,
}

impl RawSessionRow {
    fn decode(&self) -> StoreResult<SessionRecord> {
        Ok(SessionRecord {
            user_id: decode_user(&self.user_id)?,
            started_at: decode_time(self.started_at_ms)?,
            deadline: self.deadline_ms.map(decode_time).transpose()?,
            prior_mode: decode_mode(&self.prior_mode)?,
            saved_inventory: self.inventory.decode()?,
        })
    }
}

struct RawPendingRow {
    user_id: String,
    expired_at_ms: i64,
    prior_mode: String,
    inventory: InventoryColumns,
}

impl RawPendingRow {
    fn decode(&self) -> StoreResult<PendingRestoreRecord> {
        Ok(PendingRestoreRecord {
            user_id: decode_user(&self.user_id)?,
            expired_at: decode_time(self.expired_at_ms)?,
            prior_mode: decode_mode(&self.prior_mode)?,
            saved_inventory: self.inventory.decode()?,
        })
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| buildmode_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn save_state(&self, state: &PersistedState) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM sessions", [])?;
        tx.execute("DELETE FROM cooldowns", [])?;
        tx.execute("DELETE FROM pending_restores", [])?;

        for session in &state.sessions {
            let inv = InventoryColumns::encode(&session.saved_inventory)?;
            tx.execute(
                r#"
                INSERT INTO sessions
                    (user_id, started_at_ms, deadline_ms, prior_mode,
                     storage_json, armor_json, offhand_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    session.user_id.to_string(),
                    to_epoch_millis(&session.started_at),
                    session.deadline.as_ref().map(to_epoch_millis),
                    session.prior_mode.as_str(),
                    inv.storage,
                    inv.armor,
                    inv.offhand,
                ],
            )?;
        }

        for cooldown in &state.cooldowns {
            tx.execute(
                "INSERT INTO cooldowns (user_id, last_end_ms) VALUES (?, ?)",
                params![
                    cooldown.user_id.to_string(),
                    to_epoch_millis(&cooldown.last_end)
                ],
            )?;
        }

        for pending in &state.pending_restores {
            let inv = InventoryColumns::encode(&pending.saved_inventory)?;
            tx.execute(
                r#"
                INSERT INTO pending_restores
                    (user_id, expired_at_ms, prior_mode,
                     storage_json, armor_json, offhand_json)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                params![
                    pending.user_id.to_string(),
                    to_epoch_millis(&pending.expired_at),
                    pending.prior_mode.as_str(),
                    inv.storage,
                    inv.armor,
                    inv.offhand,
                ],
            )?;
        }

        tx.commit()?;

        debug!(
            sessions = state.sessions.len(),
            cooldowns = state.cooldowns.len(),
            pending_restores = state.pending_restores.len(),
            "State saved"
        );
        Ok(())
    }

    fn load_state(&self) -> StoreResult<PersistedState> {
        let conn = self.lock()?;
        let mut state = PersistedState::default();

        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, started_at_ms, deadline_ms, prior_mode,
                   storage_json, armor_json, offhand_json
            FROM sessions ORDER BY user_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawSessionRow {
                user_id: row.get(0)?,
                started_at_ms: row.get(1)?,
                deadline_ms: row.get(2)?,
                prior_mode: row.get(3)?,
                inventory: InventoryColumns {
                    storage: row.get(4)?,
                    armor: row.get(5)?,
                    offhand: row.get(6)?,
                },
            })
        })?;
        for row in rows {
            let raw = match row {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable session record");
                    continue;
                }
            };
            match raw.decode() {
                Ok(record) => state.sessions.push(record),
                Err(e) => warn!(user_id = %raw.user_id, error = %e, "Skipping malformed session record"),
            }
        }

        let mut stmt =
            conn.prepare("SELECT user_id, last_end_ms FROM cooldowns ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| {
            let user_id: String = row.get(0)?;
            let last_end_ms: i64 = row.get(1)?;
            Ok((user_id, last_end_ms))
        })?;
        for row in rows {
            let (user_id, last_end_ms) = match row {
                Ok(columns) => columns,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cooldown record");
                    continue;
                }
            };
            let decoded = decode_user(&user_id).and_then(|id| {
                Ok(CooldownRecord {
                    user_id: id,
                    last_end: decode_time(last_end_ms)?,
                })
            });
            match decoded {
                Ok(record) => state.cooldowns.push(record),
                Err(e) => warn!(user_id = %user_id, error = %e, "Skipping malformed cooldown record"),
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, expired_at_ms, prior_mode,
                   storage_json, armor_json, offhand_json
            FROM pending_restores ORDER BY user_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawPendingRow {
                user_id: row.get(0)?,
                expired_at_ms: row.get(1)?,
                prior_mode: row.get(2)?,
                inventory: InventoryColumns {
                    storage: row.get(3)?,
                    armor: row.get(4)?,
                    offhand: row.get(5)?,
                },
            })
        })?;
        for row in rows {
            let raw = match row {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable pending restore");
                    continue;
                }
            };
            match raw.decode() {
                Ok(record) => state.pending_restores.push(record),
                Err(e) => warn!(user_id = %raw.user_id, error = %e, "Skipping malformed pending restore"),
            }
        }

        debug!(
            sessions = state.sessions.len(),
            cooldowns = state.cooldowns.len(),
            pending_restores = state.pending_restores.len(),
            "State loaded"
        );
        Ok(state)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use buildmode_api::{ItemType, ARMOR_SLOTS, STORAGE_SLOTS};

    fn stack(name: &str, amount: u32) -> ItemStack {
        ItemStack::new(ItemType::parse(name).unwrap(), amount)
    }

    fn full_inventory() -> InventorySnapshot {
        let mut inv = InventorySnapshot::empty();
        for (i, slot) in inv.storage.iter_mut().enumerate() {
            *slot = Some(stack("COBBLESTONE", i as u32 + 1));
        }
        for slot in inv.armor.iter_mut() {
            *slot = Some(stack("DIAMOND_CHESTPLATE", 1).with_enchantment("protection", 4));
        }
        inv.offhand = Some(stack("TORCH", 16).with_display_name("Lamp"));
        inv
    }

    fn sample_state() -> PersistedState {
        let now = buildmode_util::now();
        let timed = UserId::new();
        let unlimited = UserId::new();
        let offline = UserId::new();

        PersistedState {
            sessions: vec![
                SessionRecord {
                    user_id: timed,
                    started_at: now,
                    deadline: Some(now + chrono::Duration::minutes(60)),
                    prior_mode: GameMode::Survival,
                    saved_inventory: full_inventory(),
                },
                SessionRecord {
                    user_id: unlimited,
                    started_at: now,
                    deadline: None,
                    prior_mode: GameMode::Adventure,
                    saved_inventory: InventorySnapshot::empty(),
                },
            ],
            cooldowns: vec![CooldownRecord {
                user_id: offline,
                last_end: now,
            }],
            pending_restores: vec![PendingRestoreRecord {
                user_id: offline,
                expired_at: now,
                prior_mode: GameMode::Creative,
                saved_inventory: full_inventory(),
            }],
        }
    }

    /// Millisecond precision is what the store keeps
    fn truncate(state: &mut PersistedState) {
        let trunc = |dt: DateTime<Local>| from_epoch_millis(to_epoch_millis(&dt)).unwrap();
        for s in &mut state.sessions {
            s.started_at = trunc(s.started_at);
            s.deadline = s.deadline.map(trunc);
        }
        for c in &mut state.cooldowns {
            c.last_end = trunc(c.last_end);
        }
        for p in &mut state.pending_restores {
            p.expired_at = trunc(p.expired_at);
        }
        state.sessions.sort_by_key(|s| s.user_id.to_string());
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
        assert!(store.load_state().unwrap().is_empty());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::RestoreDeferred {
                user_id: UserId::new(),
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].event,
            AuditEventType::RestoreDeferred { .. }
        ));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_state_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let mut state = sample_state();
        store.save_state(&state).unwrap();

        let loaded = store.load_state().unwrap();
        truncate(&mut state);
        assert_eq!(loaded, state);

        let timed = loaded
            .sessions
            .iter()
            .find(|s| s.deadline.is_some())
            .unwrap();
        assert_eq!(timed.saved_inventory.storage.len(), STORAGE_SLOTS);
        assert_eq!(timed.saved_inventory.armor.len(), ARMOR_SLOTS);
        assert_eq!(timed.saved_inventory.item_count(), STORAGE_SLOTS + ARMOR_SLOTS + 1);
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_state(&sample_state()).unwrap();
        store.save_state(&PersistedState::default()).unwrap();

        assert!(store.load_state().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_state(&sample_state()).unwrap();

        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO sessions VALUES ('not-a-uuid', 0, NULL, 'survival', '[]', '[]', 'null')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO sessions VALUES (?, 0, NULL, 'hardcore', '[]', '[]', 'null')",
                [UserId::new().to_string()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO pending_restores VALUES (?, 0, 'survival', '{broken', '[]', 'null')",
                [UserId::new().to_string()],
            )
            .unwrap();
        }

        let loaded = store.load_state().unwrap();
        assert_eq!(loaded.sessions.len(), 2);
        assert_eq!(loaded.pending_restores.len(), 1);
        assert_eq!(loaded.cooldowns.len(), 1);
    }

    #[test]
    fn test_wrongly_typed_columns_are_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_state(&sample_state()).unwrap();

        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO sessions VALUES (?, 'yesterday', NULL, 'survival', '[]', '[]', 'null')",
                [UserId::new().to_string()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO cooldowns VALUES (?, 'a while ago')",
                [UserId::new().to_string()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO pending_restores VALUES (?, 0, 'survival', X'00ff', '[]', 'null')",
                [UserId::new().to_string()],
            )
            .unwrap();
        }

        // One bad row must not cost the other users their saved state
        let loaded = store.load_state().unwrap();
        assert_eq!(loaded.sessions.len(), 2);
        assert_eq!(loaded.cooldowns.len(), 1);
        assert_eq!(loaded.pending_restores.len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = sample_state();

        {
            let store = SqliteStore::open_in_dir(dir.path().join("data")).unwrap();
            store.save_state(&state).unwrap();
        }

        let store = SqliteStore::open_in_dir(dir.path().join("data")).unwrap();
        let loaded = store.load_state().unwrap();
        truncate(&mut state);
        assert_eq!(loaded, state);
        assert!(dir.path().join("data").join(DATABASE_FILENAME).exists());
    }
}
