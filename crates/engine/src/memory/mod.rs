//! In-memory reference engine
//!
//! A complete in-process implementation of the engine contract
//! ([`EngineConnection`] / [`EngineSession`]). It tracks named snapshots, the
//! retention floor, and each session's read point, and it enforces the same
//! rules a real engine would:
//!
//! - `begin_transaction("snapshot=N")` requires `N` to be a live named snapshot
//! - `begin_transaction("read_timestamp=<hex>")` requires the timestamp to be at
//!   or above the retention floor
//! - one transaction per session
//! - every config string must parse, and timestamps must be 16 hex digits
//!   unless strict width checking is disabled
//!
//! Every call is journaled, and single-shot faults can be injected per
//! operation kind. Tests and benches use both.

pub mod parser;

use dashmap::DashMap;
use keel_core::config_string::{
    KEY_ALL, KEY_BEFORE, KEY_DROP, KEY_NAME, KEY_OLDEST_TIMESTAMP, KEY_READ_TIMESTAMP, KEY_SNAPSHOT,
};
use keel_core::traits::{EngineConnection, EngineSession};
use keel_core::{EngineError, EngineResult, SnapshotName, Timestamp};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use self::parser::{parse, ConfigEntry, ConfigValue};

/// Kinds of engine call, for journaling and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    /// `EngineConnection::open_session`
    OpenSession,
    /// `EngineConnection::set_timestamp`
    SetTimestamp,
    /// `EngineSession::begin_transaction`
    BeginTransaction,
    /// `EngineSession::rollback_transaction`
    RollbackTransaction,
    /// `EngineSession::snapshot`
    Snapshot,
    /// `EngineSession::close`
    CloseSession,
}

/// One journaled engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    /// Which primitive was called
    pub op: EngineOp,
    /// Session the call was made on (0 for connection-level calls)
    pub session: u64,
    /// Configuration string passed, empty if none
    pub config: String,
}

/// Read point a session's transaction is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPoint {
    /// Pinned to a named snapshot
    Snapshot(SnapshotName),
    /// Pinned to a read timestamp
    Timestamp(Timestamp),
}

/// Tunables for the in-memory engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEngineOptions {
    /// Require timestamps to be exactly 16 hex digits
    pub strict_hex_width: bool,
    /// Keep a journal of every call
    pub record_calls: bool,
}

impl Default for MemoryEngineOptions {
    fn default() -> Self {
        Self {
            strict_hex_width: true,
            record_calls: true,
        }
    }
}

#[derive(Default)]
struct EngineState {
    named: BTreeSet<SnapshotName>,
    oldest: Timestamp,
    faults: HashMap<EngineOp, i32>,
    journal: Vec<EngineCall>,
}

struct EngineShared {
    state: Mutex<EngineState>,
    /// Open sessions and their running transaction, if any
    sessions: DashMap<u64, Option<ReadPoint>>,
    next_session: AtomicU64,
    options: MemoryEngineOptions,
}

impl EngineShared {
    /// Journal a call and fire any injected fault for it
    fn enter(&self, op: EngineOp, session: u64, config: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        if self.options.record_calls {
            state.journal.push(EngineCall {
                op,
                session,
                config: config.to_string(),
            });
        }
        if let Some(code) = state.faults.remove(&op) {
            return Err(EngineError::new(code, format!("injected fault on {:?}", op)));
        }
        trace!(target: "keel::engine", ?op, session, config, "Engine call");
        Ok(())
    }

    fn parse_timestamp(&self, entry: &ConfigEntry) -> EngineResult<Timestamp> {
        let hex = entry
            .scalar()
            .ok_or_else(|| invalid(format!("'{}' requires a value", entry.key)))?;
        let parsed = if self.options.strict_hex_width {
            Timestamp::from_config_hex(hex)
        } else if (1..=16).contains(&hex.len()) {
            u64::from_str_radix(hex, 16).ok().map(Timestamp::from_u64)
        } else {
            None
        };
        parsed.ok_or_else(|| invalid(format!("malformed timestamp '{}' for '{}'", hex, entry.key)))
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::new(EngineError::INVALID, message)
}

fn parse_name(entry: &ConfigEntry) -> EngineResult<SnapshotName> {
    entry
        .scalar()
        .and_then(|s| s.parse::<u64>().ok())
        .map(SnapshotName::from_u64)
        .ok_or_else(|| invalid(format!("malformed snapshot name for '{}'", entry.key)))
}

fn single_entry(config: &str) -> EngineResult<ConfigEntry> {
    let mut entries = parse(config)?;
    if entries.len() != 1 {
        return Err(invalid(format!("expected exactly one setting in '{}'", config)));
    }
    Ok(entries.remove(0))
}

/// In-memory engine connection
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
}

impl MemoryEngine {
    /// Create an engine with default options
    pub fn new() -> Self {
        Self::with_options(MemoryEngineOptions::default())
    }

    /// Create an engine with explicit options
    pub fn with_options(options: MemoryEngineOptions) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                state: Mutex::new(EngineState::default()),
                sessions: DashMap::new(),
                next_session: AtomicU64::new(1),
                options,
            }),
        }
    }

    /// Open a session with its concrete type
    ///
    /// # Errors
    ///
    /// Returns an injected fault, if any.
    pub fn open_memory_session(&self) -> EngineResult<MemorySession> {
        self.shared.enter(EngineOp::OpenSession, 0, "")?;
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared.sessions.insert(id, None);
        Ok(MemorySession {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Make the next call of kind `op` fail with `code`
    pub fn fail_next(&self, op: EngineOp, code: i32) {
        self.shared.state.lock().faults.insert(op, code);
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.state.lock().journal.clone()
    }

    /// Configuration strings received for one kind of call
    pub fn configs(&self, op: EngineOp) -> Vec<String> {
        self.shared
            .state
            .lock()
            .journal
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.config.clone())
            .collect()
    }

    /// Forget the call journal
    pub fn clear_calls(&self) {
        self.shared.state.lock().journal.clear();
    }

    /// Live named snapshots, ascending
    pub fn named_snapshots(&self) -> Vec<SnapshotName> {
        self.shared.state.lock().named.iter().copied().collect()
    }

    /// Current retention floor
    pub fn oldest_timestamp(&self) -> Timestamp {
        self.shared.state.lock().oldest
    }

    /// Number of sessions not yet closed
    pub fn open_sessions(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Invalidate every open session
    ///
    /// Later calls on those sessions fail with `ECLOSED`.
    pub fn close_all_sessions(&self) {
        self.shared.sessions.clear();
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConnection for MemoryEngine {
    fn open_session(&self) -> EngineResult<Box<dyn EngineSession>> {
        Ok(Box::new(self.open_memory_session()?))
    }

    fn set_timestamp(&self, config: &str) -> EngineResult<()> {
        self.shared.enter(EngineOp::SetTimestamp, 0, config)?;

        let entry = single_entry(config)?;
        if entry.key != KEY_OLDEST_TIMESTAMP {
            return Err(invalid(format!("unsupported timestamp setting '{}'", entry.key)));
        }
        let ts = self.shared.parse_timestamp(&entry)?;

        // The floor only moves forward; older values are ignored
        let mut state = self.shared.state.lock();
        state.oldest = state.oldest.max(ts);
        Ok(())
    }
}

/// Session on a [`MemoryEngine`]
pub struct MemorySession {
    id: u64,
    shared: Arc<EngineShared>,
}

impl MemorySession {
    /// Engine-assigned session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read point of the running transaction, if any
    pub fn read_point(&self) -> Option<ReadPoint> {
        self.shared.sessions.get(&self.id).and_then(|entry| *entry)
    }

    fn closed(&self) -> EngineError {
        EngineError::new(EngineError::CLOSED, format!("session {} is closed", self.id))
    }

    fn resolve_read_point(&self, config: &str) -> EngineResult<ReadPoint> {
        let entry = single_entry(config)?;
        let state = self.shared.state.lock();
        match entry.key.as_str() {
            KEY_SNAPSHOT => {
                let name = parse_name(&entry)?;
                if !state.named.contains(&name) {
                    return Err(EngineError::new(
                        EngineError::NOT_FOUND,
                        format!("named snapshot {} does not exist", name),
                    ));
                }
                Ok(ReadPoint::Snapshot(name))
            }
            KEY_READ_TIMESTAMP => {
                let ts = self.shared.parse_timestamp(&entry)?;
                if ts < state.oldest {
                    return Err(invalid(format!(
                        "read timestamp {} is older than oldest timestamp {}",
                        ts, state.oldest
                    )));
                }
                Ok(ReadPoint::Timestamp(ts))
            }
            other => Err(invalid(format!("unsupported transaction setting '{}'", other))),
        }
    }
}

impl EngineSession for MemorySession {
    fn begin_transaction(&self, config: &str) -> EngineResult<()> {
        self.shared.enter(EngineOp::BeginTransaction, self.id, config)?;
        if !self.shared.sessions.contains_key(&self.id) {
            return Err(self.closed());
        }

        let read_point = self.resolve_read_point(config)?;
        let mut slot = self.shared.sessions.get_mut(&self.id).ok_or_else(|| self.closed())?;
        if slot.is_some() {
            return Err(invalid("transaction already running in this session"));
        }
        *slot = Some(read_point);
        Ok(())
    }

    fn rollback_transaction(&self) -> EngineResult<()> {
        self.shared.enter(EngineOp::RollbackTransaction, self.id, "")?;

        let mut slot = self.shared.sessions.get_mut(&self.id).ok_or_else(|| self.closed())?;
        *slot = None;
        Ok(())
    }

    fn snapshot(&self, config: &str) -> EngineResult<()> {
        self.shared.enter(EngineOp::Snapshot, self.id, config)?;
        if !self.shared.sessions.contains_key(&self.id) {
            return Err(self.closed());
        }

        let entry = single_entry(config)?;
        let mut state = self.shared.state.lock();
        match (entry.key.as_str(), &entry.value) {
            (KEY_NAME, ConfigValue::Scalar(_)) => {
                let name = parse_name(&entry)?;
                if !state.named.insert(name) {
                    return Err(EngineError::new(
                        EngineError::EXISTS,
                        format!("named snapshot {} already exists", name),
                    ));
                }
                Ok(())
            }
            (KEY_DROP, ConfigValue::Group(nested)) => match nested.as_slice() {
                [ConfigEntry {
                    key,
                    value: ConfigValue::Flag,
                }] if key == KEY_ALL => {
                    state.named.clear();
                    Ok(())
                }
                [before] if before.key == KEY_BEFORE => {
                    let name = parse_name(before)?;
                    state.named = state.named.split_off(&name);
                    Ok(())
                }
                _ => Err(invalid(format!("unsupported drop selector in '{}'", config))),
            },
            _ => Err(invalid(format!("unsupported snapshot setting '{}'", config))),
        }
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.shared.enter(EngineOp::CloseSession, self.id, "")?;
        self.shared
            .sessions
            .remove(&self.id)
            .map(|_| ())
            .ok_or_else(|| self.closed())
    }
}
