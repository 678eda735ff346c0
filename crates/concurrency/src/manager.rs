//! Snapshot coordinator
//!
//! Owns the authoritative committed-snapshot pointer and the retention floor,
//! and binds reader transactions to safe read points.
//!
//! Two flows meet here:
//!
//! - **Push** (replication): `prepare_for_snapshot_creation`, `create_snapshot`,
//!   `advance_committed`, `prune_unneeded_snapshots`, `drop_all_snapshots`
//! - **Pull** (readers): `bind_to_committed_snapshot`, `bind_to_oplog_read_point`
//!
//! ## Invariants
//!
//! - The committed pointer never decreases once set
//! - The oldest-kept timestamp never decreases
//! - Every read timestamp handed out is `>=` the oldest-kept timestamp
//!
//! A violation of the first two, or an engine failure while maintaining
//! retention state, is fatal (see [`keel_core::invariant`]).
//!
//! ## Locking
//!
//! A single mutex guards `(committed, oldest_kept, session)`. The engine's
//! metadata calls are leaf calls and may run under it. Anything else that
//! may take its own lock (the replication tracker) is called before locking.

use crate::metrics::{SnapshotCounters, SnapshotMetrics};
use keel_core::config_string;
use keel_core::invariant::fatal;
use keel_core::traits::{EngineConnection, EngineSession, OplogReadSource, RecoveryUnit};
use keel_core::{invariant, invariant_engine_ok};
use keel_core::{KeelError, KeelResult, SnapshotName, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// State guarded by the coordinator's lock
struct SnapshotState {
    /// Newest snapshot visible to majority-committed reads
    committed: Option<SnapshotName>,
    /// Retention floor last pushed to the engine
    oldest_kept: Timestamp,
    /// Administrative session; `None` after shutdown
    session: Option<Box<dyn EngineSession>>,
}

impl SnapshotState {
    fn admin_session(&self, op: &str) -> &dyn EngineSession {
        match self.session.as_deref() {
            Some(session) => session,
            None => fatal(format_args!(
                "{} called after snapshot coordinator shutdown",
                op
            )),
        }
    }
}

/// Serialization point between replication progress and reader transactions
///
/// # Example
///
/// ```
/// use keel_concurrency::SnapshotCoordinator;
/// use keel_core::{SnapshotName, Timestamp};
/// use keel_engine::{EngineRecoveryUnit, MemoryEngine};
/// use std::sync::Arc;
///
/// # fn main() -> keel_core::KeelResult<()> {
/// let engine = MemoryEngine::new();
/// let coordinator = SnapshotCoordinator::new(Arc::new(engine.clone()))?;
///
/// let mut writer = EngineRecoveryUnit::new(Arc::new(engine.clone()));
/// coordinator.create_snapshot(&mut writer, SnapshotName::from_u64(5))?;
/// coordinator.advance_committed(SnapshotName::from_u64(5), Timestamp::from_u64(100));
///
/// let reader = engine.open_memory_session()?;
/// let bound = coordinator.bind_to_committed_snapshot(&reader)?;
/// assert_eq!(bound, SnapshotName::from_u64(5));
/// # Ok(())
/// # }
/// ```
pub struct SnapshotCoordinator {
    connection: Arc<dyn EngineConnection>,
    state: Mutex<SnapshotState>,
    counters: SnapshotCounters,
}

impl SnapshotCoordinator {
    /// Create a coordinator, opening its administrative session
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the session.
    pub fn new(connection: Arc<dyn EngineConnection>) -> KeelResult<Self> {
        let session = connection.open_session()?;
        debug!(target: "keel::snapshot", "Administrative session opened");

        Ok(Self {
            connection,
            state: Mutex::new(SnapshotState {
                committed: None,
                oldest_kept: Timestamp::MIN,
                session: Some(session),
            }),
            counters: SnapshotCounters::default(),
        })
    }

    // =========================================================================
    // Push side
    // =========================================================================

    /// Let the recovery unit stabilize its transaction state before a
    /// snapshot is taken
    ///
    /// Coordinator state is untouched. Always succeeds; any failure is the
    /// recovery unit's to report.
    pub fn prepare_for_snapshot_creation(
        &self,
        recovery_unit: &mut dyn RecoveryUnit,
    ) -> KeelResult<()> {
        recovery_unit.prepare_for_snapshot_creation();
        Ok(())
    }

    /// Create a named snapshot on the recovery unit's session
    ///
    /// Creating a snapshot does not make it committed. Failures are ordinary
    /// errors: creation is speculative and the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be obtained or the engine
    /// rejects the snapshot.
    pub fn create_snapshot(
        &self,
        recovery_unit: &mut dyn RecoveryUnit,
        name: SnapshotName,
    ) -> KeelResult<()> {
        let session = recovery_unit.session()?;
        let config = config_string::create_snapshot(name);

        if let Err(e) = session.snapshot(&config) {
            warn!(
                target: "keel::snapshot",
                snapshot = %name,
                error = %e,
                "Snapshot creation failed"
            );
            return Err(KeelError::from(e));
        }

        self.counters.record_snapshot_created();
        trace!(target: "keel::snapshot", snapshot = %name, "Snapshot created");
        Ok(())
    }

    /// Make `name` the committed snapshot and move the retention floor to `ts`
    ///
    /// Runs entirely under the lock. Fatal if `name` or `ts` is older than
    /// the current value, or if the engine rejects the new floor.
    pub fn advance_committed(&self, name: SnapshotName, ts: Timestamp) {
        let mut state = self.state.lock();

        invariant!(
            state.committed.map_or(true, |current| current <= name),
            "committed snapshot moved backwards: {:?} -> {}",
            state.committed,
            name
        );
        invariant!(
            state.oldest_kept <= ts,
            "oldest timestamp moved backwards: {} -> {}",
            state.oldest_kept,
            ts
        );

        state.committed = Some(name);
        state.oldest_kept = ts;

        let config = config_string::oldest_timestamp(ts);
        invariant_engine_ok!(
            self.connection.set_timestamp(&config),
            "setting retention floor with '{}'",
            config
        );

        self.counters.record_advance();
        debug!(target: "keel::snapshot", snapshot = %name, "{} set", config);
    }

    /// Drop every named snapshot strictly older than the committed one
    ///
    /// No engine call is made until a committed snapshot exists. Fatal on
    /// engine failure.
    pub fn prune_unneeded_snapshots(&self) {
        let state = self.state.lock();

        let Some(committed) = state.committed else {
            return;
        };

        let config = config_string::drop_before(committed);
        invariant_engine_ok!(
            state.admin_session("prune_unneeded_snapshots").snapshot(&config),
            "pruning snapshots with '{}'",
            config
        );

        self.counters.record_prune();
        trace!(target: "keel::snapshot", before = %committed, "Pruned snapshots");
    }

    /// Forget the committed snapshot and drop every named snapshot
    ///
    /// Used for full resynchronization after rollback or loss of majority.
    /// Fatal on engine failure.
    pub fn drop_all_snapshots(&self) {
        let mut state = self.state.lock();
        state.committed = None;

        let config = config_string::drop_all();
        invariant_engine_ok!(
            state.admin_session("drop_all_snapshots").snapshot(&config),
            "dropping all snapshots"
        );

        self.counters.record_drop_all();
        info!(target: "keel::snapshot", "Dropped all named snapshots");
    }

    /// Close the administrative session
    ///
    /// Idempotent. Callers must not issue maintenance calls afterwards.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();

        let Some(session) = state.session.take() else {
            return;
        };

        invariant_engine_ok!(session.close(), "closing administrative session");
        info!(target: "keel::snapshot", "Snapshot coordinator shut down");
    }

    // =========================================================================
    // Pull side
    // =========================================================================

    /// Lowest snapshot guaranteed visible to majority-committed reads
    pub fn min_committed_snapshot(&self) -> Option<SnapshotName> {
        self.state.lock().committed
    }

    /// Retention floor last pushed to the engine
    pub fn oldest_kept_timestamp(&self) -> Timestamp {
        self.state.lock().oldest_kept
    }

    /// Whether `shutdown` has released the administrative session
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().session.is_none()
    }

    /// Begin a transaction on `session` pinned to the committed snapshot
    ///
    /// The lock is held across `begin_transaction` so a concurrent advance or
    /// drop cannot retire the chosen snapshot mid-bind. Returns the name
    /// actually bound.
    ///
    /// # Errors
    ///
    /// - `NotYetAvailable` if no committed snapshot exists yet; retry later
    /// - `Engine` if the engine refuses to begin the transaction
    pub fn bind_to_committed_snapshot(
        &self,
        session: &dyn EngineSession,
    ) -> KeelResult<SnapshotName> {
        let state = self.state.lock();

        let Some(committed) = state.committed else {
            self.counters.record_not_yet_available();
            return Err(KeelError::not_yet_available(
                "committed view disappeared while running operation",
            ));
        };

        session.begin_transaction(&config_string::begin_on_snapshot(committed))?;

        self.counters.record_committed_bind();
        Ok(committed)
    }

    /// Begin a transaction on `session` at `max(all_committed, oldest_kept)`
    ///
    /// The tracker is consulted before taking the lock; it may block or lock
    /// on its own. Returns the chosen read timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses to begin the transaction.
    pub fn bind_to_oplog_read_point(
        &self,
        tracker: &dyn OplogReadSource,
        session: &dyn EngineSession,
    ) -> KeelResult<Timestamp> {
        let all_committed = tracker.all_committed_timestamp();

        let state = self.state.lock();
        let read_ts = std::cmp::max(all_committed, state.oldest_kept);

        session.begin_transaction(&config_string::begin_at_read_timestamp(read_ts))?;

        self.counters.record_oplog_bind();
        Ok(read_ts)
    }

    /// Get coordinator metrics
    pub fn metrics(&self) -> SnapshotMetrics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{EngineError, EngineResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static_assertions::assert_impl_all!(SnapshotCoordinator: Send, Sync);

    // === Test Helpers ===

    #[derive(Default)]
    struct Journal {
        calls: Mutex<Vec<String>>,
        failing: Mutex<Option<&'static str>>,
        closes: AtomicUsize,
    }

    impl Journal {
        fn record(&self, op: &'static str, config: &str) -> EngineResult<()> {
            self.calls.lock().push(format!("{}:{}", op, config));
            if *self.failing.lock() == Some(op) {
                return Err(EngineError::new(EngineError::BUSY, "injected"));
            }
            Ok(())
        }

        fn fail(&self, op: &'static str) {
            *self.failing.lock() = Some(op);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    struct FakeConnection(Arc<Journal>);

    impl EngineConnection for FakeConnection {
        fn open_session(&self) -> EngineResult<Box<dyn EngineSession>> {
            self.0.record("open_session", "")?;
            Ok(Box::new(FakeSession(Arc::clone(&self.0))))
        }

        fn set_timestamp(&self, config: &str) -> EngineResult<()> {
            self.0.record("set_timestamp", config)
        }
    }

    struct FakeSession(Arc<Journal>);

    impl EngineSession for FakeSession {
        fn begin_transaction(&self, config: &str) -> EngineResult<()> {
            self.0.record("begin_transaction", config)
        }

        fn rollback_transaction(&self) -> EngineResult<()> {
            self.0.record("rollback_transaction", "")
        }

        fn snapshot(&self, config: &str) -> EngineResult<()> {
            self.0.record("snapshot", config)
        }

        fn close(self: Box<Self>) -> EngineResult<()> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            self.0.record("close", "")
        }
    }

    struct FakeRecoveryUnit {
        session: FakeSession,
        prepared: usize,
    }

    impl RecoveryUnit for FakeRecoveryUnit {
        fn prepare_for_snapshot_creation(&mut self) {
            self.prepared += 1;
        }

        fn session(&mut self) -> KeelResult<&dyn EngineSession> {
            Ok(&self.session)
        }
    }

    struct FixedOplog(Timestamp);

    impl OplogReadSource for FixedOplog {
        fn all_committed_timestamp(&self) -> Timestamp {
            self.0
        }
    }

    fn setup() -> (SnapshotCoordinator, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let connection = Arc::new(FakeConnection(Arc::clone(&journal)));
        let coordinator = SnapshotCoordinator::new(connection).unwrap();
        journal.calls.lock().clear();
        (coordinator, journal)
    }

    fn name(raw: u64) -> SnapshotName {
        SnapshotName::from_u64(raw)
    }

    fn ts(raw: u64) -> Timestamp {
        Timestamp::from_u64(raw)
    }

    // === Construction ===

    #[test]
    fn test_new_coordinator_is_empty() {
        let (coordinator, _journal) = setup();
        assert_eq!(coordinator.min_committed_snapshot(), None);
        assert_eq!(coordinator.oldest_kept_timestamp(), Timestamp::MIN);
        assert!(!coordinator.is_shut_down());
    }

    #[test]
    fn test_new_propagates_session_failure() {
        let journal = Arc::new(Journal::default());
        journal.fail("open_session");
        let result = SnapshotCoordinator::new(Arc::new(FakeConnection(journal)));
        assert!(matches!(result, Err(KeelError::Engine { code: EngineError::BUSY, .. })));
    }

    // === Push side ===

    #[test]
    fn test_prepare_delegates_to_recovery_unit() {
        let (coordinator, journal) = setup();
        let mut ru = FakeRecoveryUnit {
            session: FakeSession(Arc::clone(&journal)),
            prepared: 0,
        };

        coordinator.prepare_for_snapshot_creation(&mut ru).unwrap();

        assert_eq!(ru.prepared, 1);
        assert!(journal.calls().is_empty());
        assert_eq!(coordinator.min_committed_snapshot(), None);
    }

    #[test]
    fn test_create_snapshot_uses_recovery_unit_session() {
        let (coordinator, journal) = setup();
        let mut ru = FakeRecoveryUnit {
            session: FakeSession(Arc::clone(&journal)),
            prepared: 0,
        };

        coordinator.create_snapshot(&mut ru, name(42)).unwrap();

        assert_eq!(journal.calls(), vec!["snapshot:name=42"]);
        assert_eq!(coordinator.min_committed_snapshot(), None);
        assert_eq!(coordinator.metrics().snapshots_created, 1);
    }

    #[test]
    fn test_create_snapshot_failure_is_not_fatal() {
        let (coordinator, journal) = setup();
        let mut ru = FakeRecoveryUnit {
            session: FakeSession(Arc::clone(&journal)),
            prepared: 0,
        };
        journal.fail("snapshot");

        let err = coordinator.create_snapshot(&mut ru, name(1)).unwrap_err();

        assert!(matches!(err, KeelError::Engine { .. }));
        assert_eq!(coordinator.metrics().snapshots_created, 0);
    }

    #[test]
    fn test_advance_committed_sets_pointer_and_floor() {
        let (coordinator, journal) = setup();

        coordinator.advance_committed(name(5), ts(0x1A2B));

        assert_eq!(coordinator.min_committed_snapshot(), Some(name(5)));
        assert_eq!(coordinator.oldest_kept_timestamp(), ts(0x1A2B));
        assert_eq!(
            journal.calls(),
            vec!["set_timestamp:oldest_timestamp=0000000000001a2b"]
        );
    }

    #[test]
    fn test_advance_committed_allows_equal_values() {
        let (coordinator, _journal) = setup();
        coordinator.advance_committed(name(5), ts(10));
        coordinator.advance_committed(name(5), ts(10));
        coordinator.advance_committed(name(6), ts(10));
        assert_eq!(coordinator.min_committed_snapshot(), Some(name(6)));
        assert_eq!(coordinator.metrics().advances, 3);
    }

    #[test]
    #[should_panic(expected = "committed snapshot moved backwards")]
    fn test_advance_committed_backwards_is_fatal() {
        let (coordinator, _journal) = setup();
        coordinator.advance_committed(name(5), ts(10));
        coordinator.advance_committed(name(4), ts(10));
    }

    #[test]
    #[should_panic(expected = "oldest timestamp moved backwards")]
    fn test_advance_committed_floor_backwards_is_fatal() {
        let (coordinator, _journal) = setup();
        coordinator.advance_committed(name(5), ts(10));
        coordinator.advance_committed(name(6), ts(9));
    }

    #[test]
    #[should_panic(expected = "setting retention floor")]
    fn test_advance_committed_engine_failure_is_fatal() {
        let (coordinator, journal) = setup();
        journal.fail("set_timestamp");
        coordinator.advance_committed(name(1), ts(1));
    }

    #[test]
    fn test_prune_without_committed_is_noop() {
        let (coordinator, journal) = setup();
        coordinator.prune_unneeded_snapshots();
        assert!(journal.calls().is_empty());
        assert_eq!(coordinator.metrics().prunes, 0);
    }

    #[test]
    fn test_prune_drops_older_than_committed() {
        let (coordinator, journal) = setup();
        coordinator.advance_committed(name(17), ts(3));
        journal.calls.lock().clear();

        coordinator.prune_unneeded_snapshots();

        assert_eq!(journal.calls(), vec!["snapshot:drop=(before=17)"]);
    }

    #[test]
    #[should_panic(expected = "pruning snapshots")]
    fn test_prune_engine_failure_is_fatal() {
        let (coordinator, journal) = setup();
        coordinator.advance_committed(name(2), ts(2));
        journal.fail("snapshot");
        coordinator.prune_unneeded_snapshots();
    }

    #[test]
    fn test_drop_all_clears_committed() {
        let (coordinator, journal) = setup();
        coordinator.advance_committed(name(9), ts(9));

        coordinator.drop_all_snapshots();

        assert_eq!(coordinator.min_committed_snapshot(), None);
        assert_eq!(journal.calls().last().unwrap(), "snapshot:drop=(all)");
        // Retention floor is not rewound by a resync
        assert_eq!(coordinator.oldest_kept_timestamp(), ts(9));
    }

    #[test]
    fn test_drop_all_without_committed_still_calls_engine() {
        let (coordinator, journal) = setup();
        coordinator.drop_all_snapshots();
        assert_eq!(journal.calls(), vec!["snapshot:drop=(all)"]);
    }

    #[test]
    #[should_panic(expected = "dropping all snapshots")]
    fn test_drop_all_engine_failure_is_fatal() {
        let (coordinator, journal) = setup();
        journal.fail("snapshot");
        coordinator.drop_all_snapshots();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (coordinator, journal) = setup();

        coordinator.shutdown();
        coordinator.shutdown();

        assert!(coordinator.is_shut_down());
        assert_eq!(journal.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "closing administrative session")]
    fn test_shutdown_close_failure_is_fatal() {
        let (coordinator, journal) = setup();
        journal.fail("close");
        coordinator.shutdown();
    }

    #[test]
    #[should_panic(
        expected = "prune_unneeded_snapshots called after snapshot coordinator shutdown"
    )]
    fn test_maintenance_after_shutdown_is_fatal() {
        let (coordinator, _journal) = setup();
        coordinator.advance_committed(name(1), ts(1));
        coordinator.shutdown();
        coordinator.prune_unneeded_snapshots();
    }

    // === Pull side ===

    #[test]
    fn test_bind_committed_before_advance_is_not_yet_available() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));

        let err = coordinator.bind_to_committed_snapshot(&reader).unwrap_err();

        assert!(matches!(err, KeelError::NotYetAvailable { .. }));
        assert!(err.is_retryable());
        assert!(journal.calls().is_empty());
        assert_eq!(coordinator.metrics().not_yet_available, 1);
    }

    #[test]
    fn test_bind_committed_returns_bound_name() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        coordinator.advance_committed(name(5), ts(1));
        journal.calls.lock().clear();

        let bound = coordinator.bind_to_committed_snapshot(&reader).unwrap();

        assert_eq!(bound, name(5));
        assert_eq!(journal.calls(), vec!["begin_transaction:snapshot=5"]);
    }

    #[test]
    fn test_bind_committed_after_drop_all_is_not_yet_available() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        coordinator.advance_committed(name(5), ts(1));
        coordinator.drop_all_snapshots();

        let err = coordinator.bind_to_committed_snapshot(&reader).unwrap_err();
        assert_eq!(err.error_code(), "NotYetAvailable");
    }

    #[test]
    fn test_bind_committed_engine_failure_is_returned() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        coordinator.advance_committed(name(5), ts(1));
        journal.fail("begin_transaction");

        let err = coordinator.bind_to_committed_snapshot(&reader).unwrap_err();

        assert!(matches!(err, KeelError::Engine { .. }));
        assert_eq!(coordinator.metrics().committed_binds, 0);
    }

    #[test]
    fn test_bind_oplog_floor_wins_when_ahead() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        coordinator.advance_committed(name(1), ts(20));
        journal.calls.lock().clear();

        let read_ts = coordinator
            .bind_to_oplog_read_point(&FixedOplog(ts(10)), &reader)
            .unwrap();

        assert_eq!(read_ts, ts(20));
        assert_eq!(
            journal.calls(),
            vec!["begin_transaction:read_timestamp=0000000000000014"]
        );
    }

    #[test]
    fn test_bind_oplog_all_committed_wins_when_ahead() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        coordinator.advance_committed(name(1), ts(20));

        let read_ts = coordinator
            .bind_to_oplog_read_point(&FixedOplog(ts(30)), &reader)
            .unwrap();

        assert_eq!(read_ts, ts(30));
        assert_eq!(coordinator.metrics().oplog_binds, 1);
    }

    #[test]
    fn test_bind_oplog_works_before_any_advance() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));

        let read_ts = coordinator
            .bind_to_oplog_read_point(&FixedOplog(ts(0x1A2B)), &reader)
            .unwrap();

        assert_eq!(read_ts, ts(0x1A2B));
        assert_eq!(
            journal.calls(),
            vec!["begin_transaction:read_timestamp=0000000000001a2b"]
        );
    }

    #[test]
    fn test_bind_oplog_engine_failure_is_returned() {
        let (coordinator, journal) = setup();
        let reader = FakeSession(Arc::clone(&journal));
        journal.fail("begin_transaction");

        let result = coordinator.bind_to_oplog_read_point(&FixedOplog(ts(1)), &reader);
        assert!(result.is_err());
    }
}
