//! World Match
//!
//! The authoritative state machine of one world match. The host drives it
//! from a single task: lifecycle callbacks and ticks never overlap, so the
//! world state needs no locking.
//!
//! ## Tick
//!
//! ```text
//! batch ──► reducer(op_code) ──► WorldState
//!              │
//!              ├─ DO_SPAWN     ─► reconcile position, INITIAL_STATE to sender,
//!              │                  relay spawn to everyone
//!              └─ UPDATE_COLOR ─► relay to everyone
//!
//! after batch: UPDATE_STATE to everyone, then reset jump pulses
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::game::command::{self, OpCode};
use crate::game::messages::{DoSpawn, InitialState, MatchData, UpdateState};
use crate::game::state::{OwnerKey, Position, Presence, WorldState};
use crate::storage::player::{load_player, save_player};
use crate::storage::{StorageBackend, StorageError};
use crate::{MATCH_LABEL, TICK_RATE};

/// Where a character appears the first time its display name spawns.
pub const SPAWN_POSITION: Position = Position::new(1800.0, 1280.0);

/// Lifecycle of a world match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLifecycle {
    /// Created, not yet initialized.
    Uninitialized,
    /// Ticking.
    Active,
    /// Shut down.
    Terminated,
}

/// Values returned by [`WorldMatch::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInit {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Match label.
    pub label: String,
}

/// Outcome of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
    /// The participant may join.
    Accept,
    /// The participant was turned away.
    Reject {
        /// Human-readable reason.
        reason: String,
    },
}

impl JoinDecision {
    /// Whether the attempt was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, JoinDecision::Accept)
    }
}

/// Who receives a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every live participant.
    All,
    /// Only the listed participants.
    Only(Vec<OwnerKey>),
}

/// An outbound message produced by the match.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Opcode.
    pub op_code: i64,
    /// Payload.
    pub data: Vec<u8>,
    /// Target participants.
    pub recipients: Recipients,
    /// Participant a relayed message came from.
    pub sender: Option<OwnerKey>,
}

impl Broadcast {
    fn relay(msg: MatchData) -> Self {
        Self {
            op_code: msg.op_code,
            data: msg.data,
            recipients: Recipients::All,
            sender: Some(msg.sender),
        }
    }

    fn server(op_code: OpCode, data: Vec<u8>, recipients: Recipients) -> Self {
        Self {
            op_code: op_code.code(),
            data,
            recipients,
            sender: None,
        }
    }
}

/// Match errors.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Some participants' positions could not be saved.
    #[error("failed to persist {} player(s): {source}", .failed.len())]
    Persistence {
        /// Participants whose save failed.
        failed: Vec<OwnerKey>,
        /// First storage error encountered.
        #[source]
        source: StorageError,
    },
}

/// A world match.
///
/// Owned by a single task, which calls `init` once, then any mix of join
/// attempts, joins, leaves and ticks, and finally `terminate`. After
/// terminate no tick runs and every join attempt is rejected.
pub struct WorldMatch {
    state: WorldState,
    storage: Arc<dyn StorageBackend>,
    lifecycle: MatchLifecycle,
    tick: u64,
    joined_total: u64,
    pending_joins: BTreeSet<OwnerKey>,
}

impl WorldMatch {
    /// Create a match backed by the given storage.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            state: WorldState::new(),
            storage,
            lifecycle: MatchLifecycle::Uninitialized,
            tick: 0,
            joined_total: 0,
            pending_joins: BTreeSet::new(),
        }
    }

    /// Start the match with an empty world.
    pub fn init(&mut self) -> MatchInit {
        self.state = WorldState::new();
        self.pending_joins.clear();
        self.tick = 0;
        self.lifecycle = MatchLifecycle::Active;

        MatchInit {
            tick_rate: TICK_RATE,
            label: MATCH_LABEL.to_string(),
        }
    }

    /// Decide whether an owner key may join. One connection per identity.
    pub fn join_attempt(&mut self, owner: &OwnerKey) -> JoinDecision {
        if self.state.contains(owner) || self.pending_joins.contains(owner) {
            debug!("Rejected duplicate join from {}", owner);
            return JoinDecision::Reject {
                reason: "user already logged in".to_string(),
            };
        }

        if self.lifecycle != MatchLifecycle::Active {
            return JoinDecision::Reject {
                reason: "match is not running".to_string(),
            };
        }

        self.pending_joins.insert(owner.clone());
        JoinDecision::Accept
    }

    /// Add participants with placeholder state. Existing participants are
    /// never touched.
    pub fn join(&mut self, presences: Vec<Presence>) {
        for presence in presences {
            let owner = presence.user_id.clone();
            self.pending_joins.remove(&owner);

            self.joined_total += 1;
            let placeholder = format!("user_{}", self.joined_total);
            if self.state.insert(presence, placeholder) {
                info!("{} joined ({} in world)", owner, self.state.len());
            } else {
                warn!("{} is already in the world, join ignored", owner);
            }
        }
    }

    /// Save and remove departing participants.
    ///
    /// A participant whose save fails stays in the world so the caller can
    /// retry.
    pub async fn leave(&mut self, departed: &[OwnerKey]) -> Result<(), MatchError> {
        let mut failed = Vec::new();
        let mut first_error = None;

        for owner in departed {
            self.pending_joins.remove(owner);
            if !self.state.contains(owner) {
                continue;
            }

            match save_player(self.storage.as_ref(), &self.state, owner).await {
                Ok(()) => {
                    self.state.remove(owner);
                    info!("{} left ({} in world)", owner, self.state.len());
                }
                Err(e) => {
                    warn!("Error saving player data for {}: {}", owner, e);
                    failed.push(owner.clone());
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(source) => Err(MatchError::Persistence { failed, source }),
        }
    }

    /// Run one tick over a batch of inbound messages, in arrival order.
    ///
    /// Returns the messages to deliver, in order.
    pub async fn tick(&mut self, messages: Vec<MatchData>) -> Vec<Broadcast> {
        if self.lifecycle != MatchLifecycle::Active {
            return Vec::new();
        }
        self.tick += 1;

        let mut out = Vec::new();
        for msg in messages {
            let Some(reduce) = command::reducer(msg.op_code) else {
                warn!("Unknown opcode {} from {}", msg.op_code, msg.sender);
                continue;
            };

            if let Err(e) = reduce(&msg, &mut self.state) {
                warn!("Error handling opcode {} from {}: {}", msg.op_code, msg.sender, e);
                continue;
            }

            match OpCode::from_code(msg.op_code) {
                Some(OpCode::DoSpawn) => self.spawn(msg, &mut out).await,
                Some(OpCode::UpdateColor) => out.push(Broadcast::relay(msg)),
                _ => {}
            }
        }

        match UpdateState::from_state(&self.state).to_payload() {
            Ok(data) => out.push(Broadcast::server(OpCode::UpdateState, data, Recipients::All)),
            Err(e) => warn!("Could not encode match state: {}", e),
        }

        self.state.clear_jumps();
        out
    }

    /// Reconcile a spawning participant and announce them.
    async fn spawn(&mut self, msg: MatchData, out: &mut Vec<Broadcast>) {
        let owner = msg.sender.clone();
        if !self.state.contains(&owner) {
            debug!("Spawn from {} who is no longer in the world", owner);
            return;
        }

        let spawn: DoSpawn = match command::decode(OpCode::DoSpawn, &msg.data) {
            Ok(spawn) => spawn,
            Err(e) => {
                warn!("Error decoding spawn from {}: {}", owner, e);
                return;
            }
        };

        self.state.set_name(&owner, spawn.id);

        let position = match load_player(self.storage.as_ref(), &self.state, &owner).await {
            Ok(Some(position)) => position,
            Ok(None) => SPAWN_POSITION,
            Err(e) => {
                warn!("Error retrieving player data for {}: {}", owner, e);
                SPAWN_POSITION
            }
        };
        if let Some(current) = self.state.position_mut(&owner) {
            *current = position;
        }

        match InitialState::from_state(&self.state).to_payload() {
            Ok(data) => out.push(Broadcast::server(
                OpCode::InitialState,
                data,
                Recipients::Only(vec![owner.clone()]),
            )),
            Err(e) => warn!("Could not encode initial state: {}", e),
        }

        info!(
            "{} spawned as {:?} at ({:.1}, {:.1})",
            owner,
            self.state.name(&owner).unwrap_or_default(),
            position.x,
            position.y
        );
        out.push(Broadcast::relay(msg));
    }

    /// Save every participant's position and stop the match.
    ///
    /// Participants stay in the world; every write has finished when this
    /// returns.
    pub async fn terminate(&mut self, grace_seconds: u32) -> Result<(), MatchError> {
        info!(
            "Terminating match with {} players (grace {}s)",
            self.state.len(),
            grace_seconds
        );
        self.lifecycle = MatchLifecycle::Terminated;

        let owners: Vec<OwnerKey> = self.state.owner_keys().cloned().collect();
        let mut failed = Vec::new();
        let mut first_error = None;

        for owner in owners {
            if let Err(e) = save_player(self.storage.as_ref(), &self.state, &owner).await {
                warn!("Error saving player data for {}: {}", owner, e);
                failed.push(owner);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(source) => Err(MatchError::Persistence { failed, source }),
        }
    }

    /// External control hook. Echoes the payload.
    pub fn signal(&self, data: String) -> String {
        data
    }

    /// Current world state.
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Current lifecycle stage.
    pub fn lifecycle(&self) -> MatchLifecycle {
        self.lifecycle
    }

    /// Number of ticks run.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::messages::{InitialState, MatchMessage, UpdateState};
    use crate::game::state::{Color, Input};
    use crate::storage::{MemoryStorage, ObjectAck, ObjectId, StorageObject, StorageWrite};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    const SPAWN_HERO: &str = r#"{"id":"Hero","col":{"r":1.0,"g":0.0,"b":0.0,"a":1.0},"nm":"Hero"}"#;

    /// Memory storage whose reads and writes can be switched off.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl StorageBackend for FlakyStorage {
        async fn read(&self, id: &ObjectId) -> Result<Option<StorageObject>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk unreadable".to_string()));
            }
            self.inner.read(id).await
        }

        async fn write(&self, write: StorageWrite) -> Result<ObjectAck, StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk on fire".to_string()));
            }
            self.inner.write(write).await
        }
    }

    fn presence(id: &str) -> (Presence, mpsc::Receiver<MatchMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (Presence::new(OwnerKey::new(id), id, tx), rx)
    }

    fn active_match(storage: Arc<dyn StorageBackend>) -> WorldMatch {
        let mut world = WorldMatch::new(storage);
        world.init();
        world
    }

    fn join(world: &mut WorldMatch, id: &str) -> mpsc::Receiver<MatchMessage> {
        let (p, rx) = presence(id);
        assert!(world.join_attempt(&p.user_id).is_accepted());
        world.join(vec![p]);
        rx
    }

    fn data(op: OpCode, sender: &str, body: &str) -> MatchData {
        MatchData::new(op.code(), OwnerKey::new(sender), body)
    }

    fn of_op(out: &[Broadcast], op: OpCode) -> Vec<&Broadcast> {
        out.iter().filter(|b| b.op_code == op.code()).collect()
    }

    #[test]
    fn test_init() {
        let mut world = WorldMatch::new(Arc::new(MemoryStorage::new()));
        assert_eq!(world.lifecycle(), MatchLifecycle::Uninitialized);

        let init = world.init();
        assert_eq!(init.tick_rate, 10);
        assert_eq!(init.label, MATCH_LABEL);
        assert_eq!(world.lifecycle(), MatchLifecycle::Active);
        assert!(world.state().is_empty());
    }

    #[test]
    fn test_join_creates_placeholders() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");
        let _b = join(&mut world, "b");

        let state = world.state();
        assert_eq!(state.len(), 2);
        assert_eq!(state.name(&"a".into()), Some("user_1"));
        assert_eq!(state.name(&"b".into()), Some("user_2"));
        assert_eq!(state.position(&"a".into()), Some(&Position::default()));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_duplicate_join_attempt_rejected() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let (first, _rx1) = presence("a");
        let (second, _rx2) = presence("a");

        // Both attempts arrive before either join lands
        assert!(world.join_attempt(&first.user_id).is_accepted());
        let decision = world.join_attempt(&second.user_id);
        match decision {
            JoinDecision::Reject { reason } => assert!(!reason.is_empty()),
            JoinDecision::Accept => panic!("duplicate join accepted"),
        }

        world.join(vec![first]);
        assert_eq!(world.state().len(), 1);
        assert!(!world.join_attempt(&"a".into()).is_accepted());
        assert!(world.state().is_consistent());
    }

    #[test]
    fn test_join_attempt_rejected_when_not_running() {
        let mut world = WorldMatch::new(Arc::new(MemoryStorage::new()));
        assert!(!world.join_attempt(&"a".into()).is_accepted());
    }

    #[tokio::test]
    async fn test_spawn_without_record() {
        let storage = Arc::new(MemoryStorage::new());
        let mut world = active_match(storage);
        let _a = join(&mut world, "a");
        let _b = join(&mut world, "b");

        let out = world.tick(vec![data(OpCode::DoSpawn, "a", SPAWN_HERO)]).await;

        let initial = of_op(&out, OpCode::InitialState);
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].recipients, Recipients::Only(vec![OwnerKey::new("a")]));
        let snapshot: InitialState = serde_json::from_slice(&initial[0].data).unwrap();
        assert_eq!(snapshot.positions[&OwnerKey::new("a")], SPAWN_POSITION);
        assert_eq!(snapshot.names[&OwnerKey::new("a")], "Hero");
        assert_eq!(snapshot.colors[&OwnerKey::new("a")], Color::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(snapshot.names[&OwnerKey::new("b")], "user_2");

        let relayed = of_op(&out, OpCode::DoSpawn);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].recipients, Recipients::All);
        assert_eq!(relayed[0].data, SPAWN_HERO.as_bytes());
        assert_eq!(relayed[0].sender, Some(OwnerKey::new("a")));

        // Initial state goes out before the relay, heartbeat last
        let order: Vec<i64> = out.iter().map(|b| b.op_code).collect();
        assert_eq!(order, vec![7, 5, 3]);
    }

    #[tokio::test]
    async fn test_spawn_restores_saved_position() {
        let storage = Arc::new(MemoryStorage::new());

        let mut first = active_match(storage.clone());
        let _rx = join(&mut first, "a");
        first.tick(vec![data(OpCode::DoSpawn, "a", SPAWN_HERO)]).await;
        first
            .tick(vec![data(
                OpCode::UpdatePosition,
                "a",
                r#"{"id":"a","position":{"x":42.0,"y":17.0}}"#,
            )])
            .await;
        first.leave(&["a".into()]).await.unwrap();
        assert!(first.state().is_empty());

        let mut second = active_match(storage);
        let _rx = join(&mut second, "a");
        second.tick(vec![data(OpCode::DoSpawn, "a", SPAWN_HERO)]).await;

        assert_eq!(second.state().position(&"a".into()), Some(&Position::new(42.0, 17.0)));
    }

    #[tokio::test]
    async fn test_spawn_read_error_uses_default() {
        let storage = Arc::new(FlakyStorage::default());
        let mut world = active_match(storage.clone());
        let _a = join(&mut world, "a");
        storage.fail_reads.store(true, Ordering::SeqCst);

        let out = world.tick(vec![data(OpCode::DoSpawn, "a", SPAWN_HERO)]).await;

        let initial = of_op(&out, OpCode::InitialState);
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].recipients, Recipients::Only(vec![OwnerKey::new("a")]));
        let snapshot: InitialState = serde_json::from_slice(&initial[0].data).unwrap();
        assert_eq!(snapshot.positions[&OwnerKey::new("a")], SPAWN_POSITION);

        let relayed = of_op(&out, OpCode::DoSpawn);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].data, SPAWN_HERO.as_bytes());

        let order: Vec<i64> = out.iter().map(|b| b.op_code).collect();
        assert_eq!(order, vec![7, 5, 3]);
    }

    #[tokio::test]
    async fn test_spawn_from_departed_sender_is_ignored() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));

        let out = world.tick(vec![data(OpCode::DoSpawn, "ghost", SPAWN_HERO)]).await;

        assert!(of_op(&out, OpCode::InitialState).is_empty());
        assert!(of_op(&out, OpCode::DoSpawn).is_empty());
        assert_eq!(of_op(&out, OpCode::UpdateState).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_spawn_is_not_relayed() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");

        let out = world.tick(vec![data(OpCode::DoSpawn, "a", r#"{"id":"Hero"}"#)]).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].op_code, OpCode::UpdateState.code());
        assert_eq!(world.state().name(&"a".into()), Some("user_1"));
    }

    #[tokio::test]
    async fn test_update_color_is_relayed() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");
        let body = r#"{"id":"a","color":{"r":0.0,"g":0.0,"b":1.0,"a":1.0}}"#;

        let out = world
            .tick(vec![
                data(OpCode::UpdateColor, "a", body),
                data(OpCode::UpdateColor, "a", "{broken"),
            ])
            .await;

        let relayed = of_op(&out, OpCode::UpdateColor);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].data, body.as_bytes());
        assert_eq!(relayed[0].recipients, Recipients::All);
    }

    #[tokio::test]
    async fn test_unknown_opcode_does_not_block_batch() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");

        let out = world
            .tick(vec![
                data(OpCode::UpdateInput, "a", r#"{"id":"a","input":1.0}"#),
                MatchData::new(99, "a".into(), "whatever"),
                MatchData::new(OpCode::UpdateState.code(), "a".into(), "{}"),
                data(OpCode::UpdatePosition, "a", r#"{"id":"a","position":{"x":3.0,"y":4.0}}"#),
            ])
            .await;

        assert_eq!(world.state().input(&"a".into()).unwrap().direction, 1.0);
        assert_eq!(world.state().position(&"a".into()), Some(&Position::new(3.0, 4.0)));
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_update_state_every_tick() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");

        for expected_tick in 1..=3 {
            let out = world.tick(Vec::new()).await;
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].recipients, Recipients::All);

            let snapshot: UpdateState = serde_json::from_slice(&out[0].data).unwrap();
            assert_eq!(snapshot.positions.len(), 1);
            assert_eq!(snapshot.inputs[&OwnerKey::new("a")], Input::default());
            assert_eq!(world.current_tick(), expected_tick);
        }
    }

    #[tokio::test]
    async fn test_jump_is_a_single_tick_pulse() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        let _a = join(&mut world, "a");

        let out = world.tick(vec![data(OpCode::UpdateJump, "a", r#"{"id":"a"}"#)]).await;
        let snapshot: UpdateState = serde_json::from_slice(&out[0].data).unwrap();
        assert!(snapshot.inputs[&OwnerKey::new("a")].jump);
        assert!(!world.state().input(&"a".into()).unwrap().jump);

        let out = world.tick(Vec::new()).await;
        let snapshot: UpdateState = serde_json::from_slice(&out[0].data).unwrap();
        assert!(!snapshot.inputs[&OwnerKey::new("a")].jump);
    }

    #[tokio::test]
    async fn test_leave_persists_and_removes() {
        let storage = Arc::new(MemoryStorage::new());
        let mut world = active_match(storage.clone());
        let _a = join(&mut world, "a");
        let _b = join(&mut world, "b");
        world.tick(vec![data(OpCode::DoSpawn, "a", SPAWN_HERO)]).await;
        world
            .tick(vec![data(
                OpCode::UpdatePosition,
                "a",
                r#"{"id":"a","position":{"x":42.0,"y":17.0}}"#,
            )])
            .await;

        world.leave(&["a".into()]).await.unwrap();

        assert!(!world.state().contains(&"a".into()));
        assert!(world.state().contains(&"b".into()));
        assert!(world.state().is_consistent());

        let id = ObjectId::new("player_data", "position_Hero", Some(OwnerKey::new("a")));
        let object = storage.read(&id).await.unwrap().unwrap();
        assert_eq!(object.decode::<Position>().unwrap(), Position::new(42.0, 17.0));
    }

    #[tokio::test]
    async fn test_leave_failure_keeps_player_live() {
        let storage = Arc::new(FlakyStorage::default());
        let mut world = active_match(storage.clone());
        let _a = join(&mut world, "a");
        let _b = join(&mut world, "b");

        storage.fail_writes.store(true, Ordering::SeqCst);
        let err = world.leave(&["a".into(), "b".into()]).await.unwrap_err();
        let MatchError::Persistence { failed, .. } = err;
        assert_eq!(failed, vec![OwnerKey::new("a"), OwnerKey::new("b")]);
        assert_eq!(world.state().len(), 2);
        assert!(world.state().is_consistent());

        // Retry once storage recovers
        storage.fail_writes.store(false, Ordering::SeqCst);
        world.leave(&failed).await.unwrap();
        assert!(world.state().is_empty());
    }

    #[tokio::test]
    async fn test_leave_unknown_is_noop() {
        let mut world = active_match(Arc::new(MemoryStorage::new()));
        world.leave(&["nobody".into()]).await.unwrap();
        assert!(world.state().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_saves_everyone_without_removing() {
        let storage = Arc::new(MemoryStorage::new());
        let mut world = active_match(storage.clone());
        let _a = join(&mut world, "a");
        let _b = join(&mut world, "b");

        world.terminate(5).await.unwrap();

        assert_eq!(world.lifecycle(), MatchLifecycle::Terminated);
        assert_eq!(world.state().len(), 2);
        assert_eq!(storage.len().await, 2);

        // No more ticks or joins once terminated
        assert!(world.tick(Vec::new()).await.is_empty());
        assert!(!world.join_attempt(&"c".into()).is_accepted());
    }

    #[tokio::test]
    async fn test_terminate_reports_failures() {
        let storage = Arc::new(FlakyStorage::default());
        let mut world = active_match(storage.clone());
        let _a = join(&mut world, "a");
        storage.fail_writes.store(true, Ordering::SeqCst);

        let err = world.terminate(0).await.unwrap_err();
        assert!(err.to_string().contains("1 player(s)"));
    }

    #[test]
    fn test_signal_echoes() {
        let world = active_match(Arc::new(MemoryStorage::new()));
        assert_eq!(world.signal("reload".to_string()), "reload");
    }

    proptest! {
        #[test]
        fn prop_jump_never_outlives_tick(jumps in proptest::collection::vec(proptest::collection::vec(0u8..4, 0..6), 1..8)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let mut world = active_match(Arc::new(MemoryStorage::new()));
                let mut receivers = Vec::new();
                for id in 0..4 {
                    receivers.push(join(&mut world, &format!("p{}", id)));
                }

                for batch in jumps {
                    let messages = batch
                        .iter()
                        .map(|id| {
                            let owner = format!("p{}", id);
                            data(OpCode::UpdateJump, &owner, &format!(r#"{{"id":"{}"}}"#, owner))
                        })
                        .collect();
                    world.tick(messages).await;

                    assert!(world.state().inputs().values().all(|input| !input.jump));
                    assert!(world.state().is_consistent());
                }
            });
        }
    }
}
