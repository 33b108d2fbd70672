//! The progress engine: single owner of the canonical [`ProgressState`].
//!
//! Every mutation runs its synchronous transition under the session lock and
//! publishes the result before the first `.await`. Local persistence follows
//! immediately; remote writes come last and can only degrade to local-only,
//! never undo a commit.

mod actions;
mod invites;
mod session;
mod sync;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use ritual_core::{
    JournalEntry, LeagueTable, LevelUp, LevelUpQueue, MarkUnlock, ProgressCache, ProgressState,
    XpAward,
};
use ritual_store::DynKvStore;
use serde::Serialize;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::Notification;
use crate::moderation::{AllowAll, Moderator};
use crate::remote::{Channel, ChannelState, RemotePersistence};
use crate::state_store::ProgressStateStore;

pub use actions::ProfileEdit;
pub use invites::ClaimOutcome;
pub use session::{HydrationReport, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    SignedOut,
    Hydrating,
    Ready,
}

/// Per-identity bookkeeping that is not part of the persisted state.
#[derive(Debug, Default)]
struct Session {
    identity: Option<Identity>,
    phase: Phase,
    generation: u64,
    channels: ChannelState,
    level_ups: LevelUpQueue,
    notifications: VecDeque<Notification>,
    pending_entries: VecDeque<JournalEntry>,
    pending_follows: BTreeMap<String, bool>,
    claims_in_flight: BTreeSet<String>,
}

impl Session {
    /// Identity and generation of a hydrated session.
    fn ready(&self) -> EngineResult<(String, u64)> {
        match (self.phase, &self.identity) {
            (Phase::Ready, Some(identity)) => Ok((identity.id.clone(), self.generation)),
            (Phase::Hydrating, _) => Err(EngineError::NotHydrated),
            _ => Err(EngineError::NoSession),
        }
    }

    /// Start over for a new identity (or none). Bumps the generation so work
    /// still in flight for the previous session is discarded.
    fn restart(&mut self, identity: Option<Identity>, phase: Phase) -> u64 {
        let generation = self.generation + 1;
        *self = Session {
            identity,
            phase,
            generation,
            ..Session::default()
        };
        generation
    }

    fn record_award(&mut self, award: &XpAward) {
        self.level_ups.extend(award.level_ups.iter().cloned());
    }

    fn record_unlocks(&mut self, unlocked: &[MarkUnlock]) {
        self.notifications
            .extend(unlocked.iter().cloned().map(Notification::MarkUnlocked));
    }
}

/// League standing derived from total XP.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueStatus {
    pub index: usize,
    pub name: &'static str,
    pub progress_percent: f64,
    pub total_xp: u64,
}

pub struct ProgressEngine {
    config: EngineConfig,
    table: LeagueTable,
    cache: ProgressCache,
    remote: Option<Arc<dyn RemotePersistence>>,
    moderator: Arc<dyn Moderator>,
    clock: Arc<dyn Clock>,
    state: ProgressStateStore,
    session: Mutex<Session>,
}

impl std::fmt::Debug for ProgressEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEngine")
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

pub struct EngineBuilder {
    store: DynKvStore,
    config: EngineConfig,
    remote: Option<Arc<dyn RemotePersistence>>,
    moderator: Arc<dyn Moderator>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemotePersistence>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderator = moderator;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ProgressEngine {
        let cache = ProgressCache::new(self.store, self.config.cache.clone());
        ProgressEngine {
            table: LeagueTable::new(self.config.rewards.league_threshold),
            config: self.config,
            cache,
            remote: self.remote,
            moderator: self.moderator,
            clock: self.clock,
            state: ProgressStateStore::new(),
            session: Mutex::new(Session::default()),
        }
    }
}

impl ProgressEngine {
    pub fn builder(store: DynKvStore) -> EngineBuilder {
        EngineBuilder {
            store,
            config: EngineConfig::default(),
            remote: None,
            moderator: Arc::new(AllowAll),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ProgressCache {
        &self.cache
    }

    /// Current snapshot. Cheap; shares the published state.
    pub fn snapshot(&self) -> Arc<ProgressState> {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ProgressState>> {
        self.state.subscribe()
    }

    pub fn state_store(&self) -> &ProgressStateStore {
        &self.state
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().phase == Phase::Ready
    }

    pub fn league(&self) -> LeagueStatus {
        let total_xp = self.state.get().total_xp;
        let index = self.table.index_of(total_xp);
        LeagueStatus {
            index,
            name: self.table.name(index),
            progress_percent: self.table.progress_percent(total_xp),
            total_xp,
        }
    }

    /// Streak as of today, zero once a day was missed.
    pub fn current_streak(&self) -> u32 {
        ritual_core::streak::effective_streak(&self.state.get(), self.clock.today())
    }

    /// Oldest level-up not yet acknowledged.
    pub fn next_level_up(&self) -> Option<LevelUp> {
        self.lock().level_ups.peek().cloned()
    }

    pub fn acknowledge_level_up(&self) -> Option<LevelUp> {
        self.lock().level_ups.acknowledge()
    }

    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.lock().notifications.drain(..).collect()
    }

    pub fn disabled_channels(&self) -> Vec<Channel> {
        self.lock().channels.disabled().collect()
    }

    pub fn pending_uploads(&self) -> usize {
        let session = self.lock();
        session.pending_entries.len() + session.pending_follows.len()
    }

    /// Whether changes for `channel` should be queued for upload.
    fn uploads_to(&self, session: &Session, channel: Channel) -> bool {
        self.remote.is_some() && session.channels.is_enabled(channel)
    }

    /// Fails with `NoSession` once the session `generation` belonged to was
    /// signed out or replaced.
    fn ensure_current(&self, generation: u64) -> EngineResult<()> {
        if self.lock().generation == generation {
            Ok(())
        } else {
            Err(EngineError::NoSession)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a state transition atomically against the hydrated state.
    ///
    /// `f` works on a copy; the copy is published only if `f` succeeds. With
    /// `generation` set, the transition is refused if the session changed
    /// since that generation was observed.
    fn commit<R>(
        &self,
        generation: Option<u64>,
        f: impl FnOnce(&mut ProgressState, &mut Session) -> EngineResult<R>,
    ) -> EngineResult<(String, u64, R)> {
        let mut session = self.lock();
        let (identity, current) = session.ready()?;
        if generation.is_some_and(|g| g != current) {
            return Err(EngineError::NoSession);
        }
        let mut state = ProgressState::clone(&self.state.get());
        let out = f(&mut state, &mut session)?;
        self.state.set(state);
        Ok((identity, current, out))
    }
}
