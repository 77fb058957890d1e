//! Session orchestration: start, end, cooldowns, reconciliation, recovery

use buildmode_api::{
    ActionKind, ActionVerdict, Effect, GameMode, InventorySnapshot, ItemStack, PendingRestoreInfo,
    SessionEndReason, SessionInfo, UserStatus,
};
use buildmode_config::{PolicyConfiguration, SessionSettings};
use buildmode_store::{
    AuditEvent, AuditEventType, CooldownRecord, PersistedState, Store, StoreResult,
};
use buildmode_util::{saturating_elapsed, UserId};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    CoreEvent, PendingRestore, PolicyEngine, Session, SessionError, SessionLength, SessionStore,
};

/// Result of a successful start
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub session: SessionInfo,
    /// Clear holdings, grant elevated mode, hand out the tool
    pub effects: Vec<Effect>,
    pub event: CoreEvent,
}

/// Result of a successful end
#[derive(Debug, Clone)]
pub struct EndOutcome {
    /// Clear, restore saved holdings, restore mode
    pub effects: Vec<Effect>,
    pub duration: Duration,
    pub event: CoreEvent,
}

/// What to do when a user connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A restore deferred while the user was away is released
    RestoreApplied {
        effects: Vec<Effect>,
        event: CoreEvent,
    },
    /// The stored session ran out before the sweep caught it
    ExpiredWhileAway {
        effects: Vec<Effect>,
        event: CoreEvent,
    },
    /// Session still running; put the user back into the elevated mode
    Resumed { effects: Vec<Effect> },
    /// Nothing to do
    NoSession,
}

impl ReconnectOutcome {
    pub fn effects(&self) -> &[Effect] {
        match self {
            ReconnectOutcome::RestoreApplied { effects, .. }
            | ReconnectOutcome::ExpiredWhileAway { effects, .. }
            | ReconnectOutcome::Resumed { effects } => effects,
            ReconnectOutcome::NoSession => &[],
        }
    }

    pub fn event(&self) -> Option<&CoreEvent> {
        match self {
            ReconnectOutcome::RestoreApplied { event, .. }
            | ReconnectOutcome::ExpiredWhileAway { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Owns every session, cooldown and pending restore, plus the policy
/// consulted while sessions are active.
///
/// Never reads the clock or touches the host: callers pass `now` and apply
/// the returned effects. A restore produced by expiry stays pending until
/// the host acknowledges it or the user reconnects.
pub struct SessionManager {
    settings: SessionSettings,
    policy: PolicyEngine,
    sessions: SessionStore,
    pending: BTreeMap<UserId, PendingRestore>,
    store: Arc<dyn Store>,
}

impl SessionManager {
    /// Create a manager with no sessions
    pub fn new(
        settings: SessionSettings,
        policy: PolicyConfiguration,
        store: Arc<dyn Store>,
    ) -> Self {
        info!(
            duration_secs = settings.duration.as_secs(),
            cooldown_secs = settings.cooldown.as_secs(),
            tool_item = %settings.tool_item,
            mode = ?policy.mode,
            "Session manager initialized"
        );

        let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            mode: policy.mode,
            listed_items: policy.active_list_len(),
        }));

        Self {
            settings,
            policy: PolicyEngine::new(policy),
            sessions: SessionStore::new(),
            pending: BTreeMap::new(),
            store,
        }
    }

    /// Create a manager and reload what the last [`persist`](Self::persist)
    /// saved. Sessions whose deadline already passed are dropped without a
    /// restore. A failed load leaves the manager empty.
    pub fn recover(
        settings: SessionSettings,
        policy: PolicyConfiguration,
        store: Arc<dyn Store>,
        now: DateTime<Local>,
    ) -> Self {
        let mut manager = Self::new(settings, policy, store);

        let state = match manager.store.load_state() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted sessions, starting empty");
                return manager;
            }
        };

        let mut dropped = 0usize;
        for record in state.sessions {
            let session = Session::from(record);
            if session.is_expired(now) {
                info!(
                    user_id = %session.user_id,
                    "Discarding session that expired while the service was down"
                );
                dropped += 1;
                continue;
            }
            manager.sessions.restore_session(session);
        }

        for cooldown in state.cooldowns {
            manager
                .sessions
                .restore_cooldown(cooldown.user_id, cooldown.last_end);
        }

        for record in state.pending_restores {
            manager
                .pending
                .insert(record.user_id, PendingRestore::from(record));
        }

        info!(
            sessions = manager.sessions.len(),
            dropped,
            pending_restores = manager.pending.len(),
            "Recovered persisted state"
        );

        manager
    }

    /// Write every session, cooldown and pending restore to the store
    pub fn persist(&self) -> StoreResult<()> {
        let state = PersistedState {
            sessions: self
                .sessions
                .snapshot_all()
                .into_iter()
                .map(|(_, s)| s.to_record())
                .collect(),
            cooldowns: self
                .sessions
                .cooldowns()
                .into_iter()
                .map(|(user_id, last_end)| CooldownRecord { user_id, last_end })
                .collect(),
            pending_restores: self.pending.values().map(PendingRestore::to_record).collect(),
        };

        self.store.save_state(&state)?;

        info!(
            sessions = state.sessions.len(),
            cooldowns = state.cooldowns.len(),
            pending_restores = state.pending_restores.len(),
            "Persisted session state"
        );
        Ok(())
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Start a session for `user`, capturing the reported mode and holdings
    pub fn start(
        &mut self,
        user: UserId,
        current_mode: GameMode,
        current_inventory: InventorySnapshot,
        privileged: bool,
        now: DateTime<Local>,
    ) -> Result<StartOutcome, SessionError> {
        if let Err(e) = self.check_can_start(user, now) {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::StartDenied {
                user_id: user,
                reason: e.to_string(),
            }));
            debug!(user_id = %user, error = %e, "Start denied");
            return Err(e);
        }

        let length = if privileged {
            SessionLength::Unlimited
        } else {
            SessionLength::Timed(self.settings.duration)
        };

        let session = Session::new(user, length, current_mode, current_inventory, now)
            .ok_or(SessionError::DeadlineOverflow)?;
        let deadline = session.deadline;
        let info = session.to_session_info(now);
        self.sessions.put(session)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionStarted {
            user_id: user,
            deadline,
            privileged,
        }));

        match deadline {
            Some(deadline) => info!(user_id = %user, deadline = %deadline, "Session started"),
            None => info!(user_id = %user, "Session started (unlimited)"),
        }

        Ok(StartOutcome {
            session: info,
            effects: vec![
                Effect::ClearInventory,
                Effect::SetGameMode {
                    mode: GameMode::ELEVATED,
                },
                Effect::GrantItem {
                    item_type: self.settings.tool_item.clone(),
                    amount: 1,
                },
            ],
            event: CoreEvent::SessionStarted {
                user_id: user,
                deadline,
            },
        })
    }

    fn check_can_start(&self, user: UserId, now: DateTime<Local>) -> Result<(), SessionError> {
        if self.sessions.has(user) {
            return Err(SessionError::AlreadyActive);
        }

        // The host may still hold the user in the elevated state
        if self.pending.contains_key(&user) {
            return Err(SessionError::RestorePending);
        }

        let remaining = self.cooldown_remaining(user, now);
        if !remaining.is_zero() {
            return Err(SessionError::OnCooldown { remaining });
        }

        Ok(())
    }

    /// End the user's session and return the restore effects
    pub fn end(
        &mut self,
        user: UserId,
        reason: SessionEndReason,
        now: DateTime<Local>,
    ) -> Result<EndOutcome, SessionError> {
        let session = self
            .sessions
            .remove(user, now)
            .ok_or(SessionError::NotActive)?;

        let duration = session.duration_so_far(now);
        let effects = session.restore_effects();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionEnded {
            user_id: user,
            reason,
            duration,
        }));

        info!(
            user_id = %user,
            reason = ?reason,
            duration_secs = duration.as_secs(),
            "Session ended"
        );

        let event = match reason {
            SessionEndReason::Expired => CoreEvent::SessionExpired {
                user_id: user,
                duration,
                effects: effects.clone(),
            },
            SessionEndReason::UserStop => CoreEvent::SessionEnded {
                user_id: user,
                reason,
                duration,
                effects: effects.clone(),
            },
        };

        Ok(EndOutcome {
            effects,
            duration,
            event,
        })
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.sessions.has(user)
    }

    pub fn session(&self, user: UserId) -> Option<&Session> {
        self.sessions.get(user)
    }

    /// Whole seconds left: 0 when inactive, `u64::MAX` when unlimited
    pub fn remaining_seconds(&self, user: UserId, now: DateTime<Local>) -> u64 {
        match self.sessions.get(user) {
            None => 0,
            Some(session) => session
                .time_remaining(now)
                .map_or(u64::MAX, |d| d.as_secs()),
        }
    }

    /// Time until `user` may start again; zero when not cooling down
    pub fn cooldown_remaining(&self, user: UserId, now: DateTime<Local>) -> Duration {
        match self.sessions.last_end(user) {
            Some(last_end) => self
                .settings
                .cooldown
                .saturating_sub(saturating_elapsed(now, last_end)),
            None => Duration::ZERO,
        }
    }

    pub fn is_on_cooldown(&self, user: UserId, now: DateTime<Local>) -> bool {
        !self.cooldown_remaining(user, now).is_zero()
    }

    /// Status answer for display collaborators
    pub fn status(&self, user: UserId, now: DateTime<Local>) -> UserStatus {
        let cooldown = self.cooldown_remaining(user, now);
        UserStatus {
            user_id: user,
            active: self.is_active(user),
            remaining_seconds: self.remaining_seconds(user, now),
            on_cooldown: !cooldown.is_zero(),
            cooldown_remaining_seconds: cooldown.as_secs(),
        }
    }

    /// Every active session, ordered by user
    pub fn list_active(&self, now: DateTime<Local>) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|s| s.to_session_info(now))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pending_restore_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_restore(&self, user: UserId) -> bool {
        self.pending.contains_key(&user)
    }

    /// Every restore not yet acknowledged, ordered by user
    pub fn pending_restores(&self) -> Vec<PendingRestoreInfo> {
        self.pending
            .values()
            .map(|p| PendingRestoreInfo {
                user_id: p.user_id,
                expired_at: p.expired_at,
                effects: p.restore_effects(),
            })
            .collect()
    }

    /// The host applied the restore for `user`; forget it
    pub fn acknowledge_restore(&mut self, user: UserId) -> Result<(), SessionError> {
        let pending = self
            .pending
            .remove(&user)
            .ok_or(SessionError::NoPendingRestore)?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RestoreApplied { user_id: user }));

        info!(user_id = %user, expired_at = %pending.expired_at, "Restore acknowledged");
        Ok(())
    }

    /// Queue a restore. An older pending restore holds the state from before
    /// any session and wins.
    fn hold_restore(&mut self, restore: PendingRestore) -> Vec<Effect> {
        let user = restore.user_id;
        match self.pending.get(&user) {
            Some(earlier) => {
                warn!(user_id = %user, "Restore already pending, keeping the earlier snapshot");
                earlier.restore_effects()
            }
            None => {
                let effects = restore.restore_effects();
                self.pending.insert(user, restore);
                effects
            }
        }
    }

    /// Push back the deadline of a timed session (admin action)
    pub fn extend(
        &mut self,
        user: UserId,
        by: Duration,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, SessionError> {
        let new_deadline = self.sessions.extend(user, by)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionExtended {
            user_id: user,
            extended_by: by,
            new_deadline,
        }));

        info!(
            user_id = %user,
            extended_by_secs = by.as_secs(),
            new_deadline = %new_deadline,
            remaining_secs = self.remaining_seconds(user, now),
            "Session extended"
        );

        Ok(new_deadline)
    }

    /// End every expired session and hold its restore.
    ///
    /// Connected users get the restore effects through a `SessionExpired`
    /// event; users who are away get them from
    /// [`user_connected`](Self::user_connected). Either way the restore stays
    /// listed in [`pending_restores`](Self::pending_restores) until consumed.
    pub fn reconcile(
        &mut self,
        now: DateTime<Local>,
        is_connected: impl Fn(UserId) -> bool,
    ) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        for user in self.sessions.expired_users(now) {
            let Some(session) = self.sessions.remove(user, now) else {
                warn!(user_id = %user, "Expired session vanished during sweep");
                continue;
            };

            let duration = session.duration_so_far(now);
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionEnded {
                user_id: user,
                reason: SessionEndReason::Expired,
                duration,
            }));

            let effects = self.hold_restore(PendingRestore::from_session(session, now));

            if is_connected(user) {
                info!(user_id = %user, duration_secs = duration.as_secs(), "Session expired");
                events.push(CoreEvent::SessionExpired {
                    user_id: user,
                    duration,
                    effects,
                });
            } else {
                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::RestoreDeferred { user_id: user }));
                info!(user_id = %user, "Session expired while user away, restore deferred");
                events.push(CoreEvent::RestoreDeferred {
                    user_id: user,
                    expired_at: now,
                });
            }
        }

        if !events.is_empty() {
            debug!(
                ended = events.len(),
                remaining = self.sessions.len(),
                pending_restores = self.pending.len(),
                "Reconciliation sweep"
            );
        }

        events
    }

    /// Handle a user joining the host
    pub fn user_connected(&mut self, user: UserId, now: DateTime<Local>) -> ReconnectOutcome {
        if let Some(pending) = self.pending.remove(&user) {
            let effects = pending.restore_effects();
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::RestoreApplied { user_id: user }));
            info!(
                user_id = %user,
                expired_at = %pending.expired_at,
                "Applying deferred restore"
            );
            return ReconnectOutcome::RestoreApplied {
                event: CoreEvent::RestoreApplied {
                    user_id: user,
                    effects: effects.clone(),
                },
                effects,
            };
        }

        let Some(session) = self.sessions.get(user) else {
            return ReconnectOutcome::NoSession;
        };

        if session.is_expired(now) {
            return match self.end(user, SessionEndReason::Expired, now) {
                Ok(outcome) => ReconnectOutcome::ExpiredWhileAway {
                    effects: outcome.effects.clone(),
                    event: CoreEvent::SessionEnded {
                        user_id: user,
                        reason: SessionEndReason::Expired,
                        duration: outcome.duration,
                        effects: outcome.effects,
                    },
                },
                Err(e) => {
                    warn!(user_id = %user, error = %e, "Failed to end expired session on reconnect");
                    ReconnectOutcome::NoSession
                }
            };
        }

        debug!(user_id = %user, "Resuming session on reconnect");
        ReconnectOutcome::Resumed {
            effects: vec![Effect::SetGameMode {
                mode: GameMode::ELEVATED,
            }],
        }
    }

    /// Decide whether a restricted action may proceed.
    ///
    /// Restrictions apply from start until the restore has been handed out,
    /// so a user whose session expired keeps them while still elevated.
    pub fn evaluate_action(
        &self,
        user: UserId,
        action: &ActionKind,
        item: Option<&ItemStack>,
    ) -> ActionVerdict {
        if !self.sessions.has(user) && !self.pending.contains_key(&user) {
            return ActionVerdict::Allow;
        }

        let verdict = self.policy.evaluate(action, item);
        if !verdict.is_allowed() {
            debug!(user_id = %user, action = ?action, verdict = ?verdict, "Action denied");
        }
        verdict
    }

    /// Swap settings and policy. Session state is untouched; running
    /// sessions keep their deadlines.
    pub fn reload(&mut self, settings: SessionSettings, policy: PolicyConfiguration) -> CoreEvent {
        let mode = policy.mode;
        let listed_items = policy.active_list_len();

        self.settings = settings;
        self.policy.swap(policy);

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            mode,
            listed_items,
        }));

        info!(mode = ?mode, listed_items, "Policy reloaded");

        CoreEvent::PolicyReloaded { mode, listed_items }
    }
}
