//! In-memory session and cooldown bookkeeping

use buildmode_util::{checked_add, UserId};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::{Session, SessionError};

/// Owns every active session and the last-end time of every user.
///
/// At most one session per user. Removing a session writes the user's
/// cooldown record in the same call.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: BTreeMap<UserId, Session>,
    cooldowns: HashMap<UserId, DateTime<Local>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    pub fn get(&self, user: UserId) -> Option<&Session> {
        self.sessions.get(&user)
    }

    /// Insert a new session. Fails without touching the existing one.
    pub fn put(&mut self, session: Session) -> Result<(), SessionError> {
        if self.sessions.contains_key(&session.user_id) {
            return Err(SessionError::AlreadyActive);
        }
        self.sessions.insert(session.user_id, session);
        Ok(())
    }

    /// Remove the user's session and record `now` as their last end
    pub fn remove(&mut self, user: UserId, now: DateTime<Local>) -> Option<Session> {
        let session = self.sessions.remove(&user)?;
        self.cooldowns.insert(user, now);
        Some(session)
    }

    /// All sessions, ordered by user
    pub fn snapshot_all(&self) -> Vec<(UserId, Session)> {
        self.sessions
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Users whose session deadline has passed at `now`
    pub fn expired_users(&self, now: DateTime<Local>) -> Vec<UserId> {
        self.sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.user_id)
            .collect()
    }

    pub fn last_end(&self, user: UserId) -> Option<DateTime<Local>> {
        self.cooldowns.get(&user).copied()
    }

    /// Every cooldown record, ordered by user
    pub fn cooldowns(&self) -> Vec<(UserId, DateTime<Local>)> {
        let mut all: Vec<_> = self.cooldowns.iter().map(|(u, t)| (*u, *t)).collect();
        all.sort_by_key(|(u, _)| *u);
        all
    }

    /// Reinstate a persisted session, replacing any in memory
    pub fn restore_session(&mut self, session: Session) {
        self.sessions.insert(session.user_id, session);
    }

    /// Reinstate a persisted cooldown record
    pub fn restore_cooldown(&mut self, user: UserId, last_end: DateTime<Local>) {
        self.cooldowns.insert(user, last_end);
    }

    /// Push a timed session's deadline back by `by`
    pub fn extend(&mut self, user: UserId, by: Duration) -> Result<DateTime<Local>, SessionError> {
        let session = self.sessions.get_mut(&user).ok_or(SessionError::NotActive)?;
        let deadline = session.deadline.ok_or(SessionError::UnlimitedSession)?;
        let new_deadline = checked_add(deadline, by).ok_or(SessionError::DeadlineOverflow)?;
        session.deadline = Some(new_deadline);
        Ok(new_deadline)
    }
}
