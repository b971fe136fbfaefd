//! Per-identity conversation sessions.
//!
//! Turns a stream of independent, stateless webhook calls into coherent
//! multi-turn conversations. Sessions are keyed by `(channel, identity)`
//! and held in an explicit in-memory table; they are not meant to survive a
//! process restart (the knowledge base is durable, conversations are not).
//!
//! Concurrency model: the registry itself is guarded by a short-lived
//! `std::sync::Mutex`; each session sits behind its own
//! `Arc<tokio::sync::Mutex>` whose guard is held for the *whole* turn
//! (lookup → query engine call → history append), so two near-simultaneous
//! events for the same identity are applied in a well-defined serial order
//! and never double-create a session. Different identities proceed in
//! parallel.
//!
//! Lifecycle: `Active → Idle` after `idle_after_secs` of silence, then
//! `Expired` (reaped) after `expire_after_secs`. A lookup that finds an
//! expired-but-not-yet-reaped session transparently starts a fresh one —
//! expiry is never a hard failure for the caller.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::SessionsConfig;
use crate::models::{Role, Turn};

/// The messaging surface a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Voice,
    Sms,
    WhatsApp,
    Chat,
    /// JSON API sessions, keyed by a caller-chosen id. Separate from
    /// [`Channel::Chat`] so an API client cannot pick a chat channel id
    /// and splice into that conversation.
    Api,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Voice => "voice",
            Channel::Sms => "sms",
            Channel::WhatsApp => "whatsapp",
            Channel::Chat => "chat",
            Channel::Api => "api",
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Idle,
    Expired,
}

/// Voice-only sub-state: where the call loop stands between webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    /// A Gather is outstanding; the next webhook carries a question.
    AwaitingSpeech,
    /// A query turn is being processed.
    Processing,
    /// We asked "another question?" and await yes/no.
    AwaitingContinue,
}

/// One conversation's state.
#[derive(Debug)]
pub struct Session {
    pub channel: Channel,
    pub identity_key: String,
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Number of user turns.
    pub turn_count: u64,
    pub state: SessionState,
    pub voice_phase: Option<VoicePhase>,
    /// Whether the current voice turn has already used its one re-prompt.
    pub reprompted: bool,
    max_history_turns: usize,
}

impl Session {
    fn new(channel: Channel, identity_key: String, max_history_turns: usize) -> Self {
        let now = Utc::now();
        Self {
            channel,
            identity_key,
            history: Vec::new(),
            created_at: now,
            last_active_at: now,
            turn_count: 0,
            state: SessionState::Active,
            voice_phase: if channel == Channel::Voice {
                Some(VoicePhase::AwaitingSpeech)
            } else {
                None
            },
            reprompted: false,
            max_history_turns,
        }
    }

    /// Append a turn, refresh the activity clock, and cap history length.
    /// User turns bump `turn_count`.
    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) {
        self.history.push(Turn::new(role, text));
        if self.history.len() > self.max_history_turns {
            let drop = self.history.len() - self.max_history_turns;
            self.history.drain(..drop);
        }
        self.last_active_at = Utc::now();
        self.state = SessionState::Active;
        if role == Role::User {
            self.turn_count += 1;
        }
    }

    /// Mark this session used without appending (e.g. command replies).
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
        self.state = SessionState::Active;
    }

    fn reset(&mut self) {
        let fresh = Session::new(
            self.channel,
            std::mem::take(&mut self.identity_key),
            self.max_history_turns,
        );
        *self = fresh;
    }

    fn silence(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.last_active_at
    }
}

type SessionHandle = Arc<AsyncMutex<Session>>;

/// The explicit session table shared by all channel adapters.
pub struct SessionManager {
    sessions: Mutex<HashMap<(Channel, String), SessionHandle>>,
    config: SessionsConfig,
}

impl SessionManager {
    pub fn new(config: SessionsConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Fetch or create the session for `(channel, identity_key)` and lock it
    /// for the duration of a turn. The returned guard is the per-key critical
    /// section: hold it across the engine call and the history appends.
    ///
    /// A session that outlived its expiry window (or was expired by the
    /// sweep but not yet reaped) is restarted in place with empty history.
    pub async fn checkout(&self, channel: Channel, identity_key: &str) -> OwnedMutexGuard<Session> {
        let handle = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions
                .entry((channel, identity_key.to_string()))
                .or_insert_with(|| {
                    Arc::new(AsyncMutex::new(Session::new(
                        channel,
                        identity_key.to_string(),
                        self.config.max_history_turns,
                    )))
                })
                .clone()
        };

        let mut guard = handle.lock_owned().await;
        let now = Utc::now();
        if guard.state == SessionState::Expired
            || guard.silence(now) > ChronoDuration::seconds(self.config.expire_after_secs as i64)
        {
            tracing::debug!(
                channel = channel.as_str(),
                "restarting expired session with empty history"
            );
            guard.reset();
        }
        guard
    }

    /// Expire a session on a channel-specific end signal (call hangup,
    /// explicit `end` command). Future lookups create a fresh session.
    pub fn end(&self, channel: Channel, identity_key: &str) {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.remove(&(channel, identity_key.to_string()))
        };
        if let Some(handle) = removed {
            // Mark expired for any turn still holding the old handle.
            if let Ok(mut guard) = handle.try_lock() {
                guard.state = SessionState::Expired;
            }
        }
    }

    /// One sweep pass: sessions silent past `idle_after_secs` become Idle,
    /// sessions silent past `expire_after_secs` are expired and reaped.
    ///
    /// Mutation only happens under the same per-key lock a live turn holds;
    /// a session whose lock is busy is mid-turn and by definition not stale.
    pub fn sweep(&self) {
        let now = Utc::now();
        let idle_after = ChronoDuration::seconds(self.config.idle_after_secs as i64);
        let expire_after = ChronoDuration::seconds(self.config.expire_after_secs as i64);

        let handles: Vec<((Channel, String), SessionHandle)> = {
            let sessions = self.sessions.lock().unwrap();
            sessions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut reap = Vec::new();
        for (key, handle) in handles {
            let Ok(mut guard) = handle.try_lock() else {
                continue;
            };
            let silence = guard.silence(now);
            if silence > expire_after {
                guard.state = SessionState::Expired;
                reap.push(key);
            } else if silence > idle_after && guard.state == SessionState::Active {
                guard.state = SessionState::Idle;
            }
        }

        if !reap.is_empty() {
            tracing::debug!(count = reap.len(), "reaping expired sessions");
            let mut sessions = self.sessions.lock().unwrap();
            for key in reap {
                sessions.remove(&key);
            }
        }
    }

    /// Spawn the periodic background sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                manager.sweep();
            }
        })
    }

    pub fn live_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(idle: u64, expire: u64) -> SessionsConfig {
        SessionsConfig {
            idle_after_secs: idle,
            expire_after_secs: expire,
            sweep_interval_secs: 60,
            max_history_turns: 4,
        }
    }

    #[tokio::test]
    async fn creates_once_per_key() {
        let mgr = SessionManager::new(config(300, 900));
        {
            let mut s = mgr.checkout(Channel::Sms, "+15551234").await;
            s.append_turn(Role::User, "hello");
        }
        {
            let s = mgr.checkout(Channel::Sms, "+15551234").await;
            assert_eq!(s.history.len(), 1);
            assert_eq!(s.turn_count, 1);
        }
        assert_eq!(mgr.live_count(), 1);
    }

    #[tokio::test]
    async fn different_channels_are_different_sessions() {
        let mgr = SessionManager::new(config(300, 900));
        {
            let mut s = mgr.checkout(Channel::Sms, "+15551234").await;
            s.append_turn(Role::User, "sms side");
        }
        {
            let s = mgr.checkout(Channel::WhatsApp, "+15551234").await;
            assert!(s.history.is_empty());
        }
        assert_eq!(mgr.live_count(), 2);
    }

    #[tokio::test]
    async fn history_is_capped_oldest_dropped() {
        let mgr = SessionManager::new(config(300, 900));
        let mut s = mgr.checkout(Channel::Sms, "a").await;
        for i in 0..6 {
            s.append_turn(Role::User, format!("m{}", i));
        }
        assert_eq!(s.history.len(), 4);
        assert_eq!(s.history[0].text, "m2");
        assert_eq!(s.turn_count, 6);
    }

    #[tokio::test]
    async fn voice_sessions_start_awaiting_speech() {
        let mgr = SessionManager::new(config(300, 900));
        let s = mgr.checkout(Channel::Voice, "CA123").await;
        assert_eq!(s.voice_phase, Some(VoicePhase::AwaitingSpeech));
        let t = mgr.checkout(Channel::Sms, "x").await;
        assert_eq!(t.voice_phase, None);
    }

    #[tokio::test]
    async fn sweep_marks_idle_then_reaps() {
        let mgr = SessionManager::new(config(0, 0));
        {
            let mut s = mgr.checkout(Channel::Sms, "stale").await;
            s.append_turn(Role::User, "hi");
            // Make the session look old.
            s.last_active_at = Utc::now() - ChronoDuration::seconds(10);
        }
        mgr.sweep();
        assert_eq!(mgr.live_count(), 0);

        // A new message after reaping starts a brand-new session.
        let s = mgr.checkout(Channel::Sms, "stale").await;
        assert!(s.history.is_empty());
        assert_eq!(s.turn_count, 0);
    }

    #[tokio::test]
    async fn sweep_skips_sessions_mid_turn() {
        let mgr = SessionManager::new(config(0, 0));
        let mut s = mgr.checkout(Channel::Sms, "busy").await;
        s.last_active_at = Utc::now() - ChronoDuration::seconds(10);
        // Guard still held: the sweep must not touch this session.
        mgr.sweep();
        assert_eq!(mgr.live_count(), 1);
        drop(s);
    }

    #[tokio::test]
    async fn expired_checkout_starts_fresh() {
        let mgr = SessionManager::new(config(0, 0));
        {
            let mut s = mgr.checkout(Channel::Sms, "old").await;
            s.append_turn(Role::User, "past");
            s.last_active_at = Utc::now() - ChronoDuration::seconds(5);
        }
        // No sweep ran, but the checkout itself detects staleness.
        let s = mgr.checkout(Channel::Sms, "old").await;
        assert!(s.history.is_empty());
        assert_eq!(s.state, SessionState::Active);
    }

    #[tokio::test]
    async fn end_removes_session() {
        let mgr = SessionManager::new(config(300, 900));
        {
            let mut s = mgr.checkout(Channel::Voice, "CA42").await;
            s.append_turn(Role::User, "q");
        }
        mgr.end(Channel::Voice, "CA42");
        assert_eq!(mgr.live_count(), 0);
        let s = mgr.checkout(Channel::Voice, "CA42").await;
        assert!(s.history.is_empty());
    }

    #[tokio::test]
    async fn same_key_turns_serialize() {
        let mgr = SessionManager::new(config(300, 900));
        let mut handles = Vec::new();
        for i in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move {
                let mut s = mgr.checkout(Channel::Sms, "shared").await;
                let count_before = s.history.len();
                tokio::task::yield_now().await;
                s.append_turn(Role::User, format!("turn {}", i));
                // While the guard is held, nobody else appended.
                assert_eq!(s.history.len().min(4), (count_before + 1).min(4));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let s = mgr.checkout(Channel::Sms, "shared").await;
        assert_eq!(s.turn_count, 8);
        assert_eq!(s.history.len(), 4);
    }
}
