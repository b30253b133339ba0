//! Session lifecycle as a pure state machine.
//!
//! Nothing here reads a clock or touches storage. Every method takes `now`
//! (unix milliseconds) and the state is always re-derived from `now` and the
//! recorded expiry timestamps, so the same inputs give the same state.
//!
//! ```text
//! LoggedOut ──login──▶ Active ──now ≥ warning_at──▶ Warning ──now ≥ expires_at──▶ Expired
//!                       ▲  │ activity                  │ extend
//!                       │  └───────────┘               │
//!                       └──────────────────────────────┘
//! Active / Warning / Expired ──logout──▶ LoggedOut
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use democrm_runtime_config::SessionSettings;

use crate::credential::SharedSession;

/// Unix milliseconds.
pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    Active,
    Warning,
    Expired,
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Warning)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoggedOut => "logged_out",
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Expired => "expired",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// No qualifying activity for the idle timeout.
    IdleTimeout,
    /// The bearer token's own lifetime ran out first.
    TokenExpired,
    /// The server answered 401 to a protected request.
    TokenRejected,
}

/// User-activity signal kinds that keep a session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Pointer,
    Key,
    Scroll,
    Touch,
}

impl ActivitySignal {
    /// Map a DOM-style event name. Anything outside the qualifying set is
    /// `None` and must be ignored.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "click" | "mousemove" | "pointerdown" | "pointermove" => Some(Self::Pointer),
            "keydown" | "keyup" => Some(Self::Key),
            "scroll" | "wheel" => Some(Self::Scroll),
            "touchstart" | "touchmove" => Some(Self::Touch),
            _ => None,
        }
    }
}

/// Observable transitions. `Expired` and `LoggedOut` both mean "go to login".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Started { expires_at: Millis },
    Warning { expires_at: Millis },
    Extended { expires_at: Millis },
    Expired { reason: ExpiryReason },
    LoggedOut,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchdogError {
    #[error("invalid watchdog settings: {0}")]
    InvalidSettings(String),
    #[error("extend is only valid while the warning is shown (state: {0})")]
    NotInWarning(SessionState),
    #[error("credential storage failed: {0}")]
    Storage(String),
    #[error("watchdog task has stopped")]
    Stopped,
}

/// Idle timeout and warning lead time. `0 < warning_offset < idle_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    idle_timeout: Duration,
    warning_offset: Duration,
}

impl WatchdogSettings {
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(1800);
    pub const WARNING_OFFSET: Duration = Duration::from_secs(60);

    pub fn new(idle_timeout: Duration, warning_offset: Duration) -> Result<Self, WatchdogError> {
        if warning_offset.is_zero() || warning_offset >= idle_timeout {
            return Err(WatchdogError::InvalidSettings(format!(
                "warning offset {warning_offset:?} must be > 0 and < idle timeout {idle_timeout:?}"
            )));
        }
        Ok(Self {
            idle_timeout,
            warning_offset,
        })
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn warning_offset(&self) -> Duration {
        self.warning_offset
    }

    fn idle_ms(&self) -> Millis {
        self.idle_timeout.as_millis() as Millis
    }

    fn offset_ms(&self) -> Millis {
        self.warning_offset.as_millis() as Millis
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Self::IDLE_TIMEOUT,
            warning_offset: Self::WARNING_OFFSET,
        }
    }
}

impl TryFrom<&SessionSettings> for WatchdogSettings {
    type Error = WatchdogError;

    fn try_from(s: &SessionSettings) -> Result<Self, Self::Error> {
        Self::new(
            Duration::from_secs(s.idle_timeout_secs),
            Duration::from_secs(s.warning_offset_secs),
        )
    }
}

/// Read-only view published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Effective forced-logout time: the earlier of idle and token expiry.
    pub expires_at: Option<Millis>,
    pub warning_at: Option<Millis>,
    pub idle_expires_at: Option<Millis>,
    pub token_expires_at: Option<Millis>,
    /// Set once the session has expired.
    pub reason: Option<ExpiryReason>,
}

/// When the driver must next wake up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub warning_at: Option<Millis>,
    pub expires_at: Option<Millis>,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    idle_expires_at: Millis,
    token_expires_at: Option<Millis>,
}

impl Session {
    fn expiry(&self) -> (Millis, ExpiryReason) {
        match self.token_expires_at {
            Some(token) if token <= self.idle_expires_at => (token, ExpiryReason::TokenExpired),
            _ => (self.idle_expires_at, ExpiryReason::IdleTimeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    settings: WatchdogSettings,
    session: Option<Session>,
    state: SessionState,
    reason: Option<ExpiryReason>,
}

impl SessionMachine {
    pub fn new(settings: WatchdogSettings) -> Self {
        Self {
            settings,
            session: None,
            state: SessionState::LoggedOut,
            reason: None,
        }
    }

    pub fn settings(&self) -> &WatchdogSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start a session. Replaces any previous one.
    pub fn login(&mut self, now: Millis, token_expires_at: Option<Millis>) -> SessionEvent {
        self.session = Some(Session {
            idle_expires_at: now.saturating_add(self.settings.idle_ms()),
            token_expires_at,
        });
        self.reason = None;
        self.state = SessionState::Active;
        // A token that is already dead ends the session immediately; one
        // that dies inside the offset starts the session in Warning.
        match self.rederive(now) {
            Some(event @ (SessionEvent::Expired { .. } | SessionEvent::Warning { .. })) => event,
            _ => SessionEvent::Started {
                expires_at: self.effective_expiry().unwrap_or(now),
            },
        }
    }

    /// Kick the idle expiry forward. Returns the new idle expiry when the
    /// session was Active; a no-op in every other state.
    pub fn record_activity(&mut self, now: Millis) -> Option<Millis> {
        if self.state != SessionState::Active {
            return None;
        }
        let session = self.session.as_mut()?;
        session.idle_expires_at = now.saturating_add(self.settings.idle_ms());
        Some(session.idle_expires_at)
    }

    /// Answer the warning. Only valid in Warning. Returns the event and the
    /// new idle expiry to store.
    pub fn extend(&mut self, now: Millis) -> Result<(SessionEvent, Millis), WatchdogError> {
        if self.state != SessionState::Warning {
            return Err(WatchdogError::NotInWarning(self.state));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(WatchdogError::NotInWarning(self.state));
        };
        session.idle_expires_at = now.saturating_add(self.settings.idle_ms());
        let idle = session.idle_expires_at;
        let event = self.rederive(now).unwrap_or_else(|| {
            let expires_at = self.effective_expiry().unwrap_or(idle);
            // Still inside the warning window of a token that cannot be extended.
            SessionEvent::Warning { expires_at }
        });
        Ok((event, idle))
    }

    /// Re-derive the state for `now`. Returns the transition, if any.
    pub fn advance(&mut self, now: Millis) -> Option<SessionEvent> {
        self.rederive(now)
    }

    /// Reconcile with keys another tab wrote.
    pub fn adopt_shared(&mut self, now: Millis, shared: &SharedSession) -> Option<SessionEvent> {
        let expires_at = match shared.expires_at {
            Some(at) if shared.token_present => at,
            _ => {
                // Another tab logged out or expired and purged the keys.
                return if self.state.is_live() {
                    self.session = None;
                    self.state = SessionState::LoggedOut;
                    Some(SessionEvent::LoggedOut)
                } else {
                    None
                };
            }
        };

        if let Some(session) = self.session.as_mut().filter(|_| self.state.is_live()) {
            session.idle_expires_at = expires_at;
            session.token_expires_at = shared.token_expires_at;
            return self.rederive(now);
        }

        // No local session: adopt one that another tab started.
        if expires_at <= now {
            return None;
        }
        let candidate = Session {
            idle_expires_at: expires_at,
            token_expires_at: shared.token_expires_at,
        };
        let (effective, _) = candidate.expiry();
        if effective <= now {
            return None;
        }
        self.session = Some(candidate);
        self.reason = None;
        self.state = self.derive(now);
        Some(match self.state {
            SessionState::Warning => SessionEvent::Warning {
                expires_at: effective,
            },
            _ => SessionEvent::Started {
                expires_at: effective,
            },
        })
    }

    /// Explicit logout, valid from any state but LoggedOut.
    pub fn logout(&mut self) -> Option<SessionEvent> {
        if self.state == SessionState::LoggedOut {
            return None;
        }
        self.session = None;
        self.reason = None;
        self.state = SessionState::LoggedOut;
        Some(SessionEvent::LoggedOut)
    }

    /// The server refused the token. Ends a live session.
    pub fn token_rejected(&mut self) -> Option<SessionEvent> {
        if !self.state.is_live() {
            return None;
        }
        Some(self.expire(ExpiryReason::TokenRejected))
    }

    pub fn deadlines(&self) -> Deadlines {
        let Some(expires_at) = self.effective_expiry() else {
            return Deadlines::default();
        };
        match self.state {
            SessionState::Active => Deadlines {
                warning_at: Some(self.warning_at(expires_at)),
                expires_at: Some(expires_at),
            },
            SessionState::Warning => Deadlines {
                warning_at: None,
                expires_at: Some(expires_at),
            },
            SessionState::LoggedOut | SessionState::Expired => Deadlines::default(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let expires_at = self.effective_expiry();
        SessionSnapshot {
            state: self.state,
            expires_at,
            warning_at: expires_at.map(|at| self.warning_at(at)),
            idle_expires_at: self.session.map(|s| s.idle_expires_at),
            token_expires_at: self.session.and_then(|s| s.token_expires_at),
            reason: self.reason,
        }
    }

    fn effective_expiry(&self) -> Option<Millis> {
        self.session.map(|s| s.expiry().0)
    }

    fn warning_at(&self, expires_at: Millis) -> Millis {
        expires_at.saturating_sub(self.settings.offset_ms())
    }

    fn derive(&self, now: Millis) -> SessionState {
        match self.session {
            None => self.state,
            Some(session) => {
                let (expires_at, _) = session.expiry();
                if now >= expires_at {
                    SessionState::Expired
                } else if now >= self.warning_at(expires_at) {
                    SessionState::Warning
                } else {
                    SessionState::Active
                }
            }
        }
    }

    fn rederive(&mut self, now: Millis) -> Option<SessionEvent> {
        if !self.state.is_live() {
            return None;
        }
        let session = self.session?;
        let next = self.derive(now);
        let prev = std::mem::replace(&mut self.state, next);
        let expires_at = session.expiry().0;
        match (prev, next) {
            (_, SessionState::Expired) => Some(self.expire(session.expiry().1)),
            (SessionState::Active, SessionState::Warning) => {
                Some(SessionEvent::Warning { expires_at })
            }
            (SessionState::Warning, SessionState::Active) => {
                Some(SessionEvent::Extended { expires_at })
            }
            _ => None,
        }
    }

    fn expire(&mut self, reason: ExpiryReason) -> SessionEvent {
        self.session = None;
        self.state = SessionState::Expired;
        self.reason = Some(reason);
        SessionEvent::Expired { reason }
    }
}
