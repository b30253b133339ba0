//! Timer driver for [`SessionMachine`], one per tab.
//!
//! The machine runs inside a spawned task. Callers talk to it through a
//! [`WatchdogHandle`]; observers read [`SessionSnapshot`]s from a `watch`
//! channel and [`SessionEvent`]s from a broadcast channel. The warning and
//! expiry sleeps are rebuilt from the machine's deadlines on every loop turn,
//! so a reschedule drops the old sleeps before they can fire.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use democrm_api::LoginResponse;
use democrm_api_client::ClientError;

use crate::credential::CredentialStore;
use crate::machine::{
    ActivitySignal, Millis, SessionEvent, SessionMachine, SessionSnapshot, WatchdogError,
    WatchdogSettings,
};
use crate::sync::CrossTabSync;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 16;

/// Wall-clock source in unix milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> Millis;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        chrono::Utc::now().timestamp_millis().max(0) as Millis
    }
}

/// Wall clock that advances with tokio's timer. Under a paused runtime the
/// reported time moves only when tokio time does.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    anchor_unix_ms: Millis,
    anchor: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn new(anchor_unix_ms: Millis) -> Self {
        Self {
            anchor_unix_ms,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now_millis(&self) -> Millis {
        self.anchor_unix_ms + self.anchor.elapsed().as_millis() as Millis
    }
}

enum Command {
    Login {
        token: String,
        token_lifetime: Option<Duration>,
        reply: oneshot::Sender<Result<SessionEvent, WatchdogError>>,
    },
    Activity {
        reply: oneshot::Sender<Option<Millis>>,
    },
    Extend {
        reply: oneshot::Sender<Result<SessionEvent, WatchdogError>>,
    },
    Logout {
        reply: oneshot::Sender<Result<(), WatchdogError>>,
    },
    TokenRejected {
        reply: oneshot::Sender<Result<(), WatchdogError>>,
    },
}

/// Cloneable front end of a running watchdog. The task stops when the last
/// handle is dropped.
#[derive(Clone)]
pub struct WatchdogHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl WatchdogHandle {
    /// Spawn a watchdog for the tab that owns `credentials`. A session
    /// already present in shared storage is adopted on start.
    pub fn spawn(
        credentials: CredentialStore,
        settings: WatchdogSettings,
        clock: impl Clock,
    ) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let machine = SessionMachine::new(settings);
        let (snapshot_tx, snapshot) = watch::channel(machine.snapshot());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let driver = Driver {
            sync: CrossTabSync::new(credentials.clone()),
            credentials,
            machine,
            clock,
            snapshot: snapshot_tx,
            events: events.clone(),
        };
        let task = tokio::spawn(driver.run(rx));
        (
            Self {
                commands,
                snapshot,
                events,
            },
            task,
        )
    }

    /// Store the issued token and start the session.
    pub async fn login(&self, response: &LoginResponse) -> Result<SessionEvent, WatchdogError> {
        let token_lifetime = (response.expires_in > 0).then(|| Duration::from_secs(response.expires_in));
        self.request(|reply| Command::Login {
            token: response.token.clone(),
            token_lifetime,
            reply,
        })
        .await?
    }

    /// Report a qualifying activity signal. Returns the new idle expiry when
    /// the session was Active.
    pub async fn record_activity(&self, _signal: ActivitySignal) -> Result<Option<Millis>, WatchdogError> {
        self.request(|reply| Command::Activity { reply }).await
    }

    /// Report a raw UI event by name. Non-qualifying names are dropped here.
    pub async fn activity_event(&self, name: &str) -> Result<Option<Millis>, WatchdogError> {
        match ActivitySignal::from_event_name(name) {
            Some(signal) => self.record_activity(signal).await,
            None => Ok(None),
        }
    }

    /// The user answered the warning prompt.
    pub async fn extend(&self) -> Result<SessionEvent, WatchdogError> {
        self.request(|reply| Command::Extend { reply }).await?
    }

    pub async fn logout(&self) -> Result<(), WatchdogError> {
        self.request(|reply| Command::Logout { reply }).await?
    }

    pub async fn token_rejected(&self) -> Result<(), WatchdogError> {
        self.request(|reply| Command::TokenRejected { reply }).await?
    }

    /// Feed a failed API call through. A rejected token ends the session;
    /// any other error is ignored. Returns whether the session was ended.
    pub async fn observe_error(&self, err: &ClientError) -> Result<bool, WatchdogError> {
        if !err.is_token_rejected() {
            return Ok(false);
        }
        self.token_rejected().await?;
        Ok(true)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.snapshot.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WatchdogError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| WatchdogError::Stopped)?;
        rx.await.map_err(|_| WatchdogError::Stopped)
    }
}

struct Driver<C> {
    credentials: CredentialStore,
    sync: CrossTabSync,
    machine: SessionMachine,
    clock: C,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl<C: Clock> Driver<C> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let shared = self.sync.read_shared();
        let now = self.clock.now_millis();
        let adopted = self.machine.adopt_shared(now, &shared);
        self.publish(adopted);

        loop {
            let deadlines = self.machine.deadlines();
            let now = self.clock.now_millis();
            let warning = sleep_until(deadlines.warning_at, now);
            let expiry = sleep_until(deadlines.expires_at, now);

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        debug!("all watchdog handles dropped, stopping");
                        break;
                    }
                },
                shared = self.sync.next_change() => {
                    let now = self.clock.now_millis();
                    let event = self.machine.adopt_shared(now, &shared);
                    if let Some(SessionEvent::Expired { .. }) = event {
                        self.purge();
                    }
                    self.publish(event);
                }
                _ = warning => self.tick(),
                _ = expiry => self.tick(),
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        let now = self.clock.now_millis();
        match cmd {
            Command::Login {
                token,
                token_lifetime,
                reply,
            } => {
                let token_expires_at =
                    token_lifetime.map(|d| now.saturating_add(d.as_millis() as Millis));
                let result = self.login(now, &token, token_expires_at);
                let _ = reply.send(result);
            }
            Command::Activity { reply } => {
                let kicked = self.machine.record_activity(now);
                if let Some(at) = kicked {
                    self.store_expiry(at);
                    self.publish(None);
                }
                let _ = reply.send(kicked);
            }
            Command::Extend { reply } => {
                let result = self.machine.extend(now).map(|(event, idle)| {
                    self.store_expiry(idle);
                    self.publish(Some(event));
                    event
                });
                let _ = reply.send(result);
            }
            Command::Logout { reply } => {
                let event = self.machine.logout();
                let result = self.credentials.purge().map_err(storage_err);
                self.publish(event);
                let _ = reply.send(result);
            }
            Command::TokenRejected { reply } => {
                let event = self.machine.token_rejected();
                let result = match event {
                    Some(_) => self.credentials.purge().map_err(storage_err),
                    None => Ok(()),
                };
                self.publish(event);
                let _ = reply.send(result);
            }
        }
    }

    fn login(
        &mut self,
        now: Millis,
        token: &str,
        token_expires_at: Option<Millis>,
    ) -> Result<SessionEvent, WatchdogError> {
        self.credentials
            .save(token, token_expires_at)
            .map_err(storage_err)?;
        let event = self.machine.login(now, token_expires_at);
        match event {
            SessionEvent::Expired { .. } => self.purge(),
            _ => {
                if let Some(idle) = self.machine.snapshot().idle_expires_at {
                    self.credentials.set_expires_at(idle).map_err(storage_err)?;
                }
            }
        }
        self.publish(Some(event));
        Ok(event)
    }

    fn tick(&mut self) {
        let now = self.clock.now_millis();
        let event = self.machine.advance(now);
        if let Some(SessionEvent::Expired { .. }) = event {
            self.purge();
        }
        self.publish(event);
    }

    fn store_expiry(&self, at: Millis) {
        if let Err(e) = self.credentials.set_expires_at(at) {
            warn!("Failed to share session expiry: {e}");
        }
    }

    fn purge(&self) {
        if let Err(e) = self.credentials.purge() {
            error!("Failed to clear credentials: {e}");
        }
    }

    fn publish(&self, event: Option<SessionEvent>) {
        self.snapshot.send_replace(self.machine.snapshot());
        let Some(event) = event else {
            return;
        };
        match event {
            SessionEvent::Started { expires_at } => info!("Session started, expires at {expires_at}"),
            SessionEvent::Warning { expires_at } => info!("Session expiring at {expires_at}"),
            SessionEvent::Extended { expires_at } => debug!("Session extended to {expires_at}"),
            SessionEvent::Expired { reason } => info!("Session expired: {reason:?}"),
            SessionEvent::LoggedOut => info!("Session logged out"),
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn storage_err(e: crate::storage::StorageError) -> WatchdogError {
    WatchdogError::Storage(e.to_string())
}

async fn sleep_until(deadline: Option<Millis>, now: Millis) {
    match deadline {
        Some(at) => tokio::time::sleep(Duration::from_millis(at.saturating_sub(now))).await,
        None => std::future::pending().await,
    }
}
