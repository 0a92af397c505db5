//! Device-flow session registry.
//!
//! A single-writer actor owns the session map; the HTTP surface and the
//! socket upgrade only ever talk to it through [`SessionManagerHandle`].
//! Each new session spawns its own polling task against the identity
//! provider until it authenticates or its codes expire.

use super::errors::{AuthError, AuthResult};
use super::provider::IdentityProvider;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sessions idle longer than this are dropped by the cleanup tick.
const SESSION_IDLE_TIMEOUT: ChronoDuration = ChronoDuration::minutes(15);
const CLEANUP_PERIOD: Duration = Duration::from_secs(30);
const COMMAND_BUFFER: usize = 10;

/// One login attempt's state, owned by the session manager.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub device_code: String,
    pub user_code: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
    pub last_request: DateTime<Utc>,
}

enum SessionCommand {
    Get {
        id: String,
        respond: oneshot::Sender<Option<Session>>,
    },
    Add {
        session: Session,
    },
    Update {
        id: String,
        authenticated: Option<bool>,
        token: Option<String>,
        username: Option<String>,
    },
}

/// Cheap clone handed to HTTP handlers and the upgrade path.
#[derive(Clone)]
pub struct SessionManagerHandle {
    tx: mpsc::Sender<SessionCommand>,
    provider: Arc<dyn IdentityProvider>,
}

impl SessionManagerHandle {
    pub async fn get_session(&self, id: &str) -> AuthResult<Option<Session>> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Get {
                id: id.to_string(),
                respond,
            })
            .await
            .map_err(|_| AuthError::ManagerClosed)?;
        rx.await.map_err(|_| AuthError::ManagerClosed)
    }

    /// Start a device-flow login: request codes, register the session, and
    /// poll in the background until it authenticates or expires.
    pub async fn begin_login(&self) -> AuthResult<Session> {
        let grant = self.provider.request_device_code().await?;
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            device_code: grant.device_code.clone(),
            user_code: grant.user_code.clone(),
            token: None,
            username: None,
            authenticated: false,
            created_at: now,
            last_request: now,
        };

        self.tx
            .send(SessionCommand::Add {
                session: session.clone(),
            })
            .await
            .map_err(|_| AuthError::ManagerClosed)?;

        let handle = self.clone();
        let session_id = session.session_id.clone();
        let poll_every = Duration::from_secs(grant.interval.max(1));
        let expires_in = Duration::from_secs(grant.expires_in);
        tokio::spawn(async move {
            handle
                .poll_until_authenticated(session_id, grant.device_code, poll_every, expires_in)
                .await;
        });

        Ok(session)
    }

    async fn poll_until_authenticated(
        &self,
        session_id: String,
        device_code: String,
        poll_every: Duration,
        expires_in: Duration,
    ) {
        let deadline = tokio::time::Instant::now() + expires_in;
        let mut ticker = tokio::time::interval(poll_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately

        loop {
            if tokio::time::Instant::now() >= deadline {
                log::info!("device code for session {session_id} expired before authorization");
                return;
            }
            ticker.tick().await;

            let token = match self.provider.poll_token(&device_code).await {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(err) => {
                    log::error!("token poll failed for session {session_id}: {err}");
                    continue;
                }
            };

            let username = match self.provider.fetch_username(&token).await {
                Ok(name) => Some(name),
                Err(err) => {
                    log::error!("username lookup failed for session {session_id}: {err}");
                    None
                }
            };

            let update = SessionCommand::Update {
                id: session_id.clone(),
                authenticated: Some(true),
                token: Some(token),
                username,
            };
            if self.tx.send(update).await.is_err() {
                log::warn!("session manager closed before session {session_id} authenticated");
            }
            return;
        }
    }

    /// Whether the session's user has starred the repo. Unauthenticated
    /// sessions read as not starred.
    pub async fn check_starred(&self, id: &str) -> AuthResult<bool> {
        let Some(session) = self.get_session(id).await? else {
            return Err(AuthError::SessionNotFound(id.to_string()));
        };
        match session.token {
            Some(token) => self.provider.check_starred(&token).await,
            None => Ok(false),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn add_session(&self, session: Session) -> AuthResult<()> {
        self.tx
            .send(SessionCommand::Add { session })
            .await
            .map_err(|_| AuthError::ManagerClosed)
    }
}

/// The actor owning the session map.
pub struct SessionManager {
    sessions: HashMap<String, Session>,
    inbox: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cancel: CancellationToken,
    ) -> (Self, SessionManagerHandle) {
        let (tx, inbox) = mpsc::channel(COMMAND_BUFFER);
        let manager = Self {
            sessions: HashMap::new(),
            inbox,
            cancel,
        };
        (manager, SessionManagerHandle { tx, provider })
    }

    pub async fn run(mut self) {
        let mut cleanup = tokio::time::interval(CLEANUP_PERIOD);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("session manager shutting down");
                    return;
                }
                Some(command) = self.inbox.recv() => self.handle_command(command),
                _ = cleanup.tick() => self.cleanup(),
            }
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Get { id, respond } => {
                let session = self.sessions.get_mut(&id).map(|s| {
                    s.last_request = Utc::now();
                    s.clone()
                });
                let _ = respond.send(session);
            }
            SessionCommand::Add { session } => {
                log::info!("registering session {}", session.session_id);
                self.sessions.insert(session.session_id.clone(), session);
            }
            SessionCommand::Update {
                id,
                authenticated,
                token,
                username,
            } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return;
                };
                if let Some(authenticated) = authenticated {
                    session.authenticated = authenticated;
                }
                if token.is_some() {
                    session.token = token;
                }
                if username.is_some() {
                    session.username = username;
                }
                log::info!(
                    "session {id} updated, authenticated={} user={:?}",
                    session.authenticated,
                    session.username
                );
            }
        }
    }

    fn cleanup(&mut self) {
        let cutoff = Utc::now() - SESSION_IDLE_TIMEOUT;
        self.sessions.retain(|id, session| {
            let keep = session.last_request > cutoff;
            if !keep {
                log::info!("removing idle session {id}");
            }
            keep
        });
    }
}
