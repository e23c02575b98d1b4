use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use duo_core::model::{AuthToken, LevelSlug, User};

use crate::config::SyncConfig;
use crate::error::SyncError;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Local progress change mirrored to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    XpAwarded { amount: u64 },
    HeartDeducted,
    LevelCompleted { slug: LevelSlug },
}

/// Collaborator that echoes progress changes to a server.
#[async_trait]
pub trait ProgressSync: Send + Sync {
    /// Push a single event on behalf of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the backend is unreachable or rejects the event.
    async fn push(&self, token: &AuthToken, event: &SyncEvent) -> Result<(), SyncError>;
}

//
// ─── HTTP CLIENT ───────────────────────────────────────────────────────────────
//

#[derive(Clone)]
pub struct HttpProgressSync {
    client: Client,
    config: SyncConfig,
}

impl HttpProgressSync {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Exchange credentials for an identity and bearer token.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Rejected` with the server's message on a failed
    /// login, or other `SyncError`s on transport failures.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, AuthToken), SyncError> {
        let response = self
            .client
            .post(self.config.endpoint("/api/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let body: LoginResponse = check(response).await?.json().await?;
        Ok((body.user, AuthToken::new(body.token)))
    }
}

#[async_trait]
impl ProgressSync for HttpProgressSync {
    async fn push(&self, token: &AuthToken, event: &SyncEvent) -> Result<(), SyncError> {
        let request = match event {
            SyncEvent::XpAwarded { amount } => self
                .client
                .put(self.config.endpoint("/api/user/xp"))
                .json(&XpRequest { xp: *amount }),
            SyncEvent::HeartDeducted => self.client.put(self.config.endpoint("/api/user/heart")),
            SyncEvent::LevelCompleted { slug } => self
                .client
                .post(self.config.endpoint("/api/quiz/complete"))
                .json(&CompleteRequest {
                    slug: slug.as_str(),
                }),
        };

        let response = request.bearer_auth(token.expose()).send().await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            message: Some(message),
        }) => Err(SyncError::Rejected(message)),
        _ => Err(SyncError::HttpStatus(status)),
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: User,
    token: String,
}

#[derive(Debug, Serialize)]
struct XpRequest {
    xp: u64,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    slug: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

//
// ─── DISPATCHER ────────────────────────────────────────────────────────────────
//

enum SyncCommand {
    Push(AuthToken, SyncEvent),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget delivery of sync events on a background task.
pub struct SyncDispatcher {
    tx: mpsc::UnboundedSender<SyncCommand>,
    handle: JoinHandle<()>,
}

impl SyncDispatcher {
    /// Spawn the delivery task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(sync: Arc<dyn ProgressSync>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SyncCommand>();
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    SyncCommand::Push(token, event) => match sync.push(&token, &event).await {
                        Ok(()) => debug!(?event, "progress event synced"),
                        Err(err) => warn!(?event, error = %err, "progress sync failed"),
                    },
                    SyncCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx, handle }
    }

    pub fn dispatch(&self, token: AuthToken, event: SyncEvent) {
        if self.tx.send(SyncCommand::Push(token, event)).is_err() {
            warn!("sync dispatcher is not running, dropping event");
        }
    }

    /// Wait until every event dispatched so far has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "sync dispatcher task ended abnormally");
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
