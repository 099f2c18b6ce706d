//! Remote handles: the host's only way into an isolation context.
//!
//! ```text
//! host (async)                          isolate thread
//! ────────────                          ──────────────
//! RemoteHandle::update() ── Request ──▶ BuilderHost
//!        ▲                                   │
//!        └──────── oneshot reply ◀───────────┤
//!                                            │
//! Subscription::on_created / on_error ◀──────┘ (exactly one per build)
//! ```
//!
//! Only owned data crosses in either direction. A call made once the context
//! is gone fails with `HandleError::InvalidAfterUnload`; a call the isolate
//! does not answer in time fails with `HandleError::Timeout`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::error::{HandleError, IsolationError};
use super::{ContextId, ContextShared, Lifecycle, LoadReport};
use crate::builder::{BuildError, BuilderRegistry};
use crate::control::Control;
use crate::surface::HostWindow;

/// Sequence number of a build request, assigned by the host.
pub type BuildId = u64;

/// Identity of a control retained inside a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId(pub u64);

/// Host-side reference to a retained control.
///
/// The isolate keeps the control alive until `RemoteHandle::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRef {
    pub context: ContextId,
    pub id: ControlId,
}

/// A build produced a control.
#[derive(Debug, Clone)]
pub struct ControlCreated {
    pub control: ControlRef,
    pub build: BuildId,
    pub snapshot: Control,
}

/// A build failed.
#[derive(Debug, Clone)]
pub struct BuildFailed {
    pub context: ContextId,
    pub build: BuildId,
    pub error: BuildError,
}

/// Most recent control rendered by the context.
#[derive(Debug, Clone)]
pub struct Container {
    pub control: ControlRef,
    pub snapshot: Control,
    /// Bumped by every `invalidate`
    pub revision: u64,
}

/// The two reverse-direction callbacks, registered once per context.
pub struct Subscription {
    pub(super) on_created: Box<dyn Fn(ControlCreated) + Send>,
    pub(super) on_error: Box<dyn Fn(BuildFailed) + Send>,
}

impl Subscription {
    pub fn new<C, E>(on_created: C, on_error: E) -> Self
    where
        C: Fn(ControlCreated) + Send + 'static,
        E: Fn(BuildFailed) + Send + 'static,
    {
        Self {
            on_created: Box::new(on_created),
            on_error: Box::new(on_error),
        }
    }
}

pub(super) type Reply<T> = oneshot::Sender<Result<T, HandleError>>;

/// Requests executed by the isolate thread.
pub(super) enum Request {
    Init {
        registry: BuilderRegistry,
        host_window: HostWindow,
        reply: oneshot::Sender<Result<LoadReport, IsolationError>>,
    },
    Subscribe {
        subscription: Subscription,
        reply: Reply<()>,
    },
    SetBuilder {
        path: PathBuf,
        reply: Reply<bool>,
    },
    Update {
        build: BuildId,
        source: String,
        reply: Reply<()>,
    },
    GetContainer {
        reply: Reply<Option<Container>>,
    },
    Invalidate {
        reply: Reply<()>,
    },
    Release {
        control: ControlId,
    },
    Shutdown,
}

impl Request {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Subscribe { .. } => "subscribe",
            Self::SetBuilder { .. } => "set_builder",
            Self::Update { .. } => "update",
            Self::GetContainer { .. } => "get_container",
            Self::Invalidate { .. } => "invalidate",
            Self::Release { .. } => "release",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Cloneable reference to the builder host living inside a context.
#[derive(Clone)]
pub struct RemoteHandle {
    pub(super) shared: Arc<ContextShared>,
    pub(super) tx: mpsc::UnboundedSender<Request>,
    pub(super) timeout: Duration,
}

impl RemoteHandle {
    pub fn context(&self) -> ContextId {
        self.shared.id
    }

    pub fn is_valid(&self) -> bool {
        self.shared.state() != Lifecycle::Unloaded && !self.tx.is_closed()
    }

    /// Register the build callbacks. Only the first registration succeeds.
    pub async fn subscribe(&self, subscription: Subscription) -> Result<(), HandleError> {
        self.call(|reply| Request::Subscribe {
            subscription,
            reply,
        })
        .await
    }

    /// Select the builder for `path`; `false` if no builder handles it.
    ///
    /// The request is queued before this returns, so calls made afterwards
    /// are served after it even while the answer is still awaited.
    pub fn set_builder(
        &self,
        path: PathBuf,
    ) -> impl Future<Output = Result<bool, HandleError>> + Send + use<> {
        let sent = self.send(|reply| Request::SetBuilder { path, reply });
        let (id, timeout) = (self.shared.id, self.timeout);
        async move { wait(id, timeout, sent?).await }
    }

    /// Start building `source`.
    ///
    /// Returns once the isolate accepted the request; the outcome arrives
    /// through the subscription.
    pub async fn update(&self, build: BuildId, source: String) -> Result<(), HandleError> {
        self.call(|reply| Request::Update {
            build,
            source,
            reply,
        })
        .await
    }

    pub async fn get_container(&self) -> Result<Option<Container>, HandleError> {
        self.call(|reply| Request::GetContainer { reply }).await
    }

    pub async fn invalidate(&self) -> Result<(), HandleError> {
        self.call(|reply| Request::Invalidate { reply }).await
    }

    /// Let the context drop a control that is no longer on screen.
    pub fn release(&self, control: ControlRef) {
        if control.context == self.shared.id {
            let _ = self.tx.send(Request::Release { control: control.id });
        }
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, HandleError> {
        let rx = self.send(request)?;
        wait(self.shared.id, self.timeout, rx).await
    }

    fn send<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<oneshot::Receiver<Result<T, HandleError>>, HandleError> {
        let id = self.shared.id;
        if self.shared.state() == Lifecycle::Unloaded {
            return Err(HandleError::InvalidAfterUnload(id));
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(request(reply))
            .map_err(|_| HandleError::InvalidAfterUnload(id))?;
        Ok(rx)
    }
}

async fn wait<T>(
    id: ContextId,
    timeout: Duration,
    rx: oneshot::Receiver<Result<T, HandleError>>,
) -> Result<T, HandleError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        // Reply dropped: the isolate exited before answering
        Ok(Err(_)) => Err(HandleError::InvalidAfterUnload(id)),
        Err(_) => Err(HandleError::Timeout(id)),
    }
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("context", &self.shared.id)
            .field("state", &self.shared.state())
            .finish()
    }
}
