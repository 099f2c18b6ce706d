//! Isolation contexts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────── host ───────────────────────────────┐
//! │ IsolationContext ── owns ──▶ JoinHandle, Arc<ContextShared>         │
//! │        │                                                             │
//! │        └── handle() ──▶ RemoteHandle (clone freely)                  │
//! └────────────────────────────────┬─────────────────────────────────────┘
//!                                  │ mpsc<Request> + oneshot replies
//! ┌────────────────────────── isolate thread ────────────────────────────┐
//! │ ModuleTable ◀── Resolvers (scoped to init)                            │
//! │ ShadowDir (TempDir)   ControlTypes (toolkit)   BuilderHost            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Created → Initializing → Active → Unloading → Unloaded`
//!
//! `unload()` only queues a shutdown and returns; the thread finishes whatever
//! build it is running, drops its state (removing the staging directory) and
//! marks the context `Unloaded`.

mod error;
mod handle;
mod host;
mod module;
mod resolver;
mod shadow;

#[cfg(test)]
mod tests;

pub use error::{HandleError, IsolationError, ResolveError};
pub use handle::{
    BuildFailed, BuildId, Container, ControlCreated, ControlId, ControlRef, RemoteHandle,
    Subscription,
};
pub use module::{MODULE_EXT, MODULE_FORMAT, ModuleImage};
pub use resolver::{ResolverGuard, Resolvers};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::builder::BuilderRegistry;
use crate::config::ProjectConfig;
use crate::debug;
use crate::surface::HostWindow;
use crate::utils::hash::ContentHash;
use crate::utils::path::{dedup_dirs, host_dir};

use handle::Request;
use host::Isolate;
use shadow::ShadowDir;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Monotonic context identity, for log correlation and stale checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Created = 0,
    Initializing = 1,
    Active = 2,
    Unloading = 3,
    Unloaded = 4,
}

impl Lifecycle {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Initializing,
            2 => Self::Active,
            3 => Self::Unloading,
            _ => Self::Unloaded,
        }
    }
}

/// State visible from both sides of the boundary.
pub(crate) struct ContextShared {
    pub(crate) id: ContextId,
    state: AtomicU8,
}

impl ContextShared {
    fn new(id: ContextId) -> Self {
        Self {
            id,
            state: AtomicU8::new(Lifecycle::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: Lifecycle) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move to `to` if currently in one of `from`.
    fn transition(&self, from: &[Lifecycle], to: Lifecycle) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&Lifecycle::from_u8(current)).then_some(to as u8)
            })
            .is_ok()
    }
}

/// What a context loads. Two equal parameter sets can share a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextParams {
    pub platform: String,
    pub main_output: Option<PathBuf>,
    pub dependencies: Vec<PathBuf>,
    /// Resolution order for referenced modules
    pub search_dirs: Vec<PathBuf>,
}

impl ContextParams {
    /// Parameters for a project.
    ///
    /// Search order: host executable directory, the main output's directory,
    /// every dependency's directory, then configured directories.
    pub fn from_project(project: &ProjectConfig) -> Self {
        let parents = project
            .output
            .iter()
            .chain(&project.dependencies)
            .filter_map(|path| path.parent().map(PathBuf::from));
        let search_dirs = dedup_dirs(
            host_dir()
                .into_iter()
                .chain(parents)
                .chain(project.search_dirs.iter().cloned()),
        );
        Self {
            platform: project.platform.clone(),
            main_output: project.output.clone(),
            dependencies: project.dependencies.clone(),
            search_dirs,
        }
    }

    /// Builtin types only.
    pub fn builtin(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            main_output: None,
            dependencies: Vec::new(),
            search_dirs: Vec::new(),
        }
    }
}

/// Result of a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub modules: usize,
    pub types: usize,
    /// Content hash of the main output as loaded
    pub output_hash: Option<ContentHash>,
}

/// Marks the context unloaded once the isolate has dropped everything.
struct UnloadOnExit(Arc<ContextShared>);

impl Drop for UnloadOnExit {
    fn drop(&mut self) {
        self.0.set_state(Lifecycle::Unloaded);
    }
}

pub struct IsolationContext {
    shared: Arc<ContextShared>,
    handle: RemoteHandle,
    params: ContextParams,
    thread: Option<JoinHandle<()>>,
}

impl IsolationContext {
    /// Spawn the isolate for `params`; the context is `Initializing` on return.
    pub fn create(params: ContextParams, call_timeout: Duration) -> Result<Self, IsolationError> {
        let id = ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(ContextShared::new(id));
        let shadow = ShadowDir::new(id).map_err(|e| {
            IsolationError::Initialization(format!("cannot create staging directory: {e}"))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let isolate = Isolate::new(Arc::clone(&shared), params.clone(), shadow);
        let exit = UnloadOnExit(Arc::clone(&shared));
        let thread = std::thread::Builder::new()
            .name(format!("isolate-{id}"))
            .spawn(move || {
                let _exit = exit;
                isolate.run(rx);
            })
            .map_err(|e| IsolationError::Initialization(format!("cannot spawn isolate: {e}")))?;

        shared.set_state(Lifecycle::Initializing);
        debug!("isolate"; "#{id} created ({} search dirs)", params.search_dirs.len());

        Ok(Self {
            handle: RemoteHandle {
                shared: Arc::clone(&shared),
                tx,
                timeout: call_timeout,
            },
            shared,
            params,
            thread: Some(thread),
        })
    }

    /// Attach the toolkit, load modules and construct the builder host.
    ///
    /// On failure the context is already unloading when this returns.
    pub async fn initialize(
        &self,
        registry: BuilderRegistry,
        host_window: HostWindow,
        timeout: Duration,
    ) -> Result<LoadReport, IsolationError> {
        let result = self.request_init(registry, host_window, timeout).await;
        if result.is_err() {
            self.unload();
        }
        result
    }

    async fn request_init(
        &self,
        registry: BuilderRegistry,
        host_window: HostWindow,
        timeout: Duration,
    ) -> Result<LoadReport, IsolationError> {
        let id = self.id();
        let (reply, rx) = oneshot::channel();
        self.handle
            .tx
            .send(Request::Init {
                registry,
                host_window,
                reply,
            })
            .map_err(|_| HandleError::InvalidAfterUnload(id))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HandleError::InvalidAfterUnload(id).into()),
            Err(_) => Err(HandleError::Timeout(id).into()),
        }
    }

    /// `create` followed by `initialize`.
    pub async fn launch(
        params: ContextParams,
        registry: BuilderRegistry,
        host_window: HostWindow,
        call_timeout: Duration,
        init_timeout: Duration,
    ) -> Result<(Self, LoadReport), IsolationError> {
        let context = Self::create(params, call_timeout)?;
        let report = context
            .initialize(registry, host_window, init_timeout)
            .await?;
        Ok((context, report))
    }

    pub fn id(&self) -> ContextId {
        self.shared.id
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.state()
    }

    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    pub fn handle(&self) -> RemoteHandle {
        self.handle.clone()
    }

    /// Queue teardown and return immediately. Repeated calls are no-ops.
    pub fn unload(&self) {
        let started = self.shared.transition(
            &[Lifecycle::Created, Lifecycle::Initializing, Lifecycle::Active],
            Lifecycle::Unloading,
        );
        if started {
            debug!("isolate"; "#{} unloading", self.id());
            let _ = self.handle.tx.send(Request::Shutdown);
        }
    }

    /// Unload and wait for the isolate thread to exit. Blocking.
    pub fn join(mut self) {
        self.unload();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for IsolationContext {
    fn drop(&mut self) {
        self.unload();
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
