//! Preview session controller.
//!
//! One actor task owns the preview surface and every isolation context, so
//! the surface is only ever touched from a single place.
//!
//! # Architecture
//!
//! ```text
//! editor ─── Update / SetBuilder ──▶ ┌───────────────┐ ── update() ──▶ context
//! output Watcher ── OutputChanged ─▶ │ Session actor │                    │
//! launch task ──── Launched ───────▶ │   BuildGate   │ ◀─ Created/Failed ─┘
//!                                    └───────┬───────┘
//!                                            ▼
//!                                     PreviewSurface
//! ```
//!
//! # Context replacement
//!
//! A change to the compiled output launches a replacement context in the
//! background. The replacement stays *pending* until it renders successfully
//! (or the swap timeout runs out) and only then becomes current. The context
//! it replaces is unloaded on a blocking thread, never on the actor.

mod gate;


pub use gate::BuildGate;

use std::error::Error as _;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::builder::{BuildError, BuilderRegistry};
use crate::config::{BuilderConfig, PreviewConfig, SessionConfig};
use crate::isolate::{
    BuildFailed, BuildId, ContextId, ContextParams, ControlCreated, ControlRef, IsolationContext,
    IsolationError, LoadReport, RemoteHandle, Subscription,
};
use crate::surface::{HostWindow, PreviewSurface};
use crate::utils::hash::file_hash;
use crate::watch::{WatchFilter, Watcher};
use crate::{debug, log};

use gate::IDLE;

/// Poll interval of `PreviewHandle::settled`.
const SETTLE_POLL: Duration = Duration::from_millis(10);

/// Session-wide settings that do not come from `preview.toml`.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Explicit config file, skipping the upward search
    pub config: Option<PathBuf>,
    /// Overrides `[project] platform`
    pub platform: Option<String>,
    /// Builders to use instead of the ones configured in `[builder]`
    pub registry: Option<BuilderRegistry>,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub source: Option<PathBuf>,
    pub builder: Option<&'static str>,
    pub current: Option<ContextId>,
    pub pending: Option<ContextId>,
    pub launching: bool,
    pub building: bool,
    pub pending_rebuild: bool,
    /// The output changed and the current context is being replaced
    pub stale: bool,
    /// Control on screen
    pub rendered: Option<ControlRef>,
    /// Message of the error banner on screen
    pub error: Option<String>,
    pub builds: BuildId,
    pub renders: u64,
    /// Nothing scheduled, launching, swapping or building
    pub settled: bool,
}

enum SessionMsg {
    Update(String),
    SetBuilder {
        path: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    OutputChanged(Vec<PathBuf>),
    /// The current context answered a builder switch
    Rebound {
        seq: u64,
        accepted: bool,
    },
    Launched {
        seq: u64,
        key: ContextKey,
        result: Result<(IsolationContext, LoadReport), IsolationError>,
    },
    Created(ControlCreated),
    Failed(BuildFailed),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct PreviewHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
}

impl PreviewHandle {
    /// Queue new source text. Only the latest text is ever built.
    pub fn update(&self, code: impl Into<String>) {
        let _ = self.tx.send(SessionMsg::Update(code.into()));
    }

    /// Select the builder for `path` and load the project it belongs to.
    ///
    /// `false` when no builder handles the file (the session is left as it
    /// was) or its configuration cannot be loaded.
    pub async fn set_builder(&self, path: impl Into<PathBuf>) -> bool {
        let (reply, rx) = oneshot::channel();
        let msg = SessionMsg::SetBuilder {
            path: path.into(),
            reply,
        };
        if self.tx.send(msg).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// `None` once the session has stopped.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionMsg::Snapshot(reply)).ok()?;
        rx.await.ok()
    }

    /// Wait for the session to settle; `None` on timeout or after shutdown.
    pub async fn settled(&self, timeout: Duration) -> Option<SessionSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot().await?;
            if snapshot.settled {
                return Some(snapshot);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionMsg::Shutdown);
    }
}

/// Start a session rendering into `surface`.
///
/// The task finishes after `PreviewHandle::shutdown`, once every context has
/// been unloaded.
pub fn spawn(
    surface: Box<dyn PreviewSurface>,
    options: SessionOptions,
) -> (PreviewHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(surface, options, tx.clone());
    (PreviewHandle { tx }, tokio::spawn(session.run(rx)))
}

/// Contexts built from equal keys are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContextKey {
    params: ContextParams,
    builder: BuilderConfig,
}

impl ContextKey {
    fn new(config: &PreviewConfig) -> Self {
        Self {
            params: ContextParams::from_project(&config.project),
            builder: config.builder.clone(),
        }
    }
}

/// A live context and what the session knows about it.
struct Slot {
    context: IsolationContext,
    handle: RemoteHandle,
    report: LoadReport,
    key: ContextKey,
    last_error: Option<BuildError>,
}

impl Slot {
    fn id(&self) -> ContextId {
        self.context.id()
    }
}

struct Session {
    surface: Box<dyn PreviewSurface>,
    options: SessionOptions,
    tx: mpsc::UnboundedSender<SessionMsg>,

    config: Option<PreviewConfig>,
    source: Option<PathBuf>,
    builder: Option<&'static str>,

    current: Option<Slot>,
    pending: Option<Slot>,
    swap_deadline: Option<Instant>,
    /// Sequence number of the launch whose result is awaited
    launching: Option<u64>,
    /// Sequence number of the builder switch the current context has not
    /// answered yet
    rebinding: Option<u64>,
    launch_seq: u64,
    stale: bool,

    gate: BuildGate,
    rendered: Option<ControlRef>,
    error: Option<String>,
    renders: u64,

    output_watcher: Option<Watcher>,
}

impl Session {
    fn new(
        surface: Box<dyn PreviewSurface>,
        options: SessionOptions,
        tx: mpsc::UnboundedSender<SessionMsg>,
    ) -> Self {
        Self {
            surface,
            options,
            tx,
            config: None,
            source: None,
            builder: None,
            current: None,
            pending: None,
            swap_deadline: None,
            launching: None,
            rebinding: None,
            launch_seq: 0,
            stale: false,
            gate: BuildGate::new(SessionConfig::default().debounce()),
            rendered: None,
            error: None,
            renders: 0,
            output_watcher: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        loop {
            let wait = if self.can_build() {
                self.gate.sleep_duration()
            } else {
                IDLE
            };
            let swap_at = self
                .swap_deadline
                .unwrap_or_else(|| Instant::now() + IDLE);

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(SessionMsg::Shutdown) | None => break,
                    Some(msg) => self.handle(msg),
                },
                _ = tokio::time::sleep(wait) => {}
                _ = tokio::time::sleep_until(swap_at), if self.swap_deadline.is_some() => {
                    self.swap_timed_out();
                }
            }

            if self.gate.is_due() && self.can_build() {
                self.dispatch();
            }
        }
        self.close().await;
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Update(code) => self.gate.update(code),
            SessionMsg::SetBuilder { path, reply } => {
                let accepted = self.set_builder(path);
                let _ = reply.send(accepted);
            }
            SessionMsg::OutputChanged(paths) => self.output_changed(&paths),
            SessionMsg::Rebound { seq, accepted } => self.rebound(seq, accepted),
            SessionMsg::Launched { seq, key, result } => self.launched(seq, key, result),
            SessionMsg::Created(created) => self.created(created),
            SessionMsg::Failed(failed) => self.failed(failed),
            SessionMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionMsg::Shutdown => {}
        }
    }

    // =========================================================================
    // Builder selection and context launch
    // =========================================================================

    fn set_builder(&mut self, path: PathBuf) -> bool {
        let loaded = PreviewConfig::load(&path, self.options.config.as_deref())
            .and_then(|config| config.with_platform(self.options.platform.as_deref()));
        let config = match loaded {
            Ok(config) => config,
            Err(err) => {
                log!("error"; "{err}");
                let detail = err.source().map(|e| e.to_string()).unwrap_or_default();
                self.show_error(&err.to_string(), &detail);
                return false;
            }
        };

        let registry = self.registry(&config);
        let Some(kind) = registry.find(&path).map(|info| info.kind) else {
            log!("session"; "no builder handles {}", path.display());
            return false;
        };

        let key = ContextKey::new(&config);
        // Code typed for the previous file is not built with the new builder
        self.gate.forget();
        self.gate.set_debounce(config.session.debounce());
        self.watch_output(&config);
        self.source = Some(path.clone());
        self.builder = Some(kind);
        self.config = Some(config);
        debug!("session"; "{} uses the {kind} builder", path.display());

        match self.reusable(&key) {
            Some(handle) => self.rebind(handle, path),
            None => self.launch(key, registry, path),
        }
        true
    }

    /// Switch the builder of the current context without waiting for it.
    ///
    /// The switch is queued ahead of any later build, so only a refusal needs
    /// handling: the context is then replaced.
    fn rebind(&mut self, handle: RemoteHandle, path: PathBuf) {
        self.launch_seq += 1;
        let seq = self.launch_seq;
        self.rebinding = Some(seq);

        let tx = self.tx.clone();
        let answer = handle.set_builder(path);
        tokio::spawn(async move {
            let accepted = match answer.await {
                Ok(accepted) => accepted,
                Err(err) => {
                    debug!("session"; "cannot reuse context: {err}");
                    false
                }
            };
            let _ = tx.send(SessionMsg::Rebound { seq, accepted });
        });
    }

    fn rebound(&mut self, seq: u64, accepted: bool) {
        if self.rebinding != Some(seq) {
            return;
        }
        self.rebinding = None;
        if !accepted && self.launching.is_none() {
            self.relaunch();
        }
    }

    /// Handle of the current context if it can serve `key` as is.
    fn reusable(&self, key: &ContextKey) -> Option<RemoteHandle> {
        if self.stale || self.pending.is_some() || self.launching.is_some() {
            return None;
        }
        self.current
            .as_ref()
            .filter(|slot| slot.key == *key && slot.handle.is_valid())
            .map(|slot| slot.handle.clone())
    }

    fn registry(&self, config: &PreviewConfig) -> BuilderRegistry {
        self.options
            .registry
            .clone()
            .unwrap_or_else(|| BuilderRegistry::with_defaults(&config.builder, &config.root))
    }

    fn timing(&self) -> SessionConfig {
        self.config
            .as_ref()
            .map(|config| config.session.clone())
            .unwrap_or_default()
    }

    fn launch(&mut self, key: ContextKey, registry: BuilderRegistry, path: PathBuf) {
        self.launch_seq += 1;
        let seq = self.launch_seq;
        self.launching = Some(seq);

        let timing = self.timing();
        let host_window = self.surface.host_window();
        let tx = self.tx.clone();
        debug!("session"; "launching context for {}", path.display());

        tokio::spawn(async move {
            let result = launch_context(
                key.params.clone(),
                registry,
                host_window,
                path,
                tx.clone(),
                timing,
            )
            .await;
            let _ = tx.send(SessionMsg::Launched { seq, key, result });
        });
    }

    /// Launch a replacement for the current context.
    fn relaunch(&mut self) {
        let (Some(config), Some(path)) = (&self.config, &self.source) else {
            return;
        };
        let key = ContextKey::new(config);
        let registry = self.registry(config);
        let path = path.clone();
        self.launch(key, registry, path);
    }

    fn launched(
        &mut self,
        seq: u64,
        key: ContextKey,
        result: Result<(IsolationContext, LoadReport), IsolationError>,
    ) {
        if self.launching != Some(seq) {
            // Superseded by a later launch
            if let Ok((context, _)) = result {
                retire(context);
            }
            return;
        }
        self.launching = None;

        let (context, report) = match result {
            Ok(launched) => launched,
            Err(err) => {
                log!("error"; "context failed to load: {err}");
                self.show_error(&err.to_string(), &err.detail());
                return;
            }
        };
        debug!(
            "session";
            "context #{} loaded {} module(s), {} type(s)",
            context.id(), report.modules, report.types
        );

        let slot = Slot {
            handle: context.handle(),
            context,
            report,
            key,
            last_error: None,
        };
        if let Some(old) = self.pending.take() {
            self.retire_slot(old);
        }
        if self.current.is_none() || !self.gate.has_code() {
            self.promote(slot);
        } else {
            self.pending = Some(slot);
            self.swap_deadline = Some(Instant::now() + self.timing().swap_timeout());
        }
        self.gate.rebuild();
    }

    fn promote(&mut self, slot: Slot) {
        debug!("session"; "context #{} is current", slot.id());
        self.swap_deadline = None;
        self.stale = false;
        // A launched context already has the latest builder
        self.rebinding = None;
        if let Some(old) = self.current.replace(slot) {
            self.retire_slot(old);
        }
    }

    fn swap_timed_out(&mut self) {
        self.swap_deadline = None;
        let Some(slot) = self.pending.take() else {
            return;
        };
        let id = slot.id();
        let failed = slot.last_error.is_some();
        log!("session"; "context #{id} has not rendered in time, switching anyway");
        self.promote(slot);
        if !failed {
            self.show_error(
                &format!("reloaded context #{id} has not rendered yet"),
                "the previous preview may be out of date",
            );
        }
    }

    fn retire_slot(&mut self, slot: Slot) {
        self.gate.abandon(slot.id());
        retire(slot.context);
    }

    // =========================================================================
    // Output watching
    // =========================================================================

    fn watch_output(&mut self, config: &PreviewConfig) {
        let Some(dir) = config.output_dir() else {
            self.output_watcher = None;
            return;
        };
        if self.output_watcher.as_ref().is_some_and(|w| w.dir() == dir) {
            return;
        }

        let tx = self.tx.clone();
        let filter = WatchFilter::Extensions(config.watch.extensions.clone());
        let watched = Watcher::spawn(dir, filter, config.watch.debounce(), move |paths| {
            tx.send(SessionMsg::OutputChanged(paths)).is_ok()
        });
        self.output_watcher = match watched {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log!("watch"; "cannot watch {}: {err}", dir.display());
                None
            }
        };
    }

    fn output_changed(&mut self, paths: &[PathBuf]) {
        let Some(output) = self
            .config
            .as_ref()
            .and_then(|config| config.project.output.clone())
        else {
            return;
        };
        if !output.is_file() {
            debug!("session"; "{} is missing, keeping the current context", output.display());
            return;
        }

        let loaded = self.current.as_ref().and_then(|slot| slot.report.output_hash);
        if loaded.is_some()
            && paths.iter().all(|path| *path == output)
            && file_hash(&output).ok() == loaded
        {
            debug!("session"; "{} unchanged", output.display());
            return;
        }

        log!("session"; "{} changed, reloading", output.display());
        self.stale = true;
        self.relaunch();
    }

    // =========================================================================
    // Builds
    // =========================================================================

    /// Context new builds go to: the pending replacement first.
    fn target(&self) -> Option<&Slot> {
        self.pending.as_ref().or(self.current.as_ref())
    }

    /// A due build can run now, or is known to never get a context.
    fn can_build(&self) -> bool {
        self.target().is_some() || self.source.is_none()
    }

    fn dispatch(&mut self) {
        let Some(handle) = self.target().map(|slot| slot.handle.clone()) else {
            self.gate.skip();
            self.show_error("No builder configured", "");
            return;
        };
        let context = handle.context();
        let Some((build, code)) = self.gate.start(context) else {
            return;
        };
        debug!("session"; "build #{build} on context #{context}");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle.update(build, code).await {
                let error = BuildError::new(err.to_string());
                let _ = tx.send(SessionMsg::Failed(BuildFailed {
                    context,
                    build,
                    error,
                }));
            }
        });
    }

    fn slot(&self, context: ContextId) -> Option<&Slot> {
        [self.current.as_ref(), self.pending.as_ref()]
            .into_iter()
            .flatten()
            .find(|slot| slot.id() == context)
    }

    fn created(&mut self, created: ControlCreated) {
        let ControlCreated {
            control,
            build,
            snapshot,
        } = created;
        let Some(handle) = self.slot(control.context).map(|slot| slot.handle.clone()) else {
            debug!("session"; "build #{build} from retired context #{}", control.context);
            return;
        };
        if !self.gate.finish(control.context, build) {
            debug!("session"; "discarding stale build #{build}");
            handle.release(control);
            return;
        }

        if self.pending.as_ref().is_some_and(|slot| slot.id() == control.context)
            && let Some(slot) = self.pending.take()
        {
            self.promote(slot);
        }

        if self.error.take().is_some() {
            self.surface.clear_error();
        }
        match self.surface.set_content(&snapshot.into_embeddable()) {
            Ok(()) => {
                self.renders += 1;
                if let Some(previous) = self.rendered.replace(control) {
                    handle.release(previous);
                }
                if let Some(slot) = &mut self.current {
                    slot.last_error = None;
                }
                debug!("session"; "build #{build} rendered");
            }
            Err(err) => {
                log!("error"; "{err}");
                self.show_error(&err.to_string(), "");
                handle.release(control);
                tokio::spawn(async move {
                    let _ = handle.invalidate().await;
                });
            }
        }
    }

    fn failed(&mut self, failed: BuildFailed) {
        let BuildFailed {
            context,
            build,
            error,
        } = failed;
        if self.slot(context).is_none() || !self.gate.finish(context, build) {
            debug!("session"; "discarding stale failure of build #{build}");
            return;
        }

        debug!("session"; "build #{build} failed: {}", error.message);
        self.show_error(&error.message, &error.detail);
        let slot = [self.current.as_mut(), self.pending.as_mut()]
            .into_iter()
            .flatten()
            .find(|slot| slot.id() == context);
        if let Some(slot) = slot {
            slot.last_error = Some(error);
        }
    }

    fn show_error(&mut self, message: &str, detail: &str) {
        self.surface.show_error(message, detail);
        self.error = Some(message.to_string());
    }

    fn snapshot(&self) -> SessionSnapshot {
        let launching = self.launching.is_some() || self.rebinding.is_some();
        let building = self.gate.in_flight().is_some();
        SessionSnapshot {
            source: self.source.clone(),
            builder: self.builder,
            current: self.current.as_ref().map(Slot::id),
            pending: self.pending.as_ref().map(Slot::id),
            launching,
            building,
            pending_rebuild: self.gate.pending_rebuild(),
            stale: self.stale,
            rendered: self.rendered,
            error: self.error.clone(),
            builds: self.gate.builds_started(),
            renders: self.renders,
            settled: !launching
                && !building
                && self.swap_deadline.is_none()
                && (!self.gate.is_dirty() || !self.can_build()),
        }
    }

    async fn close(mut self) {
        self.output_watcher = None;
        let joins: Vec<_> = [self.pending.take(), self.current.take()]
            .into_iter()
            .flatten()
            .map(|slot| retire(slot.context))
            .collect();
        for join in joins {
            let _ = join.await;
        }
        debug!("session"; "closed");
    }
}

/// Unload `context` off the actor; the blocking join runs on tokio's pool.
fn retire(context: IsolationContext) -> JoinHandle<()> {
    debug!("session"; "retiring context #{}", context.id());
    tokio::task::spawn_blocking(move || context.join())
}

async fn launch_context(
    params: ContextParams,
    registry: BuilderRegistry,
    host_window: HostWindow,
    path: PathBuf,
    tx: mpsc::UnboundedSender<SessionMsg>,
    timing: SessionConfig,
) -> Result<(IsolationContext, LoadReport), IsolationError> {
    let (context, report) = IsolationContext::launch(
        params,
        registry,
        host_window,
        timing.call_timeout(),
        timing.init_timeout(),
    )
    .await?;

    let handle = context.handle();
    let on_error = tx.clone();
    handle
        .subscribe(Subscription::new(
            move |created| {
                let _ = tx.send(SessionMsg::Created(created));
            },
            move |failed| {
                let _ = on_error.send(SessionMsg::Failed(failed));
            },
        ))
        .await?;

    if !handle.set_builder(path.clone()).await? {
        return Err(IsolationError::Initialization(format!(
            "no builder handles {}",
            path.display()
        )));
    }
    Ok((context, report))
}
