//! The isolate thread: private module state plus the builder host.
//!
//! Everything here runs on the context's own OS thread. Nothing it owns is
//! ever handed out by reference; requests arrive over the channel and results
//! leave as owned values.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::error::{HandleError, IsolationError, ResolveError};
use super::handle::{
    BuildFailed, BuildId, Container, ControlCreated, ControlId, ControlRef, Request, Subscription,
};
use super::module::ModuleTable;
use super::resolver::Resolvers;
use super::shadow::ShadowDir;
use super::{ContextParams, ContextShared, Lifecycle, LoadReport};
use crate::builder::{BuildCx, BuildError, Builder, BuilderRegistry};
use crate::control::{Control, ControlTypes};
use crate::debug;
use crate::surface::HostWindow;
use crate::utils::hash::ContentHash;

pub(super) struct Isolate {
    shared: Arc<ContextShared>,
    params: ContextParams,
    resolvers: Arc<Resolvers>,
    modules: ModuleTable,
    shadow: ShadowDir,
    /// Toolkit attachment, made once per isolate
    types: Option<ControlTypes>,
    host: Option<BuilderHost>,
    subscription: Option<Subscription>,
}

impl Isolate {
    pub(super) fn new(
        shared: Arc<ContextShared>,
        params: ContextParams,
        shadow: ShadowDir,
    ) -> Self {
        Self {
            shared,
            params,
            resolvers: Resolvers::new(),
            modules: ModuleTable::new(),
            shadow,
            types: None,
            host: None,
            subscription: None,
        }
    }

    pub(super) fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        let id = self.shared.id;
        debug!("isolate"; "#{id} started, staging at {}", self.shadow.path().display());

        while let Some(request) = rx.blocking_recv() {
            if matches!(request, Request::Shutdown) {
                break;
            }
            let name = request.name();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request)));
            if let Err(payload) = outcome {
                debug!("isolate"; "#{id} {name} panicked: {}", panic_message(payload));
            }
        }

        debug!("isolate"; "#{id} shutting down");
    }

    fn dispatch(&mut self, request: Request) {
        match request {
            Request::Init {
                registry,
                host_window,
                reply,
            } => {
                let init = AssertUnwindSafe(|| self.init(registry, host_window));
                let result = panic::catch_unwind(init).unwrap_or_else(|payload| {
                    Err(IsolationError::Initialization(panic_message(payload)))
                });
                let _ = reply.send(result);
            }
            Request::Subscribe {
                subscription,
                reply,
            } => {
                let result = if self.subscription.is_some() {
                    Err(HandleError::AlreadySubscribed)
                } else {
                    self.subscription = Some(subscription);
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Request::SetBuilder { path, reply } => {
                let result = self
                    .host_mut()
                    .and_then(|host| guarded(|| Ok(host.set_builder(path))));
                let _ = reply.send(result);
            }
            Request::Update {
                build,
                source,
                reply,
            } => {
                if let Err(e) = self.host_mut() {
                    let _ = reply.send(Err(e));
                    return;
                }
                let _ = reply.send(Ok(()));
                self.build(build, &source);
            }
            Request::GetContainer { reply } => {
                let context = self.shared.id;
                let result = self.host_mut().map(|host| host.container(context));
                let _ = reply.send(result);
            }
            Request::Invalidate { reply } => {
                let result = self.host_mut().map(|host| host.revision += 1);
                let _ = reply.send(result);
            }
            Request::Release { control } => {
                if let Ok(host) = self.host_mut() {
                    host.release(control);
                }
            }
            Request::Shutdown => {}
        }
    }

    fn host_mut(&mut self) -> Result<&mut BuilderHost, HandleError> {
        self.host
            .as_mut()
            .ok_or_else(|| HandleError::Remote("context is not initialized".into()))
    }

    fn init(
        &mut self,
        registry: BuilderRegistry,
        host_window: HostWindow,
    ) -> Result<LoadReport, IsolationError> {
        if self.host.is_some() {
            return Err(IsolationError::Initialization(
                "context is already initialized".into(),
            ));
        }
        self.attach_toolkit()?;

        let guard = self.resolvers.register(self.params.search_dirs.clone());
        let loaded = self.load_modules();
        guard.release();
        let output_hash = loaded?;

        let types = self
            .types
            .as_mut()
            .ok_or_else(|| IsolationError::Initialization("toolkit is not attached".into()))?;
        for module in self.modules.iter() {
            types
                .register(&module.image.name, &module.image.controls)
                .map_err(|base| {
                    IsolationError::Initialization(format!(
                        "module `{}` derives from unknown type {base}",
                        module.image.name
                    ))
                })?;
        }

        let report = LoadReport {
            modules: self.modules.len(),
            types: types.len(),
            output_hash,
        };
        self.host = Some(BuilderHost::new(registry, host_window));
        self.shared
            .transition(&[Lifecycle::Initializing], Lifecycle::Active);
        debug!(
            "isolate";
            "#{} active: {} modules, {} types",
            self.shared.id, report.modules, report.types
        );
        Ok(report)
    }

    /// Attach the toolkit for the configured platform, once.
    fn attach_toolkit(&mut self) -> Result<(), IsolationError> {
        if self.types.is_some() {
            return Ok(());
        }
        let types = ControlTypes::for_platform(&self.params.platform).ok_or_else(|| {
            IsolationError::Initialization(format!("unknown platform `{}`", self.params.platform))
        })?;
        self.types = Some(types);
        Ok(())
    }

    /// Dependencies first, then the main output; returns the output's hash.
    fn load_modules(&mut self) -> Result<Option<ContentHash>, ResolveError> {
        for dependency in &self.params.dependencies {
            self.modules
                .load_file(dependency, &mut self.shadow, &self.resolvers)?;
        }
        match &self.params.main_output {
            Some(output) => {
                let module = self
                    .modules
                    .load_file(output, &mut self.shadow, &self.resolvers)?;
                Ok(Some(module.hash))
            }
            None => Ok(None),
        }
    }

    /// Run one build and deliver exactly one callback.
    fn build(&mut self, build: BuildId, source: &str) {
        let context = self.shared.id;
        let (Some(host), Some(types)) = (self.host.as_mut(), self.types.as_ref()) else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| host.create(source, types)))
            .unwrap_or_else(|payload| {
                Err(BuildError::new(format!("builder panicked: {}", panic_message(payload))))
            });

        let Some(subscription) = &self.subscription else {
            debug!("isolate"; "#{context} build {build} finished without subscribers");
            return;
        };
        match outcome {
            Ok(control) => {
                let snapshot = control.clone();
                let id = host.retain(control);
                (subscription.on_created)(ControlCreated {
                    control: ControlRef { context, id },
                    build,
                    snapshot,
                });
            }
            Err(error) => (subscription.on_error)(BuildFailed {
                context,
                build,
                error,
            }),
        }
    }
}

/// The builder-hosting object.
struct BuilderHost {
    registry: BuilderRegistry,
    host_window: HostWindow,
    builder: Option<(Box<dyn Builder>, PathBuf)>,
    /// Controls the host may still have on screen
    retained: FxHashMap<ControlId, Control>,
    container: Option<ControlId>,
    revision: u64,
    next_control: u64,
}

impl BuilderHost {
    fn new(registry: BuilderRegistry, host_window: HostWindow) -> Self {
        Self {
            registry,
            host_window,
            builder: None,
            retained: FxHashMap::default(),
            container: None,
            revision: 0,
            next_control: 0,
        }
    }

    /// Replace the builder; the current one is kept when nothing matches.
    fn set_builder(&mut self, path: PathBuf) -> bool {
        let Some(info) = self.registry.find(&path) else {
            return false;
        };
        let builder = info.create();
        debug!("isolate"; "{} builder for {}", builder.kind(), path.display());
        self.builder = Some((builder, path));
        true
    }

    fn create(&mut self, source: &str, types: &ControlTypes) -> Result<Control, BuildError> {
        let Some((builder, path)) = self.builder.as_mut() else {
            return Err(BuildError::new("No builder configured"));
        };
        let cx = BuildCx {
            types,
            source_path: path,
            host_window: self.host_window,
        };
        builder.create(source, &cx)
    }

    fn retain(&mut self, control: Control) -> ControlId {
        self.next_control += 1;
        let id = ControlId(self.next_control);
        self.retained.insert(id, control);
        self.container = Some(id);
        id
    }

    fn container(&self, context: super::ContextId) -> Option<Container> {
        let id = self.container?;
        let snapshot = self.retained.get(&id)?.clone();
        Some(Container {
            control: ControlRef { context, id },
            snapshot,
            revision: self.revision,
        })
    }

    fn release(&mut self, id: ControlId) {
        self.retained.remove(&id);
        if self.container == Some(id) {
            self.container = None;
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> Result<T, HandleError>) -> Result<T, HandleError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(HandleError::Remote(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
