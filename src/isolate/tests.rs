use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::*;
use crate::builder::{BuildCx, BuildError, Builder, BuilderInfo};
use crate::config::BuilderConfig;
use crate::control::{Control, ControlType, PropValue};

const CALL: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Event {
    Created(ControlCreated),
    Failed(BuildFailed),
}

fn registry() -> BuilderRegistry {
    BuilderRegistry::with_defaults(&BuilderConfig::default(), Path::new("."))
}

async fn launch(params: ContextParams) -> Result<IsolationContext, IsolationError> {
    IsolationContext::launch(params, registry(), HostWindow::default(), CALL, CALL)
        .await
        .map(|(context, _)| context)
}

async fn subscribed(context: &IsolationContext) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    let tx2 = tx.clone();
    context
        .handle()
        .subscribe(Subscription::new(
            move |e| {
                let _ = tx.send(Event::Created(e));
            },
            move |e| {
                let _ = tx2.send(Event::Failed(e));
            },
        ))
        .await
        .unwrap();
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(CALL, rx.recv())
        .await
        .expect("no callback")
        .expect("channel closed")
}

async fn join(context: IsolationContext) {
    tokio::task::spawn_blocking(move || context.join())
        .await
        .unwrap();
}

fn write_module(
    dir: &Path,
    name: &str,
    references: &[&str],
    controls: Vec<ControlType>,
) -> PathBuf {
    let image = ModuleImage {
        format: MODULE_FORMAT,
        name: name.to_string(),
        references: references.iter().map(|r| r.to_string()).collect(),
        controls,
    };
    let path = dir.join(format!("{name}.{MODULE_EXT}"));
    fs::write(&path, serde_json::to_vec(&image).unwrap()).unwrap();
    path
}

fn banner_type() -> ControlType {
    ControlType {
        name: "Banner".into(),
        base: "Label".into(),
        props: [("Text".to_string(), PropValue::Str("hello".into()))].into(),
        padding: Some(4),
    }
}

fn project_params(dir: &Path, output: PathBuf) -> ContextParams {
    ContextParams {
        platform: "headless".into(),
        main_output: Some(output),
        dependencies: Vec::new(),
        search_dirs: vec![dir.to_path_buf()],
    }
}

#[tokio::test]
async fn test_build_success_delivers_one_control() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    assert_eq!(context.state(), Lifecycle::Active);
    let mut events = subscribed(&context).await;
    let handle = context.handle();

    assert!(handle.set_builder("view.ui".into()).await.unwrap());
    handle.update(1, "Content = new Label();".into()).await.unwrap();

    let Event::Created(created) = next(&mut events).await else {
        panic!("expected a control");
    };
    assert_eq!(created.build, 1);
    assert_eq!(created.control.context, context.id());
    assert_eq!(created.snapshot.children[0].kind, "Label");

    let container = handle.get_container().await.unwrap().unwrap();
    assert_eq!(container.control, created.control);
    assert_eq!(container.revision, 0);
    handle.invalidate().await.unwrap();
    assert_eq!(handle.get_container().await.unwrap().unwrap().revision, 1);

    join(context).await;
}

#[tokio::test]
async fn test_build_failure_reports_error() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let mut events = subscribed(&context).await;
    let handle = context.handle();

    handle.set_builder("view.ui".into()).await.unwrap();
    handle.update(7, "Content = new Labl();".into()).await.unwrap();

    let Event::Failed(failed) = next(&mut events).await else {
        panic!("expected a failure");
    };
    assert_eq!(failed.build, 7);
    assert_eq!(failed.error.message, "Labl is undefined");
    assert!(handle.get_container().await.unwrap().is_none());
}

#[tokio::test]
async fn test_runaway_nesting_fails_the_build() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let mut events = subscribed(&context).await;
    let handle = context.handle();

    let sources = [
        ("view.ui", format!("Items = {};", "[".repeat(200_000))),
        (
            "view.ui.xml",
            "<StackLayout>".repeat(200_000) + &"</StackLayout>".repeat(200_000),
        ),
    ];
    for (build, (path, source)) in (1..).zip(sources) {
        assert!(handle.set_builder(path.into()).await.unwrap());
        handle.update(build, source).await.unwrap();
        let Event::Failed(failed) = next(&mut events).await else {
            panic!("expected a failure");
        };
        assert_eq!(failed.build, build);
        assert!(failed.error.message.starts_with("nesting too deep"));
    }

    // The isolate is still serving requests
    handle.update(3, "<Label/>".into()).await.unwrap();
    assert!(matches!(next(&mut events).await, Event::Created(_)));
    join(context).await;
}

#[tokio::test]
async fn test_update_without_builder_fails_once() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let mut events = subscribed(&context).await;

    context.handle().update(1, String::new()).await.unwrap();
    let Event::Failed(failed) = next(&mut events).await else {
        panic!("expected a failure");
    };
    assert_eq!(failed.error.message, "No builder configured");
}

#[tokio::test]
async fn test_unknown_suffix_keeps_builder() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let mut events = subscribed(&context).await;
    let handle = context.handle();

    assert!(handle.set_builder("view.ui".into()).await.unwrap());
    assert!(!handle.set_builder("view.rs".into()).await.unwrap());

    handle.update(1, "Content = new Button();".into()).await.unwrap();
    assert!(matches!(next(&mut events).await, Event::Created(_)));
}

#[tokio::test]
async fn test_second_subscribe_is_rejected() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let _events = subscribed(&context).await;
    let err = context
        .handle()
        .subscribe(Subscription::new(|_| {}, |_| {}))
        .await
        .unwrap_err();
    assert_eq!(err, HandleError::AlreadySubscribed);
}

#[tokio::test]
async fn test_calls_after_unload_fail_cleanly() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let id = context.id();
    let handle = context.handle();

    join(context).await;
    assert!(!handle.is_valid());

    let err = handle.set_builder("view.ui".into()).await.unwrap_err();
    assert_eq!(err, HandleError::InvalidAfterUnload(id));
    let err = handle.update(1, String::new()).await.unwrap_err();
    assert_eq!(err, HandleError::InvalidAfterUnload(id));
    assert!(handle.get_container().await.is_err());
    handle.release(ControlRef {
        context: id,
        id: ControlId(1),
    });
}

#[tokio::test]
async fn test_unload_is_idempotent() {
    let context = IsolationContext::create(ContextParams::builtin("headless"), CALL).unwrap();
    assert_eq!(context.state(), Lifecycle::Initializing);
    context.unload();
    context.unload();
    assert!(matches!(
        context.state(),
        Lifecycle::Unloading | Lifecycle::Unloaded
    ));
    let shared = std::sync::Arc::clone(&context.shared);
    join(context).await;
    assert_eq!(shared.state(), Lifecycle::Unloaded);
}

#[tokio::test]
async fn test_unknown_platform_tears_down() {
    let context = IsolationContext::create(ContextParams::builtin("amiga"), CALL).unwrap();
    let err = context
        .initialize(registry(), HostWindow::default(), CALL)
        .await
        .unwrap_err();
    assert!(matches!(err, IsolationError::Initialization(ref m) if m.contains("amiga")));
    assert_ne!(context.state(), Lifecycle::Active);

    let handle = context.handle();
    join(context).await;
    assert!(handle.update(1, String::new()).await.is_err());
}

#[tokio::test]
async fn test_module_types_available_to_builds() {
    let dir = TempDir::new().unwrap();
    write_module(dir.path(), "widgets", &[], vec![banner_type()]);
    let app = write_module(dir.path(), "app", &["widgets"], Vec::new());

    let (context, report) = IsolationContext::launch(
        project_params(dir.path(), app.clone()),
        registry(),
        HostWindow::default(),
        CALL,
        CALL,
    )
    .await
    .unwrap();
    assert_eq!(report.modules, 2);
    assert_eq!(
        report.output_hash,
        Some(crate::utils::hash::file_hash(&app).unwrap())
    );

    let mut events = subscribed(&context).await;
    let handle = context.handle();
    handle.set_builder("view.ui".into()).await.unwrap();
    handle.update(1, "Content = new Banner();".into()).await.unwrap();

    let Event::Created(created) = next(&mut events).await else {
        panic!("expected a control");
    };
    let banner = &created.snapshot.children[0];
    assert_eq!(banner.prop("Text"), Some(&PropValue::Str("hello".into())));
}

#[tokio::test]
async fn test_outputs_free_while_context_active() {
    let dir = TempDir::new().unwrap();
    let app = write_module(dir.path(), "app", &[], vec![banner_type()]);
    let context = launch(project_params(dir.path(), app.clone())).await.unwrap();

    // The next compile overwrites, then deletes, the loaded output
    fs::write(&app, b"partially written").unwrap();
    fs::remove_file(&app).unwrap();

    let mut events = subscribed(&context).await;
    let handle = context.handle();
    handle.set_builder("view.ui".into()).await.unwrap();
    handle.update(1, "Content = new Banner();".into()).await.unwrap();
    assert!(matches!(next(&mut events).await, Event::Created(_)));
}

#[tokio::test]
async fn test_corrupt_dependency_propagates() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.pvm"), b"MZ\x90\x00").unwrap();
    let app = write_module(dir.path(), "app", &["broken"], Vec::new());

    let err = launch(project_params(dir.path(), app)).await.unwrap_err();
    assert!(matches!(
        err,
        IsolationError::Resolution(ResolveError::Load { ref path, .. }) if path.ends_with("broken.pvm")
    ));
}

#[tokio::test]
async fn test_missing_reference_is_resolution_failure() {
    let dir = TempDir::new().unwrap();
    let app = write_module(dir.path(), "app", &["ghost"], Vec::new());

    let err = launch(project_params(dir.path(), app)).await.unwrap_err();
    assert!(matches!(
        err,
        IsolationError::Resolution(ResolveError::NotFound { ref name, .. }) if name == "ghost"
    ));
}

#[tokio::test]
async fn test_release_drops_container() {
    let context = launch(ContextParams::builtin("headless")).await.unwrap();
    let mut events = subscribed(&context).await;
    let handle = context.handle();
    handle.set_builder("view.ui".into()).await.unwrap();
    handle.update(1, "Content = new Label();".into()).await.unwrap();
    let Event::Created(created) = next(&mut events).await else {
        panic!("expected a control");
    };

    handle.release(created.control);
    assert!(handle.get_container().await.unwrap().is_none());
}

struct Exploding;

impl Builder for Exploding {
    fn kind(&self) -> &'static str {
        "exploding"
    }

    fn create(&mut self, _: &str, _: &BuildCx<'_>) -> Result<Control, BuildError> {
        panic!("user code blew up")
    }
}

#[tokio::test]
async fn test_builder_panic_becomes_build_failure() {
    let registry = BuilderRegistry::new(vec![BuilderInfo::new("exploding", ".boom", || {
        Box::new(Exploding)
    })]);
    let (context, _) = IsolationContext::launch(
        ContextParams::builtin("headless"),
        registry,
        HostWindow::default(),
        CALL,
        CALL,
    )
    .await
    .unwrap();
    let mut events = subscribed(&context).await;
    let handle = context.handle();

    assert!(handle.set_builder("x.boom".into()).await.unwrap());
    handle.update(3, String::new()).await.unwrap();
    let Event::Failed(failed) = next(&mut events).await else {
        panic!("expected a failure");
    };
    assert!(failed.error.message.contains("user code blew up"));

    // The context survives
    assert!(handle.get_container().await.is_ok());
}

#[test]
fn test_search_dirs_order_and_dedup() {
    let project = crate::config::ProjectConfig {
        platform: "gtk".into(),
        output: Some("/work/out/app.pvm".into()),
        dependencies: vec!["/work/out/base.pvm".into(), "/work/libs/w.pvm".into()],
        search_dirs: vec!["/opt/modules".into(), "/work/libs".into()],
    };
    let params = ContextParams::from_project(&project);
    let tail: Vec<_> = params
        .search_dirs
        .iter()
        .filter(|d| d.starts_with("/work") || d.starts_with("/opt"))
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![
            PathBuf::from("/work/out"),
            PathBuf::from("/work/libs"),
            PathBuf::from("/opt/modules"),
        ]
    );
    assert_eq!(params, ContextParams::from_project(&project));
}
