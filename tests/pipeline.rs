use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onion::{
    from_fn, resolve, BoxFuture, Bindings, Error, Kernel, Middleware, Next, Registry, Result,
};

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records its name before and after the rest of the chain.
struct Wrap(&'static str);

impl Middleware<Log, ()> for Wrap {
    fn handle(&self, log: Log, _res: (), next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            push(&log, format!("{}-before", self.0));
            next.run().await?;
            push(&log, format!("{}-after", self.0));
            Ok(())
        })
    }
}

/// Never calls `next`, but still has code after where the call would be.
struct Halt(&'static str);

impl Middleware<Log, ()> for Halt {
    fn handle(&self, log: Log, _res: (), next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            push(&log, format!("{}-before", self.0));
            drop(next);
            push(&log, format!("{}-after", self.0));
            Ok(())
        })
    }
}

/// Fails before reaching `next`.
struct Fail;

impl Middleware<Log, ()> for Fail {
    fn handle(&self, log: Log, _res: (), _next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            push(&log, "fail");
            Err(Error::handler(io::Error::other("boom")))
        })
    }
}

/// Records the error coming out of the chain instead of propagating it.
struct Recover;

impl Middleware<Log, ()> for Recover {
    fn handle(&self, log: Log, _res: (), next: Next) -> BoxFuture<'_> {
        Box::pin(async move {
            if let Err(err) = next.run().await {
                let cause = std::error::Error::source(&err).map(ToString::to_string);
                push(&log, format!("recovered: {err} ({})", cause.unwrap_or_default()));
            }
            Ok(())
        })
    }
}

fn kernel(global: &[&str], named: &[(&str, &str)]) -> Kernel<Bindings<Log, ()>> {
    let mut registry = Registry::new();
    registry.register_global_batch(global.iter().copied());
    registry.register_named_batch(named.iter().copied());

    let mut ioc = Bindings::new();
    ioc.singleton("M1", Wrap("M1"))
        .singleton("M2", Wrap("M2"))
        .singleton("M3", Wrap("M3"))
        .singleton("Halt", Halt("M2"))
        .singleton("Fail", Fail)
        .singleton("Recover", Recover);

    Kernel::new(registry, ioc)
}

fn endpoint(log: &Log) -> Next {
    let log = Arc::clone(log);
    Next::new(move || async move {
        push(&log, "endpoint");
        Ok(())
    })
}

#[tokio::test]
async fn runs_as_an_onion() {
    let kernel = kernel(&["M1", "M2", "M3"], &[]);
    let log = Log::default();

    kernel.handle(Vec::<&str>::new(), true, Arc::clone(&log), (), Next::noop()).await.unwrap();

    assert_eq!(
        entries(&log),
        ["M1-before", "M2-before", "M3-before", "M3-after", "M2-after", "M1-after"]
    );
}

#[tokio::test]
async fn globals_wrap_named_middleware() {
    let kernel = kernel(&["M1"], &[("b", "M3"), ("a", "M2")]);
    let log = Log::default();

    kernel.handle(["a", "b"], true, Arc::clone(&log), (), endpoint(&log)).await.unwrap();

    assert_eq!(
        entries(&log),
        [
            "M1-before", "M2-before", "M3-before",
            "endpoint",
            "M3-after", "M2-after", "M1-after",
        ]
    );
}

#[tokio::test]
async fn globals_are_skipped_when_not_requested() {
    let kernel = kernel(&["M1"], &[("a", "M2")]);
    let log = Log::default();

    kernel.handle(["a"], false, Arc::clone(&log), (), Next::noop()).await.unwrap();

    assert_eq!(entries(&log), ["M2-before", "M2-after"]);
}

#[tokio::test]
async fn skipping_next_short_circuits() {
    let kernel = kernel(&["M1", "Halt", "M3"], &[]);
    let log = Log::default();

    kernel.handle(Vec::<&str>::new(), true, Arc::clone(&log), (), endpoint(&log)).await.unwrap();

    assert_eq!(entries(&log), ["M1-before", "M2-before", "M2-after", "M1-after"]);
}

#[tokio::test]
async fn handler_errors_propagate_through_enclosing_layers() {
    let kernel = kernel(&["M1", "M2", "Fail", "M3"], &[]);
    let log = Log::default();

    let err = kernel
        .handle(Vec::<&str>::new(), true, Arc::clone(&log), (), Next::noop())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Handler(_)));
    assert_eq!(err.to_string(), "middleware failed");
    let source = std::error::Error::source(&err).expect("handler error keeps its cause");
    assert_eq!(source.to_string(), "boom");
    // Code after `next` never runs in the layers the error passed through.
    assert_eq!(entries(&log), ["M1-before", "M2-before", "fail"]);
}

#[tokio::test]
async fn outer_layer_can_recover() {
    let kernel = kernel(&["Recover", "M1", "Fail"], &[]);
    let log = Log::default();

    kernel.handle(Vec::<&str>::new(), true, Arc::clone(&log), (), Next::noop()).await.unwrap();

    assert_eq!(
        entries(&log),
        ["M1-before", "fail", "recovered: middleware failed (boom)"]
    );
}

#[tokio::test]
async fn unresolvable_namespace_runs_nothing() {
    let kernel = kernel(&["M1", "Nope", "M2"], &[]);
    let log = Log::default();

    let err = kernel
        .handle(Vec::<&str>::new(), true, Arc::clone(&log), (), endpoint(&log))
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::Resolution { namespace } if namespace == "Nope"));
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn unknown_named_keys_are_ignored() {
    let kernel = kernel(&[], &[("a", "M1")]);
    let log = Log::default();

    kernel.handle(["missing", "a"], false, Arc::clone(&log), (), Next::noop()).await.unwrap();

    assert_eq!(entries(&log), ["M1-before", "M1-after"]);
}

#[tokio::test]
async fn handlers_can_suspend_around_next() {
    async fn slow(log: Log, _res: (), next: Next) -> Result<()> {
        push(&log, "slow-before");
        tokio::time::sleep(Duration::from_millis(5)).await;
        next.run().await?;
        tokio::task::yield_now().await;
        push(&log, "slow-after");
        Ok(())
    }

    let mut ioc = Bindings::<Log, ()>::new();
    ioc.singleton("Slow", from_fn(slow)).singleton("M1", Wrap("M1"));

    let log = Log::default();
    let resolved = resolve(&ioc, ["Slow", "M1"]).unwrap();
    onion::compose(resolved, Arc::clone(&log), ()).run_with(endpoint(&log)).await.unwrap();

    assert_eq!(
        entries(&log),
        ["slow-before", "M1-before", "endpoint", "M1-after", "slow-after"]
    );
}

#[tokio::test]
async fn concurrent_requests_do_not_share_chains() {
    let kernel = Arc::new(kernel(&["M1"], &[("a", "M2")]));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let kernel = Arc::clone(&kernel);
            tokio::spawn(async move {
                let log = Log::default();
                kernel.handle(["a"], true, Arc::clone(&log), (), Next::noop()).await.unwrap();
                entries(&log)
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), ["M1-before", "M2-before", "M2-after", "M1-after"]);
    }
}

#[tokio::test]
async fn fresh_bindings_build_one_instance_per_resolution() {
    static BUILT: AtomicUsize = AtomicUsize::new(0);

    let mut ioc = Bindings::<Log, ()>::new();
    ioc.bind("Counted", || {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Wrap("counted")
    });

    let mut registry = Registry::new();
    registry.register("Counted", None);
    let kernel = Kernel::new(registry, ioc);

    for _ in 0..3 {
        kernel.handle(Vec::<&str>::new(), true, Log::default(), (), Next::noop()).await.unwrap();
    }
    assert_eq!(BUILT.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn response_context_reaches_every_layer() {
    type Headers = Arc<Mutex<Vec<(String, String)>>>;

    async fn cors(_req: (), res: Headers, next: Next) -> Result<()> {
        next.run().await?;
        res.lock().unwrap().push(("access-control-allow-origin".into(), "*".into()));
        Ok(())
    }

    async fn request_id(_req: (), res: Headers, next: Next) -> Result<()> {
        res.lock().unwrap().push(("x-request-id".into(), "42".into()));
        next.run().await
    }

    let mut ioc = Bindings::<(), Headers>::new();
    ioc.singleton("Cors", from_fn(cors)).singleton("RequestId", from_fn(request_id));

    let mut registry = Registry::new();
    registry.register_global_batch(["Cors", "RequestId"]);

    let headers = Headers::default();
    Kernel::new(registry, ioc)
        .handle(Vec::<&str>::new(), true, (), Arc::clone(&headers), Next::noop())
        .await
        .unwrap();

    let names: Vec<_> = headers.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(names, ["x-request-id", "access-control-allow-origin"]);
}

#[test]
fn kernel_exposes_registry_and_container_for_startup_checks() {
    let kernel = kernel(&["M1", "Nope"], &[("a", "M2"), ("b", "Gone")]);

    let registry = kernel.registry();
    let mut unbound: Vec<_> = registry
        .global()
        .into_iter()
        .chain(registry.named().values().map(String::as_str))
        .filter(|ns| !kernel.container().contains(ns))
        .collect();
    unbound.sort_unstable();

    assert_eq!(unbound, ["Gone", "Nope"]);
}
