//! Minimal onion example — a hyper server that runs every request through a
//! kernel of global and named middleware.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/admin
//!   curl -i -H 'authorization: Bearer letmein' http://localhost:3000/admin

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use onion::{from_fn, Bindings, Error, Kernel, MiddlewareConfig, Next, Registry, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

const CONFIG: &str = r#"
global = ["App/Middleware/Timing", "App/Middleware/RequestId"]

[named]
auth = "App/Middleware/Auth"
"#;

// ── Contexts ──────────────────────────────────────────────────────────────────

/// Read-only view of the incoming request, shared by every layer.
struct RequestCtx {
    method: http::Method,
    path: String,
    headers: http::HeaderMap,
}

type Req = Arc<RequestCtx>;

/// The response under construction. Layers write to it on the way out.
#[derive(Default)]
struct ResponseCtx {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

type Res = Arc<Mutex<ResponseCtx>>;

// ── Middleware ────────────────────────────────────────────────────────────────

async fn timing(req: Req, res: Res, next: Next) -> Result<()> {
    let started = Instant::now();
    next.run().await?;
    let elapsed = started.elapsed();
    let status = res.lock().unwrap().status;
    info!(method = %req.method, path = %req.path, status, ?elapsed, "request");
    Ok(())
}

async fn request_id(_req: Req, res: Res, next: Next) -> Result<()> {
    static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
    let id = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    res.lock().unwrap().headers.push(("x-request-id", id.to_string()));
    next.run().await
}

async fn auth(req: Req, res: Res, next: Next) -> Result<()> {
    let authorized = req
        .headers
        .get(http::header::AUTHORIZATION)
        .is_some_and(|v| v.as_bytes() == b"Bearer letmein");

    if !authorized {
        let mut res = res.lock().unwrap();
        res.status = 401;
        res.body = "unauthorized\n".into();
        return Ok(());
    }
    next.run().await
}

fn kernel() -> Result<Kernel<Bindings<Req, Res>>> {
    let config = MiddlewareConfig::from_toml(CONFIG)?;

    let mut ioc = Bindings::<Req, Res>::new();
    ioc.singleton("App/Middleware/Timing", from_fn(timing))
        .singleton("App/Middleware/RequestId", from_fn(request_id))
        .singleton("App/Middleware/Auth", from_fn(auth));

    let kernel = Kernel::new(Registry::from_config(&config), ioc);

    // Fail at startup, not on the first request that selects a typo.
    let registry = kernel.registry();
    let declared = registry
        .global()
        .into_iter()
        .chain(registry.named().values().map(String::as_str));
    for namespace in declared {
        if !kernel.container().contains(namespace) {
            return Err(Error::Resolution { namespace: namespace.to_owned() });
        }
    }

    Ok(kernel)
}

// ── Server ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let kernel = Arc::new(kernel().expect("middleware setup failed"));
    let addr: SocketAddr = "0.0.0.0:3000".parse().expect("invalid socket address");
    let listener = TcpListener::bind(addr).await.expect("bind failed");

    info!(%addr, "onion demo listening");

    // One task per connection; kept so shutdown can wait for them.
    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Poll shutdown before accept so Ctrl-C stops intake immediately.
            biased;

            _ = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let kernel = Arc::clone(&kernel);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request; every request gets its own pipeline.
                    let svc = service_fn(move |req| {
                        let kernel = Arc::clone(&kernel);
                        async move { dispatch(kernel, req).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connections so the set stays small.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    // Drain in-flight connections before exiting.
    while tasks.join_next().await.is_some() {}
    info!("onion demo stopped");
}

/// Picks the named middleware for a path, runs the pipeline around the
/// endpoint, and turns the response context into a hyper response.
async fn dispatch(
    kernel: Arc<Kernel<Bindings<Req, Res>>>,
    req: hyper::Request<hyper::body::Incoming>,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let ctx = Arc::new(RequestCtx {
        method: req.method().clone(),
        path: req.uri().path().to_owned(),
        headers: req.headers().clone(),
    });
    let res = Res::default();

    let keys: &[&str] = if ctx.path.starts_with("/admin") { &["auth"] } else { &[] };

    let endpoint = {
        let (ctx, res) = (Arc::clone(&ctx), Arc::clone(&res));
        Next::new(move || async move {
            let mut res = res.lock().unwrap();
            res.status = 200;
            res.body = format!("hello from {}\n", ctx.path);
            Ok(())
        })
    };

    if let Err(e) = kernel.handle(keys, true, Arc::clone(&ctx), Arc::clone(&res), endpoint).await {
        error!(path = %ctx.path, "pipeline failed: {e}");
        let mut res = res.lock().unwrap();
        res.status = 500;
        res.body = "internal server error\n".into();
    }

    let res = std::mem::take(&mut *res.lock().unwrap());
    let mut builder = http::Response::builder().status(res.status);
    for (name, value) in res.headers {
        builder = builder.header(name, value);
    }
    Ok(builder
        .body(Full::new(Bytes::from(res.body)))
        .unwrap_or_else(|_| http::Response::new(Full::new(Bytes::new()))))
}
