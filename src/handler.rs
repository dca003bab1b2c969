//! Middleware trait, the `next` continuation, and type erasure.
//!
//! # How middleware is stored
//!
//! A pipeline holds middleware of *different* concrete types in a single
//! `Vec`. Rust collections hold one type, so every entry is a trait object,
//! `Arc<dyn Middleware<Req, Res>>`, and each `handle` call returns a boxed
//! future.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! impl Middleware for Auth { fn handle(..) }        ← container binds this
//!   or
//! async fn timing(req, res, next) -> Result<()>     ← adapted with from_fn
//!        ↓
//! Arc<dyn Middleware<Req, Res>>                      ← BoxedMiddleware
//!        ↓  folded into a Next by compose()
//! next.run().await                                   ← one vtable dispatch
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves once a middleware (and
/// everything it chose to run downstream) has finished.
///
/// `Send` lets tokio move a running pipeline across worker threads.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A heap-allocated, type-erased middleware shared across concurrent requests.
pub type BoxedMiddleware<Req, Res> = Arc<dyn Middleware<Req, Res>>;

// ── Middleware ────────────────────────────────────────────────────────────────

/// A unit of request/response processing.
///
/// `handle` receives its own clone of the request and response contexts and
/// the continuation for everything downstream. It decides whether and when to
/// call [`Next::run`]:
///
/// - code before `next.run().await` runs on the way in,
/// - code after it runs on the way out,
/// - not calling it at all short-circuits the rest of the pipeline.
///
/// ```rust
/// use onion::{BoxFuture, Middleware, Next};
///
/// struct Auth;
///
/// impl Middleware<String, ()> for Auth {
///     fn handle(&self, token: String, _res: (), next: Next) -> BoxFuture<'_> {
///         Box::pin(async move {
///             if token.is_empty() {
///                 return Ok(()); // never reaches the rest of the chain
///             }
///             next.run().await
///         })
///     }
/// }
/// ```
pub trait Middleware<Req, Res>: Send + Sync + 'static {
    fn handle(&self, req: Req, res: Res, next: Next) -> BoxFuture<'_>;
}

impl<Req, Res, M> Middleware<Req, Res> for Arc<M>
where
    M: Middleware<Req, Res> + ?Sized,
{
    fn handle(&self, req: Req, res: Res, next: Next) -> BoxFuture<'_> {
        (**self).handle(req, res, next)
    }
}

// ── Function middleware ───────────────────────────────────────────────────────

/// Adapts a plain async function into a [`Middleware`].
///
/// ```rust
/// use onion::{from_fn, Next, Result};
///
/// async fn timing(_req: (), _res: (), next: Next) -> Result<()> {
///     let started = std::time::Instant::now();
///     next.run().await?;
///     let _elapsed = started.elapsed();
///     Ok(())
/// }
///
/// let mw = from_fn(timing);
/// # let _ = mw;
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F> {
    FnMiddleware(f)
}

/// Newtype bridging a function to the trait-object world. See [`from_fn`].
#[derive(Clone, Copy)]
pub struct FnMiddleware<F>(F);

impl<Req, Res, F, Fut> Middleware<Req, Res> for FnMiddleware<F>
where
    F: Fn(Req, Res, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, req: Req, res: Res, next: Next) -> BoxFuture<'_> {
        Box::pin((self.0)(req, res, next))
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The remainder of the pipeline.
///
/// Single use: [`run`](Next::run) consumes it, so the downstream chain can
/// run at most once per request. Dropping it without running is how a
/// middleware short-circuits.
pub struct Next {
    inner: Box<dyn FnOnce() -> BoxFuture<'static> + Send>,
}

impl Next {
    /// Wraps an arbitrary continuation, typically the route action that sits
    /// at the very centre of the pipeline.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self { inner: Box::new(move || -> BoxFuture<'static> { Box::pin(f()) }) }
    }

    /// The end of the pipeline: completes immediately and does nothing.
    pub fn noop() -> Self {
        Self::new(|| async { Ok(()) })
    }

    /// Runs everything downstream and resolves when it has finished.
    pub fn run(self) -> BoxFuture<'static> {
        (self.inner)()
    }

    /// Wraps `next` so that `mw` runs first with `next` as its continuation.
    pub(crate) fn wrap<Req, Res>(mw: BoxedMiddleware<Req, Res>, req: Req, res: Res, next: Next) -> Self
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        Self {
            inner: Box::new(move || -> BoxFuture<'static> {
                Box::pin(async move { mw.handle(req, res, next).await })
            }),
        }
    }
}

impl Default for Next {
    fn default() -> Self { Self::noop() }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}
