//! Onion composition.
//!
//! # How the chain is built
//!
//! [`compose`] captures the resolved middleware and the two contexts. Running
//! the [`Pipeline`] folds the list from last to first, each step wrapping the
//! previous continuation:
//!
//! ```text
//! [M1, M2, M3]
//!
//! next = noop                        ← or the caller's endpoint (run_with)
//! next = M3(req, res, next)
//! next = M2(req, res, next)
//! next = M1(req, res, next)          ← outermost, runs first
//! next.run().await
//! ```
//!
//! Each middleware sees everything after it as a single [`Next`]. Calling it
//! runs the inner layers to completion and resumes the caller, which gives
//! the familiar before/after interleaving:
//!
//! ```text
//! M1 before → M2 before → M3 before → M3 after → M2 after → M1 after
//! ```
//!
//! Errors travel back out the same way: a failing handler's `Err` is returned
//! from the `next.run().await` of whoever called it. Nothing in here catches.

use std::fmt;

use tracing::trace;

use crate::error::Result;
use crate::handler::Next;
use crate::resolver::Resolved;

/// A single request's middleware chain, ready to run exactly once.
pub struct Pipeline<Req, Res> {
    middleware: Vec<Resolved<Req, Res>>,
    req: Req,
    res: Res,
}

/// Composes `middleware` around the request and response contexts.
///
/// Position 0 is the outermost layer. Every handler receives its own clone of
/// `req` and `res`; pass shared handles if handlers need to mutate them.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use onion::{compose, from_fn, Next, Resolved, Result};
///
/// type Log = Arc<Mutex<Vec<&'static str>>>;
///
/// async fn outer(log: Log, _res: (), next: Next) -> Result<()> {
///     log.lock().unwrap().push("outer before");
///     next.run().await?;
///     log.lock().unwrap().push("outer after");
///     Ok(())
/// }
///
/// async fn inner(log: Log, _res: (), next: Next) -> Result<()> {
///     log.lock().unwrap().push("inner");
///     next.run().await
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let log = Log::default();
/// let chain = vec![
///     Resolved::new("Outer", from_fn(outer)),
///     Resolved::new("Inner", from_fn(inner)),
/// ];
///
/// compose(chain, Arc::clone(&log), ()).run().await?;
/// assert_eq!(*log.lock().unwrap(), ["outer before", "inner", "outer after"]);
/// # Ok(())
/// # }
/// ```
pub fn compose<Req, Res>(middleware: Vec<Resolved<Req, Res>>, req: Req, res: Res) -> Pipeline<Req, Res> {
    Pipeline { middleware, req, res }
}

impl<Req, Res> Pipeline<Req, Res>
where
    Req: Clone + Send + 'static,
    Res: Clone + Send + 'static,
{
    /// Runs the chain with a no-op at its centre.
    pub async fn run(self) -> Result<()> {
        self.run_with(Next::noop()).await
    }

    /// Runs the chain with `endpoint` as the innermost continuation, usually
    /// the route action. It only runs if every layer calls `next`.
    pub async fn run_with(self, endpoint: Next) -> Result<()> {
        trace!(layers = self.middleware.len(), "running middleware pipeline");
        self.into_next(endpoint).run().await
    }

    /// Folds the chain into one continuation without running it.
    pub fn into_next(self, endpoint: Next) -> Next {
        let Self { middleware, req, res } = self;
        middleware.into_iter().rev().fold(endpoint, |next, mw| {
            Next::wrap(mw.into_handler(), req.clone(), res.clone(), next)
        })
    }
}

impl<Req, Res> Pipeline<Req, Res> {
    /// Namespaces in execution order, outermost first.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.middleware.iter().map(Resolved::namespace)
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

impl<Req, Res> fmt::Debug for Pipeline<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("middleware", &self.middleware).finish_non_exhaustive()
    }
}
