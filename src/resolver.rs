//! Namespace → middleware resolution.
//!
//! The registry only knows strings. Turning `"App/Http/Middleware/Auth"` into
//! something callable is the container's job: [`resolve`] asks a
//! [`Container`] for the `handle` entry point bound under each namespace and
//! fails the whole batch on the first miss.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handler::{BoxedMiddleware, Middleware};

/// The method every resolved middleware is entered through.
pub const HANDLE: &str = "handle";

// ── Container ─────────────────────────────────────────────────────────────────

/// The lookup capability the resolver depends on.
///
/// Implemented by whatever dependency-injection container the application
/// uses. Whether `make` hands back a fresh instance or a shared one is the
/// container's contract, not the resolver's.
pub trait Container<Req, Res> {
    /// Returns the middleware bound to `namespace`, or `None` if nothing is.
    fn make(&self, namespace: &str) -> Option<BoxedMiddleware<Req, Res>>;
}

impl<Req, Res, C> Container<Req, Res> for Arc<C>
where
    C: Container<Req, Res> + ?Sized,
{
    fn make(&self, namespace: &str) -> Option<BoxedMiddleware<Req, Res>> {
        (**self).make(namespace)
    }
}

// ── Resolved ──────────────────────────────────────────────────────────────────

/// A middleware looked up for one request, tagged with the namespace it came
/// from.
pub struct Resolved<Req, Res> {
    namespace: String,
    handler: BoxedMiddleware<Req, Res>,
}

impl<Req, Res> Resolved<Req, Res> {
    /// Pairs an already-built middleware with a namespace, bypassing any
    /// container.
    pub fn new(namespace: impl Into<String>, handler: impl Middleware<Req, Res>) -> Self {
        Self { namespace: namespace.into(), handler: Arc::new(handler) }
    }

    pub fn namespace(&self) -> &str { &self.namespace }

    pub(crate) fn into_handler(self) -> BoxedMiddleware<Req, Res> {
        self.handler
    }
}

impl<Req, Res> fmt::Debug for Resolved<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved").field("namespace", &self.namespace).finish_non_exhaustive()
    }
}

/// Resolves every namespace in `references`, preserving order.
///
/// Stops at the first namespace the container cannot make and returns
/// [`Error::Resolution`] for it; nothing resolved before the miss is
/// returned.
pub fn resolve<Req, Res, C, I>(container: &C, references: I) -> Result<Vec<Resolved<Req, Res>>>
where
    C: Container<Req, Res> + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    references
        .into_iter()
        .map(|reference| {
            let namespace = reference.as_ref();
            match container.make(namespace) {
                Some(handler) => {
                    trace!(namespace, method = HANDLE, "resolved middleware");
                    Ok(Resolved { namespace: namespace.to_owned(), handler })
                }
                None => {
                    debug!(namespace, method = HANDLE, "middleware not bound in container");
                    Err(Error::Resolution { namespace: namespace.to_owned() })
                }
            }
        })
        .collect()
}

// ── Bindings ──────────────────────────────────────────────────────────────────

type Factory<Req, Res> = Box<dyn Fn() -> BoxedMiddleware<Req, Res> + Send + Sync>;

enum Binding<Req, Res> {
    Fresh(Factory<Req, Res>),
    Singleton(BoxedMiddleware<Req, Res>),
}

/// A minimal in-memory [`Container`].
///
/// Enough for applications that wire middleware by hand and for tests.
/// Rebinding a namespace replaces the previous binding.
///
/// ```rust
/// use onion::{from_fn, Bindings, Next, Result};
///
/// async fn cors(_req: (), _res: (), next: Next) -> Result<()> {
///     next.run().await
/// }
///
/// let mut ioc = Bindings::<(), ()>::new();
/// ioc.singleton("App/Http/Middleware/Cors", from_fn(cors));
/// ```
pub struct Bindings<Req, Res> {
    bindings: HashMap<String, Binding<Req, Res>>,
}

impl<Req, Res> Bindings<Req, Res> {
    pub fn new() -> Self {
        Self { bindings: HashMap::new() }
    }

    /// Binds `namespace` to a factory called on every resolution, so each
    /// request gets a fresh instance.
    pub fn bind<F, M>(&mut self, namespace: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Middleware<Req, Res>,
    {
        let factory: Factory<Req, Res> =
            Box::new(move || -> BoxedMiddleware<Req, Res> { Arc::new(factory()) });
        self.bindings.insert(namespace.into(), Binding::Fresh(factory));
        self
    }

    /// Binds `namespace` to one instance shared by every resolution.
    pub fn singleton(&mut self, namespace: impl Into<String>, instance: impl Middleware<Req, Res>) -> &mut Self {
        self.bindings.insert(namespace.into(), Binding::Singleton(Arc::new(instance)));
        self
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.bindings.contains_key(namespace)
    }
}

impl<Req, Res> Default for Bindings<Req, Res> {
    fn default() -> Self { Self::new() }
}

impl<Req, Res> Container<Req, Res> for Bindings<Req, Res> {
    fn make(&self, namespace: &str) -> Option<BoxedMiddleware<Req, Res>> {
        match self.bindings.get(namespace)? {
            Binding::Fresh(factory) => Some(factory()),
            Binding::Singleton(instance) => Some(Arc::clone(instance)),
        }
    }
}
