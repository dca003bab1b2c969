//! Per-request dispatch glue.
//!
//! The [`Kernel`] is what a server holds on to: the registry filled at
//! startup and the container that can build middleware. For every request it
//! runs the same three steps:
//!
//! ```text
//! filter(keys, include_global)  → namespaces
//! resolve(namespaces)           → Vec<Resolved>    (aborts on first miss)
//! compose(resolved, req, res)   → Pipeline         (run once)
//! ```

use tracing::debug;

use crate::compose::{compose, Pipeline};
use crate::error::Result;
use crate::handler::Next;
use crate::registry::Registry;
use crate::resolver::{resolve, Container};

/// A registry and the container its namespaces resolve against.
///
/// Build it once, wrap it in an `Arc`, and share it with every connection
/// task. It is only read while serving.
///
/// ```rust
/// use onion::{from_fn, Bindings, Kernel, Next, Registry, Result};
///
/// async fn cors(_req: (), _res: (), next: Next) -> Result<()> {
///     next.run().await
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let mut registry = Registry::new();
/// registry.register("App/Cors", None);
///
/// let mut ioc = Bindings::<(), ()>::new();
/// ioc.singleton("App/Cors", from_fn(cors));
///
/// let kernel = Kernel::new(registry, ioc);
/// kernel.handle(["auth"], true, (), (), Next::noop()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Kernel<C> {
    registry: Registry,
    container: C,
}

impl<C> Kernel<C> {
    pub fn new(registry: Registry, container: C) -> Self {
        Self { registry, container }
    }

    pub fn registry(&self) -> &Registry { &self.registry }
    pub fn container(&self) -> &C { &self.container }

    /// Filters, resolves and composes the middleware for one request.
    ///
    /// Fails with [`Error::Resolution`](crate::Error::Resolution) before any
    /// handler has run if a selected namespace is not bound.
    pub fn pipeline<Req, Res, I>(
        &self,
        keys: I,
        include_global: bool,
        req: Req,
        res: Res,
    ) -> Result<Pipeline<Req, Res>>
    where
        C: Container<Req, Res>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let selected = self.registry.filter(keys, include_global);
        debug!(middleware = ?selected, "middleware selected");
        let resolved = resolve(&self.container, selected)?;
        Ok(compose(resolved, req, res))
    }

    /// Builds the pipeline for one request and runs it around `endpoint`.
    pub async fn handle<Req, Res, I>(
        &self,
        keys: I,
        include_global: bool,
        req: Req,
        res: Res,
        endpoint: Next,
    ) -> Result<()>
    where
        C: Container<Req, Res>,
        Req: Clone + Send + 'static,
        Res: Clone + Send + 'static,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.pipeline(keys, include_global, req, res)?
            .run_with(endpoint)
            .await
    }
}
