//! # onion
//!
//! Middleware registration and onion-style composition for async request
//! pipelines. Declare the layers once, peel them per request.
//!
//! ## The contract
//!
//! onion never looks at a request. Parsing, routing, sessions and file
//! uploads belong to the server around it. What onion owns:
//!
//! - **Registry** — global middleware (every request) and named middleware
//!   (per route), declared once at startup, optionally from TOML
//! - **Filter** — which namespaces run for this request, globals first
//! - **Resolver** — namespace → live middleware, through your container
//! - **Composer** — one nested chain where every layer can run code before
//!   and after everything inside it, or stop the request altogether
//!
//! The request and response contexts are opaque: each middleware gets a clone
//! of both. Use shared handles (`Arc<Mutex<_>>`, channels) for state that
//! handlers mutate.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use onion::{from_fn, Bindings, Kernel, MiddlewareConfig, Next, Registry, Result};
//!
//! type Trace = Arc<Mutex<Vec<&'static str>>>;
//!
//! async fn timing(trace: Trace, _res: (), next: Next) -> Result<()> {
//!     trace.lock().unwrap().push("timing start");
//!     next.run().await?;
//!     trace.lock().unwrap().push("timing end");
//!     Ok(())
//! }
//!
//! async fn auth(trace: Trace, _res: (), next: Next) -> Result<()> {
//!     trace.lock().unwrap().push("auth");
//!     next.run().await
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let config = MiddlewareConfig::from_toml(r#"
//!     global = ["App/Timing"]
//!
//!     [named]
//!     auth = "App/Auth"
//! "#)?;
//!
//! let mut ioc = Bindings::<Trace, ()>::new();
//! ioc.singleton("App/Timing", from_fn(timing))
//!    .singleton("App/Auth", from_fn(auth));
//!
//! let kernel = Kernel::new(Registry::from_config(&config), ioc);
//!
//! let trace = Trace::default();
//! kernel.handle(["auth"], true, Arc::clone(&trace), (), Next::noop()).await?;
//!
//! assert_eq!(*trace.lock().unwrap(), ["timing start", "auth", "timing end"]);
//! # Ok(())
//! # }
//! ```

mod compose;
mod error;
mod filter;
mod handler;
mod kernel;
mod registry;
mod resolver;

pub use compose::{compose, Pipeline};
pub use error::{Error, Result};
pub use handler::{from_fn, BoxFuture, BoxedMiddleware, FnMiddleware, Middleware, Next};
pub use kernel::Kernel;
pub use registry::{MiddlewareConfig, Registry};
pub use resolver::{resolve, Bindings, Container, Resolved, HANDLE};
