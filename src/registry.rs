//! Middleware registry and its configuration.
//!
//! Two collections, both keyed by plain strings:
//!
//! | Collection | Shape | Runs |
//! |---|---|---|
//! | **Global** | ordered list of namespaces | on every request that opts in |
//! | **Named** | key → namespace | only when a route asks for the key |
//!
//! Fill it once at startup, then hand it to a [`Kernel`](crate::Kernel).
//! There is no locking: the registry is written before serving and only read
//! afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;

// ── Config ────────────────────────────────────────────────────────────────────

/// Declarative middleware registration, usually kept next to the app kernel.
///
/// ```toml
/// global = ["App/Http/Middleware/Cors"]
///
/// [named]
/// auth = "App/Http/Middleware/Auth"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareConfig {
    pub global: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl MiddlewareConfig {
    /// Parses a TOML document.
    pub fn from_toml(src: &str) -> Result<Self> {
        Ok(toml::from_str(src)?)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Global and named middleware declarations.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    global: Vec<String>,
    named: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a parsed config: globals first, then named.
    pub fn from_config(config: &MiddlewareConfig) -> Self {
        let mut registry = Self::new();
        registry.load(config);
        registry
    }

    /// Appends everything in `config` to the current registrations.
    pub fn load(&mut self, config: &MiddlewareConfig) {
        self.register_global_batch(config.global.iter().cloned());
        self.register_named_batch(&config.named);
        info!(
            global = config.global.len(),
            named = config.named.len(),
            "middleware config loaded"
        );
    }

    /// Forgets every registration.
    pub fn reset(&mut self) {
        self.global.clear();
        self.named.clear();
    }

    /// Registers `key` as a global middleware when `namespace` is `None`,
    /// otherwise stores `namespace` under the named `key`.
    ///
    /// An empty namespace counts as no namespace, so `Some("")` registers a
    /// global. Globals may be registered twice; [`global`](Self::global)
    /// deduplicates. Named keys are overwritten by later registrations.
    pub fn register(&mut self, key: impl Into<String>, namespace: Option<&str>) {
        let key = key.into();
        match namespace.filter(|ns| !ns.is_empty()) {
            None => {
                debug!(namespace = %key, "global middleware registered");
                self.global.push(key);
            }
            Some(namespace) => {
                debug!(%key, namespace, "named middleware registered");
                self.named.insert(key, namespace.to_owned());
            }
        }
    }

    /// Appends globals in order.
    pub fn register_global_batch<I>(&mut self, namespaces: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.global.extend(namespaces.into_iter().map(Into::into));
    }

    /// Registers every key/namespace pair as named middleware.
    pub fn register_named_batch<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        for (key, namespace) in pairs {
            self.register(key, Some(namespace.as_ref()));
        }
    }

    /// Global middleware with duplicates removed, in first-registration order.
    pub fn global(&self) -> Vec<&str> {
        let mut seen = HashSet::with_capacity(self.global.len());
        self.global
            .iter()
            .map(String::as_str)
            .filter(|ns| seen.insert(*ns))
            .collect()
    }

    /// Every named middleware, key → namespace.
    pub fn named(&self) -> &HashMap<String, String> {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.named.is_empty()
    }
}
