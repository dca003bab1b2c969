//! Per-request middleware selection.

use std::collections::HashSet;

use crate::registry::Registry;

impl Registry {
    /// Picks the namespaces to run for one request.
    ///
    /// `keys` are named-middleware keys, looked up in request order; keys that
    /// were never registered are dropped without complaint, and a key asked
    /// for twice is only selected once. With `include_global`, the
    /// deduplicated globals come first, whatever order the caller asked for.
    /// Globals and named entries are not deduplicated against each other.
    ///
    /// ```rust
    /// use onion::Registry;
    ///
    /// let mut reg = Registry::new();
    /// reg.register_global_batch(["G1", "G2"]);
    /// reg.register_named_batch([("a", "A"), ("b", "B")]);
    ///
    /// assert_eq!(reg.filter(["b", "a", "zzz"], false), ["B", "A"]);
    /// assert_eq!(reg.filter(["a"], true), ["G1", "G2", "A"]);
    /// ```
    pub fn filter<I>(&self, keys: I, include_global: bool) -> Vec<&str>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let named = keys.into_iter().filter_map(move |key| {
            let (key, namespace) = self.named().get_key_value(key.as_ref())?;
            seen.insert(key.as_str()).then_some(namespace.as_str())
        });

        if include_global {
            self.global().into_iter().chain(named).collect()
        } else {
            named.collect()
        }
    }
}
