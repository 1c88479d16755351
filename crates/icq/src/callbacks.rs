//! Registry of query callbacks.

use std::{collections::BTreeMap, fmt};

use crate::{host::QueryHost, types::Query};

/// A function run with the verified response of a query.
///
/// Receives the host, the raw result bytes and the query as it was stored.
pub type QueryCallback<H> = fn(&mut H, &[u8], &Query) -> Result<(), <H as QueryHost>::Error>;

/// The query callbacks of one module, keyed by callback id.
///
/// Populated once at construction and read-only afterwards.
pub struct QueryCallbacks<H: QueryHost> {
    module: &'static str,
    callbacks: BTreeMap<&'static str, QueryCallback<H>>,
}

impl<H: QueryHost> QueryCallbacks<H> {
    /// Creates an empty registry for `module`.
    pub fn new(module: &'static str) -> Self {
        Self {
            module,
            callbacks: BTreeMap::new(),
        }
    }

    /// Registers a callback under `id`.
    pub fn with(mut self, id: &'static str, callback: QueryCallback<H>) -> Self {
        self.callbacks.insert(id, callback);
        self
    }

    /// The module the callbacks belong to.
    pub const fn module(&self) -> &'static str {
        self.module
    }

    /// Looks up a callback.
    pub fn get(&self, module: &str, id: &str) -> Option<QueryCallback<H>> {
        if module != self.module {
            return None;
        }

        self.callbacks.get(id).copied()
    }

    /// Returns `true` if a callback is registered under `(module, id)`.
    pub fn contains(&self, module: &str, id: &str) -> bool {
        self.get(module, id).is_some()
    }
}

impl<H: QueryHost> fmt::Debug for QueryCallbacks<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCallbacks")
            .field("module", &self.module)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}
