//! The environment the query layer runs in.

use std::fmt;

use liquid_stake_db::KvStore;
use liquid_stake_primitives::types::BlockInfo;

use crate::{
    callbacks::QueryCallback,
    errors::QueryError,
    light_client::LightClient,
    types::QueryRequest,
};

/// Access to the state and collaborators the query keeper needs.
///
/// Implemented by the application that owns the store. Callbacks receive the same host, so they
/// can read and write any state the application exposes through it.
pub trait QueryHost: Sized {
    /// The error returned by callbacks. Query layer failures convert into it.
    type Error: From<QueryError> + fmt::Display;

    /// The state store.
    fn store(&self) -> &KvStore;

    /// The state store, mutably.
    fn store_mut(&mut self) -> &mut KvStore;

    /// The block currently being executed.
    fn block(&self) -> BlockInfo;

    /// The light client used to verify response proofs.
    fn light_client(&self) -> &dyn LightClient;

    /// Looks up the callback registered under `(module, callback_id)`.
    fn query_callback(&self, module: &str, callback_id: &str) -> Option<QueryCallback<Self>>;

    /// Hands a request event to the relayer.
    fn emit_query_request(&mut self, request: QueryRequest);

    /// Runs `f` in a nested store transaction that is rolled back if `f` fails.
    fn transact<T, F>(&mut self, f: F) -> Result<T, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Self::Error>,
    {
        self.store_mut().begin();
        match f(self) {
            Ok(value) => {
                self.store_mut().commit().map_err(QueryError::from)?;
                Ok(value)
            }
            Err(err) => {
                self.store_mut().rollback().map_err(QueryError::from)?;
                Err(err)
            }
        }
    }
}
