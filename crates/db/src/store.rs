//! In-memory ordered key-value store with nested transactions.

use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    errors::{DbError, DbResult},
    keys::KeyBuf,
    prefix::TablePrefix,
    row_spec::{KVRowSpec, PackableKey, SerializableValue},
};

/// Pending writes of one transaction. `None` marks a deletion.
type Layer = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// An ordered byte store.
///
/// Writes land in the innermost open transaction, or directly in committed state when none is
/// open. Reads see the merged view of every open layer over committed state.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    layers: Vec<Layer>,
}

impl KvStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open transactions.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Opens a new transaction on top of any open ones.
    pub fn begin(&mut self) {
        self.layers.push(Layer::new());
        trace!(depth = self.layers.len(), "opened store transaction");
    }

    /// Commits the innermost transaction into its parent.
    pub fn commit(&mut self) -> DbResult<()> {
        let layer = self.layers.pop().ok_or(DbError::NoOpenTransaction)?;
        let writes = layer.len();

        match self.layers.last_mut() {
            Some(parent) => parent.extend(layer),
            None => {
                for (key, value) in layer {
                    match value {
                        Some(value) => self.committed.insert(key, value),
                        None => self.committed.remove(&key),
                    };
                }
            }
        }

        trace!(depth = self.layers.len(), %writes, "committed store transaction");
        Ok(())
    }

    /// Discards the innermost transaction.
    pub fn rollback(&mut self) -> DbResult<()> {
        let layer = self.layers.pop().ok_or(DbError::NoOpenTransaction)?;
        trace!(depth = self.layers.len(), writes = layer.len(), "rolled back store transaction");
        Ok(())
    }

    /// Reads the raw value under `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.get(key) {
                return value.clone();
            }
        }

        self.committed.get(key).cloned()
    }

    /// Writes the raw value under `key`.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.insert(key, Some(value));
            }
            None => {
                self.committed.insert(key, value);
            }
        }
    }

    /// Deletes the raw value under `key`.
    pub fn delete(&mut self, key: &[u8]) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.insert(key.to_vec(), None);
            }
            None => {
                self.committed.remove(key);
            }
        }
    }

    /// Returns every live `(key, value)` pair whose key starts with `prefix`, in key order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> {
        let in_range = |key: &&Vec<u8>| key.starts_with(prefix);

        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .committed
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| in_range(key))
            .map(|(key, value)| (key.clone(), Some(value.clone())))
            .collect();

        for layer in &self.layers {
            merged.extend(
                layer
                    .range(prefix.to_vec()..)
                    .take_while(|(key, _)| in_range(key))
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
        }

        merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
    }

    /// Reads a typed row.
    pub fn get_row<R: KVRowSpec>(&self, key: &R::Key) -> DbResult<Option<R::Value>> {
        let key = R::PREFIX.prepend(&key.pack()?);
        self.get(&key)
            .map(|bytes| R::Value::deserialize(&bytes))
            .transpose()
    }

    /// Returns `true` if a typed row exists.
    pub fn has_row<R: KVRowSpec>(&self, key: &R::Key) -> DbResult<bool> {
        let key = R::PREFIX.prepend(&key.pack()?);
        Ok(self.get(&key).is_some())
    }

    /// Writes a typed row.
    pub fn put_row<R: KVRowSpec>(&mut self, key: &R::Key, value: &R::Value) -> DbResult<()> {
        let key = R::PREFIX.prepend(&key.pack()?);
        let value = value.serialize()?;
        self.set(key, value);
        Ok(())
    }

    /// Deletes a typed row.
    pub fn delete_row<R: KVRowSpec>(&mut self, key: &R::Key) -> DbResult<()> {
        let key = R::PREFIX.prepend(&key.pack()?);
        self.delete(&key);
        Ok(())
    }

    /// Lazily decodes every row of table `R` whose key body starts with `key_prefix`.
    pub fn iter_rows<R: KVRowSpec>(
        &self,
        key_prefix: &[u8],
    ) -> impl Iterator<Item = DbResult<(R::Key, R::Value)>> {
        let prefix = R::PREFIX.prepend(key_prefix);
        self.iter_prefix(&prefix).map(|(key, value)| {
            let key = R::Key::unpack(&key[1..])?;
            let value = R::Value::deserialize(&value)?;
            Ok((key, value))
        })
    }

    /// Collects every row of table `R` whose key body starts with `key_prefix`.
    pub fn collect_rows<R: KVRowSpec>(
        &self,
        key_prefix: &[u8],
    ) -> DbResult<Vec<(R::Key, R::Value)>> {
        self.iter_rows::<R>(key_prefix).collect()
    }

    /// Returns the next value of the named counter, starting from 0.
    pub fn next_sequence(&mut self, name: &str) -> DbResult<u64> {
        let key = TablePrefix::Counter.prepend(&KeyBuf::new().str(name)?.finish());
        let current = match self.get(&key) {
            Some(bytes) => u64::deserialize(&bytes)?,
            None => 0,
        };

        self.set(key, (current + 1).serialize()?);
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Account {
        owner: String,
        amount: u128,
    }

    #[derive(Debug)]
    struct AccountRowSpec;

    impl KVRowSpec for AccountRowSpec {
        const PREFIX: TablePrefix = TablePrefix::Balance;
        type Key = (String, String);
        type Value = Account;
    }

    fn key(zone: &str, owner: &str) -> (String, String) {
        (zone.to_string(), owner.to_string())
    }

    fn account(owner: &str, amount: u128) -> Account {
        Account {
            owner: owner.to_string(),
            amount,
        }
    }

    #[test]
    fn test_typed_rows() {
        let mut store = KvStore::new();
        assert_eq!(store.get_row::<AccountRowSpec>(&key("a", "x")).unwrap(), None);

        store
            .put_row::<AccountRowSpec>(&key("a", "x"), &account("x", 10))
            .unwrap();
        assert_eq!(
            store.get_row::<AccountRowSpec>(&key("a", "x")).unwrap(),
            Some(account("x", 10))
        );
        assert!(store.has_row::<AccountRowSpec>(&key("a", "x")).unwrap());

        store.delete_row::<AccountRowSpec>(&key("a", "x")).unwrap();
        assert!(!store.has_row::<AccountRowSpec>(&key("a", "x")).unwrap());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut store = KvStore::new();
        store
            .put_row::<AccountRowSpec>(&key("a", "x"), &account("x", 1))
            .unwrap();

        store.begin();
        store
            .put_row::<AccountRowSpec>(&key("a", "x"), &account("x", 2))
            .unwrap();
        store
            .put_row::<AccountRowSpec>(&key("a", "y"), &account("y", 3))
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(
            store.get_row::<AccountRowSpec>(&key("a", "x")).unwrap(),
            Some(account("x", 1))
        );
        assert!(!store.has_row::<AccountRowSpec>(&key("a", "y")).unwrap());
        assert_eq!(store.rollback(), Err(DbError::NoOpenTransaction));
    }

    #[test]
    fn test_nested_transactions() {
        let mut store = KvStore::new();

        store.begin();
        store
            .put_row::<AccountRowSpec>(&key("a", "x"), &account("x", 1))
            .unwrap();

        store.begin();
        store.delete_row::<AccountRowSpec>(&key("a", "x")).unwrap();
        assert!(!store.has_row::<AccountRowSpec>(&key("a", "x")).unwrap());
        store.rollback().unwrap();

        assert!(store.has_row::<AccountRowSpec>(&key("a", "x")).unwrap());

        store.begin();
        store
            .put_row::<AccountRowSpec>(&key("a", "z"), &account("z", 5))
            .unwrap();
        store.commit().unwrap();
        assert_eq!(store.depth(), 1);

        store.commit().unwrap();
        assert_eq!(store.depth(), 0);
        assert!(store.has_row::<AccountRowSpec>(&key("a", "x")).unwrap());
        assert!(store.has_row::<AccountRowSpec>(&key("a", "z")).unwrap());
    }

    #[test]
    fn test_iteration_merges_layers_in_order() {
        let mut store = KvStore::new();
        store
            .put_row::<AccountRowSpec>(&key("a", "b"), &account("b", 1))
            .unwrap();
        store
            .put_row::<AccountRowSpec>(&key("a", "d"), &account("d", 1))
            .unwrap();
        store
            .put_row::<AccountRowSpec>(&key("b", "a"), &account("a", 1))
            .unwrap();

        store.begin();
        store
            .put_row::<AccountRowSpec>(&key("a", "c"), &account("c", 1))
            .unwrap();
        store.delete_row::<AccountRowSpec>(&key("a", "d")).unwrap();

        let zone_a = KeyBuf::new().str("a").unwrap().finish();
        let owners: Vec<_> = store
            .collect_rows::<AccountRowSpec>(&zone_a)
            .unwrap()
            .into_iter()
            .map(|((_, owner), _)| owner)
            .collect();
        assert_eq!(owners, vec!["b", "c"]);

        assert_eq!(store.collect_rows::<AccountRowSpec>(&[]).unwrap().len(), 3);
    }

    #[test]
    fn test_counters() {
        let mut store = KvStore::new();
        assert_eq!(store.next_sequence("deposit").unwrap(), 0);
        assert_eq!(store.next_sequence("deposit").unwrap(), 1);
        assert_eq!(store.next_sequence("other").unwrap(), 0);

        store.begin();
        assert_eq!(store.next_sequence("deposit").unwrap(), 2);
        store.rollback().unwrap();
        assert_eq!(store.next_sequence("deposit").unwrap(), 2);
    }
}
