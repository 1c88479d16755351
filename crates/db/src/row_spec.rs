//! Type specifications for key-value pairs stored in the [`KvStore`](crate::KvStore).

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    errors::{DbError, DbResult},
    keys::{KeyBuf, KeyReader},
    prefix::TablePrefix,
};

/// Type specification for a KV pair stored in a table.
pub trait KVRowSpec {
    /// The table the rows live in.
    const PREFIX: TablePrefix;

    /// Type of the key.
    type Key: PackableKey;

    /// Type of the value.
    type Value: SerializableValue;
}

/// A key that can be packed into, and unpacked from, the bytes following the table prefix.
pub trait PackableKey: Sized {
    /// Packs the key.
    fn pack(&self) -> DbResult<Vec<u8>>;

    /// Unpacks the key from the bytes after the table prefix.
    fn unpack(bytes: &[u8]) -> DbResult<Self>;
}

/// A value that can be serialized and deserialized into bytes.
pub trait SerializableValue: Sized {
    /// Serializes self to bytes.
    fn serialize(&self) -> DbResult<Vec<u8>>;

    /// Deserializes self from bytes.
    fn deserialize(bytes: &[u8]) -> DbResult<Self>;
}

impl<T: Serialize + DeserializeOwned> SerializableValue for T {
    fn serialize(&self) -> DbResult<Vec<u8>> {
        bincode::serialize(self).map_err(DbError::failed_to_serialize_value)
    }

    fn deserialize(bytes: &[u8]) -> DbResult<Self> {
        bincode::deserialize(bytes).map_err(DbError::failed_to_deserialize_value)
    }
}

impl PackableKey for String {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new().str(self)?.finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let s = reader.str()?;
        reader.finish()?;
        Ok(s)
    }
}

impl PackableKey for u64 {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new().u64(*self).finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let n = reader.u64()?;
        reader.finish()?;
        Ok(n)
    }
}

impl PackableKey for (String, String) {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new().str(&self.0)?.str(&self.1)?.finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let key = (reader.str()?, reader.str()?);
        reader.finish()?;
        Ok(key)
    }
}

impl PackableKey for (u64, String) {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new().u64(self.0).str(&self.1)?.finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let key = (reader.u64()?, reader.str()?);
        reader.finish()?;
        Ok(key)
    }
}

impl PackableKey for (String, String, u64) {
    fn pack(&self) -> DbResult<Vec<u8>> {
        Ok(KeyBuf::new()
            .str(&self.0)?
            .str(&self.1)?
            .u64(self.2)
            .finish())
    }

    fn unpack(bytes: &[u8]) -> DbResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let key = (reader.str()?, reader.str()?, reader.u64()?);
        reader.finish()?;
        Ok(key)
    }
}
