use flagbag_lib::{Storage, StorageError};

/// Persistent cache slot backed by sled.
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    /// Open a sled database at the given directory path.
    pub fn open(data_dir: &str) -> Result<Self, StorageError> {
        let db = sled::open(data_dir)
            .map_err(|e| StorageError::Backend(format!("failed to open sled db: {}", e)))?;
        Ok(Self::new(db))
    }
}

impl Storage for SledStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let Some(ivec) = self
            .db
            .get(key)
            .map_err(|e| StorageError::Backend(format!("failed to read {}: {}", key, e)))?
        else {
            return Ok(None);
        };
        String::from_utf8(ivec.to_vec())
            .map(Some)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db
            .insert(key, value.as_bytes())
            .map_err(|e| StorageError::Backend(format!("failed to store {}: {}", key, e)))?;
        self.db
            .flush()
            .map_err(|e| StorageError::Backend(format!("failed to flush: {}", e)))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.db
            .remove(key)
            .map_err(|e| StorageError::Backend(format!("failed to remove {}: {}", key, e)))?;
        self.db
            .flush()
            .map_err(|e| StorageError::Backend(format!("failed to flush: {}", e)))?;
        Ok(())
    }
}
