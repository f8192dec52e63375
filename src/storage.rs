use chrono::Utc;
use sled::{CompareAndSwapError, Db};

use crate::error::{AppError, Result};
use crate::models::{Account, NewReading, SensorReading};

/// Sled-backed storage for accounts and sensor readings.
///
/// Trees:
/// - `accounts`: username -> JSON `Account`. Usernames are unique because
///   inserts go through compare-and-swap against an empty slot.
/// - `readings`: big-endian id -> JSON `SensorReading`, so iteration follows
///   insertion order.
#[derive(Clone)] // Sled handles are cheap to clone and thread-safe
pub struct Storage {
    db: Db,
    account_tree: sled::Tree,
    reading_tree: sled::Tree,
}

/// Outcome of an account insert.
#[derive(Debug, PartialEq)]
pub enum Inserted {
    Created(Account),
    UsernameTaken,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop, for tests and throwaway runs
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let account_tree = db.open_tree("accounts")?;
        let reading_tree = db.open_tree("readings")?;
        Ok(Self {
            db,
            account_tree,
            reading_tree,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // --- Accounts ---

    /// Atomically insert a new account unless the username is already present.
    ///
    /// The CAS against `None` is what guarantees uniqueness; callers may
    /// pre-check with `find_account`, but two racing registrations still end
    /// with exactly one winner here.
    pub fn insert_account(&self, username: &str, password_hash: String, role: String) -> Result<Inserted> {
        let account = Account {
            id: self.db.generate_id()?,
            username: username.to_owned(),
            password_hash,
            role,
        };
        let bytes = serde_json::to_vec(&account)?;

        match self
            .account_tree
            .compare_and_swap(username.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(Inserted::Created(account)),
            Err(CompareAndSwapError { .. }) => Ok(Inserted::UsernameTaken),
        }
    }

    pub fn find_account(&self, username: &str) -> Result<Option<Account>> {
        match self.account_tree.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Replace the stored hash wholesale. Returns `NotFound` if the account
    /// does not exist.
    pub fn update_password_hash(&self, username: &str, password_hash: &str) -> Result<Account> {
        loop {
            let current = self
                .account_tree
                .get(username.as_bytes())?
                .ok_or_else(|| AppError::NotFound(username.to_owned()))?;

            let mut account: Account = serde_json::from_slice(&current)?;
            account.password_hash = password_hash.to_owned();
            let updated = serde_json::to_vec(&account)?;

            // Lost a race with another writer of the same row: re-read and apply again
            if self
                .account_tree
                .compare_and_swap(username.as_bytes(), Some(current), Some(updated))?
                .is_ok()
            {
                return Ok(account);
            }
        }
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = vec![];
        for item in self.account_tree.iter() {
            let (_, value) = item?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        accounts.sort_by_key(|a: &Account| a.id);
        Ok(accounts)
    }

    // --- Sensor readings ---

    /// Append a reading stamped with the current time
    pub fn append_reading(&self, reading: NewReading) -> Result<SensorReading> {
        let stored = SensorReading {
            id: self.db.generate_id()?,
            sensor_id: reading.sensor_id,
            temperature: reading.temperature,
            humidity: reading.humidity,
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec(&stored)?;
        self.reading_tree.insert(stored.id.to_be_bytes(), bytes)?;
        Ok(stored)
    }

    pub fn all_readings(&self) -> Result<Vec<SensorReading>> {
        let mut readings = vec![];
        for item in self.reading_tree.iter() {
            let (_, value) = item?;
            readings.push(serde_json::from_slice(&value)?);
        }
        Ok(readings)
    }

    /// Remove every reading, returning how many this call removed.
    /// Readings appended while the sweep runs may or may not be included,
    /// but each is counted exactly when it is removed here.
    pub fn clear_readings(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.reading_tree.iter().keys() {
            if self.reading_tree.remove(key?)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn created(result: Inserted) -> Account {
        match result {
            Inserted::Created(account) => account,
            Inserted::UsernameTaken => panic!("expected account to be created"),
        }
    }

    #[test]
    fn test_insert_and_find_account() {
        let storage = Storage::temporary().expect("Failed to open storage");
        let account = created(storage.insert_account("alice", "hash1".into(), "user".into()).unwrap());

        let found = storage.find_account("alice").unwrap().expect("alice stored");
        assert_eq!(found, account);
        assert!(storage.find_account("Alice").unwrap().is_none()); // case-sensitive
        assert!(storage.find_account("bob").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_is_rejected_and_original_kept() {
        let storage = Storage::temporary().unwrap();
        created(storage.insert_account("alice", "hash1".into(), "user".into()).unwrap());

        let second = storage.insert_account("alice", "hash2".into(), "admin".into()).unwrap();
        assert_eq!(second, Inserted::UsernameTaken);

        let kept = storage.find_account("alice").unwrap().unwrap();
        assert_eq!(kept.password_hash, "hash1");
        assert_eq!(kept.role, "user");
        assert_eq!(storage.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let storage = Storage::temporary().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    storage
                        .insert_account("racer", format!("hash{}", i), "user".into())
                        .unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, Inserted::Created(_)))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(storage.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_account_ids_are_unique() {
        let storage = Storage::temporary().unwrap();
        let a = created(storage.insert_account("a", "h".into(), "user".into()).unwrap());
        let b = created(storage.insert_account("b", "h".into(), "user".into()).unwrap());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_update_password_hash() {
        let storage = Storage::temporary().unwrap();
        let original = created(storage.insert_account("alice", "old".into(), "admin".into()).unwrap());

        let updated = storage.update_password_hash("alice", "new").unwrap();
        assert_eq!(updated.password_hash, "new");
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.role, "admin");
        assert_eq!(storage.find_account("alice").unwrap().unwrap().password_hash, "new");
    }

    #[test]
    fn test_update_password_hash_unknown_user() {
        let storage = Storage::temporary().unwrap();
        let err = storage.update_password_hash("ghost", "new").unwrap_err();
        assert!(matches!(err, AppError::NotFound(name) if name == "ghost"));
    }

    #[test]
    fn test_readings_append_list_clear() {
        let storage = Storage::temporary().unwrap();
        for i in 0..3 {
            storage
                .append_reading(NewReading {
                    sensor_id: i,
                    temperature: 20.0 + i as f64,
                    humidity: 50.0,
                })
                .unwrap();
        }

        let readings = storage.all_readings().unwrap();
        assert_eq!(readings.len(), 3);
        let sensors: Vec<i64> = readings.iter().map(|r| r.sensor_id).collect();
        assert_eq!(sensors, vec![0, 1, 2]); // insertion order

        assert_eq!(storage.clear_readings().unwrap(), 3);
        assert!(storage.all_readings().unwrap().is_empty());
        assert_eq!(storage.clear_readings().unwrap(), 0);
    }

    #[test]
    fn test_clear_count_matches_removed_during_appends() {
        let storage = Storage::temporary().unwrap();
        for i in 0..50 {
            storage
                .append_reading(NewReading { sensor_id: i, temperature: 1.0, humidity: 1.0 })
                .unwrap();
        }

        let writer = {
            let storage = storage.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    storage
                        .append_reading(NewReading { sensor_id: i, temperature: 2.0, humidity: 2.0 })
                        .unwrap();
                }
            })
        };
        let removed = storage.clear_readings().unwrap();
        writer.join().unwrap();

        let remaining = storage.all_readings().unwrap().len();
        assert!(removed >= 50);
        assert_eq!(removed + remaining, 250);
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = std::env::temp_dir().join("sensor_db_test_reopen");
        let _ = fs::remove_dir_all(&temp_dir);
        let path = temp_dir.to_str().unwrap();

        {
            let storage = Storage::open(path).expect("Failed to open storage");
            created(storage.insert_account("alice", "h".into(), "user".into()).unwrap());
            storage.flush().unwrap();
        }

        let storage = Storage::open(path).expect("Failed to reopen storage");
        assert!(storage.find_account("alice").unwrap().is_some());
        drop(storage);

        let _ = fs::remove_dir_all(temp_dir);
    }
}
