use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use super::error::StoreError;

pub fn storage_key(call_sign: &str) -> String {
    format!("bcdc:lastHdg:{}", call_sign)
}

/// Keeps each entity's last-known-good heading across restarts.
pub trait HeadingStore: Send {
    fn load(&self, call_sign: &str) -> Option<f64>;
    fn save(&mut self, call_sign: &str, degrees: f64) -> Result<(), StoreError>;
}

impl<S: HeadingStore + ?Sized> HeadingStore for Box<S> {
    fn load(&self, call_sign: &str) -> Option<f64> {
        (**self).load(call_sign)
    }

    fn save(&mut self, call_sign: &str, degrees: f64) -> Result<(), StoreError> {
        (**self).save(call_sign, degrees)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, f64>,
}

impl HeadingStore for MemoryStore {
    fn load(&self, call_sign: &str) -> Option<f64> {
        self.values
            .get(&storage_key(call_sign))
            .copied()
            .filter(|v| v.is_finite())
    }

    fn save(&mut self, call_sign: &str, degrees: f64) -> Result<(), StoreError> {
        self.values.insert(storage_key(call_sign), degrees);
        Ok(())
    }
}

/// JSON object of `storage_key -> degrees`, rewritten on each change.
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, f64>,
}

impl FileStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }
}

impl HeadingStore for FileStore {
    fn load(&self, call_sign: &str) -> Option<f64> {
        self.values
            .get(&storage_key(call_sign))
            .copied()
            .filter(|v| v.is_finite())
    }

    fn save(&mut self, call_sign: &str, degrees: f64) -> Result<(), StoreError> {
        let key = storage_key(call_sign);
        if self.values.get(&key) == Some(&degrees) {
            return Ok(());
        }
        self.values.insert(key, degrees);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
