//! Persistence of named job flows.

use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use crate::arena::BlockId;
use crate::data::DataMap;
use crate::error::{Error, Result};
use crate::graph::Graph;

/// Async load/save of flow payloads by name.
#[async_trait(?Send)]
pub trait Storage {
    /// `Ok(None)` when nothing is stored under `name`.
    async fn load_flow(&self, name: &str) -> Result<Option<DataMap>>;
    async fn save_flow(&self, name: &str, data: &DataMap) -> Result<()>;
    async fn delete_flow(&self, name: &str) -> Result<()>;
}

/// One `<name>.json` file per flow under a base directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", name))
    }
}

#[async_trait(?Send)]
impl Storage for FileStorage {
    async fn load_flow(&self, name: &str) -> Result<Option<DataMap>> {
        let text = match fs::read_to_string(self.path(name)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text)? {
            Json::Object(map) => Ok(Some(map)),
            _ => Err(Error::InvalidData(format!("{} is not a JSON object", name))),
        }
    }

    async fn save_flow(&self, name: &str, data: &DataMap) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let text = serde_json::to_string_pretty(data)?;
        fs::write(self.path(name), text)?;
        Ok(())
    }

    async fn delete_flow(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// In-process storage, mostly for tests.
#[derive(Default)]
pub struct MemoryStorage {
    flows: RefCell<FxHashMap<String, DataMap>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.borrow().is_empty()
    }
}

#[async_trait(?Send)]
impl Storage for MemoryStorage {
    async fn load_flow(&self, name: &str) -> Result<Option<DataMap>> {
        Ok(self.flows.borrow().get(name).cloned())
    }

    async fn save_flow(&self, name: &str, data: &DataMap) -> Result<()> {
        self.flows.borrow_mut().insert(name.to_string(), data.clone());
        Ok(())
    }

    async fn delete_flow(&self, name: &str) -> Result<()> {
        self.flows.borrow_mut().remove(name);
        Ok(())
    }
}

impl Graph {
    /// Load `name` from storage as a job flow under the root.
    pub async fn load_job(&mut self, storage: &dyn Storage, name: &str) -> Result<BlockId> {
        let data = storage
            .load_flow(name)
            .await?
            .ok_or_else(|| Error::UnknownJob(name.to_string()))?;
        Ok(self.add_job(name, &data))
    }

    /// Save the job flow `name` to storage.
    pub async fn save_job(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let job = self.job(name).ok_or_else(|| Error::UnknownJob(name.to_string()))?;
        storage.save_flow(name, &self.save(job)).await
    }
}
