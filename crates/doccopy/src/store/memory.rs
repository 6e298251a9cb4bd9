//! In-memory document store.
//!
//! Databases are shared handles (`Arc` inside), so a test or an embedder
//! can seed a source, start a job, and inspect the target afterwards. The
//! store records every successful insert and drop, and supports simple
//! fault injection for exercising failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{
    validate_collection_name, Access, Connector, Cursor, Document, DocumentSource,
    DocumentTarget,
};

#[derive(Default)]
struct Faults {
    /// 1-based index of the insert call that fails.
    fail_insert_call: Option<usize>,
    /// Cursors error out after yielding this many documents.
    fail_reads_after: Option<usize>,
    /// Delay before each document a cursor yields.
    read_delay: Duration,
}

#[derive(Default)]
struct DatabaseState {
    /// Collections in creation order.
    collections: Vec<(String, Vec<Document>)>,
    insert_calls: usize,
    inserts: Vec<(String, usize)>,
    drops: Vec<String>,
    faults: Faults,
}

impl DatabaseState {
    fn collection(&self, name: &str) -> Option<&Vec<Document>> {
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, docs)| docs)
    }

    fn collection_mut(&mut self, name: &str) -> &mut Vec<Document> {
        let index = match self.collections.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                self.collections.push((name.to_string(), Vec::new()));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index].1
    }
}

/// A shared in-memory database.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<RwLock<DatabaseState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DatabaseState> {
        match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory database lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, DatabaseState> {
        match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Memory database lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Creates an empty collection if it does not exist yet.
    pub fn create_collection(&self, name: &str) {
        self.write().collection_mut(name);
    }

    /// Appends documents to a collection without recording an insert.
    pub fn seed<I>(&self, collection: &str, documents: I)
    where
        I: IntoIterator<Item = Document>,
    {
        self.write().collection_mut(collection).extend(documents);
    }

    /// Returns a copy of the documents stored in a collection.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.read().collection(collection).cloned().unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.read()
            .collections
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Successful inserts as `(collection, batch size)`, in call order.
    pub fn insert_log(&self) -> Vec<(String, usize)> {
        self.read().inserts.clone()
    }

    /// Dropped collection names, in call order.
    pub fn drop_log(&self) -> Vec<String> {
        self.read().drops.clone()
    }

    /// Makes the `n`-th insert call (1-based) fail.
    pub fn fail_insert_call(&self, n: usize) {
        self.write().faults.fail_insert_call = Some(n);
    }

    /// Makes every cursor fail after yielding `n` documents.
    pub fn fail_reads_after(&self, n: usize) {
        self.write().faults.fail_reads_after = Some(n);
    }

    /// Slows cursors down by `delay` per document.
    pub fn set_read_delay(&self, delay: Duration) {
        self.write().faults.read_delay = delay;
    }
}

impl DocumentSource for MemoryDatabase {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collection_names())
    }

    fn count(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self.read().collection(collection).map_or(0, |d| d.len() as u64))
    }

    fn open_cursor(&self, collection: &str) -> Result<Cursor, StoreError> {
        let state = self.read();
        let documents = state.collection(collection).cloned().unwrap_or_default();

        Ok(Box::new(MemoryCursor {
            collection: collection.to_string(),
            documents: documents.into_iter(),
            yielded: 0,
            fail_after: state.faults.fail_reads_after,
            delay: state.faults.read_delay,
        }))
    }
}

impl DocumentTarget for MemoryDatabase {
    fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let mut state = self.write();
        state.collections.retain(|(name, _)| name != collection);
        state.drops.push(collection.to_string());
        Ok(())
    }

    fn insert_batch(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        validate_collection_name(collection, Access::Write)?;

        let mut state = self.write();
        state.insert_calls += 1;

        if state.faults.fail_insert_call == Some(state.insert_calls) {
            return Err(StoreError::Write {
                collection: collection.to_string(),
                reason: format!("injected failure on insert #{}", state.insert_calls),
            });
        }

        state
            .collection_mut(collection)
            .extend(documents.iter().cloned());
        state
            .inserts
            .push((collection.to_string(), documents.len()));
        Ok(())
    }
}

/// Cursor over a snapshot of a collection taken when it was opened.
struct MemoryCursor {
    collection: String,
    documents: std::vec::IntoIter<Document>,
    yielded: usize,
    fail_after: Option<usize>,
    delay: Duration,
}

impl Iterator for MemoryCursor {
    type Item = Result<Document, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fail_after == Some(self.yielded) {
            // Fuse after reporting the error once.
            self.fail_after = None;
            self.documents = Vec::new().into_iter();
            return Some(Err(StoreError::Read {
                collection: self.collection.clone(),
                reason: format!("injected cursor failure after {} documents", self.yielded),
            }));
        }

        let document = self.documents.next()?;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.yielded += 1;
        Some(Ok(document))
    }
}

/// Resolves `(location, database)` pairs to shared [`MemoryDatabase`]s.
///
/// A location must be registered (by asking for one of its databases)
/// before it can be connected to; unknown or refused locations produce a
/// connection error, the same way an unreachable server would.
#[derive(Default)]
pub struct MemoryConnector {
    locations: RwLock<HashMap<String, HashMap<String, MemoryDatabase>>>,
    refused: RwLock<HashSet<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named database at `location`, creating both if needed.
    pub fn database(&self, location: &str, name: &str) -> MemoryDatabase {
        let mut locations = match self.locations.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        locations
            .entry(location.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Makes every later connection attempt to `location` fail.
    pub fn refuse(&self, location: &str) {
        let mut refused = match self.refused.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        refused.insert(location.to_string());
    }

    fn connect(&self, location: &str, database: &str) -> Result<MemoryDatabase, StoreError> {
        let is_refused = match self.refused.read() {
            Ok(g) => g.contains(location),
            Err(poisoned) => poisoned.into_inner().contains(location),
        };
        if is_refused {
            return Err(StoreError::Connection {
                location: location.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let mut locations = match self.locations.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let databases = locations
            .get_mut(location)
            .ok_or_else(|| StoreError::Connection {
                location: location.to_string(),
                reason: "unknown location".to_string(),
            })?;

        Ok(databases.entry(database.to_string()).or_default().clone())
    }
}

impl Connector for MemoryConnector {
    fn source(
        &self,
        location: &str,
        database: &str,
    ) -> Result<Box<dyn DocumentSource>, StoreError> {
        Ok(Box::new(self.connect(location, database)?))
    }

    fn target(
        &self,
        location: &str,
        database: &str,
    ) -> Result<Box<dyn DocumentTarget>, StoreError> {
        Ok(Box::new(self.connect(location, database)?))
    }
}
