//! Document store abstractions.
//!
//! A copy job reads from a [`DocumentSource`] and writes to a
//! [`DocumentTarget`]. Both are resolved from a location and a database
//! name by a [`Connector`], which is the only place a concrete backend is
//! chosen.

use crate::error::StoreError;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlConnector;
pub use memory::{MemoryConnector, MemoryDatabase};

/// A single document. Documents are opaque to the copier.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Forward-only sequence of documents. Dropping it closes the cursor.
pub type Cursor = Box<dyn Iterator<Item = Result<Document, StoreError>> + Send>;

/// Read side of a copy.
pub trait DocumentSource: Send {
    /// Collection names in whatever order the backend yields them.
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Document count at the time of the call. A missing collection counts as empty.
    fn count(&self, collection: &str) -> Result<u64, StoreError>;

    /// Opens a cursor over every document of the collection, in storage order.
    fn open_cursor(&self, collection: &str) -> Result<Cursor, StoreError>;
}

/// Write side of a copy.
pub trait DocumentTarget: Send {
    /// Removes the collection and all of its documents. Dropping a missing
    /// collection is not an error.
    fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Appends the documents, preserving their order.
    fn insert_batch(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError>;
}

/// Resolves database handles from a location and a database name.
pub trait Connector: Send + Sync {
    fn source(&self, location: &str, database: &str)
        -> Result<Box<dyn DocumentSource>, StoreError>;

    fn target(&self, location: &str, database: &str)
        -> Result<Box<dyn DocumentTarget>, StoreError>;
}

/// Which side of a copy a collection name was given to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

/// Rejects collection names that cannot be used as a single path
/// component or storage key. The error matches the side that asked.
pub(crate) fn validate_collection_name(name: &str, access: Access) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if !invalid {
        return Ok(());
    }

    let collection = name.to_string();
    let reason = "invalid collection name".to_string();
    Err(match access {
        Access::Read => StoreError::Read { collection, reason },
        Access::Write => StoreError::Write { collection, reason },
    })
}
