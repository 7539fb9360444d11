use bson::Document;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::query::{Filter, FindOptions};

/// Index flavours a repository can request from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Ascending,
    Geo2d,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    #[must_use]
    pub fn geo2d(field: impl Into<String>) -> Self {
        Self { field: field.into(), kind: IndexKind::Geo2d }
    }
}

/// Lazy iteration over store results. Closing twice is harmless.
pub trait StoreCursor: Send {
    /// # Errors
    /// Any failure the store reports while producing the next document.
    fn next_document(&mut self) -> Result<Option<Document>, StoreError>;

    /// Release store-side resources.
    fn close(&mut self);

    /// Restart from the first result. Returns false when the cursor cannot restart.
    fn rewind(&mut self) -> bool;
}

/// One document collection of the backing store.
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// The store's own failure, surfaced as `DbError::QueryExecution` by the caller.
    fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Box<dyn StoreCursor>, StoreError>;

    /// # Errors
    /// See [`CollectionHandle::find`].
    fn find_one(&self, filter: &Filter, opts: &FindOptions) -> Result<Option<Document>, StoreError> {
        let opts = FindOptions { limit: Some(1), ..opts.clone() };
        let mut cursor = self.find(filter, &opts)?;
        let first = cursor.next_document();
        cursor.close();
        first
    }

    /// # Errors
    /// See [`CollectionHandle::find`].
    fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// # Errors
    /// See [`CollectionHandle::find`].
    fn ensure_index(&self, spec: &IndexSpec) -> Result<(), StoreError>;
}
