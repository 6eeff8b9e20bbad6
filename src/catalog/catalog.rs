use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{Result, StrataError, TableId};
use crate::storage::disk::HeapFile;
use crate::tuple::TupleDesc;

#[derive(Debug, Clone)]
struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: String,
}

#[derive(Debug, Default)]
struct CatalogInner {
    tables: HashMap<TableId, TableEntry>,
    names: HashMap<String, TableId>,
}

/// Registry of the tables known to the database, keyed by the table id of each
/// table's heap file.
///
/// Adding a table under a name or id that is already registered replaces the older
/// entry, so a name always resolves to exactly one table.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` as table `name` and returns its id.
    pub fn add_table(
        &self,
        file: Arc<HeapFile>,
        name: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> TableId {
        let name = name.into();
        let table_id = file.id();
        let mut inner = self.inner.write();

        if let Some(old_id) = inner.names.remove(&name) {
            inner.tables.remove(&old_id);
        }
        if let Some(old) = inner.tables.remove(&table_id) {
            inner.names.remove(&old.name);
        }

        debug!(table_id, %name, path = %file.path().display(), "table registered");
        inner.names.insert(name.clone(), table_id);
        inner.tables.insert(
            table_id,
            TableEntry {
                file,
                name,
                primary_key: primary_key.into(),
            },
        );
        table_id
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| StrataError::TableNameNotFound(name.to_string()))
    }

    fn with_entry<T>(&self, table_id: TableId, f: impl FnOnce(&TableEntry) -> T) -> Result<T> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(f)
            .ok_or(StrataError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> Result<Arc<TupleDesc>> {
        self.with_entry(table_id, |e| e.file.tuple_desc().clone())
    }

    pub fn database_file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.with_entry(table_id, |e| e.file.clone())
    }

    pub fn primary_key(&self, table_id: TableId) -> Result<String> {
        self.with_entry(table_id, |e| e.primary_key.clone())
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.with_entry(table_id, |e| e.name.clone())
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.inner.read().tables.keys().copied().collect()
    }

    /// Forgets every table. Open file handles held elsewhere stay valid.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tables.clear();
        inner.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::FieldType;
    use tempfile::NamedTempFile;

    fn heap_file() -> (Arc<HeapFile>, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let desc = TupleDesc::builder()
            .field("id", FieldType::Integer)
            .build_arc();
        let file = HeapFile::open(temp.path(), desc).unwrap();
        (Arc::new(file), temp)
    }

    #[test]
    fn test_add_and_lookup() {
        let catalog = Catalog::new();
        let (file, _temp) = heap_file();
        let id = catalog.add_table(file.clone(), "users", "id");

        assert_eq!(id, file.id());
        assert_eq!(catalog.table_id("users").unwrap(), id);
        assert_eq!(catalog.table_name(id).unwrap(), "users");
        assert_eq!(catalog.primary_key(id).unwrap(), "id");
        assert_eq!(*catalog.tuple_desc(id).unwrap(), **file.tuple_desc());
        assert!(Arc::ptr_eq(&catalog.database_file(id).unwrap(), &file));
        assert_eq!(catalog.table_ids(), vec![id]);
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.table_id("missing"),
            Err(StrataError::TableNameNotFound(_))
        ));
        assert!(matches!(
            catalog.tuple_desc(42),
            Err(StrataError::TableNotFound(42))
        ));
    }

    #[test]
    fn test_same_name_replaces_entry() {
        let catalog = Catalog::new();
        let (first, _t1) = heap_file();
        let (second, _t2) = heap_file();

        let first_id = catalog.add_table(first, "t", "");
        let second_id = catalog.add_table(second, "t", "");

        assert_eq!(catalog.table_id("t").unwrap(), second_id);
        assert!(catalog.database_file(first_id).is_err());
        assert_eq!(catalog.table_ids().len(), 1);
    }

    #[test]
    fn test_same_file_renamed() {
        let catalog = Catalog::new();
        let (file, _temp) = heap_file();

        let id = catalog.add_table(file.clone(), "old", "");
        catalog.add_table(file, "new", "");

        assert!(catalog.table_id("old").is_err());
        assert_eq!(catalog.table_id("new").unwrap(), id);
    }

    #[test]
    fn test_clear() {
        let catalog = Catalog::new();
        let (file, _temp) = heap_file();
        catalog.add_table(file, "t", "");
        catalog.clear();
        assert!(catalog.table_ids().is_empty());
        assert!(catalog.table_id("t").is_err());
    }
}
