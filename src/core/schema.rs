//! Schema 快照
//!
//! 一次优化调用只读取一个版本的 schema。快照在构造后不再修改，
//! 表信息以 `Arc` 共享，多个会话可以并发持有同一快照。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 列的数据类型，只区分定长和变长
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Float,
    Datetime,
    String,
}

impl FieldKind {
    /// 定长类型的字节宽度，变长类型返回 None
    pub fn fixed_len(&self) -> Option<f64> {
        match self {
            FieldKind::Int | FieldKind::Float | FieldKind::Datetime => Some(8.0),
            FieldKind::String => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: i64,
    pub name: String,
    pub offset: usize,
    pub kind: FieldKind,
    pub hidden: bool,
}

impl ColumnInfo {
    pub fn new(id: i64, name: &str, kind: FieldKind) -> Self {
        Self {
            id,
            name: name.to_lowercase(),
            offset: 0,
            kind,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
}

impl IndexInfo {
    pub fn new(id: i64, name: &str, columns: &[&str]) -> Self {
        Self {
            id,
            name: name.to_lowercase(),
            columns: columns.iter().map(|c| c.to_lowercase()).collect(),
            unique: false,
            primary: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableLockType {
    Read,
    Write,
}

/// 表锁信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLockInfo {
    pub tp: TableLockType,
    pub session_id: u64,
}

/// 表定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: i64,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
    /// 整型主键直接作为行句柄时的列名
    pub handle_col: Option<String>,
    pub tiflash_replica: bool,
    pub lock: Option<TableLockInfo>,
}

impl TableInfo {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_lowercase(),
            columns: Vec::new(),
            indices: Vec::new(),
            handle_col: None,
            tiflash_replica: false,
            lock: None,
        }
    }

    pub fn with_column(mut self, mut col: ColumnInfo) -> Self {
        col.offset = self.columns.len();
        self.columns.push(col);
        self
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indices.push(index);
        self
    }

    pub fn with_handle(mut self, col: &str) -> Self {
        self.handle_col = Some(col.to_lowercase());
        self
    }

    pub fn with_tiflash_replica(mut self) -> Self {
        self.tiflash_replica = true;
        self
    }

    pub fn with_lock(mut self, lock: TableLockInfo) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn pk_is_handle(&self) -> bool {
        self.handle_col.is_some()
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexInfo> {
        self.indices
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn handle_column(&self) -> Option<&ColumnInfo> {
        self.handle_col.as_deref().and_then(|c| self.find_column(c))
    }

    /// 对外可见的列
    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| !c.hidden)
    }
}

/// 某一版本的 schema
#[derive(Debug, Clone, Default)]
pub struct InfoSchema {
    version: i64,
    databases: HashMap<String, HashMap<String, Arc<TableInfo>>>,
}

impl InfoSchema {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            databases: HashMap::new(),
        }
    }

    pub fn with_table(mut self, db: &str, table: TableInfo) -> Self {
        self.databases
            .entry(db.to_lowercase())
            .or_default()
            .insert(table.name.clone(), Arc::new(table));
        self
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn table_by_name(&self, db: &str, table: &str) -> Option<Arc<TableInfo>> {
        self.databases
            .get(&db.to_lowercase())?
            .get(&table.to_lowercase())
            .cloned()
    }

    pub fn table_by_id(&self, id: i64) -> Option<Arc<TableInfo>> {
        self.databases
            .values()
            .flat_map(|tables| tables.values())
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn schema_exists(&self, db: &str) -> bool {
        self.databases.contains_key(&db.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InfoSchema {
        let t = TableInfo::new(1, "T")
            .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
            .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
            .with_index(IndexInfo::new(1, "idx_a", &["a"]))
            .with_handle("id");
        InfoSchema::new(1).with_table("Test", t)
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let is = sample();
        let t = is.table_by_name("test", "t").expect("表存在");
        assert_eq!(t.columns[1].offset, 1);
        assert!(t.find_index("IDX_A").is_some());
        assert_eq!(t.handle_column().map(|c| c.id), Some(1));
        assert!(is.table_by_id(1).is_some());
        assert!(is.table_by_name("test", "missing").is_none());
    }
}
