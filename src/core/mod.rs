//! 核心类型模块
//! 提供优化器各层共享的基础类型：错误、数据值、取值范围和 schema 快照

pub mod error;
pub mod schema;
pub mod types;

// 错误和结果类型
pub use error::{BindingError, HintWarning, OptimizeError, OptimizeResult};

// 核心数据类型
pub use types::{Datum, Range, StoreType};

// schema 快照
pub use schema::{ColumnInfo, FieldKind, IndexInfo, InfoSchema, TableInfo, TableLockInfo, TableLockType};
