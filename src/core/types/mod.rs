//! 基础数据类型
//!
//! - `datum` - 字面量取值
//! - `range` - 列上的取值区间，用于统计估算和访问路径
//! - `store` - 存储层类型（行存 / 列存副本）

pub mod datum;
pub mod range;
pub mod store;

pub use datum::Datum;
pub use range::{build_column_range, CompareOp, Range};
pub use store::StoreType;
