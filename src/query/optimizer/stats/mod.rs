//! 统计信息模块
//!
//! 提供代价模型和选择率估算所需的统计信息
//!
//! ## 模块结构
//!
//! - `histogram` - 等深直方图
//! - `table` - 表和列统计信息，行宽与行数估算
//! - `provider` - 统计信息提供者接口及内存实现

pub mod histogram;
pub mod provider;
pub mod table;

pub use histogram::{Bucket, Histogram};
pub use provider::{MemoryStatisticsProvider, StatisticsProvider};
pub use table::{ColumnStatistics, TableStatistics};
