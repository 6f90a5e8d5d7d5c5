//! 查询优化器模块
//!
//! 把构建好的逻辑计划变成代价最低的物理计划，并在启用时用计划绑定覆盖代价模型的选择
//!
//! ## 模块结构
//!
//! - `engine` - 优化入口：快速计划、提示、代价优化与绑定的组合
//! - `search` - 物理计划搜索：动态规划和 cascades 两种策略
//! - `implementation` - 物理访问算子的代价函数
//! - `cost` - 代价因子
//! - `stats` - 表和列的统计信息
//! - `hint` - 语句级提示和计划提示
//! - `binding` - 计划绑定的存储、查找与演进
//!
//! ## 使用示例
//!
//! ```rust
//! use sqlopt::query::optimizer::{MemoryStatisticsProvider, Optimizer};
//! use sqlopt::query::planner::DefaultPlanBuilder;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(MemoryStatisticsProvider::new());
//! let builder = Arc::new(DefaultPlanBuilder::new(stats.clone()));
//! let optimizer = Optimizer::new(builder, stats);
//! assert!(optimizer.global_bindings().is_empty());
//! ```

pub mod binding;
pub mod cost;
pub mod engine;
pub mod hint;
pub mod implementation;
pub mod search;
pub mod stats;

pub use binding::{
    BindRecord, BindScope, BindSource, BindStatus, BindType, Binding, EvolutionScheduler,
    GlobalBindHandle, PlanVerifier, SessionBindHandle, VerifyOutcome,
};
pub use cost::CostFactors;
pub use engine::Optimizer;
pub use hint::{handle_stmt_hints, StmtHints};
pub use search::{CascadesSearch, DpSearch, PlanSearch};
pub use stats::{ColumnStatistics, Histogram, MemoryStatisticsProvider, StatisticsProvider, TableStatistics};
