//! 查询处理
//!
//! - `parser` - 优化器消费的语句 AST、提示文本和 SQL 规范化
//! - `context` - 会话、会话变量和语句上下文
//! - `planner` - 逻辑/物理计划、计划构建、点查快速计划、权限与表锁检查
//! - `optimizer` - 代价优化与计划绑定

pub mod context;
pub mod optimizer;
pub mod parser;
pub mod planner;

pub use context::{Session, SessionVars};
pub use optimizer::Optimizer;
pub use planner::{FieldName, Plan};
