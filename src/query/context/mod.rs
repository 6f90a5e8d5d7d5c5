//! 会话上下文模块
//!
//! - `session_vars` - 会话变量快照，优化器读取的所有开关和代价因子
//! - `stmt_ctx` - 单条语句的上下文：告警、语句级提示、访问过的表
//! - `oracle` - 事务时间戳来源
//! - `session` - 会话：变量、会话级绑定、预处理语句、时间戳预取

pub mod oracle;
pub mod session;
pub mod session_vars;
pub mod stmt_ctx;

pub use oracle::{LocalOracle, TimestampOracle};
pub use session::{PreparedStmt, Session};
pub use session_vars::SessionVars;
pub use stmt_ctx::{StmtContext, TableEntry};
