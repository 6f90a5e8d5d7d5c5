//! 执行计划绑定
//!
//! - `record` - 绑定和绑定记录
//! - `handle` - 会话级和全局绑定存储、失效删除和演进任务队列
//! - `selectivity` - 语句摘要、选择率估算、桶号和绑定 SQL 生成
//! - `evolve` - 后台验证候选绑定

pub mod evolve;
pub mod handle;
pub mod record;
pub mod selectivity;

pub use evolve::{EvolutionScheduler, EvolveStats, PlanVerifier, VerifyOutcome};
pub use handle::{BindScope, EvolveTask, GlobalBindHandle, SessionBindHandle};
pub use record::{BindRecord, BindSource, BindStatus, BindType, Binding};
pub use selectivity::{
    bucket_id, extract_select_and_normalize_digest, extract_selectivity, generate_bind_sql,
    UNKNOWN_SELECTIVITY,
};

/// 绑定被用于重新优化的次数，按作用域计数
pub const BIND_USAGE_COUNTER: &str = "sqlopt_bind_usage_total";

pub(crate) fn record_bind_usage(scope: BindScope) {
    metrics::counter!(BIND_USAGE_COUNTER, "scope" => scope.as_str()).increment(1);
}
