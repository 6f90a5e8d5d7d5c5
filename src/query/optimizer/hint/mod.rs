//! 优化器提示
//!
//! - `stmt_hints` - 语句级提示解析（内存配额、执行时间上限等）
//! - `plan_hints` - 物理计划与提示之间的转换，以及给语句副本绑定提示

pub mod plan_hints;
pub mod stmt_hints;

pub use plan_hints::{
    bind_hint, contain_table_hint, gen_hints_from_physical_plan, inject_hint_comment,
    HINT_READ_FROM_STORAGE, HINT_USE_INDEX,
};
pub use stmt_hints::{handle_stmt_hints, ReplicaRead, StmtHints};
