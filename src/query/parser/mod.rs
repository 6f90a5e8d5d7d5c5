//! 语句接口
//!
//! SQL 解析器本身是外部组件，这里只定义优化器消费的 AST，
//! 以及绑定机制需要的提示文本解析和 SQL 规范化。

pub mod ast;
pub mod hint;
pub mod normalize;

pub use ast::{
    ByItem, ColumnName, ExecuteStmt, ExplainStmt, Expr, Limit, SelectField, SelectStmt,
    SimpleStmt, Stmt, TableSource,
};
pub use hint::{
    parse_hint_comment, parse_hints, restore_optimizer_hints, HintData, HintTable,
    TableOptimizerHint,
};
pub use normalize::{digest_normalized, normalize, normalize_digest};
