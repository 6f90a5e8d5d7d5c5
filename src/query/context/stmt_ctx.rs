//! 语句上下文
//!
//! 每条语句开始优化前重置。告警只追加不报错，由执行层展示给用户。

use crate::core::error::HintWarning;
use crate::query::optimizer::hint::StmtHints;

/// 语句访问过的表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub db: String,
    pub table: String,
}

#[derive(Debug, Clone, Default)]
pub struct StmtContext {
    pub warnings: Vec<HintWarning>,
    pub stmt_hints: StmtHints,
    pub tables: Vec<TableEntry>,
    /// 本条语句是否使用了绑定
    pub bind_sql_used: bool,
}

impl StmtContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_warning(&mut self, warning: HintWarning) {
        self.warnings.push(warning);
    }

    pub fn append_warnings(&mut self, warnings: impl IntoIterator<Item = HintWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}
