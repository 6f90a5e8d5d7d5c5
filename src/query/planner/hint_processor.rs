//! 查询块提示处理
//!
//! 每个 SELECT 是一个查询块，按出现顺序编号为 `sel_1`、`sel_2`……
//! `qb_name(x)` 给当前块起别名，`@x` 或 `t@x` 限定的提示只作用于对应的块，
//! 不带限定的提示作用于书写它的块。

use crate::core::error::HintWarning;
use crate::query::parser::ast::Stmt;
use crate::query::parser::hint::TableOptimizerHint;
use std::collections::HashMap;

const DEFAULT_BLOCK_PREFIX: &str = "sel_";

#[derive(Debug, Default)]
pub struct BlockHintProcessor {
    /// 块别名到块编号
    qb_names: HashMap<String, usize>,
    hints: HashMap<usize, Vec<TableOptimizerHint>>,
    block_count: usize,
    warnings: Vec<HintWarning>,
}

impl BlockHintProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 遍历语句，给查询块编号并分派提示
    pub fn process(&mut self, stmt: &Stmt) {
        self.qb_names.clear();
        self.hints.clear();
        self.warnings.clear();
        self.block_count = 0;

        let select = match stmt.select() {
            Some(s) => s,
            None => return,
        };
        self.block_count = 1;
        let offset = self.block_count;
        for hint in select.hints.iter().filter(|h| h.name == "qb_name") {
            if let Some(name) = &hint.qb_name {
                self.qb_names.insert(name.clone(), offset);
            }
        }
        for hint in select.hints.iter().filter(|h| h.name != "qb_name") {
            let qb = hint
                .qb_name
                .as_ref()
                .or_else(|| hint.tables.first().and_then(|t| t.qb_name.as_ref()));
            let target = match qb {
                None => Some(offset),
                Some(name) => self.block_offset(name),
            };
            match target {
                Some(target) => self.hints.entry(target).or_default().push(hint.clone()),
                None => {
                    if let Some(name) = qb {
                        self.warnings
                            .push(HintWarning::UnknownQueryBlock(name.clone()));
                    }
                }
            }
        }
        log::debug!(
            "查询块提示处理完成: {} 个块, {} 条告警",
            self.block_count,
            self.warnings.len()
        );
    }

    fn block_offset(&self, name: &str) -> Option<usize> {
        if let Some(offset) = self.qb_names.get(name) {
            return Some(*offset);
        }
        name.strip_prefix(DEFAULT_BLOCK_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1 && *n <= self.block_count)
    }

    /// 作用于指定查询块的提示
    pub fn hints_for_block(&self, offset: usize) -> &[TableOptimizerHint] {
        self.hints.get(&offset).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// 取走处理过程中产生的告警
    pub fn take_warnings(&mut self) -> Vec<HintWarning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::ast::SelectStmt;

    fn process(sql: &str) -> BlockHintProcessor {
        let mut p = BlockHintProcessor::new();
        p.process(&Stmt::Select(SelectStmt::new(sql)));
        p
    }

    #[test]
    fn test_unqualified_hints_go_to_first_block() {
        let p = process("select /*+ use_index(t idx_a) */ * from t");
        assert_eq!(p.block_count(), 1);
        assert_eq!(p.hints_for_block(1).len(), 1);
    }

    #[test]
    fn test_qb_name_routing() {
        let mut p = process(
            "select /*+ qb_name(main), use_index(@main t idx_a), ignore_index(@sel_1 t idx_b), use_index(@sel_3 t idx_c) */ * from t",
        );
        assert_eq!(p.hints_for_block(1).len(), 2);
        assert_eq!(
            p.take_warnings(),
            vec![HintWarning::UnknownQueryBlock("sel_3".to_string())]
        );
        assert!(p.take_warnings().is_empty());
    }
}
