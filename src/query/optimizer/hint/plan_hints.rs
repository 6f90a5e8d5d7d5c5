//! 计划提示
//!
//! 把物理计划选择的访问路径还原为提示，用于和绑定比较以及生成演进用的绑定 SQL；
//! 反方向把绑定的提示套到语句上重新优化。套提示总是作用在语句的副本上，
//! 原语句保持不变。

use crate::core::types::StoreType;
use crate::query::parser::ast::{ExplainStmt, SelectStmt, Stmt};
use crate::query::parser::hint::{hint_comment_span, restore_optimizer_hints, HintTable, TableOptimizerHint};
use crate::query::planner::{PhysicalOp, PhysicalPlan, Plan};

pub const HINT_USE_INDEX: &str = "use_index";
pub const HINT_READ_FROM_STORAGE: &str = "read_from_storage";

/// 从计划中提取访问路径提示
///
/// - TiKV 上的 TableReader → `use_index(t)`
/// - TiFlash 上的 TableReader → `read_from_storage(tiflash[t])`
/// - IndexReader / IndexLookUp → `use_index(t idx)`
/// - 点查 → 句柄点查为 `use_index(t)`，唯一索引点查为 `use_index(t idx)`
pub fn gen_hints_from_physical_plan(plan: &Plan) -> Vec<TableOptimizerHint> {
    let mut hints = Vec::new();
    match plan {
        Plan::Physical(p) => collect_physical_hints(p, &mut hints),
        Plan::PointGet(pg) => {
            let indexes: Vec<&str> = pg.index.iter().map(|i| i.name.as_str()).collect();
            hints.push(use_index(&pg.db, &pg.as_name, &indexes));
        }
        Plan::Explain { target, .. } => return gen_hints_from_physical_plan(target),
        Plan::Execute(exec) => {
            if let Some(p) = &exec.plan {
                return gen_hints_from_physical_plan(p);
            }
        }
        Plan::Simple(_) => {}
    }
    hints
}

fn hint_table(db: &str, table: &str) -> HintTable {
    let mut t = HintTable::new(table);
    if !db.is_empty() {
        t.db = Some(db.to_lowercase());
    }
    t
}

fn use_index(db: &str, table: &str, indexes: &[&str]) -> TableOptimizerHint {
    let mut hint = TableOptimizerHint::new(HINT_USE_INDEX);
    hint.tables.push(hint_table(db, table));
    hint.indexes = indexes.iter().map(|i| i.to_lowercase()).collect();
    hint
}

fn collect_physical_hints(plan: &PhysicalPlan, out: &mut Vec<TableOptimizerHint>) {
    match &plan.op {
        PhysicalOp::TableReader { table_plan, store } => {
            if let Some((db, table)) = scanned_table(table_plan) {
                let hint = match store {
                    StoreType::TiKV => use_index(&db, &table, &[]),
                    StoreType::TiFlash => {
                        let mut hint = TableOptimizerHint::read_from_storage(*store, &[]);
                        hint.tables.push(hint_table(&db, &table));
                        hint
                    }
                };
                out.push(hint);
            }
        }
        PhysicalOp::IndexReader { index_plan } | PhysicalOp::IndexLookUpReader { index_plan, .. } => {
            let mut found = None;
            index_plan.walk(&mut |p| {
                if found.is_some() {
                    return;
                }
                if let PhysicalOp::IndexScan(scan) = &p.op {
                    found = Some(use_index(&scan.db, &scan.as_name, &[scan.index.name.as_str()]));
                }
            });
            out.extend(found);
        }
        _ => {
            for child in plan.children() {
                collect_physical_hints(child, out);
            }
        }
    }
}

fn scanned_table(plan: &PhysicalPlan) -> Option<(String, String)> {
    let mut found = None;
    plan.walk(&mut |p| {
        if found.is_some() {
            return;
        }
        if let PhysicalOp::TableScan(scan) = &p.op {
            found = Some((scan.db.clone(), scan.as_name.clone()));
        }
    });
    found
}

/// 提示列表中是否有给定名字的提示
pub fn contain_table_hint(hints: &[TableOptimizerHint], name: &str) -> bool {
    hints.iter().any(|h| h.name.eq_ignore_ascii_case(name))
}

/// 返回替换了顶层提示的语句副本
///
/// 语句文本中的提示注释同步改写，EXPLAIN 改写被解释的语句。
pub fn bind_hint(stmt: &Stmt, hints: &[TableOptimizerHint]) -> Stmt {
    match stmt {
        Stmt::Select(select) => Stmt::Select(bind_select_hint(select, hints)),
        Stmt::Explain(explain) => {
            let inner = bind_hint(&explain.stmt, hints);
            Stmt::Explain(ExplainStmt::new(explain.analyze, inner))
        }
        other => other.clone(),
    }
}

fn bind_select_hint(select: &SelectStmt, hints: &[TableOptimizerHint]) -> SelectStmt {
    let mut out = select.clone();
    out.hints = hints.to_vec();
    if let Some(text) = inject_hint_comment(&select.text, &restore_optimizer_hints(hints)) {
        out.text = text;
    }
    out
}

/// 去掉文本里已有的提示注释，在第一个 SELECT 关键字后写入新的提示
///
/// 提示为空时只做删除。文本中没有 SELECT 关键字时返回 None。
pub fn inject_hint_comment(text: &str, hint: &str) -> Option<String> {
    let stripped = match hint_comment_span(text) {
        Some((start, end)) => {
            let tail = text[end + 2..].trim_start();
            format!("{} {}", text[..start].trim_end(), tail)
        }
        None => text.to_string(),
    };
    let pos = find_select_keyword(&stripped)?;
    if hint.is_empty() {
        return Some(stripped);
    }
    let (head, rest) = stripped.split_at(pos + "select".len());
    Some(format!("{} /*+ {} */ {}", head, hint, rest.trim_start()))
}

fn find_select_keyword(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut from = 0;
    while let Some(off) = lower[from..].find("select") {
        let pos = from + off;
        let before_ok = pos == 0 || !is_ident_byte(bytes[pos - 1]);
        let after = pos + "select".len();
        let after_ok = after >= bytes.len() || !is_ident_byte(bytes[after]);
        if before_ok && after_ok {
            return Some(pos);
        }
        from = after;
    }
    None
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
