//! 探索规则
//!
//! 规则在组内加入与原表达式等价的新表达式，不删除任何已有表达式。
//!
//! - `PushSelDownDataSource` - Selection(DataSource) 等价于条件下推后的 DataSource
//! - `PushSelDownJoin` - Selection(Join) 等价于把单侧条件下推到连接两侧的 Join

use super::memo::{GroupExpr, GroupId, Memo, MemoOp};
use crate::query::context::SessionVars;
use crate::query::optimizer::search::derive::{derive_data_source, filtered_row_count};
use crate::query::optimizer::search::rules::{side_of_sources, Side};
use crate::query::parser::ast::Expr;
use std::fmt::Debug;

pub trait ExplorationRule: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// 尝试在 `group` 的第 `expr` 个表达式上应用规则，产生新表达式时返回 true
    fn on_transform(&self, memo: &mut Memo, group: GroupId, expr: usize, vars: &mut SessionVars) -> bool;
}

fn selection_conds(memo: &Memo, group: GroupId, expr: usize) -> Option<(Vec<Expr>, GroupId)> {
    let e = memo.group(group).exprs.get(expr)?;
    match (&e.op, e.children.first()) {
        (MemoOp::Selection { conditions }, Some(child)) => Some((conditions.clone(), *child)),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct PushSelDownDataSource;

impl ExplorationRule for PushSelDownDataSource {
    fn name(&self) -> &'static str {
        "push_selection_down_data_source"
    }

    fn on_transform(&self, memo: &mut Memo, group: GroupId, expr: usize, _vars: &mut SessionVars) -> bool {
        let (conds, child) = match selection_conds(memo, group, expr) {
            Some(v) => v,
            None => return false,
        };
        let id = memo.group(group).exprs[expr].id;
        let pushed: Vec<_> = memo
            .group(child)
            .exprs
            .iter()
            .filter_map(|e| match &e.op {
                MemoOp::DataSource(ds) => {
                    let mut ds = ds.clone();
                    ds.pushed_conds.extend(conds.iter().cloned());
                    derive_data_source(&mut ds);
                    Some(ds)
                }
                _ => None,
            })
            .collect();
        if pushed.is_empty() {
            return false;
        }
        let target = memo.group_mut(group);
        for ds in pushed {
            target
                .exprs
                .push(GroupExpr::new(id, MemoOp::DataSource(ds), Vec::new()));
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct PushSelDownJoin;

impl PushSelDownJoin {
    /// 在子组上加一层 Selection，返回新组
    fn selection_group(memo: &mut Memo, child: GroupId, conds: Vec<Expr>, vars: &mut SessionVars) -> GroupId {
        if conds.is_empty() {
            return child;
        }
        let rows = {
            let group = memo.group(child);
            let source = group.exprs.iter().find_map(|e| match &e.op {
                MemoOp::DataSource(ds) => Some(ds),
                _ => None,
            });
            filtered_row_count(source, group.row_count, &conds)
        };
        let expr = GroupExpr::new(
            vars.alloc_plan_id(),
            MemoOp::Selection { conditions: conds },
            vec![child],
        );
        memo.new_group(expr, rows)
    }
}

impl ExplorationRule for PushSelDownJoin {
    fn name(&self) -> &'static str {
        "push_selection_down_join"
    }

    fn on_transform(&self, memo: &mut Memo, group: GroupId, expr: usize, vars: &mut SessionVars) -> bool {
        let (conds, child) = match selection_conds(memo, group, expr) {
            Some(v) => v,
            None => return false,
        };
        let joins: Vec<(i64, Vec<Expr>, GroupId, GroupId)> = memo
            .group(child)
            .exprs
            .iter()
            .filter_map(|e| match (&e.op, e.children.as_slice()) {
                (MemoOp::Join { conditions }, [l, r]) => Some((e.id, conditions.clone(), *l, *r)),
                _ => None,
            })
            .collect();
        if joins.is_empty() {
            return false;
        }
        for (id, join_conds, l, r) in joins {
            let mut on = join_conds;
            let mut left = Vec::new();
            let mut right = Vec::new();
            {
                let ls = memo.data_sources(l);
                let rs = memo.data_sources(r);
                for cond in &conds {
                    match side_of_sources(cond, &ls, &rs) {
                        Side::Left => left.push(cond.clone()),
                        Side::Right => right.push(cond.clone()),
                        Side::Both => on.push(cond.clone()),
                    }
                }
            }
            let nl = Self::selection_group(memo, l, left, vars);
            let nr = Self::selection_group(memo, r, right, vars);
            memo.group_mut(group).exprs.push(GroupExpr::new(
                id,
                MemoOp::Join { conditions: on },
                vec![nl, nr],
            ));
        }
        true
    }
}

/// 默认的探索规则集
pub fn default_rules() -> Vec<Box<dyn ExplorationRule>> {
    vec![Box::new(PushSelDownDataSource), Box::new(PushSelDownJoin)]
}
