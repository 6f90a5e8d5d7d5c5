//! 逻辑改写规则
//!
//! 构建器通过规则位声明需要哪些改写，规则按固定顺序执行：先谓词下推，再列裁剪。

use crate::query::context::SessionVars;
use crate::query::parser::ast::{ColumnName, Expr};
use crate::query::planner::logical::{FLAG_PREDICATE_PUSH_DOWN, FLAG_PRUNE_COLUMNS};
use crate::query::planner::{DataSource, LogicalOp, LogicalPlan};

/// 按规则位执行逻辑改写
pub fn logical_optimize(vars: &mut SessionVars, flag: u64, plan: LogicalPlan) -> LogicalPlan {
    let mut plan = plan;
    if flag & FLAG_PREDICATE_PUSH_DOWN != 0 {
        plan = push_down_predicates(vars, plan, Vec::new());
    }
    if flag & FLAG_PRUNE_COLUMNS != 0 {
        prune_columns(&mut plan);
    }
    plan
}

/// 把条件尽量推到数据源上，推不下去的留在原位置的 Selection 中
pub fn push_down_predicates(vars: &mut SessionVars, plan: LogicalPlan, conds: Vec<Expr>) -> LogicalPlan {
    let LogicalPlan { id, op, row_count } = plan;
    match op {
        LogicalOp::Selection { conditions, child } => {
            let mut all = conditions;
            all.extend(conds);
            push_down_predicates(vars, *child, all)
        }
        LogicalOp::DataSource(mut ds) => {
            ds.pushed_conds.extend(conds);
            LogicalPlan {
                id,
                op: LogicalOp::DataSource(ds),
                row_count,
            }
        }
        LogicalOp::Sort { by_items, child } => {
            let child = push_down_predicates(vars, *child, conds);
            LogicalPlan {
                id,
                op: LogicalOp::Sort {
                    by_items,
                    child: Box::new(child),
                },
                row_count,
            }
        }
        LogicalOp::Join {
            conditions,
            left,
            right,
        } => {
            let mut join_conds = conditions;
            let mut left_conds = Vec::new();
            let mut right_conds = Vec::new();
            for cond in conds {
                match side_of(&cond, &left, &right) {
                    Side::Left => left_conds.push(cond),
                    Side::Right => right_conds.push(cond),
                    Side::Both => join_conds.push(cond),
                }
            }
            let left = push_down_predicates(vars, *left, left_conds);
            let right = push_down_predicates(vars, *right, right_conds);
            LogicalPlan {
                id,
                op: LogicalOp::Join {
                    conditions: join_conds,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                row_count,
            }
        }
        // 条件不能越过 LIMIT，投影之上的条件也原地保留
        LogicalOp::Limit {
            offset,
            count,
            child,
        } => {
            let child = push_down_predicates(vars, *child, Vec::new());
            let plan = LogicalPlan {
                id,
                op: LogicalOp::Limit {
                    offset,
                    count,
                    child: Box::new(child),
                },
                row_count,
            };
            wrap_selection(vars, plan, conds)
        }
        LogicalOp::Projection {
            exprs,
            schema,
            child,
        } => {
            let child = push_down_predicates(vars, *child, Vec::new());
            let plan = LogicalPlan {
                id,
                op: LogicalOp::Projection {
                    exprs,
                    schema,
                    child: Box::new(child),
                },
                row_count,
            };
            wrap_selection(vars, plan, conds)
        }
        op @ LogicalOp::TableDual { .. } => {
            wrap_selection(vars, LogicalPlan { id, op, row_count }, conds)
        }
    }
}

fn wrap_selection(vars: &mut SessionVars, plan: LogicalPlan, conds: Vec<Expr>) -> LogicalPlan {
    if conds.is_empty() {
        return plan;
    }
    LogicalPlan::new(
        vars.alloc_plan_id(),
        LogicalOp::Selection {
            conditions: conds,
            child: Box::new(plan),
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
    Both,
}

pub(crate) fn side_of(cond: &Expr, left: &LogicalPlan, right: &LogicalPlan) -> Side {
    side_of_sources(cond, &left.data_sources(), &right.data_sources())
}

/// 条件引用的列全部来自连接的哪一侧，不引用列的条件放左侧
pub(crate) fn side_of_sources(cond: &Expr, left: &[&DataSource], right: &[&DataSource]) -> Side {
    let mut in_left = false;
    let mut in_right = false;
    for col in cond.columns() {
        if left.iter().any(|ds| ds.owns(col)) {
            in_left = true;
        } else if right.iter().any(|ds| ds.owns(col)) {
            in_right = true;
        }
    }
    match (in_left, in_right) {
        (_, false) => Side::Left,
        (false, true) => Side::Right,
        (true, true) => Side::Both,
    }
}

/// 裁剪数据源上不需要的列
///
/// 根节点的全部输出列都是需要的。数据源至少保留一列，优先保留句柄列。
pub fn prune_columns(plan: &mut LogicalPlan) {
    let needed: Vec<ColumnName> = plan
        .schema()
        .iter()
        .filter(|c| !c.table.is_empty())
        .map(|c| ColumnName {
            table: Some(c.table.clone()),
            name: c.name.clone(),
        })
        .collect();
    prune_with(plan, needed);
}

fn prune_with(plan: &mut LogicalPlan, mut needed: Vec<ColumnName>) {
    match &mut plan.op {
        LogicalOp::Projection { exprs, child, .. } => {
            let used = exprs.iter().flat_map(|e| e.columns()).cloned().collect();
            prune_with(child, used);
        }
        LogicalOp::Selection { conditions, child } => {
            needed.extend(conditions.iter().flat_map(|e| e.columns()).cloned());
            prune_with(child, needed);
        }
        LogicalOp::Sort { by_items, child } => {
            needed.extend(by_items.iter().flat_map(|b| b.expr.columns()).cloned());
            prune_with(child, needed);
        }
        LogicalOp::Limit { child, .. } => prune_with(child, needed),
        LogicalOp::Join {
            conditions,
            left,
            right,
        } => {
            needed.extend(conditions.iter().flat_map(|e| e.columns()).cloned());
            prune_with(left, needed.clone());
            prune_with(right, needed);
        }
        LogicalOp::DataSource(ds) => {
            needed.extend(ds.pushed_conds.iter().flat_map(|e| e.columns()).cloned());
            let as_name = ds.as_name.clone();
            let is_used = |name: &str| {
                needed.iter().any(|n| {
                    n.name.eq_ignore_ascii_case(name)
                        && n.table.as_deref().map_or(true, |t| t.eq_ignore_ascii_case(&as_name))
                })
            };
            let kept: Vec<_> = ds
                .columns
                .iter()
                .filter(|c| is_used(&c.name))
                .cloned()
                .collect();
            if !kept.is_empty() {
                ds.columns = kept;
            } else {
                let fallback = ds
                    .columns
                    .iter()
                    .find(|c| c.is_handle)
                    .or_else(|| ds.columns.first())
                    .cloned();
                ds.columns = fallback.into_iter().collect();
            }
        }
        LogicalOp::TableDual { .. } => {}
    }
}
