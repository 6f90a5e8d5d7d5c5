//! Cascades 风格的搜索
//!
//! 1. 预处理：列裁剪和行数推导
//! 2. 把逻辑计划拆成 memo 中的等价组
//! 3. 反复应用探索规则直到没有新的表达式
//! 4. 自顶向下实现每个组，代价超过上限的候选直接剪掉
//!
//! reader 类算子的代价按扫描并发度摊薄过，判断其子节点是否超限时
//! 先用 `scale_cost_limit` 把上限换算到同一口径。

pub mod memo;
pub mod transformation;

pub use memo::{Group, GroupExpr, GroupId, Memo, MemoOp};
pub use transformation::{default_rules, ExplorationRule, PushSelDownDataSource, PushSelDownJoin};

use super::access::data_source_candidates;
use super::derive::derive_stats;
use super::rules::prune_columns;
use super::task::{self, Task};
use super::{OrderProp, PlanSearch};
use crate::core::error::{OptimizeError, OptimizeResult};
use crate::query::context::SessionVars;
use crate::query::planner::logical::FLAG_PRUNE_COLUMNS;
use crate::query::planner::{LogicalPlan, PhysicalPlan};
use std::collections::HashMap;

#[derive(Debug)]
pub struct CascadesSearch {
    rules: Vec<Box<dyn ExplorationRule>>,
}

impl Default for CascadesSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadesSearch {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn ExplorationRule>>) -> Self {
        Self { rules }
    }

    /// 探索到不动点，新加入的组和表达式也会被探索
    fn explore(&self, memo: &mut Memo, vars: &mut SessionVars) {
        let mut round = 0;
        loop {
            let mut changed = false;
            let mut gid = 0;
            while gid < memo.len() {
                let mut ei = 0;
                while ei < memo.group(gid).exprs.len() {
                    for rule in &self.rules {
                        if !memo.group_mut(gid).exprs[ei]
                            .explored_rules
                            .insert(rule.name())
                        {
                            continue;
                        }
                        if rule.on_transform(memo, gid, ei, vars) {
                            log::debug!("规则 {} 作用于组 {}", rule.name(), gid);
                            changed = true;
                        }
                    }
                    ei += 1;
                }
                gid += 1;
            }
            round += 1;
            if !changed {
                break;
            }
        }
        log::debug!("探索结束: {} 轮, {} 个组", round, memo.len());
    }
}

impl PlanSearch for CascadesSearch {
    fn name(&self) -> &'static str {
        "cascades"
    }

    fn find_best_plan(
        &self,
        vars: &mut SessionVars,
        opt_flag: u64,
        plan: LogicalPlan,
    ) -> OptimizeResult<(PhysicalPlan, f64)> {
        let mut plan = plan;
        if opt_flag & FLAG_PRUNE_COLUMNS != 0 {
            prune_columns(&mut plan);
        }
        derive_stats(&mut plan);
        let mut memo = Memo::from_logical(plan);
        self.explore(&mut memo, vars);

        let root = memo.root();
        let mut ctx = ImplContext::new(&memo, vars);
        match ctx.implement_group(root, &OrderProp::default(), f64::MAX)? {
            Some(t) => {
                log::debug!("cascades 搜索完成, 最优代价 {:.4}", t.cost);
                Ok((t.plan, t.cost))
            }
            None => Err(OptimizeError::NoFeasiblePlan(format!(
                "组 {} 没有可用的物理计划",
                root
            ))),
        }
    }
}

/// 实现阶段的状态，只缓存找到的计划，剪枝得到的空结果与上限有关不缓存
pub(crate) struct ImplContext<'a> {
    memo: &'a Memo,
    vars: &'a mut SessionVars,
    best: HashMap<(GroupId, OrderProp), Task>,
}

impl<'a> ImplContext<'a> {
    pub(crate) fn new(memo: &'a Memo, vars: &'a mut SessionVars) -> Self {
        Self {
            memo,
            vars,
            best: HashMap::new(),
        }
    }

    fn offer(best: &mut Option<Task>, limit: &mut f64, candidate: Task) {
        if candidate.cost > *limit {
            return;
        }
        *limit = candidate.cost;
        Task::keep_cheaper(best, candidate);
    }

    pub(crate) fn implement_group(
        &mut self,
        gid: GroupId,
        prop: &OrderProp,
        cost_limit: f64,
    ) -> OptimizeResult<Option<Task>> {
        let key = (gid, prop.clone());
        if let Some(t) = self.best.get(&key) {
            return Ok((t.cost <= cost_limit).then(|| t.clone()));
        }
        let memo = self.memo;
        let group = memo.group(gid);
        let f = self.vars.cost_factors;
        let mut limit = cost_limit;
        let mut best = None;

        for expr in &group.exprs {
            match &expr.op {
                MemoOp::DataSource(ds) => {
                    for mut node in data_source_candidates(self.vars, ds, group.row_count, prop) {
                        node.calc_cost();
                        if node.children_cost() > node.scale_cost_limit(limit) || node.cost() > limit {
                            continue;
                        }
                        Self::offer(&mut best, &mut limit, Task::from_impl(node));
                    }
                }
                MemoOp::TableDual { row_count } => {
                    Self::offer(&mut best, &mut limit, task::table_dual(expr.id, *row_count));
                }
                MemoOp::Selection { conditions } => {
                    if let Some(c) = self.implement_child(expr, 0, prop, limit)? {
                        let t = task::selection(expr.id, group.row_count, conditions.clone(), c, &f);
                        Self::offer(&mut best, &mut limit, t);
                    }
                }
                MemoOp::Projection { exprs, schema } => {
                    if let Some(c) = self.implement_child(expr, 0, prop, limit)? {
                        let t = task::projection(
                            expr.id,
                            group.row_count,
                            exprs.clone(),
                            schema.clone(),
                            c,
                            &f,
                        );
                        Self::offer(&mut best, &mut limit, t);
                    }
                }
                MemoOp::Limit { offset, count } => {
                    if let Some(c) = self.implement_child(expr, 0, prop, limit)? {
                        let t = task::limit(expr.id, group.row_count, *offset, *count, c, &f);
                        Self::offer(&mut best, &mut limit, t);
                    }
                }
                MemoOp::Sort { by_items } => {
                    let own = OrderProp::from_by_items(by_items);
                    if !prop.is_empty() && own.as_ref() != Some(prop) {
                        continue;
                    }
                    let t = match own {
                        Some(sort_prop) => self.implement_child(expr, 0, &sort_prop, limit)?,
                        None => self
                            .implement_child(expr, 0, &OrderProp::default(), limit)?
                            .map(|c| task::sort(expr.id, by_items.clone(), c, &f)),
                    };
                    if let Some(t) = t {
                        Self::offer(&mut best, &mut limit, t);
                    }
                }
                MemoOp::Join { conditions } => {
                    if !prop.is_empty() {
                        continue;
                    }
                    let l = self.implement_child(expr, 0, prop, limit)?;
                    let r = self.implement_child(expr, 1, prop, limit)?;
                    if let (Some(l), Some(r)) = (l, r) {
                        let t = task::hash_join(expr.id, group.row_count, conditions.clone(), l, r, &f);
                        Self::offer(&mut best, &mut limit, t);
                    }
                }
            }
        }

        if !prop.is_empty() {
            if let Some(unordered) = self.implement_group(gid, &OrderProp::default(), limit)? {
                let sorted = task::enforce_sort(self.vars.alloc_plan_id(), prop, unordered, &f);
                Self::offer(&mut best, &mut limit, sorted);
            }
        }

        if let Some(t) = &best {
            self.best.insert(key, t.clone());
        }
        Ok(best)
    }

    fn implement_child(
        &mut self,
        expr: &GroupExpr,
        idx: usize,
        prop: &OrderProp,
        limit: f64,
    ) -> OptimizeResult<Option<Task>> {
        match expr.children.get(idx) {
            Some(child) => self.implement_group(*child, prop, limit),
            None => Err(OptimizeError::Internal(format!(
                "{}_{} 缺少第 {} 个子节点",
                expr.op.name(),
                expr.id,
                idx
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnInfo, FieldKind, IndexInfo, TableInfo};
    use crate::core::types::{CompareOp, Datum, StoreType};
    use crate::query::optimizer::search::DpSearch;
    use crate::query::optimizer::stats::{ColumnStatistics, Histogram, TableStatistics};
    use crate::query::parser::ast::Expr;
    use crate::query::planner::logical::FLAG_PREDICATE_PUSH_DOWN;
    use crate::query::planner::{AccessPath, DataSource, LogicalOp, PhysicalOp, PlanColumn};
    use std::sync::Arc;

    fn data_source(vars: &mut SessionVars, name: &str) -> LogicalPlan {
        let table = Arc::new(
            TableInfo::new(1, name)
                .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
                .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
                .with_handle("id")
                .with_index(IndexInfo::new(1, "idx_a", &["a"])),
        );
        let hist = Histogram::new(1000, 0)
            .append_bucket(Datum::Int(0), Datum::Int(999), 100000.0, 100.0);
        let stats = TableStatistics::new(1, 100000.0)
            .with_column(ColumnStatistics::new(2, FieldKind::Int, hist));
        let columns = table
            .columns
            .iter()
            .map(|c| PlanColumn {
                unique_id: vars.alloc_column_id(),
                col_id: c.id,
                table: name.to_string(),
                name: c.name.clone(),
                kind: c.kind,
                is_handle: c.name == "id",
            })
            .collect();
        LogicalPlan::new(
            vars.alloc_plan_id(),
            LogicalOp::DataSource(DataSource {
                db: "test".to_string(),
                table,
                as_name: name.to_string(),
                columns,
                pushed_conds: Vec::new(),
                possible_paths: vec![
                    AccessPath::table_path(StoreType::TiKV),
                    AccessPath::index_path(IndexInfo::new(1, "idx_a", &["a"])),
                ],
                stats: Arc::new(stats),
            }),
        )
    }

    fn selection(vars: &mut SessionVars, conditions: Vec<Expr>, child: LogicalPlan) -> LogicalPlan {
        LogicalPlan::new(
            vars.alloc_plan_id(),
            LogicalOp::Selection {
                conditions,
                child: Box::new(child),
            },
        )
    }

    const FLAGS: u64 = FLAG_PREDICATE_PUSH_DOWN | FLAG_PRUNE_COLUMNS;

    #[test]
    fn test_selection_pushed_into_data_source() {
        let mut vars = SessionVars::default();
        let ds = data_source(&mut vars, "t");
        let plan = selection(&mut vars, vec![Expr::eq(Expr::col("a"), Expr::lit(7))], ds);

        let (best, cost) = CascadesSearch::new()
            .find_best_plan(&mut vars, FLAGS, plan.clone())
            .expect("搜索失败");
        assert_eq!(best.tp(), "IndexReader");

        let (dp_best, dp_cost) = DpSearch::new()
            .find_best_plan(&mut vars, FLAGS, plan)
            .expect("搜索失败");
        assert_eq!(dp_best.tp(), best.tp());
        assert!((cost - dp_cost).abs() < 1e-6);
    }

    #[test]
    fn test_selection_pushed_through_join() {
        let mut vars = SessionVars::default();
        let t1 = data_source(&mut vars, "t1");
        let t2 = data_source(&mut vars, "t2");
        let join = LogicalPlan::new(
            vars.alloc_plan_id(),
            LogicalOp::Join {
                conditions: Vec::new(),
                left: Box::new(t1),
                right: Box::new(t2),
            },
        );
        let conds = vec![
            Expr::eq(Expr::col("t1.id"), Expr::col("t2.id")),
            Expr::compare(CompareOp::Lt, Expr::col("t1.a"), Expr::lit(3)),
        ];
        let plan = selection(&mut vars, conds, join);
        let (best, _) = CascadesSearch::new()
            .find_best_plan(&mut vars, FLAGS, plan)
            .expect("搜索失败");
        match &best.op {
            PhysicalOp::HashJoin { conditions, left, .. } => {
                assert_eq!(conditions.len(), 1);
                assert_eq!(left.tp(), "IndexReader");
            }
            other => panic!("期望 HashJoin, 得到 {:?}", other),
        }
    }

    #[test]
    fn test_join_cost_matches_dp() {
        let build = |vars: &mut SessionVars, conds: Vec<Expr>| {
            let t1 = data_source(vars, "t1");
            let t2 = data_source(vars, "t2");
            let join = LogicalPlan::new(
                vars.alloc_plan_id(),
                LogicalOp::Join {
                    conditions: Vec::new(),
                    left: Box::new(t1),
                    right: Box::new(t2),
                },
            );
            selection(vars, conds, join)
        };
        let on = Expr::eq(Expr::col("t1.id"), Expr::col("t2.id"));
        let filter = Expr::compare(CompareOp::Lt, Expr::col("t1.a"), Expr::lit(3));

        for conds in [vec![on.clone()], vec![on.clone(), filter.clone()]] {
            let mut vars = SessionVars::default();
            let plan = build(&mut vars, conds);
            let (dp_best, dp_cost) = DpSearch::new()
                .find_best_plan(&mut vars, FLAGS, plan.clone())
                .expect("搜索失败");
            let (best, cost) = CascadesSearch::new()
                .find_best_plan(&mut vars, FLAGS, plan)
                .expect("搜索失败");
            assert_eq!(best.tp(), "HashJoin");
            assert_eq!(best.stats_rows, dp_best.stats_rows);
            assert!((cost - dp_cost).abs() < 1e-6, "cascades {} dp {}", cost, dp_cost);
        }
    }

    #[test]
    fn test_cost_limit_prunes_everything() {
        let mut vars = SessionVars::default();
        let mut plan = data_source(&mut vars, "t");
        derive_stats(&mut plan);
        let memo = Memo::from_logical(plan);
        let mut ctx = ImplContext::new(&memo, &mut vars);
        let pruned = ctx
            .implement_group(memo.root(), &OrderProp::default(), 1.0)
            .expect("实现失败");
        assert!(pruned.is_none());
        let found = ctx
            .implement_group(memo.root(), &OrderProp::default(), f64::MAX)
            .expect("实现失败");
        assert!(found.is_some());
    }
}
