//! 自顶向下的动态规划搜索
//!
//! 先按规则位做逻辑改写并推导行数，然后对每个逻辑算子按父算子要求的顺序属性
//! 寻找代价最低的物理计划。要求有序时，总会额外尝试“无序计划 + 排序”。
//! 同一个 (算子, 顺序属性) 的结果只计算一次。

use super::access::data_source_candidates;
use super::derive::derive_stats;
use super::rules::logical_optimize;
use super::task::{self, Task};
use super::{OrderProp, PlanSearch};
use crate::core::error::{OptimizeError, OptimizeResult};
use crate::query::context::SessionVars;
use crate::query::planner::{LogicalOp, LogicalPlan, PhysicalPlan};
use std::collections::HashMap;

/// 默认的代价搜索
#[derive(Debug, Default)]
pub struct DpSearch;

impl DpSearch {
    pub fn new() -> Self {
        Self
    }
}

impl PlanSearch for DpSearch {
    fn name(&self) -> &'static str {
        "dp"
    }

    fn find_best_plan(
        &self,
        vars: &mut SessionVars,
        opt_flag: u64,
        plan: LogicalPlan,
    ) -> OptimizeResult<(PhysicalPlan, f64)> {
        let mut plan = logical_optimize(vars, opt_flag, plan);
        derive_stats(&mut plan);
        let mut search = DpContext {
            vars,
            tasks: HashMap::new(),
        };
        let best = search.find_best_task(&plan, &OrderProp::default())?;
        match best {
            Some(t) => {
                log::debug!("dp 搜索完成, 最优代价 {:.4}", t.cost);
                Ok((t.plan, t.cost))
            }
            None => Err(OptimizeError::NoFeasiblePlan(format!(
                "{}_{} 没有可用的物理计划",
                plan.tp(),
                plan.id
            ))),
        }
    }
}

struct DpContext<'a> {
    vars: &'a mut SessionVars,
    tasks: HashMap<(i64, OrderProp), Option<Task>>,
}

impl DpContext<'_> {
    fn find_best_task(&mut self, plan: &LogicalPlan, prop: &OrderProp) -> OptimizeResult<Option<Task>> {
        let key = (plan.id, prop.clone());
        if let Some(t) = self.tasks.get(&key) {
            return Ok(t.clone());
        }
        let mut best = self.task_with_prop(plan, prop)?;
        if !prop.is_empty() {
            if let Some(unordered) = self.find_best_task(plan, &OrderProp::default())? {
                let f = self.vars.cost_factors;
                let sorted = task::enforce_sort(self.vars.alloc_plan_id(), prop, unordered, &f);
                Task::keep_cheaper(&mut best, sorted);
            }
        }
        self.tasks.insert(key, best.clone());
        Ok(best)
    }

    /// 由算子自身满足顺序属性的计划
    fn task_with_prop(&mut self, plan: &LogicalPlan, prop: &OrderProp) -> OptimizeResult<Option<Task>> {
        let f = self.vars.cost_factors;
        let rows = plan.row_count;
        let task = match &plan.op {
            LogicalOp::DataSource(ds) => {
                let mut best = None;
                for node in data_source_candidates(self.vars, ds, rows, prop) {
                    Task::keep_cheaper(&mut best, Task::from_impl(node));
                }
                best
            }
            LogicalOp::TableDual { row_count } => Some(task::table_dual(plan.id, *row_count)),
            LogicalOp::Selection { conditions, child } => self
                .find_best_task(child, prop)?
                .map(|c| task::selection(plan.id, rows, conditions.clone(), c, &f)),
            LogicalOp::Projection {
                exprs,
                schema,
                child,
            } => self
                .find_best_task(child, prop)?
                .map(|c| task::projection(plan.id, rows, exprs.clone(), schema.clone(), c, &f)),
            LogicalOp::Limit {
                offset,
                count,
                child,
            } => self
                .find_best_task(child, prop)?
                .map(|c| task::limit(plan.id, rows, *offset, *count, c, &f)),
            LogicalOp::Sort { by_items, child } => {
                // 排序本身只能产出它自己的顺序
                if !prop.is_empty() && OrderProp::from_by_items(by_items).as_ref() != Some(prop) {
                    return Ok(None);
                }
                match OrderProp::from_by_items(by_items) {
                    Some(sort_prop) => self.find_best_task(child, &sort_prop)?,
                    None => self
                        .find_best_task(child, &OrderProp::default())?
                        .map(|c| task::sort(plan.id, by_items.clone(), c, &f)),
                }
            }
            LogicalOp::Join {
                conditions,
                left,
                right,
            } => {
                if !prop.is_empty() {
                    return Ok(None);
                }
                let l = self.find_best_task(left, prop)?;
                let r = self.find_best_task(right, prop)?;
                match (l, r) {
                    (Some(l), Some(r)) => Some(task::hash_join(plan.id, rows, conditions.clone(), l, r, &f)),
                    _ => None,
                }
            }
        };
        Ok(task)
    }
}
