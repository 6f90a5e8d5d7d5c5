//! 搜索中间结果
//!
//! `Task` 是一个已经算好总代价的物理子计划。DP 搜索和 cascades 搜索
//! 用同一组函数把逻辑算子和子计划组装成物理算子。

use super::OrderProp;
use crate::query::optimizer::cost::CostFactors;
use crate::query::optimizer::implementation::{ImplNode, Implementation, TableDualImpl};
use crate::query::parser::ast::{ByItem, Expr};
use crate::query::planner::{PhysicalOp, PhysicalPlan, PlanColumn};

#[derive(Debug, Clone)]
pub struct Task {
    pub plan: PhysicalPlan,
    /// 含所有子节点的总代价
    pub cost: f64,
}

impl Task {
    pub fn from_impl(mut node: ImplNode) -> Self {
        let cost = node.calc_cost();
        Self {
            plan: node.into_plan(),
            cost,
        }
    }

    /// 保留代价更低的一个，代价相同时保留先找到的
    pub fn keep_cheaper(best: &mut Option<Task>, candidate: Task) {
        match best {
            Some(b) if b.cost <= candidate.cost => {}
            _ => *best = Some(candidate),
        }
    }

    fn wrap(id: i64, rows: f64, schema: Vec<PlanColumn>, op: PhysicalOp, child_cost: f64, f: &CostFactors) -> Self {
        let plan = PhysicalPlan::new(id, rows, schema, op);
        let cost = child_cost + plan.local_cost(f);
        Self { plan, cost }
    }
}

pub fn table_dual(id: i64, row_count: usize) -> Task {
    let plan = PhysicalPlan::new(
        id,
        row_count as f64,
        Vec::new(),
        PhysicalOp::TableDual { row_count },
    );
    let mut imp = TableDualImpl::new(plan);
    let cost = imp.calc_cost(row_count as f64, &[]);
    Task {
        plan: Box::new(imp).into_plan(),
        cost,
    }
}

pub fn selection(id: i64, rows: f64, conditions: Vec<Expr>, child: Task, f: &CostFactors) -> Task {
    let schema = child.plan.schema.clone();
    let op = PhysicalOp::Selection {
        conditions,
        child: Box::new(child.plan),
    };
    Task::wrap(id, rows, schema, op, child.cost, f)
}

pub fn projection(
    id: i64,
    rows: f64,
    exprs: Vec<Expr>,
    schema: Vec<PlanColumn>,
    child: Task,
    f: &CostFactors,
) -> Task {
    let op = PhysicalOp::Projection {
        exprs,
        child: Box::new(child.plan),
    };
    Task::wrap(id, rows, schema, op, child.cost, f)
}

pub fn sort(id: i64, by_items: Vec<ByItem>, child: Task, f: &CostFactors) -> Task {
    let rows = child.plan.stats_rows;
    let schema = child.plan.schema.clone();
    let op = PhysicalOp::Sort {
        by_items,
        child: Box::new(child.plan),
    };
    Task::wrap(id, rows, schema, op, child.cost, f)
}

/// 子计划不满足顺序属性时在其上补一个排序
pub fn enforce_sort(id: i64, prop: &OrderProp, child: Task, f: &CostFactors) -> Task {
    sort(id, prop.to_by_items(), child, f)
}

pub fn limit(id: i64, rows: f64, offset: u64, count: u64, child: Task, f: &CostFactors) -> Task {
    let schema = child.plan.schema.clone();
    let op = PhysicalOp::Limit {
        offset,
        count,
        child: Box::new(child.plan),
    };
    Task::wrap(id, rows, schema, op, child.cost, f)
}

pub fn hash_join(id: i64, rows: f64, conditions: Vec<Expr>, left: Task, right: Task, f: &CostFactors) -> Task {
    let mut schema = left.plan.schema.clone();
    schema.extend(right.plan.schema.iter().cloned());
    let child_cost = left.cost + right.cost;
    let op = PhysicalOp::HashJoin {
        conditions,
        left: Box::new(left.plan),
        right: Box::new(right.plan),
    };
    Task::wrap(id, rows, schema, op, child_cost, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::ast::Expr;

    #[test]
    fn test_dual_is_free() {
        let t = table_dual(1, 1);
        assert_eq!(t.cost, 0.0);
        assert_eq!(t.plan.tp(), "TableDual");
    }

    #[test]
    fn test_costs_accumulate() {
        let f = CostFactors::default();
        let dual = Task {
            plan: PhysicalPlan::new(1, 100.0, Vec::new(), PhysicalOp::TableDual { row_count: 100 }),
            cost: 10.0,
        };
        let sel = selection(2, 80.0, vec![Expr::eq(Expr::col("a"), Expr::lit(1))], dual, &f);
        // 选择算子按输入行数计 CPU
        assert_eq!(sel.cost, 10.0 + 100.0 * f.cpu_factor);
        let lim = limit(3, 10.0, 0, 10, sel.clone(), &f);
        assert_eq!(lim.cost, sel.cost);
        assert_eq!(lim.plan.children()[0].tp(), "Selection");
    }

    #[test]
    fn test_keep_cheaper() {
        let mk = |cost| Task {
            plan: PhysicalPlan::new(1, 1.0, Vec::new(), PhysicalOp::TableDual { row_count: 1 }),
            cost,
        };
        let mut best = None;
        Task::keep_cheaper(&mut best, mk(5.0));
        Task::keep_cheaper(&mut best, mk(7.0));
        Task::keep_cheaper(&mut best, mk(3.0));
        assert_eq!(best.map(|t| t.cost), Some(3.0));
    }
}
