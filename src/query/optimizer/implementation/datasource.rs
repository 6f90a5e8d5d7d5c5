//! 数据源访问算子的代价
//!
//! 行宽来自表统计信息，统计信息缺失时退化为伪统计信息的默认行宽，代价计算从不失败。
//! reader 的代价按分布式扫描并发度摊薄，真实并发度取决于涉及的 region 数，计划时无法得知。

use super::Implementation;
use crate::core::types::StoreType;
use crate::query::optimizer::cost::{scale_cost_limit, CostFactors};
use crate::query::optimizer::stats::TableStatistics;
use crate::query::planner::physical::projection_cost;
use crate::query::planner::{PhysicalOp, PhysicalPlan, PlanColumn};
use std::sync::Arc;

fn col_ids(schema: &[PlanColumn]) -> Vec<i64> {
    schema.iter().map(|c| c.col_id).collect()
}

/// 为实现类型补上只读访问和取出计划的公共方法
macro_rules! impl_base {
    () => {
        fn cost(&self) -> f64 {
            self.cost
        }

        fn set_cost(&mut self, cost: f64) {
            self.cost = cost;
        }

        fn plan(&self) -> &PhysicalPlan {
            &self.plan
        }

        fn into_plan(self: Box<Self>) -> PhysicalPlan {
            self.plan
        }
    };
}

/// 常量行数据源，代价恒为 0
#[derive(Debug)]
pub struct TableDualImpl {
    plan: PhysicalPlan,
    cost: f64,
}

impl TableDualImpl {
    pub fn new(plan: PhysicalPlan) -> Self {
        Self { plan, cost: 0.0 }
    }
}

impl Implementation for TableDualImpl {
    fn calc_cost(&mut self, _out_count: f64, _children: &[&dyn Implementation]) -> f64 {
        self.cost = 0.0;
        self.cost
    }

    impl_base!();
}

#[derive(Debug)]
pub struct TableReaderImpl {
    plan: PhysicalPlan,
    cost: f64,
    stats: Arc<TableStatistics>,
    factors: CostFactors,
}

impl TableReaderImpl {
    pub fn new(plan: PhysicalPlan, stats: Arc<TableStatistics>, factors: CostFactors) -> Self {
        Self {
            plan,
            cost: 0.0,
            stats,
            factors,
        }
    }
}

impl Implementation for TableReaderImpl {
    fn calc_cost(&mut self, out_count: f64, children: &[&dyn Implementation]) -> f64 {
        let width = self
            .stats
            .avg_row_size(&col_ids(&self.plan.schema), false, false);
        let network_cost = out_count * self.factors.network_factor * width;
        let child_cost: f64 = children.first().map(|c| c.cost()).unwrap_or(0.0);
        self.cost = (network_cost + child_cost) / self.factors.scan_workers();
        self.cost
    }

    fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        scale_cost_limit(cost_limit, self.factors.scan_workers())
    }

    impl_base!();
}

#[derive(Debug)]
pub struct TableScanImpl {
    plan: PhysicalPlan,
    cost: f64,
    stats: Arc<TableStatistics>,
    factors: CostFactors,
}

impl TableScanImpl {
    pub fn new(plan: PhysicalPlan, stats: Arc<TableStatistics>, factors: CostFactors) -> Self {
        Self {
            plan,
            cost: 0.0,
            stats,
            factors,
        }
    }
}

impl Implementation for TableScanImpl {
    fn calc_cost(&mut self, out_count: f64, _children: &[&dyn Implementation]) -> f64 {
        let (desc, store) = match &self.plan.op {
            PhysicalOp::TableScan(ts) => (ts.desc, ts.store),
            _ => (false, StoreType::TiKV),
        };
        let handle_in_cols = self.plan.schema.iter().any(|c| c.is_handle);
        let width = self
            .stats
            .table_avg_row_size(&col_ids(&self.plan.schema), store, handle_in_cols);
        self.cost = out_count * self.factors.scan_factor_for(desc) * width;
        self.cost
    }

    impl_base!();
}

#[derive(Debug)]
pub struct IndexReaderImpl {
    plan: PhysicalPlan,
    cost: f64,
    stats: Arc<TableStatistics>,
    factors: CostFactors,
}

impl IndexReaderImpl {
    pub fn new(plan: PhysicalPlan, stats: Arc<TableStatistics>, factors: CostFactors) -> Self {
        Self {
            plan,
            cost: 0.0,
            stats,
            factors,
        }
    }
}

impl Implementation for IndexReaderImpl {
    fn calc_cost(&mut self, out_count: f64, children: &[&dyn Implementation]) -> f64 {
        let (child_schema, child_cost) = match children.first() {
            Some(c) => (col_ids(&c.plan().schema), c.cost()),
            None => (col_ids(&self.plan.schema), 0.0),
        };
        let width = self.stats.avg_row_size(&child_schema, true, false);
        let network_cost = out_count * self.factors.network_factor * width;
        self.cost = (network_cost + child_cost) / self.factors.scan_workers();
        self.cost
    }

    fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        scale_cost_limit(cost_limit, self.factors.scan_workers())
    }

    impl_base!();
}

#[derive(Debug)]
pub struct IndexScanImpl {
    plan: PhysicalPlan,
    cost: f64,
    stats: Arc<TableStatistics>,
    factors: CostFactors,
}

impl IndexScanImpl {
    pub fn new(plan: PhysicalPlan, stats: Arc<TableStatistics>, factors: CostFactors) -> Self {
        Self {
            plan,
            cost: 0.0,
            stats,
            factors,
        }
    }
}

impl Implementation for IndexScanImpl {
    fn calc_cost(&mut self, out_count: f64, _children: &[&dyn Implementation]) -> f64 {
        let (desc, unique, ranges) = match &self.plan.op {
            PhysicalOp::IndexScan(is) => (is.desc, is.index.unique, is.ranges.len()),
            _ => (false, false, 0),
        };
        let row_size = self
            .stats
            .index_avg_row_size(&col_ids(&self.plan.schema), unique);
        self.cost = out_count * row_size * self.factors.scan_factor_for(desc)
            + ranges as f64 * self.factors.seek_factor;
        self.cost
    }

    impl_base!();
}

/// 先扫索引再按句柄回表
///
/// 需要保序且输出列不含句柄时，回表结果上还有一个去掉句柄列的投影，
/// 此时对外可见的计划节点是这个投影。
#[derive(Debug)]
pub struct IndexLookUpReaderImpl {
    plan: PhysicalPlan,
    cost: f64,
    keep_order: bool,
    factors: CostFactors,
}

impl IndexLookUpReaderImpl {
    /// `plan` 为 IndexLookUp 节点，或包着它的额外投影
    pub fn new(plan: PhysicalPlan, keep_order: bool, factors: CostFactors) -> Self {
        Self {
            plan,
            cost: 0.0,
            keep_order,
            factors,
        }
    }

    fn has_extra_proj(&self) -> bool {
        matches!(self.plan.op, PhysicalOp::Projection { .. })
    }
}

impl Implementation for IndexLookUpReaderImpl {
    fn calc_cost(&mut self, _out_count: f64, children: &[&dyn Implementation]) -> f64 {
        let f = &self.factors;
        let mut cost = 0.0;
        if self.has_extra_proj() {
            cost += projection_cost(self.plan.stats_rows, f);
        }
        let (index_cost, index_rows) = children
            .first()
            .map(|c| (c.cost(), c.plan().stats_rows))
            .unwrap_or((0.0, 0.0));
        let (table_cost, table_rows) = children
            .get(1)
            .map(|c| (c.cost(), c.plan().stats_rows))
            .unwrap_or((0.0, 0.0));

        cost += (index_cost + table_cost) / f.scan_workers();
        // 按批构造回表请求
        cost += index_rows * f.cpu_factor;
        let workers = f.lookup_workers();
        cost += (workers + 1.0) * f.concurrency_factor;

        // 每批句柄在回表前排序
        let lookup_size = f.index_lookup_size as f64;
        let batch = lookup_size.min(index_rows);
        if batch > 2.0 {
            cost += index_rows * batch.log2() * f.cpu_factor / workers;
        }
        // 保序时回表结果还要再排一次，两次排序的行数可能不同
        let selectivity = if index_rows > 0.0 {
            table_rows / index_rows
        } else {
            0.0
        };
        let batch = (lookup_size * selectivity).min(table_rows);
        if self.keep_order && batch > 2.0 {
            cost += table_rows * batch.log2() * f.cpu_factor / workers;
        }
        self.cost = cost;
        self.cost
    }

    fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        scale_cost_limit(cost_limit, self.factors.scan_workers())
    }

    impl_base!();
}
