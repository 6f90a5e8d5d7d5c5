//! 物理计划
//!
//! 访问算子（表扫描、索引扫描和三种 reader）的代价由 `implementation` 层计算，
//! 其余算子的局部代价由 [`PhysicalPlan::local_cost`] 给出。

use super::PlanColumn;
use crate::core::schema::{IndexInfo, TableInfo};
use crate::core::types::{Range, StoreType};
use crate::query::optimizer::cost::CostFactors;
use crate::query::parser::ast::{ByItem, Expr};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct TableScanInfo {
    pub db: String,
    pub table: Arc<TableInfo>,
    pub as_name: String,
    /// 句柄上的扫描区间，回表时为空
    pub ranges: Vec<Range>,
    pub desc: bool,
    pub keep_order: bool,
    pub store: StoreType,
    /// 下推到存储层的过滤条件
    pub filters: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanInfo {
    pub db: String,
    pub table: Arc<TableInfo>,
    pub as_name: String,
    pub index: IndexInfo,
    pub ranges: Vec<Range>,
    pub desc: bool,
    pub keep_order: bool,
    pub filters: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalOp {
    TableDual {
        row_count: usize,
    },
    TableReader {
        table_plan: Box<PhysicalPlan>,
        store: StoreType,
    },
    IndexReader {
        index_plan: Box<PhysicalPlan>,
    },
    IndexLookUpReader {
        index_plan: Box<PhysicalPlan>,
        table_plan: Box<PhysicalPlan>,
        keep_order: bool,
    },
    TableScan(TableScanInfo),
    IndexScan(IndexScanInfo),
    Selection {
        conditions: Vec<Expr>,
        child: Box<PhysicalPlan>,
    },
    Projection {
        exprs: Vec<Expr>,
        child: Box<PhysicalPlan>,
    },
    Sort {
        by_items: Vec<ByItem>,
        child: Box<PhysicalPlan>,
    },
    Limit {
        offset: u64,
        count: u64,
        child: Box<PhysicalPlan>,
    },
    HashJoin {
        conditions: Vec<Expr>,
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalPlan {
    pub id: i64,
    /// 输出行数估算
    pub stats_rows: f64,
    pub schema: Vec<PlanColumn>,
    pub op: PhysicalOp,
}

/// 投影算子的代价，回表的额外投影也使用它
pub fn projection_cost(rows: f64, factors: &CostFactors) -> f64 {
    let workers = factors.projection_workers();
    rows * factors.cpu_factor / workers + (1.0 + workers) * factors.concurrency_factor
}

impl PhysicalPlan {
    pub fn new(id: i64, stats_rows: f64, schema: Vec<PlanColumn>, op: PhysicalOp) -> Self {
        Self {
            id,
            stats_rows,
            schema,
            op,
        }
    }

    pub fn tp(&self) -> &'static str {
        match &self.op {
            PhysicalOp::TableDual { .. } => "TableDual",
            PhysicalOp::TableReader { .. } => "TableReader",
            PhysicalOp::IndexReader { .. } => "IndexReader",
            PhysicalOp::IndexLookUpReader { .. } => "IndexLookUp",
            PhysicalOp::TableScan(_) => "TableScan",
            PhysicalOp::IndexScan(_) => "IndexScan",
            PhysicalOp::Selection { .. } => "Selection",
            PhysicalOp::Projection { .. } => "Projection",
            PhysicalOp::Sort { .. } => "Sort",
            PhysicalOp::Limit { .. } => "Limit",
            PhysicalOp::HashJoin { .. } => "HashJoin",
        }
    }

    pub fn children(&self) -> Vec<&PhysicalPlan> {
        match &self.op {
            PhysicalOp::TableReader { table_plan, .. } => vec![table_plan.as_ref()],
            PhysicalOp::IndexReader { index_plan } => vec![index_plan.as_ref()],
            PhysicalOp::IndexLookUpReader {
                index_plan,
                table_plan,
                ..
            } => vec![index_plan.as_ref(), table_plan.as_ref()],
            PhysicalOp::Selection { child, .. }
            | PhysicalOp::Projection { child, .. }
            | PhysicalOp::Sort { child, .. }
            | PhysicalOp::Limit { child, .. } => vec![child.as_ref()],
            PhysicalOp::HashJoin { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            PhysicalOp::TableDual { .. }
            | PhysicalOp::TableScan(_)
            | PhysicalOp::IndexScan(_) => Vec::new(),
        }
    }

    /// 非访问算子自身的代价，不含子节点
    pub fn local_cost(&self, factors: &CostFactors) -> f64 {
        match &self.op {
            PhysicalOp::Selection { child, .. } => child.stats_rows * factors.cpu_factor,
            PhysicalOp::Projection { .. } => projection_cost(self.stats_rows, factors),
            PhysicalOp::Sort { child, .. } => {
                let n = child.stats_rows.max(2.0);
                n * n.log2() * factors.cpu_factor + n * factors.memory_factor
            }
            PhysicalOp::HashJoin { left, right, .. } => {
                let (l, r) = (left.stats_rows, right.stats_rows);
                let build = l.min(r);
                (l + r) * factors.cpu_factor
                    + build * factors.memory_factor
                    + self.stats_rows * factors.cpu_factor
            }
            _ => 0.0,
        }
    }

    /// 先序遍历计划树
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a PhysicalPlan)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// 以缩进文本展示计划树
    pub fn explain(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, depth: usize, out: &mut Vec<String>) {
        let indent = if depth == 0 {
            String::new()
        } else {
            format!("{}└─", "  ".repeat(depth - 1))
        };
        let info = self.operator_info();
        if info.is_empty() {
            out.push(format!("{}{}_{}\t{:.2}", indent, self.tp(), self.id, self.stats_rows));
        } else {
            out.push(format!(
                "{}{}_{}\t{:.2}\t{}",
                indent,
                self.tp(),
                self.id,
                self.stats_rows,
                info
            ));
        }
        for child in self.children() {
            child.explain_into(depth + 1, out);
        }
    }

    fn operator_info(&self) -> String {
        let join = |exprs: &[Expr]| {
            exprs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.op {
            PhysicalOp::TableScan(ts) => {
                let mut info = format!("table:{}", ts.as_name);
                if !ts.ranges.is_empty() {
                    let ranges: Vec<String> = ts.ranges.iter().map(|r| r.to_string()).collect();
                    info.push_str(&format!(", range:{}", ranges.join(",")));
                }
                if ts.keep_order {
                    info.push_str(&format!(", keep order:true, desc:{}", ts.desc));
                }
                if !ts.filters.is_empty() {
                    info.push_str(&format!(", filter:{}", join(&ts.filters)));
                }
                info
            }
            PhysicalOp::IndexScan(is) => {
                let ranges: Vec<String> = is.ranges.iter().map(|r| r.to_string()).collect();
                let mut info = format!(
                    "table:{}, index:{}({}), range:{}",
                    is.as_name,
                    is.index.name,
                    is.index.columns.join(", "),
                    ranges.join(",")
                );
                if is.keep_order {
                    info.push_str(&format!(", keep order:true, desc:{}", is.desc));
                }
                if !is.filters.is_empty() {
                    info.push_str(&format!(", filter:{}", join(&is.filters)));
                }
                info
            }
            PhysicalOp::TableReader { store, .. } => format!("store:{}", store),
            PhysicalOp::Selection { conditions, .. } => join(conditions),
            PhysicalOp::Projection { exprs, .. } => join(exprs),
            PhysicalOp::Sort { by_items, .. } => by_items
                .iter()
                .map(|b| {
                    if b.desc {
                        format!("{}:desc", b.expr)
                    } else {
                        b.expr.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
            PhysicalOp::Limit { offset, count, .. } => {
                format!("offset:{}, count:{}", offset, count)
            }
            PhysicalOp::HashJoin { conditions, .. } => {
                if conditions.is_empty() {
                    "CARTESIAN inner join".to_string()
                } else {
                    format!("inner join, equal:[{}]", join(conditions))
                }
            }
            PhysicalOp::TableDual { row_count } => format!("rows:{}", row_count),
            PhysicalOp::IndexReader { .. } | PhysicalOp::IndexLookUpReader { .. } => String::new(),
        }
    }
}
