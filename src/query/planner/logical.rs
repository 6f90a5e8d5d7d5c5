//! 逻辑计划
//!
//! 由计划构建器产出，描述“算什么”而不涉及访问方式。
//! 计划树由一次优化调用独占，子节点归父节点所有。

use super::access_path::AccessPath;
use super::PlanColumn;
use crate::core::schema::TableInfo;
use crate::query::optimizer::stats::TableStatistics;
use crate::query::parser::ast::{ByItem, ColumnName, Expr};
use std::sync::Arc;

/// 逻辑优化规则开关位，由构建器按语句内容设置
pub const FLAG_PRUNE_COLUMNS: u64 = 1 << 0;
pub const FLAG_PREDICATE_PUSH_DOWN: u64 = 1 << 1;

/// 数据源，对应 FROM 中的一张表
#[derive(Debug, Clone)]
pub struct DataSource {
    pub db: String,
    pub table: Arc<TableInfo>,
    pub as_name: String,
    /// 输出列
    pub columns: Vec<PlanColumn>,
    /// 下推到数据源的过滤条件
    pub pushed_conds: Vec<Expr>,
    pub possible_paths: Vec<AccessPath>,
    pub stats: Arc<TableStatistics>,
}

impl DataSource {
    /// 列引用是否属于这张表
    pub fn owns(&self, col: &ColumnName) -> bool {
        let table_matches = col
            .table
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(&self.as_name));
        table_matches && self.table.find_column(&col.name).is_some()
    }

    /// 按列引用查找输出列
    pub fn column(&self, col: &ColumnName) -> Option<&PlanColumn> {
        if !self.owns(col) {
            return None;
        }
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&col.name))
    }
}

#[derive(Debug, Clone)]
pub enum LogicalOp {
    DataSource(DataSource),
    Selection {
        conditions: Vec<Expr>,
        child: Box<LogicalPlan>,
    },
    Projection {
        exprs: Vec<Expr>,
        schema: Vec<PlanColumn>,
        child: Box<LogicalPlan>,
    },
    Sort {
        by_items: Vec<ByItem>,
        child: Box<LogicalPlan>,
    },
    Limit {
        offset: u64,
        count: u64,
        child: Box<LogicalPlan>,
    },
    /// 内连接，`conditions` 为空时是笛卡尔积
    Join {
        conditions: Vec<Expr>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    TableDual {
        row_count: usize,
    },
}

#[derive(Debug, Clone)]
pub struct LogicalPlan {
    pub id: i64,
    pub op: LogicalOp,
    /// 输出行数估算，推导统计信息之前为 0
    pub row_count: f64,
}

impl LogicalPlan {
    pub fn new(id: i64, op: LogicalOp) -> Self {
        Self {
            id,
            op,
            row_count: 0.0,
        }
    }

    pub fn tp(&self) -> &'static str {
        match &self.op {
            LogicalOp::DataSource(_) => "DataSource",
            LogicalOp::Selection { .. } => "Selection",
            LogicalOp::Projection { .. } => "Projection",
            LogicalOp::Sort { .. } => "Sort",
            LogicalOp::Limit { .. } => "Limit",
            LogicalOp::Join { .. } => "Join",
            LogicalOp::TableDual { .. } => "TableDual",
        }
    }

    /// 输出列
    pub fn schema(&self) -> Vec<PlanColumn> {
        match &self.op {
            LogicalOp::DataSource(ds) => ds.columns.clone(),
            LogicalOp::Projection { schema, .. } => schema.clone(),
            LogicalOp::Selection { child, .. }
            | LogicalOp::Sort { child, .. }
            | LogicalOp::Limit { child, .. } => child.schema(),
            LogicalOp::Join { left, right, .. } => {
                let mut cols = left.schema();
                cols.extend(right.schema());
                cols
            }
            LogicalOp::TableDual { .. } => Vec::new(),
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match &self.op {
            LogicalOp::Selection { child, .. }
            | LogicalOp::Projection { child, .. }
            | LogicalOp::Sort { child, .. }
            | LogicalOp::Limit { child, .. } => vec![child.as_ref()],
            LogicalOp::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            LogicalOp::DataSource(_) | LogicalOp::TableDual { .. } => Vec::new(),
        }
    }

    /// 计划中的所有数据源
    pub fn data_sources(&self) -> Vec<&DataSource> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(p) = stack.pop() {
            if let LogicalOp::DataSource(ds) = &p.op {
                out.push(ds);
            }
            let mut children = p.children();
            children.reverse();
            stack.extend(children);
        }
        out
    }
}
