//! 等价组 memo
//!
//! 每个组包含若干逻辑上等价的表达式，表达式的子节点是组而不是具体算子。
//! 组存放在 arena 中，通过下标引用。每个表达式记录已经应用过的探索规则，
//! 同一规则不会在同一表达式上重复应用。

use crate::query::parser::ast::{ByItem, Expr};
use crate::query::planner::{DataSource, LogicalOp, LogicalPlan, PlanColumn};
use std::collections::HashSet;

pub type GroupId = usize;

/// 去掉子节点的逻辑算子
#[derive(Debug, Clone)]
pub enum MemoOp {
    DataSource(DataSource),
    Selection { conditions: Vec<Expr> },
    Projection { exprs: Vec<Expr>, schema: Vec<PlanColumn> },
    Sort { by_items: Vec<ByItem> },
    Limit { offset: u64, count: u64 },
    Join { conditions: Vec<Expr> },
    TableDual { row_count: usize },
}

impl MemoOp {
    pub fn name(&self) -> &'static str {
        match self {
            MemoOp::DataSource(_) => "DataSource",
            MemoOp::Selection { .. } => "Selection",
            MemoOp::Projection { .. } => "Projection",
            MemoOp::Sort { .. } => "Sort",
            MemoOp::Limit { .. } => "Limit",
            MemoOp::Join { .. } => "Join",
            MemoOp::TableDual { .. } => "TableDual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupExpr {
    /// 对应逻辑算子的编号，物理算子沿用
    pub id: i64,
    pub op: MemoOp,
    pub children: Vec<GroupId>,
    pub explored_rules: HashSet<&'static str>,
}

impl GroupExpr {
    pub fn new(id: i64, op: MemoOp, children: Vec<GroupId>) -> Self {
        Self {
            id,
            op,
            children,
            explored_rules: HashSet::new(),
        }
    }
}

#[derive(Debug)]
pub struct Group {
    pub id: GroupId,
    pub exprs: Vec<GroupExpr>,
    /// 组内所有表达式共享的输出行数
    pub row_count: f64,
}

#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    root: GroupId,
}

impl Memo {
    /// 把已经推导过行数的逻辑计划拆成组
    pub fn from_logical(plan: LogicalPlan) -> Self {
        let mut memo = Self::default();
        memo.root = memo.insert(plan);
        memo
    }

    fn insert(&mut self, plan: LogicalPlan) -> GroupId {
        let LogicalPlan { id, op, row_count } = plan;
        let (op, children) = match op {
            LogicalOp::DataSource(ds) => (MemoOp::DataSource(ds), Vec::new()),
            LogicalOp::TableDual { row_count } => (MemoOp::TableDual { row_count }, Vec::new()),
            LogicalOp::Selection { conditions, child } => {
                (MemoOp::Selection { conditions }, vec![self.insert(*child)])
            }
            LogicalOp::Projection {
                exprs,
                schema,
                child,
            } => (MemoOp::Projection { exprs, schema }, vec![self.insert(*child)]),
            LogicalOp::Sort { by_items, child } => {
                (MemoOp::Sort { by_items }, vec![self.insert(*child)])
            }
            LogicalOp::Limit {
                offset,
                count,
                child,
            } => (MemoOp::Limit { offset, count }, vec![self.insert(*child)]),
            LogicalOp::Join {
                conditions,
                left,
                right,
            } => {
                let l = self.insert(*left);
                let r = self.insert(*right);
                (MemoOp::Join { conditions }, vec![l, r])
            }
        };
        self.new_group(GroupExpr::new(id, op, children), row_count)
    }

    pub fn new_group(&mut self, expr: GroupExpr, row_count: f64) -> GroupId {
        let id = self.groups.len();
        self.groups.push(Group {
            id,
            exprs: vec![expr],
            row_count,
        });
        id
    }

    pub fn root(&self) -> GroupId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id]
    }

    /// 组产出的数据来自哪些表，取组内第一个表达式递归收集
    pub fn data_sources(&self, id: GroupId) -> Vec<&DataSource> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(g) = stack.pop() {
            if let Some(expr) = self.groups[g].exprs.first() {
                if let MemoOp::DataSource(ds) = &expr.op {
                    out.push(ds);
                }
                stack.extend(expr.children.iter().rev());
            }
        }
        out
    }
}
