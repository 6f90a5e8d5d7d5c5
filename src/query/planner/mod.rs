//! 计划模块
//!
//! 逻辑计划和物理计划的数据结构、访问路径、计划构建器接口及默认实现、
//! 点查快速计划、查询块提示处理以及权限和表锁检查接口。

pub mod access_path;
pub mod builder;
pub mod fast_plan;
pub mod hint_processor;
pub mod logical;
pub mod physical;
pub mod privilege;

pub use access_path::AccessPath;
pub use builder::{BuildOutput, BuiltPlan, DefaultPlanBuilder, PlanBuilder};
pub use fast_plan::PointGetPlan;
pub use hint_processor::BlockHintProcessor;
pub use logical::{DataSource, LogicalOp, LogicalPlan};
pub use physical::{IndexScanInfo, PhysicalOp, PhysicalPlan, TableScanInfo};
pub use privilege::{
    check_privilege, DefaultTableLockChecker, Privilege, PrivilegeChecker, StaticPrivilegeChecker,
    TableLockChecker, VisitInfo,
};

use crate::core::schema::FieldKind;
use crate::core::types::Datum;
use std::fmt;

/// 计划中的一列
#[derive(Debug, Clone, PartialEq)]
pub struct PlanColumn {
    /// 一次优化调用内唯一的列编号
    pub unique_id: i64,
    /// 表定义中的列 id，隐藏行句柄为 -1
    pub col_id: i64,
    /// 所属表在查询中的名字（别名优先）
    pub table: String,
    pub name: String,
    pub kind: FieldKind,
    pub is_handle: bool,
}

/// 隐藏行句柄列名
pub const EXTRA_HANDLE_NAME: &str = "_rowid";
pub const EXTRA_HANDLE_ID: i64 = -1;

/// 结果集的列名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldName {
    pub db: String,
    pub table: String,
    pub column: String,
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.table.is_empty() {
            write!(f, "{}", self.column)
        } else {
            write!(f, "{}.{}", self.table, self.column)
        }
    }
}

/// EXECUTE 计划，`plan` 在预处理计划优化后填入
#[derive(Debug, Clone)]
pub struct ExecutePlan {
    pub name: String,
    pub params: Vec<Datum>,
    pub plan: Option<Box<Plan>>,
    pub names: Vec<FieldName>,
}

/// 不需要代价优化的语句
#[derive(Debug, Clone, PartialEq)]
pub struct SimplePlan {
    pub text: String,
}

/// 优化器返回给执行层的计划
#[derive(Debug, Clone)]
pub enum Plan {
    Physical(PhysicalPlan),
    PointGet(PointGetPlan),
    Explain { analyze: bool, target: Box<Plan> },
    Execute(ExecutePlan),
    Simple(SimplePlan),
}

impl Plan {
    pub fn tp(&self) -> &'static str {
        match self {
            Plan::Physical(p) => p.tp(),
            Plan::PointGet(_) => "Point_Get",
            Plan::Explain { .. } => "Explain",
            Plan::Execute(_) => "Execute",
            Plan::Simple(_) => "Simple",
        }
    }

    pub fn as_physical(&self) -> Option<&PhysicalPlan> {
        match self {
            Plan::Physical(p) => Some(p),
            _ => None,
        }
    }

    /// 以缩进文本展示计划树，每个算子一行
    pub fn explain(&self) -> Vec<String> {
        match self {
            Plan::Physical(p) => p.explain(),
            Plan::PointGet(p) => vec![p.explain()],
            Plan::Explain { target, .. } => target.explain(),
            Plan::Execute(e) => match &e.plan {
                Some(p) => p.explain(),
                None => vec![format!("Execute {}", e.name)],
            },
            Plan::Simple(s) => vec![format!("Simple {}", s.text)],
        }
    }
}
