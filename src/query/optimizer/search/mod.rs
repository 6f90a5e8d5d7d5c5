//! 物理计划搜索
//!
//! 两种可互换的搜索策略，都以逻辑计划为输入、以代价最低的物理计划为输出：
//!
//! - `dp` - 先按规则位执行逻辑改写，再自顶向下带顺序属性的动态规划搜索
//! - `cascades` - 等价组 memo 上的探索与实现，实现阶段按代价上限剪枝
//!
//! 辅助模块：
//!
//! - `rules` - 谓词下推、列裁剪
//! - `derive` - 行数推导与访问路径填充
//! - `access` - 数据源的候选访问计划
//! - `task` - 搜索中间结果与公共的物理算子组装

pub mod access;
pub mod cascades;
pub mod derive;
pub mod dp;
pub mod rules;
pub mod task;

pub use cascades::CascadesSearch;
pub use dp::DpSearch;
pub use task::Task;

use crate::core::error::OptimizeResult;
use crate::query::context::SessionVars;
use crate::query::parser::ast::{ByItem, ColumnName, Expr};
use crate::query::planner::{LogicalPlan, PhysicalPlan};
use std::fmt::{self, Debug};

/// 物理计划搜索策略
pub trait PlanSearch: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// 返回最优物理计划及其总代价
    fn find_best_plan(
        &self,
        vars: &mut SessionVars,
        opt_flag: u64,
        plan: LogicalPlan,
    ) -> OptimizeResult<(PhysicalPlan, f64)>;
}

/// 顺序属性中的一项
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropItem {
    pub column: ColumnName,
    pub desc: bool,
}

/// 父算子要求子计划满足的输出顺序，为空表示没有要求
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OrderProp {
    pub items: Vec<PropItem>,
}

impl OrderProp {
    /// 排序项全部是列引用时才能转成顺序属性
    pub fn from_by_items(by_items: &[ByItem]) -> Option<Self> {
        let mut items = Vec::with_capacity(by_items.len());
        for item in by_items {
            match &item.expr {
                Expr::Column(c) => items.push(PropItem {
                    column: c.clone(),
                    desc: item.desc,
                }),
                _ => return None,
            }
        }
        Some(Self { items })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 所有项方向一致时返回该方向，扫描只能整体正序或逆序
    pub fn uniform_desc(&self) -> Option<bool> {
        let first = self.items.first()?.desc;
        if self.items.iter().all(|i| i.desc == first) {
            Some(first)
        } else {
            None
        }
    }

    pub fn to_by_items(&self) -> Vec<ByItem> {
        self.items
            .iter()
            .map(|i| ByItem {
                expr: Expr::Column(i.column.clone()),
                desc: i.desc,
            })
            .collect()
    }
}

impl fmt::Display for OrderProp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .items
            .iter()
            .map(|i| {
                if i.desc {
                    format!("{} desc", i.column)
                } else {
                    i.column.to_string()
                }
            })
            .collect();
        write!(f, "[{}]", items.join(", "))
    }
}
