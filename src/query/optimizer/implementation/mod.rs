//! 物理访问算子的代价实现
//!
//! 每个 `Implementation` 包装一个物理计划节点，在子节点代价已知后计算自身的累计代价。
//! 访问算子是封闭的小集合，新增访问方式只需要新增一个实现及其代价函数。
//!
//! - `datasource` - 表扫描、索引扫描、三种 reader 和 TableDual

pub mod datasource;

pub use datasource::{
    IndexLookUpReaderImpl, IndexReaderImpl, IndexScanImpl, TableDualImpl, TableReaderImpl,
    TableScanImpl,
};

use crate::query::planner::PhysicalPlan;
use std::fmt::Debug;

/// 物理计划节点的代价实现
pub trait Implementation: Debug + Send {
    /// 根据输出行数和子节点代价计算累计代价
    ///
    /// 相同输入总是得到相同结果，重复调用不会累加，也不修改子节点。
    fn calc_cost(&mut self, out_count: f64, children: &[&dyn Implementation]) -> f64;

    fn cost(&self) -> f64;

    fn set_cost(&mut self, cost: f64);

    /// 对外可见的计划节点
    fn plan(&self) -> &PhysicalPlan;

    fn into_plan(self: Box<Self>) -> PhysicalPlan;

    /// 把单线程口径的代价上限换算到本算子的并发口径
    fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        cost_limit
    }
}

/// 带子节点的实现树
#[derive(Debug)]
pub struct ImplNode {
    pub imp: Box<dyn Implementation>,
    pub children: Vec<ImplNode>,
}

impl ImplNode {
    pub fn new(imp: Box<dyn Implementation>, children: Vec<ImplNode>) -> Self {
        Self { imp, children }
    }

    pub fn leaf(imp: impl Implementation + 'static) -> Self {
        Self::new(Box::new(imp), Vec::new())
    }

    /// 自底向上计算整棵树的代价
    pub fn calc_cost(&mut self) -> f64 {
        for child in &mut self.children {
            child.calc_cost();
        }
        let children: Vec<&dyn Implementation> =
            self.children.iter().map(|c| c.imp.as_ref()).collect();
        let out_count = self.imp.plan().stats_rows;
        self.imp.calc_cost(out_count, &children)
    }

    pub fn cost(&self) -> f64 {
        self.imp.cost()
    }

    pub fn children_cost(&self) -> f64 {
        self.children.iter().map(|c| c.cost()).sum()
    }

    pub fn scale_cost_limit(&self, cost_limit: f64) -> f64 {
        self.imp.scale_cost_limit(cost_limit)
    }

    pub fn plan(&self) -> &PhysicalPlan {
        self.imp.plan()
    }

    /// 子节点的计划已经包含在父节点中，直接取根节点的计划
    pub fn into_plan(self) -> PhysicalPlan {
        self.imp.into_plan()
    }
}
