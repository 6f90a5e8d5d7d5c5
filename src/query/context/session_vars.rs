//! 会话变量
//!
//! 新会话从 `OptimizerConfig` 取初始值，之后可按会话单独修改。
//! 一次优化过程中只读取，不修改代价因子。

use super::stmt_ctx::StmtContext;
use crate::config::OptimizerConfig;
use crate::core::types::StoreType;
use crate::query::optimizer::cost::CostFactors;

#[derive(Debug, Clone)]
pub struct SessionVars {
    pub connection_id: u64,
    pub current_db: String,
    pub user: String,
    pub active_roles: Vec<String>,
    pub charset: String,
    pub collation: String,
    pub cost_factors: CostFactors,
    /// 选择率分桶数
    pub spm_space_number: i64,
    pub use_plan_baselines: bool,
    pub evolve_plan_baselines: bool,
    pub enable_cascades_planner: bool,
    pub isolation_read_engines: Vec<StoreType>,
    pub autocommit: bool,
    /// 处于显式事务中
    pub in_txn: bool,
    pub stmt_ctx: StmtContext,
    plan_id: i64,
    plan_column_id: i64,
}

impl Default for SessionVars {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl SessionVars {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            connection_id: 0,
            current_db: String::new(),
            user: String::new(),
            active_roles: Vec::new(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_bin".to_string(),
            cost_factors: config.cost,
            spm_space_number: config.spm_space_number.max(1),
            use_plan_baselines: config.use_plan_baselines,
            evolve_plan_baselines: config.evolve_plan_baselines,
            enable_cascades_planner: config.enable_cascades_planner,
            isolation_read_engines: config.isolation_read_engines.clone(),
            autocommit: true,
            in_txn: false,
            stmt_ctx: StmtContext::new(),
            plan_id: 0,
            plan_column_id: 0,
        }
    }

    pub fn with_connection_id(mut self, id: u64) -> Self {
        self.connection_id = id;
        self
    }

    pub fn with_current_db(mut self, db: &str) -> Self {
        self.current_db = db.to_lowercase();
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_string();
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.active_roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_cost_factors(mut self, factors: CostFactors) -> Self {
        self.cost_factors = factors;
        self
    }

    pub fn with_isolation_read_engines(mut self, engines: &[StoreType]) -> Self {
        self.isolation_read_engines = engines.to_vec();
        self
    }

    /// 分配计划节点 id
    pub fn alloc_plan_id(&mut self) -> i64 {
        self.plan_id += 1;
        self.plan_id
    }

    /// 分配计划列 id
    pub fn alloc_column_id(&mut self) -> i64 {
        self.plan_column_id += 1;
        self.plan_column_id
    }

    /// 每次优化前重置，重新优化不会沿用上一次的编号
    pub fn reset_plan_ids(&mut self) {
        self.plan_id = 0;
        self.plan_column_id = 0;
    }

    /// 开始新语句
    pub fn reset_stmt_ctx(&mut self) {
        self.stmt_ctx = StmtContext::new();
    }

    /// 自动提交且不在显式事务中
    pub fn is_autocommit_txn(&self) -> bool {
        self.autocommit && !self.in_txn
    }

    pub fn isolation_read_contains(&self, store: StoreType) -> bool {
        self.isolation_read_engines.contains(&store)
    }

    /// 语句级提示优先于会话开关
    pub fn enable_cascades_planner(&self) -> bool {
        let hints = &self.stmt_ctx.stmt_hints;
        if hints.has_enable_cascades_planner_hint {
            return hints.enable_cascades_planner;
        }
        self.enable_cascades_planner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_and_reset() {
        let mut vars = SessionVars::default();
        assert_eq!(vars.alloc_plan_id(), 1);
        assert_eq!(vars.alloc_plan_id(), 2);
        assert_eq!(vars.alloc_column_id(), 1);
        vars.reset_plan_ids();
        assert_eq!(vars.alloc_plan_id(), 1);
        assert_eq!(vars.alloc_column_id(), 1);
    }

    #[test]
    fn test_cascades_hint_overrides_session() {
        let mut vars = SessionVars::default();
        assert!(!vars.enable_cascades_planner());
        vars.stmt_ctx.stmt_hints.has_enable_cascades_planner_hint = true;
        vars.stmt_ctx.stmt_hints.enable_cascades_planner = true;
        assert!(vars.enable_cascades_planner());
    }

    #[test]
    fn test_autocommit_txn() {
        let mut vars = SessionVars::default();
        assert!(vars.is_autocommit_txn());
        vars.in_txn = true;
        assert!(!vars.is_autocommit_txn());
    }
}
