//! 优化器入口
//!
//! `Optimizer` 把计划构建、权限和表锁检查、物理计划搜索以及计划绑定组合成
//! 一个入口，与数据库实例同生命周期，可以被多个会话并发使用。
//!
//! ## 流程
//!
//! 1. 点查快速计划：命中时直接返回，必要时在后台预取时间戳
//! 2. 解析语句级提示，结束时无论成败都写回语句上下文
//! 3. 代价优化得到基准计划
//! 4. 启用绑定时按选择率桶查找绑定记录，依次尝试桶内 baseline 和规范化绑定
//! 5. 启用演进时提交待验证的候选绑定
//!
//! 套用绑定提示时只优化语句的副本，原语句不会被修改。

use crate::core::error::{HintWarning, OptimizeError, OptimizeResult};
use crate::core::schema::InfoSchema;
use crate::core::types::StoreType;
use crate::query::context::{Session, SessionVars};
use crate::query::optimizer::binding::{
    bucket_id, extract_select_and_normalize_digest, extract_selectivity, generate_bind_sql,
    record_bind_usage, BindRecord, BindScope, BindSource, BindStatus, BindType, Binding,
    GlobalBindHandle,
};
use crate::query::optimizer::hint::{
    bind_hint, contain_table_hint, gen_hints_from_physical_plan, handle_stmt_hints, StmtHints,
    HINT_READ_FROM_STORAGE,
};
use crate::query::optimizer::search::{CascadesSearch, DpSearch, PlanSearch};
use crate::query::optimizer::stats::StatisticsProvider;
use crate::query::parser::ast::{ExecuteStmt, SelectStmt, Stmt};
use crate::query::parser::hint::{restore_optimizer_hints, TableOptimizerHint};
use crate::query::planner::{
    check_privilege, BlockHintProcessor, BuiltPlan, DefaultTableLockChecker, ExecutePlan,
    FieldName, Plan, PlanBuilder, PointGetPlan, Privilege, PrivilegeChecker, TableLockChecker,
    VisitInfo,
};
use std::sync::Arc;

/// 一次代价优化的结果
struct Optimized {
    plan: Plan,
    names: Vec<FieldName>,
    cost: f64,
}

/// 语句级提示及其告警，优化结束时写回语句上下文
struct ResolvedHints {
    hints: StmtHints,
    warnings: Vec<HintWarning>,
}

impl ResolvedHints {
    fn resolve(hints: &[TableOptimizerHint]) -> Self {
        let (hints, warnings) = handle_stmt_hints(hints);
        Self { hints, warnings }
    }
}

/// 查到的绑定记录
struct BindLookup {
    record: Arc<BindRecord>,
    scope: BindScope,
    selectivity: f64,
}

#[derive(Debug)]
pub struct Optimizer {
    builder: Arc<dyn PlanBuilder>,
    stats: Arc<dyn StatisticsProvider>,
    privilege_checker: Option<Arc<dyn PrivilegeChecker>>,
    table_lock_checker: Arc<dyn TableLockChecker>,
    global_bindings: Arc<GlobalBindHandle>,
    dp: DpSearch,
    cascades: CascadesSearch,
}

impl Optimizer {
    pub fn new(builder: Arc<dyn PlanBuilder>, stats: Arc<dyn StatisticsProvider>) -> Self {
        Self {
            builder,
            stats,
            privilege_checker: None,
            table_lock_checker: Arc::new(DefaultTableLockChecker),
            global_bindings: Arc::new(GlobalBindHandle::new()),
            dp: DpSearch::new(),
            cascades: CascadesSearch::new(),
        }
    }

    /// 不设置时跳过权限检查
    pub fn with_privilege_checker(mut self, checker: Arc<dyn PrivilegeChecker>) -> Self {
        self.privilege_checker = Some(checker);
        self
    }

    pub fn with_table_lock_checker(mut self, checker: Arc<dyn TableLockChecker>) -> Self {
        self.table_lock_checker = checker;
        self
    }

    pub fn with_global_bindings(mut self, handle: Arc<GlobalBindHandle>) -> Self {
        self.global_bindings = handle;
        self
    }

    pub fn with_cascades(mut self, cascades: CascadesSearch) -> Self {
        self.cascades = cascades;
        self
    }

    pub fn global_bindings(&self) -> &Arc<GlobalBindHandle> {
        &self.global_bindings
    }

    /// 优化一条语句，返回计划和输出列名
    pub fn optimize(
        &self,
        session: &mut Session,
        stmt: &Stmt,
        is: &InfoSchema,
    ) -> OptimizeResult<(Plan, Vec<FieldName>)> {
        session.vars.reset_stmt_ctx();

        if session.vars.isolation_read_contains(StoreType::TiKV) {
            if let Some(fp) = self.builder.try_fast_plan(&mut session.vars, stmt, is) {
                self.check_point_get(&session.vars, is, &fp)?;
                if !use_max_ts(&session.vars, &fp) {
                    session.prepare_ts_future();
                }
                log::debug!("使用点查快速计划: {}", fp.explain());
                let names = fp.names.clone();
                return Ok((Plan::PointGet(fp), names));
            }
        }
        session.prepare_ts_future();

        let table_hints = stmt.table_hints().to_vec();
        let mut resolved = ResolvedHints::resolve(&table_hints);
        session.vars.stmt_ctx.stmt_hints = resolved.hints.clone();
        let result = self.optimize_with_bindings(session, stmt, is, &table_hints, &mut resolved);
        session.vars.stmt_ctx.stmt_hints = resolved.hints;
        session.vars.stmt_ctx.append_warnings(resolved.warnings);
        result
    }

    fn optimize_with_bindings(
        &self,
        session: &mut Session,
        stmt: &Stmt,
        is: &InfoSchema,
        table_hints: &[TableOptimizerHint],
        resolved: &mut ResolvedHints,
    ) -> OptimizeResult<(Plan, Vec<FieldName>)> {
        let best = self.cost_based_optimize(session, stmt, is)?;
        log::debug!("基准计划 {} 代价 {:.2}", best.plan.tp(), best.cost);
        let use_baselines = session.vars.use_plan_baselines;
        if !(use_baselines || session.vars.evolve_plan_baselines) {
            return Ok((best.plan, best.names));
        }
        let Some(BindLookup {
            record,
            scope,
            selectivity,
        }) = self.lookup_bind_record(session, stmt, is)
        else {
            return Ok((best.plan, best.names));
        };
        let bucket = bucket_id(selectivity, session.vars.spm_space_number);
        log::debug!(
            "命中 {} 绑定: {}, 选择率 {:.4}, 桶 {:?}",
            scope,
            record.original_sql,
            selectivity,
            bucket
        );

        let mut plan_hints = gen_hints_from_physical_plan(&best.plan);
        if let Some(normalized) = &record.normalized_binding {
            for hint in table_hints {
                if normalized.contain_table_hint(&hint.name) {
                    plan_hints.push(hint.clone());
                }
            }
        }
        let plan_hint = restore_optimizer_hints(&plan_hints);

        // 基准计划就是当前桶的 baseline
        let baseline = bucket.and_then(|b| record.find_baseline(b));
        if let Some(b) = baseline {
            if b.is_using() && b.id == format!("{}{}", plan_hint, b.bucket_id_suffix()) {
                if use_baselines {
                    *resolved = ResolvedHints::resolve(&b.hints);
                    session.vars.stmt_ctx.bind_sql_used = true;
                }
                return Ok((best.plan, best.names));
            }
        }

        let mut hinted_plan = None;
        if let Some(b) = baseline.filter(|b| b.is_using() && !b.fixed) {
            if let Some((plan, hints)) = self.try_binding(session, stmt, is, scope, &record, b) {
                if use_baselines {
                    *resolved = hints;
                }
                hinted_plan = Some(plan);
            }
        }
        if hinted_plan.is_none() {
            if let Some(b) = record
                .normalized_binding
                .as_ref()
                .filter(|b| b.is_using() && !b.fixed)
            {
                if let Some((plan, hints)) = self.try_binding(session, stmt, is, scope, &record, b) {
                    if use_baselines {
                        *resolved = hints;
                    }
                    hinted_plan = Some(plan);
                }
            }
        }

        let read_storage = contain_table_hint(table_hints, HINT_READ_FROM_STORAGE)
            || record
                .first_binding()
                .is_some_and(|b| b.contain_table_hint(HINT_READ_FROM_STORAGE));
        if session.vars.evolve_plan_baselines && !read_storage {
            match bucket {
                Some(bucket) => {
                    if let Err(e) = self.handle_evolve_tasks(&session.vars, &record, stmt, &plan_hint, bucket) {
                        log::warn!("提交演进任务失败: {}", e);
                    }
                }
                None => log::debug!("选择率未知, 不提交演进任务: {}", record.original_sql),
            }
        }

        match hinted_plan {
            Some(plan) if use_baselines => {
                session.vars.stmt_ctx.bind_sql_used = true;
                Ok((plan, best.names))
            }
            _ => Ok((best.plan, best.names)),
        }
    }

    /// 用绑定的提示重新优化语句副本，失败时把绑定标记为失效并排队删除
    fn try_binding(
        &self,
        session: &mut Session,
        stmt: &Stmt,
        is: &InfoSchema,
        scope: BindScope,
        record: &BindRecord,
        binding: &Binding,
    ) -> Option<(Plan, ResolvedHints)> {
        record_bind_usage(scope);
        let bound = bind_hint(stmt, &binding.hints);
        let hints = ResolvedHints::resolve(&binding.hints);
        session.vars.stmt_ctx.stmt_hints = hints.hints.clone();
        match self.cost_based_optimize(session, &bound, is) {
            Ok(optimized) => {
                log::debug!("绑定 {} 重新优化代价 {:.2}", binding.id, optimized.cost);
                Some((optimized.plan, hints))
            }
            Err(e) => {
                log::info!("绑定 {} 重新优化失败, 标记为失效: {}", binding.id, e);
                self.handle_invalid_binding(session, scope, record, binding);
                None
            }
        }
    }

    /// 标记失效并在原作用域排队删除，会话级绑定失效时全局也排队删除
    fn handle_invalid_binding(&self, session: &Session, scope: BindScope, record: &BindRecord, binding: &Binding) {
        let mut invalid = binding.clone();
        invalid.set_status(BindStatus::Invalid);
        let mut task = BindRecord::new(&record.original_sql, &record.db);
        match invalid.bind_type {
            BindType::Baseline => {
                task.baselines.insert(invalid.bucket_id, invalid);
            }
            BindType::Normalized => task.normalized_binding = Some(invalid),
        }

        let (sql, db) = (&record.original_sql, &record.db);
        match scope {
            BindScope::Session => {
                let handle = session.bind_handle();
                if !handle.set_binding_status(sql, db, &binding.id, BindStatus::Invalid) {
                    log::warn!("会话绑定已不存在, 无法标记失效: {}", binding.id);
                }
                handle.add_drop_invalid_bind_task(task.clone());
                self.global_bindings.add_drop_invalid_bind_task(task);
            }
            BindScope::Global => {
                self.global_bindings
                    .set_binding_status(sql, db, &binding.id, BindStatus::Invalid);
                self.global_bindings.add_drop_invalid_bind_task(task);
            }
        }
    }

    fn handle_evolve_tasks(
        &self,
        vars: &SessionVars,
        record: &BindRecord,
        stmt: &Stmt,
        plan_hint: &str,
        bucket: i64,
    ) -> OptimizeResult<()> {
        let bind_sql = generate_bind_sql(stmt, plan_hint);
        if bind_sql.is_empty() {
            return Ok(());
        }
        let binding = Binding::new(&bind_sql, BindType::Baseline, bucket)?
            .with_charset(&vars.charset, &vars.collation)
            .with_source(BindSource::Evolve);
        self.global_bindings
            .add_evolve_plan_task(&record.original_sql, &record.db, binding)?;
        Ok(())
    }

    /// 先查会话级再查全局，各自先按当前库再按空库查找
    ///
    /// 会话级记录存在但没有 Using 绑定时不再查全局。
    fn lookup_bind_record(&self, session: &Session, stmt: &Stmt, is: &InfoSchema) -> Option<BindLookup> {
        let (select, normalized, digest) = extract_select_and_normalize_digest(stmt)?;
        let db = session.vars.current_db.as_str();

        let handle = session.bind_handle();
        let session_record = handle
            .get_bind_record(&normalized, db)
            .or_else(|| handle.get_bind_record(&normalized, ""));
        if let Some(record) = session_record {
            if !record.has_using_binding() {
                return None;
            }
            return Some(BindLookup {
                record,
                scope: BindScope::Session,
                selectivity: self.selectivity(select, is, db),
            });
        }

        let record = self
            .global_bindings
            .get_bind_record(&digest, &normalized, db)
            .or_else(|| self.global_bindings.get_bind_record(&digest, &normalized, ""))?;
        Some(BindLookup {
            record,
            scope: BindScope::Global,
            selectivity: self.selectivity(select, is, db),
        })
    }

    fn selectivity(&self, select: &SelectStmt, is: &InfoSchema, current_db: &str) -> f64 {
        let mut resolved = select.clone();
        for source in resolved.from.iter_mut().filter(|s| s.table_info.is_none()) {
            let db = source.db.as_deref().unwrap_or(current_db);
            source.table_info = is.table_by_name(db, &source.name);
        }
        extract_selectivity(&resolved, self.stats.as_ref())
    }

    /// 只做代价优化并返回总代价，不读写语句级提示和绑定
    ///
    /// 演进验证器用它比较候选绑定和原计划。
    pub fn optimize_with_cost(
        &self,
        session: &mut Session,
        stmt: &Stmt,
        is: &InfoSchema,
    ) -> OptimizeResult<(Plan, Vec<FieldName>, f64)> {
        let optimized = self.cost_based_optimize(session, stmt, is)?;
        Ok((optimized.plan, optimized.names, optimized.cost))
    }

    /// 不经过提示和绑定的代价优化
    ///
    /// 每次调用都重置计划编号，重新优化不会沿用上一次的编号。
    fn cost_based_optimize(&self, session: &mut Session, stmt: &Stmt, is: &InfoSchema) -> OptimizeResult<Optimized> {
        session.vars.reset_plan_ids();
        let mut processor = BlockHintProcessor::new();
        processor.process(stmt);
        let out = self.builder.build(&mut session.vars, stmt, is, &mut processor)?;
        session.vars.stmt_ctx.tables = out.tables;

        self.check_visit_info(&session.vars, is, &out.visit_info)?;

        let (plan, cost) = self.finish_built_plan(session, out.plan, out.opt_flag, is)?;
        let names = match &plan {
            Plan::Execute(exec) => exec.names.clone(),
            _ => out.names,
        };
        Ok(Optimized { plan, names, cost })
    }

    /// 权限检查和表锁检查，未设置权限检查器时只检查表锁
    fn check_visit_info(&self, vars: &SessionVars, is: &InfoSchema, visit_info: &[VisitInfo]) -> OptimizeResult<()> {
        if let Some(checker) = &self.privilege_checker {
            check_privilege(checker.as_ref(), &vars.user, &vars.active_roles, visit_info)?;
        }
        self.table_lock_checker
            .check_table_lock(vars.connection_id, is, visit_info)
    }

    /// 点查不经过计划构建，按读表单独检查
    fn check_point_get(&self, vars: &SessionVars, is: &InfoSchema, fp: &PointGetPlan) -> OptimizeResult<()> {
        let visit = VisitInfo::new(Privilege::Select, &fp.db, &fp.table.name);
        self.check_visit_info(vars, is, std::slice::from_ref(&visit))
    }

    fn finish_built_plan(
        &self,
        session: &mut Session,
        built: BuiltPlan,
        opt_flag: u64,
        is: &InfoSchema,
    ) -> OptimizeResult<(Plan, f64)> {
        match built {
            BuiltPlan::Logical(logical) => {
                let search: &dyn PlanSearch = if session.vars.enable_cascades_planner() {
                    &self.cascades
                } else {
                    &self.dp
                };
                log::debug!("使用 {} 搜索物理计划", search.name());
                let (plan, cost) = search.find_best_plan(&mut session.vars, opt_flag, logical)?;
                Ok((Plan::Physical(plan), cost))
            }
            BuiltPlan::Explain { analyze, inner } => {
                let (target, cost) = self.finish_built_plan(session, *inner, opt_flag, is)?;
                Ok((
                    Plan::Explain {
                        analyze,
                        target: Box::new(target),
                    },
                    cost,
                ))
            }
            BuiltPlan::Execute(exec) => {
                let plan = self.optimize_prepared_plan(session, &exec, is)?;
                Ok((Plan::Execute(plan), 0.0))
            }
            BuiltPlan::Simple(simple) => Ok((Plan::Simple(simple), 0.0)),
        }
    }

    /// EXECUTE 的快捷路径，不经过提示和绑定
    pub fn optimize_exec_stmt(&self, session: &mut Session, exec: &ExecuteStmt, is: &InfoSchema) -> OptimizeResult<Plan> {
        session.vars.reset_plan_ids();
        let stmt = Stmt::Execute(exec.clone());
        let mut processor = BlockHintProcessor::new();
        let out = self.builder.build(&mut session.vars, &stmt, is, &mut processor)?;
        match out.plan {
            BuiltPlan::Execute(exec) => {
                let plan = self.optimize_prepared_plan(session, &exec, is)?;
                Ok(Plan::Execute(plan))
            }
            _ => Err(OptimizeError::InvalidExecutePlan(format!(
                "EXECUTE {} 没有构建出 Execute 计划",
                exec.name
            ))),
        }
    }

    /// 替换参数后优化预处理语句，能走点查时直接返回点查计划
    pub fn optimize_prepared_plan(
        &self,
        session: &mut Session,
        exec: &ExecuteStmt,
        is: &InfoSchema,
    ) -> OptimizeResult<ExecutePlan> {
        let prepared = session
            .prepared_stmt(&exec.name)
            .ok_or_else(|| OptimizeError::PreparedStmtNotFound(exec.name.clone()))?;
        let stmt = Stmt::Select(prepared.stmt.bind_params(&exec.params)?);

        let (plan, names) = match self.builder.try_fast_plan(&mut session.vars, &stmt, is) {
            Some(fp) => {
                self.check_point_get(&session.vars, is, &fp)?;
                let names = fp.names.clone();
                (Plan::PointGet(fp), names)
            }
            None => {
                let optimized = self.cost_based_optimize(session, &stmt, is)?;
                (optimized.plan, optimized.names)
            }
        };
        if !matches!(plan, Plan::Physical(_) | Plan::PointGet(_)) {
            return Err(OptimizeError::InvalidExecutePlan(plan.tp().to_string()));
        }
        Ok(ExecutePlan {
            name: exec.name.clone(),
            params: exec.params.clone(),
            plan: Some(Box::new(plan)),
            names,
        })
    }
}

/// 自动提交事务中按句柄点查时使用最大时间戳读，不需要预取时间戳
fn use_max_ts(vars: &SessionVars, plan: &PointGetPlan) -> bool {
    vars.is_autocommit_txn() && plan.index.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HintWarning;
    use crate::core::schema::{ColumnInfo, FieldKind, IndexInfo, TableInfo, TableLockInfo, TableLockType};
    use crate::core::types::{CompareOp, Datum};
    use crate::query::context::LocalOracle;
    use crate::query::optimizer::stats::{ColumnStatistics, Histogram, MemoryStatisticsProvider, TableStatistics};
    use crate::query::parser::ast::{Expr, TableSource};
    use crate::query::parser::normalize::normalize;
    use crate::query::planner::{DefaultPlanBuilder, Privilege, StaticPrivilegeChecker};

    const SQL: &str = "select * from t where a < 10";

    fn schema() -> InfoSchema {
        let t = TableInfo::new(1, "t")
            .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
            .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
            .with_column(ColumnInfo::new(3, "b", FieldKind::Int))
            .with_handle("id")
            .with_index(IndexInfo::new(1, "idx_a", &["a"]))
            .with_index(IndexInfo::new(2, "idx_b", &["b"]));
        InfoSchema::new(1).with_table("test", t)
    }

    fn optimizer() -> Optimizer {
        let hist = || {
            Histogram::new(100, 0)
                .append_bucket(Datum::Int(0), Datum::Int(49), 500.0, 10.0)
                .append_bucket(Datum::Int(50), Datum::Int(99), 500.0, 10.0)
        };
        let stats = Arc::new(MemoryStatisticsProvider::new());
        stats.update_table_stats(
            TableStatistics::new(1, 1000.0)
                .with_column(ColumnStatistics::new(2, FieldKind::Int, hist()))
                .with_column(ColumnStatistics::new(3, FieldKind::Int, hist())),
        );
        let builder = Arc::new(DefaultPlanBuilder::new(stats.clone()));
        Optimizer::new(builder, stats)
    }

    fn session() -> Session {
        let mut vars = SessionVars::default().with_current_db("test");
        vars.spm_space_number = 1;
        Session::new(vars, Arc::new(LocalOracle::new()))
    }

    fn select(text: &str, cond: Expr) -> Stmt {
        Stmt::Select(SelectStmt::new(text).from_table(TableSource::new("t")).filter(cond))
    }

    fn range_stmt() -> Stmt {
        select(SQL, Expr::compare(CompareOp::Lt, Expr::col("a"), Expr::lit(10)))
    }

    fn hint_of(plan: &Plan) -> String {
        restore_optimizer_hints(&gen_hints_from_physical_plan(plan))
    }

    fn binding(hint: &str, bind_type: BindType) -> Binding {
        Binding::new(&format!("select /*+ {} */ * from t where a < 10", hint), bind_type, 0)
            .unwrap()
            .with_status(BindStatus::Using)
    }

    #[test]
    fn test_point_get_skips_ts_prefetch() {
        let opt = optimizer();
        let mut s = session();
        let stmt = select("select * from t where id = 1", Expr::eq(Expr::col("id"), Expr::lit(1)));
        let (plan, names) = opt.optimize(&mut s, &stmt, &schema()).unwrap();
        assert!(matches!(plan, Plan::PointGet(_)));
        assert_eq!(names.len(), 3);
        assert!(!s.has_ts_future());

        s.vars.in_txn = true;
        opt.optimize(&mut s, &stmt, &schema()).unwrap();
        assert!(s.has_ts_future());
    }

    #[test]
    fn test_hint_warnings_are_attached() {
        let opt = optimizer();
        let mut s = session();
        let stmt = select(
            "select /*+ memory_quota(10 MB) memory_quota(20 MB) */ * from t where a < 10",
            Expr::compare(CompareOp::Lt, Expr::col("a"), Expr::lit(10)),
        );
        opt.optimize(&mut s, &stmt, &schema()).unwrap();
        let ctx = &s.vars.stmt_ctx;
        assert!(ctx.warnings.iter().any(|w| matches!(w, HintWarning::Duplicated { .. })));
        assert_eq!(ctx.stmt_hints.mem_quota_query, 20 * 1024 * 1024);
    }

    #[test]
    fn test_reoptimize_is_stable() {
        let opt = optimizer();
        let mut s = session();
        let (first, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        let (second, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(first.explain(), second.explain());
        assert!(!s.vars.stmt_ctx.bind_sql_used);
    }

    #[test]
    fn test_global_baseline_overrides_cost_choice() {
        let opt = optimizer();
        let mut s = session();
        let (best, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert!(!hint_of(&best).contains("idx_b"));

        opt.global_bindings().create_bind_record(
            BindRecord::new(&normalize(SQL), "test").with_baseline(binding("use_index(t idx_b)", BindType::Baseline)),
        );
        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(hint_of(&plan), "use_index(test.t idx_b)");
        assert!(s.vars.stmt_ctx.bind_sql_used);

        // 关闭绑定后回到代价最优的计划
        s.vars.use_plan_baselines = false;
        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(hint_of(&plan), hint_of(&best));
        assert!(!s.vars.stmt_ctx.bind_sql_used);
    }

    #[test]
    fn test_matching_baseline_short_circuits() {
        let opt = optimizer();
        let mut s = session();
        s.vars.evolve_plan_baselines = true;
        let (best, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        let hint = hint_of(&best);

        opt.global_bindings()
            .create_bind_record(BindRecord::new(&normalize(SQL), "test").with_baseline(binding(&hint, BindType::Baseline)));
        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(hint_of(&plan), hint);
        assert!(s.vars.stmt_ctx.bind_sql_used);
        assert_eq!(opt.global_bindings().pending_evolve_tasks(), 0);
    }

    #[test]
    fn test_invalid_session_binding_is_queued_in_both_scopes() {
        let opt = optimizer();
        let mut s = session();
        let normalized = normalize(SQL);
        s.bind_handle().create_bind_record(
            BindRecord::new(&normalized, "test")
                .with_normalized_binding(binding("use_index(t idx_missing)", BindType::Normalized)),
        );

        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert!(!hint_of(&plan).contains("idx_missing"));
        assert!(!s.vars.stmt_ctx.bind_sql_used);

        let record = s.bind_handle().get_bind_record(&normalized, "test").unwrap();
        assert_eq!(
            record.normalized_binding.as_ref().map(|b| b.status),
            Some(BindStatus::Invalid)
        );
        assert_eq!(s.bind_handle().pending_invalid_tasks().len(), 1);
        assert_eq!(opt.global_bindings().pending_invalid_tasks().len(), 1);
    }

    #[test]
    fn test_invalid_baseline_falls_back_to_normalized_binding() {
        let opt = optimizer();
        let mut s = session();
        let normalized = normalize(SQL);
        opt.global_bindings().create_bind_record(
            BindRecord::new(&normalized, "test")
                .with_baseline(binding("use_index(t idx_gone)", BindType::Baseline))
                .with_normalized_binding(binding("use_index(t idx_b)", BindType::Normalized)),
        );

        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(hint_of(&plan), "use_index(test.t idx_b)");
        assert!(s.vars.stmt_ctx.bind_sql_used);

        let digest = crate::query::parser::normalize::digest_normalized(&normalized);
        let record = opt
            .global_bindings()
            .get_bind_record(&digest, &normalized, "test")
            .unwrap();
        assert_eq!(record.find_baseline(0).map(|b| b.status), Some(BindStatus::Invalid));
        assert_eq!(
            record.normalized_binding.as_ref().map(|b| b.status),
            Some(BindStatus::Using)
        );
        let tasks = opt.global_bindings().pending_invalid_tasks();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].normalized_binding.is_none());
        assert!(s.bind_handle().pending_invalid_tasks().is_empty());
    }

    #[test]
    fn test_unusable_session_record_hides_global() {
        let opt = optimizer();
        let mut s = session();
        let normalized = normalize(SQL);
        s.bind_handle().create_bind_record(
            BindRecord::new(&normalized, "test").with_normalized_binding(
                binding("use_index(t idx_a)", BindType::Normalized).with_status(BindStatus::Invalid),
            ),
        );
        opt.global_bindings().create_bind_record(
            BindRecord::new(&normalized, "test").with_baseline(binding("use_index(t idx_b)", BindType::Baseline)),
        );
        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert!(!hint_of(&plan).contains("idx_b"));
        assert!(!s.vars.stmt_ctx.bind_sql_used);
    }

    #[test]
    fn test_evolve_submits_candidate() {
        let opt = optimizer();
        let mut s = session();
        s.vars.use_plan_baselines = false;
        s.vars.evolve_plan_baselines = true;
        opt.global_bindings().create_bind_record(
            BindRecord::new(&normalize(SQL), "test").with_baseline(binding("use_index(t idx_b)", BindType::Baseline)),
        );

        let (plan, _) = opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert!(!hint_of(&plan).contains("idx_b"));
        assert!(!s.vars.stmt_ctx.bind_sql_used);

        // 相同候选只提交一次
        opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        let tasks = opt.global_bindings().take_evolve_tasks();
        assert_eq!(tasks.len(), 1);
        let candidate = &tasks[0].binding;
        assert_eq!(candidate.status, BindStatus::PendingVerify);
        assert_eq!(candidate.source, BindSource::Evolve);
        assert_eq!(candidate.bucket_id, 0);
        assert_eq!(candidate.id, format!("{}_0", hint_of(&plan)));
        assert!(candidate.bind_sql.starts_with(&format!("select /*+ {} */", hint_of(&plan))));
    }

    #[test]
    fn test_read_from_storage_disables_evolve() {
        let opt = optimizer();
        let mut s = session();
        s.vars.evolve_plan_baselines = true;
        opt.global_bindings().create_bind_record(
            BindRecord::new(&normalize(SQL), "test")
                .with_baseline(binding("read_from_storage(tikv[t])", BindType::Baseline)),
        );
        opt.optimize(&mut s, &range_stmt(), &schema()).unwrap();
        assert_eq!(opt.global_bindings().pending_evolve_tasks(), 0);
    }

    #[test]
    fn test_privilege_denied() {
        let checker = Arc::new(StaticPrivilegeChecker::new());
        let opt = optimizer().with_privilege_checker(checker.clone());
        let mut s = session();
        s.vars.user = "u1".to_string();
        assert!(matches!(
            opt.optimize(&mut s, &range_stmt(), &schema()),
            Err(OptimizeError::PrivilegeDenied { .. })
        ));

        checker.grant("u1", "test", "t", Privilege::Select);
        assert!(opt.optimize(&mut s, &range_stmt(), &schema()).is_ok());
    }

    fn point_get_stmt() -> Stmt {
        select("select * from t where id = 1", Expr::eq(Expr::col("id"), Expr::lit(1)))
    }

    #[test]
    fn test_point_get_checks_privilege() {
        let checker = Arc::new(StaticPrivilegeChecker::new());
        let opt = optimizer().with_privilege_checker(checker.clone());
        let mut s = session();
        s.vars.user = "u1".to_string();
        assert!(matches!(
            opt.optimize(&mut s, &point_get_stmt(), &schema()),
            Err(OptimizeError::PrivilegeDenied { .. })
        ));
        // 拒绝时不预取时间戳
        assert!(!s.has_ts_future());

        let prepared = SelectStmt::new("select * from t where id = ?")
            .from_table(TableSource::new("t"))
            .filter(Expr::eq(Expr::col("id"), Expr::Param(0)));
        s.prepare("pg", Stmt::Select(prepared)).unwrap();
        let exec = ExecuteStmt::new("pg", vec![Datum::Int(1)]);
        assert!(matches!(
            opt.optimize_exec_stmt(&mut s, &exec, &schema()),
            Err(OptimizeError::PrivilegeDenied { .. })
        ));

        checker.grant("u1", "test", "t", Privilege::Select);
        let (plan, _) = opt.optimize(&mut s, &point_get_stmt(), &schema()).unwrap();
        assert!(matches!(plan, Plan::PointGet(_)));
        match opt.optimize_exec_stmt(&mut s, &exec, &schema()).unwrap() {
            Plan::Execute(exec) => assert!(matches!(exec.plan.as_deref(), Some(Plan::PointGet(_)))),
            other => panic!("应为 Execute 计划: {:?}", other),
        }
    }

    #[test]
    fn test_point_get_checks_table_lock() {
        let locked = {
            let is = schema();
            let t = (*is.table_by_name("test", "t").unwrap())
                .clone()
                .with_lock(TableLockInfo {
                    tp: TableLockType::Write,
                    session_id: 999,
                });
            InfoSchema::new(2).with_table("test", t)
        };
        let opt = optimizer();
        let mut s = session();
        s.vars.connection_id = 1;
        assert!(matches!(
            opt.optimize(&mut s, &point_get_stmt(), &locked),
            Err(OptimizeError::TableLocked(_))
        ));
        assert!(matches!(
            opt.optimize(&mut s, &range_stmt(), &locked),
            Err(OptimizeError::TableLocked(_))
        ));

        s.vars.connection_id = 999;
        let (plan, _) = opt.optimize(&mut s, &point_get_stmt(), &locked).unwrap();
        assert!(matches!(plan, Plan::PointGet(_)));
    }

    #[test]
    fn test_execute_prepared_statement() {
        let opt = optimizer();
        let mut s = session();
        let prepared = SelectStmt::new("select * from t where a = ?")
            .from_table(TableSource::new("t"))
            .filter(Expr::eq(Expr::col("a"), Expr::Param(0)));
        s.prepare("s1", Stmt::Select(prepared)).unwrap();

        let plan = opt
            .optimize_exec_stmt(&mut s, &ExecuteStmt::new("s1", vec![Datum::Int(5)]), &schema())
            .unwrap();
        match plan {
            Plan::Execute(exec) => {
                assert_eq!(exec.params, vec![Datum::Int(5)]);
                assert!(matches!(exec.plan.as_deref(), Some(Plan::Physical(_))));
                assert_eq!(exec.names.len(), 3);
            }
            other => panic!("应为 Execute 计划: {:?}", other),
        }

        assert!(matches!(
            opt.optimize_exec_stmt(&mut s, &ExecuteStmt::new("s2", vec![]), &schema()),
            Err(OptimizeError::PreparedStmtNotFound(_))
        ));
        assert!(matches!(
            opt.optimize_exec_stmt(&mut s, &ExecuteStmt::new("s1", vec![]), &schema()),
            Err(OptimizeError::WrongParamCount { .. })
        ));
    }
}
