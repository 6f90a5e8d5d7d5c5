//! 优化器集成测试
//!
//! 测试范围:
//! - 点查快速计划与时间戳预取
//! - 代价优化选择访问路径
//! - 提示签名回放后的代价一致性
//! - 连接、EXPLAIN、简单语句
//! - 表锁与未知表错误

mod common;

use common::{gt, hint_of, lt, optimizer, schema, select_t, session};
use sqlopt::config::OptimizerConfig;
use sqlopt::core::error::OptimizeError;
use sqlopt::core::schema::{InfoSchema, TableLockInfo, TableLockType};
use sqlopt::core::types::StoreType;
use sqlopt::query::context::{LocalOracle, Session, SessionVars};
use sqlopt::query::optimizer::hint::{bind_hint, gen_hints_from_physical_plan};
use sqlopt::query::parser::{Expr, ExplainStmt, SelectStmt, SimpleStmt, Stmt, TableSource};
use sqlopt::query::planner::Plan;
use std::sync::Arc;

#[test]
fn test_point_get_on_unique_index_prefetches_ts() {
    let opt = optimizer();
    let mut s = session();
    let stmt = select_t("select * from t where c = 7", vec![Expr::eq(Expr::col("c"), Expr::lit(7))]);
    let (plan, names) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    match plan {
        Plan::PointGet(p) => assert_eq!(p.index.map(|i| i.name), Some("uk_c".to_string())),
        other => panic!("应为点查计划: {:?}", other.explain()),
    }
    assert_eq!(names.len(), 4);
    // 按唯一索引点查需要一致性时间戳
    assert!(s.has_ts_future());
    assert!(s.txn_ts().expect("获取时间戳失败") > 0);
}

#[test]
fn test_point_get_not_used_without_tikv() {
    let opt = optimizer();
    let mut s = session();
    s.vars.isolation_read_engines = vec![StoreType::TiFlash];
    let stmt = select_t("select * from t where id = 7", vec![Expr::eq(Expr::col("id"), Expr::lit(7))]);
    let (plan, _) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert!(matches!(plan, Plan::Physical(_)));
    assert!(s.has_ts_future());
}

#[test]
fn test_selective_predicate_uses_index() {
    let opt = optimizer();
    let mut s = session();
    s.vars.isolation_read_engines = vec![StoreType::TiKV];
    let stmt = select_t("select * from t where a < 10", vec![lt("a", 10)]);
    let (plan, _) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert_eq!(hint_of(&plan), "use_index(test.t idx_a)");
    assert_eq!(s.vars.stmt_ctx.tables.len(), 1);
}

#[test]
fn test_hint_signature_round_trip_keeps_cost() {
    let opt = optimizer();
    let mut s = session();
    let is = schema();
    let stmt = select_t("select * from t where a < 10 and b > 500", vec![lt("a", 10), gt("b", 500)]);

    let (plan, _, cost) = opt.optimize_with_cost(&mut s, &stmt, &is).expect("优化失败");
    let hints = gen_hints_from_physical_plan(&plan);
    assert!(!hints.is_empty());

    let hinted = bind_hint(&stmt, &hints);
    let (replayed, _, replayed_cost) = opt.optimize_with_cost(&mut s, &hinted, &is).expect("优化失败");
    assert_eq!(cost, replayed_cost);
    assert_eq!(plan.explain(), replayed.explain());
    // 原语句不受影响
    assert!(stmt.table_hints().is_empty());
}

#[test]
fn test_read_from_storage_hint() {
    let opt = optimizer();
    let mut s = session();
    let stmt = select_t(
        "select /*+ read_from_storage(tiflash[t]) */ * from t where a < 10",
        vec![lt("a", 10)],
    );
    let (plan, _) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert_eq!(hint_of(&plan), "read_from_storage(tiflash[test.t])");
}

#[test]
fn test_cascades_hint_switches_search() {
    let opt = optimizer();
    let mut s = session();
    let stmt = select_t(
        "select /*+ use_cascades(true) */ * from t where a < 10",
        vec![lt("a", 10)],
    );
    let (plan, names) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert!(matches!(plan, Plan::Physical(_)));
    assert_eq!(names.len(), 4);
    assert!(s.vars.enable_cascades_planner());
}

#[test]
fn test_two_table_join() {
    let opt = optimizer();
    let mut s = session();
    let stmt = Stmt::Select(
        SelectStmt::new("select * from t, s where t.id = s.id")
            .from_table(TableSource::new("t"))
            .from_table(TableSource::new("s"))
            .filter(Expr::eq(Expr::col("t.id"), Expr::col("s.id"))),
    );
    let (plan, names) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert_eq!(names.len(), 6);
    assert!(plan.explain().iter().any(|line| line.contains("HashJoin")));
    assert_eq!(s.vars.stmt_ctx.tables.len(), 2);
}

#[test]
fn test_join_cost_same_under_both_searches() {
    let opt = optimizer();
    let is = schema();
    let join = |text: &str, extra: Option<Expr>| {
        let mut select = SelectStmt::new(text)
            .from_table(TableSource::new("t"))
            .from_table(TableSource::new("s"))
            .filter(Expr::eq(Expr::col("t.id"), Expr::col("s.id")));
        if let Some(cond) = extra {
            select = select.filter(cond);
        }
        Stmt::Select(select)
    };
    let stmts = [
        join("select * from t, s where t.id = s.id", None),
        join(
            "select * from t, s where t.id = s.id and t.a < 10",
            Some(lt("t.a", 10)),
        ),
    ];
    for stmt in &stmts {
        let mut dp = session();
        let (dp_plan, _, dp_cost) = opt.optimize_with_cost(&mut dp, stmt, &is).expect("优化失败");

        let mut cascades = session();
        cascades.vars.enable_cascades_planner = true;
        let (plan, _, cost) = opt.optimize_with_cost(&mut cascades, stmt, &is).expect("优化失败");

        assert!((cost - dp_cost).abs() < 1e-6, "cascades {} dp {}", cost, dp_cost);
        assert_eq!(hint_of(&plan), hint_of(&dp_plan));
        assert!(plan.explain().iter().any(|line| line.contains("HashJoin")));
    }
}

#[test]
fn test_explain_wraps_target() {
    let opt = optimizer();
    let mut s = session();
    let inner = select_t("select * from t where a < 10", vec![lt("a", 10)]);
    let stmt = Stmt::Explain(ExplainStmt::new(true, inner));
    let (plan, _) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    match plan {
        Plan::Explain { analyze, target } => {
            assert!(analyze);
            assert!(matches!(*target, Plan::Physical(_)));
        }
        other => panic!("应为 Explain 计划: {:?}", other.explain()),
    }
}

#[test]
fn test_simple_statement_passes_through() {
    let opt = optimizer();
    let mut s = session();
    let stmt = Stmt::Simple(SimpleStmt::new("set @@autocommit = 0"));
    let (plan, names) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert!(matches!(plan, Plan::Simple(_)));
    assert!(names.is_empty());
}

#[test]
fn test_table_locked_by_other_session() {
    let locked = {
        let is = schema();
        let mut t = (*is.table_by_name("test", "t").expect("表不存在")).clone();
        t.lock = Some(TableLockInfo {
            tp: TableLockType::Write,
            session_id: 99,
        });
        InfoSchema::new(2).with_table("test", t)
    };
    let opt = optimizer();
    let mut s = session();
    s.vars.connection_id = 1;
    let stmt = select_t("select * from t where a < 10", vec![lt("a", 10)]);
    assert!(matches!(
        opt.optimize(&mut s, &stmt, &locked),
        Err(OptimizeError::TableLocked(_))
    ));

    s.vars.connection_id = 99;
    assert!(opt.optimize(&mut s, &stmt, &locked).is_ok());
}

#[test]
fn test_unknown_table() {
    let opt = optimizer();
    let mut s = session();
    let stmt = Stmt::Select(SelectStmt::new("select * from nope").from_table(TableSource::new("nope")));
    assert!(matches!(
        opt.optimize(&mut s, &stmt, &schema()),
        Err(OptimizeError::UnknownTable { .. })
    ));
}

#[test]
fn test_session_vars_from_config() {
    let config = OptimizerConfig {
        spm_space_number: 4,
        enable_cascades_planner: true,
        isolation_read_engines: vec![StoreType::TiKV],
        ..OptimizerConfig::default()
    };
    let vars = SessionVars::from_config(&config).with_current_db("test");
    let mut s = Session::new(vars, Arc::new(LocalOracle::new()));
    assert_eq!(s.vars.spm_space_number, 4);

    let opt = optimizer();
    let stmt = select_t("select * from t where a < 10", vec![lt("a", 10)]);
    let (plan, _) = opt.optimize(&mut s, &stmt, &schema()).expect("优化失败");
    assert!(!hint_of(&plan).contains("tiflash"));
}
