//! 集成测试共享工具模块
//!
//! 提供 schema 快照、统计信息和优化器的测试夹具，供所有集成测试使用

#![allow(dead_code)]

use sqlopt::core::schema::{ColumnInfo, FieldKind, IndexInfo, InfoSchema, TableInfo};
use sqlopt::core::types::{CompareOp, Datum};
use sqlopt::query::context::{LocalOracle, Session, SessionVars};
use sqlopt::query::optimizer::hint::gen_hints_from_physical_plan;
use sqlopt::query::optimizer::{
    ColumnStatistics, Histogram, MemoryStatisticsProvider, Optimizer, TableStatistics,
};
use sqlopt::query::parser::{restore_optimizer_hints, Expr, SelectStmt, Stmt, TableSource};
use sqlopt::query::planner::{DefaultPlanBuilder, Plan};
use std::sync::Arc;

/// t 的行数
pub const T_ROWS: f64 = 10000.0;

/// 测试库 test
///
/// - t(id, a, b, c)：id 为行句柄，a、b 上有普通索引，c 上有唯一索引，有 TiFlash 副本
/// - s(id, a)：id 为行句柄，没有二级索引
pub fn schema() -> InfoSchema {
    let t = TableInfo::new(1, "t")
        .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
        .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
        .with_column(ColumnInfo::new(3, "b", FieldKind::Int))
        .with_column(ColumnInfo::new(4, "c", FieldKind::Int))
        .with_handle("id")
        .with_index(IndexInfo::new(1, "idx_a", &["a"]))
        .with_index(IndexInfo::new(2, "idx_b", &["b"]))
        .with_index(IndexInfo::new(3, "uk_c", &["c"]).unique())
        .with_tiflash_replica();
    let s = TableInfo::new(2, "s")
        .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
        .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
        .with_handle("id");
    InfoSchema::new(1).with_table("test", t).with_table("test", s)
}

/// [0, 999] 上均匀分布的直方图，每桶 100 个值
fn uniform(rows: f64) -> Histogram {
    let per_bucket = rows / 10.0;
    (0..10).fold(Histogram::new(1000, 0), |hist, i| {
        hist.append_bucket(
            Datum::Int(i * 100),
            Datum::Int(i * 100 + 99),
            per_bucket,
            per_bucket / 100.0,
        )
    })
}

pub fn stats() -> Arc<MemoryStatisticsProvider> {
    let provider = Arc::new(MemoryStatisticsProvider::new());
    provider.update_table_stats(
        TableStatistics::new(1, T_ROWS)
            .with_column(ColumnStatistics::new(1, FieldKind::Int, uniform(T_ROWS)))
            .with_column(ColumnStatistics::new(2, FieldKind::Int, uniform(T_ROWS)))
            .with_column(ColumnStatistics::new(3, FieldKind::Int, uniform(T_ROWS)))
            .with_column(ColumnStatistics::new(4, FieldKind::Int, uniform(T_ROWS))),
    );
    provider.update_table_stats(
        TableStatistics::new(2, 1000.0)
            .with_column(ColumnStatistics::new(1, FieldKind::Int, uniform(1000.0)))
            .with_column(ColumnStatistics::new(2, FieldKind::Int, uniform(1000.0))),
    );
    provider
}

pub fn optimizer() -> Optimizer {
    let stats = stats();
    let builder = Arc::new(DefaultPlanBuilder::new(stats.clone()));
    Optimizer::new(builder, stats)
}

pub fn session() -> Session {
    Session::new(
        SessionVars::default().with_current_db("test"),
        Arc::new(LocalOracle::new()),
    )
}

/// 单表 SELECT *，条件按合取项传入
pub fn select_t(text: &str, conds: Vec<Expr>) -> Stmt {
    let mut select = SelectStmt::new(text).from_table(TableSource::new("t"));
    for cond in conds {
        select = select.filter(cond);
    }
    Stmt::Select(select)
}

pub fn lt(col: &str, value: i64) -> Expr {
    Expr::compare(CompareOp::Lt, Expr::col(col), Expr::lit(value))
}

pub fn gt(col: &str, value: i64) -> Expr {
    Expr::compare(CompareOp::Gt, Expr::col(col), Expr::lit(value))
}

/// 计划的提示签名
pub fn hint_of(plan: &Plan) -> String {
    restore_optimizer_hints(&gen_hints_from_physical_plan(plan))
}
