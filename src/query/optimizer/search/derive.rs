//! 统计信息推导
//!
//! 自底向上估算每个逻辑算子的输出行数，并为数据源的每条访问路径计算扫描区间、
//! 过滤条件的归属和扫描行数。估算只会退化不会失败。

use super::rules::{side_of, Side};
use crate::core::types::Range;
use crate::query::parser::ast::Expr;
use crate::query::planner::access_path::{column_belongs, detach_column_ranges};
use crate::query::planner::{AccessPath, DataSource, LogicalOp, LogicalPlan};
use std::collections::BTreeSet;

/// 无法用统计信息估算的条件的默认选择率
pub const SELECTION_FACTOR: f64 = 0.8;

/// 自底向上推导整棵树的行数
pub fn derive_stats(plan: &mut LogicalPlan) {
    let row_count = match &mut plan.op {
        LogicalOp::DataSource(ds) => derive_data_source(ds),
        LogicalOp::Selection { conditions, child } => {
            derive_stats(child);
            match &child.op {
                LogicalOp::DataSource(ds) => filtered_row_count(Some(ds), child.row_count, conditions),
                LogicalOp::Join {
                    conditions: join_conds,
                    left,
                    right,
                } => selection_over_join_row_count(conditions, join_conds, &**left, &**right),
                _ => filtered_row_count(None, child.row_count, conditions),
            }
        }
        LogicalOp::Projection { child, .. } | LogicalOp::Sort { child, .. } => {
            derive_stats(child);
            child.row_count
        }
        LogicalOp::Limit { count, child, .. } => {
            derive_stats(child);
            child.row_count.min(*count as f64)
        }
        LogicalOp::Join {
            conditions,
            left,
            right,
        } => {
            derive_stats(left);
            derive_stats(right);
            join_row_count(conditions, left.row_count, right.row_count)
        }
        LogicalOp::TableDual { row_count } => *row_count as f64,
    };
    plan.row_count = row_count;
}

/// 输入加上一组过滤条件后的行数，输入是数据源时按统计信息估算
pub fn filtered_row_count(source: Option<&DataSource>, rows: f64, conds: &[Expr]) -> f64 {
    if conds.is_empty() {
        return rows;
    }
    match source {
        Some(ds) => rows * conds_selectivity(ds, conds),
        None => rows * SELECTION_FACTOR.powi(conds.len() as i32),
    }
}

/// 连接之上的条件按下推后的形态估算：单侧条件过滤对应输入，跨两侧的条件并入连接条件
///
/// 下推前后是同一个结果集，两种形态的行数必须一致。
fn selection_over_join_row_count(
    conds: &[Expr],
    join_conds: &[Expr],
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> f64 {
    let mut on = join_conds.to_vec();
    let mut left_conds = Vec::new();
    let mut right_conds = Vec::new();
    for cond in conds {
        match side_of(cond, left, right) {
            Side::Left => left_conds.push(cond.clone()),
            Side::Right => right_conds.push(cond.clone()),
            Side::Both => on.push(cond.clone()),
        }
    }
    let side_rows = |plan: &LogicalPlan, conds: &[Expr]| {
        let source = match &plan.op {
            LogicalOp::DataSource(ds) => Some(ds),
            _ => None,
        };
        filtered_row_count(source, plan.row_count, conds)
    };
    join_row_count(
        &on,
        side_rows(left, &left_conds),
        side_rows(right, &right_conds),
    )
}

/// 连接输出行数：有列等值条件时按键连接估算，否则为笛卡尔积
pub fn join_row_count(conditions: &[Expr], left: f64, right: f64) -> f64 {
    let has_equal_key = conditions.iter().any(|c| match c {
        Expr::Compare { op, left, right } => {
            *op == crate::core::types::CompareOp::Eq
                && matches!(left.as_ref(), Expr::Column(_))
                && matches!(right.as_ref(), Expr::Column(_))
        }
        _ => false,
    });
    if has_equal_key {
        left.max(right)
    } else {
        left * right * SELECTION_FACTOR.powi(conditions.len() as i32)
    }
}

/// 填充数据源的访问路径并返回输出行数
pub fn derive_data_source(ds: &mut DataSource) -> f64 {
    let total = ds.stats.count.max(0.0);
    let row_count = total * conds_selectivity(ds, &ds.pushed_conds);
    let mut paths = std::mem::take(&mut ds.possible_paths);
    for path in &mut paths {
        fill_path(ds, path, total);
        // 访问条件之外还有过滤时，扫描行数不应少于最终行数
        if path.count_after_access < row_count {
            path.count_after_access = (row_count / SELECTION_FACTOR).min(total);
        }
    }
    ds.possible_paths = paths;
    log::debug!(
        "数据源 {} 估算行数 {:.2}, 访问路径 {} 条",
        ds.as_name,
        row_count,
        ds.possible_paths.len()
    );
    row_count
}

/// 一组条件在数据源上的选择率
///
/// 同一列上的比较合并为一个区间后按统计信息估算，其余条件按默认选择率计算。
pub fn conds_selectivity(ds: &DataSource, conds: &[Expr]) -> f64 {
    let total = ds.stats.count;
    if total <= 0.0 {
        return 1.0;
    }
    let mut columns = BTreeSet::new();
    let mut others = 0;
    for cond in conds {
        match cond.as_column_compare() {
            Some((col, _, _)) if column_belongs(col, &ds.as_name, &ds.table) => {
                columns.insert(col.name.to_lowercase());
            }
            _ => others += 1,
        }
    }
    let mut selectivity = SELECTION_FACTOR.powi(others);
    for name in &columns {
        let (ranges, _, _) = detach_column_ranges(conds, name, &ds.as_name, &ds.table);
        let rows = column_rows(ds, name, &ranges, total);
        selectivity *= (rows / total).clamp(0.0, 1.0);
    }
    selectivity
}

fn column_rows(ds: &DataSource, name: &str, ranges: &[Range], total: f64) -> f64 {
    if ranges.is_empty() {
        return 0.0;
    }
    let col = match ds.table.find_column(name) {
        Some(c) => c,
        None => return total,
    };
    let is_handle = ds
        .table
        .handle_col
        .as_deref()
        .is_some_and(|h| h.eq_ignore_ascii_case(name));
    match ds.stats.column_row_count(col.id, ranges, is_handle) {
        Ok(rows) => rows,
        Err(e) => {
            log::debug!("列 {} 行数估算失败, 使用默认选择率: {}", name, e);
            total * SELECTION_FACTOR
        }
    }
}

/// 计算一条访问路径的区间、过滤条件和扫描行数
fn fill_path(ds: &DataSource, path: &mut AccessPath, total: f64) {
    let range_col = path.range_column(&ds.table).map(|c| c.to_string());
    let (ranges, access, remained) = match &range_col {
        Some(col) => detach_column_ranges(&ds.pushed_conds, col, &ds.as_name, &ds.table),
        None => (vec![Range::full()], Vec::new(), ds.pushed_conds.clone()),
    };
    path.count_after_access = match &range_col {
        Some(col) => column_rows(ds, col, &ranges, total),
        None => total,
    };
    path.ranges = ranges;
    path.access_conds = access;
    path.index_filters.clear();
    path.table_filters.clear();

    let index_cols: Vec<String> = match &path.index {
        Some(index) => index.columns.iter().map(|c| c.to_lowercase()).collect(),
        None => {
            path.table_filters = remained;
            path.count_after_index = path.count_after_access;
            path.is_single_scan = true;
            return;
        }
    };
    let covered = |name: &str| {
        let name = name.to_lowercase();
        index_cols.contains(&name)
            || ds
                .table
                .handle_col
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(&name))
    };
    for cond in remained {
        if cond.columns().iter().all(|c| covered(&c.name)) {
            path.index_filters.push(cond);
        } else {
            path.table_filters.push(cond);
        }
    }
    path.count_after_index =
        path.count_after_access * SELECTION_FACTOR.powi(path.index_filters.len() as i32);
    path.is_single_scan =
        path.table_filters.is_empty() && ds.columns.iter().all(|c| covered(&c.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnInfo, FieldKind, IndexInfo, TableInfo};
    use crate::core::types::{CompareOp, Datum, StoreType};
    use crate::query::optimizer::stats::{ColumnStatistics, Histogram, TableStatistics};
    use crate::query::planner::PlanColumn;
    use std::sync::Arc;

    fn table() -> TableInfo {
        TableInfo::new(1, "t")
            .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
            .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
            .with_column(ColumnInfo::new(3, "b", FieldKind::Int))
            .with_handle("id")
            .with_index(IndexInfo::new(1, "idx_a", &["a"]))
    }

    /// a 取 0..100，每个值 10 行
    fn stats() -> TableStatistics {
        let hist = Histogram::new(100, 0)
            .append_bucket(Datum::Int(0), Datum::Int(49), 500.0, 10.0)
            .append_bucket(Datum::Int(50), Datum::Int(99), 500.0, 10.0);
        TableStatistics::new(1, 1000.0).with_column(ColumnStatistics::new(2, FieldKind::Int, hist))
    }

    fn data_source(columns: &[&str], conds: Vec<Expr>) -> DataSource {
        let table = Arc::new(table());
        let cols = columns
            .iter()
            .filter_map(|n| table.find_column(n))
            .map(|c| PlanColumn {
                unique_id: c.id,
                col_id: c.id,
                table: "t".to_string(),
                name: c.name.clone(),
                kind: c.kind,
                is_handle: c.name == "id",
            })
            .collect();
        let paths = vec![
            AccessPath::table_path(StoreType::TiKV),
            AccessPath::index_path(IndexInfo::new(1, "idx_a", &["a"])),
        ];
        DataSource {
            db: "test".to_string(),
            table,
            as_name: "t".to_string(),
            columns: cols,
            pushed_conds: conds,
            possible_paths: paths,
            stats: Arc::new(stats()),
        }
    }

    #[test]
    fn test_equal_condition_uses_histogram() {
        let cond = Expr::eq(Expr::col("a"), Expr::lit(10));
        let mut ds = data_source(&["id", "a"], vec![cond.clone()]);
        let rows = derive_data_source(&mut ds);
        assert_eq!(rows, 10.0);

        let table_path = &ds.possible_paths[0];
        assert_eq!(table_path.count_after_access, 1000.0);
        assert_eq!(table_path.table_filters, vec![cond.clone()]);

        let index_path = &ds.possible_paths[1];
        assert_eq!(index_path.access_conds, vec![cond]);
        assert_eq!(index_path.count_after_access, 10.0);
        assert!(index_path.is_single_scan);
    }

    #[test]
    fn test_non_covering_index_needs_lookup() {
        let a = Expr::compare(CompareOp::Lt, Expr::col("a"), Expr::lit(50));
        let b = Expr::eq(Expr::col("b"), Expr::lit(1));
        let mut ds = data_source(&["id", "a", "b"], vec![a, b.clone()]);
        derive_data_source(&mut ds);
        let index_path = &ds.possible_paths[1];
        assert_eq!(index_path.table_filters, vec![b]);
        assert!(!index_path.is_single_scan);
        assert!(index_path.count_after_access > 0.0);
    }

    #[test]
    fn test_contradiction_gives_zero_rows() {
        let conds = vec![
            Expr::compare(CompareOp::Gt, Expr::col("a"), Expr::lit(10)),
            Expr::compare(CompareOp::Lt, Expr::col("a"), Expr::lit(5)),
        ];
        let mut ds = data_source(&["a"], conds);
        assert_eq!(derive_data_source(&mut ds), 0.0);
        assert!(ds.possible_paths[1].ranges.is_empty());
    }

    #[test]
    fn test_other_conditions_use_default_selectivity() {
        let cond = Expr::eq(Expr::col("a"), Expr::col("b"));
        let ds = data_source(&["a", "b"], Vec::new());
        assert_eq!(conds_selectivity(&ds, &[cond]), SELECTION_FACTOR);
    }

    #[test]
    fn test_join_row_count() {
        let on = Expr::eq(Expr::col("t1.id"), Expr::col("t2.id"));
        assert_eq!(join_row_count(&[on], 10.0, 100.0), 100.0);
        assert_eq!(join_row_count(&[], 10.0, 100.0), 1000.0);
    }

    #[test]
    fn test_selection_over_join_matches_pushed_down_form() {
        let join = |conditions: Vec<Expr>, left: DataSource, right: DataSource| {
            LogicalPlan::new(
                3,
                LogicalOp::Join {
                    conditions,
                    left: Box::new(LogicalPlan::new(1, LogicalOp::DataSource(left))),
                    right: Box::new(LogicalPlan::new(2, LogicalOp::DataSource(right))),
                },
            )
        };
        let aliased = |name: &str, conds: Vec<Expr>| {
            let mut ds = data_source(&["id", "a"], conds);
            ds.as_name = name.to_string();
            ds
        };
        let on = Expr::eq(Expr::col("t1.id"), Expr::col("t2.id"));
        let filter = Expr::compare(CompareOp::Lt, Expr::col("t1.a"), Expr::lit(5));

        let mut above = LogicalPlan::new(
            4,
            LogicalOp::Selection {
                conditions: vec![on.clone(), filter.clone()],
                child: Box::new(join(Vec::new(), aliased("t1", Vec::new()), aliased("t2", Vec::new()))),
            },
        );
        derive_stats(&mut above);

        let mut pushed = join(vec![on], aliased("t1", vec![filter]), aliased("t2", Vec::new()));
        derive_stats(&mut pushed);

        assert_eq!(above.row_count, pushed.row_count);
        assert_eq!(above.row_count, 1000.0);
        // 连接本身仍是笛卡尔积
        assert_eq!(above.children()[0].row_count, 1000.0 * 1000.0);
    }

    #[test]
    fn test_limit_caps_rows() {
        let ds = data_source(&["a"], Vec::new());
        let mut plan = LogicalPlan::new(
            2,
            LogicalOp::Limit {
                offset: 0,
                count: 5,
                child: Box::new(LogicalPlan::new(1, LogicalOp::DataSource(ds))),
            },
        );
        derive_stats(&mut plan);
        assert_eq!(plan.row_count, 5.0);
        assert_eq!(plan.children()[0].row_count, 1000.0);
    }
}
