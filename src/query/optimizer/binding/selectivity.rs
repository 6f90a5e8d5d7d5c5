//! 绑定查找用的语句信息
//!
//! 只有 SELECT 和 EXPLAIN SELECT 参与绑定。选择率只看 WHERE 顶层合取项中
//! 第一个“列 比较 常量”的条件，最多检查 FROM 中的前两张表，不分析连接和子查询。
//! 桶号依赖这个粗略的估算，不要改得更精细。

use crate::core::types::build_column_range;
use crate::query::optimizer::hint::inject_hint_comment;
use crate::query::optimizer::stats::StatisticsProvider;
use crate::query::parser::ast::{SelectStmt, Stmt};
use crate::query::parser::normalize::{digest_normalized, normalize, normalize_digest};

/// 选择率未知
pub const UNKNOWN_SELECTIVITY: f64 = -1.0;

/// 取出参与绑定的 SELECT，返回 (语句, 规范化文本, 摘要)
///
/// EXPLAIN 和 EXPLAIN ANALYZE 前缀在规范化后去掉，与不带前缀的语句共用绑定。
pub fn extract_select_and_normalize_digest(stmt: &Stmt) -> Option<(&SelectStmt, String, String)> {
    match stmt {
        Stmt::Select(select) => {
            let (normalized, digest) = normalize_digest(&select.text);
            Some((select, normalized, digest))
        }
        Stmt::Explain(explain) => {
            let select = match explain.stmt.as_ref() {
                Stmt::Select(s) => s,
                _ => return None,
            };
            let normalized = normalize(&explain.text);
            let idx = normalized.find("select")?;
            let normalized = normalized[idx..].to_string();
            let digest = digest_normalized(&normalized);
            Some((select, normalized, digest))
        }
        _ => None,
    }
}

/// 估算语句的选择率
///
/// 没有 WHERE 或找不到可用的条件时返回 0；条件得不到任何区间或估算出错时返回 -1。
pub fn extract_selectivity(select: &SelectStmt, stats: &dyn StatisticsProvider) -> f64 {
    let tables: Vec<_> = select
        .from
        .iter()
        .take(2)
        .filter_map(|s| s.table_info.as_ref())
        .collect();
    let conditions = match &select.where_clause {
        Some(cond) => cond.split_conjuncts(),
        None => return 0.0,
    };
    if conditions.is_empty() || tables.is_empty() {
        return 0.0;
    }

    for cond in conditions {
        let Some((column, op, value)) = cond.as_column_compare() else {
            continue;
        };
        for table in &tables {
            let Some(col) = table.find_column(&column.name) else {
                continue;
            };
            let Some(table_stats) = stats.table_stats(table.id) else {
                continue;
            };
            let Some(col_stats) = table_stats.column(col.id) else {
                continue;
            };
            let ranges = build_column_range(op, value);
            if ranges.is_empty() {
                return UNKNOWN_SELECTIVITY;
            }
            let count = match col_stats.column_row_count(&ranges, table_stats.modify_count, table.pk_is_handle()) {
                Ok(count) => count,
                Err(e) => {
                    log::debug!("选择率估算失败: {}", e);
                    return UNKNOWN_SELECTIVITY;
                }
            };
            if table_stats.count <= 0.0 {
                return 0.0;
            }
            return count / table_stats.count;
        }
    }
    0.0
}

/// 选择率对应的桶号，选择率未知时返回 None
///
/// `floor(selectivity × space)`，上界收敛到 `space - 1`。
pub fn bucket_id(selectivity: f64, space: i64) -> Option<i64> {
    if selectivity < 0.0 || space <= 0 {
        return None;
    }
    let bucket = (selectivity * space as f64).floor() as i64;
    Some(bucket.clamp(0, space - 1))
}

/// 用计划的提示签名生成绑定 SQL
///
/// 提示写在（EXPLAIN 之后的）第一个 SELECT 关键字后，语句原有的提示被去掉。
/// 提示为空或语句带参数标记时返回空串。
pub fn generate_bind_sql(stmt: &Stmt, plan_hint: &str) -> String {
    if plan_hint.is_empty() {
        return String::new();
    }
    let Some(select) = stmt.select() else {
        return String::new();
    };
    if select.param_count() > 0 {
        return String::new();
    }
    inject_hint_comment(&select.text, plan_hint).unwrap_or_default()
}
