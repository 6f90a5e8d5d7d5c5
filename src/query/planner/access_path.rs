//! 访问路径
//!
//! 每张表的候选访问方式：TiKV 表扫描、TiFlash 表扫描以及每个索引一条路径。
//! 构建阶段按提示和隔离读引擎筛选路径，统计信息推导阶段填充区间和行数。

use crate::core::error::{HintWarning, OptimizeError, OptimizeResult};
use crate::core::schema::{IndexInfo, TableInfo};
use crate::core::types::{build_column_range, Range, StoreType};
use crate::query::parser::ast::{ColumnName, Expr};
use crate::query::parser::hint::{HintData, TableOptimizerHint};

#[derive(Debug, Clone, PartialEq)]
pub struct AccessPath {
    /// 为 None 时是表扫描路径
    pub index: Option<IndexInfo>,
    pub store: StoreType,
    pub ranges: Vec<Range>,
    /// 用于构造扫描区间的条件
    pub access_conds: Vec<Expr>,
    /// 可以在索引上计算的过滤条件
    pub index_filters: Vec<Expr>,
    /// 需要回表后计算的过滤条件
    pub table_filters: Vec<Expr>,
    pub count_after_access: f64,
    pub count_after_index: f64,
    /// 索引覆盖了所有需要的列，无需回表
    pub is_single_scan: bool,
    /// 由 USE_INDEX 提示指定
    pub forced: bool,
}

impl AccessPath {
    pub fn table_path(store: StoreType) -> Self {
        Self {
            index: None,
            store,
            ranges: vec![Range::full()],
            access_conds: Vec::new(),
            index_filters: Vec::new(),
            table_filters: Vec::new(),
            count_after_access: 0.0,
            count_after_index: 0.0,
            is_single_scan: true,
            forced: false,
        }
    }

    pub fn index_path(index: IndexInfo) -> Self {
        Self {
            index: Some(index),
            ..Self::table_path(StoreType::TiKV)
        }
    }

    pub fn is_table_path(&self) -> bool {
        self.index.is_none()
    }

    /// 路径输出天然有序的列
    ///
    /// TiKV 表扫描按句柄有序，索引扫描按索引列有序，TiFlash 扫描无序。
    pub fn order_columns<'a>(&'a self, table: &'a TableInfo) -> Vec<&'a str> {
        match (&self.index, self.store) {
            (Some(index), _) => index.columns.iter().map(|c| c.as_str()).collect(),
            (None, StoreType::TiKV) => table.handle_col.as_deref().into_iter().collect(),
            (None, StoreType::TiFlash) => Vec::new(),
        }
    }

    /// 构造区间的列：索引第一列，表路径为句柄列
    pub fn range_column<'a>(&'a self, table: &'a TableInfo) -> Option<&'a str> {
        match (&self.index, self.store) {
            (Some(index), _) => index.columns.first().map(|c| c.as_str()),
            (None, StoreType::TiKV) => table.handle_col.as_deref(),
            (None, StoreType::TiFlash) => None,
        }
    }
}

/// 条件中引用的列是否属于 `as_name` 所指的表
pub fn column_belongs(col: &ColumnName, as_name: &str, table: &TableInfo) -> bool {
    col.table
        .as_deref()
        .map_or(true, |t| t.eq_ignore_ascii_case(as_name))
        && table.find_column(&col.name).is_some()
}

/// 从条件中分离出某一列上的区间
///
/// 返回（区间，访问条件，剩余条件）。同一列上的多个比较求交集，
/// 交集为空时区间列表为空。
pub fn detach_column_ranges(
    conds: &[Expr],
    column: &str,
    as_name: &str,
    table: &TableInfo,
) -> (Vec<Range>, Vec<Expr>, Vec<Expr>) {
    let mut range = Some(Range::full());
    let mut access = Vec::new();
    let mut remained = Vec::new();
    for cond in conds {
        let matched = cond.as_column_compare().filter(|(col, _, _)| {
            col.name.eq_ignore_ascii_case(column) && column_belongs(col, as_name, table)
        });
        match matched {
            Some((_, op, value)) => {
                let built = build_column_range(op, value);
                range = match (range, built.first()) {
                    (Some(r), Some(b)) => r.intersect(b),
                    _ => None,
                };
                access.push(cond.clone());
            }
            None => remained.push(cond.clone()),
        }
    }
    (range.into_iter().collect(), access, remained)
}

fn hint_matches_table(hint: &TableOptimizerHint, db: &str, as_name: &str) -> bool {
    hint.tables.iter().any(|t| {
        t.table.eq_ignore_ascii_case(as_name)
            && t.db.as_deref().map_or(true, |d| d.eq_ignore_ascii_case(db))
    })
}

fn find_hinted_index<'a>(table: &'a TableInfo, name: &str) -> OptimizeResult<Option<&'a IndexInfo>> {
    if name.eq_ignore_ascii_case("primary") && table.pk_is_handle() {
        return Ok(None);
    }
    table
        .find_index(name)
        .map(Some)
        .ok_or_else(|| OptimizeError::IndexNotFound {
            table: table.name.clone(),
            index: name.to_string(),
        })
}

/// 按提示和隔离读引擎筛选表的候选访问路径
pub fn get_possible_access_paths(
    db: &str,
    table: &TableInfo,
    as_name: &str,
    hints: &[TableOptimizerHint],
    engines: &[StoreType],
    warnings: &mut Vec<HintWarning>,
) -> OptimizeResult<Vec<AccessPath>> {
    let hints: Vec<&TableOptimizerHint> = hints
        .iter()
        .filter(|h| hint_matches_table(h, db, as_name))
        .collect();

    let mut paths = vec![AccessPath::table_path(StoreType::TiKV)];
    paths.extend(table.indices.iter().cloned().map(AccessPath::index_path));

    let use_hints: Vec<&&TableOptimizerHint> =
        hints.iter().filter(|h| h.name == "use_index").collect();
    if !use_hints.is_empty() {
        let mut kept: Vec<AccessPath> = Vec::new();
        for hint in use_hints {
            if hint.indexes.is_empty() {
                kept.push(AccessPath::table_path(StoreType::TiKV));
            }
            for name in &hint.indexes {
                let path = match find_hinted_index(table, name)? {
                    Some(index) => AccessPath::index_path(index.clone()),
                    None => AccessPath::table_path(StoreType::TiKV),
                };
                kept.push(path);
            }
        }
        kept.dedup_by(|a, b| a.index == b.index);
        for path in &mut kept {
            path.forced = true;
        }
        paths = kept;
    }

    for hint in hints.iter().filter(|h| h.name == "ignore_index") {
        for name in &hint.indexes {
            match find_hinted_index(table, name)? {
                Some(index) => paths.retain(|p| p.index.as_ref() != Some(index)),
                None => paths.retain(|p| !p.is_table_path()),
            }
        }
    }

    let mut hinted_stores = Vec::new();
    for hint in hints.iter().filter(|h| h.name == "read_from_storage") {
        if let HintData::Store(store) = hint.data {
            if store == StoreType::TiFlash && !table.tiflash_replica {
                warnings.push(HintWarning::NoTiFlashReplica(as_name.to_string()));
                continue;
            }
            hinted_stores.push(store);
        }
    }

    if table.tiflash_replica
        && (hinted_stores.contains(&StoreType::TiFlash) || hinted_stores.is_empty())
        && !paths.iter().any(|p| p.store == StoreType::TiFlash)
    {
        // USE_INDEX 只约束 TiKV 上的路径，显式要求读 TiFlash 时保留 TiFlash 路径
        let has_use_index = hints.iter().any(|h| h.name == "use_index");
        if !has_use_index || hinted_stores.contains(&StoreType::TiFlash) {
            paths.push(AccessPath::table_path(StoreType::TiFlash));
        }
    }
    if !hinted_stores.is_empty() {
        paths.retain(|p| hinted_stores.contains(&p.store));
    }

    paths.retain(|p| engines.contains(&p.store));
    if paths.is_empty() {
        return Err(OptimizeError::NoFeasiblePlan(format!(
            "表 {} 在隔离读引擎 [{}] 上没有可用的访问路径",
            as_name,
            engines
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnInfo, FieldKind};
    use crate::core::types::CompareOp;

    fn table() -> TableInfo {
        TableInfo::new(1, "t")
            .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
            .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
            .with_column(ColumnInfo::new(3, "b", FieldKind::String))
            .with_handle("id")
            .with_index(IndexInfo::new(1, "idx_a", &["a"]))
            .with_index(IndexInfo::new(2, "idx_b", &["b"]))
            .with_tiflash_replica()
    }

    const ALL: &[StoreType] = &[StoreType::TiKV, StoreType::TiFlash];

    #[test]
    fn test_all_paths_without_hints() {
        let mut w = Vec::new();
        let paths = get_possible_access_paths("test", &table(), "t", &[], ALL, &mut w).unwrap();
        assert_eq!(paths.len(), 4);
        assert!(w.is_empty());
    }

    #[test]
    fn test_use_index_restricts_paths() {
        let mut w = Vec::new();
        let hints = [TableOptimizerHint::use_index("t", &["idx_b"])];
        let paths = get_possible_access_paths("test", &table(), "t", &hints, ALL, &mut w).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].index.as_ref().map(|i| i.name.as_str()), Some("idx_b"));
        assert!(paths[0].forced);

        let table_only = [TableOptimizerHint::use_index("t", &[])];
        let paths =
            get_possible_access_paths("test", &table(), "t", &table_only, ALL, &mut w).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_table_path());
        assert_eq!(paths[0].store, StoreType::TiKV);
    }

    #[test]
    fn test_unknown_index_is_error() {
        let mut w = Vec::new();
        let hints = [TableOptimizerHint::use_index("t", &["nope"])];
        assert!(matches!(
            get_possible_access_paths("test", &table(), "t", &hints, ALL, &mut w),
            Err(OptimizeError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn test_read_from_storage_and_engines() {
        let mut w = Vec::new();
        let hints = [TableOptimizerHint::read_from_storage(StoreType::TiFlash, &["t"])];
        let paths = get_possible_access_paths("test", &table(), "t", &hints, ALL, &mut w).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].store, StoreType::TiFlash);

        let err = get_possible_access_paths("test", &table(), "t", &hints, &[StoreType::TiKV], &mut w);
        assert!(matches!(err, Err(OptimizeError::NoFeasiblePlan(_))));

        let no_replica = TableInfo::new(2, "s").with_column(ColumnInfo::new(1, "a", FieldKind::Int));
        let hints = [TableOptimizerHint::read_from_storage(StoreType::TiFlash, &["s"])];
        let paths = get_possible_access_paths("test", &no_replica, "s", &hints, ALL, &mut w).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(w, vec![HintWarning::NoTiFlashReplica("s".to_string())]);
    }

    #[test]
    fn test_detach_column_ranges() {
        let t = table();
        let conds = vec![
            Expr::compare(CompareOp::Gt, Expr::col("a"), Expr::lit(1)),
            Expr::compare(CompareOp::Le, Expr::col("t.a"), Expr::lit(10)),
            Expr::eq(Expr::col("b"), Expr::lit("x")),
        ];
        let (ranges, access, remained) = detach_column_ranges(&conds, "a", "t", &t);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].to_string(), "(1,10]");
        assert_eq!(access.len(), 2);
        assert_eq!(remained.len(), 1);

        let empty = vec![
            Expr::compare(CompareOp::Gt, Expr::col("a"), Expr::lit(10)),
            Expr::compare(CompareOp::Lt, Expr::col("a"), Expr::lit(1)),
        ];
        let (ranges, _, _) = detach_column_ranges(&empty, "a", "t", &t);
        assert!(ranges.is_empty());
    }
}
