//! 数据源的候选访问计划
//!
//! 每条访问路径对应一棵实现树：
//!
//! - 表路径：TableReader → TableScan
//! - 覆盖索引：IndexReader → IndexScan
//! - 非覆盖索引：IndexLookUp → (IndexScan, TableScan)，需要保序且输出列不含句柄时
//!   在回表结果上加一个去掉句柄的投影
//!
//! 只有能满足顺序属性的路径才会产出候选，不满足时由上层补排序。

use super::OrderProp;
use crate::core::schema::FieldKind;
use crate::core::types::StoreType;
use crate::query::context::SessionVars;
use crate::query::optimizer::implementation::{
    ImplNode, IndexLookUpReaderImpl, IndexReaderImpl, IndexScanImpl, TableReaderImpl, TableScanImpl,
};
use crate::query::parser::ast::{ColumnName, Expr};
use crate::query::planner::access_path::column_belongs;
use crate::query::planner::{
    AccessPath, DataSource, IndexScanInfo, PhysicalOp, PhysicalPlan, PlanColumn, TableScanInfo,
    EXTRA_HANDLE_ID, EXTRA_HANDLE_NAME,
};
use std::sync::Arc;

/// 路径能否满足顺序属性，能满足时返回扫描方向
pub fn match_order(ds: &DataSource, path: &AccessPath, prop: &OrderProp) -> Option<bool> {
    if prop.is_empty() {
        return Some(false);
    }
    let desc = prop.uniform_desc()?;
    let order_cols = path.order_columns(&ds.table);
    if prop.items.len() > order_cols.len() {
        return None;
    }
    let matched = prop.items.iter().zip(order_cols).all(|(item, col)| {
        column_belongs(&item.column, &ds.as_name, &ds.table)
            && item.column.name.eq_ignore_ascii_case(col)
    });
    matched.then_some(desc)
}

/// 为数据源生成满足顺序属性的所有候选
pub fn data_source_candidates(
    vars: &mut SessionVars,
    ds: &DataSource,
    rows: f64,
    prop: &OrderProp,
) -> Vec<ImplNode> {
    let mut out = Vec::new();
    for path in &ds.possible_paths {
        let desc = match match_order(ds, path, prop) {
            Some(desc) => desc,
            None => continue,
        };
        let keep_order = !prop.is_empty();
        let node = if path.is_table_path() {
            table_reader(vars, ds, path, rows, keep_order, desc)
        } else if path.is_single_scan {
            index_reader(vars, ds, path, rows, keep_order, desc)
        } else {
            index_lookup(vars, ds, path, rows, keep_order, desc)
        };
        if let Some(node) = node {
            out.push(node);
        }
    }
    out
}

fn table_scan_plan(
    vars: &mut SessionVars,
    ds: &DataSource,
    path: &AccessPath,
    rows: f64,
    schema: Vec<PlanColumn>,
    keep_order: bool,
    desc: bool,
) -> PhysicalPlan {
    PhysicalPlan::new(
        vars.alloc_plan_id(),
        rows,
        schema,
        PhysicalOp::TableScan(TableScanInfo {
            db: ds.db.clone(),
            table: Arc::clone(&ds.table),
            as_name: ds.as_name.clone(),
            ranges: if path.is_table_path() {
                path.ranges.clone()
            } else {
                Vec::new()
            },
            desc,
            keep_order,
            store: path.store,
            filters: path.table_filters.clone(),
        }),
    )
}

fn index_scan_plan(
    vars: &mut SessionVars,
    ds: &DataSource,
    path: &AccessPath,
    schema: Vec<PlanColumn>,
    keep_order: bool,
    desc: bool,
) -> Option<PhysicalPlan> {
    let index = path.index.clone()?;
    Some(PhysicalPlan::new(
        vars.alloc_plan_id(),
        path.count_after_access,
        schema,
        PhysicalOp::IndexScan(IndexScanInfo {
            db: ds.db.clone(),
            table: Arc::clone(&ds.table),
            as_name: ds.as_name.clone(),
            index,
            ranges: path.ranges.clone(),
            desc,
            keep_order,
            filters: path.index_filters.clone(),
        }),
    ))
}

fn table_reader(
    vars: &mut SessionVars,
    ds: &DataSource,
    path: &AccessPath,
    rows: f64,
    keep_order: bool,
    desc: bool,
) -> Option<ImplNode> {
    let f = vars.cost_factors;
    let scan = table_scan_plan(
        vars,
        ds,
        path,
        path.count_after_access,
        ds.columns.clone(),
        keep_order,
        desc,
    );
    let reader = PhysicalPlan::new(
        vars.alloc_plan_id(),
        rows,
        ds.columns.clone(),
        PhysicalOp::TableReader {
            table_plan: Box::new(scan.clone()),
            store: path.store,
        },
    );
    let stats = Arc::clone(&ds.stats);
    Some(ImplNode::new(
        Box::new(TableReaderImpl::new(reader, Arc::clone(&stats), f)),
        vec![ImplNode::leaf(TableScanImpl::new(scan, stats, f))],
    ))
}

fn index_reader(
    vars: &mut SessionVars,
    ds: &DataSource,
    path: &AccessPath,
    rows: f64,
    keep_order: bool,
    desc: bool,
) -> Option<ImplNode> {
    let f = vars.cost_factors;
    let scan = index_scan_plan(vars, ds, path, ds.columns.clone(), keep_order, desc)?;
    let reader = PhysicalPlan::new(
        vars.alloc_plan_id(),
        rows,
        ds.columns.clone(),
        PhysicalOp::IndexReader {
            index_plan: Box::new(scan.clone()),
        },
    );
    let stats = Arc::clone(&ds.stats);
    Some(ImplNode::new(
        Box::new(IndexReaderImpl::new(reader, Arc::clone(&stats), f)),
        vec![ImplNode::leaf(IndexScanImpl::new(scan, stats, f))],
    ))
}

/// 索引扫描输出的列：索引列加句柄
fn index_columns(vars: &mut SessionVars, ds: &DataSource, path: &AccessPath) -> Vec<PlanColumn> {
    let mut cols = Vec::new();
    let names = path
        .index
        .as_ref()
        .map(|i| i.columns.clone())
        .unwrap_or_default();
    for name in names {
        let existing = ds
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
            .cloned();
        let col = match existing {
            Some(c) => Some(c),
            None => ds.table.find_column(&name).map(|info| PlanColumn {
                unique_id: vars.alloc_column_id(),
                col_id: info.id,
                table: ds.as_name.clone(),
                name: info.name.clone(),
                kind: info.kind,
                is_handle: false,
            }),
        };
        cols.extend(col);
    }
    cols
}

/// 句柄列，表没有整数主键时使用隐藏行句柄
fn handle_column(vars: &mut SessionVars, ds: &DataSource) -> PlanColumn {
    if let Some(col) = ds.columns.iter().find(|c| c.is_handle) {
        return col.clone();
    }
    match ds.table.handle_column() {
        Some(info) => PlanColumn {
            unique_id: vars.alloc_column_id(),
            col_id: info.id,
            table: ds.as_name.clone(),
            name: info.name.clone(),
            kind: info.kind,
            is_handle: true,
        },
        None => PlanColumn {
            unique_id: vars.alloc_column_id(),
            col_id: EXTRA_HANDLE_ID,
            table: ds.as_name.clone(),
            name: EXTRA_HANDLE_NAME.to_string(),
            kind: FieldKind::Int,
            is_handle: true,
        },
    }
}

fn index_lookup(
    vars: &mut SessionVars,
    ds: &DataSource,
    path: &AccessPath,
    rows: f64,
    keep_order: bool,
    desc: bool,
) -> Option<ImplNode> {
    let f = vars.cost_factors;
    let mut index_schema = index_columns(vars, ds, path);
    let handle = handle_column(vars, ds);
    if !index_schema.iter().any(|c| c.is_handle) {
        index_schema.push(handle.clone());
    }
    let index_plan = index_scan_plan(vars, ds, path, index_schema, keep_order, desc)?;

    // 保序回表需要句柄来归并各批次的结果
    let extra_handle = keep_order && !ds.columns.iter().any(|c| c.is_handle);
    let mut table_schema = ds.columns.clone();
    if extra_handle {
        table_schema.push(handle);
    }
    let table_path = AccessPath {
        store: StoreType::TiKV,
        ..path.clone()
    };
    let table_plan = table_scan_plan(
        vars,
        ds,
        &table_path,
        path.count_after_index,
        table_schema.clone(),
        false,
        false,
    );

    let mut plan = PhysicalPlan::new(
        vars.alloc_plan_id(),
        rows,
        table_schema,
        PhysicalOp::IndexLookUpReader {
            index_plan: Box::new(index_plan.clone()),
            table_plan: Box::new(table_plan.clone()),
            keep_order,
        },
    );
    if extra_handle {
        let exprs = ds
            .columns
            .iter()
            .map(|c| {
                Expr::Column(ColumnName {
                    table: Some(c.table.clone()),
                    name: c.name.clone(),
                })
            })
            .collect();
        plan = PhysicalPlan::new(
            vars.alloc_plan_id(),
            rows,
            ds.columns.clone(),
            PhysicalOp::Projection {
                exprs,
                child: Box::new(plan),
            },
        );
    }
    let stats = Arc::clone(&ds.stats);
    Some(ImplNode::new(
        Box::new(IndexLookUpReaderImpl::new(plan, keep_order, f)),
        vec![
            ImplNode::leaf(IndexScanImpl::new(index_plan, Arc::clone(&stats), f)),
            ImplNode::leaf(TableScanImpl::new(table_plan, stats, f)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnInfo, IndexInfo, TableInfo};
    use crate::query::optimizer::search::derive::derive_data_source;
    use crate::query::optimizer::search::PropItem;
    use crate::query::optimizer::stats::TableStatistics;

    fn data_source(columns: &[&str], with_handle: bool) -> DataSource {
        let mut table = TableInfo::new(1, "t")
            .with_column(ColumnInfo::new(1, "id", FieldKind::Int))
            .with_column(ColumnInfo::new(2, "a", FieldKind::Int))
            .with_column(ColumnInfo::new(3, "b", FieldKind::Int))
            .with_index(IndexInfo::new(1, "idx_a", &["a"]));
        if with_handle {
            table = table.with_handle("id");
        }
        let table = Arc::new(table);
        let cols = columns
            .iter()
            .filter_map(|n| table.find_column(n))
            .map(|c| PlanColumn {
                unique_id: c.id,
                col_id: c.id,
                table: "t".to_string(),
                name: c.name.clone(),
                kind: c.kind,
                is_handle: with_handle && c.name == "id",
            })
            .collect();
        let mut ds = DataSource {
            db: "test".to_string(),
            table,
            as_name: "t".to_string(),
            columns: cols,
            pushed_conds: Vec::new(),
            possible_paths: vec![
                AccessPath::table_path(StoreType::TiKV),
                AccessPath::index_path(IndexInfo::new(1, "idx_a", &["a"])),
            ],
            stats: Arc::new(TableStatistics::pseudo(1)),
        };
        derive_data_source(&mut ds);
        ds
    }

    fn order_by(col: &str, desc: bool) -> OrderProp {
        OrderProp {
            items: vec![PropItem {
                column: ColumnName::parse(col),
                desc,
            }],
        }
    }

    #[test]
    fn test_candidates_without_order() {
        let mut vars = SessionVars::default();
        let ds = data_source(&["a"], true);
        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &OrderProp::default());
        let tps: Vec<&str> = nodes.iter().map(|n| n.plan().tp()).collect();
        assert_eq!(tps, vec!["TableReader", "IndexReader"]);
    }

    #[test]
    fn test_non_covering_index_uses_lookup() {
        let mut vars = SessionVars::default();
        let ds = data_source(&["a", "b"], true);
        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &OrderProp::default());
        assert_eq!(nodes[1].plan().tp(), "IndexLookUp");
        assert_eq!(nodes[1].children.len(), 2);
    }

    #[test]
    fn test_order_property_filters_paths() {
        let mut vars = SessionVars::default();
        let ds = data_source(&["a"], true);

        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &order_by("a", true));
        assert_eq!(nodes.len(), 1);
        match &nodes[0].plan().op {
            PhysicalOp::IndexReader { index_plan } => match &index_plan.op {
                PhysicalOp::IndexScan(is) => assert!(is.keep_order && is.desc),
                other => panic!("期望索引扫描, 得到 {:?}", other),
            },
            other => panic!("期望 IndexReader, 得到 {:?}", other),
        }

        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &order_by("t.id", false));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].plan().tp(), "TableReader");

        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &order_by("b", false));
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_keep_order_lookup_adds_projection_without_handle() {
        let mut vars = SessionVars::default();
        let ds = data_source(&["a", "b"], false);
        let nodes = data_source_candidates(&mut vars, &ds, 10000.0, &order_by("a", false));
        assert_eq!(nodes.len(), 1);
        let plan = nodes[0].plan();
        assert_eq!(plan.tp(), "Projection");
        let reader = plan.children()[0];
        assert_eq!(reader.tp(), "IndexLookUp");
        assert!(reader.schema.iter().any(|c| c.name == EXTRA_HANDLE_NAME));
        assert_eq!(plan.schema.len(), 2);
    }

    #[test]
    fn test_lookup_cost_is_computed() {
        let mut vars = SessionVars::default();
        let ds = data_source(&["a", "b"], true);
        let mut nodes = data_source_candidates(&mut vars, &ds, 10000.0, &OrderProp::default());
        let lookup = &mut nodes[1];
        let cost = lookup.calc_cost();
        assert!(cost > 0.0);
        assert!(lookup.children_cost() > 0.0);
    }
}
