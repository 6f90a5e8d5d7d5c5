//! 点查快速计划
//!
//! 单表、等值条件恰好覆盖句柄列或某个唯一索引全部列的查询，
//! 结果至多一行，跳过代价优化直接生成点查计划。

use super::{FieldName, PlanColumn};
use crate::query::context::SessionVars;
use crate::core::schema::{IndexInfo, InfoSchema, TableInfo};
use crate::core::types::{CompareOp, Datum};
use crate::query::parser::ast::{Expr, SelectField, SelectStmt, Stmt};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct PointGetPlan {
    pub id: i64,
    pub db: String,
    pub table: Arc<TableInfo>,
    pub as_name: String,
    /// 为 None 时按句柄点查
    pub index: Option<IndexInfo>,
    /// 与句柄列或索引列一一对应的取值
    pub values: Vec<Datum>,
    pub schema: Vec<PlanColumn>,
    pub names: Vec<FieldName>,
}

impl PointGetPlan {
    pub fn explain(&self) -> String {
        let values = self
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.index {
            Some(index) => format!(
                "Point_Get_{}\t1.00\ttable:{}, index:{}({}), value:({})",
                self.id,
                self.as_name,
                index.name,
                index.columns.join(", "),
                values
            ),
            None => format!(
                "Point_Get_{}\t1.00\ttable:{}, handle:{}",
                self.id, self.as_name, values
            ),
        }
    }
}

/// 尝试生成点查计划，不满足条件时返回 None
pub fn try_fast_plan(vars: &mut SessionVars, stmt: &Stmt, is: &InfoSchema) -> Option<PointGetPlan> {
    match stmt {
        Stmt::Select(select) => try_point_get(vars, select, is),
        _ => None,
    }
}

fn try_point_get(vars: &mut SessionVars, select: &SelectStmt, is: &InfoSchema) -> Option<PointGetPlan> {
    // 带提示的语句走完整优化，让提示和绑定生效
    if select.from.len() != 1
        || !select.hints.is_empty()
        || !select.order_by.is_empty()
        || select.limit.is_some()
    {
        return None;
    }
    let source = &select.from[0];
    let db = source.db.clone().unwrap_or_else(|| vars.current_db.clone());
    let table = is.table_by_name(&db, &source.name)?;
    let as_name = source.as_name().to_string();

    // 收集 列 = 常量，出现其他形式的条件即放弃
    let mut eq_values: Vec<(String, Datum)> = Vec::new();
    for cond in select.where_clause.as_ref()?.split_conjuncts() {
        let (col, op, value) = cond.as_column_compare()?;
        if op != CompareOp::Eq || value.is_null() {
            return None;
        }
        if let Some(t) = &col.table {
            if !t.eq_ignore_ascii_case(&as_name) {
                return None;
            }
        }
        table.find_column(&col.name)?;
        if eq_values.iter().any(|(name, _)| name == &col.name) {
            return None;
        }
        eq_values.push((col.name.clone(), value.clone()));
    }

    let (index, values) = match_handle_or_unique_index(&table, &eq_values)?;

    let mut schema = Vec::new();
    let mut names = Vec::new();
    for field in &select.fields {
        match field {
            SelectField::Wildcard => {
                for c in table.visible_columns() {
                    schema.push(plan_column(vars, &table, &as_name, &c.name)?);
                    names.push(FieldName {
                        db: db.clone(),
                        table: as_name.clone(),
                        column: c.name.clone(),
                    });
                }
            }
            SelectField::Expr { expr, alias } => {
                let col = match expr {
                    Expr::Column(c) => c,
                    _ => return None,
                };
                schema.push(plan_column(vars, &table, &as_name, &col.name)?);
                names.push(FieldName {
                    db: db.clone(),
                    table: as_name.clone(),
                    column: alias.clone().unwrap_or_else(|| col.name.clone()),
                });
            }
        }
    }

    Some(PointGetPlan {
        id: vars.alloc_plan_id(),
        db,
        table,
        as_name,
        index,
        values,
        schema,
        names,
    })
}

fn plan_column(vars: &mut SessionVars, table: &TableInfo, as_name: &str, name: &str) -> Option<PlanColumn> {
    let info = table.find_column(name)?;
    Some(PlanColumn {
        unique_id: vars.alloc_column_id(),
        col_id: info.id,
        table: as_name.to_string(),
        name: info.name.clone(),
        kind: info.kind,
        is_handle: table.handle_col.as_deref() == Some(info.name.as_str()),
    })
}

/// 等值条件恰好是句柄列或某个唯一索引的全部列
fn match_handle_or_unique_index(
    table: &TableInfo,
    eq_values: &[(String, Datum)],
) -> Option<(Option<IndexInfo>, Vec<Datum>)> {
    if let (Some(handle), [(name, value)]) = (table.handle_col.as_deref(), eq_values) {
        if handle == name {
            return Some((None, vec![value.clone()]));
        }
    }
    for index in table.indices.iter().filter(|i| i.unique) {
        if index.columns.len() != eq_values.len() {
            continue;
        }
        let values: Option<Vec<Datum>> = index
            .columns
            .iter()
            .map(|c| {
                eq_values
                    .iter()
                    .find(|(name, _)| name == c)
                    .map(|(_, v)| v.clone())
            })
            .collect();
        if let Some(values) = values {
            return Some((Some(index.clone()), values));
        }
    }
    None
}
