//! 计划构建
//!
//! `PlanBuilder` 把语句 AST 转换为逻辑计划，同时记录访问信息供权限和表锁检查。
//! 默认实现支持单表和两表内连接的 SELECT、EXPLAIN、EXECUTE 和不需要优化的简单语句。

use super::access_path::get_possible_access_paths;
use super::fast_plan::{self, PointGetPlan};
use super::hint_processor::BlockHintProcessor;
use super::logical::{DataSource, LogicalOp, LogicalPlan, FLAG_PREDICATE_PUSH_DOWN, FLAG_PRUNE_COLUMNS};
use super::privilege::{Privilege, VisitInfo};
use super::{FieldName, PlanColumn, SimplePlan};
use crate::core::error::{OptimizeError, OptimizeResult};
use crate::core::schema::{FieldKind, InfoSchema};
use crate::core::types::Datum;
use crate::query::context::{SessionVars, TableEntry};
use crate::query::optimizer::stats::StatisticsProvider;
use crate::query::parser::ast::{ColumnName, ExecuteStmt, Expr, SelectField, SelectStmt, Stmt};
use crate::query::parser::hint::TableOptimizerHint;
use std::fmt::Debug;
use std::sync::Arc;

/// 构建结果中的计划
#[derive(Debug, Clone)]
pub enum BuiltPlan {
    Logical(LogicalPlan),
    Explain {
        analyze: bool,
        inner: Box<BuiltPlan>,
    },
    Execute(ExecuteStmt),
    Simple(SimplePlan),
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub plan: BuiltPlan,
    pub names: Vec<FieldName>,
    pub visit_info: Vec<VisitInfo>,
    pub tables: Vec<TableEntry>,
    /// 需要执行的逻辑优化规则
    pub opt_flag: u64,
}

/// 计划构建器
pub trait PlanBuilder: Send + Sync + Debug {
    fn build(
        &self,
        vars: &mut SessionVars,
        stmt: &Stmt,
        is: &InfoSchema,
        hint_processor: &mut BlockHintProcessor,
    ) -> OptimizeResult<BuildOutput>;

    /// 点查快速计划，不满足条件时返回 None
    fn try_fast_plan(&self, vars: &mut SessionVars, stmt: &Stmt, is: &InfoSchema) -> Option<PointGetPlan> {
        fast_plan::try_fast_plan(vars, stmt, is)
    }
}

/// 默认计划构建器
#[derive(Debug)]
pub struct DefaultPlanBuilder {
    stats: Arc<dyn StatisticsProvider>,
}

const EXPLAIN_COLUMNS: &[&str] = &["id", "estRows", "task", "access object", "operator info"];

impl DefaultPlanBuilder {
    pub fn new(stats: Arc<dyn StatisticsProvider>) -> Self {
        Self { stats }
    }

    fn build_stmt(
        &self,
        vars: &mut SessionVars,
        stmt: &Stmt,
        is: &InfoSchema,
        hint_processor: &BlockHintProcessor,
        out: &mut BuildOutput,
    ) -> OptimizeResult<BuiltPlan> {
        match stmt {
            Stmt::Select(select) => {
                let hints = hint_processor.hints_for_block(1);
                let plan = self.build_select(vars, select, is, hints, out)?;
                Ok(BuiltPlan::Logical(plan))
            }
            Stmt::Explain(explain) => {
                let inner = self.build_stmt(vars, &explain.stmt, is, hint_processor, out)?;
                out.names = EXPLAIN_COLUMNS
                    .iter()
                    .map(|c| FieldName {
                        db: String::new(),
                        table: String::new(),
                        column: c.to_string(),
                    })
                    .collect();
                Ok(BuiltPlan::Explain {
                    analyze: explain.analyze,
                    inner: Box::new(inner),
                })
            }
            Stmt::Execute(exec) => Ok(BuiltPlan::Execute(exec.clone())),
            Stmt::Simple(simple) => Ok(BuiltPlan::Simple(SimplePlan {
                text: simple.text.clone(),
            })),
        }
    }

    fn build_select(
        &self,
        vars: &mut SessionVars,
        select: &SelectStmt,
        is: &InfoSchema,
        hints: &[TableOptimizerHint],
        out: &mut BuildOutput,
    ) -> OptimizeResult<LogicalPlan> {
        if select.from.len() > 2 {
            return Err(OptimizeError::UnsupportedStatement(format!(
                "FROM 中最多支持两张表, 得到 {} 张",
                select.from.len()
            )));
        }
        let mut select = select.clone();
        select.resolve_tables(is, &vars.current_db)?;

        let mut sources = Vec::with_capacity(select.from.len());
        for source in &select.from {
            let (db, table) = match (&source.db, &source.table_info) {
                (Some(db), Some(table)) => (db.clone(), Arc::clone(table)),
                _ => {
                    return Err(OptimizeError::Internal(format!(
                        "表 {} 未解析",
                        source.name
                    )))
                }
            };
            let as_name = source.as_name().to_string();
            if sources.iter().any(|ds: &DataSource| ds.as_name == as_name) {
                return Err(OptimizeError::UnsupportedStatement(format!(
                    "表名 {} 重复",
                    as_name
                )));
            }
            let possible_paths = get_possible_access_paths(
                &db,
                &table,
                &as_name,
                hints,
                &vars.isolation_read_engines,
                &mut vars.stmt_ctx.warnings,
            )?;
            let columns = table
                .visible_columns()
                .map(|c| PlanColumn {
                    unique_id: vars.alloc_column_id(),
                    col_id: c.id,
                    table: as_name.clone(),
                    name: c.name.clone(),
                    kind: c.kind,
                    is_handle: table.handle_col.as_deref() == Some(c.name.as_str()),
                })
                .collect();
            out.visit_info
                .push(VisitInfo::new(Privilege::Select, &db, &table.name));
            out.tables.push(TableEntry {
                db: db.clone(),
                table: table.name.clone(),
            });
            sources.push(DataSource {
                stats: self.stats.stats_or_pseudo(table.id),
                db,
                table,
                as_name,
                columns,
                pushed_conds: Vec::new(),
                possible_paths,
            });
        }

        self.check_columns(&select, &sources)?;

        let mut plan = match sources.len() {
            0 => LogicalPlan::new(vars.alloc_plan_id(), LogicalOp::TableDual { row_count: 1 }),
            _ => {
                let mut iter = sources.into_iter();
                let mut plan = match iter.next() {
                    Some(ds) => LogicalPlan::new(vars.alloc_plan_id(), LogicalOp::DataSource(ds)),
                    None => return Err(OptimizeError::Internal("缺少数据源".to_string())),
                };
                for ds in iter {
                    let right = LogicalPlan::new(vars.alloc_plan_id(), LogicalOp::DataSource(ds));
                    plan = LogicalPlan::new(
                        vars.alloc_plan_id(),
                        LogicalOp::Join {
                            conditions: Vec::new(),
                            left: Box::new(plan),
                            right: Box::new(right),
                        },
                    );
                }
                plan
            }
        };

        if let Some(cond) = &select.where_clause {
            let conditions = cond.split_conjuncts().into_iter().cloned().collect();
            plan = LogicalPlan::new(
                vars.alloc_plan_id(),
                LogicalOp::Selection {
                    conditions,
                    child: Box::new(plan),
                },
            );
            out.opt_flag |= FLAG_PREDICATE_PUSH_DOWN;
        }
        if !select.order_by.is_empty() {
            plan = LogicalPlan::new(
                vars.alloc_plan_id(),
                LogicalOp::Sort {
                    by_items: select.order_by.clone(),
                    child: Box::new(plan),
                },
            );
        }
        if let Some(limit) = select.limit {
            plan = LogicalPlan::new(
                vars.alloc_plan_id(),
                LogicalOp::Limit {
                    offset: limit.offset,
                    count: limit.count,
                    child: Box::new(plan),
                },
            );
        }

        let child_schema = plan.schema();
        let db_of = |table: &str| {
            select
                .from
                .iter()
                .find(|s| s.as_name() == table)
                .and_then(|s| s.db.clone())
                .unwrap_or_default()
        };
        let mut exprs = Vec::new();
        let mut schema = Vec::new();
        let mut names = Vec::new();
        let mut needs_projection = false;
        for field in &select.fields {
            match field {
                SelectField::Wildcard => {
                    for col in &child_schema {
                        exprs.push(Expr::Column(ColumnName {
                            table: Some(col.table.clone()),
                            name: col.name.clone(),
                        }));
                        schema.push(col.clone());
                        names.push(FieldName {
                            db: db_of(&col.table),
                            table: col.table.clone(),
                            column: col.name.clone(),
                        });
                    }
                }
                SelectField::Expr { expr, alias } => {
                    needs_projection = true;
                    let (col, name) = match expr {
                        Expr::Column(c) => {
                            let col = find_plan_column(&child_schema, c)?;
                            let name = FieldName {
                                db: db_of(&col.table),
                                table: col.table.clone(),
                                column: alias.clone().unwrap_or_else(|| col.name.clone()),
                            };
                            (col, name)
                        }
                        Expr::Literal(d) => {
                            let text = alias.clone().unwrap_or_else(|| d.to_string());
                            let col = PlanColumn {
                                unique_id: vars.alloc_column_id(),
                                col_id: 0,
                                table: String::new(),
                                name: text.clone(),
                                kind: literal_kind(d),
                                is_handle: false,
                            };
                            let name = FieldName {
                                db: String::new(),
                                table: String::new(),
                                column: text,
                            };
                            (col, name)
                        }
                        other => {
                            return Err(OptimizeError::UnsupportedStatement(format!(
                                "不支持的选择列表达式: {}",
                                other
                            )))
                        }
                    };
                    exprs.push(expr.clone());
                    schema.push(col);
                    names.push(name);
                }
            }
        }
        if needs_projection {
            plan = LogicalPlan::new(
                vars.alloc_plan_id(),
                LogicalOp::Projection {
                    exprs,
                    schema,
                    child: Box::new(plan),
                },
            );
        }
        out.names = names;
        out.opt_flag |= FLAG_PRUNE_COLUMNS;
        Ok(plan)
    }

    /// 所有列引用都必须唯一地落在某个数据源上
    fn check_columns(&self, select: &SelectStmt, sources: &[DataSource]) -> OptimizeResult<()> {
        let mut refs: Vec<&ColumnName> = Vec::new();
        if let Some(cond) = &select.where_clause {
            refs.extend(cond.columns());
        }
        for item in &select.order_by {
            refs.extend(item.expr.columns());
        }
        for field in &select.fields {
            if let SelectField::Expr { expr, .. } = field {
                refs.extend(expr.columns());
            }
        }
        for col in refs {
            match sources.iter().filter(|ds| ds.owns(col)).count() {
                0 => return Err(OptimizeError::UnknownColumn(col.to_string())),
                1 => {}
                _ => return Err(OptimizeError::AmbiguousColumn(col.to_string())),
            }
        }
        Ok(())
    }
}

fn find_plan_column(schema: &[PlanColumn], col: &ColumnName) -> OptimizeResult<PlanColumn> {
    schema
        .iter()
        .find(|c| {
            c.name.eq_ignore_ascii_case(&col.name)
                && col
                    .table
                    .as_deref()
                    .map_or(true, |t| t.eq_ignore_ascii_case(&c.table))
        })
        .cloned()
        .ok_or_else(|| OptimizeError::UnknownColumn(col.to_string()))
}

fn literal_kind(d: &Datum) -> FieldKind {
    match d {
        Datum::Int(_) | Datum::Null => FieldKind::Int,
        Datum::Float(_) => FieldKind::Float,
        Datum::String(_) => FieldKind::String,
    }
}

impl PlanBuilder for DefaultPlanBuilder {
    fn build(
        &self,
        vars: &mut SessionVars,
        stmt: &Stmt,
        is: &InfoSchema,
        hint_processor: &mut BlockHintProcessor,
    ) -> OptimizeResult<BuildOutput> {
        let mut out = BuildOutput {
            plan: BuiltPlan::Simple(SimplePlan {
                text: String::new(),
            }),
            names: Vec::new(),
            visit_info: Vec::new(),
            tables: Vec::new(),
            opt_flag: 0,
        };
        out.plan = self.build_stmt(vars, stmt, is, hint_processor, &mut out)?;
        let warnings = hint_processor.take_warnings();
        vars.stmt_ctx.append_warnings(warnings);
        Ok(out)
    }
}
