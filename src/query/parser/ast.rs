//! 语句 AST
//!
//! 由外部 SQL 解析器产出。优化器只消费其中与计划选择有关的部分：
//! 选择列、FROM 中的表、WHERE 条件、排序、LIMIT 以及优化器提示。

use crate::core::error::{OptimizeError, OptimizeResult};
use crate::core::schema::{InfoSchema, TableInfo};
use crate::core::types::{CompareOp, Datum};
use crate::query::parser::hint::{parse_hint_comment, TableOptimizerHint};
use std::fmt;
use std::sync::Arc;

/// 顶层语句
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Select(SelectStmt),
    Explain(ExplainStmt),
    Execute(ExecuteStmt),
    /// DDL、SET 等不需要代价优化的语句
    Simple(SimpleStmt),
}

impl Stmt {
    pub fn text(&self) -> &str {
        match self {
            Stmt::Select(s) => &s.text,
            Stmt::Explain(s) => &s.text,
            Stmt::Execute(s) => &s.text,
            Stmt::Simple(s) => &s.text,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Stmt::Select(_) => "Select",
            Stmt::Explain(_) => "Explain",
            Stmt::Execute(_) => "Execute",
            Stmt::Simple(_) => "Simple",
        }
    }

    /// 语句顶层的表级优化器提示
    ///
    /// EXPLAIN 返回被解释语句的提示，其余语句没有提示。
    pub fn table_hints(&self) -> &[TableOptimizerHint] {
        match self {
            Stmt::Select(s) => &s.hints,
            Stmt::Explain(e) => e.stmt.table_hints(),
            _ => &[],
        }
    }

    /// 查找 SELECT 主体，EXPLAIN 会被剥开
    pub fn select(&self) -> Option<&SelectStmt> {
        match self {
            Stmt::Select(s) => Some(s),
            Stmt::Explain(e) => match e.stmt.as_ref() {
                Stmt::Select(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplainStmt {
    pub text: String,
    pub analyze: bool,
    pub stmt: Box<Stmt>,
}

impl ExplainStmt {
    pub fn new(analyze: bool, stmt: Stmt) -> Self {
        let prefix = if analyze { "EXPLAIN ANALYZE " } else { "EXPLAIN " };
        Self {
            text: format!("{}{}", prefix, stmt.text()),
            analyze,
            stmt: Box::new(stmt),
        }
    }
}

/// EXECUTE name USING params
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteStmt {
    pub text: String,
    pub name: String,
    pub params: Vec<Datum>,
}

impl ExecuteStmt {
    pub fn new(name: &str, params: Vec<Datum>) -> Self {
        Self {
            text: format!("EXECUTE {}", name),
            name: name.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleStmt {
    pub text: String,
}

impl SimpleStmt {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// 列引用，可带表名（或别名）限定
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnName {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnName {
    /// 解析 `a` 或 `t.a`
    pub fn parse(s: &str) -> Self {
        match s.rsplit_once('.') {
            Some((table, name)) => Self {
                table: Some(table.to_lowercase()),
                name: name.to_lowercase(),
            },
            None => Self {
                table: None,
                name: s.to_lowercase(),
            },
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// 表达式
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnName),
    Literal(Datum),
    /// 预处理语句中的 `?`，下标从 0 开始
    Param(usize),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn col(name: &str) -> Self {
        Expr::Column(ColumnName::parse(name))
    }

    pub fn lit(value: impl Into<Datum>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// 拆分顶层 AND
    pub fn split_conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            match e {
                Expr::And(l, r) => {
                    stack.push(r);
                    stack.push(l);
                }
                other => out.push(other),
            }
        }
        out
    }

    /// 识别 `列 op 常量` 形式的比较，常量在左侧时翻转运算符
    pub fn as_column_compare(&self) -> Option<(&ColumnName, CompareOp, &Datum)> {
        match self {
            Expr::Compare { op, left, right } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), Expr::Literal(d)) => Some((c, *op, d)),
                (Expr::Literal(d), Expr::Column(c)) => Some((c, op.flip(), d)),
                _ => None,
            },
            _ => None,
        }
    }

    /// 收集引用到的列
    pub fn columns(&self) -> Vec<&ColumnName> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnName>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Expr::Literal(_) | Expr::Param(_) => {}
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            Expr::Param(i) => i + 1,
            Expr::Compare { left, right, .. } => left.param_count().max(right.param_count()),
            Expr::And(l, r) | Expr::Or(l, r) => l.param_count().max(r.param_count()),
            Expr::Column(_) | Expr::Literal(_) => 0,
        }
    }

    /// 用实际参数替换 `?`
    pub fn bind_params(&self, params: &[Datum]) -> OptimizeResult<Expr> {
        Ok(match self {
            Expr::Param(i) => match params.get(*i) {
                Some(d) => Expr::Literal(d.clone()),
                None => {
                    return Err(OptimizeError::WrongParamCount {
                        expected: i + 1,
                        actual: params.len(),
                    })
                }
            },
            Expr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: Box::new(left.bind_params(params)?),
                right: Box::new(right.bind_params(params)?),
            },
            Expr::And(l, r) => Expr::And(
                Box::new(l.bind_params(params)?),
                Box::new(r.bind_params(params)?),
            ),
            Expr::Or(l, r) => Expr::Or(
                Box::new(l.bind_params(params)?),
                Box::new(r.bind_params(params)?),
            ),
            other => other.clone(),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(d) => write!(f, "{}", d),
            Expr::Param(_) => write!(f, "?"),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::And(l, r) => write!(f, "{} and {}", l, r),
            Expr::Or(l, r) => write!(f, "({} or {})", l, r),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// FROM 中的一张表
#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    pub db: Option<String>,
    pub name: String,
    pub alias: Option<String>,
    /// 预处理阶段按 schema 解析后填入
    pub table_info: Option<Arc<TableInfo>>,
}

impl TableSource {
    /// 解析 `t` 或 `db.t`
    pub fn new(name: &str) -> Self {
        let (db, name) = match name.split_once('.') {
            Some((db, t)) => (Some(db.to_lowercase()), t.to_lowercase()),
            None => (None, name.to_lowercase()),
        };
        Self {
            db,
            name,
            alias: None,
            table_info: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_lowercase());
        self
    }

    /// 查询中引用这张表时使用的名字
    pub fn as_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByItem {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

/// SELECT 语句
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// 原始 SQL 文本
    pub text: String,
    pub hints: Vec<TableOptimizerHint>,
    pub fields: Vec<SelectField>,
    pub from: Vec<TableSource>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<ByItem>,
    pub limit: Option<Limit>,
}

impl SelectStmt {
    /// 以原始文本创建语句，文本中 `/*+ ... */` 里的提示会被解析出来
    ///
    /// 无法解析的提示被丢弃，与解析器对非法提示只给告警的行为一致。
    pub fn new(text: &str) -> Self {
        let (hints, _) = parse_hint_comment(text);
        Self {
            text: text.to_string(),
            hints,
            fields: vec![SelectField::Wildcard],
            from: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn from_table(mut self, table: TableSource) -> Self {
        self.from.push(table);
        self
    }

    /// 追加选择列，第一次调用会替换默认的 `*`
    pub fn field(mut self, expr: Expr, alias: Option<&str>) -> Self {
        if self.fields == [SelectField::Wildcard] {
            self.fields.clear();
        }
        self.fields.push(SelectField::Expr {
            expr,
            alias: alias.map(|a| a.to_lowercase()),
        });
        self
    }

    /// 追加 WHERE 条件，多次调用以 AND 连接
    pub fn filter(mut self, cond: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(prev) => prev.and(cond),
            None => cond,
        });
        self
    }

    pub fn order_by(mut self, expr: Expr, desc: bool) -> Self {
        self.order_by.push(ByItem { expr, desc });
        self
    }

    pub fn limit(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some(Limit { offset, count });
        self
    }

    /// 按 schema 解析 FROM 中的表
    pub fn resolve_tables(&mut self, is: &InfoSchema, current_db: &str) -> OptimizeResult<()> {
        for source in &mut self.from {
            let db = source.db.clone().unwrap_or_else(|| current_db.to_string());
            let info = is
                .table_by_name(&db, &source.name)
                .ok_or_else(|| OptimizeError::UnknownTable {
                    db: db.clone(),
                    table: source.name.clone(),
                })?;
            source.db = Some(db);
            source.table_info = Some(info);
        }
        Ok(())
    }

    pub fn param_count(&self) -> usize {
        self.where_clause
            .as_ref()
            .map(|e| e.param_count())
            .unwrap_or(0)
    }

    /// 返回参数替换后的副本
    pub fn bind_params(&self, params: &[Datum]) -> OptimizeResult<SelectStmt> {
        let expected = self.param_count();
        if expected != params.len() {
            return Err(OptimizeError::WrongParamCount {
                expected,
                actual: params.len(),
            });
        }
        let mut stmt = self.clone();
        if let Some(cond) = &self.where_clause {
            stmt.where_clause = Some(cond.bind_params(params)?);
        }
        Ok(stmt)
    }
}
