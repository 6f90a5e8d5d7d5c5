//! 表级优化器提示
//!
//! 提示写在 SELECT 关键字后的 `/*+ ... */` 注释中，例如
//! `select /*+ use_index(t idx_a), memory_quota(10 MB) */ * from t`。
//! 这里负责提示文本和 `TableOptimizerHint` 之间的双向转换：
//! 绑定 SQL 需要解析出提示，物理计划需要把提示还原为文本。

use crate::core::error::HintWarning;
use crate::core::types::StoreType;
use std::fmt;

const MB: i64 = 1024 * 1024;
const GB: i64 = 1024 * MB;

/// 提示中引用的表，`db.t@qb`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HintTable {
    pub db: Option<String>,
    pub table: String,
    pub qb_name: Option<String>,
}

impl HintTable {
    pub fn new(table: &str) -> Self {
        Self {
            db: None,
            table: table.to_lowercase(),
            qb_name: None,
        }
    }
}

impl fmt::Display for HintTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(db) = &self.db {
            write!(f, "{}.", db)?;
        }
        write!(f, "{}", self.table)?;
        if let Some(qb) = &self.qb_name {
            write!(f, "@{}", qb)?;
        }
        Ok(())
    }
}

/// 提示携带的取值
#[derive(Debug, Clone, PartialEq)]
pub enum HintData {
    None,
    /// 字节数，MEMORY_QUOTA 使用
    Bytes(i64),
    /// 毫秒数，MAX_EXECUTION_TIME 使用
    Millis(u64),
    Bool(bool),
    Store(StoreType),
}

/// 一条表级优化器提示
#[derive(Debug, Clone, PartialEq)]
pub struct TableOptimizerHint {
    /// 小写提示名
    pub name: String,
    pub qb_name: Option<String>,
    pub tables: Vec<HintTable>,
    pub indexes: Vec<String>,
    pub data: HintData,
}

impl TableOptimizerHint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            qb_name: None,
            tables: Vec::new(),
            indexes: Vec::new(),
            data: HintData::None,
        }
    }

    /// `use_index(t idx ...)`，索引为空表示走表扫描
    pub fn use_index(table: &str, indexes: &[&str]) -> Self {
        let mut hint = Self::new("use_index");
        hint.tables.push(HintTable::new(table));
        hint.indexes = indexes.iter().map(|i| i.to_lowercase()).collect();
        hint
    }

    pub fn read_from_storage(store: StoreType, tables: &[&str]) -> Self {
        let mut hint = Self::new("read_from_storage");
        hint.tables = tables.iter().map(|t| HintTable::new(t)).collect();
        hint.data = HintData::Store(store);
        hint
    }

    pub fn memory_quota(bytes: i64) -> Self {
        let mut hint = Self::new("memory_quota");
        hint.data = HintData::Bytes(bytes);
        hint
    }

    pub fn max_execution_time(millis: u64) -> Self {
        let mut hint = Self::new("max_execution_time");
        hint.data = HintData::Millis(millis);
        hint
    }

    pub fn with_data(mut self, data: HintData) -> Self {
        self.data = data;
        self
    }

    pub fn with_qb_name(mut self, qb: &str) -> Self {
        self.qb_name = Some(qb.to_lowercase());
        self
    }

    fn is_index_hint(name: &str) -> bool {
        matches!(name, "use_index" | "ignore_index" | "use_index_merge")
    }
}

impl fmt::Display for TableOptimizerHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if let Some(qb) = &self.qb_name {
            if self.name == "qb_name" {
                write!(f, "{}", qb)?;
                return write!(f, ")");
            }
            write!(f, "@{} ", qb)?;
        }
        let tables = self
            .tables
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.data {
            HintData::Bytes(bytes) => write!(f, "{} MB", bytes / MB)?,
            HintData::Millis(ms) => write!(f, "{}", ms)?,
            HintData::Bool(b) => write!(f, "{}", b)?,
            HintData::Store(store) => write!(f, "{}[{}]", store, tables)?,
            HintData::None if Self::is_index_hint(&self.name) => {
                write!(f, "{}", tables)?;
                if !self.indexes.is_empty() {
                    write!(f, " {}", self.indexes.join(", "))?;
                }
            }
            HintData::None => write!(f, "{}", tables)?,
        }
        write!(f, ")")
    }
}

/// 把提示还原为文本，多个提示以 ", " 连接
pub fn restore_optimizer_hints(hints: &[TableOptimizerHint]) -> String {
    hints
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 定位 SQL 文本中的提示注释并解析
///
/// 没有 `/*+` 注释时返回空列表。
pub fn parse_hint_comment(sql: &str) -> (Vec<TableOptimizerHint>, Vec<HintWarning>) {
    match hint_comment_span(sql) {
        Some((start, end)) => parse_hints(&sql[start + 3..end]),
        None => (Vec::new(), Vec::new()),
    }
}

/// 提示注释在文本中的字节区间 `[start, end)`，`start` 指向 `/*+`，`end` 指向 `*/`
pub fn hint_comment_span(sql: &str) -> Option<(usize, usize)> {
    let start = sql.find("/*+")?;
    let end = sql[start + 3..].find("*/")? + start + 3;
    Some((start, end))
}

/// 解析提示注释的内容（不含 `/*+` 和 `*/`）
///
/// 单条提示无法解析时跳过并产生告警，不影响其余提示。
pub fn parse_hints(text: &str) -> (Vec<TableOptimizerHint>, Vec<HintWarning>) {
    let mut hints = Vec::new();
    let mut warnings = Vec::new();
    let mut parser = HintParser::new(tokenize(text));

    while !parser.at_end() {
        if parser.eat_symbol(',') {
            continue;
        }
        match parser.parse_hint() {
            Ok(mut parsed) => hints.append(&mut parsed),
            Err(raw) => {
                warnings.push(HintWarning::Unparsable(raw));
                parser.skip_past_close();
            }
        }
    }
    (hints, warnings)
}

#[derive(Debug, Clone, PartialEq)]
enum HintToken {
    Ident(String),
    Number(i64),
    Symbol(char),
}

impl fmt::Display for HintToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintToken::Ident(s) => write!(f, "{}", s),
            HintToken::Number(n) => write!(f, "{}", n),
            HintToken::Symbol(c) => write!(f, "{}", c),
        }
    }
}

fn tokenize(text: &str) -> Vec<HintToken> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if ch == '`' {
            chars.next();
            let mut ident = String::new();
            for c in chars.by_ref() {
                if c == '`' {
                    break;
                }
                ident.push(c);
            }
            tokens.push(HintToken::Ident(ident.to_lowercase()));
        } else if ch.is_ascii_digit() || ch == '-' {
            let mut num = String::new();
            num.push(ch);
            chars.next();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    num.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            match num.parse::<i64>() {
                Ok(n) => tokens.push(HintToken::Number(n)),
                Err(_) => tokens.push(HintToken::Ident(num)),
            }
        } else if ch.is_alphanumeric() || ch == '_' || ch == '$' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(HintToken::Ident(ident.to_lowercase()));
        } else {
            tokens.push(HintToken::Symbol(ch));
            chars.next();
        }
    }
    tokens
}

struct HintParser {
    tokens: Vec<HintToken>,
    pos: usize,
}

impl HintParser {
    fn new(tokens: Vec<HintToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&HintToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<HintToken> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_symbol(&mut self, sym: char) -> bool {
        if self.peek() == Some(&HintToken::Symbol(sym)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.next() {
            Some(HintToken::Ident(s)) => Ok(s),
            other => Err(other.map(|t| t.to_string()).unwrap_or_default()),
        }
    }

    /// 出错后跳到当前提示的右括号之后
    fn skip_past_close(&mut self) {
        let mut depth = 0usize;
        while let Some(tok) = self.next() {
            match tok {
                HintToken::Symbol('(') => depth += 1,
                HintToken::Symbol(')') => {
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    fn parse_hint(&mut self) -> Result<Vec<TableOptimizerHint>, String> {
        let name = self.expect_ident()?;
        if !self.eat_symbol('(') {
            return Err(name);
        }
        let mut hint = TableOptimizerHint::new(&name);
        if self.eat_symbol('@') {
            hint.qb_name = Some(self.expect_ident().map_err(|_| name.clone())?);
        }

        let result = match name.as_str() {
            "memory_quota" => self.parse_memory_quota(hint).map(|h| vec![h]),
            "max_execution_time" => match self.next() {
                Some(HintToken::Number(n)) if n >= 0 => {
                    Ok(vec![hint.with_data(HintData::Millis(n as u64))])
                }
                _ => Err(name.clone()),
            },
            "use_toja" | "use_cascades" => match self.expect_ident()?.as_str() {
                "true" => Ok(vec![hint.with_data(HintData::Bool(true))]),
                "false" => Ok(vec![hint.with_data(HintData::Bool(false))]),
                _ => Err(name.clone()),
            },
            "qb_name" => {
                hint.qb_name = Some(self.expect_ident()?);
                Ok(vec![hint])
            }
            "read_from_storage" => self.parse_storage_groups(&hint),
            n if TableOptimizerHint::is_index_hint(n) => {
                hint.tables.push(self.parse_table()?);
                while let Some(HintToken::Ident(_)) = self.peek() {
                    hint.indexes.push(self.expect_ident()?);
                    self.eat_symbol(',');
                }
                Ok(vec![hint])
            }
            _ => {
                while let Some(HintToken::Ident(_)) = self.peek() {
                    hint.tables.push(self.parse_table()?);
                    self.eat_symbol(',');
                }
                Ok(vec![hint])
            }
        }
        .map_err(|_| name.clone())?;

        if !self.eat_symbol(')') {
            return Err(name);
        }
        Ok(result)
    }

    fn parse_memory_quota(&mut self, hint: TableOptimizerHint) -> Result<TableOptimizerHint, String> {
        let n = match self.next() {
            Some(HintToken::Number(n)) => n,
            _ => return Err("memory_quota".to_string()),
        };
        let unit = match self.expect_ident()?.as_str() {
            "mb" => MB,
            "gb" => GB,
            other => return Err(other.to_string()),
        };
        Ok(hint.with_data(HintData::Bytes(n.saturating_mul(unit))))
    }

    fn parse_storage_groups(&mut self, base: &TableOptimizerHint) -> Result<Vec<TableOptimizerHint>, String> {
        let mut hints = Vec::new();
        while let Some(HintToken::Ident(_)) = self.peek() {
            let store: StoreType = self.expect_ident()?.parse()?;
            if !self.eat_symbol('[') {
                return Err(store.to_string());
            }
            let mut hint = base.clone().with_data(HintData::Store(store));
            while let Some(HintToken::Ident(_)) = self.peek() {
                hint.tables.push(self.parse_table()?);
                self.eat_symbol(',');
            }
            if !self.eat_symbol(']') {
                return Err(store.to_string());
            }
            hints.push(hint);
            self.eat_symbol(',');
        }
        Ok(hints)
    }

    fn parse_table(&mut self) -> Result<HintTable, String> {
        let first = self.expect_ident()?;
        let mut table = HintTable::new(&first);
        if self.eat_symbol('.') {
            table.db = Some(first);
            table.table = self.expect_ident()?;
        }
        if self.eat_symbol('@') {
            table.qb_name = Some(self.expect_ident()?);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_restore_index_hints() {
        let (hints, warnings) = parse_hints("USE_INDEX(t idx_a, idx_b), ignore_index(@sel_2 test.t2 idx_c)");
        assert!(warnings.is_empty());
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].indexes, vec!["idx_a", "idx_b"]);
        assert_eq!(hints[1].qb_name.as_deref(), Some("sel_2"));
        assert_eq!(hints[1].tables[0].db.as_deref(), Some("test"));
        assert_eq!(
            restore_optimizer_hints(&hints),
            "use_index(t idx_a, idx_b), ignore_index(@sel_2 test.t2 idx_c)"
        );
    }

    #[test]
    fn test_parse_statement_level_hints() {
        let (hints, warnings) = parse_hints(
            "memory_quota(10 MB) max_execution_time(1000) use_toja(false) no_index_merge() read_consistent_replica()",
        );
        assert!(warnings.is_empty());
        assert_eq!(hints[0].data, HintData::Bytes(10 * MB));
        assert_eq!(hints[1].data, HintData::Millis(1000));
        assert_eq!(hints[2].data, HintData::Bool(false));
        assert_eq!(hints[3].name, "no_index_merge");
        assert_eq!(hints[4].name, "read_consistent_replica");
    }

    #[test]
    fn test_read_from_storage_groups() {
        let (hints, _) = parse_hints("read_from_storage(tiflash[t1, t2], tikv[t3])");
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].data, HintData::Store(StoreType::TiFlash));
        assert_eq!(hints[0].tables.len(), 2);
        assert_eq!(hints[1].to_string(), "read_from_storage(tikv[t3])");
    }

    #[test]
    fn test_negative_memory_quota_is_parsed() {
        let (hints, _) = parse_hints("memory_quota(-1 MB)");
        assert_eq!(hints[0].data, HintData::Bytes(-MB));
    }

    #[test]
    fn test_bad_hint_is_skipped_with_warning() {
        let (hints, warnings) = parse_hints("memory_quota(10 TB), use_index(t)");
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].to_string(), "use_index(t)");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_parse_hint_comment() {
        let (hints, _) = parse_hint_comment("select /*+ use_index(t idx_a) */ * from t");
        assert_eq!(hints, vec![TableOptimizerHint::use_index("t", &["idx_a"])]);
        assert!(parse_hint_comment("select * from t").0.is_empty());
    }
}
