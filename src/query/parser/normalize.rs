//! SQL 规范化与摘要
//!
//! 规范化去掉注释（包括提示注释）、把常量替换为 `?`、折叠 IN 列表，
//! 统一为小写并以单个空格连接 token。同一形态、不同常量的语句得到相同的规范化文本，
//! 摘要是规范化文本的 64 位哈希。

use std::iter::Peekable;
use std::str::Chars;

/// 会跟在一元正负号前面的关键字，出现在这些关键字之后的 `-1` 视为一个常量
const VALUE_PREFIX_KEYWORDS: &[&str] = &[
    "select", "where", "and", "or", "not", "in", "by", "limit", "values", "set", "on", "when",
    "then", "else", "between", "like", "is", "offset", "having", "return",
];

#[derive(Debug, Clone, PartialEq)]
enum SqlToken {
    Word(String),
    Literal,
    Symbol(String),
}

impl SqlToken {
    fn text(&self) -> &str {
        match self {
            SqlToken::Word(w) => w,
            SqlToken::Literal => "?",
            SqlToken::Symbol(s) => s,
        }
    }
}

struct SqlLexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> SqlLexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_line(&mut self) {
        for ch in self.chars.by_ref() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let mut prev = '\0';
        for ch in self.chars.by_ref() {
            if prev == '*' && ch == '/' {
                break;
            }
            prev = ch;
        }
    }

    fn read_quoted(&mut self, quote: char) -> String {
        let mut out = String::new();
        while let Some(ch) = self.chars.next() {
            if ch == '\\' {
                if let Some(escaped) = self.chars.next() {
                    out.push(escaped);
                }
            } else if ch == quote {
                if self.chars.peek() == Some(&quote) {
                    out.push(quote);
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                out.push(ch);
            }
        }
        out
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, first: char, pred: F) -> String {
        let mut out = String::new();
        out.push(first);
        while let Some(&ch) = self.chars.peek() {
            if pred(ch) {
                out.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }

    fn tokenize(mut self) -> Vec<SqlToken> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.chars.next() {
            match ch {
                c if c.is_whitespace() => {}
                '#' => self.skip_line(),
                '-' if self.chars.peek() == Some(&'-') => self.skip_line(),
                '/' if self.chars.peek() == Some(&'*') => {
                    self.chars.next();
                    self.skip_block_comment();
                }
                '\'' | '"' => {
                    self.read_quoted(ch);
                    tokens.push(SqlToken::Literal);
                }
                '`' => {
                    let ident = self.read_quoted('`');
                    tokens.push(SqlToken::Word(ident.to_lowercase()));
                }
                '?' => tokens.push(SqlToken::Literal),
                c if c.is_ascii_digit() => {
                    self.read_while(c, |x| x.is_ascii_alphanumeric() || x == '.');
                    tokens.push(SqlToken::Literal);
                }
                '.' if self.chars.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_while(ch, |x| x.is_ascii_digit());
                    tokens.push(SqlToken::Literal);
                }
                c if c.is_alphanumeric() || c == '_' || c == '$' => {
                    let word = self.read_while(c, |x| x.is_alphanumeric() || x == '_' || x == '$');
                    let lower = word.to_lowercase();
                    // x'0A' / b'01' 形式的常量
                    if (lower == "x" || lower == "b") && self.chars.peek() == Some(&'\'') {
                        self.chars.next();
                        self.read_quoted('\'');
                        tokens.push(SqlToken::Literal);
                    } else {
                        tokens.push(SqlToken::Word(lower));
                    }
                }
                '<' | '>' | '!' | '=' | ':' | '|' | '&' => {
                    let op = self.read_while(ch, |x| matches!(x, '=' | '>' | '<' | '|' | '&'));
                    tokens.push(SqlToken::Symbol(op));
                }
                other => tokens.push(SqlToken::Symbol(other.to_string())),
            }
        }
        tokens
    }
}

/// 一元正负号与后面的常量合并
fn fold_signed_literals(tokens: Vec<SqlToken>) -> Vec<SqlToken> {
    let mut out: Vec<SqlToken> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        let is_sign = matches!(&tok, SqlToken::Symbol(s) if s == "-" || s == "+");
        if is_sign && iter.peek() == Some(&SqlToken::Literal) {
            let unary = match out.last() {
                None => true,
                Some(SqlToken::Symbol(s)) => s != ")",
                Some(SqlToken::Word(w)) => VALUE_PREFIX_KEYWORDS.contains(&w.as_str()),
                Some(SqlToken::Literal) => false,
            };
            if unary {
                continue;
            }
        }
        out.push(tok);
    }
    out
}

/// `in (?, ?, ?)` 折叠为 `in ( ... )`
fn fold_in_lists(tokens: Vec<SqlToken>) -> Vec<SqlToken> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        out.push(tokens[i].clone());
        let is_in = matches!(&tokens[i], SqlToken::Word(w) if w == "in");
        let opens = matches!(tokens.get(i + 1), Some(SqlToken::Symbol(s)) if s == "(");
        if is_in && opens {
            let mut j = i + 2;
            let mut only_literals = true;
            while j < tokens.len() {
                match &tokens[j] {
                    SqlToken::Symbol(s) if s == ")" => break,
                    SqlToken::Literal => {}
                    SqlToken::Symbol(s) if s == "," => {}
                    _ => {
                        only_literals = false;
                        break;
                    }
                }
                j += 1;
            }
            if only_literals && j < tokens.len() && j > i + 2 {
                out.push(SqlToken::Symbol("(".to_string()));
                out.push(SqlToken::Symbol("...".to_string()));
                out.push(SqlToken::Symbol(")".to_string()));
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// 规范化 SQL 文本
pub fn normalize(sql: &str) -> String {
    let mut tokens = fold_in_lists(fold_signed_literals(SqlLexer::new(sql).tokenize()));
    while matches!(tokens.last(), Some(SqlToken::Symbol(s)) if s == ";") {
        tokens.pop();
    }

    let mut out = String::with_capacity(sql.len());
    let mut prev: Option<&str> = None;
    for tok in &tokens {
        let text = tok.text();
        let glue = matches!(text, "," | ".") || prev == Some(".");
        if prev.is_some() && !glue {
            out.push(' ');
        }
        out.push_str(text);
        prev = Some(text);
    }
    out
}

/// 规范化文本的摘要，16 位十六进制
pub fn digest_normalized(normalized: &str) -> String {
    format!("{:016x}", murmur64a(normalized.as_bytes(), 0))
}

/// 返回 (规范化文本, 摘要)
pub fn normalize_digest(sql: &str) -> (String, String) {
    let normalized = normalize(sql);
    let digest = digest_normalized(&normalized);
    (normalized, digest)
}

/// MurmurHash64A
fn murmur64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut h = seed ^ (data.len() as u64).wrapping_mul(M);
    let mut chunks = data.chunks_exact(8);
    for chunk in chunks.by_ref() {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(buf);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, b) in tail.iter().enumerate() {
            h ^= (*b as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^ (h >> R)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_and_hints_are_removed() {
        assert_eq!(
            normalize("SELECT /*+ use_index(t idx_a) */ * FROM `t` WHERE a = 'x' AND b > -1.5;"),
            "select * from t where a = ? and b > ?"
        );
    }

    #[test]
    fn test_limit_and_qualified_names() {
        assert_eq!(
            normalize("select t.a, t.b from test.t limit 100000, 100"),
            "select t.a, t.b from test.t limit ?, ?"
        );
    }

    #[test]
    fn test_binary_minus_is_kept() {
        assert_eq!(normalize("select a - 1 from t"), "select a - ? from t");
        assert_eq!(normalize("select a from t where a = -1"), "select a from t where a = ?");
    }

    #[test]
    fn test_in_list_folding() {
        let a = normalize("select * from t where a in (1, 2, 3)");
        let b = normalize("select * from t where a IN (4)");
        assert_eq!(a, "select * from t where a in ( ... )");
        assert_eq!(a, b);
        // 子查询不折叠
        assert_eq!(
            normalize("select * from t where a in (select b from s)"),
            "select * from t where a in ( select b from s )"
        );
    }

    #[test]
    fn test_digest_is_stable_and_distinct() {
        let (n1, d1) = normalize_digest("select * from t where a = 1");
        let (n2, d2) = normalize_digest("select  *  from t -- comment\n where a = 20");
        assert_eq!(n1, n2);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 16);

        let (_, d3) = normalize_digest("select * from t where b = 1");
        assert_ne!(d1, d3);
    }
}
