//! 单列取值区间
//!
//! 区间用于两处：统计信息按区间估算行数，访问路径按区间决定 seek 次数。

use super::datum::Datum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(CompareOp::Eq),
            "<" => Some(CompareOp::Lt),
            ">" => Some(CompareOp::Gt),
            "<=" => Some(CompareOp::Le),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }

    /// 交换左右操作数后的等价运算符，`1 < a` 等价于 `a > 1`
    pub fn flip(&self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

/// 取值区间，`None` 表示无界
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub low: Option<Datum>,
    pub low_exclude: bool,
    pub high: Option<Datum>,
    pub high_exclude: bool,
}

impl Range {
    pub fn full() -> Self {
        Self {
            low: None,
            low_exclude: false,
            high: None,
            high_exclude: false,
        }
    }

    pub fn point(value: Datum) -> Self {
        Self {
            low: Some(value.clone()),
            low_exclude: false,
            high: Some(value),
            high_exclude: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    pub fn is_point(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(l), Some(h)) => {
                !self.low_exclude && !self.high_exclude && l.compare(h) == Some(Ordering::Equal)
            }
            _ => false,
        }
    }

    /// 区间内是否可能包含值
    pub fn is_empty(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(l), Some(h)) => match l.compare(h) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => self.low_exclude || self.high_exclude,
                Some(Ordering::Less) => false,
                None => true,
            },
            _ => false,
        }
    }

    pub fn contains(&self, value: &Datum) -> bool {
        if let Some(low) = &self.low {
            match value.compare(low) {
                Some(Ordering::Less) | None => return false,
                Some(Ordering::Equal) if self.low_exclude => return false,
                _ => {}
            }
        }
        if let Some(high) = &self.high {
            match value.compare(high) {
                Some(Ordering::Greater) | None => return false,
                Some(Ordering::Equal) if self.high_exclude => return false,
                _ => {}
            }
        }
        true
    }

    /// 两个区间的交集，交集为空时返回 None
    pub fn intersect(&self, other: &Range) -> Option<Range> {
        let (low, low_exclude) = tighter_bound(
            (&self.low, self.low_exclude),
            (&other.low, other.low_exclude),
            Ordering::Greater,
        );
        let (high, high_exclude) = tighter_bound(
            (&self.high, self.high_exclude),
            (&other.high, other.high_exclude),
            Ordering::Less,
        );
        let range = Range {
            low,
            low_exclude,
            high,
            high_exclude,
        };
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }
}

fn tighter_bound(
    a: (&Option<Datum>, bool),
    b: (&Option<Datum>, bool),
    prefer: Ordering,
) -> (Option<Datum>, bool) {
    match (a.0, b.0) {
        (None, None) => (None, false),
        (Some(v), None) => (Some(v.clone()), a.1),
        (None, Some(v)) => (Some(v.clone()), b.1),
        (Some(x), Some(y)) => match x.compare(y) {
            Some(Ordering::Equal) => (Some(x.clone()), a.1 || b.1),
            Some(ord) if ord == prefer => (Some(x.clone()), a.1),
            _ => (Some(y.clone()), b.1),
        },
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.low_exclude { "(" } else { "[" };
        let close = if self.high_exclude { ")" } else { "]" };
        let low = self
            .low
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-inf".to_string());
        let high = self
            .high
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "+inf".to_string());
        write!(f, "{}{},{}{}", open, low, high, close)
    }
}

/// 由 `col op value` 构造区间
///
/// NULL 常量与任何值比较都为假，得到空区间列表。
pub fn build_column_range(op: CompareOp, value: &Datum) -> Vec<Range> {
    if value.is_null() {
        return Vec::new();
    }
    let v = Some(value.clone());
    let range = match op {
        CompareOp::Eq => Range::point(value.clone()),
        CompareOp::Lt => Range {
            high: v,
            high_exclude: true,
            ..Range::full()
        },
        CompareOp::Le => Range {
            high: v,
            ..Range::full()
        },
        CompareOp::Gt => Range {
            low: v,
            low_exclude: true,
            ..Range::full()
        },
        CompareOp::Ge => Range {
            low: v,
            ..Range::full()
        },
    };
    vec![range]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_range_null_is_empty() {
        assert!(build_column_range(CompareOp::Eq, &Datum::Null).is_empty());
        assert_eq!(build_column_range(CompareOp::Ge, &Datum::Int(1)).len(), 1);
    }

    #[test]
    fn test_intersect() {
        let a = build_column_range(CompareOp::Gt, &Datum::Int(1)).remove(0);
        let b = build_column_range(CompareOp::Le, &Datum::Int(5)).remove(0);
        let r = a.intersect(&b).expect("非空交集");
        assert_eq!(r.to_string(), "(1,5]");
        assert!(r.contains(&Datum::Int(5)));
        assert!(!r.contains(&Datum::Int(1)));

        let c = build_column_range(CompareOp::Lt, &Datum::Int(1)).remove(0);
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_point_and_flip() {
        assert!(Range::point(Datum::Int(7)).is_point());
        assert!(!Range::full().is_point());
        assert_eq!(CompareOp::Lt.flip(), CompareOp::Gt);
        assert_eq!(CompareOp::parse(">="), Some(CompareOp::Ge));
    }
}
