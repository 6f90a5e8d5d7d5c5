//! 等深直方图
//!
//! 每个桶记录上下界、累计行数和上界值的重复次数。
//! 桶内的值按线性插值估算，字符串无法插值时取桶的一半。

use crate::core::error::{OptimizeError, OptimizeResult};
use crate::core::types::Datum;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub lower: Datum,
    pub upper: Datum,
    /// 截至本桶（含）的累计行数
    pub count: f64,
    /// 上界值出现的次数
    pub repeat: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Histogram {
    pub ndv: i64,
    pub null_count: i64,
    pub buckets: Vec<Bucket>,
}

/// 值在直方图边界上的位置
enum Position {
    /// 小于所有桶
    Before,
    /// 落在第 n 个桶内，bool 表示是否等于上界
    Within(usize, bool),
    /// 大于所有桶
    After,
}

impl Histogram {
    pub fn new(ndv: i64, null_count: i64) -> Self {
        Self {
            ndv,
            null_count,
            buckets: Vec::new(),
        }
    }

    /// 追加一个桶，`count` 为本桶自身的行数
    pub fn append_bucket(mut self, lower: Datum, upper: Datum, count: f64, repeat: f64) -> Self {
        let prev = self.buckets.last().map(|b| b.count).unwrap_or(0.0);
        self.buckets.push(Bucket {
            lower,
            upper,
            count: prev + count,
            repeat,
        });
        self
    }

    pub fn not_null_count(&self) -> f64 {
        self.buckets.last().map(|b| b.count).unwrap_or(0.0)
    }

    pub fn total_row_count(&self) -> f64 {
        self.not_null_count() + self.null_count as f64
    }

    fn cmp(a: &Datum, b: &Datum) -> OptimizeResult<Ordering> {
        a.compare(b).ok_or_else(|| {
            OptimizeError::Statistics(format!("无法比较 {} 与 {}", a, b))
        })
    }

    fn locate(&self, value: &Datum) -> OptimizeResult<Position> {
        let first = match self.buckets.first() {
            Some(b) => b,
            None => return Ok(Position::After),
        };
        if Self::cmp(value, &first.lower)? == Ordering::Less {
            return Ok(Position::Before);
        }
        for (i, bucket) in self.buckets.iter().enumerate() {
            match Self::cmp(value, &bucket.upper)? {
                // 落在两个桶之间的空隙时也归到后一个桶
                Ordering::Less => return Ok(Position::Within(i, false)),
                Ordering::Equal => return Ok(Position::Within(i, true)),
                Ordering::Greater => {}
            }
        }
        Ok(Position::After)
    }

    pub fn out_of_range(&self, value: &Datum) -> bool {
        match (self.buckets.first(), self.buckets.last()) {
            (Some(first), Some(last)) => {
                value.compare(&first.lower) == Some(Ordering::Less)
                    || value.compare(&last.upper) == Some(Ordering::Greater)
            }
            _ => true,
        }
    }

    /// 等值行数
    pub fn equal_row_count(&self, value: &Datum) -> OptimizeResult<f64> {
        if self.ndv <= 0 {
            return Ok(0.0);
        }
        match self.locate(value)? {
            Position::Within(i, true) => Ok(self.buckets[i].repeat),
            Position::Within(i, false) => {
                if Self::cmp(value, &self.buckets[i].lower)? == Ordering::Less {
                    Ok(0.0)
                } else {
                    Ok(self.not_null_count() / self.ndv as f64)
                }
            }
            Position::Before | Position::After => Ok(0.0),
        }
    }

    /// 严格小于 value 的行数
    pub fn less_row_count(&self, value: &Datum) -> OptimizeResult<f64> {
        if self.buckets.is_empty() {
            return Ok(0.0);
        }
        match self.locate(value)? {
            Position::Before => Ok(0.0),
            Position::After => Ok(self.not_null_count()),
            Position::Within(i, at_upper) => {
                let bucket = &self.buckets[i];
                let pre = if i > 0 { self.buckets[i - 1].count } else { 0.0 };
                if at_upper {
                    return Ok(bucket.count - bucket.repeat);
                }
                if Self::cmp(value, &bucket.lower)? != Ordering::Greater {
                    return Ok(pre);
                }
                let fraction = Self::fraction(bucket, value);
                Ok(pre + fraction * (bucket.count - bucket.repeat - pre))
            }
        }
    }

    /// [low, high) 的行数
    pub fn between_row_count(&self, low: &Datum, high: &Datum) -> OptimizeResult<f64> {
        let less_low = self.less_row_count(low)?;
        let less_high = self.less_row_count(high)?;
        if less_low >= less_high && self.ndv > 0 {
            return Ok(self.not_null_count() / self.ndv as f64);
        }
        Ok((less_high - less_low).max(0.0))
    }

    fn fraction(bucket: &Bucket, value: &Datum) -> f64 {
        match (bucket.lower.as_f64(), bucket.upper.as_f64(), value.as_f64()) {
            (Some(l), Some(u), Some(v)) if u > l => ((v - l) / (u - l)).clamp(0.0, 1.0),
            _ => 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0..100 每个值出现 10 次，分 4 个桶
    fn uniform() -> Histogram {
        Histogram::new(100, 5)
            .append_bucket(Datum::Int(0), Datum::Int(24), 250.0, 10.0)
            .append_bucket(Datum::Int(25), Datum::Int(49), 250.0, 10.0)
            .append_bucket(Datum::Int(50), Datum::Int(74), 250.0, 10.0)
            .append_bucket(Datum::Int(75), Datum::Int(99), 250.0, 10.0)
    }

    #[test]
    fn test_counts() {
        let h = uniform();
        assert_eq!(h.not_null_count(), 1000.0);
        assert_eq!(h.total_row_count(), 1005.0);
    }

    #[test]
    fn test_equal_row_count() {
        let h = uniform();
        assert_eq!(h.equal_row_count(&Datum::Int(24)).unwrap(), 10.0);
        assert_eq!(h.equal_row_count(&Datum::Int(30)).unwrap(), 10.0);
        assert_eq!(h.equal_row_count(&Datum::Int(1000)).unwrap(), 0.0);
    }

    #[test]
    fn test_less_row_count() {
        let h = uniform();
        assert_eq!(h.less_row_count(&Datum::Int(-1)).unwrap(), 0.0);
        assert_eq!(h.less_row_count(&Datum::Int(500)).unwrap(), 1000.0);
        assert_eq!(h.less_row_count(&Datum::Int(49)).unwrap(), 490.0);
        let mid = h.less_row_count(&Datum::Int(60)).unwrap();
        assert!(mid > 500.0 && mid < 740.0);
    }

    #[test]
    fn test_incomparable_value_fails() {
        let h = uniform();
        assert!(h.less_row_count(&Datum::from("x")).is_err());
    }
}
