//! 表级统计信息
//!
//! 提供两类估算：
//! - 行宽：`avg_row_size` / `table_avg_row_size` / `index_avg_row_size`
//! - 行数：`column_row_count` 按取值区间估算
//!
//! 统计信息缺失或行数为 0 时退化为伪统计信息，估算从不因为缺失而失败。

use super::histogram::Histogram;
use crate::core::error::{OptimizeError, OptimizeResult};
use crate::core::schema::FieldKind;
use crate::core::types::{Datum, Range, StoreType};
use std::cmp::Ordering;
use std::collections::HashMap;

/// 伪统计信息的表行数
pub const PSEUDO_ROW_COUNT: f64 = 10000.0;
/// 伪统计信息的列宽
pub const PSEUDO_COL_SIZE: f64 = 8.0;
/// 等值条件的伪选择率 1/1000
pub const PSEUDO_EQUAL_RATE: f64 = 1000.0;
/// 单边范围条件的伪选择率 1/3
pub const PSEUDO_LESS_RATE: f64 = 3.0;
/// 双边范围条件的伪选择率 1/40
pub const PSEUDO_BETWEEN_RATE: f64 = 40.0;

/// 表前缀(1) + 表ID(8) + 行前缀(2) + 句柄(8)
const RECORD_ROW_KEY_LEN: f64 = 19.0;
/// 表前缀(1) + 表ID(8) + 索引前缀(2) + 索引ID(8)
const INDEX_KEY_PREFIX_LEN: f64 = 19.0;
/// 超出直方图范围的区间，按修改行数的 1/4 估算
const OUT_OF_RANGE_BETWEEN_RATE: f64 = 4.0;

/// 单列统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStatistics {
    pub column_id: i64,
    pub kind: FieldKind,
    pub histogram: Histogram,
    /// 该列所有值的总字节数
    pub tot_col_size: i64,
    pub is_handle: bool,
}

impl ColumnStatistics {
    pub fn new(column_id: i64, kind: FieldKind, histogram: Histogram) -> Self {
        Self {
            column_id,
            kind,
            histogram,
            tot_col_size: 0,
            is_handle: false,
        }
    }

    pub fn with_tot_col_size(mut self, size: i64) -> Self {
        self.tot_col_size = size;
        self
    }

    pub fn as_handle(mut self) -> Self {
        self.is_handle = true;
        self
    }

    pub fn ndv(&self) -> i64 {
        self.histogram.ndv
    }

    pub fn null_count(&self) -> i64 {
        self.histogram.null_count
    }

    pub fn total_row_count(&self) -> f64 {
        self.histogram.total_row_count()
    }

    /// 按行编码（key 或 value）时的平均列宽
    pub fn avg_col_size(&self, count: f64, is_key: bool) -> f64 {
        if count <= 0.0 {
            return 0.0;
        }
        if self.is_handle {
            return 8.0;
        }
        let hist_count = self.total_row_count();
        let not_null_ratio = if hist_count > 0.0 {
            1.0 - self.null_count() as f64 / hist_count
        } else {
            1.0
        };
        match self.kind {
            FieldKind::Float | FieldKind::Datetime => return 8.0 * not_null_ratio,
            FieldKind::Int if is_key => return 8.0 * not_null_ratio,
            _ => {}
        }
        (self.tot_col_size as f64 / count * 100.0).round() / 100.0
    }

    /// 按 chunk 格式传输时的平均列宽
    pub fn avg_col_size_chunk_format(&self, count: f64) -> f64 {
        if count <= 0.0 {
            return 0.0;
        }
        if let Some(fixed) = self.kind.fixed_len() {
            return fixed;
        }
        // 变长列额外记录 8 字节的偏移
        let avg = self.tot_col_size as f64 / count;
        if avg < 1.0 {
            return (avg * 100.0).round() / 100.0 + 8.0;
        }
        ((avg - avg.log2()) * 100.0).round() / 100.0 + 8.0
    }

    fn equal_row_count(&self, value: &Datum, modify_count: i64) -> OptimizeResult<f64> {
        if self.ndv() > 0 && self.histogram.out_of_range(value) {
            return Ok(modify_count as f64 / self.ndv() as f64);
        }
        self.histogram.equal_row_count(value)
    }

    /// 按区间估算行数
    pub fn column_row_count(
        &self,
        ranges: &[Range],
        modify_count: i64,
        pk_is_handle: bool,
    ) -> OptimizeResult<f64> {
        let mut row_count = 0.0;
        for range in ranges {
            if range.is_point() {
                if pk_is_handle && self.is_handle {
                    row_count += 1.0;
                    continue;
                }
                if let Some(v) = &range.low {
                    row_count += self.equal_row_count(v, modify_count)?;
                }
                continue;
            }

            let less_low = match &range.low {
                Some(v) => self.histogram.less_row_count(v)?,
                None => 0.0,
            };
            let less_high = match &range.high {
                Some(v) => self.histogram.less_row_count(v)?,
                None => self.histogram.not_null_count(),
            };
            let mut cnt = if less_low >= less_high && range.low.is_some() && range.high.is_some() {
                match (&range.low, &range.high) {
                    (Some(l), Some(h)) => self.histogram.between_row_count(l, h)?,
                    _ => 0.0,
                }
            } else {
                (less_high - less_low).max(0.0)
            };

            let low_out = range
                .low
                .as_ref()
                .is_some_and(|v| self.histogram.out_of_range(v));
            let high_out = range
                .high
                .as_ref()
                .is_some_and(|v| self.histogram.out_of_range(v));
            if low_out || high_out {
                cnt += modify_count as f64 / OUT_OF_RANGE_BETWEEN_RATE;
            }
            // 上面得到的是 [low, high)，再按开闭调整边界
            if let Some(low) = &range.low {
                if range.low_exclude {
                    cnt -= self.equal_row_count(low, modify_count)?;
                }
            }
            if let Some(high) = &range.high {
                if !range.high_exclude {
                    cnt += self.equal_row_count(high, modify_count)?;
                }
            }
            row_count += cnt;
        }

        let total = self.total_row_count();
        if row_count > total {
            row_count = total;
        } else if row_count < 0.0 {
            row_count = 0.0;
        }
        Ok(row_count)
    }
}

/// 表统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatistics {
    pub table_id: i64,
    pub count: f64,
    pub modify_count: i64,
    /// 以列ID为键
    pub columns: HashMap<i64, ColumnStatistics>,
    pub pseudo: bool,
}

impl TableStatistics {
    pub fn new(table_id: i64, count: f64) -> Self {
        Self {
            table_id,
            count,
            modify_count: 0,
            columns: HashMap::new(),
            pseudo: false,
        }
    }

    /// 伪统计信息
    pub fn pseudo(table_id: i64) -> Self {
        Self {
            table_id,
            count: PSEUDO_ROW_COUNT,
            modify_count: 0,
            columns: HashMap::new(),
            pseudo: true,
        }
    }

    pub fn with_column(mut self, col: ColumnStatistics) -> Self {
        self.columns.insert(col.column_id, col);
        self
    }

    pub fn with_modify_count(mut self, modify_count: i64) -> Self {
        self.modify_count = modify_count;
        self
    }

    /// 伪统计信息下没有可用的列统计
    pub fn column(&self, column_id: i64) -> Option<&ColumnStatistics> {
        if self.pseudo {
            return None;
        }
        self.columns.get(&column_id)
    }

    /// 一组列的平均行宽
    ///
    /// `is_encoded_key` 表示按 key 编码，`is_for_scan` 为 false 时按 chunk 格式计算。
    pub fn avg_row_size(&self, col_ids: &[i64], is_encoded_key: bool, is_for_scan: bool) -> f64 {
        let n = col_ids.len() as f64;
        let mut size = 0.0;
        if self.pseudo || self.columns.is_empty() || self.count <= 0.0 {
            size = PSEUDO_COL_SIZE * n;
        } else {
            for id in col_ids {
                let col = match self.columns.get(id) {
                    Some(c) => c,
                    None => {
                        size += PSEUDO_COL_SIZE;
                        continue;
                    }
                };
                // 旧版本统计信息没有记录总列宽
                if !col.is_handle
                    && col.tot_col_size == 0
                    && col.null_count() as f64 != self.count
                {
                    size += PSEUDO_COL_SIZE;
                    continue;
                }
                if is_for_scan {
                    size += col.avg_col_size(self.count, is_encoded_key);
                } else {
                    size += col.avg_col_size_chunk_format(self.count);
                }
            }
        }
        if !is_for_scan {
            // 每列 1/8 字节的 null bitmap
            return size + n / 8.0;
        }
        // 每列 1 字节的 flag
        size + n
    }

    /// 表扫描的平均行宽
    pub fn table_avg_row_size(&self, col_ids: &[i64], store: StoreType, handle_in_cols: bool) -> f64 {
        let mut size = self.avg_row_size(col_ids, false, true);
        match store {
            StoreType::TiKV => {
                size += RECORD_ROW_KEY_LEN;
                // TiKV 的扫描列总包含行句柄，已经计入 key 长度
                size -= 8.0;
            }
            StoreType::TiFlash => {
                if !handle_in_cols {
                    size += 8.0;
                }
            }
        }
        size
    }

    /// 索引扫描的平均行宽
    pub fn index_avg_row_size(&self, col_ids: &[i64], is_unique: bool) -> f64 {
        let mut size = self.avg_row_size(col_ids, true, true);
        size += INDEX_KEY_PREFIX_LEN;
        if !is_unique {
            // 非唯一索引的 key 末尾拼接句柄
            size += 1.0;
        }
        size
    }

    /// 按列上的区间估算行数，列统计缺失时使用伪选择率
    pub fn column_row_count(
        &self,
        column_id: i64,
        ranges: &[Range],
        pk_is_handle: bool,
    ) -> OptimizeResult<f64> {
        match self.column(column_id) {
            Some(col) => col.column_row_count(ranges, self.modify_count, pk_is_handle),
            None => self.pseudo_row_count_by_ranges(ranges),
        }
    }

    fn pseudo_row_count_by_ranges(&self, ranges: &[Range]) -> OptimizeResult<f64> {
        let total = self.count;
        let mut row_count = 0.0;
        for range in ranges {
            row_count += match (&range.low, &range.high) {
                (None, None) => total,
                (None, Some(_)) => {
                    let null_count = total / PSEUDO_EQUAL_RATE;
                    total / PSEUDO_LESS_RATE - null_count
                }
                (Some(_), None) => total / PSEUDO_LESS_RATE,
                (Some(l), Some(h)) => match l.compare(h) {
                    Some(Ordering::Equal) => total / PSEUDO_EQUAL_RATE,
                    Some(_) => total / PSEUDO_BETWEEN_RATE,
                    None => {
                        return Err(OptimizeError::Statistics(format!(
                            "无法比较区间边界 {} 与 {}",
                            l, h
                        )))
                    }
                },
            };
            if row_count >= total {
                return Ok(total);
            }
        }
        Ok(row_count)
    }
}
