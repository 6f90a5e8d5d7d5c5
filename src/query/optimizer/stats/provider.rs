//! 统计信息提供者
//!
//! 优化器通过 `StatisticsProvider` 读取统计信息，存储方式由外部决定。
//! `MemoryStatisticsProvider` 是线程安全的内存实现。

use super::table::TableStatistics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// 统计信息提供者
pub trait StatisticsProvider: Send + Sync + Debug {
    /// 获取表的统计信息
    fn table_stats(&self, table_id: i64) -> Option<Arc<TableStatistics>>;

    /// 获取可用于估算的统计信息
    ///
    /// 统计信息缺失或行数为 0 时返回伪统计信息。
    fn stats_or_pseudo(&self, table_id: i64) -> Arc<TableStatistics> {
        match self.table_stats(table_id) {
            Some(stats) if !stats.pseudo && stats.count > 0.0 => stats,
            _ => Arc::new(TableStatistics::pseudo(table_id)),
        }
    }
}

/// 内存统计信息提供者
#[derive(Debug, Default)]
pub struct MemoryStatisticsProvider {
    /// 以表ID为键
    tables: RwLock<HashMap<i64, Arc<TableStatistics>>>,
}

impl MemoryStatisticsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新表统计信息
    pub fn update_table_stats(&self, stats: TableStatistics) {
        self.tables.write().insert(stats.table_id, Arc::new(stats));
    }

    /// 删除表统计信息
    pub fn remove_table_stats(&self, table_id: i64) -> bool {
        self.tables.write().remove(&table_id).is_some()
    }

    /// 清除所有统计信息
    pub fn clear_all(&self) {
        self.tables.write().clear();
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

impl StatisticsProvider for MemoryStatisticsProvider {
    fn table_stats(&self, table_id: i64) -> Option<Arc<TableStatistics>> {
        self.tables.read().get(&table_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_get() {
        let provider = MemoryStatisticsProvider::new();
        provider.update_table_stats(TableStatistics::new(1, 100.0));
        assert_eq!(provider.table_count(), 1);
        assert_eq!(provider.table_stats(1).map(|s| s.count), Some(100.0));
        assert!(provider.table_stats(2).is_none());
        assert!(provider.remove_table_stats(1));
        assert!(!provider.remove_table_stats(1));
    }

    #[test]
    fn test_empty_table_degrades_to_pseudo() {
        let provider = MemoryStatisticsProvider::new();
        provider.update_table_stats(TableStatistics::new(1, 0.0));
        let stats = provider.stats_or_pseudo(1);
        assert!(stats.pseudo);
        assert_eq!(stats.count, 10000.0);
        assert!(provider.stats_or_pseudo(42).pseudo);
    }
}
