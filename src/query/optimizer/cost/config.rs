//! 代价因子配置
//!
//! 代价因子在一次优化开始时从会话变量中取快照，优化过程中只读。
//!
//! ## 使用示例
//!
//! ```rust
//! use sqlopt::query::optimizer::cost::CostFactors;
//!
//! // 使用默认配置
//! let factors = CostFactors::default();
//!
//! // 自定义配置
//! let custom = CostFactors::new()
//!     .with_scan_factor(2.0)
//!     .with_dist_sql_scan_concurrency(8);
//! assert_eq!(custom.seek_factor, factors.seek_factor);
//! ```

use serde::{Deserialize, Serialize};

/// 代价因子
///
/// 每个算子的代价由行数、行宽和这些因子组合得到。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostFactors {
    /// 单行 CPU 处理代价。默认值 3.0
    pub cpu_factor: f64,

    /// 每字节网络传输代价。默认值 1.0
    pub network_factor: f64,

    /// 每字节正序扫描代价。默认值 1.5
    pub scan_factor: f64,

    /// 每字节逆序扫描代价。默认值 3.0
    ///
    /// 存储层逆序迭代比正序慢，因此单独计价
    pub desc_scan_factor: f64,

    /// 每个扫描区间的 seek 代价。默认值 20.0
    pub seek_factor: f64,

    /// 每个并发 worker 的启动代价。默认值 3.0
    pub concurrency_factor: f64,

    /// 每字节内存代价。默认值 0.001
    pub memory_factor: f64,

    /// 分布式扫描并发度。默认值 15
    ///
    /// 真实并发度取决于涉及的 region 数，计划时无法得知，这里直接使用配置值
    pub dist_sql_scan_concurrency: usize,

    /// 回表 worker 数。默认值 4
    pub index_lookup_concurrency: usize,

    /// 回表批大小。默认值 20000
    pub index_lookup_size: usize,

    /// 投影算子并发度。默认值 4
    pub projection_concurrency: usize,
}

impl Default for CostFactors {
    fn default() -> Self {
        Self {
            cpu_factor: 3.0,
            network_factor: 1.0,
            scan_factor: 1.5,
            desc_scan_factor: 3.0,
            seek_factor: 20.0,
            concurrency_factor: 3.0,
            memory_factor: 0.001,
            dist_sql_scan_concurrency: 15,
            index_lookup_concurrency: 4,
            index_lookup_size: 20000,
            projection_concurrency: 4,
        }
    }
}

impl CostFactors {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cpu_factor(mut self, factor: f64) -> Self {
        self.cpu_factor = factor;
        self
    }

    pub fn with_network_factor(mut self, factor: f64) -> Self {
        self.network_factor = factor;
        self
    }

    pub fn with_scan_factor(mut self, factor: f64) -> Self {
        self.scan_factor = factor;
        self
    }

    pub fn with_desc_scan_factor(mut self, factor: f64) -> Self {
        self.desc_scan_factor = factor;
        self
    }

    pub fn with_seek_factor(mut self, factor: f64) -> Self {
        self.seek_factor = factor;
        self
    }

    pub fn with_concurrency_factor(mut self, factor: f64) -> Self {
        self.concurrency_factor = factor;
        self
    }

    /// 设置分布式扫描并发度，最小为 1
    pub fn with_dist_sql_scan_concurrency(mut self, concurrency: usize) -> Self {
        self.dist_sql_scan_concurrency = concurrency.max(1);
        self
    }

    /// 设置回表 worker 数，最小为 1
    pub fn with_index_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.index_lookup_concurrency = concurrency.max(1);
        self
    }

    pub fn with_index_lookup_size(mut self, size: usize) -> Self {
        self.index_lookup_size = size;
        self
    }

    /// 设置投影并发度，最小为 1
    pub fn with_projection_concurrency(mut self, concurrency: usize) -> Self {
        self.projection_concurrency = concurrency.max(1);
        self
    }

    /// 扫描代价因子，逆序扫描使用单独的因子
    pub fn scan_factor_for(&self, desc: bool) -> f64 {
        if desc {
            self.desc_scan_factor
        } else {
            self.scan_factor
        }
    }

    pub(crate) fn scan_workers(&self) -> f64 {
        self.dist_sql_scan_concurrency.max(1) as f64
    }

    pub(crate) fn lookup_workers(&self) -> f64 {
        self.index_lookup_concurrency.max(1) as f64
    }

    pub(crate) fn projection_workers(&self) -> f64 {
        self.projection_concurrency.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factors() {
        let f = CostFactors::default();
        assert_eq!(f.cpu_factor, 3.0);
        assert_eq!(f.scan_factor, 1.5);
        assert_eq!(f.desc_scan_factor, 3.0);
        assert_eq!(f.seek_factor, 20.0);
        assert_eq!(f.dist_sql_scan_concurrency, 15);
        assert_eq!(f.index_lookup_size, 20000);
    }

    #[test]
    fn test_builder_pattern() {
        let f = CostFactors::new()
            .with_scan_factor(2.0)
            .with_dist_sql_scan_concurrency(0)
            .with_index_lookup_size(4);

        assert_eq!(f.scan_factor, 2.0);
        assert_eq!(f.dist_sql_scan_concurrency, 1);
        assert_eq!(f.index_lookup_size, 4);
        assert_eq!(f.network_factor, 1.0); // 默认
        assert_eq!(f.scan_factor_for(true), f.desc_scan_factor);
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let f: CostFactors = toml::from_str("seek_factor = 10.0").expect("解析失败");
        assert_eq!(f.seek_factor, 10.0);
        assert_eq!(f.cpu_factor, 3.0);
    }
}
