//! 代价模型
//!
//! - `config` - 代价因子快照
//!
//! 各物理访问算子的代价函数位于 `implementation` 模块，
//! 上层算子（选择、投影、排序、限制、连接）的局部代价由物理节点自身提供。

pub mod config;

pub use config::CostFactors;

/// 按并发度放大剪枝用的代价上限
///
/// 乘积溢出时返回 `f64::MAX`，即不做限制。
pub fn scale_cost_limit(cost_limit: f64, concurrency: f64) -> f64 {
    if f64::MAX / concurrency < cost_limit {
        return f64::MAX;
    }
    cost_limit * concurrency
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_cost_limit() {
        assert_eq!(scale_cost_limit(10.0, 15.0), 150.0);
        assert_eq!(scale_cost_limit(f64::MAX / 2.0, 15.0), f64::MAX);
        assert!(scale_cost_limit(1e300, 15.0) >= 1e300);
    }
}
