//! 时间戳来源

use crate::core::error::{OptimizeError, OptimizeResult};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// 逻辑时钟位数
const LOGICAL_BITS: u32 = 18;

/// 事务时间戳来源
pub trait TimestampOracle: Send + Sync + Debug {
    fn get_timestamp(&self) -> OptimizeResult<u64>;
}

/// 进程内时间戳分配
///
/// 高位为毫秒级物理时间，低 18 位为逻辑计数，保证单调递增。
#[derive(Debug, Default)]
pub struct LocalOracle {
    last: AtomicU64,
}

impl LocalOracle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimestampOracle for LocalOracle {
    fn get_timestamp(&self) -> OptimizeResult<u64> {
        let millis = chrono::Utc::now().timestamp_millis();
        let physical = u64::try_from(millis)
            .map_err(|_| OptimizeError::Timestamp(format!("系统时间早于纪元: {}", millis)))?;
        let candidate = physical << LOGICAL_BITS;
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .map_err(|_| OptimizeError::Timestamp("时间戳分配失败".to_string()))?;
        Ok(candidate.max(prev + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_are_monotonic() {
        let oracle = LocalOracle::new();
        let mut prev = 0;
        for _ in 0..100 {
            let ts = oracle.get_timestamp().unwrap();
            assert!(ts > prev);
            prev = ts;
        }
    }
}
