//! 优化器错误处理
//!
//! 错误按来源分为三类：
//! - `OptimizeError`：优化调用的致命错误，原样返回给调用方
//! - `BindingError`：绑定存储操作错误，可转换为 `OptimizeError`
//! - `HintWarning`：提示解析产生的告警，只记录不中断语句

pub mod binding;
pub mod hint;
pub mod optimize;

pub use binding::{BindingError, BindingResult};
pub use hint::HintWarning;
pub use optimize::{OptimizeError, OptimizeResult};
