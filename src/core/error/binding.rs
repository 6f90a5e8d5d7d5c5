//! 绑定存储错误类型

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// 绑定记录不存在
    #[error("绑定记录不存在: digest={digest}, db={db}")]
    RecordNotFound { digest: String, db: String },

    /// 绑定不存在
    #[error("绑定不存在: {0}")]
    BindingNotFound(String),

    /// 桶编号越界
    #[error("桶编号 {bucket} 超出范围 [0, {space})")]
    InvalidBucket { bucket: i64, space: i64 },

    /// 演进任务被拒绝
    #[error("演进任务被拒绝: {0}")]
    EvolveTaskRejected(String),

    /// 绑定 SQL 无法解析
    #[error("绑定 SQL 无法解析: {0}")]
    InvalidBindSql(String),
}

pub type BindingResult<T> = Result<T, BindingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_error_display() {
        let err = BindingError::InvalidBucket { bucket: 10, space: 10 };
        assert_eq!(err.to_string(), "桶编号 10 超出范围 [0, 10)");
    }
}
