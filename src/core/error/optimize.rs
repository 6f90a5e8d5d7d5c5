//! 优化器错误类型
//!
//! 构建错误、权限拒绝、表锁冲突等都会中止当前优化调用。
//! 代价计算从不报错，统计信息缺失时退化为默认值。

use super::binding::BindingError;
use thiserror::Error;

/// 优化器错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    /// 不支持的语句
    #[error("不支持的语句: {0}")]
    UnsupportedStatement(String),

    /// 表不存在
    #[error("表不存在: {db}.{table}")]
    UnknownTable { db: String, table: String },

    /// 列不存在
    #[error("列不存在: {0}")]
    UnknownColumn(String),

    /// 列引用有歧义
    #[error("列引用有歧义: {0}")]
    AmbiguousColumn(String),

    /// 提示中引用的索引不存在
    #[error("索引 {index} 不存在于表 {table}")]
    IndexNotFound { table: String, index: String },

    /// 权限不足
    #[error("权限不足: 用户 {user} 没有 {privilege} 权限访问 {object}")]
    PrivilegeDenied {
        user: String,
        privilege: String,
        object: String,
    },

    /// 表被其他会话锁定
    #[error("表 {0} 已被其他会话锁定")]
    TableLocked(String),

    /// 预处理语句不存在
    #[error("预处理语句不存在: {0}")]
    PreparedStmtNotFound(String),

    /// 参数个数不匹配
    #[error("参数个数不匹配: 需要 {expected} 个, 实际 {actual} 个")]
    WrongParamCount { expected: usize, actual: usize },

    /// EXECUTE 得到的计划类型不合法
    #[error("EXECUTE 计划类型不合法: {0}")]
    InvalidExecutePlan(String),

    /// 找不到可行的物理计划
    #[error("找不到可行的物理计划: {0}")]
    NoFeasiblePlan(String),

    /// 统计信息估算失败
    #[error("统计信息错误: {0}")]
    Statistics(String),

    /// 获取事务时间戳失败
    #[error("获取时间戳失败: {0}")]
    Timestamp(String),

    /// 绑定存储错误
    #[error("绑定错误: {0}")]
    Binding(#[from] BindingError),

    /// 内部错误
    #[error("内部优化错误: {0}")]
    Internal(String),
}

/// 优化器结果类型
pub type OptimizeResult<T> = Result<T, OptimizeError>;
