//! 提示告警
//!
//! 提示冲突或取值非法时不会报错，只记录告警并继续执行语句。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HintWarning {
    /// 同类提示出现多次
    #[error("{hint}() 被定义了多次, 只有最后一个生效: {last}")]
    Duplicated { hint: String, last: String },

    /// MEMORY_QUOTA 取值非法
    #[error("MEMORY_QUOTA 提示用法无效, 合法用法: MEMORY_QUOTA(10 MB) 或 MEMORY_QUOTA(10 GB)")]
    InvalidMemoryQuota,

    /// MEMORY_QUOTA 为 0
    #[error("MEMORY_QUOTA 设置为 0 表示不限制内存")]
    UnlimitedMemoryQuota,

    /// 查询块名不存在
    #[error("查询块名 {0} 未找到, 提示被忽略")]
    UnknownQueryBlock(String),

    /// 提示引用的表不在查询中
    #[error("{hint} 提示中的表 {table} 不存在于查询中, 提示被忽略")]
    UnknownHintTable { hint: String, table: String },

    /// READ_FROM_STORAGE(TIFLASH[..]) 引用的表没有 TiFlash 副本
    #[error("表 {0} 没有 TiFlash 副本, READ_FROM_STORAGE 提示被忽略")]
    NoTiFlashReplica(String),

    /// 无法识别的提示
    #[error("无法解析的提示: {0}")]
    Unparsable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicated_message() {
        let w = HintWarning::Duplicated {
            hint: "MEMORY_QUOTA".to_string(),
            last: "MEMORY_QUOTA(20 MB)".to_string(),
        };
        assert!(w.to_string().contains("MEMORY_QUOTA(20 MB)"));
    }
}
