//! 存储层类型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 读取数据的存储引擎
///
/// TiKV 为行存，TiFlash 为列存副本。两者的行宽估算方式不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    TiKV,
    TiFlash,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::TiKV => "tikv",
            StoreType::TiFlash => "tiflash",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tikv" => Ok(StoreType::TiKV),
            "tiflash" => Ok(StoreType::TiFlash),
            other => Err(format!("未知的存储引擎: {}", other)),
        }
    }
}
