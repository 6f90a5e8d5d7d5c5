use crate::core::types::StoreType;
use crate::query::optimizer::cost::CostFactors;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 应用配置
///
/// 对应 TOML 文件中的 `[log]` 与 `[optimizer]` 两节，缺省字段取默认值。
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub optimizer: OptimizerConfig,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// 只作用于优化器模块的级别，用于单独打开计划搜索和绑定的调试日志
    pub optimizer_level: Option<String>,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
    /// 告警及以上同时输出到 stderr
    pub warn_to_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            optimizer_level: None,
            dir: "logs".to_string(),
            file: "sqlopt".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
            warn_to_stderr: true,
        }
    }
}

/// 优化器配置，新会话从这里取得会话变量的初始值
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub cost: CostFactors,
    /// 选择率分桶数
    pub spm_space_number: i64,
    pub use_plan_baselines: bool,
    pub evolve_plan_baselines: bool,
    pub enable_cascades_planner: bool,
    /// 允许读取的存储引擎
    pub isolation_read_engines: Vec<StoreType>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cost: CostFactors::default(),
            spm_space_number: 10,
            use_plan_baselines: true,
            evolve_plan_baselines: false,
            enable_cascades_planner: false,
            isolation_read_engines: vec![StoreType::TiKV, StoreType::TiFlash],
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if config.optimizer.spm_space_number < 1 {
            log::warn!(
                "spm_space_number={} 非法, 使用默认值 10",
                config.optimizer.spm_space_number
            );
            config.optimizer.spm_space_number = 10;
        }
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.optimizer.spm_space_number, 10);
        assert!(config.optimizer.use_plan_baselines);
        assert!(!config.optimizer.evolve_plan_baselines);
    }

    #[test]
    fn test_config_load_save() {
        let temp_file = NamedTempFile::new().expect("Failed to create temporary file");

        let mut config = Config::default();
        config.optimizer.enable_cascades_planner = true;
        config.optimizer.cost = config.optimizer.cost.with_seek_factor(5.0);
        config.save(temp_file.path()).expect("Failed to save config");

        let loaded = Config::load(temp_file.path()).expect("Failed to load config");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_config_partial_sections() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temporary file");
        temp_file
            .write_all(
                b"[optimizer]\nspm_space_number = 0\nisolation_read_engines = [\"tiflash\"]\n\n[optimizer.cost]\ncpu_factor = 1.0\n",
            )
            .expect("Failed to write TOML content");

        let loaded = Config::load(temp_file.path()).expect("Failed to load config");
        assert_eq!(loaded.optimizer.spm_space_number, 10);
        assert_eq!(loaded.optimizer.isolation_read_engines, vec![StoreType::TiFlash]);
        assert_eq!(loaded.optimizer.cost.cpu_factor, 1.0);
        assert_eq!(loaded.optimizer.cost.scan_factor, 1.5);
        assert_eq!(loaded.log.file, "sqlopt");
    }
}
