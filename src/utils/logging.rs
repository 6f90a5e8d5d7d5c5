// 日志
//
// 进程内只有一个 flexi_logger 实例，句柄保存在全局槽位里，关闭时 flush 异步写线程。
// 优化器模块可以单独设置级别，便于只看计划搜索和绑定的调试输出。

use crate::config::LogConfig;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, LogSpecification, Logger, LoggerHandle, Naming,
    WriteMode,
};
use parking_lot::Mutex;

/// 优化器模块路径
const OPTIMIZER_MODULE: &str = "sqlopt::query::optimizer";

static LOGGER_HANDLE: Mutex<Option<LoggerHandle>> = Mutex::new(None);

/// 由配置得到日志级别规格
///
/// `optimizer_level` 作为 `sqlopt::query::optimizer` 的模块级指令追加在全局级别之后。
pub fn log_spec(config: &LogConfig) -> Result<LogSpecification, flexi_logger::FlexiLoggerError> {
    let spec = match &config.optimizer_level {
        Some(level) => format!("{}, {}={}", config.level, OPTIMIZER_MODULE, level),
        None => config.level.clone(),
    };
    LogSpecification::parse(spec)
}

/// 按配置启动日志，已经启动时什么都不做
///
/// # Examples
/// ```no_run
/// use sqlopt::config::Config;
/// use sqlopt::utils::logging;
///
/// let config = Config::default();
/// logging::init(&config.log).expect("日志初始化失败");
/// ```
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut slot = LOGGER_HANDLE.lock();
    if slot.is_some() {
        return Ok(());
    }

    let duplicate = if config.warn_to_stderr {
        Duplicate::Warn
    } else {
        Duplicate::None
    };
    let handle = Logger::with(log_spec(config)?)
        .log_to_file(
            FileSpec::default()
                .basename(&config.file)
                .directory(&config.dir),
        )
        .duplicate_to_stderr(duplicate)
        .rotate(
            Criterion::Size(config.max_file_size),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .write_mode(WriteMode::Async)
        .append()
        .start()?;
    *slot = Some(handle);
    drop(slot);

    log::info!(
        "日志已启动: {}/{}, 级别 {}, 优化器级别 {}",
        config.dir,
        config.file,
        config.level,
        config.optimizer_level.as_deref().unwrap_or("-")
    );
    Ok(())
}

/// 取出句柄并 flush，返回时异步写线程已写完
pub fn shutdown() {
    if let Some(handle) = LOGGER_HANDLE.lock().take() {
        handle.flush();
    }
}

pub fn is_initialized() -> bool {
    LOGGER_HANDLE.lock().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_optimizer_level_is_module_directive() {
        let config = LogConfig {
            level: "warn".to_string(),
            optimizer_level: Some("debug".to_string()),
            ..LogConfig::default()
        };
        let spec = log_spec(&config).expect("级别规格非法");
        assert_eq!(spec.module_filters().len(), 2);
        assert!(spec
            .module_filters()
            .iter()
            .any(|f| f.module_name.as_deref() == Some(OPTIMIZER_MODULE)
                && f.level_filter == log::LevelFilter::Debug));

        let plain = log_spec(&LogConfig::default()).expect("级别规格非法");
        assert_eq!(plain.module_filters().len(), 1);
    }

    #[test]
    #[serial]
    fn test_init_is_idempotent_and_shutdown_flushes() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let config = LogConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            optimizer_level: Some("trace".to_string()),
            warn_to_stderr: false,
            ..LogConfig::default()
        };

        assert!(init(&config).is_ok());
        assert!(is_initialized());
        assert!(init(&config).is_ok());

        log::debug!(target: "sqlopt::query::optimizer::engine", "优化器调试日志");

        shutdown();
        assert!(!is_initialized());
    }

    #[test]
    #[serial]
    fn test_invalid_level_is_rejected() {
        let config = LogConfig {
            optimizer_level: Some("bogus".to_string()),
            ..LogConfig::default()
        };
        assert!(init(&config).is_err());
        assert!(!is_initialized());
    }
}
