//! 会话
//!
//! 持有会话变量、会话级绑定、预处理语句和事务时间戳。
//! 时间戳可以提前在后台线程获取，优化器返回计划时不必等待。

use super::oracle::TimestampOracle;
use super::session_vars::SessionVars;
use crate::core::error::{OptimizeError, OptimizeResult};
use crate::query::optimizer::binding::SessionBindHandle;
use crate::query::parser::ast::{SelectStmt, Stmt};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

/// 预处理语句
#[derive(Debug, Clone)]
pub struct PreparedStmt {
    pub name: String,
    pub stmt: SelectStmt,
    pub param_count: usize,
}

#[derive(Debug)]
pub struct Session {
    pub vars: SessionVars,
    bind_handle: Arc<SessionBindHandle>,
    prepared: HashMap<String, PreparedStmt>,
    oracle: Arc<dyn TimestampOracle>,
    ts_future: Option<JoinHandle<OptimizeResult<u64>>>,
    txn_ts: Option<u64>,
}

impl Session {
    pub fn new(vars: SessionVars, oracle: Arc<dyn TimestampOracle>) -> Self {
        Self {
            vars,
            bind_handle: Arc::new(SessionBindHandle::new()),
            prepared: HashMap::new(),
            oracle,
            ts_future: None,
            txn_ts: None,
        }
    }

    pub fn bind_handle(&self) -> &Arc<SessionBindHandle> {
        &self.bind_handle
    }

    /// 注册预处理语句，返回参数个数
    pub fn prepare(&mut self, name: &str, stmt: Stmt) -> OptimizeResult<usize> {
        let select = match stmt {
            Stmt::Select(s) => s,
            other => {
                return Err(OptimizeError::UnsupportedStatement(format!(
                    "只能预处理 SELECT 语句, 得到 {}",
                    other.kind()
                )))
            }
        };
        let param_count = select.param_count();
        let key = name.to_lowercase();
        log::debug!("注册预处理语句 {}: {} 个参数", key, param_count);
        self.prepared.insert(
            key.clone(),
            PreparedStmt {
                name: key,
                stmt: select,
                param_count,
            },
        );
        Ok(param_count)
    }

    pub fn prepared_stmt(&self, name: &str) -> Option<&PreparedStmt> {
        self.prepared.get(&name.to_lowercase())
    }

    pub fn deallocate(&mut self, name: &str) -> bool {
        self.prepared.remove(&name.to_lowercase()).is_some()
    }

    /// 在后台线程预取事务时间戳，已经取到或正在获取时什么也不做
    pub fn prepare_ts_future(&mut self) {
        if self.txn_ts.is_some() || self.ts_future.is_some() {
            return;
        }
        let oracle = Arc::clone(&self.oracle);
        match std::thread::Builder::new()
            .name("ts-prefetch".to_string())
            .spawn(move || oracle.get_timestamp())
        {
            Ok(handle) => self.ts_future = Some(handle),
            Err(e) => log::warn!("启动时间戳预取线程失败, 将同步获取: {}", e),
        }
    }

    pub fn has_ts_future(&self) -> bool {
        self.ts_future.is_some()
    }

    /// 当前事务的时间戳，必要时等待预取结果
    pub fn txn_ts(&mut self) -> OptimizeResult<u64> {
        if let Some(ts) = self.txn_ts {
            return Ok(ts);
        }
        let ts = match self.ts_future.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| OptimizeError::Timestamp("时间戳预取线程异常退出".to_string()))??,
            None => self.oracle.get_timestamp()?,
        };
        self.txn_ts = Some(ts);
        Ok(ts)
    }

    /// 事务结束，丢弃时间戳
    pub fn finish_txn(&mut self) {
        self.txn_ts = None;
        self.ts_future = None;
    }
}
