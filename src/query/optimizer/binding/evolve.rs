//! 绑定演进
//!
//! 优化器只负责提交待验证的候选绑定，验证在后台进行：
//! 通过的候选成为所在桶的 Using 绑定，未通过的记为 Rejected，
//! 验证过程出错的记为 Invalid 并排队删除。

use super::handle::{EvolveTask, GlobalBindHandle};
use super::record::{BindRecord, BindSource, BindStatus, Binding};
use crate::core::error::{BindingError, BindingResult};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// 验证结果
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// 候选计划更优
    Accepted,
    /// 候选计划不比现有计划好
    Rejected,
    /// 验证无法完成
    Failed(String),
}

/// 候选绑定验证器，通常会分别执行原计划和候选计划比较耗时
pub trait PlanVerifier: Send + Sync + Debug {
    fn verify(&self, original_sql: &str, db: &str, binding: &Binding) -> VerifyOutcome;
}

/// 一轮验证的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolveStats {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct EvolutionScheduler {
    handle: Arc<GlobalBindHandle>,
    verifier: Arc<dyn PlanVerifier>,
    spm_space_number: i64,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EvolutionScheduler {
    pub fn new(handle: Arc<GlobalBindHandle>, verifier: Arc<dyn PlanVerifier>, spm_space_number: i64) -> Self {
        Self {
            handle,
            verifier,
            spm_space_number,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// 提交候选绑定，桶号必须落在 [0, spm_space_number) 内
    pub fn submit(&self, original_sql: &str, db: &str, binding: Binding) -> BindingResult<()> {
        if binding.bucket_id < 0 || binding.bucket_id >= self.spm_space_number {
            return Err(BindingError::InvalidBucket {
                bucket: binding.bucket_id,
                space: self.spm_space_number,
            });
        }
        self.handle
            .add_evolve_plan_task(original_sql, db, binding.with_source(BindSource::Evolve))
    }

    /// 验证当前排队的全部任务
    pub fn run_once(&self) -> EvolveStats {
        run_tasks(&self.handle, self.verifier.as_ref(), self.spm_space_number)
    }

    /// 启动后台线程，按间隔循环验证
    pub fn start(&self, interval: Duration) -> BindingResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let handle = Arc::clone(&self.handle);
        let verifier = Arc::clone(&self.verifier);
        let running = Arc::clone(&self.running);
        let space = self.spm_space_number;

        let spawned = std::thread::Builder::new()
            .name("bind-evolve".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let stats = run_tasks(&handle, verifier.as_ref(), space);
                    if stats != EvolveStats::default() {
                        log::info!(
                            "绑定演进: 通过 {}, 拒绝 {}, 失败 {}",
                            stats.accepted,
                            stats.rejected,
                            stats.failed
                        );
                    }
                    handle.drop_invalid_bind_records();
                    std::thread::sleep(interval);
                }
            });
        match spawned {
            Ok(worker) => {
                *self.worker.lock() = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(BindingError::EvolveTaskRejected(format!("启动演进线程失败: {}", e)))
            }
        }
    }

    /// 停止后台线程并等待其退出
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                log::warn!("绑定演进线程异常退出");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for EvolutionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tasks(handle: &GlobalBindHandle, verifier: &dyn PlanVerifier, space: i64) -> EvolveStats {
    let mut stats = EvolveStats::default();
    for task in handle.take_evolve_tasks() {
        let EvolveTask {
            original_sql,
            db,
            mut binding,
        } = task;
        if binding.bucket_id < 0 || binding.bucket_id >= space {
            log::warn!("丢弃桶号越界的演进任务: {} (桶 {})", binding.id, binding.bucket_id);
            stats.failed += 1;
            continue;
        }
        match verifier.verify(&original_sql, &db, &binding) {
            VerifyOutcome::Accepted => {
                binding.set_status(BindStatus::Using);
                log::debug!("候选绑定通过验证: {} (桶 {})", binding.id, binding.bucket_id);
                handle.create_bind_record(BindRecord::new(&original_sql, &db).with_baseline(binding));
                stats.accepted += 1;
            }
            VerifyOutcome::Rejected => {
                binding.set_status(BindStatus::Rejected);
                handle.record_rejected(&original_sql, &db, binding);
                stats.rejected += 1;
            }
            VerifyOutcome::Failed(reason) => {
                log::warn!("候选绑定验证失败: {}: {}", binding.id, reason);
                binding.set_status(BindStatus::Invalid);
                handle.add_drop_invalid_bind_task(BindRecord::new(&original_sql, &db).with_baseline(binding));
                stats.failed += 1;
            }
        }
    }
    stats
}
