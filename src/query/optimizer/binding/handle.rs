//! 会话级和全局绑定存储
//!
//! 两级存储相互独立，查找顺序和失效时的跨级联动由优化器负责。
//! 记录以 `Arc<BindRecord>` 保存，修改时整体替换，读者不会看到改了一半的绑定。

use super::record::{BindRecord, BindStatus, Binding};
use crate::core::error::{BindingError, BindingResult};
use crate::query::parser::normalize::digest_normalized;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 绑定作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindScope {
    Session,
    Global,
}

impl BindScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindScope::Session => "session",
            BindScope::Global => "global",
        }
    }
}

impl fmt::Display for BindScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 演进任务：一条等待验证的候选绑定
#[derive(Debug, Clone, PartialEq)]
pub struct EvolveTask {
    pub original_sql: String,
    pub db: String,
    pub binding: Binding,
}

/// 从 `current` 中删掉 `target` 列出的绑定，删空时返回 None
fn remove_bindings(current: &BindRecord, target: Option<&Binding>) -> Option<BindRecord> {
    let rest = match target {
        Some(binding) => {
            let mut mask = BindRecord::new(&current.original_sql, &current.db);
            mask.baselines.insert(binding.bucket_id, binding.clone());
            mask.normalized_binding = Some(binding.clone());
            current.remove(&mask)
        }
        None => return None,
    };
    (!rest.is_empty()).then_some(rest)
}

/// 会话级绑定
#[derive(Debug, Default)]
pub struct SessionBindHandle {
    /// (规范化 SQL, 库名) 到记录
    records: RwLock<HashMap<(String, String), Arc<BindRecord>>>,
    invalid_tasks: Mutex<Vec<BindRecord>>,
}

impl SessionBindHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建或合并绑定记录
    pub fn create_bind_record(&self, record: BindRecord) {
        let key = (record.original_sql.clone(), record.db.clone());
        let mut records = self.records.write();
        let merged = match records.get(&key) {
            Some(old) => old.merge(&record),
            None => record,
        };
        records.insert(key, Arc::new(merged));
    }

    pub fn get_bind_record(&self, normalized_sql: &str, db: &str) -> Option<Arc<BindRecord>> {
        self.records
            .read()
            .get(&(normalized_sql.to_string(), db.to_lowercase()))
            .cloned()
    }

    /// 删除一条绑定，`binding` 为 None 时删除整条记录
    pub fn drop_bind_record(&self, normalized_sql: &str, db: &str, binding: Option<&Binding>) -> BindingResult<()> {
        let key = (normalized_sql.to_string(), db.to_lowercase());
        let mut records = self.records.write();
        let current = records.get(&key).cloned().ok_or_else(|| BindingError::RecordNotFound {
            digest: normalized_sql.to_string(),
            db: db.to_string(),
        })?;
        if let Some(b) = binding {
            if !current.bindings().any(|x| x.id == b.id) {
                return Err(BindingError::BindingNotFound(b.id.clone()));
            }
        }
        match remove_bindings(&current, binding) {
            Some(rest) => records.insert(key, Arc::new(rest)),
            None => records.remove(&key),
        };
        Ok(())
    }

    /// 整体替换修改了状态的记录，返回是否找到该绑定
    pub fn set_binding_status(&self, normalized_sql: &str, db: &str, binding_id: &str, status: BindStatus) -> bool {
        let key = (normalized_sql.to_string(), db.to_lowercase());
        let mut records = self.records.write();
        let Some(current) = records.get(&key) else {
            return false;
        };
        let mut updated = BindRecord::clone(current);
        if !updated.set_binding_status(binding_id, status) {
            return false;
        }
        records.insert(key, Arc::new(updated));
        true
    }

    pub fn add_drop_invalid_bind_task(&self, record: BindRecord) {
        self.invalid_tasks.lock().push(record);
    }

    pub fn pending_invalid_tasks(&self) -> Vec<BindRecord> {
        self.invalid_tasks.lock().clone()
    }

    /// 执行排队的失效删除，返回删掉的绑定数
    pub fn drop_invalid_bind_records(&self) -> usize {
        let tasks = std::mem::take(&mut *self.invalid_tasks.lock());
        let mut dropped = 0;
        for task in tasks {
            for binding in task.bindings() {
                match self.drop_bind_record(&task.original_sql, &task.db, Some(binding)) {
                    Ok(()) => dropped += 1,
                    Err(e) => log::debug!("会话绑定已不存在, 跳过删除: {}", e),
                }
            }
        }
        dropped
    }

    pub fn records(&self) -> Vec<Arc<BindRecord>> {
        self.records.read().values().cloned().collect()
    }
}

/// 全局绑定
///
/// 缓存以 (摘要, 库名) 为键，查找时再核对规范化文本以排除摘要碰撞。
#[derive(Debug, Default)]
pub struct GlobalBindHandle {
    cache: DashMap<(String, String), Arc<BindRecord>>,
    invalid_tasks: Mutex<Vec<BindRecord>>,
    evolve_tasks: Mutex<Vec<EvolveTask>>,
    /// 验证未通过的绑定，不再重复提交
    rejected: RwLock<HashMap<(String, String), Vec<Binding>>>,
}

impl GlobalBindHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(normalized_sql: &str, db: &str) -> (String, String) {
        (digest_normalized(normalized_sql), db.to_lowercase())
    }

    /// 新建或合并绑定记录
    pub fn create_bind_record(&self, record: BindRecord) {
        let key = Self::key(&record.original_sql, &record.db);
        let mut entry = self.cache.entry(key).or_insert_with(|| Arc::new(BindRecord::new(&record.original_sql, &record.db)));
        let merged = entry.merge(&record);
        *entry = Arc::new(merged);
    }

    pub fn get_bind_record(&self, digest: &str, normalized_sql: &str, db: &str) -> Option<Arc<BindRecord>> {
        self.cache
            .get(&(digest.to_string(), db.to_lowercase()))
            .filter(|r| r.original_sql == normalized_sql)
            .map(|r| Arc::clone(r.value()))
    }

    /// 删除一条绑定，`binding` 为 None 时删除整条记录
    pub fn drop_bind_record(&self, normalized_sql: &str, db: &str, binding: Option<&Binding>) -> BindingResult<()> {
        let key = Self::key(normalized_sql, db);
        let rest = {
            let mut entry = self.cache.get_mut(&key).ok_or_else(|| BindingError::RecordNotFound {
                digest: key.0.clone(),
                db: db.to_string(),
            })?;
            if let Some(b) = binding {
                if !entry.bindings().any(|x| x.id == b.id) {
                    return Err(BindingError::BindingNotFound(b.id.clone()));
                }
            }
            let rest = remove_bindings(&entry, binding);
            if let Some(rest) = &rest {
                *entry = Arc::new(rest.clone());
            }
            rest
        };
        if rest.is_none() {
            self.cache.remove(&key);
        }
        Ok(())
    }

    /// 整体替换修改了状态的记录，返回是否找到该绑定
    pub fn set_binding_status(&self, normalized_sql: &str, db: &str, binding_id: &str, status: BindStatus) -> bool {
        let Some(mut entry) = self.cache.get_mut(&Self::key(normalized_sql, db)) else {
            return false;
        };
        let mut updated = BindRecord::clone(&entry);
        if !updated.set_binding_status(binding_id, status) {
            return false;
        }
        *entry = Arc::new(updated);
        true
    }

    pub fn add_drop_invalid_bind_task(&self, record: BindRecord) {
        log::debug!("全局失效绑定删除任务入队: {} ({})", record.original_sql, record.db);
        self.invalid_tasks.lock().push(record);
    }

    pub fn pending_invalid_tasks(&self) -> Vec<BindRecord> {
        self.invalid_tasks.lock().clone()
    }

    /// 执行排队的失效删除，返回删掉的绑定数
    pub fn drop_invalid_bind_records(&self) -> usize {
        let tasks = std::mem::take(&mut *self.invalid_tasks.lock());
        let mut dropped = 0;
        for task in tasks {
            for binding in task.bindings() {
                match self.drop_bind_record(&task.original_sql, &task.db, Some(binding)) {
                    Ok(()) => dropped += 1,
                    Err(e) => log::debug!("全局绑定已不存在, 跳过删除: {}", e),
                }
            }
        }
        dropped
    }

    /// 提交演进任务
    ///
    /// 同一形状下相同 id 的候选已在队列中、已存在于记录中或验证未通过时不重复提交。
    pub fn add_evolve_plan_task(&self, original_sql: &str, db: &str, binding: Binding) -> BindingResult<()> {
        if binding.status != BindStatus::PendingVerify {
            return Err(BindingError::EvolveTaskRejected(format!(
                "候选绑定状态为 {}, 只接受待验证绑定",
                binding.status
            )));
        }
        let db = db.to_lowercase();
        let known = self
            .get_bind_record(&digest_normalized(original_sql), original_sql, &db)
            .is_some_and(|r| r.bindings().any(|b| b.id == binding.id))
            || self
                .rejected
                .read()
                .get(&(original_sql.to_string(), db.clone()))
                .is_some_and(|list| list.iter().any(|b| b.id == binding.id));
        if known {
            log::debug!("候选绑定已验证过, 跳过: {}", binding.id);
            return Ok(());
        }

        let mut tasks = self.evolve_tasks.lock();
        if tasks
            .iter()
            .any(|t| t.original_sql == original_sql && t.db == db && t.binding.id == binding.id)
        {
            return Ok(());
        }
        log::debug!("新增演进任务: {} -> {}", original_sql, binding.bind_sql);
        tasks.push(EvolveTask {
            original_sql: original_sql.to_string(),
            db,
            binding,
        });
        Ok(())
    }

    pub fn pending_evolve_tasks(&self) -> usize {
        self.evolve_tasks.lock().len()
    }

    /// 取走全部待验证任务
    pub fn take_evolve_tasks(&self) -> Vec<EvolveTask> {
        std::mem::take(&mut *self.evolve_tasks.lock())
    }

    pub(crate) fn record_rejected(&self, original_sql: &str, db: &str, binding: Binding) {
        self.rejected
            .write()
            .entry((original_sql.to_string(), db.to_lowercase()))
            .or_default()
            .push(binding);
    }

    pub fn rejected_bindings(&self, original_sql: &str, db: &str) -> Vec<Binding> {
        self.rejected
            .read()
            .get(&(original_sql.to_string(), db.to_lowercase()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
