//! 绑定记录
//!
//! 一条 `BindRecord` 对应一个规范化语句形状（按库区分），
//! 其中每个选择率桶至多有一个 baseline 绑定，另有一个跨库通用的规范化绑定。

use crate::core::error::{BindingError, BindingResult};
use crate::query::optimizer::hint::contain_table_hint;
use crate::query::parser::hint::{parse_hint_comment, restore_optimizer_hints, TableOptimizerHint};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_CHARSET: &str = "utf8mb4";
pub const DEFAULT_COLLATION: &str = "utf8mb4_bin";

/// 绑定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindStatus {
    /// 等待后台验证
    PendingVerify,
    Using,
    /// 应用时重新优化失败，等待删除
    Invalid,
    /// 验证未通过
    Rejected,
}

impl BindStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindStatus::PendingVerify => "pending verify",
            BindStatus::Using => "using",
            BindStatus::Invalid => "invalid",
            BindStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BindStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    /// 绑定到某个选择率桶
    Baseline,
    /// 不区分库和选择率
    Normalized,
}

/// 绑定来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindSource {
    #[default]
    Manual,
    Evolve,
}

/// 一条带提示的语句改写
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub bind_sql: String,
    /// 提示文本加桶后缀，用来和计划的提示签名比较
    pub id: String,
    pub hints: Vec<TableOptimizerHint>,
    pub status: BindStatus,
    pub charset: String,
    pub collation: String,
    pub bucket_id: i64,
    /// 原始形式的绑定不参与演进和重新优化
    pub fixed: bool,
    pub bind_type: BindType,
    pub source: BindSource,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Binding {
    /// 解析绑定 SQL 中的提示，新绑定处于待验证状态
    pub fn new(bind_sql: &str, bind_type: BindType, bucket_id: i64) -> BindingResult<Self> {
        if !bind_sql.to_ascii_lowercase().contains("select") {
            return Err(BindingError::InvalidBindSql(bind_sql.to_string()));
        }
        let (hints, warnings) = parse_hint_comment(bind_sql);
        if !warnings.is_empty() {
            log::debug!("绑定 SQL 中有 {} 条提示无法解析: {}", warnings.len(), bind_sql);
        }
        let now = Utc::now();
        let mut binding = Self {
            bind_sql: bind_sql.to_string(),
            id: String::new(),
            hints,
            status: BindStatus::PendingVerify,
            charset: DEFAULT_CHARSET.to_string(),
            collation: DEFAULT_COLLATION.to_string(),
            bucket_id,
            fixed: false,
            bind_type,
            source: BindSource::Manual,
            create_time: now,
            update_time: now,
        };
        binding.id = format!("{}{}", restore_optimizer_hints(&binding.hints), binding.bucket_id_suffix());
        Ok(binding)
    }

    pub fn with_status(mut self, status: BindStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_source(mut self, source: BindSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_charset(mut self, charset: &str, collation: &str) -> Self {
        self.charset = charset.to_string();
        self.collation = collation.to_string();
        self
    }

    /// 规范化绑定没有后缀，baseline 以 `_桶号` 结尾
    pub fn bucket_id_suffix(&self) -> String {
        match self.bind_type {
            BindType::Baseline => format!("_{}", self.bucket_id),
            BindType::Normalized => String::new(),
        }
    }

    pub fn set_status(&mut self, status: BindStatus) {
        self.status = status;
        self.update_time = Utc::now();
    }

    pub fn is_using(&self) -> bool {
        self.status == BindStatus::Using
    }

    pub fn contain_table_hint(&self, name: &str) -> bool {
        contain_table_hint(&self.hints, name)
    }
}

/// 同一语句形状下的所有绑定
#[derive(Debug, Clone, PartialEq)]
pub struct BindRecord {
    /// 规范化 SQL
    pub original_sql: String,
    pub db: String,
    /// 桶号到 baseline 绑定
    pub baselines: BTreeMap<i64, Binding>,
    pub normalized_binding: Option<Binding>,
}

impl BindRecord {
    pub fn new(original_sql: &str, db: &str) -> Self {
        Self {
            original_sql: original_sql.to_string(),
            db: db.to_lowercase(),
            baselines: BTreeMap::new(),
            normalized_binding: None,
        }
    }

    /// 放入 baseline 绑定，同桶的旧绑定被替换
    pub fn with_baseline(mut self, binding: Binding) -> Self {
        self.baselines.insert(binding.bucket_id, binding);
        self
    }

    pub fn with_normalized_binding(mut self, binding: Binding) -> Self {
        self.normalized_binding = Some(binding);
        self
    }

    pub fn find_baseline(&self, bucket_id: i64) -> Option<&Binding> {
        self.baselines.get(&bucket_id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.normalized_binding.iter().chain(self.baselines.values())
    }

    pub fn has_using_binding(&self) -> bool {
        self.bindings().any(|b| b.is_using())
    }

    /// 规范化绑定优先，否则取桶号最小的 baseline
    pub fn first_binding(&self) -> Option<&Binding> {
        self.normalized_binding
            .as_ref()
            .or_else(|| self.baselines.values().next())
    }

    pub fn is_empty(&self) -> bool {
        self.normalized_binding.is_none() && self.baselines.is_empty()
    }

    pub fn binding_count(&self) -> usize {
        self.baselines.len() + usize::from(self.normalized_binding.is_some())
    }

    /// 合并另一条记录，`other` 中的绑定覆盖同桶的旧绑定
    pub fn merge(&self, other: &BindRecord) -> BindRecord {
        let mut merged = self.clone();
        for (bucket, binding) in &other.baselines {
            merged.baselines.insert(*bucket, binding.clone());
        }
        if let Some(binding) = &other.normalized_binding {
            merged.normalized_binding = Some(binding.clone());
        }
        merged
    }

    /// 去掉与 `other` 中 id 相同的绑定
    pub fn remove(&self, other: &BindRecord) -> BindRecord {
        let mut rest = self.clone();
        for (bucket, binding) in &other.baselines {
            if rest.baselines.get(bucket).is_some_and(|b| b.id == binding.id) {
                rest.baselines.remove(bucket);
            }
        }
        if let (Some(mine), Some(theirs)) = (&rest.normalized_binding, &other.normalized_binding) {
            if mine.id == theirs.id {
                rest.normalized_binding = None;
            }
        }
        rest
    }

    /// 修改 id 匹配的绑定状态，返回是否找到
    pub fn set_binding_status(&mut self, binding_id: &str, status: BindStatus) -> bool {
        let target = self
            .normalized_binding
            .iter_mut()
            .chain(self.baselines.values_mut())
            .find(|b| b.id == binding_id);
        match target {
            Some(binding) => {
                binding.set_status(status);
                true
            }
            None => false,
        }
    }
}
