//! 语句级提示解析
//!
//! 同类提示出现多次时取最后一个，并为每一类重复的提示产生一条告警。
//! 非法取值退化为“不生效 + 告警”，解析本身从不失败。

use crate::core::error::HintWarning;
use crate::query::parser::hint::{HintData, TableOptimizerHint};

/// 副本读模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaRead {
    #[default]
    Leader,
    Follower,
}

/// 解析后的语句级提示
///
/// `has_*` 标记对应提示是否出现过，未出现时使用会话变量的值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StmtHints {
    pub has_mem_quota_hint: bool,
    /// 字节数，0 表示不限制
    pub mem_quota_query: i64,
    pub has_allow_in_subq_to_join_and_agg_hint: bool,
    pub allow_in_subq_to_join_and_agg: bool,
    pub has_enable_cascades_planner_hint: bool,
    pub enable_cascades_planner: bool,
    pub no_index_merge_hint: bool,
    pub has_replica_read_hint: bool,
    pub replica_read: ReplicaRead,
    pub has_max_execution_time_hint: bool,
    /// 毫秒，由执行器负责执行
    pub max_execution_time: u64,
}

/// 出现多次时产生重复告警
fn check_duplicated(
    name: &str,
    count: usize,
    last: Option<&TableOptimizerHint>,
    warnings: &mut Vec<HintWarning>,
) {
    if count > 1 {
        warnings.push(HintWarning::Duplicated {
            hint: name.to_string(),
            last: last
                .map(|h| h.to_string().to_uppercase())
                .unwrap_or_else(|| format!("{}()", name)),
        });
    }
}

/// 把表级提示解析为语句级提示
///
/// 只处理语句级提示，表级访问路径提示（`use_index` 等）由计划构建阶段处理。
pub fn handle_stmt_hints(hints: &[TableOptimizerHint]) -> (StmtHints, Vec<HintWarning>) {
    let mut stmt_hints = StmtHints::default();
    let mut warnings = Vec::new();
    if hints.is_empty() {
        return (stmt_hints, warnings);
    }

    let mut memory_quota = None;
    let mut use_toja = None;
    let mut use_cascades = None;
    let mut no_index_merge = None;
    let mut read_replica = None;
    let mut max_execution_time = None;
    let (mut memory_quota_cnt, mut use_toja_cnt, mut use_cascades_cnt) = (0, 0, 0);
    let (mut no_index_merge_cnt, mut read_replica_cnt, mut max_execution_time_cnt) = (0, 0, 0);

    for hint in hints {
        match hint.name.as_str() {
            "memory_quota" => {
                memory_quota = Some(hint);
                memory_quota_cnt += 1;
            }
            "use_toja" => {
                use_toja = Some(hint);
                use_toja_cnt += 1;
            }
            "use_cascades" => {
                use_cascades = Some(hint);
                use_cascades_cnt += 1;
            }
            "no_index_merge" => {
                no_index_merge = Some(hint);
                no_index_merge_cnt += 1;
            }
            "read_consistent_replica" => {
                read_replica = Some(hint);
                read_replica_cnt += 1;
            }
            "max_execution_time" => {
                max_execution_time = Some(hint);
                max_execution_time_cnt += 1;
            }
            _ => {}
        }
    }

    if let Some(hint) = memory_quota {
        check_duplicated("MEMORY_QUOTA", memory_quota_cnt, Some(hint), &mut warnings);
        match hint.data {
            HintData::Bytes(quota) if quota >= 0 => {
                stmt_hints.has_mem_quota_hint = true;
                stmt_hints.mem_quota_query = quota;
                if quota == 0 {
                    warnings.push(HintWarning::UnlimitedMemoryQuota);
                }
            }
            _ => warnings.push(HintWarning::InvalidMemoryQuota),
        }
    }

    if let Some(hint) = use_toja {
        check_duplicated("USE_TOJA", use_toja_cnt, Some(hint), &mut warnings);
        if let HintData::Bool(allow) = hint.data {
            stmt_hints.has_allow_in_subq_to_join_and_agg_hint = true;
            stmt_hints.allow_in_subq_to_join_and_agg = allow;
        }
    }

    if let Some(hint) = use_cascades {
        check_duplicated("USE_CASCADES", use_cascades_cnt, Some(hint), &mut warnings);
        if let HintData::Bool(enable) = hint.data {
            stmt_hints.has_enable_cascades_planner_hint = true;
            stmt_hints.enable_cascades_planner = enable;
        }
    }

    if no_index_merge.is_some() {
        check_duplicated("NO_INDEX_MERGE", no_index_merge_cnt, no_index_merge, &mut warnings);
        stmt_hints.no_index_merge_hint = true;
    }

    if read_replica.is_some() {
        check_duplicated(
            "READ_CONSISTENT_REPLICA",
            read_replica_cnt,
            read_replica,
            &mut warnings,
        );
        stmt_hints.has_replica_read_hint = true;
        stmt_hints.replica_read = ReplicaRead::Follower;
    }

    if let Some(hint) = max_execution_time {
        check_duplicated(
            "MAX_EXECUTION_TIME",
            max_execution_time_cnt,
            Some(hint),
            &mut warnings,
        );
        if let HintData::Millis(ms) = hint.data {
            stmt_hints.has_max_execution_time_hint = true;
            stmt_hints.max_execution_time = ms;
        }
    }

    (stmt_hints, warnings)
}
