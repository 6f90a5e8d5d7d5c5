//! 权限与表锁检查
//!
//! 计划构建时记录访问了哪些库表、需要什么权限（`VisitInfo`），
//! 构建完成后由优化器统一交给权限检查器和表锁检查器。

use crate::core::error::{OptimizeError, OptimizeResult};
use crate::core::schema::{InfoSchema, TableLockType};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Create => "CREATE",
            Privilege::Drop => "DROP",
            Privilege::Alter => "ALTER",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Privilege::Select)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 构建阶段记录的一次访问
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitInfo {
    pub privilege: Privilege,
    pub db: String,
    /// 为空表示库级访问
    pub table: String,
}

impl VisitInfo {
    pub fn new(privilege: Privilege, db: &str, table: &str) -> Self {
        Self {
            privilege,
            db: db.to_lowercase(),
            table: table.to_lowercase(),
        }
    }

    fn object(&self) -> String {
        if self.table.is_empty() {
            self.db.clone()
        } else {
            format!("{}.{}", self.db, self.table)
        }
    }
}

/// 权限检查器
pub trait PrivilegeChecker: Send + Sync + Debug {
    /// 用户（或其任一激活角色）是否拥有库表上的权限
    fn request_verification(
        &self,
        user: &str,
        roles: &[String],
        db: &str,
        table: &str,
        privilege: Privilege,
    ) -> bool;
}

/// 逐条校验访问记录，第一条失败即返回
pub fn check_privilege(
    checker: &dyn PrivilegeChecker,
    user: &str,
    roles: &[String],
    visit_info: &[VisitInfo],
) -> OptimizeResult<()> {
    for v in visit_info {
        if !checker.request_verification(user, roles, &v.db, &v.table, v.privilege) {
            return Err(OptimizeError::PrivilegeDenied {
                user: user.to_string(),
                privilege: v.privilege.to_string(),
                object: v.object(),
            });
        }
    }
    Ok(())
}

/// 基于授权表的权限检查器
///
/// 表名为 `*` 表示库级授权，库名和表名都为 `*` 表示全局授权。
#[derive(Debug, Default)]
pub struct StaticPrivilegeChecker {
    grants: RwLock<HashMap<String, HashSet<(String, String, Privilege)>>>,
}

impl StaticPrivilegeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 给用户或角色授权
    pub fn grant(&self, grantee: &str, db: &str, table: &str, privilege: Privilege) {
        self.grants
            .write()
            .entry(grantee.to_string())
            .or_default()
            .insert((db.to_lowercase(), table.to_lowercase(), privilege));
    }

    pub fn revoke(&self, grantee: &str, db: &str, table: &str, privilege: Privilege) -> bool {
        self.grants
            .write()
            .get_mut(grantee)
            .map(|set| set.remove(&(db.to_lowercase(), table.to_lowercase(), privilege)))
            .unwrap_or(false)
    }
}

impl PrivilegeChecker for StaticPrivilegeChecker {
    fn request_verification(
        &self,
        user: &str,
        roles: &[String],
        db: &str,
        table: &str,
        privilege: Privilege,
    ) -> bool {
        let grants = self.grants.read();
        let candidates = [
            (db.to_string(), table.to_string()),
            (db.to_string(), "*".to_string()),
            ("*".to_string(), "*".to_string()),
        ];
        std::iter::once(user)
            .chain(roles.iter().map(|r| r.as_str()))
            .filter_map(|grantee| grants.get(grantee))
            .any(|set| {
                candidates
                    .iter()
                    .any(|(d, t)| set.contains(&(d.clone(), t.clone(), privilege)))
            })
    }
}

/// 表锁检查器
pub trait TableLockChecker: Send + Sync + Debug {
    fn check_table_lock(
        &self,
        session_id: u64,
        is: &InfoSchema,
        visit_info: &[VisitInfo],
    ) -> OptimizeResult<()>;
}

/// 默认表锁规则
///
/// 其他会话持有写锁时任何访问都失败；读锁下所有会话都不能写。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTableLockChecker;

impl TableLockChecker for DefaultTableLockChecker {
    fn check_table_lock(
        &self,
        session_id: u64,
        is: &InfoSchema,
        visit_info: &[VisitInfo],
    ) -> OptimizeResult<()> {
        for v in visit_info.iter().filter(|v| !v.table.is_empty()) {
            let lock = match is.table_by_name(&v.db, &v.table).and_then(|t| t.lock.clone()) {
                Some(lock) => lock,
                None => continue,
            };
            let conflict = match lock.tp {
                TableLockType::Write => lock.session_id != session_id,
                TableLockType::Read => v.privilege.is_write(),
            };
            if conflict {
                return Err(OptimizeError::TableLocked(v.object()));
            }
        }
        Ok(())
    }
}
