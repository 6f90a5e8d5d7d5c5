//! SqlOpt - 分布式 SQL 引擎的代价优化器与执行计划绑定子系统
//!
//! 给定已解析的语句和 schema 快照，选择代价最低的物理执行计划；
//! 同时维护会话级和全局级的计划绑定（baseline），在启用时用绑定覆盖代价模型的选择，
//! 并通过演进任务不断验证、提升或淘汰候选绑定。

pub mod config;
pub mod core;
pub mod query;
pub mod utils;
