//! # Submission Grading
//!
//! 学生作业提交与自动评分的核心库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有存储资源，只暴露读写能力
//! - `DurableStore` - 持久化文档存储（`JsonFileStore` / `MemoryStore`）
//! - `ReplicatedState` - 进程内复制状态，支持原子事务和整体替换
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识状态机
//! - `EvaluationService` - 调用评分服务，校验、裁剪分数、兜底
//! - `SettingsService` - 管理员设置（带版本号的单条记录）
//! - `statistics` - 纯函数统计
//! - `InMemoryNotifier` - 最多一次的事件广播
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份提交"的完整处理流程
//! - `SubmissionLifecycle` - 创建、状态迁移、定稿、重建、删除
//! - `GradingFlow` - 评分编排（开始评分 → 调用评分服务 → 定稿）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 应用装配、启动屏障、收件箱批量评分
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{GradingPrompt, GradingProvider};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{DurableStore, JsonFileStore, MemoryStore, ReplicatedState};
pub use models::{Analysis, Feedback, GradingConstraints, SettingsRecord, Submission, SubmissionStatus, SubmitRequest};
pub use orchestrator::App;
pub use services::{aggregate, EvaluationService, InMemoryNotifier, StatisticsScope, StatisticsSnapshot, ThresholdScale};
pub use workflow::{GradingFlow, GradingOutcome, ReloadSummary, SubmissionLifecycle};
