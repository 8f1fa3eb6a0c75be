//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和资源装配，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量评分处理器
//! - 管理应用生命周期（初始化、启动屏障、运行）
//! - 扫描收件箱，恢复上次未评分的提交
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息

pub mod batch_processor;

pub use batch_processor::App;
