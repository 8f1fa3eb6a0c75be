//! 基础设施层（Infrastructure）
//!
//! 持有存储资源，只暴露读写能力，不认识状态机和业务流程。
//!
//! - `durable_store` - 持久化文档存储接口 + 内存实现
//! - `file_store` - 基于 JSON 文件的持久化存储
//! - `replicated_state` - 进程内复制状态，支持原子事务

pub mod durable_store;
pub mod file_store;
pub mod replicated_state;

pub use durable_store::{DurableStore, MemoryStore, StoreResult};
pub use file_store::JsonFileStore;
pub use replicated_state::{Keyspace, ReplicatedState, Transaction};
