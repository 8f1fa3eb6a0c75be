//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::services::StatisticsSnapshot;

/// 初始化全局日志
///
/// 优先使用 `RUST_LOG`，否则根据 `verbose` 选择 `debug` 或 `info`。
/// 重复调用不会报错（测试中会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 作业评分模式");
    info!("📊 最大并发数: {}", config.max_concurrent_submissions);
    info!("🤖 评分服务: {:?}", config.provider);
    info!("💾 数据目录: {} (从副本 {} 个)", config.data_dir, config.replica_count);
    info!("{}", "=".repeat(60));
}

/// 记录提交加载信息
///
/// # 参数
/// - `total`: 提交总数
/// - `max_concurrent`: 最大并发数
pub fn log_submissions_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待评分的提交", total);
    info!("📋 最多同时评分 {} 个", max_concurrent);
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 评分成功数量
/// - `failed`: 失败数量（包括兜底结果）
/// - `snapshot`: 全部反馈的统计快照
pub fn print_final_stats(success: usize, failed: usize, snapshot: &StatisticsSnapshot) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, success + failed);
    info!("❌ 失败: {}", failed);
    info!("{}", "─".repeat(60));
    info!("📈 有效反馈: {}，平均分: {:.2}", snapshot.total, snapshot.average_grade);
    info!(
        "🏷️ 分档 (≥{} / ≥{} / 其他): {} / {} / {}",
        snapshot.scale.high_min,
        snapshot.scale.middle_min,
        snapshot.buckets.high,
        snapshot.buckets.middle,
        snapshot.buckets.low
    );
    for (grade, count) in &snapshot.grade_distribution {
        info!("   {:>3} 分: {}", grade, count);
    }
    for (problem, count) in snapshot.top_problems(5) {
        info!("   🔸 {} ({} 次)", truncate_text(problem, 50), count);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
