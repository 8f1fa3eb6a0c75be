//! 设置服务 - 业务能力层
//!
//! 管理员设置存放在复制状态中，只有一条记录，每次修改版本号加一。

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::infrastructure::ReplicatedState;
use crate::models::{GradingConstraints, SettingsRecord};

pub struct SettingsService {
    state: Arc<ReplicatedState>,
}

impl SettingsService {
    pub fn new(state: Arc<ReplicatedState>) -> Self {
        Self { state }
    }

    /// 读取当前设置
    ///
    /// 记录中的约束不合法时退回默认约束
    pub async fn current(&self) -> SettingsRecord {
        let mut settings = self.state.settings().await;
        if let Err(e) = settings.constraints.validate() {
            warn!("⚠️ 设置中的评分约束无效，使用默认值: {}", e);
            settings.constraints = GradingConstraints::default();
        }
        settings
    }

    pub async fn constraints(&self) -> GradingConstraints {
        self.current().await.constraints
    }

    /// 首次启动时写入初始设置，已有设置（版本号 > 0）时不做任何修改
    pub async fn seed(
        &self,
        constraints: GradingConstraints,
        max_submissions_per_student: Option<u32>,
    ) -> AppResult<SettingsRecord> {
        constraints.validate()?;

        let mut tx = self.state.begin().await?;
        let existing = self.state.settings().await;
        if existing.version > 0 {
            return Ok(existing);
        }

        let seeded = SettingsRecord {
            version: 1,
            constraints,
            max_submissions_per_student,
        };
        tx.put_settings(seeded.clone());
        tx.commit().await?;

        info!(
            "⚙️ 已写入初始设置: 分数区间 [{}, {}]",
            seeded.constraints.min_grade, seeded.constraints.max_grade
        );
        Ok(seeded)
    }

    /// 修改评分约束
    pub async fn update_constraints(&self, constraints: GradingConstraints) -> AppResult<SettingsRecord> {
        constraints.validate()?;
        self.modify(|settings| settings.constraints = constraints).await
    }

    /// 修改每个学生的提交上限（`None` 表示不限制）
    pub async fn set_max_submissions(&self, limit: Option<u32>) -> AppResult<SettingsRecord> {
        self.modify(|settings| settings.max_submissions_per_student = limit).await
    }

    async fn modify(&self, change: impl FnOnce(&mut SettingsRecord)) -> AppResult<SettingsRecord> {
        let mut tx = self.state.begin().await?;
        let mut settings = self.state.settings().await;
        change(&mut settings);
        settings.version += 1;
        tx.put_settings(settings.clone());
        tx.commit().await?;

        info!("⚙️ 设置已更新，版本: {}", settings.version);
        Ok(settings)
    }
}
