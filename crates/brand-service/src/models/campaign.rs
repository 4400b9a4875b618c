//! 活动模型
//!
//! 每个品牌有且仅有一个名为 `base` 的基础活动，决定购买的基础积分/金币系数；
//! 其余活动挂在门店上，命中时在基础奖励之上叠加加成。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AccrualError, Result};

/// 基础活动名称
pub const BASE_CAMPAIGN_NAME: &str = "base";

/// 基础活动默认系数：每消费 1000 得 1 积分、1 金币
pub const BASE_POINT_FACTOR: f64 = 0.001;
pub const BASE_COIN_FACTOR: f64 = 0.001;

/// 基础活动金额上限
pub const BASE_MAX_VALUE: f64 = 1_000_000_000.0;

/// 活动状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Active,
    Inactive,
}

/// 活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub point_factor: f64,
    pub coin_factor: f64,
    pub status: CampaignStatus,
    /// 命中过该活动的购买次数，只增不减
    pub customer_count: i64,
    /// 关联门店
    pub branch_ids: Vec<i64>,
}

impl Campaign {
    /// 品牌入驻时创建的基础活动
    ///
    /// 时间窗口 2000-01-01 至 2100-01-01（UTC），金额区间 [0, 1e9]，
    /// 对任何实际购买都视为不设限。
    pub fn base_for_brand(brand_id: i64) -> Self {
        Self {
            id: 0,
            brand_id,
            name: BASE_CAMPAIGN_NAME.to_string(),
            min_value: 0.0,
            max_value: BASE_MAX_VALUE,
            start_date: utc_midnight(2000, 1, 1),
            end_date: utc_midnight(2100, 1, 1),
            point_factor: BASE_POINT_FACTOR,
            coin_factor: BASE_COIN_FACTOR,
            status: CampaignStatus::Active,
            customer_count: 0,
            branch_ids: Vec::new(),
        }
    }

    pub fn is_base(&self) -> bool {
        self.name == BASE_CAMPAIGN_NAME
    }

    /// 购买是否命中该活动
    ///
    /// 金额区间与时间窗口两端都是闭区间。
    pub fn matches(&self, amount: f64, purchase_date: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && self.min_value <= amount
            && amount <= self.max_value
            && self.start_date <= purchase_date
            && purchase_date <= self.end_date
    }

    /// 保存前的配置校验
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AccrualError::InvalidCampaign("活动名称不能为空".to_string()));
        }
        if self.start_date > self.end_date {
            return Err(AccrualError::InvalidCampaign(format!(
                "开始时间 {} 晚于结束时间 {}",
                self.start_date, self.end_date
            )));
        }
        if self.min_value.is_nan() || self.max_value.is_nan() || self.min_value > self.max_value {
            return Err(AccrualError::InvalidCampaign(format!(
                "金额下限 {} 大于上限 {}",
                self.min_value, self.max_value
            )));
        }
        let factors = [self.point_factor, self.coin_factor];
        if factors.iter().any(|f| f.is_nan() || *f < 0.0) {
            return Err(AccrualError::InvalidCampaign(
                "积分/金币系数不能为负".to_string(),
            ));
        }
        if self.customer_count < 0 {
            return Err(AccrualError::InvalidCampaign(
                "customer_count 不能为负".to_string(),
            ));
        }
        Ok(())
    }
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}
