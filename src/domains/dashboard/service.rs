//! Dashboard figures for the back office home page

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use shared::Result;
use std::sync::Arc;
use tracing::debug;

use super::models::{
    CampaignStat, CountStat, DashboardMetrics, DashboardStats, DashboardWindow, RevenueStat, SegmentStat,
};
use crate::domains::context::Principal;
use crate::store::CrmStore;

/// Month-over-month change in whole percent, half away from zero.
/// Growth from nothing counts as 100%.
pub fn growth_percent(current: i64, previous: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    let change = Decimal::from(current - previous) * Decimal::from(100) / Decimal::from(previous);
    change
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

pub fn build_stats(metrics: DashboardMetrics, generated_at: DateTime<Utc>) -> DashboardStats {
    DashboardStats {
        customers: CountStat {
            total: metrics.total_customers,
            this_month: metrics.customers_this_month,
            growth: growth_percent(metrics.customers_this_month, metrics.customers_last_month),
        },
        campaigns: CampaignStat {
            total: metrics.total_campaigns,
            active: metrics.active_campaigns,
            ending_today: metrics.campaigns_ending_today,
        },
        segments: SegmentStat {
            total: metrics.total_segments,
            this_month: metrics.segments_this_month,
        },
        transactions: CountStat {
            total: metrics.total_transactions,
            this_month: metrics.transactions_this_month,
            growth: growth_percent(metrics.transactions_this_month, metrics.transactions_last_month),
        },
        revenue: RevenueStat {
            today: metrics.revenue_today,
            this_month: metrics.revenue_this_month,
            growth: growth_percent(metrics.revenue_this_month.minor(), metrics.revenue_last_month.minor()),
        },
        recent_activity: metrics.recent_activity,
        top_products: metrics.top_products,
        revenue_by_day: metrics.revenue_by_day,
        generated_at,
    }
}

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn CrmStore>,
    tz: Tz,
}

impl DashboardService {
    pub fn new(store: Arc<dyn CrmStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub async fn stats(&self, principal: &Principal) -> Result<DashboardStats> {
        self.stats_at(principal, Utc::now()).await
    }

    pub async fn stats_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<DashboardStats> {
        principal.require_back_office()?;
        let window = DashboardWindow::new(now, self.tz);
        debug!(
            restaurant_id = %principal.restaurant_id,
            today = %window.today(),
            tz = %self.tz,
            "Computing dashboard"
        );
        let metrics = self
            .store
            .dashboard_metrics(principal.restaurant_id, &window)
            .await?;
        Ok(build_stats(metrics, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::money::Money;

    #[test]
    fn growth_handles_zero_baseline() {
        assert_eq!(growth_percent(5, 0), 100);
        assert_eq!(growth_percent(0, 0), 0);
        assert_eq!(growth_percent(0, 4), -100);
    }

    #[test]
    fn growth_rounds_half_away_from_zero() {
        // 1/8 = 12.5%
        assert_eq!(growth_percent(9, 8), 13);
        assert_eq!(growth_percent(7, 8), -13);
        assert_eq!(growth_percent(4, 3), 33);
    }

    #[test]
    fn revenue_growth_uses_minor_units() {
        let metrics = DashboardMetrics {
            revenue_this_month: Money::from_units(150),
            revenue_last_month: Money::from_units(100),
            customers_this_month: 3,
            ..Default::default()
        };
        let stats = build_stats(metrics, Utc::now());
        assert_eq!(stats.revenue.growth, 50);
        assert_eq!(stats.customers.growth, 100);
    }
}
