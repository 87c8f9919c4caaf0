use chrono::{DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::domains::money::Money;
use crate::domains::products::models::ProductSales;

/// Day and month boundaries in the business time zone, as UTC instants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardWindow {
    pub tz: Tz,
    pub now: DateTime<Utc>,
    pub today_start: DateTime<Utc>,
    pub tomorrow_start: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
    pub last_month_start: DateTime<Utc>,
    /// Start of the seven local days ending today
    pub week_start: DateTime<Utc>,
}

impl DashboardWindow {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let first_of_month = today.with_day(1).unwrap_or(today);
        let first_of_last_month = first_of_month
            .checked_sub_months(Months::new(1))
            .unwrap_or(first_of_month);

        Self {
            tz,
            now,
            today_start: start_of_day(&tz, today),
            tomorrow_start: start_of_day(&tz, today + Duration::days(1)),
            month_start: start_of_day(&tz, first_of_month),
            last_month_start: start_of_day(&tz, first_of_last_month),
            week_start: start_of_day(&tz, today - Duration::days(6)),
        }
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now)
    }
}

fn start_of_day(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // midnight skipped by a DST jump
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|start| start.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentActivity {
    pub transaction_id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub final_amount: Money,
    pub points_earned: i64,
    pub transaction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
    pub orders: i64,
}

/// Raw counters produced by the store; growth is derived by the service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardMetrics {
    pub total_customers: i64,
    pub customers_this_month: i64,
    pub customers_last_month: i64,
    pub total_campaigns: i64,
    pub active_campaigns: i64,
    pub campaigns_ending_today: i64,
    pub total_segments: i64,
    pub segments_this_month: i64,
    pub total_transactions: i64,
    pub transactions_this_month: i64,
    pub transactions_last_month: i64,
    pub revenue_today: Money,
    pub revenue_this_month: Money,
    pub revenue_last_month: Money,
    pub recent_activity: Vec<RecentActivity>,
    pub top_products: Vec<ProductSales>,
    pub revenue_by_day: Vec<DailyRevenue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountStat {
    pub total: i64,
    pub this_month: i64,
    pub growth: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStat {
    pub total: i64,
    pub active: i64,
    pub ending_today: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentStat {
    pub total: i64,
    pub this_month: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueStat {
    pub today: Money,
    pub this_month: Money,
    pub growth: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub customers: CountStat,
    pub campaigns: CampaignStat,
    pub segments: SegmentStat,
    pub transactions: CountStat,
    pub revenue: RevenueStat,
    pub recent_activity: Vec<RecentActivity>,
    pub top_products: Vec<ProductSales>,
    pub revenue_by_day: Vec<DailyRevenue>,
    pub generated_at: DateTime<Utc>,
}
