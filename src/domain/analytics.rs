use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    delivery::store_date,
    order_status::{OrderStatus, PaymentStatus},
};

#[derive(Debug, Clone)]
pub struct OrderFact {
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderFact {
    fn counts_as_revenue(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalesTotals {
    pub order_count: i64,
    pub paid_order_count: i64,
    pub revenue: i64,
    pub average_order_value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalesPoint {
    pub period_start: NaiveDate,
    pub order_count: i64,
    pub revenue: i64,
}

/// Every status appears in the output, in lifecycle order, even when its count is zero.
pub fn tally_statuses(facts: &[OrderFact]) -> Vec<StatusCount> {
    OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: facts.iter().filter(|f| f.status == status).count() as i64,
        })
        .collect()
}

pub fn summarize(facts: &[OrderFact]) -> SalesTotals {
    let paid: Vec<&OrderFact> = facts.iter().filter(|f| f.counts_as_revenue()).collect();
    let revenue = paid.iter().map(|f| f.total_amount).sum::<i64>();
    let paid_order_count = paid.len() as i64;
    let average_order_value = if paid_order_count == 0 {
        0
    } else {
        revenue / paid_order_count
    };

    SalesTotals {
        order_count: facts.len() as i64,
        paid_order_count,
        revenue,
        average_order_value,
    }
}

pub fn period_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_period(start: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Day => start.succ_opt(),
        Granularity::Week => start.checked_add_signed(Duration::days(7)),
        Granularity::Month => {
            let (year, month) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
        }
    }
}

/// Buckets orders placed between `from` and `to` (inclusive, store-local dates)
/// into contiguous periods. Periods without orders are reported with zeros.
pub fn group_sales(
    facts: &[OrderFact],
    from: NaiveDate,
    to: NaiveDate,
    granularity: Granularity,
) -> Vec<SalesPoint> {
    if from > to {
        return Vec::new();
    }

    let mut points = Vec::new();
    let mut cursor = Some(period_start(from, granularity));
    while let Some(start) = cursor.filter(|s| *s <= to) {
        points.push(SalesPoint {
            period_start: start,
            order_count: 0,
            revenue: 0,
        });
        cursor = next_period(start, granularity);
    }

    for fact in facts {
        let day = store_date(fact.created_at);
        if day < from || day > to {
            continue;
        }
        let bucket = period_start(day, granularity);
        if let Some(point) = points.iter_mut().find(|p| p.period_start == bucket) {
            point.order_count += 1;
            if fact.counts_as_revenue() {
                point.revenue += fact.total_amount;
            }
        }
    }

    points
}
