use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::error::AppError;

/// Türkiye has stayed on UTC+03:00 all year since 2016.
const STORE_UTC_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySlot {
    pub code: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
}

pub const SLOTS: [DeliverySlot; 4] = [
    DeliverySlot {
        code: "09:00-12:00",
        start_hour: 9,
        end_hour: 12,
    },
    DeliverySlot {
        code: "12:00-15:00",
        start_hour: 12,
        end_hour: 15,
    },
    DeliverySlot {
        code: "15:00-18:00",
        start_hour: 15,
        end_hour: 18,
    },
    DeliverySlot {
        code: "18:00-21:00",
        start_hour: 18,
        end_hour: 21,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub lead_minutes: i64,
    pub max_days_ahead: i64,
}

pub fn store_offset() -> FixedOffset {
    FixedOffset::east_opt(STORE_UTC_OFFSET_SECS).expect("store offset is within range")
}

/// Calendar date in the store's time zone.
pub fn store_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&store_offset()).date_naive()
}

/// UTC instant at which `date` begins in the store's time zone.
pub fn store_day_start(date: NaiveDate) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(STORE_UTC_OFFSET_SECS))).and_utc()
}

pub fn find_slot(code: &str) -> Option<DeliverySlot> {
    SLOTS.into_iter().find(|slot| slot.code == code)
}

pub fn available_slots(
    date: NaiveDate,
    now: DateTime<Utc>,
    policy: DeliveryPolicy,
) -> Vec<DeliverySlot> {
    let local_now = now.with_timezone(&store_offset()).naive_local();
    let today = local_now.date();

    if date < today || date > today + Duration::days(policy.max_days_ahead) {
        return Vec::new();
    }

    let earliest_start = local_now + Duration::minutes(policy.lead_minutes);
    SLOTS
        .into_iter()
        .filter(|slot| {
            date.and_hms_opt(slot.start_hour, 0, 0)
                .is_some_and(|start| start >= earliest_start)
        })
        .collect()
}

/// Checkout cannot proceed until both a delivery date and a bookable slot are chosen.
pub fn validate_delivery(
    date: Option<NaiveDate>,
    slot: Option<&str>,
    now: DateTime<Utc>,
    policy: DeliveryPolicy,
) -> Result<(NaiveDate, DeliverySlot), AppError> {
    let date = date.ok_or_else(|| AppError::bad_request("delivery_date is required"))?;
    let code = slot
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("delivery_slot is required"))?;
    let slot = find_slot(code)
        .ok_or_else(|| AppError::BadRequest(format!("unknown delivery slot {code}")))?;

    if !available_slots(date, now, policy).contains(&slot) {
        return Err(AppError::BadRequest(format!(
            "delivery slot {code} is not available on {date}"
        )));
    }

    Ok((date, slot))
}
