use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy)]
pub struct ShippingPolicy {
    pub flat_fee: i64,
    pub free_threshold: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CartLine {
    pub unit_price: i64,
    pub quantity: i32,
}

/// Totals in kuruş.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartSummary {
    pub item_count: i64,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total: i64,
}

/// Price actually charged: the discount applies only when it undercuts the list price.
pub fn effective_price(price: i64, discount_price: Option<i64>) -> i64 {
    match discount_price {
        Some(discount) if discount > 0 && discount < price => discount,
        _ => price,
    }
}

pub fn summarize(lines: &[CartLine], policy: ShippingPolicy) -> CartSummary {
    let item_count = lines.iter().map(|l| i64::from(l.quantity)).sum::<i64>();
    let subtotal = lines
        .iter()
        .map(|l| l.unit_price * i64::from(l.quantity))
        .sum::<i64>();

    let shipping_fee = if lines.is_empty() || subtotal >= policy.free_threshold {
        0
    } else {
        policy.flat_fee
    };

    CartSummary {
        item_count,
        subtotal,
        shipping_fee,
        total: subtotal + shipping_fee,
    }
}
