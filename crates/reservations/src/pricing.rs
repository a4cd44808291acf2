//! Price breakdown for a stay: nightly rates (calendar overrides beat the
//! property default), cleaning fee, a flat 5% service fee, and tax.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

const SERVICE_FEE_RATE: Decimal = dec!(0.05);

/// The subset of a property's pricing configuration the breakdown needs.
/// Properties themselves live outside this crate's domain; callers resolve
/// one and pass it in.
#[derive(Debug, Clone, Copy)]
pub struct PropertyPricing {
    pub base_price: Decimal,
    pub cleaning_fee: Decimal,
    pub tax_rate: Decimal,
    pub tax_included: bool,
}

#[derive(Debug, Clone)]
pub struct PriceBreakdown {
    pub nights: i64,
    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    pub cleaning_fee: Decimal,
    pub service_fee: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
}

/// `price_overrides` maps a date to the calendar cell's override price, if
/// any; dates absent from the map fall back to `property.base_price`.
pub fn compute_breakdown(
    check_in: NaiveDate,
    check_out: NaiveDate,
    property: &PropertyPricing,
    price_overrides: &HashMap<NaiveDate, Decimal>,
) -> PriceBreakdown {
    let nights = (check_out - check_in).num_days();

    let mut subtotal = Decimal::ZERO;
    let mut date = check_in;
    while date < check_out {
        subtotal += price_overrides.get(&date).copied().unwrap_or(property.base_price);
        date += chrono::Duration::days(1);
    }

    let nightly_rate = if nights > 0 {
        subtotal / Decimal::from(nights)
    } else {
        property.base_price
    };

    let service_fee = round_half_up_to_cents((subtotal + property.cleaning_fee) * SERVICE_FEE_RATE);

    let taxes = if property.tax_included {
        Decimal::ZERO
    } else {
        round_half_up_to_cents((subtotal + property.cleaning_fee + service_fee) * property.tax_rate)
    };

    let total = subtotal + property.cleaning_fee + service_fee + taxes;

    PriceBreakdown {
        nights,
        nightly_rate,
        subtotal,
        cleaning_fee: property.cleaning_fee,
        service_fee,
        taxes,
        total,
    }
}

fn round_half_up_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property() -> PropertyPricing {
        PropertyPricing {
            base_price: dec!(100),
            cleaning_fee: dec!(20),
            tax_rate: dec!(0.10),
            tax_included: false,
        }
    }

    #[test]
    fn three_nights_at_base_price_with_tax() {
        let breakdown = compute_breakdown(
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 13).unwrap(),
            &property(),
            &HashMap::new(),
        );
        assert_eq!(breakdown.nights, 3);
        assert_eq!(breakdown.subtotal, dec!(300));
        assert_eq!(breakdown.service_fee, dec!(16.00));
        assert_eq!(breakdown.taxes, dec!(33.60));
        assert_eq!(breakdown.total, dec!(369.60));
    }

    #[test]
    fn tax_included_property_charges_no_separate_tax() {
        let mut included = property();
        included.tax_included = true;
        let breakdown = compute_breakdown(
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
            &included,
            &HashMap::new(),
        );
        assert_eq!(breakdown.taxes, Decimal::ZERO);
    }

    #[test]
    fn per_date_overrides_beat_the_base_price() {
        let mut overrides = HashMap::new();
        overrides.insert(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(), dec!(150));
        let breakdown = compute_breakdown(
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
            &property(),
            &overrides,
        );
        assert_eq!(breakdown.subtotal, dec!(250));
    }
}
