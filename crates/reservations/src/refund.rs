//! Moderate cancellation policy: the refund fraction of the total charged,
//! based on how many days out check-in is at the moment of cancellation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub fn refund_amount(total: Decimal, check_in: NaiveDate, today: NaiveDate) -> Decimal {
    let days_out = (check_in - today).num_days();
    if days_out >= 7 {
        total
    } else if days_out >= 3 {
        total * dec!(0.5)
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn a_week_or_more_out_refunds_in_full() {
        let amount = refund_amount(dec!(300), date(2026, 8, 20), date(2026, 8, 10));
        assert_eq!(amount, dec!(300));
    }

    #[test]
    fn between_three_and_seven_days_out_refunds_half() {
        let amount = refund_amount(dec!(300), date(2026, 8, 14), date(2026, 8, 10));
        assert_eq!(amount, dec!(150.0));
    }

    #[test]
    fn inside_three_days_refunds_nothing() {
        let amount = refund_amount(dec!(300), date(2026, 8, 12), date(2026, 8, 10));
        assert_eq!(amount, Decimal::ZERO);
    }

    #[test]
    fn boundary_at_exactly_seven_days_refunds_in_full() {
        assert_eq!(refund_amount(dec!(100), date(2026, 8, 17), date(2026, 8, 10)), dec!(100));
    }

    #[test]
    fn boundary_at_exactly_three_days_refunds_half() {
        assert_eq!(refund_amount(dec!(100), date(2026, 8, 13), date(2026, 8, 10)), dec!(50.0));
    }
}
