use chrono::NaiveDate;
use sqlx::{Error as SqlxError, Postgres, Transaction};
use uuid::Uuid;

use crate::models::calendar_cell::cell_status;
use crate::models::CalendarCell;
use crate::DbPool;

pub struct CalendarCellRepository {
    pool: DbPool,
}

impl CalendarCellRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_range(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to_exclusive: NaiveDate,
    ) -> Result<Vec<CalendarCell>, SqlxError> {
        sqlx::query_as::<_, CalendarCell>(
            r#"SELECT * FROM calendar_cells
               WHERE property_id = $1 AND date >= $2 AND date < $3
               ORDER BY date ASC"#,
        )
        .bind(property_id)
        .bind(from)
        .bind(to_exclusive)
        .fetch_all(&self.pool)
        .await
    }

    /// Upserts a single cell's availability/price/min-stay fields, used by
    /// the outbound availability/pricing handlers and by inbound reads that
    /// discover a date with no row yet.
    pub async fn upsert_availability(
        &self,
        property_id: Uuid,
        date: NaiveDate,
        available: bool,
        price_override: Option<rust_decimal::Decimal>,
        min_stay: Option<i32>,
    ) -> Result<CalendarCell, SqlxError> {
        let status = if available {
            cell_status::AVAILABLE
        } else {
            cell_status::BLOCKED
        };

        sqlx::query_as::<_, CalendarCell>(
            r#"
            INSERT INTO calendar_cells (property_id, date, available, status, price_override, min_stay)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (property_id, date) DO UPDATE
            SET available = EXCLUDED.available,
                status = CASE WHEN calendar_cells.booking_id IS NOT NULL
                              THEN calendar_cells.status
                              ELSE EXCLUDED.status END,
                price_override = EXCLUDED.price_override,
                min_stay = EXCLUDED.min_stay,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(property_id)
        .bind(date)
        .bind(available)
        .bind(status)
        .bind(price_override)
        .bind(min_stay)
        .fetch_one(&self.pool)
        .await
    }

    /// Claims every date in `[check_in, check_out)` for `booking_id` within
    /// an existing transaction, relying on `UNIQUE(property_id, date)` plus
    /// a `WHERE booking_id IS NULL` guard to make the claim race-free: a
    /// concurrent claim over an overlapping range will conflict or touch
    /// zero rows for at least one date, and the caller rolls back.
    pub async fn claim_range<'a>(
        tx: &mut Transaction<'a, Postgres>,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out_exclusive: NaiveDate,
        booking_id: Uuid,
    ) -> Result<bool, SqlxError> {
        let mut date = check_in;
        while date < check_out_exclusive {
            let result = sqlx::query(
                r#"
                INSERT INTO calendar_cells (property_id, date, available, status, booking_id)
                VALUES ($1, $2, false, 'tentative', $3)
                ON CONFLICT (property_id, date) DO UPDATE
                SET status = 'tentative', available = false, booking_id = $3, updated_at = now()
                WHERE calendar_cells.booking_id IS NULL AND calendar_cells.available = true
                "#,
            )
            .bind(property_id)
            .bind(date)
            .bind(booking_id)
            .execute(&mut **tx)
            .await?;

            if result.rows_affected() == 0 {
                return Ok(false);
            }
            date += chrono::Duration::days(1);
        }
        Ok(true)
    }

    /// Relabels the cells held by `booking_id` (e.g. `tentative` ->
    /// `booked` on confirm), within an existing transaction so it commits
    /// atomically with the booking row's own status change.
    pub async fn mark_range_status<'a>(
        tx: &mut Transaction<'a, Postgres>,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out_exclusive: NaiveDate,
        booking_id: Uuid,
        status: &str,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"UPDATE calendar_cells SET status = $5, updated_at = now()
               WHERE property_id = $1 AND date >= $2 AND date < $3 AND booking_id = $4"#,
        )
        .bind(property_id)
        .bind(check_in)
        .bind(check_out_exclusive)
        .bind(booking_id)
        .bind(status)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Releases the cells held by a booking back to available, used on
    /// expiry/cancellation.
    pub async fn release_booking(&self, booking_id: Uuid) -> Result<(), SqlxError> {
        sqlx::query(
            r#"UPDATE calendar_cells
               SET booking_id = NULL, available = true, status = 'available', updated_at = now()
               WHERE booking_id = $1"#,
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
