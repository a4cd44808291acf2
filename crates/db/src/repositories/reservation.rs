use chrono::Utc;
use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::{CanonicalBooking, CreateCanonicalBooking};
use crate::repositories::calendar_cell::CalendarCellRepository;
use crate::DbPool;

/// Repository for the canonical booking aggregate, including the
/// transactional create path shared by direct bookings and channel imports.
pub struct ReservationRepository {
    pool: DbPool,
}

impl ReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CanonicalBooking>, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(r#"SELECT * FROM canonical_bookings WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CanonicalBooking>, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"SELECT * FROM canonical_bookings WHERE payment_intent_id = $1"#,
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_channel_booking_id(
        &self,
        source: &str,
        channel_booking_id: &str,
    ) -> Result<Option<CanonicalBooking>, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"SELECT * FROM canonical_bookings WHERE source = $1 AND channel_booking_id = $2"#,
        )
        .bind(source)
        .bind(channel_booking_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Reserves the booking's date range and inserts the booking row in one
    /// transaction. Returns `Ok(None)` if any date in the range is already
    /// held — the caller surfaces this as a 409 (direct flow) or a skipped
    /// SyncLog entry (channel import racing a direct booking).
    ///
    /// Relies on `UNIQUE(property_id, date)` on `calendar_cells` and on
    /// `UNIQUE(source, channel_booking_id)` on `canonical_bookings` as the
    /// authoritative race guards; the explicit `claim_range` check above it
    /// is an optimization, not the sole correctness mechanism.
    pub async fn create_holding_calendar(
        &self,
        input: CreateCanonicalBooking,
    ) -> Result<Option<CanonicalBooking>, SqlxError> {
        let booking_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let claimed = CalendarCellRepository::claim_range(
            &mut tx,
            input.property_id,
            input.check_in_date,
            input.check_out_date,
            booking_id,
        )
        .await?;

        if !claimed {
            tx.rollback().await.ok();
            return Ok(None);
        }

        let booking = sqlx::query_as::<_, CanonicalBooking>(
            r#"
            INSERT INTO canonical_bookings (
                id, property_id, guest_id, source, channel_booking_id, booking_reference,
                check_in_date, check_out_date, adults, children, infants,
                nightly_rate, subtotal, fees, taxes, total, currency,
                status, payment_status, payment_intent_id, expires_at, channel_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(input.property_id)
        .bind(input.guest_id)
        .bind(&input.source)
        .bind(&input.channel_booking_id)
        .bind(&input.booking_reference)
        .bind(input.check_in_date)
        .bind(input.check_out_date)
        .bind(input.adults)
        .bind(input.children)
        .bind(input.infants)
        .bind(input.nightly_rate)
        .bind(input.subtotal)
        .bind(input.fees)
        .bind(input.taxes)
        .bind(input.total)
        .bind(input.currency)
        .bind(&input.status)
        .bind(&input.payment_status)
        .bind(&input.payment_intent_id)
        .bind(input.expires_at)
        .bind(&input.channel_payload)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(booking))
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> Result<CanonicalBooking, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"UPDATE canonical_bookings SET status = $2, updated_at = now() WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_payment(
        &self,
        id: Uuid,
        payment_status: &str,
        payment_intent_id: Option<&str>,
    ) -> Result<CanonicalBooking, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"
            UPDATE canonical_bookings
            SET payment_status = $2, payment_intent_id = COALESCE($3, payment_intent_id), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payment_status)
        .bind(payment_intent_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Transitions a reserved booking to confirmed/paid in one statement,
    /// guarded by `status = 'reserved'` so a concurrent confirm or an
    /// expiry that already fired is a no-op (zero rows, caller treats as
    /// "not found in that state").
    #[allow(clippy::too_many_arguments)]
    pub async fn confirm(
        &self,
        id: Uuid,
        paid_amount: rust_decimal::Decimal,
        now: chrono::DateTime<Utc>,
    ) -> Result<Option<CanonicalBooking>, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"
            UPDATE canonical_bookings
            SET status = 'confirmed', payment_status = 'paid', paid_amount = $2,
                paid_at = $3, confirmed_at = $3, updated_at = $3
            WHERE id = $1 AND status = 'reserved'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(paid_amount)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    /// Transitions a booking to cancelled, recording the refund amount (if
    /// any) against `payment_status`.
    pub async fn cancel(
        &self,
        id: Uuid,
        payment_status: &str,
        reason: Option<&str>,
        now: chrono::DateTime<Utc>,
    ) -> Result<CanonicalBooking, SqlxError> {
        sqlx::query_as::<_, CanonicalBooking>(
            r#"
            UPDATE canonical_bookings
            SET status = 'cancelled', payment_status = $2, cancellation_reason = $3,
                cancelled_at = $4, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payment_status)
        .bind(reason)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Expires reservations whose 30-minute hold has elapsed without
    /// payment confirmation; releases their calendar cells in the same
    /// transaction. Returns the expired booking ids for best-effort
    /// payment-intent cancellation by the caller.
    pub async fn expire_stale_reservations(&self) -> Result<Vec<(Uuid, Option<String>)>, SqlxError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(Uuid, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, payment_intent_id FROM canonical_bookings
            WHERE status = 'reserved'
              AND payment_status != 'paid'
              AND expires_at IS NOT NULL
              AND expires_at <= now()
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(rows);
        }
        let ids: Vec<Uuid> = rows.iter().map(|(id, _)| *id).collect();

        sqlx::query(
            r#"UPDATE canonical_bookings
               SET status = 'cancelled', payment_status = 'expired', cancelled_at = now(), updated_at = now()
               WHERE id = ANY($1)"#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE calendar_cells
               SET booking_id = NULL, available = true, status = 'available', updated_at = now()
               WHERE booking_id = ANY($1)"#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows)
    }

    /// Next value of the `booking_reference_seq` Postgres sequence, used
    /// instead of `max(reference) + 1` to avoid the race a naive scan has
    /// under concurrent inserts. Format is `PMS-<year>-<000000>`; the
    /// sequence itself is global rather than per-year, so references stay
    /// monotonic even across a year boundary.
    pub async fn next_booking_reference(&self, year: i32) -> Result<String, SqlxError> {
        let (next,): (i64,) = sqlx::query_as(r#"SELECT nextval('booking_reference_seq')"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(format!("PMS-{year}-{next:06}"))
    }
}
