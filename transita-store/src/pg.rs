//! Postgres-backed stores. The conditional-write contract is met with row
//! locks (`SELECT ... FOR UPDATE`) plus guarded `UPDATE ... WHERE` statements
//! inside a transaction, so the availability precondition is evaluated at
//! write time rather than read-check-then-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use transita_core::{
    Booking, BookingError, BookingStatus, BookingStore, BusLayout, LedgerError, PaymentStatus,
    ScheduleDirectory, Seat, SeatStore,
};

fn ledger_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Store(e.to_string())
}

fn booking_err(e: sqlx::Error) -> BookingError {
    BookingError::Store(e.to_string())
}

pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_number: String,
    is_booked: bool,
    reserved_until: Option<DateTime<Utc>>,
    held_by: Option<String>,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            seat_number: row.seat_number,
            is_booked: row.is_booked,
            reserved_until: row.reserved_until,
            held_by: row.held_by,
        }
    }
}

/// Lock the requested seat rows and split them into missing / present.
async fn lock_seats(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    bus_id: Uuid,
    schedule_id: Uuid,
    seat_numbers: &[String],
) -> Result<Vec<SeatRow>, LedgerError> {
    sqlx::query_as::<_, SeatRow>(
        "SELECT seat_number, is_booked, reserved_until, held_by \
         FROM seats \
         WHERE bus_id = $1 AND schedule_id = $2 AND seat_number = ANY($3) \
         FOR UPDATE",
    )
    .bind(bus_id)
    .bind(schedule_id)
    .bind(seat_numbers.to_vec())
    .fetch_all(&mut **tx)
    .await
    .map_err(ledger_err)
}

fn missing_seats(requested: &[String], found: &[SeatRow]) -> Vec<String> {
    requested
        .iter()
        .filter(|sn| !found.iter().any(|row| &row.seat_number == *sn))
        .cloned()
        .collect()
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn seed_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO seats (bus_id, schedule_id, seat_number) \
             SELECT $1, $2, unnest($3::text[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .bind(seat_numbers.to_vec())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }

    async fn list_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Vec<Seat>, LedgerError> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT seat_number, is_booked, reserved_until, held_by \
             FROM seats \
             WHERE bus_id = $1 AND schedule_id = $2 \
             ORDER BY seat_number",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ledger_err)?;

        if rows.is_empty() {
            return Err(LedgerError::ScheduleNotFound {
                bus_id: bus_id.to_string(),
                schedule_id: schedule_id.to_string(),
            });
        }
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn hold_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        holder: &str,
        until: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err)?;

        let rows = lock_seats(&mut tx, bus_id, schedule_id, seat_numbers).await?;
        let missing = missing_seats(seat_numbers, &rows);
        if !missing.is_empty() {
            return Err(LedgerError::InvalidSeat(missing));
        }

        let now = Utc::now();
        let conflicts: Vec<String> = rows
            .iter()
            .filter(|row| {
                row.is_booked || matches!(row.reserved_until, Some(u) if u > now)
            })
            .map(|row| row.seat_number.clone())
            .collect();
        if !conflicts.is_empty() {
            return Err(LedgerError::SeatUnavailable(conflicts));
        }

        sqlx::query(
            "UPDATE seats SET reserved_until = $4, held_by = $5 \
             WHERE bus_id = $1 AND schedule_id = $2 AND seat_number = ANY($3)",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .bind(seat_numbers.to_vec())
        .bind(until)
        .bind(holder)
        .execute(&mut *tx)
        .await
        .map_err(ledger_err)?;

        tx.commit().await.map_err(ledger_err)
    }

    async fn book_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err)?;

        let rows = lock_seats(&mut tx, bus_id, schedule_id, seat_numbers).await?;
        let missing = missing_seats(seat_numbers, &rows);
        if !missing.is_empty() {
            return Err(LedgerError::InvalidSeat(missing));
        }

        let conflicts: Vec<String> = rows
            .iter()
            .filter(|row| row.is_booked)
            .map(|row| row.seat_number.clone())
            .collect();
        if !conflicts.is_empty() {
            return Err(LedgerError::SeatUnavailable(conflicts));
        }

        sqlx::query(
            "UPDATE seats \
             SET is_booked = TRUE, reserved_until = NULL, held_by = NULL \
             WHERE bus_id = $1 AND schedule_id = $2 AND seat_number = ANY($3)",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .bind(seat_numbers.to_vec())
        .execute(&mut *tx)
        .await
        .map_err(ledger_err)?;

        tx.commit().await.map_err(ledger_err)
    }

    async fn release_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE seats \
             SET is_booked = FALSE, reserved_until = NULL, held_by = NULL \
             WHERE bus_id = $1 AND schedule_id = $2 AND seat_number = ANY($3)",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .bind(seat_numbers.to_vec())
        .execute(&self.pool)
        .await
        .map_err(ledger_err)?;
        Ok(())
    }
}

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_ref: String,
    user_id: String,
    bus_id: Uuid,
    schedule_id: Uuid,
    seat_numbers: Vec<String>,
    fare_total: i64,
    currency: String,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking, BookingError> {
        let status = BookingStatus::parse(&self.status)?;
        let payment_status = PaymentStatus::parse(&self.payment_status)
            .map_err(|e| BookingError::Store(e.to_string()))?;
        Ok(Booking {
            id: self.id,
            booking_ref: self.booking_ref,
            user_id: self.user_id,
            bus_id: self.bus_id,
            schedule_id: self.schedule_id,
            seat_numbers: self.seat_numbers,
            fare_total: self.fare_total,
            currency: self.currency,
            status,
            payment_status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, booking_ref, user_id, bus_id, schedule_id, seat_numbers, \
                               fare_total, currency, status, payment_status, created_at, updated_at";

impl PgBookingStore {
    async fn fetch_row(&self, booking_ref: &str) -> Result<Option<BookingRow>, BookingError> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_ref = $1"
        ))
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(booking_err)
    }

    /// Map a failed conditional update: missing row vs. cancelled booking.
    async fn explain_update_miss(&self, booking_ref: &str) -> BookingError {
        match self.fetch_row(booking_ref).await {
            Ok(Some(_)) => BookingError::BookingCancelled(booking_ref.to_string()),
            Ok(None) => BookingError::NotFound(booking_ref.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError> {
        sqlx::query(
            "INSERT INTO bookings \
             (id, booking_ref, user_id, bus_id, schedule_id, seat_numbers, \
              fare_total, currency, status, payment_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(booking.id)
        .bind(&booking.booking_ref)
        .bind(&booking.user_id)
        .bind(booking.bus_id)
        .bind(booking.schedule_id)
        .bind(booking.seat_numbers.clone())
        .bind(booking.fare_total)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(booking_err)?;
        Ok(())
    }

    async fn fetch(&self, booking_ref: &str) -> Result<Option<Booking>, BookingError> {
        match self.fetch_row(booking_ref).await? {
            Some(row) => Ok(Some(row.into_booking()?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(booking_err)?;

        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn set_payment_status(
        &self,
        booking_ref: &str,
        status: PaymentStatus,
    ) -> Result<Booking, BookingError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET payment_status = $2, updated_at = NOW() \
             WHERE booking_ref = $1 AND status = 'CONFIRMED' \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_ref)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(booking_err)?;

        match row {
            Some(row) => row.into_booking(),
            None => Err(self.explain_update_miss(booking_ref).await),
        }
    }

    async fn mark_cancelled(&self, booking_ref: &str) -> Result<Booking, BookingError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() \
             WHERE booking_ref = $1 AND status <> 'CANCELLED' \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(booking_err)?;

        match row {
            Some(row) => row.into_booking(),
            // Already cancelled is a success no-op; only a missing row errors.
            None => match self.fetch_row(booking_ref).await? {
                Some(row) => row.into_booking(),
                None => Err(BookingError::NotFound(booking_ref.to_string())),
            },
        }
    }

    async fn cancel_if_payment_pending(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, BookingError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() \
             WHERE booking_ref = $1 AND status = 'CONFIRMED' AND payment_status = 'PENDING' \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(booking_err)?;

        match row {
            Some(row) => Ok(Some(row.into_booking()?)),
            None => match self.fetch_row(booking_ref).await? {
                // Paid, failed, or already cancelled in the meantime.
                Some(_) => Ok(None),
                None => Err(BookingError::NotFound(booking_ref.to_string())),
            },
        }
    }

    async fn remove_seats(
        &self,
        booking_ref: &str,
        seat_numbers: &[String],
        fare_per_seat: i64,
        booking_fee: i64,
    ) -> Result<Booking, BookingError> {
        let mut tx = self.pool.begin().await.map_err(booking_err)?;

        // Row lock: ownership and the remaining set are evaluated against
        // the current row, and concurrent removals serialize here.
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_ref = $1 FOR UPDATE"
        ))
        .bind(booking_ref)
        .fetch_optional(&mut *tx)
        .await
        .map_err(booking_err)?;

        let booking = match row {
            Some(row) => row.into_booking()?,
            None => return Err(BookingError::NotFound(booking_ref.to_string())),
        };
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::BookingCancelled(booking_ref.to_string()));
        }

        let not_owned: Vec<String> = seat_numbers
            .iter()
            .filter(|sn| !booking.seat_numbers.contains(sn))
            .cloned()
            .collect();
        if !not_owned.is_empty() {
            return Err(BookingError::SeatNotInBooking(not_owned));
        }

        let remaining: Vec<String> = booking
            .seat_numbers
            .iter()
            .filter(|sn| !seat_numbers.contains(sn))
            .cloned()
            .collect();

        let row = if remaining.is_empty() {
            sqlx::query_as::<_, BookingRow>(&format!(
                "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() \
                 WHERE booking_ref = $1 \
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(booking_ref)
            .fetch_one(&mut *tx)
            .await
            .map_err(booking_err)?
        } else {
            let fare_total = fare_per_seat * remaining.len() as i64 + booking_fee;
            sqlx::query_as::<_, BookingRow>(&format!(
                "UPDATE bookings SET seat_numbers = $2, fare_total = $3, updated_at = NOW() \
                 WHERE booking_ref = $1 \
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(booking_ref)
            .bind(remaining)
            .bind(fare_total)
            .fetch_one(&mut *tx)
            .await
            .map_err(booking_err)?
        };

        tx.commit().await.map_err(booking_err)?;
        row.into_booking()
    }

    async fn find_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'CONFIRMED' AND payment_status = 'PENDING' AND created_at <= $1 \
             ORDER BY created_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(booking_err)?;

        rows.into_iter().map(BookingRow::into_booking).collect()
    }
}

pub struct PgScheduleDirectory {
    pool: PgPool,
}

impl PgScheduleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    seat_numbers: Vec<String>,
    fare_per_seat: i64,
    currency: String,
}

#[async_trait]
impl ScheduleDirectory for PgScheduleDirectory {
    async fn seat_layout(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Option<BusLayout>, LedgerError> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT seat_numbers, fare_per_seat, currency \
             FROM schedules WHERE bus_id = $1 AND schedule_id = $2",
        )
        .bind(bus_id)
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ledger_err)?;

        Ok(row.map(|row| BusLayout {
            seat_numbers: row.seat_numbers,
            fare_per_seat: row.fare_per_seat,
            currency: row.currency,
        }))
    }
}
