//! Direct-booking reservation flow: availability, pricing, payment capture,
//! and cancellation/refund, layered on the same canonical booking table and
//! calendar cells the channel sync engine writes to.

pub mod booking;
pub mod context;
pub mod error;
pub mod payment;
pub mod pricing;
pub mod refund;
pub mod webhook;

pub use booking::{
    cancel_booking, check_availability, confirm_booking, create_booking, expire_stale_reservations,
    CreateBookingOutcome, CreateBookingRequest,
};
pub use context::ReservationContext;
pub use error::{PaymentError, ReservationError};
pub use payment::{PaymentIntent, PaymentProcessor, Refund, StripePaymentProcessor};
pub use pricing::{compute_breakdown, PriceBreakdown, PropertyPricing};
pub use refund::refund_amount;
pub use webhook::{handle_stripe_event, verify_signature, StripeEvent};
