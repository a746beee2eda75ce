//! Session agenda: reservations, persistence and the scheduling loop.

pub mod agenda;
pub mod reservation;

pub use agenda::Agenda;
pub use reservation::{SessionReservation, INVALID_RESERVATION_ID};
