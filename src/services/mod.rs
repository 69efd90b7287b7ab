pub mod availability;
pub mod calendar;
pub mod intervals;
pub mod scheduling;
