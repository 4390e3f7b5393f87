//! Daily check-in/check-out records and how each day is classified.

pub mod classifier;
pub mod repository;
pub mod store;

pub use store::AttendanceStore;
