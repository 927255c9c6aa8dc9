pub mod error;
pub mod identity;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod seatmap;
pub mod trip;
