pub mod reservation;
pub mod reservation_client;
pub mod serveme_client;
