pub mod attendance;
pub mod health;
pub mod user;
