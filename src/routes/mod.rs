pub mod hazard;
pub mod user;
