mod handler;
mod model;

pub use handler::{login, me, refresh_token, register};
