mod handler;
mod model;
mod validate;

pub use handler::{create_hazard, delete_hazard, list_hazards};
