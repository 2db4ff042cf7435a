mod config;
mod course;
mod routes;
mod throttle;
mod uploads;
pub mod utils;

pub use utils::{test_db, test_utils};
