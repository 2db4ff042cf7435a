pub mod auth;
pub mod authentication;
pub mod password;
pub mod permissions;
pub mod throttle;
pub mod user;

pub use auth::*;
pub use authentication::*;
pub use password::*;
pub use permissions::*;
pub use throttle::*;
pub use user::*;
