pub mod db;
pub mod rate_limiting;
mod services;
pub use services::*;
mod user_providers;
pub use user_providers::*;
