pub mod api_key;
pub mod session;
pub mod user;
