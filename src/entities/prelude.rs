pub use super::api_keys::Entity as ApiKeys;
pub use super::sessions::Entity as Sessions;
pub use super::users::Entity as Users;
