pub mod api_keys;
pub use api_keys::{ApiKeyInfo, ApiKeyManager, ApiKeyStatus, IssuedApiKey};

pub mod credentials;
pub use credentials::{Argon2Scheme, CredentialVerifier, PasswordScheme};

pub mod lockout;
pub use lockout::{AttemptGuard, FailureOutcome, LockStatus, LockoutPolicy, LockoutTracker};

pub mod sessions;
pub use sessions::{IssuedSession, SessionManager};

pub mod tokens;
pub mod validation;

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, Identity, IssueOnLogin, LoginRequest, LoginSuccess};
pub use auth_service_impl::SeaOrmAuthService;

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{AdminUserUpdate, NewUser, UserError, UserProfile, UserService};
pub use user_service_impl::SeaOrmUserService;
