//! Authentication: accounts, password hashing, signed session cookies, and
//! the request middleware that enforces role-based access.

pub mod accounts;
pub mod middleware;
pub mod password;
pub mod session;

pub use accounts::{check_credentials, create_account, optional_phone, register, NewAccount};
pub use middleware::{required_role, session_middleware, Session};
pub use password::{hash_password, validate_password, verify_password};
pub use session::{cookie_value, SessionClaims, SessionKeys};
