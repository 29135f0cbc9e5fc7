//! Authentication: password hashing and bearer-token sessions.

mod password;
mod session;

pub use password::{check_password_rules, hash_password, verify_password, MIN_PASSWORD_LEN};
pub use session::{bearer_token, generate_token, issue_session, CurrentUser};
