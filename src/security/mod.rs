/// Security primitives for the accounts service
///
/// - **password**: Argon2id password hashing and verification
///
/// Session-token signing lives with the controller layer, not here.
pub mod password;

pub use password::{hash_password, verify_password};
