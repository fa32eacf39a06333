use sha2::{Digest, Sha256};

pub trait PasswordHasher {
    fn hash(&self, password: &str) -> String;

    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        self.hash(password) == stored_hash
    }
}

/// Unsalted sha256 hex digest, the format stored in `passwordHash`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        format!("{:x}", Sha256::digest(password.as_bytes()))
    }
}
