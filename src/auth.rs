use sha2::{Digest, Sha256};

/// Hash a bearer session token for DB lookup (SHA-256 hex). Token issuance
/// belongs to the auth service; we only ever see and store the hash.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
