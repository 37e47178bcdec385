use sha2::{Digest, Sha256};

/// Hex SHA256 of migration SQL
pub fn compute_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
