use tracing::warn;

use crate::error::AppError;

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub fn hash_secret(secret: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(secret, cost)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    match bcrypt::verify(secret, hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!(error = %e, "Stored credential hash could not be verified");
            false
        }
    }
}

/// Verifies against the stored hash, or burns one hash of the same cost when
/// there is no account, so unknown emails answer as slowly as known ones.
pub fn verify_secret_or_burn(secret: &str, hash: Option<&str>, cost: u32) -> bool {
    match hash {
        Some(hash) => verify_secret(secret, hash),
        None => {
            let _ = bcrypt::hash(secret, cost);
            false
        }
    }
}
