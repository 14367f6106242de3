use crate::error::AppError;

/// bcrypt is CPU bound, so both directions run on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| AppError::Internal(format!("hashing task failed: {err}")))?
        .map_err(|err| AppError::Internal(format!("failed to hash password: {err}")))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| AppError::Internal(format!("verification task failed: {err}")))?
        .map_err(|err| AppError::Internal(format!("failed to verify password: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};

    #[tokio::test]
    async fn hash_is_salted_and_verifies() {
        let first = hash_password("hunter22".to_string(), 4).await.unwrap();
        let second = hash_password("hunter22".to_string(), 4).await.unwrap();

        assert_ne!(first, second);
        assert!(verify_password("hunter22".to_string(), first).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_password_does_not_verify() {
        let hash = hash_password("hunter22".to_string(), 4).await.unwrap();
        assert!(!verify_password("hunter23".to_string(), hash).await.unwrap());
    }
}
