use rand::RngCore;
use sha2::{Digest, Sha256};

/// A fresh bearer token. Returned to the caller exactly once at registration;
/// only its hash is ever persisted.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("insp_{}", hex::encode(bytes))
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of a candidate token against a stored hash.
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let candidate = hash_token(token);
    let a = candidate.as_bytes();
    let b = stored_hash.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_carry_the_insp_prefix_and_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with("insp_"));
        assert!(b.starts_with("insp_"));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_token_is_deterministic() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn verify_token_accepts_the_matching_token_and_rejects_others() {
        let token = generate_token();
        let hash = hash_token(&token);
        assert!(verify_token(&token, &hash));
        assert!(!verify_token("insp_wrong", &hash));
        assert!(!verify_token(&generate_token(), &hash));
    }
}
