//! Time-based one-time codes (RFC 6238) for the portals' 2FA prompts.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::AdapterError;

const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;

type HmacSha1 = Hmac<Sha1>;

/// Generates the 6-digit code for `secret` (base32) at `unix_secs`.
pub fn generate(secret: &str, unix_secs: u64) -> Result<String, AdapterError> {
    let cleaned: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_uppercase();

    let key = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &cleaned)
        .ok_or_else(|| AdapterError::TwoFactor("segredo TOTP não é base32 válido".to_string()))?;

    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| AdapterError::TwoFactor(format!("chave TOTP inválida: {}", e)))?;
    mac.update(&(unix_secs / STEP_SECS).to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    Ok(format!(
        "{:0width$}",
        binary % 10u32.pow(DIGITS),
        width = DIGITS as usize
    ))
}

/// Code for the current wall-clock time.
pub fn now(secret: &str) -> Result<String, AdapterError> {
    let unix_secs = chrono::Utc::now().timestamp().max(0) as u64;
    generate(secret, unix_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    // base32 of the RFC 6238 SHA1 seed "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_vectors() {
        assert_eq!(generate(RFC_SECRET, 59).unwrap(), "287082");
        assert_eq!(generate(RFC_SECRET, 1111111109).unwrap(), "081804");
        assert_eq!(generate(RFC_SECRET, 1234567890).unwrap(), "005924");
        assert_eq!(generate(RFC_SECRET, 2000000000).unwrap(), "279037");
    }

    #[test]
    fn test_secret_is_case_and_space_insensitive() {
        let spaced = "gezd gnbv gy3t qojq gezd gnbv gy3t qojq";
        assert_eq!(generate(spaced, 59).unwrap(), "287082");
    }

    #[test]
    fn test_invalid_secret() {
        let err = generate("not base32!", 59).unwrap_err();
        assert!(matches!(err, AdapterError::TwoFactor(_)));
    }

    #[test]
    fn test_now_has_six_digits() {
        let code = now(RFC_SECRET).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
