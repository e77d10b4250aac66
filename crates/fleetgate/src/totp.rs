use crate::error::{FleetError, FleetResult};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;

/// Build a code generator from a base32 seed, rejecting malformed seeds.
///
/// Seeds handed out by the control plane are often shorter than 128 bits,
/// so the unchecked constructor is used after decoding succeeds.
pub fn totp_from_seed(seed: &str) -> FleetResult<TOTP> {
    let normalized: String = seed
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(FleetError::AuthenticationConfig(
            "TOTP seed is empty".to_string(),
        ));
    }

    let secret_bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|e| FleetError::AuthenticationConfig(format!("TOTP seed is not base32: {e}")))?;

    Ok(TOTP::new_unchecked(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP,
        secret_bytes,
        None,
        String::new(),
    ))
}

/// Current one-time code for the seed.
pub fn current_code(seed: &str) -> FleetResult<String> {
    let totp = totp_from_seed(seed)?;
    totp.generate_current()
        .map_err(|e| FleetError::AuthenticationConfig(format!("system clock error: {e}")))
}
