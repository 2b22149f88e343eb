//! Signature verification against a key set.

use std::collections::HashSet;

use jsonwebtoken::{Validation, decode, decode_header};

use crate::AuthResult;
use crate::claims::Claims;
use crate::error::AuthError;
use crate::keys::VerificationKey;
use crate::token::ParseOptions;

/// Verifies `token` against `keys` and returns its claims.
///
/// The header `kid` selects the key when it names one in the set. Otherwise
/// every key whose algorithm matches the header is tried in order.
///
/// # Errors
///
/// Returns `InvalidToken` if the token is malformed, no key matches, the
/// signature does not verify, or the token is expired or not yet valid.
pub fn verify_token(
    token: &str,
    keys: &[VerificationKey],
    options: &ParseOptions,
) -> AuthResult<Claims> {
    let header = decode_header(token)?;

    let by_kid: Vec<&VerificationKey> = match header.kid.as_deref() {
        Some(kid) => keys.iter().filter(|k| k.kid == kid).collect(),
        None => Vec::new(),
    };
    let candidates = if by_kid.is_empty() {
        keys.iter().filter(|k| k.algorithm == header.alg).collect()
    } else {
        by_kid
    };

    if candidates.is_empty() {
        return Err(AuthError::invalid_token(format!(
            "no verification key for kid {:?}",
            header.kid
        )));
    }

    let mut last_error = None;
    for key in candidates {
        if key.algorithm != header.alg {
            last_error = Some(AuthError::invalid_token("algorithm does not match key"));
            continue;
        }

        match decode::<Claims>(token, &key.key, &validation(key, options)) {
            Ok(data) => return Ok(data.claims),
            Err(e) => last_error = Some(AuthError::from(e)),
        }
    }

    Err(last_error.unwrap_or_else(|| AuthError::invalid_token("token did not verify")))
}

fn validation(key: &VerificationKey, options: &ParseOptions) -> Validation {
    let mut validation = Validation::new(key.algorithm);
    validation.validate_exp = !options.allow_expired;
    validation.validate_nbf = true;
    validation.validate_aud = false; // audience is checked by claim requirements
    validation.leeway = options.leeway.as_secs();
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);
    validation
}
