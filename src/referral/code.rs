//! Referral code format: `R2E-` followed by 12 upper-case hex digits.

pub const CODE_PREFIX: &str = "R2E-";
const HEX_LEN: usize = 12;

/// A fresh random code.
pub fn generate_referral_code() -> String {
    let bytes: [u8; HEX_LEN / 2] = rand::random();
    format!("{CODE_PREFIX}{}", hex::encode_upper(bytes))
}

pub fn is_valid_code(code: &str) -> bool {
    code.strip_prefix(CODE_PREFIX).is_some_and(|hex| {
        hex.len() == HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    })
}

/// Trim and upper-case a code taken from a URL or metadata.
/// Returns `None` if the result is not a well-formed code.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    is_valid_code(&code).then_some(code)
}
