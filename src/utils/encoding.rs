//! Base64URL helpers for the transport boundary
//!
//! Browsers emit unpadded Base64URL, but some client libraries pad it; decoding
//! accepts both while encoding always emits the unpadded form.

use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded Base64URL
#[must_use]
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode Base64URL with or without padding
///
/// # Errors
/// Returns the decoding error for characters outside the URL-safe alphabet or a
/// malformed length
pub fn decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT.decode(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode("AQI").unwrap(), vec![1, 2]);
        assert_eq!(decode("AQI=").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        assert!(decode("+/8").is_err());
    }

    #[test]
    fn test_encode_is_unpadded() {
        assert_eq!(encode([1u8, 2]), "AQI");
    }
}
