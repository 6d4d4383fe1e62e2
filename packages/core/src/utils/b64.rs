// Base64: text-safe форма envelope для транспорта

use crate::status::StatusCode;
use base64::{engine::general_purpose, Engine};

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

/// Decode a transport body. ASCII whitespace (line wrapping, trailing
/// newline) is ignored; anything else that is not base64 is `InvalidEncoding`.
pub fn decode(text: &str) -> Result<Vec<u8>, StatusCode> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| StatusCode::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_body_decodes() {
        let text = encode(&[1u8; 60]);
        let (head, tail) = text.split_at(40);
        let wrapped = format!("{}\r\n{}\n", head, tail);
        assert_eq!(decode(&wrapped).unwrap(), vec![1u8; 60]);
    }

    #[test]
    fn test_garbage_is_invalid_encoding() {
        assert_eq!(decode("not base64!!").unwrap_err(), StatusCode::InvalidEncoding);
    }
}
