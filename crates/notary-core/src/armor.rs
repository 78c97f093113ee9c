//! Armored frame (C2).
//!
//! Bit-exact interchange format for signed instruments: deflate-compress,
//! base64-encode, wrap at [`ARMOR_LINE_WIDTH`] columns, and bookend with
//! `-----BEGIN OT ARMORED <TYPE>-----` / `-----END OT ARMORED <TYPE>-----`.
//! An escaped variant prefixes each bookend line with `"- "`, used when an
//! armored block is nested inside another signed block. Grounded on
//! `OTASCIIArmor::WriteArmoredString`/`LoadFromString` in the original
//! implementation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::constants::{ARMOR_LINE_WIDTH, ARMOR_VERSION};
use crate::error::NotaryError;

const BEGIN: &str = "-----BEGIN OT ARMORED";
const END: &str = "-----END OT ARMORED";
const ESCAPE: &str = "- ";

/// Compress, base64-encode, and bookend `payload` under `type_tag`.
pub fn encode(payload: &[u8], type_tag: &str, escaped: bool) -> Result<String, NotaryError> {
    let compressed = compress(payload)?;
    let b64 = BASE64.encode(&compressed);
    let wrapped = wrap_lines(&b64, ARMOR_LINE_WIDTH);

    let prefix = if escaped { ESCAPE } else { "" };
    let mut out = String::new();
    out.push_str(&format!("{prefix}{BEGIN} {type_tag}-----\n"));
    out.push_str(&format!("Version: {ARMOR_VERSION}\n"));
    out.push_str("Comment: http://opentransactions.org\n\n");
    out.push_str(&wrapped);
    if !wrapped.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("{prefix}{END} {type_tag}-----\n"));
    Ok(out)
}

/// Locate bookends (accepting either escaped or unescaped form), skip header
/// lines, concatenate, base64-decode, and inflate.
pub fn decode(framed: &str) -> Result<Vec<u8>, NotaryError> {
    let mut in_content = false;
    let mut entered_content = false;
    let mut body = String::new();

    for line in framed.lines() {
        let trimmed_for_dash_check = line;
        let is_dashed = trimmed_for_dash_check.starts_with("-----")
            || trimmed_for_dash_check.starts_with("- -----");

        if is_dashed {
            if !entered_content {
                if line.contains(BEGIN) {
                    entered_content = true;
                    in_content = true;
                }
                continue;
            } else if in_content && line.contains(END) {
                in_content = false;
                continue;
            }
        } else if entered_content && in_content {
            if line.starts_with("Version:") || line.starts_with("Comment:") {
                continue;
            }
            if line.is_empty() {
                continue;
            }
            body.push_str(line);
        }
    }

    if !entered_content {
        return Err(NotaryError::MalformedArmor(
            "no BEGIN bookend found".into(),
        ));
    }
    if in_content {
        return Err(NotaryError::MalformedArmor(
            "EOF while still inside armored content".into(),
        ));
    }

    let compressed = BASE64
        .decode(&body)
        .map_err(|e| NotaryError::DecodeFailure(e.to_string()))?;
    decompress(&compressed)
}

/// Remove any bookends present (escaped or not) and return the raw content,
/// without requiring the caller to know the type tag in advance. Mirrors
/// `OTASCIIArmor::LoadFromString`'s "figure it out" entry point.
pub fn strip_bookends_if_present(input: &str) -> Result<Vec<u8>, NotaryError> {
    if input.contains(BEGIN) {
        decode(input)
    } else {
        // Raw, unbookended base64 payload.
        let compressed = BASE64
            .decode(input.trim())
            .map_err(|e| NotaryError::DecodeFailure(e.to_string()))?;
        decompress(&compressed)
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>, NotaryError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| NotaryError::Other(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| NotaryError::Other(format!("compression failed: {e}")))
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, NotaryError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| NotaryError::DecompressFailure(e.to_string()))?;
    Ok(out)
}

fn wrap_lines(s: &str, width: usize) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / width + 1);
    for chunk in s.as_bytes().chunks(width) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 alphabet is ASCII"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_payload() {
        let payload = b"the notary signs every receipt it writes".to_vec();
        let framed = encode(&payload, "MESSAGE", false).unwrap();
        let decoded = decode(&framed).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_escaped_bookends() {
        let payload = b"nested inside a contract".to_vec();
        let framed = encode(&payload, "KEY", true).unwrap();
        assert!(framed.starts_with("- -----BEGIN OT ARMORED KEY-----"));
        let decoded = decode(&framed).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn idempotent_armor() {
        // armor(dearmor(x)) round-trips to the same payload even though
        // comments/line-breaks may differ (§8 "Idempotent armor").
        let payload = b"round trip payload".to_vec();
        let framed_a = encode(&payload, "DATA", false).unwrap();
        let inner = decode(&framed_a).unwrap();
        let framed_b = encode(&inner, "DATA", false).unwrap();
        let inner_b = decode(&framed_b).unwrap();
        assert_eq!(inner, inner_b);
    }

    #[test]
    fn skips_version_and_comment_lines() {
        let payload = b"hello".to_vec();
        let framed = encode(&payload, "DATA", false).unwrap();
        assert!(framed.contains("Version:"));
        assert!(framed.contains("Comment:"));
        let decoded = decode(&framed).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn missing_begin_bookend_is_malformed() {
        let err = decode("not armored at all").unwrap_err();
        assert!(matches!(err, NotaryError::MalformedArmor(_)));
    }

    #[test]
    fn truncated_content_is_malformed() {
        let framed = encode(b"data", "DATA", false).unwrap();
        let truncated = framed.split("-----END").next().unwrap().to_string();
        let err = decode(&truncated).unwrap_err();
        assert!(matches!(err, NotaryError::MalformedArmor(_)));
    }

    #[test]
    fn long_payload_wraps_at_72_columns() {
        let payload = vec![0xABu8; 1000];
        let framed = encode(&payload, "DATA", false).unwrap();
        for line in framed.lines() {
            if line.starts_with('-') || line.starts_with("Version") || line.starts_with("Comment")
            {
                continue;
            }
            assert!(line.len() <= ARMOR_LINE_WIDTH);
        }
        let decoded = decode(&framed).unwrap();
        assert_eq!(decoded, payload);
    }
}
