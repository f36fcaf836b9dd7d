//! Prompt normalization and rolling-digest fingerprinting.

/// Trim outer whitespace and collapse interior whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const GRAM_LEN: usize = 5;

/// Derive a deterministic 16-byte fingerprint from a normalized prompt by
/// feeding successive character 5-grams into a BLAKE3 hasher. Strings
/// shorter than `GRAM_LEN` characters contribute no grams; the resulting
/// "empty digest" is still well-defined and deterministic.
pub fn fingerprint(text: &str) -> [u8; 16] {
    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut hasher = blake3::Hasher::new();

    if chars.len() >= GRAM_LEN {
        for window in chars.windows(GRAM_LEN) {
            let gram: String = window.iter().collect();
            hasher.update(gram.as_bytes());
        }
    }

    let mut out = [0u8; 16];
    hasher.finalize_xof().fill(&mut out);
    out
}

pub fn to_hex(fp: &[u8; 16]) -> String {
    fp.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a 32-character hex string back into a fingerprint, as accepted on
/// the wire for `prompt_fp`.
pub fn from_hex(hex: &str) -> Result<[u8; 16], String> {
    if hex.len() != 32 {
        return Err(format!("prompt_fp must be 32 hex characters, got {}", hex.len()));
    }
    let mut out = [0u8; 16];
    for (i, chunk) in out.iter_mut().enumerate() {
        let byte_str = &hex[i * 2..i * 2 + 2];
        *chunk = u8::from_str_radix(byte_str, 16).map_err(|_| format!("invalid hex in prompt_fp: {byte_str}"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn deterministic_across_calls() {
        let a = fingerprint("Hello   world  ");
        let b = fingerprint("Hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_digest_is_well_defined() {
        let short = fingerprint("hi");
        assert_eq!(short, fingerprint("hi"));
    }

    #[test]
    fn trims_outer_whitespace() {
        assert_eq!(normalize("  hi there  "), "hi there");
    }

    #[test]
    fn hex_round_trips() {
        let fp = fingerprint("round trip me");
        let hex = to_hex(&fp);
        assert_eq!(from_hex(&hex).unwrap(), fp);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(from_hex("abcd").is_err());
    }

    proptest! {
        #[test]
        fn determinism_property(s in ".*") {
            prop_assert_eq!(fingerprint(&s), fingerprint(&s));
        }

        #[test]
        fn whitespace_normalization_property(s in "[ \t]{0,3}[a-z]{1,10}[ \t]{1,3}[a-z]{1,10}[ \t]{0,3}") {
            let collapsed = s.split_whitespace().collect::<Vec<_>>().join("  ");
            prop_assert_eq!(fingerprint(&s), fingerprint(&collapsed));
        }
    }
}
