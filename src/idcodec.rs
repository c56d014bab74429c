//! Crockford base-32 encoding of 64-bit integers, with an ISO-7064 mod-97-10
//! checksum and canonicalising decode. Pure value layer, no I/O.
//!
//! Grounded in the byte-level `Writer`/`Reader` pair the teacher uses for its
//! own on-disk key encoding (`storage/serde.rs`): same "hand-rolled codec,
//! `thiserror` for the one failure mode" shape, applied to a different wire
//! format because this one needs variable-width digit packing and an
//! embedded checksum that a byte-oriented base32 crate's fixed-width API
//! doesn't give us for free.

use rand::RngCore;
use thiserror::Error;

/// Crockford's alphabet: excludes `I`, `L`, `O`, `U` to avoid visual
/// confusion and accidental profanity.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const CHECKSUM_DIGITS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidIdentifier {
    #[error("identifier `{0}` contains a character outside the base-32 alphabet")]
    BadCharacter(String),
    #[error("identifier `{0}` is shorter than the checksum width")]
    TooShort(String),
    #[error("identifier `{0}` failed checksum validation")]
    ChecksumMismatch(String),
}

/// Encodes `value` as Crockford base-32, left-padded with `0` to at least
/// `min_length` data characters (not counting the checksum), with a
/// checksum appended when `checksum` is set, and a hyphen inserted every
/// `split_every` characters of the final string.
pub fn encode(value: u64, split_every: usize, min_length: usize, checksum: bool) -> String {
    let data_width = min_length.saturating_sub(if checksum { CHECKSUM_DIGITS } else { 0 });
    let mut digits = to_digits(value, data_width);
    if checksum {
        digits.extend(checksum_digits(value));
    }
    let body: String = digits.iter().map(|&d| ALPHABET[d as usize] as char).collect();
    insert_hyphens(&body, split_every)
}

/// Decodes a (possibly hyphenated, possibly miscased) Crockford string back
/// into the integer it encodes. Canonicalises first: lowercased, hyphens
/// stripped, `{I,i,l,L}` read as `1`, `{O,o}` read as `0`. Decode is total
/// over the canonicalised alphabet; only an out-of-alphabet character or a
/// checksum mismatch fails.
pub fn decode(input: &str, checksum: bool) -> Result<u64, InvalidIdentifier> {
    let canonical = canonicalize(input);
    let digits = parse_digits(&canonical)?;
    if !checksum {
        return Ok(from_digits(&digits));
    }
    if digits.len() < CHECKSUM_DIGITS {
        return Err(InvalidIdentifier::TooShort(input.to_string()));
    }
    let (data, given_checksum) = digits.split_at(digits.len() - CHECKSUM_DIGITS);
    let value = from_digits(data);
    if given_checksum != checksum_digits(value) {
        return Err(InvalidIdentifier::ChecksumMismatch(input.to_string()));
    }
    Ok(value)
}

/// Generates a fresh random identifier of `length` characters (including
/// the checksum, when requested). Collisions are not this layer's concern —
/// they are recovered at the `Ident` layer via the store's uniqueness index.
pub fn generate(length: usize, split_every: usize, checksum: bool) -> String {
    let data_width = length.saturating_sub(if checksum { CHECKSUM_DIGITS } else { 0 });
    let max_bits = data_width * 5;
    let value = random_u64().min(if max_bits >= 64 { u64::MAX } else { (1u64 << max_bits) - 1 });
    encode(value, split_every, data_width, checksum)
}

fn random_u64() -> u64 {
    rand::thread_rng().next_u64()
}

fn to_digits(mut value: u64, min_width: usize) -> Vec<u8> {
    let mut digits = Vec::new();
    loop {
        digits.push((value & 0x1f) as u8);
        value >>= 5;
        if value == 0 {
            break;
        }
    }
    while digits.len() < min_width {
        digits.push(0);
    }
    digits.reverse();
    digits
}

fn from_digits(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |acc, &d| (acc << 5) | d as u64)
}

/// Two base-32 digits carrying the ISO-7064 mod-97-10 check value of `value`.
fn checksum_digits(value: u64) -> Vec<u8> {
    let remainder = value % 97;
    // 100 mod 97 == 3, so (value * 100) mod 97 == (remainder * 3) mod 97
    // without risking u64 overflow on `value * 100`.
    let scaled = (remainder * 3) % 97;
    let check = 98 - scaled;
    vec![((check >> 5) & 0x1f) as u8, (check & 0x1f) as u8]
}

fn insert_hyphens(body: &str, split_every: usize) -> String {
    if split_every == 0 {
        return body.to_string();
    }
    body.as_bytes()
        .chunks(split_every)
        .map(|chunk| std::str::from_utf8(chunk).expect("ascii alphabet"))
        .collect::<Vec<_>>()
        .join("-")
}

fn canonicalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '-')
        .map(|c| match c {
            'I' | 'i' | 'L' | 'l' => '1',
            'O' | 'o' => '0',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn parse_digits(canonical: &str) -> Result<Vec<u8>, InvalidIdentifier> {
    canonical
        .bytes()
        .map(|byte| {
            ALPHABET
                .iter()
                .position(|&symbol| symbol == byte)
                .map(|pos| pos as u8)
                .ok_or_else(|| InvalidIdentifier::BadCharacter(canonical.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn encodes_with_checksum_and_hyphenation() {
        let encoded = encode(0, 5, 10, true);
        assert_eq!(11, encoded.len()); // 10 chars + 1 hyphen
        assert!(encoded.contains('-'));
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let encoded = encode(42, 5, 10, true);
        let mut corrupted = encoded.clone();
        corrupted.replace_range(0..1, if &encoded[0..1] == "0" { "1" } else { "0" });
        assert!(decode(&corrupted, true).is_err());
    }

    #[test]
    fn decode_is_canonicalising() {
        let encoded = encode(123456, 5, 10, true);
        let messy = encoded.to_lowercase().replace('o', "0").replace('i', "1");
        assert_eq!(decode(&encoded, true), decode(&messy, true));
    }

    #[test]
    fn decode_normalises_confusable_characters() {
        // "I", "L" canonicalise to "1"; "O" canonicalises to "0".
        assert_eq!(decode("1", false), decode("I", false));
        assert_eq!(decode("1", false), decode("L", false));
        assert_eq!(decode("0", false), decode("O", false));
    }

    #[quickcheck]
    fn round_trip_without_checksum(n: u64) -> bool {
        decode(&encode(n, 0, 1, false), false) == Ok(n)
    }

    #[quickcheck]
    fn round_trip_with_checksum(n: u64) -> bool {
        decode(&encode(n, 5, 10, true), true) == Ok(n)
    }
}
