// devices/kasa/cipher.rs
//! Autokey XOR cipher used on the local Kasa port.
//!
//! The key for byte `i` is ciphertext byte `i - 1`, starting from
//! [`INITIAL_KEY`]. Both directions are a fold over the bytes with the
//! previous ciphertext byte as the accumulator.

pub const INITIAL_KEY: u8 = 171;

pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    plain
        .iter()
        .scan(INITIAL_KEY, |key, &byte| {
            *key ^= byte;
            Some(*key)
        })
        .collect()
}

pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    cipher
        .iter()
        .scan(INITIAL_KEY, |key, &byte| {
            let plain = byte ^ *key;
            *key = byte;
            Some(plain)
        })
        .collect()
}

/// Big-endian length header (plain) followed by the encrypted payload.
pub fn frame(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plain.len() + 4);
    out.extend_from_slice(&(plain.len() as u32).to_be_bytes());
    out.extend(encrypt(plain));
    out
}

/// Strips the header when it matches the payload length, then decrypts.
/// Data without a matching header is decrypted as-is.
pub fn unframe(data: &[u8]) -> Vec<u8> {
    match data.split_first_chunk::<4>() {
        Some((header, body)) if u32::from_be_bytes(*header) as usize == body.len() => {
            decrypt(body)
        }
        _ => decrypt(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // '{' ^ 171 = 0xD0, then '}' ^ 0xD0 = 0xAD
        assert_eq!(encrypt(b"{}"), vec![0xD0, 0xAD]);
        assert_eq!(decrypt(&[0xD0, 0xAD]), b"{}".to_vec());
    }

    #[test]
    fn round_trips_including_empty() {
        assert!(encrypt(b"").is_empty());
        assert!(decrypt(b"").is_empty());

        let payload = br#"{"system":{"get_sysinfo":{}}}"#;
        assert_eq!(decrypt(&encrypt(payload)), payload.to_vec());

        let all_bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(decrypt(&encrypt(&all_bytes)), all_bytes);
    }

    #[test]
    fn frame_has_plain_length_header() {
        let framed = frame(b"{}");
        assert_eq!(&framed[..4], &[0, 0, 0, 2]);
        assert_eq!(&framed[4..], &[0xD0, 0xAD]);
        assert_eq!(unframe(&framed), b"{}".to_vec());
    }

    #[test]
    fn unframe_without_header_decrypts_everything() {
        let bare = encrypt(br#"{"a":1}"#);
        assert_eq!(unframe(&bare), br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn empty_frame() {
        let framed = frame(b"");
        assert_eq!(framed, vec![0, 0, 0, 0]);
        assert!(unframe(&framed).is_empty());
    }
}
