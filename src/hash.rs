//! Name and path hashing.
//!
//! Every name in a tag vocabulary and every cached file is identified by a
//! CRC-32 of its lowercased text, so `Crouch`/`crouch` and
//! `ADB\Player.adb`/`adb/player.adb` resolve to the same identity.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of raw bytes.
#[inline]
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// CRC-32 of the ASCII-lowercased text.
pub fn crc32_lowercase(text: &str) -> u32 {
    let mut digest = CRC32.digest();
    let mut buf = [0u8; 64];
    for chunk in text.as_bytes().chunks(buf.len()) {
        let lowered = &mut buf[..chunk.len()];
        lowered.copy_from_slice(chunk);
        lowered.make_ascii_lowercase();
        digest.update(lowered);
    }
    digest.finalize()
}

/// Convert backslashes to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Cache key of a file path: CRC of the normalized, lowercased path.
#[inline]
pub fn path_key(path: &str) -> u32 {
    crc32_lowercase(&normalize_path(path))
}

/// True if both paths normalize to the same case-insensitive string.
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_path(a).eq_ignore_ascii_case(&normalize_path(b))
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
