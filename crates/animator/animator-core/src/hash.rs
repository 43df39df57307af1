//! Name hashing for parameters and states.
//!
//! Names hash with CRC-32 (IEEE, reflected) reinterpreted as `i32`, the same
//! scheme authoring tools use for their string-to-hash helpers, so hashes
//! computed by a host match the ones stored in the blob.

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = make_table();

/// Hash a display name into the 32-bit key stored in the blob.
pub fn name_hash(name: &str) -> i32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in name.as_bytes() {
        crc = CRC_TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    (crc ^ 0xFFFF_FFFF) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_crc32_vectors() {
        assert_eq!(name_hash(""), 0);
        assert_eq!(name_hash("123456789") as u32, 0xCBF4_3926);
        assert_eq!(
            name_hash("The quick brown fox jumps over the lazy dog") as u32,
            0x414F_A339
        );
    }

    #[test]
    fn distinct_names_hash_differently() {
        assert_ne!(name_hash("Idle"), name_hash("Run"));
    }
}
