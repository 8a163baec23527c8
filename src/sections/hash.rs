//! 128-bit non-cryptographic content hash (FNV-1a, two interleaved lanes),
//! formatted as uppercase hex. Used to detect when a spec section's content
//! has drifted since it was last read.

const FNV_OFFSET_LOW: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_OFFSET_HIGH: u64 = 0x6c62_2720_1ca6_2491;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

pub fn hash_hex(content: &str) -> String {
    let mut low = FNV_OFFSET_LOW;
    let mut high = FNV_OFFSET_HIGH;
    for byte in content.as_bytes() {
        low ^= *byte as u64;
        low = low.wrapping_mul(FNV_PRIME);
        high ^= (*byte as u64).rotate_left(7);
        high = high.wrapping_mul(FNV_PRIME);
    }
    format!("{high:016X}{low:016X}")
}

/// Deterministic normalization applied before hashing: CRLF/CR to LF, outer
/// trim, runs of 3+ blank lines collapsed to exactly 2 newlines.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();

    let mut out = String::with_capacity(trimmed.len());
    let mut newline_run = 0usize;
    for ch in trimmed.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }
    out
}
