//! Checksum calculations for network packets
//!
//! Two families live here: the Internet Checksum (RFC 1071) used by IPv4,
//! OSPF and EIGRP headers, and the Fletcher checksum (RFC 905 Annex B,
//! RFC 2328 section 12.1.7) embedded in OSPF LSAs and IS-IS LSPs.

/// Calculates the Internet Checksum as defined in RFC 1071.
///
/// The data is treated as a sequence of big-endian 16-bit words; an odd
/// trailing byte is padded with a zero low byte.
///
/// # Examples
///
/// ```
/// use loki_packet::checksum::internet_checksum;
///
/// let data = vec![0x45, 0x00, 0x00, 0x3c];
/// let checksum = internet_checksum(&data);
/// ```
pub fn internet_checksum(data: &[u8]) -> u16 {
    !checksum_accumulate(data) as u16
}

/// Validates an Internet checksum.
///
/// Summing a buffer that already carries its checksum yields zero (or 0xFFFF,
/// the other ones' complement zero).
pub fn validate_checksum(data: &[u8]) -> bool {
    let result = internet_checksum(data);
    result == 0 || result == 0xFFFF
}

/// The folded ones' complement sum before the final complement.
pub fn checksum_accumulate(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        let word = u16::from_be_bytes([chunk[0], chunk[1]]);
        sum += word as u32;
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum
}

/// Compute the checksum over `data` and store it big-endian at `offset`.
///
/// The field is zeroed before summing.
pub fn fill_internet_checksum(data: &mut [u8], offset: usize) {
    if data.len() < offset + 2 {
        return;
    }
    data[offset] = 0;
    data[offset + 1] = 0;
    let checksum = internet_checksum(data);
    data[offset..offset + 2].copy_from_slice(&checksum.to_be_bytes());
}

/// Block length after which both accumulators are folded modulo 255
const FLETCHER_MODX: usize = 4102;

/// Offset of the checksum inside an OSPF LSA, relative to the byte after LS age
pub const OSPF_LSA_CHECKSUM_OFFSET: usize = 14;
/// Offset of the checksum inside an IS-IS LSP, relative to the LSP ID
pub const ISIS_LSP_CHECKSUM_OFFSET: usize = 12;

fn fletcher_sums(data: &[u8]) -> (i64, i64) {
    let mut c0: i64 = 0;
    let mut c1: i64 = 0;
    for block in data.chunks(FLETCHER_MODX) {
        for &byte in block {
            c0 += byte as i64;
            c1 += c0;
        }
        c0 %= 255;
        c1 %= 255;
    }
    (c0, c1)
}

/// Computes and inserts the Fletcher checksum of `data`.
///
/// `data` is the checksummed region (an OSPF LSA without its age field, or an
/// IS-IS LSP from the LSP ID on); `offset` is the position of the two checksum
/// bytes within it. Returns the checksum that was written.
///
/// ```
/// use loki_packet::checksum::{fletcher_checksum, fletcher_verify};
///
/// let mut lsa = vec![0u8; 24];
/// lsa[3] = 1;
/// fletcher_checksum(&mut lsa[2..], 14);
/// assert!(fletcher_verify(&lsa[2..]));
/// ```
pub fn fletcher_checksum(data: &mut [u8], offset: usize) -> u16 {
    if data.len() < offset + 2 {
        return 0;
    }
    data[offset] = 0;
    data[offset + 1] = 0;

    let (c0, c1) = fletcher_sums(data);
    let len = data.len() as i64;

    let mut x = ((len - offset as i64 - 1) * c0 - c1) % 255;
    if x <= 0 {
        x += 255;
    }
    let mut y = 510 - c0 - x;
    if y > 255 {
        y -= 255;
    }

    data[offset] = x as u8;
    data[offset + 1] = y as u8;
    u16::from_be_bytes([x as u8, y as u8])
}

/// True when a region carrying a Fletcher checksum sums to zero.
pub fn fletcher_verify(data: &[u8]) -> bool {
    let (c0, c1) = fletcher_sums(data);
    c0 == 0 && c1 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internet_checksum_empty() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_internet_checksum_rfc1071_example() {
        // RFC 1071 section 3: the sum of these words is 0xddf2
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum_accumulate(&data), 0xddf2);
        assert_eq!(internet_checksum(&data), 0x220d);
    }

    #[test]
    fn test_internet_checksum_odd_length() {
        assert_eq!(checksum_accumulate(&[0x00, 0x01, 0x02]), 0x0201);
    }

    #[test]
    fn test_checksum_self_consistency() {
        let mut header = vec![
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xac, 0x10,
            0x0a, 0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        fill_internet_checksum(&mut header, 10);
        assert_eq!(&header[10..12], &[0xb1, 0xe6]);
        assert_eq!(internet_checksum(&header), 0);
        assert!(validate_checksum(&header));
    }

    #[test]
    fn test_fletcher_router_lsa_reference() {
        // age 1, options 0x22, router LSA 10.0.0.9, seq 0x80000001, one stub link
        let mut lsa = vec![
            0x00, 0x01, 0x22, 0x01, 10, 0, 0, 9, 10, 0, 0, 9, 0x80, 0x00, 0x00, 0x01, 0x00, 0x00,
            0x00, 36, 0x00, 0x00, 0x00, 0x01, 10, 0, 0, 0, 255, 255, 255, 0, 0x03, 0x00, 0x00, 10,
        ];
        let checksum = fletcher_checksum(&mut lsa[2..], OSPF_LSA_CHECKSUM_OFFSET);
        assert_eq!(checksum, 0x7682);
        assert_eq!(&lsa[16..18], &[0x76, 0x82]);
        assert!(fletcher_verify(&lsa[2..]));
    }

    #[test]
    fn test_fletcher_reference_lsas() {
        // ASBR router-LSA 192.168.1.1: transit link to DR 192.168.1.2, stub 172.16/16
        let router = [
            0x00, 0x2d, 0x22, 0x01, 192, 168, 1, 1, 192, 168, 1, 1, 0x80, 0x00, 0x00, 0x05, 0x3f,
            0x68, 0x00, 48, 0x02, 0x00, 0x00, 0x02, 192, 168, 1, 2, 192, 168, 1, 1, 0x02, 0x00,
            0x00, 0x0a, 172, 16, 0, 0, 255, 255, 0, 0, 0x03, 0x00, 0x00, 0x01,
        ];
        // network-LSA from DR 2.2.2.2 on 192.168.1.0/24 with two attached routers
        let network = [
            0x00, 0x01, 0x22, 0x02, 192, 168, 1, 2, 2, 2, 2, 2, 0x80, 0x00, 0x00, 0x01, 0x19,
            0xa0, 0x00, 32, 255, 255, 255, 0, 1, 1, 1, 1, 2, 2, 2, 2,
        ];
        for (wire, expected) in [(&router[..], 0x3f68u16), (&network[..], 0x19a0)] {
            assert!(fletcher_verify(&wire[2..]));
            let mut copy = wire.to_vec();
            assert_eq!(fletcher_checksum(&mut copy[2..], OSPF_LSA_CHECKSUM_OFFSET), expected);
            assert_eq!(copy, wire);
        }
    }

    #[test]
    fn test_fletcher_ignores_previous_value() {
        let mut a = vec![0x11u8; 40];
        let mut b = a.clone();
        b[14] = 0xde;
        b[15] = 0xad;
        assert_eq!(fletcher_checksum(&mut a, 14), fletcher_checksum(&mut b, 14));
    }

    #[test]
    fn test_fletcher_long_buffer_verifies() {
        let mut data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 + 3) as u8).collect();
        fletcher_checksum(&mut data, ISIS_LSP_CHECKSUM_OFFSET);
        assert!(fletcher_verify(&data));
        data[100] ^= 0x01;
        assert!(!fletcher_verify(&data));
    }
}
