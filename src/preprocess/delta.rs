//! Byte-wise delta coding with wrapping arithmetic.

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut prev = 0u8;
    data.iter()
        .map(|&b| {
            let d = b.wrapping_sub(prev);
            prev = b;
            d
        })
        .collect()
}

pub fn decode(delta: &[u8]) -> Vec<u8> {
    let mut acc = 0u8;
    delta
        .iter()
        .map(|&d| {
            acc = acc.wrapping_add(d);
            acc
        })
        .collect()
}

/// Looks at the first 1000 bytes and recommends delta coding when more than
/// 60% of neighbouring differences are below 16.
pub fn would_benefit(data: &[u8]) -> bool {
    if data.len() < 100 {
        return false;
    }
    let sample = &data[..data.len().min(1000)];
    let small = sample
        .windows(2)
        .filter(|w| w[0].abs_diff(w[1]) < 16)
        .count();
    small as f64 > sample.len() as f64 * 0.6
}
