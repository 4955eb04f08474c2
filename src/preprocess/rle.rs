//! Escape-based run-length coding.
//!
//! A run of at least [`MIN_RUN`] identical non-zero bytes becomes
//! `ESCAPE value count`. A literal `ESCAPE` byte becomes `ESCAPE 0x00`.
//! Zero-valued runs stay literal, so `ESCAPE 0x00` is never the start of a
//! run and the two forms cannot be confused.

pub const ESCAPE: u8 = 0xFF;
pub const MIN_RUN: usize = 4;
pub const MAX_RUN: usize = 255;

/// Length of the run of `data[start]` beginning at `start`, capped at [`MAX_RUN`].
fn run_length(data: &[u8], start: usize) -> usize {
    let value = data[start];
    data[start..]
        .iter()
        .take(MAX_RUN)
        .take_while(|&&b| b == value)
        .count()
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let value = data[i];
        let run = run_length(data, i);
        if run >= MIN_RUN && value != 0 {
            out.extend_from_slice(&[ESCAPE, value, run as u8]);
        } else {
            for _ in 0..run {
                out.push(value);
                if value == ESCAPE {
                    out.push(0);
                }
            }
        }
        i += run;
    }
    out
}

/// Inverse of [`encode`]. A trailing lone `ESCAPE` passes through unchanged.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        match data[i..] {
            [ESCAPE, 0, ..] => {
                out.push(ESCAPE);
                i += 2;
            }
            [ESCAPE, value, count, ..] if count > 0 => {
                out.resize(out.len() + count as usize, value);
                i += 3;
            }
            _ => {
                out.push(data[i]);
                i += 1;
            }
        }
    }
    out
}

/// True when the buffer is at least 100 bytes and has more qualifying runs
/// than 5 per 100 bytes.
pub fn would_benefit(data: &[u8]) -> bool {
    if data.len() < 100 {
        return false;
    }
    let mut runs = 0usize;
    let mut i = 0;
    while i < data.len() {
        let run = run_length(data, i);
        if run >= MIN_RUN {
            runs += 1;
        }
        i += run;
    }
    runs > data.len() / 100 * 5
}
