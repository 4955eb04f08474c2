//! # Reversible Preprocessing
//!
//! Optional byte-level transforms applied to a raw chunk before compression.
//! Which transforms ran is recorded in the chunk's flags byte so the reader
//! can undo them: encode order is raw -> RLE -> delta -> compress, decode order
//! is decompress -> reverse delta -> reverse RLE.

pub mod delta;
pub mod rle;

/// Bit set stored per chunk in format versions 3 and later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PreprocessFlags(u8);

impl PreprocessFlags {
    pub const NONE: PreprocessFlags = PreprocessFlags(0);
    pub const RLE: PreprocessFlags = PreprocessFlags(0x01);
    pub const DELTA: PreprocessFlags = PreprocessFlags(0x02);

    pub const fn from_bits(bits: u8) -> Self {
        PreprocessFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: PreprocessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PreprocessFlags) {
        self.0 |= other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// False when bits outside RLE and DELTA are set.
    pub const fn is_known(self) -> bool {
        self.0 & !(Self::RLE.0 | Self::DELTA.0) == 0
    }
}

/// Which transforms a build is allowed to try.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessOptions {
    pub rle: bool,
    pub delta: bool,
}

impl PreprocessOptions {
    pub fn any(self) -> bool {
        self.rle || self.delta
    }
}

/// Applies every enabled transform whose heuristic says it helps.
pub fn apply(raw: &[u8], options: PreprocessOptions) -> (Vec<u8>, PreprocessFlags) {
    let mut flags = PreprocessFlags::NONE;
    let mut data = raw.to_vec();

    if options.rle && rle::would_benefit(&data) {
        data = rle::encode(&data);
        flags.insert(PreprocessFlags::RLE);
    }
    if options.delta && delta::would_benefit(&data) {
        data = delta::encode(&data);
        flags.insert(PreprocessFlags::DELTA);
    }
    (data, flags)
}

/// Undoes [`apply`] given the recorded flags.
pub fn reverse(data: Vec<u8>, flags: PreprocessFlags) -> Vec<u8> {
    let mut data = data;
    if flags.contains(PreprocessFlags::DELTA) {
        data = delta::decode(&data);
    }
    if flags.contains(PreprocessFlags::RLE) {
        data = rle::decode(&data);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_identity() {
        let raw = vec![5u8; 1000];
        let (out, flags) = apply(&raw, PreprocessOptions::default());
        assert_eq!(out, raw);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_both_transforms_reverse_in_order() {
        let mut raw = Vec::new();
        for i in 0..200u8 {
            raw.extend_from_slice(&[i | 1; 6]);
            raw.push(i);
        }
        let options = PreprocessOptions { rle: true, delta: true };
        let (encoded, flags) = apply(&raw, options);
        assert!(flags.contains(PreprocessFlags::RLE));
        assert_eq!(reverse(encoded, flags), raw);
    }

    #[test]
    fn test_unknown_bits() {
        assert!(PreprocessFlags::from_bits(0x03).is_known());
        assert!(!PreprocessFlags::from_bits(0x04).is_known());
    }
}
