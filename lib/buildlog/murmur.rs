use byteorder::{ByteOrder, LE};

const SEED: u64 = 0xdeca_fbad_deca_fbad;
const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// MurmurHash64A with ninja's fixed seed.
///
/// This is the hash ninja stores for each command in its build log, so the
/// exact bit pattern matters.
pub fn murmur_hash_64a(data: &[u8]) -> u64 {
	let mut h = SEED ^ M.wrapping_mul(data.len() as u64);
	let mut blocks = data.chunks_exact(8);
	for block in &mut blocks {
		let mut k = LE::read_u64(block);
		k = k.wrapping_mul(M);
		k ^= k >> R;
		k = k.wrapping_mul(M);
		h ^= k;
		h = h.wrapping_mul(M);
	}
	let tail = blocks.remainder();
	if !tail.is_empty() {
		h ^= LE::read_uint(tail, tail.len());
		h = h.wrapping_mul(M);
	}
	h ^= h >> R;
	h = h.wrapping_mul(M);
	h ^= h >> R;
	h
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	#[rustfmt::skip]
	fn known_hashes() {
		assert_eq!(murmur_hash_64a(b""), 0x87c2bc0beaf1d91d);
		assert_eq!(murmur_hash_64a(b"echo hello world"), 0x651507f607a0c6ae);
		assert_eq!(murmur_hash_64a(b"echo This is a test"), 0xe24483e1ba23b555);
	}

	#[test]
	fn every_tail_length() {
		// 1 through 7 trailing bytes all take the short-block path.
		let data = b"abcdefghij";
		let mut seen = std::collections::HashSet::new();
		for len in 0..=data.len() {
			assert!(seen.insert(murmur_hash_64a(&data[..len])));
		}
	}
}
