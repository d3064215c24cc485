//! 32-bit xxHash used to order tree entries.
//!
//! Four accumulator lanes consume the input in 16-byte blocks and are folded
//! together once at least one block was seen; the tail is mixed in four then
//! one byte at a time before the final avalanche. Not cryptographic.

use byteorder::{ByteOrder, LittleEndian};

const PRIME1: u32 = 2_654_435_761;
const PRIME2: u32 = 2_246_822_519;
const PRIME3: u32 = 3_266_489_917;
const PRIME4: u32 = 668_265_263;
const PRIME5: u32 = 374_761_393;

const BLOCK: usize = 16;

/// Seed used by [`HashTree`](crate::HashTree) for every key.
pub const TREE_SEED: u32 = 0;

#[inline]
fn round(lane: u32, word: u32) -> u32 {
    lane.wrapping_add(word.wrapping_mul(PRIME2))
        .rotate_left(13)
        .wrapping_mul(PRIME1)
}

/// Hashes `input` with `seed`.
pub fn hash(input: &[u8], seed: u32) -> u32 {
    let mut lanes = [
        seed.wrapping_add(PRIME1).wrapping_add(PRIME2),
        seed.wrapping_add(PRIME2),
        seed,
        seed.wrapping_sub(PRIME1),
    ];

    let mut blocks = input.chunks_exact(BLOCK);
    for block in &mut blocks {
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = round(*lane, LittleEndian::read_u32(&block[i * 4..i * 4 + 4]));
        }
    }

    let mut result = input.len() as u32;
    if input.len() >= BLOCK {
        result = result
            .wrapping_add(lanes[0].rotate_left(1))
            .wrapping_add(lanes[1].rotate_left(7))
            .wrapping_add(lanes[2].rotate_left(12))
            .wrapping_add(lanes[3].rotate_left(18));
    } else {
        result = result.wrapping_add(lanes[2]).wrapping_add(PRIME5);
    }

    let mut words = blocks.remainder().chunks_exact(4);
    for word in &mut words {
        result = result
            .wrapping_add(LittleEndian::read_u32(word).wrapping_mul(PRIME3))
            .rotate_left(17)
            .wrapping_mul(PRIME4);
    }
    for &byte in words.remainder() {
        result = result
            .wrapping_add(u32::from(byte).wrapping_mul(PRIME5))
            .rotate_left(11)
            .wrapping_mul(PRIME1);
    }

    result ^= result >> 15;
    result = result.wrapping_mul(PRIME2);
    result ^= result >> 13;
    result = result.wrapping_mul(PRIME3);
    result ^= result >> 16;
    result
}
