//! Packed synaptic row layout consumed by the synapse processor.
//!
//! ## Row format
//!
//! ```text
//! word 0        number of synapses in this (sub-)row
//! word 1        delay offset (ticks) of the next extension sub-row, 0 = none
//! word 2        word offset of the next extension sub-row, 0 = none
//! word 3        number of synapses in the next extension sub-row
//! [plastic]     time of last pre-synaptic spike, pre-trace words
//! payload       static:  one 32-bit word per synapse
//!                        weight(16) | delay(3) << 10 | index(10)
//!               plastic: 16-bit weight array, then 16-bit control array,
//!                        each padded to a whole word
//! ```
//!
//! A row only holds delays that fit in one delay slot (1..=7 ticks); any
//! longer delay is moved into an extension sub-row whose header is reached
//! via the delay buffer after `word 1` ticks. The count of the next
//! sub-row is read before the sub-row itself is fetched.

/// Bits of a control word holding the post-synaptic column index.
pub const INDEX_BITS: u32 = 10;

/// Bits of a control word holding the delay within one delay slot.
pub const DELAY_BITS: u32 = 3;

/// Mask selecting the index field.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Mask selecting the delay field (before shifting).
pub const DELAY_MASK: u32 = (1 << DELAY_BITS) - 1;

/// Longest delay (ticks) one delay slot can express.
pub const MAX_DTCM_DELAY: u32 = DELAY_MASK;

/// Header words prefixed to every row and extension sub-row.
pub const HEADER_WORDS: usize = 4;

/// Words in one key lookup entry: key, mask, word offset, row words.
pub const KEY_LOOKUP_ENTRY_WORDS: usize = 4;

/// Pack a post-synaptic index and in-slot delay into a 16-bit control word.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn control_word(index: u32, delay: u32) -> u16 {
    ((index & INDEX_MASK) | ((delay & DELAY_MASK) << INDEX_BITS)) as u16
}

/// Split a control word into `(index, delay)`.
#[must_use]
pub const fn split_control_word(word: u16) -> (u32, u32) {
    let word = word as u32;
    (word & INDEX_MASK, (word >> INDEX_BITS) & DELAY_MASK)
}

/// Pack a full static synapse: weight in the high half-word.
#[must_use]
pub const fn static_synapse_word(index: u32, delay: u32, weight: u16) -> u32 {
    control_word(index, delay) as u32 | ((weight as u32) << 16)
}

/// Split a static synapse word into `(index, delay, weight)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_static_synapse_word(word: u32) -> (u32, u32, u16) {
    let (index, delay) = split_control_word(word as u16);
    (index, delay, (word >> 16) as u16)
}

/// Header words of a (sub-)row.
///
/// `next` is the `(delay offset, word offset, synapse count)` of the
/// following extension sub-row, if any.
#[must_use]
pub const fn row_header(num_synapses: u32, next: Option<(u32, u32, u32)>) -> [u32; HEADER_WORDS] {
    match next {
        Some((delay_offset, offset_words, next_synapses)) => {
            [num_synapses, delay_offset, offset_words, next_synapses]
        }
        None => [num_synapses, 0, 0, 0],
    }
}

/// Split header words into `(synapses, next extension sub-row)`.
#[must_use]
pub const fn split_row_header(header: [u32; HEADER_WORDS]) -> (u32, Option<(u32, u32, u32)>) {
    if header[2] == 0 {
        (header[0], None)
    } else {
        (header[0], Some((header[1], header[2], header[3])))
    }
}

/// Delay-slot sub-row a delay (ticks) falls into, and the delay within it.
///
/// Sub-row 0 holds delays `0..=MAX_DTCM_DELAY`; sub-row `k` holds
/// `k * MAX_DTCM_DELAY + 1 ..= (k + 1) * MAX_DTCM_DELAY`.
#[must_use]
pub const fn delay_slot(delay: u32) -> (u32, u32) {
    if delay == 0 {
        return (0, 0);
    }
    let sub_row = (delay - 1) / MAX_DTCM_DELAY;
    (sub_row, delay - sub_row * MAX_DTCM_DELAY)
}

/// Number of 32-bit words needed for `count` 16-bit values.
#[must_use]
pub const fn half_words_to_words(count: usize) -> usize {
    count.div_ceil(2)
}
