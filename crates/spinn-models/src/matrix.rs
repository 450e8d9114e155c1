//! Synaptic matrix layout
//!
//! Each synapse vertex owns one synaptic matrix region holding a sub-matrix
//! per incoming pre-synaptic neuron vertex. A sub-matrix is a block of
//! fixed-stride rows, one per pre neuron, followed by the delay extension
//! sub-rows of those rows:
//!
//! ```text
//! offset ─► row 0            (row_words)
//!           row 1
//!           ...
//!           row n-1
//!           extension sub-rows, chained from their main row's header
//! ```
//!
//! Sub-matrices are laid out in key order so the device can binary search
//! the key lookup table. Sub-matrices generated on chip reserve their block
//! and are filled by the connection builder.

use crate::error::{CompileError, Result};
use crate::network::{PopulationId, ProjectionId};
use crate::slice::NeuronSlice;
use crate::synapse::SynapseModel;
use spinn_chip::fixed::from_fixed;
use spinn_chip::layout::{
    control_word, delay_slot, half_words_to_words, row_header, split_control_word, split_row_header,
    split_static_synapse_word, static_synapse_word, HEADER_WORDS, KEY_LOOKUP_ENTRY_WORDS, MAX_DTCM_DELAY,
};
use std::collections::BTreeMap;
use tracing::trace;

/// One synapse of a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synapse {
    /// Weight (physical units)
    pub weight: f64,
    /// Delay in ticks
    pub delay: u32,
    /// Post-synaptic index relative to the post slice
    pub index: u32,
}

/// A synapse recovered from a written matrix, in population indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadSynapse {
    /// Pre-synaptic neuron
    pub pre: u32,
    /// Post-synaptic neuron
    pub post: u32,
    /// Decoded weight
    pub weight: f64,
    /// Delay in ticks
    pub delay: u32,
}

/// How a sub-matrix gets its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Rows are packed on the host
    Host,
    /// Rows are generated on the device from this projection
    OnChip(ProjectionId),
}

/// Key routing spikes of one pre-synaptic vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreVertex {
    /// Pre-synaptic neurons of the vertex
    pub slice: NeuronSlice,
    /// Spike key
    pub key: u32,
    /// Spike key mask
    pub mask: u32,
}

/// Location and shape of one sub-matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMatrix {
    /// Source population
    pub pre_population: PopulationId,
    /// Index of the pre-synaptic vertex within its population
    pub pre_vertex: usize,
    /// Routing of the pre-synaptic vertex
    pub pre: PreVertex,
    /// Synapses in the widest first sub-row
    pub max_cols: usize,
    /// Stride of main rows in words
    pub row_words: usize,
    /// Words of delay extension sub-rows
    pub ext_words: usize,
    /// Host packing or on-chip generation
    pub generation: Generation,
}

impl SubMatrix {
    /// Total words of the block
    pub fn size_words(&self) -> usize {
        self.pre.slice.len() as usize * self.row_words + self.ext_words
    }
}

/// Sub-rows of one row: `(delay slot, synapses with in-slot delays)`
///
/// The first entry is always slot 0, possibly empty.
pub type SplitRow = Vec<(u32, Vec<Synapse>)>;

/// Row format of one synapse model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynapticMatrix {
    model: SynapseModel,
}

impl SynapticMatrix {
    /// Layout for `model`
    pub const fn new(model: SynapseModel) -> Self {
        Self { model }
    }

    /// Synapse model
    pub const fn model(&self) -> &SynapseModel {
        &self.model
    }

    /// Words before the payload of every (sub-)row
    pub const fn header_words(&self) -> usize {
        if self.model.is_plastic() {
            // Last pre-synaptic spike time, then trace
            HEADER_WORDS + 1 + self.model.pre_trace_words()
        } else {
            HEADER_WORDS
        }
    }

    /// Payload words for `synapses` synapses
    pub const fn payload_words(&self, synapses: usize) -> usize {
        if self.model.is_plastic() {
            2 * half_words_to_words(synapses)
        } else {
            synapses
        }
    }

    /// Words of a (sub-)row holding `synapses` synapses
    pub const fn row_words(&self, synapses: usize) -> usize {
        self.header_words() + self.payload_words(synapses)
    }

    /// Upper bound on matrix words before any synapse exists
    ///
    /// Every row reserves `max_cols` synapses plus a header for each of its
    /// `max_sub_rows - 1` extension sub-rows, which share at most
    /// `max_total_sub_row_length` synapses.
    pub const fn estimate_matrix_words(
        &self,
        num_rows: usize,
        max_cols: usize,
        max_sub_rows: usize,
        max_total_sub_row_length: usize,
    ) -> usize {
        let extension = if max_sub_rows > 1 {
            (max_sub_rows - 1) * self.header_words() + self.payload_words(max_total_sub_row_length)
        } else {
            0
        };
        num_rows * (self.row_words(max_cols) + extension)
    }

    /// Split a row (sorted by index) into delay slots
    pub fn split_row(row: &[Synapse]) -> SplitRow {
        let mut slots: BTreeMap<u32, Vec<Synapse>> = BTreeMap::new();
        slots.insert(0, Vec::new());
        for synapse in row {
            let (slot, delay) = delay_slot(synapse.delay);
            slots.entry(slot).or_default().push(Synapse { delay, ..*synapse });
        }
        slots.into_iter().collect()
    }

    /// Shape the sub-matrix of `pre` from host-built rows
    ///
    /// `rows` holds one row per neuron of the pre slice, sorted by post index.
    /// Returns `None` when the slice contributes no synapses.
    pub fn host_sub_matrix(
        &self,
        pre_population: PopulationId,
        pre_vertex: usize,
        pre: PreVertex,
        rows: &[Vec<Synapse>],
    ) -> Option<(SubMatrix, Vec<SplitRow>)> {
        let split: Vec<SplitRow> = rows
            .iter()
            .take(pre.slice.len() as usize)
            .map(|row| Self::split_row(row))
            .collect();
        let max_cols = split.iter().map(|r| r[0].1.len()).max().unwrap_or(0);
        let ext_words: usize = split
            .iter()
            .flat_map(|r| r[1..].iter())
            .map(|(_, synapses)| self.row_words(synapses.len()))
            .sum();
        if max_cols == 0 && ext_words == 0 {
            return None;
        }
        let sub = SubMatrix {
            pre_population,
            pre_vertex,
            pre,
            max_cols,
            row_words: self.row_words(max_cols),
            ext_words,
            generation: Generation::Host,
        };
        Some((sub, split))
    }

    /// Reserve a block for rows generated on chip with at most `max_cols`
    /// synapses each
    pub const fn on_chip_sub_matrix(
        &self,
        pre_population: PopulationId,
        pre_vertex: usize,
        pre: PreVertex,
        max_cols: usize,
        projection: ProjectionId,
    ) -> SubMatrix {
        SubMatrix {
            pre_population,
            pre_vertex,
            pre,
            max_cols,
            row_words: self.row_words(max_cols),
            ext_words: 0,
            generation: Generation::OnChip(projection),
        }
    }

    /// Pack every sub-matrix into one region
    ///
    /// `rows[i]` holds the split rows of `subs[i]` for host sub-matrices;
    /// on-chip blocks are left zeroed.
    ///
    /// # Errors
    ///
    /// Returns error if an offset or count does not fit its header word or
    /// the region is too small for the placement.
    pub fn write_matrices(
        &self,
        subs: &[SubMatrix],
        rows: &[Option<Vec<SplitRow>>],
        placement: &MatrixPlacement,
        weight_fixed_point: u32,
    ) -> Result<Vec<u32>> {
        let mut words = vec![0u32; placement.total_words];
        for ((sub, sub_rows), &offset) in subs.iter().zip(rows).zip(&placement.offsets) {
            let Some(sub_rows) = sub_rows else { continue };
            let mut ext_cursor = offset + sub.pre.slice.len() as usize * sub.row_words;
            for (r, row) in sub_rows.iter().enumerate() {
                let mut cursor = offset + r * sub.row_words;
                for (i, (slot, synapses)) in row.iter().enumerate() {
                    let (next, next_cursor) = match row.get(i + 1) {
                        Some((next_slot, next_synapses)) => {
                            let at = ext_cursor;
                            ext_cursor += self.row_words(next_synapses.len());
                            let next = (
                                (next_slot - slot) * MAX_DTCM_DELAY,
                                header_word(at, "synaptic matrix offset")?,
                                header_word(next_synapses.len(), "synapse count")?,
                            );
                            (Some(next), Some(at))
                        }
                        None => (None, None),
                    };
                    let header = row_header(header_word(synapses.len(), "synapse count")?, next);
                    self.write_row(&mut words, cursor, header, synapses, weight_fixed_point)?;
                    if let Some(at) = next_cursor {
                        cursor = at;
                    }
                }
            }
            trace!(
                "sub-matrix key {:#010x}: {} rows x {} words at {}",
                sub.pre.key,
                sub.pre.slice.len(),
                sub.row_words,
                offset
            );
        }
        Ok(words)
    }

    fn write_row(
        &self,
        words: &mut [u32],
        at: usize,
        header: [u32; HEADER_WORDS],
        synapses: &[Synapse],
        weight_fixed_point: u32,
    ) -> Result<()> {
        let len = self.row_words(synapses.len());
        let row = words
            .get_mut(at..at + len)
            .ok_or_else(|| CompileError::config(format!("row at word {at} overruns synaptic matrix")))?;
        row[..HEADER_WORDS].copy_from_slice(&header);
        let payload = &mut row[self.header_words()..];
        let weights = synapses
            .iter()
            .map(|s| encode_weight(s.weight, weight_fixed_point, self.model.signed_weight()));
        if self.model.is_plastic() {
            let half = half_words_to_words(synapses.len());
            for (i, weight) in weights.enumerate() {
                payload[i / 2] |= u32::from(weight) << (16 * (i % 2));
            }
            for (i, s) in synapses.iter().enumerate() {
                payload[half + i / 2] |= u32::from(control_word(s.index, s.delay)) << (16 * (i % 2));
            }
        } else {
            for ((word, s), weight) in payload.iter_mut().zip(synapses).zip(weights) {
                *word = static_synapse_word(s.index, s.delay, weight);
            }
        }
        Ok(())
    }

    /// Decode the synapses of one sub-matrix, following extension chains
    ///
    /// # Errors
    ///
    /// Returns error if a row or chain points outside `words`.
    pub fn read_sub_matrix(
        &self,
        words: &[u32],
        sub: &SubMatrix,
        offset: usize,
        post_slice: NeuronSlice,
        weight_fixed_point: u32,
    ) -> Result<Vec<ReadSynapse>> {
        let overrun = |at: usize| CompileError::config(format!("row at word {at} outside synaptic matrix"));
        let mut synapses = Vec::new();
        for (r, pre) in (sub.pre.slice.start..sub.pre.slice.stop).enumerate() {
            let mut at = offset + r * sub.row_words;
            let mut base_delay = 0;
            let mut expected = None;
            loop {
                let header: [u32; HEADER_WORDS] = words
                    .get(at..at + HEADER_WORDS)
                    .and_then(|h| h.try_into().ok())
                    .ok_or_else(|| overrun(at))?;
                let (count, next) = split_row_header(header);
                if let Some(n) = expected.filter(|&n| n != count) {
                    return Err(CompileError::config(format!(
                        "sub-row at word {at} holds {count} synapses, its parent expects {n}"
                    )));
                }
                let count = count as usize;
                let len = self.row_words(count);
                let row = words.get(at..at + len).ok_or_else(|| overrun(at))?;
                let payload = &row[self.header_words()..];
                for i in 0..count {
                    let (index, delay, weight) = if self.model.is_plastic() {
                        let half = half_words_to_words(count);
                        #[allow(clippy::cast_possible_truncation)]
                        let weight = (payload[i / 2] >> (16 * (i % 2))) as u16;
                        #[allow(clippy::cast_possible_truncation)]
                        let control = (payload[half + i / 2] >> (16 * (i % 2))) as u16;
                        let (index, delay) = split_control_word(control);
                        (index, delay, weight)
                    } else {
                        split_static_synapse_word(payload[i])
                    };
                    synapses.push(ReadSynapse {
                        pre,
                        post: post_slice.start + index,
                        weight: decode_weight(weight, weight_fixed_point, self.model.signed_weight()),
                        delay: base_delay + delay,
                    });
                }
                let Some((delay_offset, next_at, next_count)) = next else {
                    break;
                };
                base_delay += delay_offset;
                at = next_at as usize;
                expected = Some(next_count);
            }
        }
        Ok(synapses)
    }
}

fn header_word(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| CompileError::config(format!("{what} {value} does not fit a header word")))
}

/// Word offsets of sub-matrices within their region
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatrixPlacement {
    /// Offset of each sub-matrix, in input order
    pub offsets: Vec<usize>,
    /// Region size in words
    pub total_words: usize,
}

/// Lay sub-matrices out in ascending key order
pub fn place_matrices(subs: &[SubMatrix]) -> MatrixPlacement {
    let mut order: Vec<usize> = (0..subs.len()).collect();
    order.sort_by_key(|&i| subs[i].pre.key);
    let mut offsets = vec![0; subs.len()];
    let mut total_words = 0;
    for i in order {
        offsets[i] = total_words;
        total_words += subs[i].size_words();
    }
    MatrixPlacement { offsets, total_words }
}

/// Key lookup entries `[key, mask, word offset, row words]`, sorted by key
#[allow(clippy::cast_possible_truncation)]
pub fn key_lookup_entries(subs: &[SubMatrix], placement: &MatrixPlacement) -> Vec<[u32; KEY_LOOKUP_ENTRY_WORDS]> {
    let mut entries: Vec<_> = subs
        .iter()
        .zip(&placement.offsets)
        .map(|(sub, &offset)| [sub.pre.key, sub.pre.mask, offset as u32, sub.row_words as u32])
        .collect();
    entries.sort_by_key(|e| e[0]);
    entries
}

/// Encode a weight with `fixed_point` fractional bits, saturating at the
/// storage range
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_weight(weight: f64, fixed_point: u32, signed: bool) -> u16 {
    let scaled = (weight * f64::from(fixed_point).exp2()).round();
    if signed {
        scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16 as u16
    } else {
        scaled.abs().min(f64::from(u16::MAX)) as u16
    }
}

/// Inverse of [`encode_weight`]
pub fn decode_weight(raw: u16, fixed_point: u32, signed: bool) -> f64 {
    #[allow(clippy::cast_possible_wrap)]
    let raw = if signed { i64::from(raw as i16) } else { i64::from(raw) };
    from_fixed(raw, fixed_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse::StdpParameters;

    fn syn(index: u32, delay: u32, weight: f64) -> Synapse {
        Synapse { weight, delay, index }
    }

    fn pre(start: u32, stop: u32, key: u32) -> PreVertex {
        PreVertex {
            slice: NeuronSlice::new(start, stop),
            key,
            mask: 0xFFFF_FC00,
        }
    }

    #[test]
    fn plastic_rows_are_padded() {
        let matrix = SynapticMatrix::new(SynapseModel::Stdp(StdpParameters::default()));
        // header 4 + last spike 1 + trace 1, then 2 x ceil(3 / 2)
        assert_eq!(matrix.row_words(3), 6 + 4);
        assert_eq!(SynapticMatrix::new(SynapseModel::Static).row_words(3), 7);
    }

    #[test]
    fn split_row_by_delay_slot() {
        let row = [syn(0, 1, 1.0), syn(1, 9, 1.0), syn(2, 7, 1.0), syn(3, 22, 1.0)];
        let split = SynapticMatrix::split_row(&row);
        let slots: Vec<u32> = split.iter().map(|(s, _)| *s).collect();
        assert_eq!(slots, vec![0, 1, 3]);
        assert_eq!(split[0].1.len(), 2);
        assert_eq!(split[1].1[0].delay, 2);
        assert_eq!(split[2].1[0].delay, 1);

        // A row with only long delays keeps an empty first sub-row
        let split = SynapticMatrix::split_row(&[syn(0, 10, 1.0)]);
        assert!(split[0].1.is_empty());
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn empty_slice_has_no_sub_matrix() {
        let matrix = SynapticMatrix::new(SynapseModel::Static);
        let rows = vec![Vec::new(); 10];
        assert!(matrix.host_sub_matrix(PopulationId(0), 0, pre(0, 10, 0), &rows).is_none());
    }

    #[test]
    fn placement_follows_key_order() {
        let matrix = SynapticMatrix::new(SynapseModel::Static);
        let rows = vec![vec![syn(0, 1, 1.0)]; 4];
        let (a, _) = matrix.host_sub_matrix(PopulationId(0), 0, pre(0, 4, 0x20000), &rows).unwrap();
        let (b, _) = matrix.host_sub_matrix(PopulationId(1), 0, pre(0, 4, 0x10000), &rows).unwrap();
        let placement = place_matrices(&[a.clone(), b.clone()]);
        assert_eq!(placement.offsets, vec![b.size_words(), 0]);
        assert_eq!(placement.total_words, a.size_words() + b.size_words());

        let entries = key_lookup_entries(&[a, b], &placement);
        assert_eq!(entries[0][0], 0x10000);
        assert_eq!(entries[1][2], 4 * 5);
    }

    fn round_trip(model: SynapseModel) {
        let matrix = SynapticMatrix::new(model);
        let rows = vec![
            vec![syn(0, 1, 0.5), syn(3, 9, 1.0), syn(5, 16, 0.25)],
            vec![],
            vec![syn(1, 0, 2.0), syn(2, 3, 0.75)],
        ];
        let (sub, split) = matrix
            .host_sub_matrix(PopulationId(0), 0, pre(0, 3, 0x10000), &rows)
            .unwrap();
        let placement = place_matrices(std::slice::from_ref(&sub));
        let words = matrix
            .write_matrices(std::slice::from_ref(&sub), &[Some(split)], &placement, 13)
            .unwrap();
        assert_eq!(words.len(), sub.size_words());

        let post = NeuronSlice::new(100, 110);
        let mut read = matrix.read_sub_matrix(&words, &sub, 0, post, 13).unwrap();
        read.sort_by_key(|s| (s.pre, s.post));
        let expected = [
            (0, 100, 0.5, 1),
            (0, 103, 1.0, 9),
            (0, 105, 0.25, 16),
            (2, 101, 2.0, 0),
            (2, 102, 0.75, 3),
        ];
        assert_eq!(read.len(), expected.len());
        for (got, (p, q, w, d)) in read.iter().zip(expected) {
            assert_eq!((got.pre, got.post, got.delay), (p, q, d));
            assert!((got.weight - w).abs() < 1e-3);
        }
    }

    #[test]
    fn static_matrix_round_trip() {
        round_trip(SynapseModel::Static);
    }

    #[test]
    fn plastic_matrix_round_trip() {
        round_trip(SynapseModel::Stdp(StdpParameters::default()));
    }

    fn dense_rows(model: SynapseModel, width: u32) {
        let matrix = SynapticMatrix::new(model);
        // Row 0 fills one delay slot of the main row, row 1 one extension sub-row
        let rows = vec![
            (0..width).map(|i| syn(i, 1 + i % 7, 0.5)).collect::<Vec<_>>(),
            (0..width).map(|i| syn(i, 8 + i % 7, 0.25)).collect(),
        ];
        let (sub, split) = matrix
            .host_sub_matrix(PopulationId(0), 0, pre(0, 2, 0x10000), &rows)
            .unwrap();
        assert_eq!(sub.max_cols, width as usize);
        assert_eq!(split[1][1].1.len(), width as usize);

        let placement = place_matrices(std::slice::from_ref(&sub));
        let words = matrix
            .write_matrices(std::slice::from_ref(&sub), &[Some(split)], &placement, 14)
            .unwrap();
        let ext = split_row_header(words[sub.row_words..sub.row_words + HEADER_WORDS].try_into().unwrap());
        assert_eq!(ext, (0, Some((MAX_DTCM_DELAY, 2 * sub.row_words as u32, width))));

        let read = matrix
            .read_sub_matrix(&words, &sub, 0, NeuronSlice::whole(width), 14)
            .unwrap();
        assert_eq!(read.len(), 2 * width as usize);
        assert!(read.iter().filter(|s| s.pre == 1).all(|s| (8..=14).contains(&s.delay)));
        assert_eq!(read.iter().filter(|s| s.pre == 1).map(|s| s.post).max(), Some(width - 1));
    }

    #[test]
    fn rows_of_1023_synapses_fit_one_slot() {
        dense_rows(SynapseModel::Static, 1023);
        dense_rows(SynapseModel::Stdp(StdpParameters::default()), 1023);
    }

    #[test]
    fn rows_of_1024_synapses_fit_one_slot() {
        dense_rows(SynapseModel::Static, 1024);
        dense_rows(SynapseModel::Stdp(StdpParameters::default()), 1024);
    }

    #[test]
    fn mismatched_sub_row_count_is_rejected() {
        let matrix = SynapticMatrix::new(SynapseModel::Static);
        let rows = vec![vec![syn(0, 1, 1.0), syn(1, 9, 1.0)]];
        let (sub, split) = matrix
            .host_sub_matrix(PopulationId(0), 0, pre(0, 1, 0x10000), &rows)
            .unwrap();
        let placement = place_matrices(std::slice::from_ref(&sub));
        let mut words = matrix
            .write_matrices(std::slice::from_ref(&sub), &[Some(split)], &placement, 13)
            .unwrap();
        // Claim two synapses in the extension sub-row
        words[3] = 2;
        assert!(matrix.read_sub_matrix(&words, &sub, 0, NeuronSlice::whole(2), 13).is_err());
    }

    #[test]
    fn weights_saturate() {
        assert_eq!(encode_weight(1.0, 13, false), 8192);
        assert_eq!(encode_weight(100.0, 13, false), u16::MAX);
        assert_eq!(decode_weight(8192, 13, false), 1.0);
    }

    #[test]
    fn estimate_covers_extensions() {
        let matrix = SynapticMatrix::new(SynapseModel::Static);
        assert_eq!(matrix.estimate_matrix_words(10, 5, 1, 0), 10 * 9);
        assert!(matrix.estimate_matrix_words(10, 5, 3, 5) > 10 * 9);
    }
}
