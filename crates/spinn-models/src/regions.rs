//! Memory regions of vertex images
//!
//! Every region knows how many bytes it occupies for a slice of neurons and
//! how to write exactly that many. The loader relies on the two agreeing,
//! so [`Region::serialize`] checks them against each other.
//!
//! | Region | Contents |
//! |--------|----------|
//! | [`SystemRegion`] | application words, timer period, tick count |
//! | [`ParameterRegion`] | per-neuron or homogeneous parameter records |
//! | [`KeyLookupRegion`] | `count`, then `key, mask, offset, row words` per sub-matrix |
//! | [`SynapticMatrixRegion`] | packed rows |
//! | [`OutputBufferRegion`] | two output buffer addresses |
//! | [`DelayBufferRegion`] | delay slots and rows per slot |
//! | [`ConnectionBuilderRegion`] | generation records of on-chip sub-matrices |
//! | [`InputBufferRegion`] | output buffers feeding a neuron slice |
//! | [`DirectInputRegion`] | `count`, then `neuron, weight, delay` per direct link |
//! | [`ProfilerRegion`] | sample count and sample space |
//! | [`StatisticsRegion`] | one counter per statistic |

use crate::error::{CompileError, Result};
use crate::params::ParamRecords;
use crate::slice::NeuronSlice;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use spinn_chip::layout::{KEY_LOOKUP_ENTRY_WORDS, MAX_DTCM_DELAY};
use std::ops::Range;

/// Profiler tags of the synapse processor
pub const SYNAPSE_PROFILER_TAGS: [&str; 5] = [
    "Timer tick",
    "Multicast packet received",
    "Setup next DMA row read",
    "Process row",
    "Process back propagation",
];

/// Counters of the synapse processor
pub const SYNAPSE_STATISTICS: [&str; 9] = [
    "row_requested",
    "delay_row_requested",
    "delay_buffers_not_processed",
    "input_buffer_overflows",
    "key_lookup_fails",
    "delay_buffer_overflows",
    "delay_buffer_fetch_fails",
    "task_queue_full",
    "timer_event_overflows",
];

/// Profiler tags of the neuron processor
pub const NEURON_PROFILER_TAGS: [&str; 3] = ["Timer tick", "Apply input buffers", "Update neurons"];

/// Counters of the neuron processor
pub const NEURON_STATISTICS: [&str; 2] = ["task_queue_full", "timer_event_overflows"];

/// Counters of the current-input processor
pub const CURRENT_INPUT_STATISTICS: [&str; 3] = ["input_buffer_overflows", "task_queue_full", "timer_event_overflows"];

/// Set in a profiler tag word when the sample marks entry to the tagged code
pub const PROFILER_ENTER: u32 = 1 << 31;

/// One serializable section of a vertex image
pub trait Region {
    /// Name used in diagnostics
    fn name(&self) -> &'static str;

    /// Bytes the region occupies for `slice`
    fn size_of(&self, slice: &NeuronSlice) -> usize;

    /// Append the region's bytes for `slice`
    ///
    /// # Errors
    ///
    /// Returns error if the region's data does not cover `slice`.
    fn write(&self, slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()>;

    /// Serialize the region for `slice`
    ///
    /// # Errors
    ///
    /// Returns error if writing fails or the written length differs from
    /// [`Region::size_of`].
    fn serialize(&self, slice: &NeuronSlice) -> Result<Bytes> {
        let declared = self.size_of(slice);
        let mut buf = BytesMut::with_capacity(declared);
        self.write(slice, &mut buf)?;
        if buf.len() != declared {
            return Err(CompileError::RegionSize {
                region: self.name(),
                declared,
                written: buf.len(),
            });
        }
        Ok(buf.freeze())
    }
}

fn put_words(buf: &mut BytesMut, words: &[u32]) {
    for word in words {
        buf.put_u32_le(*word);
    }
}

fn count_word(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Timer and application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRegion {
    /// Application specific words, written first
    pub application_words: Vec<u32>,
    /// Timer period in microseconds
    pub timer_period_us: u32,
    /// Simulation length in ticks
    pub sim_ticks: u32,
}

impl Region for SystemRegion {
    fn name(&self) -> &'static str {
        "system"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        (self.application_words.len() + 2) * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        put_words(buf, &self.application_words);
        buf.put_u32_le(self.timer_period_us);
        buf.put_u32_le(self.sim_ticks);
        Ok(())
    }
}

/// Blocks of parameter records written back to back
///
/// Per-neuron regions write the records of the slice from every block;
/// homogeneous regions write every record regardless of the slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRegion {
    name: &'static str,
    blocks: Vec<ParamRecords>,
    homogeneous: bool,
}

impl ParameterRegion {
    /// Region holding one record per neuron in each block
    pub const fn per_neuron(name: &'static str, blocks: Vec<ParamRecords>) -> Self {
        Self {
            name,
            blocks,
            homogeneous: false,
        }
    }

    /// Region whose records are shared by every neuron
    pub const fn homogeneous(name: &'static str, blocks: Vec<ParamRecords>) -> Self {
        Self {
            name,
            blocks,
            homogeneous: true,
        }
    }

    /// Encoded blocks
    pub fn blocks(&self) -> &[ParamRecords] {
        &self.blocks
    }

    fn range(&self, block: &ParamRecords, slice: &NeuronSlice) -> Range<usize> {
        if self.homogeneous {
            0..block.len()
        } else {
            slice.range()
        }
    }

    fn present(&self) -> impl Iterator<Item = &ParamRecords> {
        self.blocks.iter().filter(|b| b.fields() > 0)
    }
}

impl Region for ParameterRegion {
    fn name(&self) -> &'static str {
        self.name
    }

    fn size_of(&self, slice: &NeuronSlice) -> usize {
        self.present().map(|b| b.size_of(&self.range(b, slice))).sum()
    }

    fn write(&self, slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        for block in self.present() {
            let range = self.range(block, slice);
            if range.end > block.len() {
                return Err(CompileError::ShapeMismatch {
                    name: self.name.to_string(),
                    expected: range.end,
                    actual: block.len(),
                });
            }
            block.write_slice(&range, buf);
        }
        Ok(())
    }
}

/// Sorted key to sub-matrix table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLookupRegion {
    /// `key, mask, word offset, row words` per sub-matrix, sorted by key
    pub entries: Vec<[u32; KEY_LOOKUP_ENTRY_WORDS]>,
}

impl Region for KeyLookupRegion {
    fn name(&self) -> &'static str {
        "key_lookup"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        4 + self.entries.len() * KEY_LOOKUP_ENTRY_WORDS * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(count_word(self.entries.len()));
        for entry in &self.entries {
            put_words(buf, entry);
        }
        Ok(())
    }
}

/// Packed synaptic matrix words
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynapticMatrixRegion {
    /// Every sub-matrix, placed
    pub words: Vec<u32>,
}

impl Region for SynapticMatrixRegion {
    fn name(&self) -> &'static str {
        "synaptic_matrix"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        self.words.len() * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        put_words(buf, &self.words);
        Ok(())
    }
}

/// Addresses of a synapse vertex's double-buffered output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputBufferRegion {
    /// Device addresses of both buffers
    pub addresses: [u32; 2],
}

impl Region for OutputBufferRegion {
    fn name(&self) -> &'static str {
        "output_buffer"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        8
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        put_words(buf, &self.addresses);
        Ok(())
    }
}

/// Sizing of the ring of delay buffers feeding extension sub-rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBufferRegion {
    /// Number of delay slots, a power of two
    pub num_slots: u32,
    /// Rows one slot can hold
    pub rows_per_slot: u32,
}

impl DelayBufferRegion {
    /// Buffers for delays up to `max_delay_ticks`
    pub fn new(max_delay_ticks: u32, rows_per_slot: u32) -> Self {
        Self {
            num_slots: (max_delay_ticks / MAX_DTCM_DELAY + 1).next_power_of_two(),
            rows_per_slot,
        }
    }
}

impl Region for DelayBufferRegion {
    fn name(&self) -> &'static str {
        "delay_buffer"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        8
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(self.num_slots);
        buf.put_u32_le(self.rows_per_slot);
        Ok(())
    }
}

/// Tagged parameter records of one on-device generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorParams {
    /// Generator tag understood by the device
    pub kind: u32,
    /// Encoded parameters
    pub records: ParamRecords,
}

impl GeneratorParams {
    fn words(&self) -> usize {
        1 + self.records.len() * self.records.fields()
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.kind);
        self.records.write_slice(&(0..self.records.len()), buf);
    }
}

/// Everything the device needs to generate one sub-matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChipMatrix {
    /// Key of the pre-synaptic vertex
    pub key: u32,
    /// Word offset of the reserved block in the synaptic matrix
    pub word_offset: u32,
    /// Row stride in synapses
    pub max_row_synapses: u32,
    /// Rows to generate
    pub num_rows: u32,
    /// Width of the post slice
    pub post_slice_len: u32,
    /// Seed of the device generator
    pub seed: [u32; 4],
    /// Connectivity generator
    pub connector: GeneratorParams,
    /// Delay generator
    pub delay: GeneratorParams,
    /// Weight generator
    pub weight: GeneratorParams,
}

impl OnChipMatrix {
    const HEADER_WORDS: usize = 9;

    fn words(&self) -> usize {
        Self::HEADER_WORDS + self.connector.words() + self.delay.words() + self.weight.words()
    }
}

/// Generation records of every sub-matrix built on chip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionBuilderRegion {
    /// One record per deferred sub-matrix
    pub matrices: Vec<OnChipMatrix>,
}

impl Region for ConnectionBuilderRegion {
    fn name(&self) -> &'static str {
        "connection_builder"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        4 + self.matrices.iter().map(OnChipMatrix::words).sum::<usize>() * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(count_word(self.matrices.len()));
        for m in &self.matrices {
            put_words(
                buf,
                &[m.key, m.word_offset, m.max_row_synapses, m.num_rows, m.post_slice_len],
            );
            put_words(buf, &m.seed);
            m.connector.write(buf);
            m.delay.write(buf);
            m.weight.write(buf);
        }
        Ok(())
    }
}

/// One synapse vertex output feeding a neuron slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBuffer {
    /// Both output buffer addresses
    pub addresses: [u32; 2],
    /// Receptor the buffer feeds
    pub receptor: u32,
    /// Fixed point of the buffered values
    pub weight_fixed_point: u32,
    /// First buffered neuron used by the slice
    pub buffer_offset: u32,
    /// First neuron of the slice fed by the buffer
    pub neuron_offset: u32,
    /// Neurons covered
    pub neurons: u32,
}

impl InputBuffer {
    const WORDS: usize = 7;
}

/// Output buffers read by a neuron vertex
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBufferRegion {
    /// Buffers, in synapse cluster order
    pub buffers: Vec<InputBuffer>,
}

impl Region for InputBufferRegion {
    fn name(&self) -> &'static str {
        "input_buffer"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        4 + self.buffers.len() * InputBuffer::WORDS * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(count_word(self.buffers.len()));
        for b in &self.buffers {
            put_words(
                buf,
                &[
                    b.addresses[0],
                    b.addresses[1],
                    b.receptor,
                    b.weight_fixed_point,
                    b.buffer_offset,
                    b.neuron_offset,
                    b.neurons,
                ],
            );
        }
        Ok(())
    }
}

/// One direct link of a current-input vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectInput {
    /// Neuron within the vertex slice
    pub neuron: u32,
    /// Encoded weight
    pub weight: u32,
    /// Delay in ticks
    pub delay: u32,
}

impl DirectInput {
    const WORDS: usize = 3;
}

/// Direct links of a current-input vertex, in neuron order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectInputRegion {
    /// Links
    pub inputs: Vec<DirectInput>,
}

impl DirectInputRegion {
    /// Bytes the region needs when every neuron of `slice` has a link
    pub const fn max_size(slice: &NeuronSlice) -> usize {
        4 + slice.len() as usize * DirectInput::WORDS * 4
    }

    /// Decode a region read back from the device
    ///
    /// # Errors
    ///
    /// Returns error if `data` holds fewer links than it claims.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let count = if buf.remaining() >= 4 { buf.get_u32_le() as usize } else { 0 };
        let expected = 4 + count * DirectInput::WORDS * 4;
        if data.len() < expected {
            return Err(CompileError::Truncated {
                region: "direct_input",
                expected,
                actual: data.len(),
            });
        }
        let inputs = (0..count)
            .map(|_| DirectInput {
                neuron: buf.get_u32_le(),
                weight: buf.get_u32_le(),
                delay: buf.get_u32_le(),
            })
            .collect();
        Ok(Self { inputs })
    }
}

impl Region for DirectInputRegion {
    fn name(&self) -> &'static str {
        "direct_input"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        4 + self.inputs.len() * DirectInput::WORDS * 4
    }

    fn write(&self, slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        if let Some(outside) = self.inputs.iter().find(|i| i.neuron >= slice.len()) {
            return Err(CompileError::config(format!(
                "direct input to neuron {} outside a slice of {}",
                outside.neuron,
                slice.len()
            )));
        }
        buf.put_u32_le(count_word(self.inputs.len()));
        for i in &self.inputs {
            put_words(buf, &[i.neuron, i.weight, i.delay]);
        }
        Ok(())
    }
}

/// One recorded profiler sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSample {
    /// Timer value at the sample
    pub time: u32,
    /// Raw tag
    pub tag: u32,
    /// Tag name, `None` for tags the processor does not define
    pub name: Option<&'static str>,
    /// Entry (`true`) or exit of the tagged code
    pub enter: bool,
}

/// Space for profiler samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerRegion {
    /// Capacity in samples
    pub num_samples: u32,
}

impl ProfilerRegion {
    /// Decode samples read back from a profiler region
    ///
    /// The device replaces the first word with the number of samples it
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns error if `data` holds fewer samples than it claims.
    pub fn read_profile(data: &[u8], tags: &[&'static str]) -> Result<Vec<ProfileSample>> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(CompileError::Truncated {
                region: "profiler",
                expected: 4,
                actual: buf.remaining(),
            });
        }
        let count = buf.get_u32_le() as usize;
        if buf.remaining() < count * 8 {
            return Err(CompileError::Truncated {
                region: "profiler",
                expected: 4 + count * 8,
                actual: data.len(),
            });
        }
        Ok((0..count)
            .map(|_| {
                let time = buf.get_u32_le();
                let word = buf.get_u32_le();
                let tag = word & !PROFILER_ENTER;
                ProfileSample {
                    time,
                    tag,
                    name: tags.get(tag as usize).copied(),
                    enter: word & PROFILER_ENTER != 0,
                }
            })
            .collect())
    }
}

impl Region for ProfilerRegion {
    fn name(&self) -> &'static str {
        "profiler"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        4 + self.num_samples as usize * 8
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32_le(self.num_samples);
        buf.put_bytes(0, self.num_samples as usize * 8);
        Ok(())
    }
}

/// Zeroed counters, one word per statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsRegion {
    /// Statistic names, in device order
    pub names: &'static [&'static str],
}

impl StatisticsRegion {
    /// Pair every counter read back with its name
    ///
    /// # Errors
    ///
    /// Returns error if `data` is shorter than the region.
    pub fn read_stats(&self, data: &[u8]) -> Result<Vec<(&'static str, u32)>> {
        let expected = self.names.len() * 4;
        if data.len() < expected {
            return Err(CompileError::Truncated {
                region: "statistics",
                expected,
                actual: data.len(),
            });
        }
        let mut buf = data;
        Ok(self.names.iter().map(|name| (*name, buf.get_u32_le())).collect())
    }
}

impl Region for StatisticsRegion {
    fn name(&self) -> &'static str {
        "statistics"
    }

    fn size_of(&self, _slice: &NeuronSlice) -> usize {
        self.names.len() * 4
    }

    fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
        buf.put_bytes(0, self.names.len() * 4);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{apply, BinaryType, FieldSpec, MapContext, ParameterSpace, Transform, TransformContext};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn records(size: usize) -> ParamRecords {
        let space = ParameterSpace::new(size).with("a", (0..size).map(|i| i as f64).collect::<Vec<_>>());
        let fields = [
            FieldSpec::param("a", BinaryType::I32, Transform::S1615),
            FieldSpec::constant(7.0, BinaryType::U32),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = MapContext::new(TransformContext::new(1.0), &mut rng);
        apply(&space, &fields, &mut ctx).unwrap()
    }

    fn assert_consistent(region: &dyn Region, slice: &NeuronSlice) {
        let bytes = region.serialize(slice).unwrap();
        assert_eq!(bytes.len(), region.size_of(slice), "{}", region.name());
    }

    #[test]
    fn every_region_writes_its_declared_size() {
        let slice = NeuronSlice::new(2, 6);
        let on_chip = OnChipMatrix {
            key: 0x1_0000,
            word_offset: 12,
            max_row_synapses: 9,
            num_rows: 4,
            post_slice_len: 4,
            seed: [1, 2, 3, 4],
            connector: GeneratorParams {
                kind: 1,
                records: records(1),
            },
            delay: GeneratorParams {
                kind: 0,
                records: records(1),
            },
            weight: GeneratorParams {
                kind: 2,
                records: records(1),
            },
        };
        let regions: Vec<Box<dyn Region>> = vec![
            Box::new(SystemRegion {
                application_words: vec![13, 4, 0],
                timer_period_us: 1000,
                sim_ticks: 50,
            }),
            Box::new(ParameterRegion::per_neuron("neuron", vec![records(8), ParamRecords::default()])),
            Box::new(ParameterRegion::homogeneous("plasticity", vec![records(1)])),
            Box::new(KeyLookupRegion {
                entries: vec![[1, 2, 3, 4]; 3],
            }),
            Box::new(SynapticMatrixRegion { words: vec![0; 17] }),
            Box::new(OutputBufferRegion::default()),
            Box::new(DelayBufferRegion::new(20, 64)),
            Box::new(ConnectionBuilderRegion {
                matrices: vec![on_chip],
            }),
            Box::new(InputBufferRegion {
                buffers: vec![
                    InputBuffer {
                        addresses: [0x6000_0000, 0x6000_0010],
                        receptor: 1,
                        weight_fixed_point: 13,
                        buffer_offset: 0,
                        neuron_offset: 0,
                        neurons: 4,
                    };
                    2
                ],
            }),
            Box::new(DirectInputRegion {
                inputs: vec![
                    DirectInput {
                        neuron: 3,
                        weight: 0x4000,
                        delay: 1,
                    };
                    3
                ],
            }),
            Box::new(ProfilerRegion { num_samples: 10 }),
            Box::new(StatisticsRegion {
                names: &SYNAPSE_STATISTICS,
            }),
        ];
        for region in &regions {
            assert_consistent(region.as_ref(), &slice);
        }
    }

    #[test]
    fn system_words_lead_with_application_words() {
        let region = SystemRegion {
            application_words: vec![13, 256, 1],
            timer_period_us: 1000,
            sim_ticks: 10,
        };
        let bytes = region.serialize(&NeuronSlice::whole(256)).unwrap();
        let words: Vec<u32> = bytes.chunks(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(words, vec![13, 256, 1, 1000, 10]);
    }

    #[test]
    fn per_neuron_region_writes_slice_only() {
        let region = ParameterRegion::per_neuron("neuron", vec![records(8)]);
        let bytes = region.serialize(&NeuronSlice::new(2, 4)).unwrap();
        assert_eq!(bytes.len(), 2 * 2 * 4);
        // Record 2, field a = 2.0 in s1615
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 2 << 15);
    }

    #[test]
    fn per_neuron_region_rejects_uncovered_slice() {
        let region = ParameterRegion::per_neuron("neuron", vec![records(4)]);
        assert!(matches!(
            region.serialize(&NeuronSlice::new(2, 6)),
            Err(CompileError::ShapeMismatch { expected: 6, actual: 4, .. })
        ));
    }

    #[test]
    fn homogeneous_region_ignores_slice() {
        let region = ParameterRegion::homogeneous("plasticity", vec![records(1)]);
        let a = region.serialize(&NeuronSlice::new(0, 100)).unwrap();
        let b = region.serialize(&NeuronSlice::new(500, 510)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn direct_inputs_read_back_as_written() {
        let region = DirectInputRegion {
            inputs: (0..4)
                .map(|n| DirectInput {
                    neuron: n,
                    weight: 100 + n,
                    delay: 2,
                })
                .collect(),
        };
        let slice = NeuronSlice::new(10, 14);
        let bytes = region.serialize(&slice).unwrap();
        assert_eq!(bytes.len(), DirectInputRegion::max_size(&slice));
        assert_eq!(DirectInputRegion::read(&bytes).unwrap(), region);
        assert!(matches!(
            DirectInputRegion::read(&bytes[..20]),
            Err(CompileError::Truncated { expected: 52, .. })
        ));
    }

    #[test]
    fn direct_input_outside_slice_is_rejected() {
        let region = DirectInputRegion {
            inputs: vec![DirectInput {
                neuron: 4,
                weight: 1,
                delay: 1,
            }],
        };
        assert!(region.serialize(&NeuronSlice::new(0, 4)).is_err());
    }

    #[test]
    fn delay_slots_are_powers_of_two() {
        assert_eq!(DelayBufferRegion::new(7, 1).num_slots, 2);
        assert_eq!(DelayBufferRegion::new(20, 1).num_slots, 4);
        assert_eq!(DelayBufferRegion::new(0, 1).num_slots, 1);
    }

    #[test]
    fn mismatched_size_is_reported() {
        struct Liar;
        impl Region for Liar {
            fn name(&self) -> &'static str {
                "liar"
            }
            fn size_of(&self, _slice: &NeuronSlice) -> usize {
                8
            }
            fn write(&self, _slice: &NeuronSlice, buf: &mut BytesMut) -> Result<()> {
                buf.put_u32_le(0);
                Ok(())
            }
        }
        assert!(matches!(
            Liar.serialize(&NeuronSlice::whole(1)),
            Err(CompileError::RegionSize {
                declared: 8,
                written: 4,
                ..
            })
        ));
    }

    #[test]
    fn profile_samples_are_named() {
        let mut data = BytesMut::new();
        data.put_u32_le(2);
        data.put_u32_le(100);
        data.put_u32_le(PROFILER_ENTER | 3);
        data.put_u32_le(150);
        data.put_u32_le(3);
        let samples = ProfilerRegion::read_profile(&data, &SYNAPSE_PROFILER_TAGS).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, Some("Process row"));
        assert!(samples[0].enter);
        assert!(!samples[1].enter);
        assert_eq!(samples[1].time, 150);

        assert!(ProfilerRegion::read_profile(&data[..12], &SYNAPSE_PROFILER_TAGS).is_err());
    }

    #[test]
    fn statistics_are_paired_with_names() {
        let region = StatisticsRegion {
            names: &NEURON_STATISTICS,
        };
        let data = [5u8, 0, 0, 0, 9, 0, 0, 0];
        assert_eq!(
            region.read_stats(&data).unwrap(),
            vec![("task_queue_full", 5), ("timer_event_overflows", 9)]
        );
        assert!(region.read_stats(&data[..4]).is_err());
    }
}
