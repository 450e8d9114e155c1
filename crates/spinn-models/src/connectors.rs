//! Connectivity rules
//!
//! A [`Connector`] decides which pre-synaptic neurons connect to which
//! post-synaptic neurons. Before any connection exists the compiler needs
//! bounds on row lengths for a window of the connectivity matrix; these come
//! from the exact distribution of each rule, taken at
//! [`ESTIMATE_QUANTILE`](crate::stats::ESTIMATE_QUANTILE).
//!
//! | Connector | Row length distribution |
//! |-----------|-------------------------|
//! | `AllToAll` | `len(post)` |
//! | `FixedProbability` | `Binomial(len(post), p)` |
//! | `OneToOne` | 1 when the windows overlap |
//! | `FromList` | histogram of the list |
//! | `FixedNumberPost` | `Hypergeom(post_size, n, len(post))` |
//! | `FixedNumberPre` | `Binomial(len(post), n / pre_size)` |
//! | `FixedTotalNumber` | `Hypergeom(pre_size * post_size, n, len(post))` |
//!
//! `FixedTotalNumber` distributes a global total over windows, so building it
//! consumes a [`ConsumableState`] shared by every window of the projection.

use crate::error::{CompileError, Result};
use crate::params::{
    apply, BinaryType, ComputedFields, FieldSpec, MapContext, ParamRecords, ParameterSpace, Transform,
    TransformContext,
};
use crate::random::mix_seed;
use crate::slice::NeuronSlice;
use crate::stats::{binomial_ppf, hypergeom_ppf, ESTIMATE_QUANTILE};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Binomial, Distribution, Hypergeometric};
use serde::Deserialize;
use std::collections::BTreeMap;

const fn default_true() -> bool {
    true
}

/// One entry of an explicit connection list
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ListConnection {
    /// Pre-synaptic neuron
    pub pre: u32,
    /// Post-synaptic neuron
    pub post: u32,
    /// Weight overriding the projection's
    #[serde(default)]
    pub weight: Option<f64>,
    /// Delay (ms) overriding the projection's
    #[serde(default)]
    pub delay: Option<f64>,
}

/// Connectivity rule of a projection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Connector {
    /// Every pre neuron to every post neuron
    AllToAll {
        /// Connect a neuron to itself in recurrent projections
        #[serde(default = "default_true")]
        allow_self_connections: bool,
    },
    /// Each pair independently with probability `p_connect`
    FixedProbability {
        /// Connection probability
        p_connect: f64,
        /// Connect a neuron to itself in recurrent projections
        #[serde(default = "default_true")]
        allow_self_connections: bool,
    },
    /// Neuron `i` to neuron `i`
    OneToOne,
    /// Explicit list
    FromList {
        /// Connections
        connections: Vec<ListConnection>,
    },
    /// Each pre neuron to `n` random post neurons
    FixedNumberPost {
        /// Connections per pre neuron
        n: u32,
        /// Connect a neuron to itself in recurrent projections
        #[serde(default = "default_true")]
        allow_self_connections: bool,
    },
    /// Each post neuron from `n` random pre neurons
    FixedNumberPre {
        /// Connections per post neuron
        n: u32,
        /// Connect a neuron to itself in recurrent projections
        #[serde(default = "default_true")]
        allow_self_connections: bool,
    },
    /// `n` connections spread over the whole matrix
    FixedTotalNumber {
        /// Total connections
        n: u64,
        /// Allow the same pair more than once
        #[serde(default = "default_true")]
        with_replacement: bool,
    },
}

/// A window of the connectivity matrix and the populations around it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionWindow {
    /// Pre-synaptic neurons (rows)
    pub pre: NeuronSlice,
    /// Post-synaptic neurons (columns)
    pub post: NeuronSlice,
    /// Pre-synaptic population size
    pub pre_size: u32,
    /// Post-synaptic population size
    pub post_size: u32,
    /// Pre and post are the same population
    pub recurrent: bool,
}

impl ConnectionWindow {
    /// Pairs in the window
    pub const fn pairs(&self) -> u64 {
        self.pre.len() as u64 * self.post.len() as u64
    }
}

/// One generated connection, in population indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    /// Pre-synaptic neuron
    pub pre: u32,
    /// Post-synaptic neuron
    pub post: u32,
    /// Weight from the connector, if it carries one
    pub weight: Option<f64>,
    /// Delay (ms) from the connector, if it carries one
    pub delay: Option<f64>,
}

impl Connection {
    const fn pair(pre: u32, post: u32) -> Self {
        Self {
            pre,
            post,
            weight: None,
            delay: None,
        }
    }
}

/// Remaining budget of a fixed-total-number projection
///
/// Each draw takes `k` connections for a window of `pairs` pairs:
/// `Binomial(n, pairs / N)` with replacement or
/// `Hypergeom(N, n, pairs)` without, then `n -= k` and `N -= pairs`.
/// Drawing every window of a partition of the matrix therefore yields
/// exactly the configured total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumableState {
    /// Connections still to be placed
    pub remaining: u64,
    /// Pairs not yet drawn from
    pub pairs: u64,
    /// Sampling with replacement
    pub with_replacement: bool,
}

impl ConsumableState {
    /// Draw the connection count of a window of `pairs` pairs
    ///
    /// # Errors
    ///
    /// Returns error if the sampler rejects its parameters.
    #[allow(clippy::cast_precision_loss)]
    pub fn draw(&mut self, pairs: u64, rng: &mut dyn RngCore) -> Result<u64> {
        let pairs = pairs.min(self.pairs);
        if pairs == 0 || self.remaining == 0 {
            self.pairs -= pairs;
            return Ok(0);
        }
        let count = if pairs == self.pairs {
            self.remaining
        } else if self.with_replacement {
            Binomial::new(self.remaining, pairs as f64 / self.pairs as f64)
                .map_err(|e| CompileError::config(format!("Binomial draw: {e}")))?
                .sample(rng)
        } else {
            Hypergeometric::new(self.pairs, self.remaining, pairs)
                .map_err(|e| CompileError::config(format!("Hypergeometric draw: {e}")))?
                .sample(rng)
        };
        self.remaining -= count;
        self.pairs -= pairs;
        Ok(count)
    }
}

/// Device tags of connectors that can be generated on chip
pub mod device_kind {
    /// All-to-all
    pub const ALL_TO_ALL: u32 = 0;
    /// Fixed probability
    pub const FIXED_PROBABILITY: u32 = 1;
    /// Fixed number pre
    pub const FIXED_NUMBER_PRE: u32 = 2;
    /// Fixed number post
    pub const FIXED_NUMBER_POST: u32 = 3;
    /// Fixed total number
    pub const FIXED_TOTAL_NUMBER: u32 = 4;
}

const ALLOW_SELF: FieldSpec = FieldSpec::param("allow_self_connections", BinaryType::U32, Transform::Integer);
const N: FieldSpec = FieldSpec::param("n", BinaryType::U32, Transform::Integer);

const ALL_TO_ALL_MAP: [FieldSpec; 1] = [ALLOW_SELF];
const FIXED_PROBABILITY_MAP: [FieldSpec; 2] = [
    FieldSpec::param("p_connect", BinaryType::U32, Transform::U032),
    ALLOW_SELF,
];
const FIXED_NUMBER_MAP: [FieldSpec; 2] = [N, ALLOW_SELF];
const FIXED_TOTAL_MAP: [FieldSpec; 3] = [
    FieldSpec::param("with_replacement", BinaryType::U32, Transform::Integer),
    FieldSpec::computed("num_connections", BinaryType::U32),
    FieldSpec::computed("sub_matrix_size", BinaryType::U32),
];

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl Connector {
    /// Rule name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AllToAll { .. } => "all_to_all",
            Self::FixedProbability { .. } => "fixed_probability",
            Self::OneToOne => "one_to_one",
            Self::FromList { .. } => "from_list",
            Self::FixedNumberPost { .. } => "fixed_number_post",
            Self::FixedNumberPre { .. } => "fixed_number_pre",
            Self::FixedTotalNumber { .. } => "fixed_total_number",
        }
    }

    /// Whether the rule can be replaced by a direct current link
    pub const fn directly_connectable(&self) -> bool {
        matches!(self, Self::OneToOne)
    }

    /// Check the rule against the populations it connects
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidConnector`] for impossible parameters.
    pub fn validate(&self, projection: &str, pre_size: u32, post_size: u32) -> Result<()> {
        let fail = |reason: String| Err(CompileError::invalid_connector(projection, reason));
        match self {
            Self::FixedProbability { p_connect, .. } if !(0.0..=1.0).contains(p_connect) => {
                fail(format!("p_connect {p_connect} outside [0, 1]"))
            }
            Self::FixedNumberPost { n, .. } if *n > post_size => {
                fail(format!("n = {n} exceeds post-synaptic population of {post_size}"))
            }
            Self::FixedNumberPre { n, .. } if *n > pre_size => {
                fail(format!("n = {n} exceeds pre-synaptic population of {pre_size}"))
            }
            Self::FixedTotalNumber {
                n,
                with_replacement: false,
            } if *n > u64::from(pre_size) * u64::from(post_size) => {
                fail(format!("n = {n} exceeds {pre_size} x {post_size} pairs"))
            }
            Self::FromList { connections } => {
                match connections.iter().find(|c| c.pre >= pre_size || c.post >= post_size) {
                    Some(c) => fail(format!("connection {} -> {} out of range", c.pre, c.post)),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Upper bound on synapses per row within `window`
    ///
    /// Never below the rounded-up mean.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimate_max_row_synapses(&self, window: &ConnectionWindow) -> u32 {
        let post_len = u64::from(window.post.len());
        let max = match self {
            Self::AllToAll { .. } => post_len,
            Self::FixedProbability { p_connect, .. } => binomial_ppf(ESTIMATE_QUANTILE, post_len, *p_connect),
            Self::OneToOne => u64::from(window.pre.overlap(&window.post).is_some()),
            Self::FromList { connections } => {
                u64::from(row_histogram(connections, window).into_values().max().unwrap_or(0))
            }
            Self::FixedNumberPost { n, .. } => {
                hypergeom_ppf(ESTIMATE_QUANTILE, u64::from(window.post_size), u64::from(*n), post_len)
            }
            Self::FixedNumberPre { n, .. } => binomial_ppf(
                ESTIMATE_QUANTILE,
                post_len,
                f64::from(*n) / f64::from(window.pre_size.max(1)),
            ),
            Self::FixedTotalNumber { n, .. } => hypergeom_ppf(
                ESTIMATE_QUANTILE,
                u64::from(window.pre_size) * u64::from(window.post_size),
                *n,
                post_len,
            ),
        };
        let mean = self.estimate_mean_row_synapses(window).ceil() as u64;
        max.max(mean).min(post_len) as u32
    }

    /// Expected synapses per row within `window`
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_mean_row_synapses(&self, window: &ConnectionWindow) -> f64 {
        let post_len = f64::from(window.post.len());
        match self {
            Self::AllToAll { .. } => post_len,
            Self::FixedProbability { p_connect, .. } => (p_connect * post_len).round(),
            Self::OneToOne => f64::from(u8::from(window.pre.overlap(&window.post).is_some())),
            Self::FromList { connections } => {
                let total: u32 = row_histogram(connections, window).into_values().sum();
                f64::from(total) / f64::from(window.pre.len().max(1))
            }
            Self::FixedNumberPost { n, .. } => f64::from(*n) * post_len / f64::from(window.post_size.max(1)),
            Self::FixedNumberPre { n, .. } => f64::from(*n) * post_len / f64::from(window.pre_size.max(1)),
            Self::FixedTotalNumber { n, .. } => {
                let pairs = f64::from(window.pre_size) * f64::from(window.post_size);
                if pairs > 0.0 {
                    *n as f64 * post_len / pairs
                } else {
                    0.0
                }
            }
        }
    }

    /// Fresh consumable state, for rules that distribute a global total
    pub fn initial_state(&self, pre_size: u32, post_size: u32) -> Option<ConsumableState> {
        match self {
            Self::FixedTotalNumber { n, with_replacement } => Some(ConsumableState {
                remaining: *n,
                pairs: u64::from(pre_size) * u64::from(post_size),
                with_replacement: *with_replacement,
            }),
            _ => None,
        }
    }

    /// Build every connection inside `window`
    ///
    /// Per-row and per-column rules seed one generator per neuron from
    /// `seed`, so a neuron's connections do not depend on how the other
    /// population is sliced.
    ///
    /// # Errors
    ///
    /// Returns error if the rule is invalid for the window or a
    /// fixed-total-number rule is built without its state.
    pub fn build(
        &self,
        projection: &str,
        window: &ConnectionWindow,
        seed: u64,
        state: Option<&mut ConsumableState>,
    ) -> Result<Vec<Connection>> {
        let no_self = |allow: bool, pre: u32, post: u32| !allow && window.recurrent && pre == post;
        let mut connections = Vec::new();
        match self {
            Self::AllToAll { allow_self_connections } => {
                for pre in window.pre.start..window.pre.stop {
                    for post in window.post.start..window.post.stop {
                        if !no_self(*allow_self_connections, pre, post) {
                            connections.push(Connection::pair(pre, post));
                        }
                    }
                }
            }
            Self::FixedProbability {
                p_connect,
                allow_self_connections,
            } => {
                self.validate(projection, window.pre_size, window.post_size)?;
                let mut rng = StdRng::seed_from_u64(mix_seed(seed, u64::from(window.post.start)));
                for pre in window.pre.start..window.pre.stop {
                    for post in window.post.start..window.post.stop {
                        if rng.gen_bool(*p_connect) && !no_self(*allow_self_connections, pre, post) {
                            connections.push(Connection::pair(pre, post));
                        }
                    }
                }
            }
            Self::OneToOne => {
                if let Some(overlap) = window.pre.overlap(&window.post) {
                    connections.extend((overlap.start..overlap.stop).map(|i| Connection::pair(i, i)));
                }
            }
            Self::FromList { connections: list } => {
                connections.extend(
                    list.iter()
                        .filter(|c| window.pre.contains(c.pre) && window.post.contains(c.post))
                        .map(|c| Connection {
                            pre: c.pre,
                            post: c.post,
                            weight: c.weight,
                            delay: c.delay,
                        }),
                );
            }
            Self::FixedNumberPost {
                n,
                allow_self_connections,
            } => {
                self.validate(projection, window.pre_size, window.post_size)?;
                for pre in window.pre.start..window.pre.stop {
                    let exclude = (!allow_self_connections && window.recurrent).then_some(pre);
                    let targets = choose(seed, pre, window.post_size, *n, exclude)
                        .map_err(|reason| CompileError::invalid_connector(projection, reason))?;
                    connections.extend(
                        targets
                            .into_iter()
                            .filter(|post| window.post.contains(*post))
                            .map(|post| Connection::pair(pre, post)),
                    );
                }
            }
            Self::FixedNumberPre {
                n,
                allow_self_connections,
            } => {
                self.validate(projection, window.pre_size, window.post_size)?;
                // Column-major generation; rows are sorted by the caller
                for post in window.post.start..window.post.stop {
                    let exclude = (!allow_self_connections && window.recurrent).then_some(post);
                    let sources = choose(!seed, post, window.pre_size, *n, exclude)
                        .map_err(|reason| CompileError::invalid_connector(projection, reason))?;
                    connections.extend(
                        sources
                            .into_iter()
                            .filter(|pre| window.pre.contains(*pre))
                            .map(|pre| Connection::pair(pre, post)),
                    );
                }
            }
            Self::FixedTotalNumber { with_replacement, .. } => {
                self.validate(projection, window.pre_size, window.post_size)?;
                let state = state.ok_or_else(|| {
                    CompileError::invalid_connector(projection, "fixed total number built without its state")
                })?;
                let mut rng = StdRng::seed_from_u64(mix_seed(seed, u64::from(window.post.start)));
                let count = state.draw(window.pairs(), &mut rng)?;
                let post_len = u64::from(window.post.len());
                let to_pair = |index: u64| {
                    #[allow(clippy::cast_possible_truncation)]
                    Connection::pair(
                        window.pre.start + (index / post_len) as u32,
                        window.post.start + (index % post_len) as u32,
                    )
                };
                if *with_replacement {
                    connections.extend((0..count).map(|_| to_pair(rng.gen_range(0..window.pairs()))));
                } else {
                    let pairs = usize::try_from(window.pairs())
                        .map_err(|_| CompileError::invalid_connector(projection, "window too large"))?;
                    let count = usize::try_from(count)
                        .map_err(|_| CompileError::invalid_connector(projection, "too many connections"))?;
                    connections.extend(
                        rand::seq::index::sample(&mut rng, pairs, count)
                            .iter()
                            .map(|i| to_pair(i as u64)),
                    );
                }
            }
        }
        Ok(connections)
    }

    /// Device tag, `None` when the rule must be built on the host
    pub const fn device_kind(&self) -> Option<u32> {
        match self {
            Self::AllToAll { .. } => Some(device_kind::ALL_TO_ALL),
            Self::FixedProbability { .. } => Some(device_kind::FIXED_PROBABILITY),
            Self::FixedNumberPre { .. } => Some(device_kind::FIXED_NUMBER_PRE),
            Self::FixedNumberPost { .. } => Some(device_kind::FIXED_NUMBER_POST),
            Self::FixedTotalNumber { .. } => Some(device_kind::FIXED_TOTAL_NUMBER),
            Self::OneToOne | Self::FromList { .. } => None,
        }
    }

    /// Parameter map for on-device generation
    pub fn on_chip_param_map(&self) -> Option<&'static [FieldSpec]> {
        match self {
            Self::AllToAll { .. } => Some(&ALL_TO_ALL_MAP),
            Self::FixedProbability { .. } => Some(&FIXED_PROBABILITY_MAP),
            Self::FixedNumberPre { .. } | Self::FixedNumberPost { .. } => Some(&FIXED_NUMBER_MAP),
            Self::FixedTotalNumber { .. } => Some(&FIXED_TOTAL_MAP),
            Self::OneToOne | Self::FromList { .. } => None,
        }
    }

    fn on_chip_parameters(&self) -> ParameterSpace {
        let space = ParameterSpace::new(1);
        match self {
            Self::AllToAll { allow_self_connections } => {
                space.with("allow_self_connections", flag(*allow_self_connections))
            }
            Self::FixedProbability {
                p_connect,
                allow_self_connections,
            } => space
                .with("p_connect", *p_connect)
                .with("allow_self_connections", flag(*allow_self_connections)),
            Self::FixedNumberPre {
                n,
                allow_self_connections,
            }
            | Self::FixedNumberPost {
                n,
                allow_self_connections,
            } => space
                .with("n", f64::from(*n))
                .with("allow_self_connections", flag(*allow_self_connections)),
            Self::FixedTotalNumber { with_replacement, .. } => {
                space.with("with_replacement", flag(*with_replacement))
            }
            Self::OneToOne | Self::FromList { .. } => space,
        }
    }

    /// Encoded parameters for generating `window` on the device
    ///
    /// Fixed-total-number rules draw this window's share from `state`.
    ///
    /// # Errors
    ///
    /// Returns error if the rule cannot be generated on chip or a parameter
    /// does not fit its field.
    pub fn device_record(
        &self,
        projection: &str,
        window: &ConnectionWindow,
        state: Option<&mut ConsumableState>,
        rng: &mut StdRng,
        transform: TransformContext,
    ) -> Result<(u32, ParamRecords)> {
        let (Some(kind), Some(fields)) = (self.device_kind(), self.on_chip_param_map()) else {
            return Err(CompileError::invalid_connector(
                projection,
                format!("{} connectors cannot be generated on chip", self.name()),
            ));
        };
        let mut draw = WindowDraw {
            state,
            pairs: window.pairs(),
            rng: StdRng::seed_from_u64(rng.next_u64()),
        };
        let mut ctx = MapContext::new(transform, rng).with_computed(&mut draw);
        let records = apply(&self.on_chip_parameters(), fields, &mut ctx)?;
        Ok((kind, records))
    }
}

/// Computed fields of on-chip fixed-total-number generation
struct WindowDraw<'a> {
    state: Option<&'a mut ConsumableState>,
    pairs: u64,
    rng: StdRng,
}

impl ComputedFields for WindowDraw<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn compute(&mut self, name: &str, _index: usize) -> Result<f64> {
        match name {
            "num_connections" => {
                let state = self
                    .state
                    .as_deref_mut()
                    .ok_or_else(|| CompileError::config("num_connections requires connector state"))?;
                Ok(state.draw(self.pairs, &mut self.rng)? as f64)
            }
            "sub_matrix_size" => Ok(self.pairs as f64),
            _ => Err(CompileError::UnknownParameter { name: name.to_string() }),
        }
    }
}

/// Synapses per pre neuron of a list inside `window`
fn row_histogram(connections: &[ListConnection], window: &ConnectionWindow) -> BTreeMap<u32, u32> {
    let mut rows = BTreeMap::new();
    for c in connections {
        if window.pre.contains(c.pre) && window.post.contains(c.post) {
            *rows.entry(c.pre).or_insert(0) += 1;
        }
    }
    rows
}

/// `n` distinct indices in `0..size` for neuron `neuron`, skipping `exclude`
fn choose(seed: u64, neuron: u32, size: u32, n: u32, exclude: Option<u32>) -> std::result::Result<Vec<u32>, String> {
    let candidates = size - u32::from(exclude.is_some_and(|e| e < size));
    if n > candidates {
        return Err(format!("cannot choose {n} of {candidates} neurons"));
    }
    let mut rng = StdRng::seed_from_u64(mix_seed(seed, u64::from(neuron)));
    #[allow(clippy::cast_possible_truncation)]
    let chosen = rand::seq::index::sample(&mut rng, candidates as usize, n as usize)
        .iter()
        .map(|i| {
            let i = i as u32;
            match exclude {
                Some(e) if i >= e => i + 1,
                _ => i,
            }
        })
        .collect();
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(pre: u32, post: u32) -> ConnectionWindow {
        ConnectionWindow {
            pre: NeuronSlice::whole(pre),
            post: NeuronSlice::whole(post),
            pre_size: pre,
            post_size: post,
            recurrent: false,
        }
    }

    #[test]
    fn fixed_probability_estimates() {
        let connector = Connector::FixedProbability {
            p_connect: 0.1,
            allow_self_connections: true,
        };
        let w = window(100, 50);
        assert_eq!(connector.estimate_mean_row_synapses(&w), 5.0);
        let max = connector.estimate_max_row_synapses(&w);
        assert!(max > 5 && max < 50, "max = {max}");
    }

    #[test]
    fn one_to_one_depends_on_overlap() {
        let mut w = window(10, 10);
        assert_eq!(Connector::OneToOne.estimate_max_row_synapses(&w), 1);
        w.post = NeuronSlice::new(20, 30);
        w.post_size = 30;
        assert_eq!(Connector::OneToOne.estimate_max_row_synapses(&w), 0);
        assert_eq!(Connector::OneToOne.estimate_mean_row_synapses(&w), 0.0);
    }

    #[test]
    fn from_list_histogram() {
        let list = Connector::FromList {
            connections: vec![
                ListConnection { pre: 0, post: 1, weight: None, delay: None },
                ListConnection { pre: 0, post: 2, weight: Some(0.5), delay: None },
                ListConnection { pre: 1, post: 2, weight: None, delay: None },
                ListConnection { pre: 1, post: 9, weight: None, delay: None },
            ],
        };
        let mut w = window(4, 10);
        w.post = NeuronSlice::new(0, 5);
        assert_eq!(list.estimate_max_row_synapses(&w), 2);
        assert_eq!(list.estimate_mean_row_synapses(&w), 0.75);
        let built = list.build("p", &w, 0, None).unwrap();
        assert_eq!(built.len(), 3);
        assert_eq!(built[1].weight, Some(0.5));
    }

    #[test]
    fn max_never_below_mean() {
        let connectors = [
            Connector::AllToAll { allow_self_connections: true },
            Connector::FixedNumberPost { n: 30, allow_self_connections: true },
            Connector::FixedNumberPre { n: 30, allow_self_connections: true },
            Connector::FixedTotalNumber { n: 2000, with_replacement: false },
        ];
        let w = window(100, 50);
        for connector in &connectors {
            let mean = connector.estimate_mean_row_synapses(&w);
            let max = connector.estimate_max_row_synapses(&w);
            assert!(f64::from(max) >= mean, "{}: {max} < {mean}", connector.name());
        }
    }

    #[test]
    fn fixed_total_draws_conserve_total() {
        let connector = Connector::FixedTotalNumber { n: 1234, with_replacement: false };
        let mut state = connector.initial_state(100, 90).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut total = 0;
        for _pre in 0..4 {
            for _post in 0..3 {
                total += state.draw(25 * 30, &mut rng).unwrap();
            }
        }
        assert_eq!(total, 1234);
        assert_eq!(state.remaining, 0);
        assert_eq!(state.pairs, 0);
    }

    #[test]
    fn fixed_total_with_replacement_conserves_total() {
        let connector = Connector::FixedTotalNumber { n: 500, with_replacement: true };
        let mut state = connector.initial_state(10, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let total: u64 = (0..4).map(|_| state.draw(25, &mut rng).unwrap()).sum();
        assert_eq!(total, 500);
    }

    #[test]
    fn fixed_number_post_rows_are_slicing_independent() {
        let connector = Connector::FixedNumberPost { n: 5, allow_self_connections: true };
        let whole = connector.build("p", &window(3, 20), 11, None).unwrap();
        let mut sliced = Vec::new();
        for post in [NeuronSlice::new(0, 10), NeuronSlice::new(10, 20)] {
            let w = ConnectionWindow { post, ..window(3, 20) };
            sliced.extend(connector.build("p", &w, 11, None).unwrap());
        }
        let key = |c: &Connection| (c.pre, c.post);
        let mut a: Vec<_> = whole.iter().map(key).collect();
        let mut b: Vec<_> = sliced.iter().map(key).collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
        assert_eq!(a.len(), 15);
    }

    #[test]
    fn self_connections_excluded_when_recurrent() {
        let connector = Connector::AllToAll { allow_self_connections: false };
        let w = ConnectionWindow { recurrent: true, ..window(5, 5) };
        let built = connector.build("p", &w, 0, None).unwrap();
        assert_eq!(built.len(), 20);
        assert!(built.iter().all(|c| c.pre != c.post));

        let connector = Connector::FixedNumberPre { n: 4, allow_self_connections: false };
        let built = connector.build("p", &w, 0, None).unwrap();
        assert_eq!(built.len(), 20);
        assert!(built.iter().all(|c| c.pre != c.post));
    }

    #[test]
    fn validation_catches_impossible_rules() {
        assert!(Connector::FixedProbability { p_connect: 1.5, allow_self_connections: true }
            .validate("p", 10, 10)
            .is_err());
        assert!(Connector::FixedNumberPre { n: 11, allow_self_connections: true }
            .validate("p", 10, 10)
            .is_err());
        assert!(Connector::FixedTotalNumber { n: 101, with_replacement: false }
            .validate("p", 10, 10)
            .is_err());
        assert!(Connector::FixedTotalNumber { n: 101, with_replacement: true }
            .validate("p", 10, 10)
            .is_ok());
    }

    #[test]
    fn device_records() {
        let mut rng = StdRng::seed_from_u64(0);
        let ctx = TransformContext::new(1.0);
        let connector = Connector::FixedProbability { p_connect: 0.5, allow_self_connections: false };
        let (kind, records) = connector.device_record("p", &window(10, 10), None, &mut rng, ctx).unwrap();
        assert_eq!(kind, device_kind::FIXED_PROBABILITY);
        assert_eq!(records.record(0).unwrap(), &[1 << 31, 0]);

        let connector = Connector::FixedTotalNumber { n: 100, with_replacement: true };
        let mut state = connector.initial_state(10, 10).unwrap();
        let (_, records) = connector
            .device_record("p", &window(10, 10), Some(&mut state), &mut rng, ctx)
            .unwrap();
        // Whole matrix in one window: every connection lands here
        assert_eq!(records.record(0).unwrap(), &[1, 100, 100]);

        assert!(Connector::OneToOne
            .device_record("p", &window(10, 10), None, &mut rng, ctx)
            .is_err());
    }
}
