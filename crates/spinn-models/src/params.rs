//! Parameter spaces and their mapping to binary records
//!
//! A [`ParameterSpace`] holds named, per-neuron values for one population:
//! scalars (broadcast), explicit arrays, expressions over other parameters,
//! and random distributions. A parameter map is an ordered list of
//! [`FieldSpec`]s; applying it produces one fixed-size record of 32-bit
//! words per neuron, each field encoded through its [`Transform`].
//!
//! ```text
//! record i = [ field 0 | field 1 | ... | field n-1 ]   (4 bytes each)
//! ```
//!
//! A value that does not fit its field is an error, never clamped.

use crate::error::{CompileError, Result};
use crate::random::RandomDistribution;
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use spinn_chip::fixed::{from_fixed, from_s1615, from_u032, to_fixed, to_s1615, to_u032};
use std::collections::BTreeMap;
use std::ops::Range;

/// Expression nesting limit; deeper chains are treated as cyclic
const MAX_EXPR_DEPTH: usize = 16;

/// Arithmetic over other parameters of the same space
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Another parameter
    Param(String),
    /// Literal
    Const(f64),
    /// Sum
    Add(Box<Expr>, Box<Expr>),
    /// Difference
    Sub(Box<Expr>, Box<Expr>),
    /// Product
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Reference a parameter
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    /// `a + b`
    pub fn add(a: Self, b: Self) -> Self {
        Self::Add(Box::new(a), Box::new(b))
    }

    /// `a - b`
    pub fn sub(a: Self, b: Self) -> Self {
        Self::Sub(Box::new(a), Box::new(b))
    }

    /// `a * b`
    pub fn mul(a: Self, b: Self) -> Self {
        Self::Mul(Box::new(a), Box::new(b))
    }

    /// `a / b`
    pub fn div(a: Self, b: Self) -> Self {
        Self::Div(Box::new(a), Box::new(b))
    }
}

/// One parameter's values
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Same for every neuron
    Scalar(f64),
    /// One value per neuron
    Array(Vec<f64>),
    /// Derived from other parameters
    Expr(Expr),
    /// Drawn per neuron
    Random(RandomDistribution),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(values)
    }
}

impl From<Expr> for ParamValue {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

impl From<RandomDistribution> for ParamValue {
    fn from(dist: RandomDistribution) -> Self {
        Self::Random(dist)
    }
}

/// Named parameters of a population of `size` neurons
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSpace {
    size: usize,
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSpace {
    /// Empty space for `size` neurons
    pub fn new(size: usize) -> Self {
        Self {
            size,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style [`set`](Self::set)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set or replace a parameter
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Copy every parameter of `other` over this space
    pub fn update(&mut self, other: &Self) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Number of neurons
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Look up a parameter
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Whether the parameter is defined
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Evaluate a parameter for every neuron
    ///
    /// Random parameters draw `size` values from `rng`.
    ///
    /// # Errors
    ///
    /// Returns error if the parameter or one it refers to is missing, an
    /// array has the wrong length, expressions are cyclic, or a random value
    /// can only be drawn on the device.
    pub fn evaluate(&self, name: &str, rng: &mut dyn RngCore) -> Result<Vec<f64>> {
        self.evaluate_at_depth(name, rng, 0)
    }

    fn evaluate_at_depth(&self, name: &str, rng: &mut dyn RngCore, depth: usize) -> Result<Vec<f64>> {
        if depth > MAX_EXPR_DEPTH {
            return Err(CompileError::config(format!(
                "Parameter {name} is defined in terms of itself"
            )));
        }
        let value = self.values.get(name).ok_or_else(|| CompileError::UnknownParameter {
            name: name.to_string(),
        })?;
        match value {
            ParamValue::Scalar(v) => Ok(vec![*v; self.size]),
            ParamValue::Array(values) if values.len() == self.size => Ok(values.clone()),
            ParamValue::Array(values) => Err(CompileError::ShapeMismatch {
                name: name.to_string(),
                expected: self.size,
                actual: values.len(),
            }),
            ParamValue::Expr(expr) => self.evaluate_expr(expr, rng, depth + 1),
            ParamValue::Random(dist) => (0..self.size).map(|_| dist.sample(name, rng)).collect(),
        }
    }

    fn evaluate_expr(&self, expr: &Expr, rng: &mut dyn RngCore, depth: usize) -> Result<Vec<f64>> {
        let binary = |a: &Expr, b: &Expr, rng: &mut dyn RngCore, op: fn(f64, f64) -> f64| {
            let a = self.evaluate_expr(a, rng, depth)?;
            let b = self.evaluate_expr(b, rng, depth)?;
            Ok::<_, CompileError>(a.into_iter().zip(b).map(|(x, y)| op(x, y)).collect::<Vec<f64>>())
        };
        match expr {
            Expr::Param(name) => self.evaluate_at_depth(name, rng, depth),
            Expr::Const(v) => Ok(vec![*v; self.size]),
            Expr::Add(a, b) => binary(a, b, rng, |x, y| x + y),
            Expr::Sub(a, b) => binary(a, b, rng, |x, y| x - y),
            Expr::Mul(a, b) => binary(a, b, rng, |x, y| x * y),
            Expr::Div(a, b) => binary(a, b, rng, |x, y| x / y),
        }
    }
}

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    /// Unsigned 32-bit
    U32,
    /// Signed 32-bit
    I32,
}

impl BinaryType {
    /// Pack a raw integer into a word
    ///
    /// # Errors
    ///
    /// Returns error if `raw` is outside the type's range.
    #[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn encode(self, field: &str, raw: i64) -> Result<u32> {
        match self {
            Self::U32 => u32::try_from(raw)
                .map_err(|_| CompileError::unrepresentable(field, raw as f64, "outside unsigned 32-bit range")),
            Self::I32 => i32::try_from(raw)
                .map(|v| v as u32)
                .map_err(|_| CompileError::unrepresentable(field, raw as f64, "outside signed 32-bit range")),
        }
    }

    /// Unpack a word
    #[allow(clippy::cast_possible_wrap)]
    pub const fn decode(self, word: u32) -> i64 {
        match self {
            Self::U32 => word as i64,
            Self::I32 => word as i32 as i64,
        }
    }
}

/// Inputs every transform may depend on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformContext {
    /// Simulation timestep in milliseconds
    pub timestep_ms: f64,
    /// Weight fixed-point position, known once weights are ranged
    pub weight_fixed_point: Option<u32>,
}

impl TransformContext {
    /// Context without a weight fixed point
    pub const fn new(timestep_ms: f64) -> Self {
        Self {
            timestep_ms,
            weight_fixed_point: None,
        }
    }

    /// Add a weight fixed point
    #[must_use]
    pub const fn with_weight_fixed_point(mut self, fixed_point: u32) -> Self {
        self.weight_fixed_point = Some(fixed_point);
        self
    }
}

/// Encoding from a physical value to a raw integer
///
/// | Transform | Raw value |
/// |-----------|-----------|
/// | `Integer` | `round(v)` |
/// | `S1615` | `round(v * 2^15)` |
/// | `U032` | `round(v * 2^32)`, `v` in `[0, 1]` |
/// | `S1615ExpDecay` / `U032ExpDecay` | `exp(-dt / tau)` |
/// | `S1615ExpInit` | `tau / dt * (1 - exp(-dt / tau))` |
/// | `IntegerTimeDivide` | `floor(v / dt)` |
/// | `S32FixedPoint` | `round(v * 2^weight_fixed_point)` |
/// | `S1615RateIsi` | inter-spike interval in ticks, s16.15 |
/// | `U032RateExpMinusLambda` | `exp(-rate * dt / 1000)`, u0.32 |
/// | `PoissonSlowModel` | 1 when `rate * dt / 1000 <= 0.25` |
/// | `PoissonRate` | ISI for slow sources, `exp(-lambda)` otherwise |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Plain integer
    Integer,
    /// Signed 16.15 fixed point
    S1615,
    /// Unsigned 0.32 fixed point
    U032,
    /// Per-tick decay factor from a time constant, s16.15
    S1615ExpDecay,
    /// Per-tick decay factor from a time constant, u0.32
    U032ExpDecay,
    /// Initial scaling of an exponentially decaying input, s16.15
    S1615ExpInit,
    /// Duration in whole ticks
    IntegerTimeDivide,
    /// Weight-scaled fixed point
    S32FixedPoint,
    /// Poisson rate as inter-spike interval in ticks
    S1615RateIsi,
    /// Poisson rate as per-tick `exp(-lambda)`
    U032RateExpMinusLambda,
    /// Slow-source flag
    PoissonSlowModel,
    /// Rate encoded according to the slow-source flag
    PoissonRate,
}

/// Sources with at most this many expected spikes per tick use the ISI model
const SLOW_RATE_PER_TICK: f64 = 0.25;

impl Transform {
    /// Encode one value
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnrepresentableTransform`] if the result does
    /// not fit, an input is outside the transform's domain, or no weight
    /// fixed point is available for [`Transform::S32FixedPoint`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(self, field: &str, value: f64, ctx: &TransformContext) -> Result<i64> {
        let dt = ctx.timestep_ms;
        let fail = |reason: &str| CompileError::unrepresentable(field, value, reason);
        let s1615 = |v: f64| to_s1615(v).map(i64::from).ok_or_else(|| fail("outside s16.15 range"));
        let u032 = |v: f64| to_u032(v).map(i64::from).ok_or_else(|| fail("outside u0.32 range"));
        let time_constant = |tau: f64| {
            if tau > 0.0 && tau.is_finite() {
                Ok(tau)
            } else {
                Err(fail("time constant must be positive"))
            }
        };
        let rate = |r: f64| {
            if r >= 0.0 && r.is_finite() {
                Ok(r)
            } else {
                Err(fail("rate must be non-negative"))
            }
        };

        match self {
            Self::Integer => {
                if value.is_finite() {
                    Ok(value.round() as i64)
                } else {
                    Err(fail("not finite"))
                }
            }
            Self::S1615 => s1615(value),
            Self::U032 => u032(value),
            Self::S1615ExpDecay => s1615((-dt / time_constant(value)?).exp()),
            Self::U032ExpDecay => u032((-dt / time_constant(value)?).exp()),
            Self::S1615ExpInit => {
                let tau = time_constant(value)?;
                s1615(tau / dt * (1.0 - (-dt / tau).exp()))
            }
            Self::IntegerTimeDivide => {
                if value >= 0.0 && value.is_finite() {
                    Ok((value / dt).floor() as i64)
                } else {
                    Err(fail("duration must be non-negative"))
                }
            }
            Self::S32FixedPoint => {
                let position = ctx
                    .weight_fixed_point
                    .ok_or_else(|| fail("weight fixed point not yet known"))?;
                let raw = to_fixed(value, position).ok_or_else(|| fail("outside weight range"))?;
                if i32::try_from(raw).is_ok() {
                    Ok(raw)
                } else {
                    Err(fail("outside signed 32-bit weight range"))
                }
            }
            Self::S1615RateIsi => {
                let rate = rate(value)?;
                if rate == 0.0 {
                    // Silent source: longest representable interval
                    return Ok(i64::from(i32::MAX));
                }
                s1615(1000.0 / (rate * dt))
            }
            Self::U032RateExpMinusLambda => u032((-rate(value)? * dt / 1000.0).exp()),
            Self::PoissonSlowModel => Ok(i64::from(rate(value)? * dt / 1000.0 <= SLOW_RATE_PER_TICK)),
            Self::PoissonRate => {
                if Self::PoissonSlowModel.encode(field, value, ctx)? == 1 {
                    Self::S1615RateIsi.encode(field, value, ctx)
                } else {
                    Self::U032RateExpMinusLambda.encode(field, value, ctx)
                }
            }
        }
    }

    /// Recover the physical value, when the transform is invertible
    ///
    /// Duration transforms recover whole ticks only.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn decode(self, raw: i64, ctx: &TransformContext) -> Option<f64> {
        match self {
            Self::Integer => Some(raw as f64),
            Self::S1615 => i32::try_from(raw).ok().map(from_s1615),
            Self::U032 => u32::try_from(raw).ok().map(from_u032),
            Self::IntegerTimeDivide => Some(raw as f64 * ctx.timestep_ms),
            Self::S32FixedPoint => ctx.weight_fixed_point.map(|fp| from_fixed(raw, fp)),
            _ => None,
        }
    }
}

/// Where a field's value comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSource {
    /// Named parameter of the space
    Param(&'static str),
    /// Fixed value
    Constant(f64),
    /// Value supplied by a [`ComputedFields`] implementation
    Computed(&'static str),
}

/// One field of a parameter map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Value source
    pub source: FieldSource,
    /// Storage type
    pub ty: BinaryType,
    /// Encoding
    pub transform: Transform,
}

impl FieldSpec {
    /// Field read from a parameter
    pub const fn param(name: &'static str, ty: BinaryType, transform: Transform) -> Self {
        Self {
            source: FieldSource::Param(name),
            ty,
            transform,
        }
    }

    /// Field with a fixed integer value
    pub const fn constant(value: f64, ty: BinaryType) -> Self {
        Self {
            source: FieldSource::Constant(value),
            ty,
            transform: Transform::Integer,
        }
    }

    /// Field computed from the wider context
    pub const fn computed(name: &'static str, ty: BinaryType) -> Self {
        Self {
            source: FieldSource::Computed(name),
            ty,
            transform: Transform::Integer,
        }
    }

    /// Name for diagnostics
    pub const fn name(&self) -> &'static str {
        match self.source {
            FieldSource::Param(name) | FieldSource::Computed(name) => name,
            FieldSource::Constant(_) => "constant",
        }
    }
}

/// Provider of computed field values
pub trait ComputedFields {
    /// Value of computed field `name` for record `index`
    ///
    /// # Errors
    ///
    /// Returns error if the field is unknown or cannot be computed.
    fn compute(&mut self, name: &str, index: usize) -> Result<f64>;
}

/// Everything a parameter map may need besides the parameters themselves
pub struct MapContext<'a> {
    /// Transform inputs
    pub transform: TransformContext,
    /// Generator for host-drawn random parameters
    pub rng: &'a mut dyn RngCore,
    /// Provider for computed fields
    pub computed: Option<&'a mut dyn ComputedFields>,
}

impl<'a> MapContext<'a> {
    /// Context without computed fields
    pub fn new(transform: TransformContext, rng: &'a mut dyn RngCore) -> Self {
        Self {
            transform,
            rng,
            computed: None,
        }
    }

    /// Add a computed field provider
    #[must_use]
    pub fn with_computed(mut self, computed: &'a mut dyn ComputedFields) -> Self {
        self.computed = Some(computed);
        self
    }
}

/// Encoded records, one per neuron
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamRecords {
    fields: usize,
    words: Vec<u32>,
}

/// Bytes taken by `count` records of `fields`
pub const fn size_of(fields: &[FieldSpec], count: usize) -> usize {
    fields.len() * 4 * count
}

/// Apply a parameter map to every neuron of `space`
///
/// # Errors
///
/// Returns the first evaluation or encoding error.
pub fn apply(space: &ParameterSpace, fields: &[FieldSpec], ctx: &mut MapContext<'_>) -> Result<ParamRecords> {
    let size = space.size();
    let mut columns = Vec::with_capacity(fields.len());
    for field in fields {
        let values = match field.source {
            FieldSource::Param(name) => space.evaluate(name, ctx.rng)?,
            FieldSource::Constant(value) => vec![value; size],
            FieldSource::Computed(name) => {
                let computed = ctx.computed.as_deref_mut().ok_or_else(|| {
                    CompileError::config(format!("No provider for computed field {name}"))
                })?;
                (0..size)
                    .map(|i| computed.compute(name, i))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        columns.push(values);
    }

    let mut words = Vec::with_capacity(fields.len() * size);
    for i in 0..size {
        for (field, column) in fields.iter().zip(&columns) {
            let raw = field.transform.encode(field.name(), column[i], &ctx.transform)?;
            words.push(field.ty.encode(field.name(), raw)?);
        }
    }
    Ok(ParamRecords {
        fields: fields.len(),
        words,
    })
}

impl ParamRecords {
    /// Number of records
    pub fn len(&self) -> usize {
        self.words.len().checked_div(self.fields).unwrap_or(0)
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words per record
    pub const fn fields(&self) -> usize {
        self.fields
    }

    /// Record `index`
    pub fn record(&self, index: usize) -> Option<&[u32]> {
        self.words.get(index * self.fields..(index + 1) * self.fields)
    }

    /// Bytes taken by `records`
    pub fn size_of(&self, records: &Range<usize>) -> usize {
        records.len() * self.fields * 4
    }

    /// Write `records` as little-endian words
    pub fn write_slice(&self, records: &Range<usize>, buf: &mut impl BufMut) {
        let words = &self.words[records.start * self.fields..records.end * self.fields];
        for word in words {
            buf.put_u32_le(*word);
        }
    }

    /// All records as bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.words.len() * 4);
        self.write_slice(&(0..self.len()), &mut buf);
        buf.freeze()
    }

    /// Decode every field of every record; `None` where not invertible
    pub fn decode(&self, fields: &[FieldSpec], ctx: &TransformContext) -> Vec<Vec<Option<f64>>> {
        (0..self.len())
            .filter_map(|i| self.record(i))
            .map(|record| {
                fields
                    .iter()
                    .zip(record)
                    .map(|(field, word)| field.transform.decode(field.ty.decode(*word), ctx))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn scalars_broadcast_and_arrays_check_length() {
        let space = ParameterSpace::new(3).with("a", 2.0).with("b", vec![1.0, 2.0]);
        assert_eq!(space.evaluate("a", &mut rng()).unwrap(), vec![2.0; 3]);
        assert!(matches!(
            space.evaluate("b", &mut rng()),
            Err(CompileError::ShapeMismatch { expected: 3, actual: 2, .. })
        ));
        assert!(matches!(
            space.evaluate("c", &mut rng()),
            Err(CompileError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn expressions_follow_references() {
        let space = ParameterSpace::new(2)
            .with("tau_m", vec![10.0, 20.0])
            .with("cm", 0.5)
            .with("r", Expr::div(Expr::param("tau_m"), Expr::param("cm")));
        assert_eq!(space.evaluate("r", &mut rng()).unwrap(), vec![20.0, 40.0]);
    }

    #[test]
    fn cyclic_expression_is_an_error() {
        let space = ParameterSpace::new(1)
            .with("a", Expr::param("b"))
            .with("b", Expr::param("a"));
        assert!(space.evaluate("a", &mut rng()).is_err());
    }

    #[test]
    fn native_random_parameter_is_device_only() {
        let space = ParameterSpace::new(2).with(
            "v",
            RandomDistribution::native(Distribution::Uniform { low: 0.0, high: 1.0 }),
        );
        assert!(matches!(
            space.evaluate("v", &mut rng()),
            Err(CompileError::DeviceOnlyValue { .. })
        ));
    }

    #[test]
    fn s1615_round_trip_within_half_ulp() {
        let ctx = TransformContext::new(1.0);
        for value in [-65.0, 0.1, 1.0 / 3.0, 12_345.678] {
            let raw = Transform::S1615.encode("v", value, &ctx).unwrap();
            let back = Transform::S1615.decode(raw, &ctx).unwrap();
            assert!((back - value).abs() <= 0.5 / 32768.0, "{value} -> {back}");
        }
    }

    #[test]
    fn decay_transforms() {
        let ctx = TransformContext::new(1.0);
        let raw = Transform::S1615ExpDecay.encode("tau", 20.0, &ctx).unwrap();
        assert_eq!(raw, ((-1.0f64 / 20.0).exp() * 32768.0).round() as i64);
        assert!(Transform::U032ExpDecay.encode("tau", 0.0, &ctx).is_err());
        let init = Transform::S1615ExpInit.encode("tau", 5.0, &ctx).unwrap();
        assert_eq!(init, ((5.0 * (1.0 - (-0.2f64).exp())) * 32768.0).round() as i64);
    }

    #[test]
    fn time_divide_floors() {
        let ctx = TransformContext::new(0.1);
        assert_eq!(Transform::IntegerTimeDivide.encode("t", 2.05, &ctx).unwrap(), 20);
        assert!(Transform::IntegerTimeDivide.encode("t", -1.0, &ctx).is_err());
    }

    #[test]
    fn poisson_rate_switches_model() {
        let ctx = TransformContext::new(1.0);
        // 10 Hz: 0.01 spikes per tick, slow
        assert_eq!(Transform::PoissonSlowModel.encode("rate", 10.0, &ctx).unwrap(), 1);
        assert_eq!(
            Transform::PoissonRate.encode("rate", 10.0, &ctx).unwrap(),
            i64::from(to_s1615(100.0).unwrap())
        );
        // 500 Hz: 0.5 spikes per tick, fast
        assert_eq!(Transform::PoissonSlowModel.encode("rate", 500.0, &ctx).unwrap(), 0);
        assert_eq!(
            Transform::PoissonRate.encode("rate", 500.0, &ctx).unwrap(),
            i64::from(to_u032((-0.5f64).exp()).unwrap())
        );
        assert_eq!(
            Transform::S1615RateIsi.encode("rate", 0.0, &ctx).unwrap(),
            i64::from(i32::MAX)
        );
        assert!(Transform::PoissonRate.encode("rate", -1.0, &ctx).is_err());
    }

    #[test]
    fn fixed_point_requires_weight_position() {
        let ctx = TransformContext::new(1.0);
        assert!(Transform::S32FixedPoint.encode("w", 1.0, &ctx).is_err());
        let ctx = ctx.with_weight_fixed_point(13);
        assert_eq!(Transform::S32FixedPoint.encode("w", 1.0, &ctx).unwrap(), 8192);
    }

    #[test]
    fn binary_type_range_checks() {
        assert!(BinaryType::U32.encode("x", -1).is_err());
        assert!(BinaryType::I32.encode("x", i64::from(i32::MAX) + 1).is_err());
        assert_eq!(BinaryType::I32.encode("x", -1).unwrap(), u32::MAX);
        assert_eq!(BinaryType::I32.decode(u32::MAX), -1);
    }

    struct Counter;

    impl ComputedFields for Counter {
        fn compute(&mut self, _name: &str, index: usize) -> Result<f64> {
            Ok(index as f64 * 10.0)
        }
    }

    #[test]
    fn apply_interleaves_fields_per_record() {
        let space = ParameterSpace::new(2).with("v", vec![1.0, -1.0]);
        let fields = [
            FieldSpec::param("v", BinaryType::I32, Transform::S1615),
            FieldSpec::constant(7.0, BinaryType::U32),
            FieldSpec::computed("n", BinaryType::U32),
        ];
        let mut rng = rng();
        let mut counter = Counter;
        let mut ctx = MapContext::new(TransformContext::new(1.0), &mut rng).with_computed(&mut counter);
        let records = apply(&space, &fields, &mut ctx).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records.record(0).unwrap(), &[32768, 7, 0]);
        assert_eq!(records.record(1).unwrap(), &[(-32768i32) as u32, 7, 10]);
        assert_eq!(records.size_of(&(0..2)), size_of(&fields, 2));
        assert_eq!(records.to_bytes().len(), size_of(&fields, 2));

        let decoded = records.decode(&fields, &TransformContext::new(1.0));
        assert_eq!(decoded[1][0], Some(-1.0));
        assert_eq!(decoded[1][2], Some(10.0));
    }

    #[test]
    fn computed_field_without_provider_fails() {
        let space = ParameterSpace::new(1);
        let mut rng = rng();
        let mut ctx = MapContext::new(TransformContext::new(1.0), &mut rng);
        assert!(apply(&space, &[FieldSpec::computed("n", BinaryType::U32)], &mut ctx).is_err());
    }
}
