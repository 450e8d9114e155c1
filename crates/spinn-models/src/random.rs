//! Random distributions for parameters, weights and delays
//!
//! A distribution is either drawn on the host with a seeded generator or,
//! when marked `native`, left for the device to draw. The device generator
//! implements only uniform and integer-uniform draws.

use crate::error::{CompileError, Result};
use crate::params::{BinaryType, FieldSpec, ParameterSpace, Transform};
use rand::{Rng, RngCore};
use rand_distr::{Distribution as _, Exp, Normal};
use serde::Deserialize;

/// Width (in standard deviations) used to bound unbounded distributions
const TAIL_SIGMAS: f64 = 5.0;

/// Device generator tag for a constant
pub const DEVICE_CONSTANT: u32 = 0;
/// Device generator tag for a uniform draw
pub const DEVICE_UNIFORM: u32 = 1;
/// Device generator tag for an integer-uniform draw
pub const DEVICE_UNIFORM_INT: u32 = 2;

/// Supported distributions
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum Distribution {
    /// Continuous uniform on `[low, high)`
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// Integers uniform on `[low, high]`
    UniformInt {
        /// Lower bound
        low: i64,
        /// Upper bound (inclusive)
        high: i64,
    },
    /// Gaussian
    Normal {
        /// Mean
        mu: f64,
        /// Standard deviation
        sigma: f64,
    },
    /// Exponential with mean `beta`
    Exponential {
        /// Mean
        beta: f64,
    },
}

/// A distribution plus the generator that draws it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RandomDistribution {
    /// What to draw
    #[serde(flatten)]
    pub distribution: Distribution,
    /// Draw on the device instead of the host
    #[serde(default)]
    pub native: bool,
}

impl RandomDistribution {
    /// Host-drawn distribution
    pub const fn host(distribution: Distribution) -> Self {
        Self {
            distribution,
            native: false,
        }
    }

    /// Device-drawn distribution
    pub const fn native(distribution: Distribution) -> Self {
        Self {
            distribution,
            native: true,
        }
    }

    /// Distribution name as written in descriptions
    pub const fn name(&self) -> &'static str {
        match self.distribution {
            Distribution::Uniform { .. } => "uniform",
            Distribution::UniformInt { .. } => "uniform_int",
            Distribution::Normal { .. } => "normal",
            Distribution::Exponential { .. } => "exponential",
        }
    }

    /// Whether the device generator can draw this distribution
    pub const fn device_supported(&self) -> bool {
        matches!(
            self.distribution,
            Distribution::Uniform { .. } | Distribution::UniformInt { .. }
        )
    }

    /// Check distribution parameters
    ///
    /// # Errors
    ///
    /// Returns error for empty ranges or non-positive scales.
    pub fn validate(&self) -> Result<()> {
        let ok = match self.distribution {
            Distribution::Uniform { low, high } => low <= high,
            Distribution::UniformInt { low, high } => low <= high,
            Distribution::Normal { sigma, .. } => sigma >= 0.0,
            Distribution::Exponential { beta } => beta > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(CompileError::config(format!(
                "Invalid {} distribution: {:?}",
                self.name(),
                self.distribution
            )))
        }
    }

    /// Draw one value on the host
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::DeviceOnlyValue`] for native distributions and
    /// a configuration error for invalid parameters.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&self, name: &str, rng: &mut dyn RngCore) -> Result<f64> {
        if self.native {
            return Err(CompileError::DeviceOnlyValue {
                name: name.to_string(),
            });
        }
        self.validate()?;
        let value = match self.distribution {
            Distribution::Uniform { low, high } if low < high => rng.gen_range(low..high),
            Distribution::Uniform { low, .. } => low,
            Distribution::UniformInt { low, high } => rng.gen_range(low..=high) as f64,
            Distribution::Normal { mu, sigma } => Normal::new(mu, sigma)
                .map_err(|e| CompileError::config(format!("{name}: {e}")))?
                .sample(rng),
            Distribution::Exponential { beta } => Exp::new(1.0 / beta)
                .map_err(|e| CompileError::config(format!("{name}: {e}")))?
                .sample(rng),
        };
        Ok(value)
    }

    /// Lower and upper bounds used for estimates
    ///
    /// Unbounded distributions are cut at five standard deviations.
    ///
    /// # Errors
    ///
    /// Native distributions the device cannot draw are unsupported.
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Result<(f64, f64)> {
        if self.native && !self.device_supported() {
            return Err(CompileError::UnsupportedDistribution {
                distribution: self.name().to_string(),
            });
        }
        Ok(match self.distribution {
            Distribution::Uniform { low, high } => (low, high),
            Distribution::UniformInt { low, high } => (low as f64, high as f64),
            Distribution::Normal { mu, sigma } => (mu - TAIL_SIGMAS * sigma, mu + TAIL_SIGMAS * sigma),
            Distribution::Exponential { beta } => (0.0, beta * TAIL_SIGMAS),
        })
    }
}

/// Value of a per-synapse property: a constant or a distribution
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SynapseParam {
    /// Same value for every synapse
    Constant(f64),
    /// Drawn per synapse
    Random(RandomDistribution),
}

impl From<f64> for SynapseParam {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<RandomDistribution> for SynapseParam {
    fn from(value: RandomDistribution) -> Self {
        Self::Random(value)
    }
}

impl SynapseParam {
    /// Draw one value on the host
    ///
    /// # Errors
    ///
    /// See [`RandomDistribution::sample`].
    pub fn sample(&self, name: &str, rng: &mut dyn RngCore) -> Result<f64> {
        match self {
            Self::Constant(value) => Ok(*value),
            Self::Random(dist) => dist.sample(name, rng),
        }
    }

    /// Lower and upper bounds
    ///
    /// # Errors
    ///
    /// See [`RandomDistribution::bounds`].
    pub fn bounds(&self) -> Result<(f64, f64)> {
        match self {
            Self::Constant(value) => Ok((*value, *value)),
            Self::Random(dist) => dist.bounds(),
        }
    }

    /// Whether the value must be drawn on the device
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Random(RandomDistribution { native: true, .. }))
    }

    /// Whether the device can produce this value itself
    pub const fn device_generatable(&self) -> bool {
        match self {
            Self::Constant(_) => true,
            Self::Random(dist) => dist.native && dist.device_supported(),
        }
    }

    /// Generator tag, parameters and field layout for on-device generation
    ///
    /// `transform` converts each parameter into its device encoding.
    ///
    /// # Errors
    ///
    /// Host-side and unsupported distributions cannot be generated on device.
    pub fn device_parameters(&self, transform: Transform) -> Result<(u32, ParameterSpace, Vec<FieldSpec>)> {
        let dist = match self {
            Self::Constant(value) => {
                return Ok((
                    DEVICE_CONSTANT,
                    ParameterSpace::new(1).with("value", *value),
                    vec![FieldSpec::param("value", BinaryType::I32, transform)],
                ));
            }
            Self::Random(dist) => dist,
        };
        if !dist.native || !dist.device_supported() {
            return Err(CompileError::UnsupportedDistribution {
                distribution: dist.name().to_string(),
            });
        }
        let (low, high) = dist.bounds()?;
        let kind = match dist.distribution {
            Distribution::UniformInt { .. } => DEVICE_UNIFORM_INT,
            _ => DEVICE_UNIFORM,
        };
        Ok((
            kind,
            ParameterSpace::new(1).with("low", low).with("high", high),
            vec![
                FieldSpec::param("low", BinaryType::I32, transform),
                FieldSpec::param("high", BinaryType::I32, transform),
            ],
        ))
    }
}

/// Derive an independent seed for sub-stream `stream` of `seed`
pub const fn mix_seed(seed: u64, stream: u64) -> u64 {
    // splitmix64 finaliser
    let mut z = seed.wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
