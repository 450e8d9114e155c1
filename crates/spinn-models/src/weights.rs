//! Weight range tracking and fixed-point selection
//!
//! Synaptic weights are stored as 16-bit integers (15 bits plus sign for
//! signed models). One fixed-point position is chosen per post-synaptic
//! slice so that its largest absolute weight keeps its most significant bit;
//! small weights lose low-order bits when the dynamic range is too wide.

use tracing::warn;

/// Running min/max of absolute weight magnitudes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightRange {
    signed: bool,
    min: f64,
    max: f64,
}

impl WeightRange {
    /// Empty range for a signed or unsigned weight representation
    pub const fn new(signed: bool) -> Self {
        Self {
            signed,
            min: f64::INFINITY,
            max: 0.0,
        }
    }

    /// Fold in one weight (sign ignored)
    pub fn update(&mut self, weight: f64) {
        let magnitude = weight.abs();
        self.min = self.min.min(magnitude);
        self.max = self.max.max(magnitude);
    }

    /// Fold in many weights
    pub fn update_iter(&mut self, weights: impl IntoIterator<Item = f64>) {
        for weight in weights {
            self.update(weight);
        }
    }

    /// Combine with another range
    pub fn merge(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Smallest magnitude seen, `None` before any update
    pub fn min(&self) -> Option<f64> {
        self.min.is_finite().then_some(self.min)
    }

    /// Largest magnitude seen
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Number of value bits in a stored weight
    pub const fn value_bits(&self) -> i32 {
        if self.signed {
            15
        } else {
            16
        }
    }

    /// Whether the smallest non-zero weight falls below the resolution
    /// available once the largest weight is represented
    pub fn has_precision_loss(&self) -> bool {
        match self.min() {
            Some(min) if min > 0.0 && self.max > 0.0 => {
                msb(self.max) - msb(min) >= self.value_bits()
            }
            _ => false,
        }
    }

    /// Fractional bits of the weight fixed-point format
    ///
    /// `min(bits + 14, bits - msb(max))`, where `bits` is the number of value
    /// bits and `msb(max) = floor(log2(max)) + 1`. Zero weights do not
    /// constrain the result.
    #[allow(clippy::cast_sign_loss)]
    pub fn fixed_point(&self) -> u32 {
        let bits = self.value_bits();
        if self.has_precision_loss() {
            warn!(
                "Weights between {} and {} cannot all be represented in {} bits; small weights lose precision",
                self.min, self.max, bits
            );
        }
        let position = if self.max > 0.0 {
            (bits + 14).min(bits - msb(self.max))
        } else {
            bits + 14
        };
        if position < 0 {
            warn!("Weight {} exceeds the representable range; saturating fixed point at 0", self.max);
            return 0;
        }
        position as u32
    }
}

#[allow(clippy::cast_possible_truncation)]
fn msb(value: f64) -> i32 {
    value.log2().floor() as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_half_to_four() {
        let mut range = WeightRange::new(false);
        range.update_iter([0.5, 4.0]);
        // msb(4.0) = 3, so 16 - 3
        assert_eq!(range.fixed_point(), 13);
        assert!(!range.has_precision_loss());
    }

    #[test]
    fn signed_uses_fifteen_bits() {
        let mut range = WeightRange::new(true);
        range.update(-4.0);
        assert_eq!(range.fixed_point(), 12);
    }

    #[test]
    fn tiny_max_caps_at_bits_plus_fourteen() {
        let mut range = WeightRange::new(false);
        range.update(1e-9);
        assert_eq!(range.fixed_point(), 30);
    }

    #[test]
    fn empty_and_zero_ranges() {
        let mut range = WeightRange::new(false);
        assert_eq!(range.min(), None);
        assert_eq!(range.fixed_point(), 30);
        range.update(0.0);
        assert!(!range.has_precision_loss());
        assert_eq!(range.fixed_point(), 30);
    }

    #[test]
    fn wide_range_flags_precision_loss() {
        let mut range = WeightRange::new(false);
        range.update_iter([1e-6, 100.0]);
        assert!(range.has_precision_loss());
        assert_eq!(range.fixed_point(), 9);
    }

    #[test]
    fn order_and_merge_do_not_matter() {
        let weights = [0.25, 3.0, 0.01, 7.5, 1.0];
        let mut forward = WeightRange::new(false);
        forward.update_iter(weights);
        let mut backward = WeightRange::new(false);
        backward.update_iter(weights.iter().rev().copied());
        assert_eq!(forward, backward);

        let mut left = WeightRange::new(false);
        left.update_iter(weights[..2].iter().copied());
        let mut right = WeightRange::new(false);
        right.update_iter(weights[2..].iter().copied());
        left.merge(&right);
        assert_eq!(left, forward);
    }

    #[test]
    fn huge_weight_saturates() {
        let mut range = WeightRange::new(false);
        range.update(1e6);
        assert_eq!(range.fixed_point(), 0);
    }
}
