//! HyperLogLog sketch surface consumed by the harness
//!
//! Thin wrapper over `cardinality-estimator` exposing exactly the operations
//! the sweeps need: `empty`, `add`, `merge`, `estimate`, `serialized_size`
//! and `hash`. The estimator's precision is a const generic, so the
//! configurations the harness sweeps are dispatched through an enum.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};

use cardinality_estimator::estimator::CardinalityEstimator;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Register width (bits) shared by every configuration.
pub const REGISTER_WIDTH: usize = 6;

type Estimator<const P: usize> = CardinalityEstimator<u64, DefaultHasher, P, REGISTER_WIDTH>;

/// Sketch precision (log2 of the register count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Precision {
    /// 2^10 registers
    P10,
    /// 2^12 registers
    P12,
    /// 2^14 registers
    P14,
    /// 2^16 registers
    P16,
}

impl Precision {
    /// Every supported precision, ascending.
    pub const ALL: [Self; 4] = [Self::P10, Self::P12, Self::P14, Self::P16];

    /// Numeric precision value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::P10 => 10,
            Self::P12 => 12,
            Self::P14 => 14,
            Self::P16 => 16,
        }
    }

    /// Label used in exported tables (`hll_type` column).
    #[must_use]
    pub fn type_label(self) -> String {
        format!("hll({},{REGISTER_WIDTH})", self.bits())
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl From<Precision> for u8 {
    fn from(precision: Precision) -> Self {
        precision.bits()
    }
}

impl TryFrom<u8> for Precision {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.bits() == bits)
            .ok_or_else(|| {
                Error::Config(format!("unsupported precision {bits} (use 10, 12, 14 or 16)"))
            })
    }
}

impl TryFrom<i64> for Precision {
    type Error = Error;

    fn try_from(bits: i64) -> Result<Self> {
        let bits = u8::try_from(bits)
            .map_err(|_| Error::Config(format!("unsupported precision {bits}")))?;
        Self::try_from(bits)
    }
}

/// A 64-bit hash ready to be added to a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashedItem(u64);

impl HashedItem {
    /// Raw hash value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Hash functions compared by the hashing-overhead sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    /// SipHash-1-3 with fixed zero keys (the sketch hash)
    SipHash,
    /// FxHash (fast, low quality)
    FxHash,
}

impl HashFunction {
    /// Every hash function, in sweep order.
    pub const ALL: [Self; 2] = [Self::SipHash, Self::FxHash];

    /// Lower-case name used in test names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SipHash => "siphash",
            Self::FxHash => "fxhash",
        }
    }

    /// Hash a stored value.
    #[must_use]
    pub fn hash(self, value: i64) -> HashedItem {
        match self {
            Self::SipHash => hash(value),
            Self::FxHash => {
                let mut hasher = FxHasher::default();
                value.hash(&mut hasher);
                HashedItem(hasher.finish())
            }
        }
    }
}

/// Hash a stored value with the sketch hash.
///
/// Deterministic across runs and processes (fixed keys), so estimates for
/// the same dataset are reproducible.
#[must_use]
pub fn hash(value: i64) -> HashedItem {
    HashedItem(BuildHasherDefault::<DefaultHasher>::default().hash_one(value))
}

#[derive(Clone)]
enum Inner {
    P10(Estimator<10>),
    P12(Estimator<12>),
    P14(Estimator<14>),
    P16(Estimator<16>),
}

/// A HyperLogLog sketch of fixed precision.
#[derive(Clone)]
pub struct Sketch {
    inner: Inner,
}

impl std::fmt::Debug for Sketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sketch")
            .field("precision", &self.precision())
            .field("estimate", &self.estimate())
            .finish()
    }
}

impl Sketch {
    /// Create an empty sketch.
    #[must_use]
    pub fn empty(precision: Precision) -> Self {
        let inner = match precision {
            Precision::P10 => Inner::P10(Estimator::<10>::new()),
            Precision::P12 => Inner::P12(Estimator::<12>::new()),
            Precision::P14 => Inner::P14(Estimator::<14>::new()),
            Precision::P16 => Inner::P16(Estimator::<16>::new()),
        };
        Self { inner }
    }

    /// Build a sketch from stored values.
    #[must_use]
    pub fn from_values<I: IntoIterator<Item = i64>>(precision: Precision, values: I) -> Self {
        let mut sketch = Self::empty(precision);
        for value in values {
            sketch.add(hash(value));
        }
        sketch
    }

    /// Precision this sketch was created with.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        match self.inner {
            Inner::P10(_) => Precision::P10,
            Inner::P12(_) => Precision::P12,
            Inner::P14(_) => Precision::P14,
            Inner::P16(_) => Precision::P16,
        }
    }

    /// Add a hashed item.
    pub fn add(&mut self, item: HashedItem) {
        match &mut self.inner {
            Inner::P10(e) => e.insert_hash(item.0),
            Inner::P12(e) => e.insert_hash(item.0),
            Inner::P14(e) => e.insert_hash(item.0),
            Inner::P16(e) => e.insert_hash(item.0),
        }
    }

    /// Merge `other` into this sketch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrecisionMismatch`] if the precisions differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        match (&mut self.inner, &other.inner) {
            (Inner::P10(a), Inner::P10(b)) => a.merge(b),
            (Inner::P12(a), Inner::P12(b)) => a.merge(b),
            (Inner::P14(a), Inner::P14(b)) => a.merge(b),
            (Inner::P16(a), Inner::P16(b)) => a.merge(b),
            _ => {
                return Err(Error::PrecisionMismatch {
                    left: self.precision(),
                    right: other.precision(),
                })
            }
        }
        Ok(())
    }

    /// Estimated number of distinct items added.
    #[must_use]
    pub fn estimate(&self) -> u64 {
        let estimate = match &self.inner {
            Inner::P10(e) => e.estimate(),
            Inner::P12(e) => e.estimate(),
            Inner::P14(e) => e.estimate(),
            Inner::P16(e) => e.estimate(),
        };
        estimate as u64
    }

    /// Size of the sketch representation in bytes.
    #[must_use]
    pub fn serialized_size(&self) -> u64 {
        let size = match &self.inner {
            Inner::P10(e) => e.size_of(),
            Inner::P12(e) => e.size_of(),
            Inner::P14(e) => e.size_of(),
            Inner::P16(e) => e.size_of(),
        };
        size as u64
    }
}

/// Per-day sketches of one precision, built once during setup and shared
/// read-only by union trials and union-under-load workers.
#[derive(Debug, Clone)]
pub struct SketchRollup {
    precision: Precision,
    days: BTreeMap<i64, Sketch>,
}

impl SketchRollup {
    /// Create an empty roll-up.
    #[must_use]
    pub const fn new(precision: Precision) -> Self {
        Self {
            precision,
            days: BTreeMap::new(),
        }
    }

    /// Roll-up precision.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.precision
    }

    /// Number of days with a sketch.
    #[must_use]
    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Most recent day present.
    #[must_use]
    pub fn last_day(&self) -> Option<i64> {
        self.days.keys().next_back().copied()
    }

    /// Add one stored value to the sketch of `day`.
    pub fn add(&mut self, day: i64, value: i64) {
        let precision = self.precision;
        self.days
            .entry(day)
            .or_insert_with(|| Sketch::empty(precision))
            .add(hash(value));
    }

    /// Merge the sketches of the last `num_days` days.
    ///
    /// Returns the merged sketch and the summed size of the daily sketches
    /// that were merged.
    ///
    /// # Errors
    ///
    /// Propagates [`Sketch::merge`] failures.
    pub fn union_last(&self, num_days: usize) -> Result<(Sketch, u64)> {
        let mut merged = Sketch::empty(self.precision);
        let mut total_bytes = 0;
        for sketch in self.days.values().rev().take(num_days) {
            merged.merge(sketch)?;
            total_bytes += sketch.serialized_size();
        }
        Ok((merged, total_bytes))
    }
}
