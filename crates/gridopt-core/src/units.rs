//! Unit newtypes for the quantities the DC network model carries.
//!
//! Power quantities are stored in physical units (MW, MVA) on the network and
//! converted to per-unit on the system base when a [`crate::problem::Problem`]
//! is built. Keeping the two apart in the type system stops a per-unit value
//! from being written back into a megawatt field by accident.
//!
//! ```
//! use gridopt_core::units::{Megawatts, Radians};
//!
//! let p = Megawatts(50.0) + Megawatts(25.0);
//! assert_eq!(p.to_per_unit(100.0), 0.75);
//! assert_eq!(Megawatts::from_per_unit(0.75, 100.0), p);
//!
//! let theta = Radians(std::f64::consts::PI);
//! assert!((theta.to_degrees() - 180.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// Value on the system base (`value / base_mva`).
            #[inline]
            pub fn to_per_unit(self, base_mva: f64) -> f64 {
                self.0 / base_mva
            }

            /// Inverse of [`Self::to_per_unit`].
            #[inline]
            pub fn from_per_unit(pu: f64, base_mva: f64) -> Self {
                Self(pu * base_mva)
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Apparent power in megavolt-amperes (MVA). Used for branch thermal ratings,
/// which the DC model applies directly to active power flow.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl Add for Radians {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Radians {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl std::fmt::Display for Radians {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} rad", self.0)
    }
}

impl Radians {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn to_degrees(self) -> f64 {
        self.0.to_degrees()
    }
}
