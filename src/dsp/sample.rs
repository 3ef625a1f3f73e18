//! Numeric trait shared by every buffer-processing component.

use core::fmt::Debug;
use core::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// An audio sample type.
///
/// The engine is written once against this trait and instantiated for the
/// precision the host asks for (`Harmonizer<f32>` or `Harmonizer<f64>`).
/// Control-rate values (frequencies, gains, envelope levels) stay `f32` and
/// are converted with [`Sample::from_f32`] at the point where they touch audio.
pub trait Sample:
    Copy
    + Default
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f32(value: f32) -> Self;
    fn from_f64(value: f64) -> Self;
    fn to_f32(self) -> f32;
    fn to_f64(self) -> f64;

    #[inline]
    fn abs(self) -> Self {
        if self < Self::ZERO {
            -self
        } else {
            self
        }
    }

    #[inline]
    fn is_positive(self) -> bool {
        self > Self::ZERO
    }
}

macro_rules! impl_sample {
    ($ty:ty) => {
        impl Sample for $ty {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn from_f32(value: f32) -> Self {
                value as $ty
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_sample!(f32);
impl_sample!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    fn negate_all<S: Sample>(values: &mut [S]) {
        for v in values.iter_mut() {
            *v = -*v;
        }
    }

    #[test]
    fn generic_code_runs_in_both_precisions() {
        let mut single = [0.5f32, -0.25];
        let mut double = [0.5f64, -0.25];
        negate_all(&mut single);
        negate_all(&mut double);
        assert_eq!(single, [-0.5, 0.25]);
        assert_eq!(double, [-0.5, 0.25]);
    }

    #[test]
    fn abs_and_sign() {
        assert_eq!((-2.0f32).abs(), 2.0);
        assert!(Sample::is_positive(0.1f64));
        assert!(!Sample::is_positive(0.0f64));
    }
}
