//! Scalar types accepted by the engine.
//!
//! Factorizations are Hermitian (`A = Uᴴ U`), so every scalar needs a
//! conjugate and a real part. Real types conjugate to themselves. The dense
//! kernels run on faer, hence the `ComplexField` bound.

use std::fmt::Debug;
use std::ops::{AddAssign, DivAssign, MulAssign, Neg, SubAssign};

use faer::traits::ComplexField;
use num_complex::Complex;
use num_traits::{Float, Num, NumCast, ToPrimitive};

/// Field element usable in the dense kernels.
pub trait Scalar:
    ComplexField
    + Num
    + Copy
    + Debug
    + Send
    + Sync
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + 'static
{
    /// Real type of moduli and real parts.
    type Magnitude: Float + Debug + Send + Sync + 'static;

    /// Complex conjugate.
    fn conj(self) -> Self;

    /// Real part.
    fn re(self) -> Self::Magnitude;

    /// Modulus.
    fn modulus(self) -> Self::Magnitude;

    /// Embed a real value.
    fn from_real(re: Self::Magnitude) -> Self;

    /// Build from real and imaginary parts; the imaginary part is dropped for
    /// real scalars.
    fn from_parts(re: Self::Magnitude, im: Self::Magnitude) -> Self;

    /// Whether the type carries an imaginary part.
    fn is_complex() -> bool;

    /// Machine epsilon of the real type.
    fn epsilon() -> Self::Magnitude {
        <Self::Magnitude as Float>::epsilon()
    }

    /// Convert an `f64` to the real type.
    fn real_from_f64(x: f64) -> Self::Magnitude {
        <Self::Magnitude as NumCast>::from(x).unwrap_or_else(<Self::Magnitude as Float>::nan)
    }

    /// Convert the real type to `f64` for diagnostics.
    fn real_to_f64(x: Self::Magnitude) -> f64 {
        x.to_f64().unwrap_or(f64::NAN)
    }
}

macro_rules! impl_real_scalar {
    ($t:ty) => {
        impl Scalar for $t {
            type Magnitude = $t;

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn re(self) -> Self::Magnitude {
                self
            }

            #[inline]
            fn modulus(self) -> Self::Magnitude {
                self.abs()
            }

            #[inline]
            fn from_real(re: Self::Magnitude) -> Self {
                re
            }

            #[inline]
            fn from_parts(re: Self::Magnitude, _im: Self::Magnitude) -> Self {
                re
            }

            fn is_complex() -> bool {
                false
            }
        }
    };
}

macro_rules! impl_complex_scalar {
    ($t:ty) => {
        impl Scalar for Complex<$t> {
            type Magnitude = $t;

            #[inline]
            fn conj(self) -> Self {
                Complex::conj(&self)
            }

            #[inline]
            fn re(self) -> Self::Magnitude {
                self.re
            }

            #[inline]
            fn modulus(self) -> Self::Magnitude {
                self.norm()
            }

            #[inline]
            fn from_real(re: Self::Magnitude) -> Self {
                Complex::new(re, 0.0)
            }

            #[inline]
            fn from_parts(re: Self::Magnitude, im: Self::Magnitude) -> Self {
                Complex::new(re, im)
            }

            fn is_complex() -> bool {
                true
            }
        }
    };
}

impl_real_scalar!(f32);
impl_real_scalar!(f64);
impl_complex_scalar!(f32);
impl_complex_scalar!(f64);
