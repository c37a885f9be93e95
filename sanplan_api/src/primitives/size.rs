use std::{
    fmt::Display,
    num::ParseFloatError,
    ops::{Add, Div, Mul, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationInvalidError, SanplanError};

/// A storage quantity in gigabytes. Fractions are meaningful: 0.02 GB is a
/// 20 MB root volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gigabytes(pub f64);

impl Gigabytes {
    pub fn value(self) -> f64 {
        self.0
    }

    /// Renders the size the way volume and LUN create commands expect it:
    /// whole gigabytes with a `g` suffix, or, when the value has a fractional
    /// part, whole megabytes at 1000 MB/GB with an `m` suffix.
    pub fn to_create_size(self) -> Result<String, SanplanError> {
        let fraction = self.0 - self.0.trunc();
        let (amount, unit) = if fraction > 0.0 && fraction < 1.0 {
            ((self.0 * 1000.0).round(), 'm')
        } else {
            (self.0.round(), 'g')
        };

        if amount <= 0.0 {
            return Err(SanplanError::new(
                ConfigurationInvalidError::NonPositiveCreateSize {
                    size: self.to_string(),
                },
            ));
        }
        Ok(format!("{amount}{unit}"))
    }

    /// Raw size needed to hold this usable size behind a snapshot reserve
    /// percentage.
    pub fn with_reserve(self, reserve_percent: f64) -> Option<Gigabytes> {
        let usable_share = (100.0 - reserve_percent) / 100.0;
        (usable_share != 0.0).then(|| Gigabytes(self.0 / usable_share))
    }
}

impl From<f64> for Gigabytes {
    fn from(x: f64) -> Self {
        Gigabytes(x)
    }
}

impl Add for Gigabytes {
    type Output = Gigabytes;

    fn add(self, rhs: Gigabytes) -> Gigabytes {
        Gigabytes(self.0 + rhs.0)
    }
}

impl Sub for Gigabytes {
    type Output = Gigabytes;

    fn sub(self, rhs: Gigabytes) -> Gigabytes {
        Gigabytes(self.0 - rhs.0)
    }
}

impl Mul<f64> for Gigabytes {
    type Output = Gigabytes;

    fn mul(self, rhs: f64) -> Gigabytes {
        Gigabytes(self.0 * rhs)
    }
}

impl Div<f64> for Gigabytes {
    type Output = Gigabytes;

    fn div(self, rhs: f64) -> Gigabytes {
        Gigabytes(self.0 / rhs)
    }
}

impl std::iter::Sum for Gigabytes {
    fn sum<I: Iterator<Item = Gigabytes>>(iter: I) -> Gigabytes {
        Gigabytes(iter.map(|size| size.0).sum())
    }
}

impl Display for Gigabytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Gigabytes {
    type Err = ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<f64>().map(Gigabytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn test_create_size() {
        assert_eq!(Gigabytes(20.0).to_create_size().unwrap(), "20g");
        assert_eq!(Gigabytes(0.02).to_create_size().unwrap(), "20m");
        assert_eq!(Gigabytes(125.0).to_create_size().unwrap(), "125g");
        assert_eq!(Gigabytes(1.5).to_create_size().unwrap(), "1500m");
        assert_eq!(Gigabytes(0.0126).to_create_size().unwrap(), "13m");
    }

    #[test]
    fn test_create_size_not_positive() {
        for size in [0.0, 0.0004, -10.0, -0.5] {
            let error = Gigabytes(size).to_create_size().unwrap_err();
            assert!(matches!(
                error.kind(),
                ErrorKind::ConfigurationInvalid(ConfigurationInvalidError::NonPositiveCreateSize { .. })
            ));
        }
    }

    #[test]
    fn test_with_reserve() {
        assert_eq!(Gigabytes(75.0).with_reserve(25.0), Some(Gigabytes(100.0)));
        assert_eq!(Gigabytes(50.0).with_reserve(0.0), Some(Gigabytes(50.0)));
        assert_eq!(Gigabytes(50.0).with_reserve(100.0), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 12.5 ".parse::<Gigabytes>().unwrap(), Gigabytes(12.5));
        assert!("lots".parse::<Gigabytes>().is_err());
    }
}
