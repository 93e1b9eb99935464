//! Core type definitions with validation.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An amount of effort was below zero.
    #[error("amount cannot be negative, got {minutes} minutes")]
    NegativeAmount { minutes: i64 },

    /// An amount of effort exceeded [`Effort::MAX`].
    #[error("amount too large, got {minutes} minutes")]
    AmountTooLarge { minutes: i64 },

    /// Invalid allocation entry kind.
    #[error("invalid entry kind: {value}")]
    InvalidEntryKind { value: String },

    /// Invalid capacity block kind.
    #[error("invalid capacity block kind: {value}")]
    InvalidBlockKind { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Generates a fresh random ID.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated estimate identifier.
    ///
    /// Estimate IDs must be non-empty strings. New estimates get a UUID v4.
    EstimateId, "estimate ID"
);

define_string_id!(
    /// A validated capacity block identifier.
    BlockId, "capacity block ID"
);

/// A non-negative amount of effort, counted in whole minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Effort(i64);

impl Effort {
    /// No effort.
    pub const ZERO: Self = Self(0);

    /// Largest accepted amount: a hundred years of round-the-clock work.
    pub const MAX: Self = Self(100 * 365 * 24 * 60);

    /// Creates an effort from a minute count, rejecting negative values and
    /// values above [`Effort::MAX`].
    pub const fn new(minutes: i64) -> Result<Self, ValidationError> {
        if minutes < 0 {
            return Err(ValidationError::NegativeAmount { minutes });
        }
        if minutes > Self::MAX.0 {
            return Err(ValidationError::AmountTooLarge { minutes });
        }
        Ok(Self(minutes))
    }

    /// Creates an effort of whole hours.
    #[must_use]
    pub const fn from_hours(hours: u32) -> Self {
        Self(hours as i64 * 60)
    }

    /// Creates an effort of whole minutes.
    #[must_use]
    pub const fn from_mins(minutes: u32) -> Self {
        Self(minutes as i64)
    }

    /// Returns the minute count.
    #[must_use]
    pub const fn as_minutes(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtracts, flooring at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// Subtracts, returning `None` if the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if other.0 > self.0 {
            None
        } else {
            Some(Self(self.0 - other.0))
        }
    }
}

impl Add for Effort {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Effort {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sum for Effort {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<i64> for Effort {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Effort> for i64 {
    fn from(effort: Effort) -> Self {
        effort.0
    }
}

/// Formats as `8h`, `2h 30m` or `45m`.
impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 60;
        let minutes = self.0 % 60;
        match (hours, minutes) {
            (0, m) if m > 0 => write!(f, "{m}m"),
            (h, 0) => write!(f, "{h}h"),
            (h, m) => write!(f, "{h}h {m}m"),
        }
    }
}

/// Whether an allocation entry was placed by the engine or pinned by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Computed by the allocation engine; re-flowed freely.
    Auto,
    /// Pinned by the user; never touched by re-flow.
    Manual,
}

impl EntryKind {
    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(ValidationError::InvalidEntryKind {
                value: s.to_string(),
            }),
        }
    }
}

/// Reason a capacity block takes time out of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Vacation,
    OtherWork,
}

impl BlockKind {
    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::OtherWork => "other-work",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlockKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacation" => Ok(Self::Vacation),
            "other-work" | "other_work" => Ok(Self::OtherWork),
            _ => Err(ValidationError::InvalidBlockKind {
                value: s.to_string(),
            }),
        }
    }
}
