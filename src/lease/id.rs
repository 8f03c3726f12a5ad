//! Strongly typed lease identifiers.

// std
use std::{borrow::Borrow, ops::Deref, str::FromStr};
// self
use crate::_prelude::*;

const LEASE_NAME_MAX_LEN: usize = 256;

/// Error returned when lease name validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum LeaseNameError {
	/// The name was empty.
	#[error("Lease name cannot be empty.")]
	Empty,
	/// The name contains whitespace characters.
	#[error("Lease name contains whitespace.")]
	ContainsWhitespace,
	/// The name exceeded the allowed character count.
	#[error("Lease name exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Opaque client-chosen name identifying a lease.
///
/// Maps 1:1 to a backend artifact (object key, document id, or KV key),
/// optionally after prefix concatenation by the provider.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeaseName(String);
impl LeaseName {
	/// Creates a new lease name after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, LeaseNameError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for LeaseName {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for LeaseName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for LeaseName {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<LeaseName> for String {
	fn from(value: LeaseName) -> Self {
		value.0
	}
}
impl TryFrom<String> for LeaseName {
	type Error = LeaseNameError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for LeaseName {
	type Err = LeaseNameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for LeaseName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "LeaseName({})", self.0)
	}
}
impl Display for LeaseName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), LeaseNameError> {
	if view.is_empty() {
		return Err(LeaseNameError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(LeaseNameError::ContainsWhitespace);
	}
	if view.len() > LEASE_NAME_MAX_LEN {
		return Err(LeaseNameError::TooLong { max: LEASE_NAME_MAX_LEN });
	}

	Ok(())
}

/// Fencing token identifying the current holder of a lease.
///
/// Every renewal, release, and conditional metadata write carries the token so
/// the backend can reject operations from stale holders.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);
impl LeaseId {
	/// Wraps a backend-issued lease token.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Mints a random 128-bit fencing token for backends without a native one.
	pub fn mint() -> Self {
		Self(format!("{:032x}", rand::random::<u128>()))
	}

	/// Returns the token as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for LeaseId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for LeaseId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "LeaseId({})", self.0)
	}
}
impl Display for LeaseId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
