//! Values agreed upon by an instance are opaque to the core; it only ever
//! compares them bytewise and never interprets their contents.

/// An opaque value. Equality is bytewise.
pub type Value = Vec<u8>;
