//! On-disk representation of portable graphs.
//!
//! A single self-describing byte stream per graph: header, neighbor lists,
//! optional vector payload and a CRC32 footer. See [`format`].

pub mod format;
