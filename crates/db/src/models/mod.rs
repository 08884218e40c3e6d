//! Row and aggregate structs returned by the repositories.

pub mod reading;
