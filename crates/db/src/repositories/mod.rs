//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod reading_repo;

pub use reading_repo::ReadingRepo;
