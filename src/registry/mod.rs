//! Course registry: slug → course metadata lookup.
//!
//! The registry is the only component that owns structured course
//! metadata; on-disk content state belongs to the content store and the
//! two never reach around each other.

pub mod course;
pub mod store;

pub use course::{Course, CourseId, DEFAULT_ROUTE};
pub use store::CourseStore;
