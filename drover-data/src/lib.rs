//! SQLite data layer for Drover task orchestration
//!
//! Owns the task store: the shared task, assignment, and tag tables,
//! plus the specialization seam that lets concrete stores (like the
//! sensing store) hang their own domain rows off a task. Used by
//! drover-engine for dispatch and intake and by drover-server for the
//! HTTP surface.

pub mod assignments;
pub mod db;
pub mod error;
pub mod extension;
pub mod measurements;
pub mod migrations;
pub mod sensing;
pub mod store;
pub mod tags;
pub mod tasks;
pub mod types;
pub mod uploads;

// Re-export the types nearly every consumer needs
pub use error::{Result, StoreError};
pub use extension::{Specialization, SpecializationRegistry};
pub use types::{
    AssignmentStatus, DataView, JobKind, Paging, Task, TaskBackend, TaskFilter, TaskSummary,
    Visibility,
};
