//! Study scheduling: active pool selection and answer handling

pub mod policy;
pub mod scheduler;

pub use policy::{ReschedulePolicy, SchedulePolicy};
pub use scheduler::{apply_answer, StudyScheduler};
