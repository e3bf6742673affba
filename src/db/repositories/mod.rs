//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository owns the queries for one aggregate and dispatches on the
//! configured driver.

pub mod holiday;
pub mod parent;
pub mod student;
pub mod subject;

pub use holiday::{CreateOutcome, HolidayRepository, SqlxHolidayRepository};
pub use parent::{ParentChanges, ParentRepository, SqlxParentRepository};
pub use student::{SqlxStudentRepository, StudentChanges, StudentRepository};
pub use subject::{SqlxSubjectRepository, SubjectRepository};
