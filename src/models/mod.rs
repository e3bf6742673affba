//! Data models
//!
//! Database entities (Student, Subject, Parent, Holiday), their joined views
//! returned by the API, and the session token claims.

mod holiday;
mod parent;
mod session;
mod student;
mod subject;

pub use holiday::{DateRange, Holiday, HolidayWithStudents};
pub use parent::{Parent, ParentWithStudent};
pub use session::Claims;
pub use student::{
    Student, StudentSubject, StudentWithHolidays, StudentWithParent, StudentWithSubjects,
};
pub use subject::{Enrollment, Subject};
