//! Services layer - Business logic
//!
//! Services validate input, apply the business rules and coordinate the
//! repositories. Each one reports failures through its own error enum.

pub mod holiday;
pub mod parent;
pub mod password;
pub mod revocation;
pub mod session;
pub mod student;
pub mod token;
pub mod validation;

pub use holiday::{HolidayService, HolidayServiceError};
pub use parent::{ParentService, ParentServiceError, RegisterParentInput, UpdateParentInput};
pub use password::{hash_password, verify_password};
pub use revocation::{MemoryRevocationStore, RevocationError, RevocationStore};
pub use session::{AuthError, GuardOutcome, SessionGuard, ROTATION_THRESHOLD_SECS};
pub use student::{
    RegisterStudentInput, StudentPage, StudentService, StudentServiceError, UpdateStudentInput,
};
pub use token::{TokenError, TokenIssuer};
