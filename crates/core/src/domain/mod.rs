pub mod intent;
pub mod operation;
pub mod records;
pub mod session;
pub mod slots;

pub use intent::{FieldSpec, Intent, Requirement};
pub use operation::{AmbiguityReason, Candidate, OperationPayload, OperationResult};
pub use records::{
    AttemptVerdict, Exam, ExamAttempt, ExamStatistics, NewStudent, ScheduleConfirmation,
    ScheduledExam, Student, StudentFilter, SystemStatus,
};
pub use session::{Session, Speaker, Turn};
pub use slots::{SlotField, Slots};
