// Synchronization Module - Project Maester
// "Two ledgers, one truth"

mod course;
mod handlers;
mod queue;
mod teacher;


pub use course::{CourseSyncService, CourseView, CreateCourseInput, UpdateCourseInput};
pub use handlers::{CourseRetryHandler, TeacherRetryHandler};
pub use queue::{
    PendingOperation, RetryHandler, RetryQueue, RetryQueueConfig, RetryQueueStats,
};
pub use teacher::{CreateTeacherInput, TeacherSyncService, TeacherView, UpdateTeacherInput};

use serde::{Deserialize, Serialize};

/// Entity whose halves live in two different stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntity {
    Teacher,
    Course,
}

impl SyncEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Course => "course",
        }
    }
}

impl std::fmt::Display for SyncEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of write held for replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub(crate) fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
