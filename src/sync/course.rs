// Course Synchronization Saga - Project Maester
// "Every lecture hall keeps its own roll"

use super::queue::{PendingOperation, RetryQueue};
use super::teacher::{record_id, TEACHERS};
use super::{OperationType, SyncEntity};
use crate::error::{MaesterError, MaesterResult};
use crate::store::StoreAdapter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

pub(crate) const COURSES: &str = "courses";

/// Fields accepted when creating a course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseInput {
    pub name: String,
    pub code: String,
    pub teacher_id: i64,
    pub career_id: i64,
    pub available_seats: i64,
}

/// Partial update; seat counts move only through enrollment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career_id: Option<i64>,
}

/// Merged course view: master fields plus the teacher looked up in the
/// profiles store when it is reachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseView {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub teacher_id: i64,
    pub career_id: i64,
    pub available_seats: i64,
    pub enrolled_students: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CourseRecord {
    id: i64,
    name: String,
    code: String,
    teacher_id: i64,
    career_id: i64,
    available_seats: i64,
    #[serde(default)]
    enrolled_students: Vec<i64>,
}

/// Dual-write orchestrator for the course entity
///
/// Mirror image of the teacher saga: here the academic store is the
/// master and the profiles store holds the reference half. Enrollment
/// state lives only in the master.
#[derive(Clone)]
pub struct CourseSyncService {
    master: StoreAdapter,
    reference: StoreAdapter,
    queue: RetryQueue,
}

impl CourseSyncService {
    pub fn new(master: StoreAdapter, reference: StoreAdapter, queue: RetryQueue) -> Self {
        Self {
            master,
            reference,
            queue,
        }
    }

    pub async fn create(&self, input: CreateCourseInput) -> MaesterResult<CourseView> {
        let master_record = json!({
            "name": input.name,
            "code": input.code,
            "teacher_id": input.teacher_id,
            "career_id": input.career_id,
            "available_seats": input.available_seats,
            "enrolled_students": [],
        });

        let master = match self.master.create(COURSES, master_record).await {
            Ok(record) => record,
            Err(error) if error.is_retryable() => {
                warn!(
                    "⚬ Academic store unavailable for course create, queueing: {}",
                    error
                );
                let operation = PendingOperation::new(
                    OperationType::Create,
                    SyncEntity::Course,
                    self.master.store(),
                    serde_json::to_value(&input)?,
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;

                return Err(MaesterError::sync_queued(
                    "Academic database temporarily unavailable. Operation queued for retry.",
                ));
            }
            Err(error) => return Err(error),
        };

        let id = record_id(&master)?;
        info!("✅ Course created in academic store with ID: {}", id);

        let reference_record = json!({
            "id": id,
            "name": input.name,
            "code": input.code,
            "teacher_id": input.teacher_id,
        });

        match self.reference.create(COURSES, reference_record).await {
            Ok(_) => {
                info!("✅ Course {} mirrored into profiles store", id);
                let teacher = self.fetch_teacher(input.teacher_id).await;
                Ok(CourseView {
                    id,
                    name: input.name,
                    code: input.code,
                    teacher_id: input.teacher_id,
                    career_id: input.career_id,
                    available_seats: input.available_seats,
                    enrolled_students: Vec::new(),
                    teacher,
                })
            }
            Err(error) => {
                warn!(
                    "⚠️ Reference write failed for course {}, compensating: {}",
                    id, error
                );
                self.rollback_master_create(id).await;

                let operation = PendingOperation::new(
                    OperationType::Create,
                    SyncEntity::Course,
                    self.reference.store(),
                    json!({
                        "id": id,
                        "name": input.name,
                        "code": input.code,
                        "teacher_id": input.teacher_id,
                        "career_id": input.career_id,
                        "available_seats": input.available_seats,
                    }),
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;

                Err(MaesterError::sync_queued(
                    "Failed to create course in profiles database. Operation queued for retry.",
                ))
            }
        }
    }

    pub async fn find_one(&self, id: i64) -> MaesterResult<Option<CourseView>> {
        let Some(master) = self.master.find_by_id(COURSES, id).await? else {
            return Ok(None);
        };

        let record: CourseRecord = serde_json::from_value(master)?;
        let teacher = self.fetch_teacher(record.teacher_id).await;

        Ok(Some(view_from_record(record, teacher)))
    }

    pub async fn find_all(&self) -> MaesterResult<Vec<CourseView>> {
        let masters = self.master.find_many(COURSES, None).await?;

        let teachers = match self.reference.find_many(TEACHERS, None).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    "⚠️ Profiles store unreachable, returning courses without teachers: {}",
                    error
                );
                Vec::new()
            }
        };
        let teachers_by_id: std::collections::HashMap<i64, Value> = teachers
            .into_iter()
            .filter_map(|teacher| {
                teacher
                    .get("id")
                    .and_then(Value::as_i64)
                    .map(|id| (id, teacher))
            })
            .collect();

        let mut views = Vec::with_capacity(masters.len());
        for master in masters {
            let record: CourseRecord = serde_json::from_value(master)?;
            let teacher = teachers_by_id.get(&record.teacher_id).cloned();
            views.push(view_from_record(record, teacher));
        }

        Ok(views)
    }

    pub async fn update(&self, id: i64, input: UpdateCourseInput) -> MaesterResult<CourseView> {
        let mut master_changes = Map::new();
        let mut reference_changes = Map::new();

        // name, code and teacher live in both halves, the career only in
        // the master
        if let Some(name) = &input.name {
            master_changes.insert("name".into(), json!(name));
            reference_changes.insert("name".into(), json!(name));
        }
        if let Some(code) = &input.code {
            master_changes.insert("code".into(), json!(code));
            reference_changes.insert("code".into(), json!(code));
        }
        if let Some(teacher_id) = input.teacher_id {
            master_changes.insert("teacher_id".into(), json!(teacher_id));
            reference_changes.insert("teacher_id".into(), json!(teacher_id));
        }
        if let Some(career_id) = input.career_id {
            master_changes.insert("career_id".into(), json!(career_id));
        }

        let master = self
            .master
            .update(COURSES, id, Value::Object(master_changes))
            .await?;
        info!("✅ Course {} updated in academic store", id);

        if !reference_changes.is_empty() {
            let changes = Value::Object(reference_changes);
            if let Err(error) = self.reference.update(COURSES, id, changes.clone()).await {
                warn!(
                    "⚠️ Reference update failed for course {}, queueing: {}",
                    id, error
                );
                let mut payload = Map::new();
                payload.insert("id".into(), json!(id));
                payload.insert("changes".into(), changes);
                let operation = PendingOperation::new(
                    OperationType::Update,
                    SyncEntity::Course,
                    self.reference.store(),
                    Value::Object(payload),
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;
            }
        }

        let record: CourseRecord = serde_json::from_value(master)?;
        let teacher = self.fetch_teacher(record.teacher_id).await;
        Ok(view_from_record(record, teacher))
    }

    /// Delete the reference half first, the master only afterwards
    pub async fn remove(&self, id: i64) -> MaesterResult<()> {
        match self.reference.delete(COURSES, id).await {
            Ok(_) => {
                info!("✅ Course {} removed from profiles store", id);
            }
            Err(MaesterError::ConstraintViolation { .. }) => {
                return Err(MaesterError::constraint_violation(
                    "Cannot delete course that is still referenced",
                ));
            }
            Err(MaesterError::NotFound { .. }) => {
                warn!(
                    "⚠️ Course {} had no reference record, continuing with master delete",
                    id
                );
            }
            Err(error) => return Err(error),
        }

        match self.master.delete(COURSES, id).await {
            Ok(_) => {
                info!("✅ Course {} removed from academic store", id);
                Ok(())
            }
            Err(error) => {
                error!(
                    "💥 Master delete failed for course {} after reference delete: {}",
                    id, error
                );
                Err(error)
            }
        }
    }

    /// Enroll students into the course, master store only
    ///
    /// Already-enrolled students are skipped; the remainder must fit into
    /// the available seats or the whole call is rejected.
    pub async fn assign_students(
        &self,
        id: i64,
        student_ids: Vec<i64>,
    ) -> MaesterResult<CourseView> {
        let master = self
            .master
            .find_by_id(COURSES, id)
            .await?
            .ok_or_else(|| MaesterError::not_found(format!("course {}", id)))?;
        let record: CourseRecord = serde_json::from_value(master)?;

        let mut enrolled = record.enrolled_students.clone();
        let mut admitted = 0i64;
        for student_id in student_ids {
            if enrolled.contains(&student_id) {
                warn!(
                    "⚠️ Student {} already enrolled in course {}, skipping",
                    student_id, id
                );
                continue;
            }
            enrolled.push(student_id);
            admitted += 1;
        }

        if admitted > record.available_seats {
            return Err(MaesterError::constraint_violation(format!(
                "Not enough available seats in course {}: requested {}, available {}",
                id, admitted, record.available_seats
            )));
        }

        let updated = self
            .master
            .update(
                COURSES,
                id,
                json!({
                    "enrolled_students": enrolled,
                    "available_seats": record.available_seats - admitted,
                }),
            )
            .await?;
        info!("✅ Assigned {} students to course {}", admitted, id);

        let record: CourseRecord = serde_json::from_value(updated)?;
        let teacher = self.fetch_teacher(record.teacher_id).await;
        Ok(view_from_record(record, teacher))
    }

    /// Withdraw students from the course, freeing their seats
    pub async fn remove_students(
        &self,
        id: i64,
        student_ids: Vec<i64>,
    ) -> MaesterResult<CourseView> {
        let master = self
            .master
            .find_by_id(COURSES, id)
            .await?
            .ok_or_else(|| MaesterError::not_found(format!("course {}", id)))?;
        let record: CourseRecord = serde_json::from_value(master)?;

        let mut enrolled = record.enrolled_students.clone();
        let mut withdrawn = 0i64;
        for student_id in student_ids {
            let before = enrolled.len();
            enrolled.retain(|enrolled_id| *enrolled_id != student_id);
            if enrolled.len() == before {
                warn!(
                    "⚠️ Student {} was not enrolled in course {}, skipping",
                    student_id, id
                );
            } else {
                withdrawn += 1;
            }
        }

        let updated = self
            .master
            .update(
                COURSES,
                id,
                json!({
                    "enrolled_students": enrolled,
                    "available_seats": record.available_seats + withdrawn,
                }),
            )
            .await?;
        info!("✅ Withdrew {} students from course {}", withdrawn, id);

        let record: CourseRecord = serde_json::from_value(updated)?;
        let teacher = self.fetch_teacher(record.teacher_id).await;
        Ok(view_from_record(record, teacher))
    }

    async fn rollback_master_create(&self, id: i64) {
        if let Err(error) = self.master.delete(COURSES, id).await {
            error!(
                "💥 Rollback failed: could not remove course {} from academic store: {}",
                id, error
            );
        } else {
            info!("↩️ Rolled back course {} in academic store", id);
        }
    }

    async fn fetch_teacher(&self, teacher_id: i64) -> Option<Value> {
        match self.reference.find_by_id(TEACHERS, teacher_id).await {
            Ok(teacher) => teacher,
            Err(error) => {
                warn!(
                    "⚠️ Could not fetch teacher {} from profiles store: {}",
                    teacher_id, error
                );
                None
            }
        }
    }
}

fn view_from_record(record: CourseRecord, teacher: Option<Value>) -> CourseView {
    CourseView {
        id: record.id,
        name: record.name,
        code: record.code,
        teacher_id: record.teacher_id,
        career_id: record.career_id,
        available_seats: record.available_seats,
        enrolled_students: record.enrolled_students,
        teacher,
    }
}
