// Teacher Synchronization Saga - Project Maester
// "The master copy lives with the archmaesters"

use super::queue::{PendingOperation, RetryQueue};
use super::{OperationType, SyncEntity};
use crate::error::{MaesterError, MaesterResult};
use crate::store::StoreAdapter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

pub(crate) const TEACHERS: &str = "teachers";
pub(crate) const CAREERS: &str = "careers";

/// Fields accepted when creating a teacher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTeacherInput {
    pub name: String,
    pub email: String,
    pub specialty_id: i64,
    pub career_id: i64,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTeacherInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career_id: Option<i64>,
}

/// Merged teacher view: master fields plus the career looked up in the
/// academic store when it is reachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub specialty_id: i64,
    pub career_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TeacherRecord {
    id: i64,
    name: String,
    email: String,
    specialty_id: i64,
    career_id: i64,
}

/// Dual-write orchestrator for the teacher entity
///
/// The profiles store is the master, the academic store holds the
/// reference half. Writes go master first; a failed reference write is
/// compensated and queued, never half-applied silently.
#[derive(Clone)]
pub struct TeacherSyncService {
    master: StoreAdapter,
    reference: StoreAdapter,
    queue: RetryQueue,
}

impl TeacherSyncService {
    pub fn new(master: StoreAdapter, reference: StoreAdapter, queue: RetryQueue) -> Self {
        Self {
            master,
            reference,
            queue,
        }
    }

    pub async fn create(&self, input: CreateTeacherInput) -> MaesterResult<TeacherView> {
        let master_record = json!({
            "name": input.name,
            "email": input.email,
            "specialty_id": input.specialty_id,
            "career_id": input.career_id,
        });

        let master = match self.master.create(TEACHERS, master_record).await {
            Ok(record) => record,
            Err(error) if error.is_retryable() => {
                warn!(
                    "⚬ Profiles store unavailable for teacher create, queueing: {}",
                    error
                );
                let operation = PendingOperation::new(
                    OperationType::Create,
                    SyncEntity::Teacher,
                    self.master.store(),
                    serde_json::to_value(&input)?,
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;

                return Err(MaesterError::sync_queued(
                    "Professors database temporarily unavailable. Operation queued for retry.",
                ));
            }
            Err(error) => return Err(error),
        };

        let id = record_id(&master)?;
        info!("✅ Teacher created in profiles store with ID: {}", id);

        let reference_record = json!({
            "id": id,
            "name": input.name,
            "email": input.email,
            "career_id": input.career_id,
        });

        match self.reference.create(TEACHERS, reference_record).await {
            Ok(_) => {
                info!("✅ Teacher {} mirrored into academic store", id);
                let career = self.fetch_career(input.career_id).await;
                Ok(TeacherView {
                    id,
                    name: input.name,
                    email: input.email,
                    specialty_id: input.specialty_id,
                    career_id: input.career_id,
                    career,
                })
            }
            Err(error) => {
                warn!(
                    "⚠️ Reference write failed for teacher {}, compensating: {}",
                    id, error
                );
                self.rollback_master_create(id).await;

                let operation = PendingOperation::new(
                    OperationType::Create,
                    SyncEntity::Teacher,
                    self.reference.store(),
                    json!({
                        "id": id,
                        "name": input.name,
                        "email": input.email,
                        "specialty_id": input.specialty_id,
                        "career_id": input.career_id,
                    }),
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;

                Err(MaesterError::sync_queued(
                    "Failed to create teacher in academic database. Operation queued for retry.",
                ))
            }
        }
    }

    pub async fn find_one(&self, id: i64) -> MaesterResult<Option<TeacherView>> {
        let Some(master) = self.master.find_by_id(TEACHERS, id).await? else {
            return Ok(None);
        };

        let record: TeacherRecord = serde_json::from_value(master)?;
        let career = self.fetch_career(record.career_id).await;

        Ok(Some(view_from_record(record, career)))
    }

    pub async fn find_all(&self) -> MaesterResult<Vec<TeacherView>> {
        let masters = self.master.find_many(TEACHERS, None).await?;

        // One careers fetch covers every teacher; losing it degrades the
        // views to master-only data instead of failing the read
        let careers = match self.reference.find_many(CAREERS, None).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    "⚠️ Academic store unreachable, returning teachers without careers: {}",
                    error
                );
                Vec::new()
            }
        };
        let careers_by_id: std::collections::HashMap<i64, Value> = careers
            .into_iter()
            .filter_map(|career| {
                career
                    .get("id")
                    .and_then(Value::as_i64)
                    .map(|id| (id, career))
            })
            .collect();

        let mut views = Vec::with_capacity(masters.len());
        for master in masters {
            let record: TeacherRecord = serde_json::from_value(master)?;
            let career = careers_by_id.get(&record.career_id).cloned();
            views.push(view_from_record(record, career));
        }

        Ok(views)
    }

    pub async fn update(&self, id: i64, input: UpdateTeacherInput) -> MaesterResult<TeacherView> {
        let mut master_changes = Map::new();
        let mut reference_changes = Map::new();

        // name and email live in both halves, specialty only in the master,
        // career in both
        if let Some(name) = &input.name {
            master_changes.insert("name".into(), json!(name));
            reference_changes.insert("name".into(), json!(name));
        }
        if let Some(email) = &input.email {
            master_changes.insert("email".into(), json!(email));
            reference_changes.insert("email".into(), json!(email));
        }
        if let Some(specialty_id) = input.specialty_id {
            master_changes.insert("specialty_id".into(), json!(specialty_id));
        }
        if let Some(career_id) = input.career_id {
            master_changes.insert("career_id".into(), json!(career_id));
            reference_changes.insert("career_id".into(), json!(career_id));
        }

        let master = self
            .master
            .update(TEACHERS, id, Value::Object(master_changes))
            .await?;
        info!("✅ Teacher {} updated in profiles store", id);

        if !reference_changes.is_empty() {
            let changes = Value::Object(reference_changes);
            if let Err(error) = self.reference.update(TEACHERS, id, changes.clone()).await {
                warn!(
                    "⚠️ Reference update failed for teacher {}, queueing: {}",
                    id, error
                );
                let mut payload = Map::new();
                payload.insert("id".into(), json!(id));
                payload.insert("changes".into(), changes);
                let operation = PendingOperation::new(
                    OperationType::Update,
                    SyncEntity::Teacher,
                    self.reference.store(),
                    Value::Object(payload),
                    error.to_string(),
                    self.queue.default_max_attempts(),
                );
                self.queue.enqueue(operation).await?;
            }
        }

        let record: TeacherRecord = serde_json::from_value(master)?;
        let career = self.fetch_career(record.career_id).await;
        Ok(view_from_record(record, career))
    }

    /// Delete the reference half first, the master only afterwards
    ///
    /// A constraint violation in the academic store (the teacher still has
    /// courses) aborts the whole delete before the master is touched.
    pub async fn remove(&self, id: i64) -> MaesterResult<()> {
        match self.reference.delete(TEACHERS, id).await {
            Ok(_) => {
                info!("✅ Teacher {} removed from academic store", id);
            }
            Err(MaesterError::ConstraintViolation { .. }) => {
                return Err(MaesterError::constraint_violation(
                    "Cannot delete teacher with assigned courses",
                ));
            }
            Err(MaesterError::NotFound { .. }) => {
                warn!(
                    "⚠️ Teacher {} had no reference record, continuing with master delete",
                    id
                );
            }
            Err(error) => return Err(error),
        }

        match self.master.delete(TEACHERS, id).await {
            Ok(_) => {
                info!("✅ Teacher {} removed from profiles store", id);
                Ok(())
            }
            Err(error) => {
                // The reference half is already gone; this drift is surfaced
                // to operators rather than auto-healed
                error!(
                    "💥 Master delete failed for teacher {} after reference delete: {}",
                    id, error
                );
                Err(error)
            }
        }
    }

    async fn rollback_master_create(&self, id: i64) {
        if let Err(error) = self.master.delete(TEACHERS, id).await {
            error!(
                "💥 Rollback failed: could not remove teacher {} from profiles store: {}",
                id, error
            );
        } else {
            info!("↩️ Rolled back teacher {} in profiles store", id);
        }
    }

    async fn fetch_career(&self, career_id: i64) -> Option<Value> {
        match self.reference.find_by_id(CAREERS, career_id).await {
            Ok(career) => career,
            Err(error) => {
                warn!(
                    "⚠️ Could not fetch career {} from academic store: {}",
                    career_id, error
                );
                None
            }
        }
    }
}

fn view_from_record(record: TeacherRecord, career: Option<Value>) -> TeacherView {
    TeacherView {
        id: record.id,
        name: record.name,
        email: record.email,
        specialty_id: record.specialty_id,
        career_id: record.career_id,
        career,
    }
}

pub(crate) fn record_id(record: &Value) -> MaesterResult<i64> {
    record
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| MaesterError::internal("store returned a record without an id"))
}
