// Replay Handlers - Project Maester
// "What the storm interrupted, the calm completes"

use super::course::COURSES;
use super::queue::{PendingOperation, RetryHandler};
use super::teacher::TEACHERS;
use super::{OperationType, SyncEntity};
use crate::error::{MaesterError, MaesterResult};
use crate::store::{StoreAdapter, StoreId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TeacherReplayFields {
    #[serde(default)]
    id: Option<i64>,
    name: String,
    email: String,
    specialty_id: i64,
    career_id: i64,
}

#[derive(Debug, Deserialize)]
struct CourseReplayFields {
    #[serde(default)]
    id: Option<i64>,
    name: String,
    code: String,
    teacher_id: i64,
    career_id: i64,
    available_seats: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateReplayFields {
    id: i64,
    changes: Value,
}

#[derive(Debug, Deserialize)]
struct DeleteReplayFields {
    id: i64,
}

/// Replays queued teacher operations against the right store
pub struct TeacherRetryHandler {
    master: StoreAdapter,
    reference: StoreAdapter,
}

impl TeacherRetryHandler {
    pub fn new(master: StoreAdapter, reference: StoreAdapter) -> Self {
        Self { master, reference }
    }

    fn adapter_for(&self, store: StoreId) -> &StoreAdapter {
        if store == self.master.store() {
            &self.master
        } else {
            &self.reference
        }
    }

    async fn replay_create(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: TeacherReplayFields = serde_json::from_value(operation.payload.clone())?;

        if operation.target_store == self.master.store() {
            // The whole create never happened; run the dual write again
            let master = self
                .master
                .create(
                    TEACHERS,
                    json!({
                        "name": fields.name,
                        "email": fields.email,
                        "specialty_id": fields.specialty_id,
                        "career_id": fields.career_id,
                    }),
                )
                .await?;
            let id = super::teacher::record_id(&master)?;

            if let Err(error) = self
                .reference
                .create(
                    TEACHERS,
                    json!({
                        "id": id,
                        "name": fields.name,
                        "email": fields.email,
                        "career_id": fields.career_id,
                    }),
                )
                .await
            {
                warn!(
                    "⚠️ Replay reference write failed for teacher {}, rolling back: {}",
                    id, error
                );
                if let Err(rollback) = self.master.delete(TEACHERS, id).await {
                    warn!("⚠️ Replay rollback failed for teacher {}: {}", id, rollback);
                }
                return Err(error);
            }

            info!("🔄 Replayed full teacher create, new ID: {}", id);
            return Ok(());
        }

        // Only the reference half is missing; the payload kept the id the
        // caller already saw
        let id = fields.id.ok_or_else(|| {
            MaesterError::internal("queued reference create is missing the record id")
        })?;

        if self.reference.find_by_id(TEACHERS, id).await?.is_some() {
            info!("🔄 Teacher {} already present in academic store", id);
            return Ok(());
        }

        // The compensation may have removed the master record too
        if self.master.find_by_id(TEACHERS, id).await?.is_none() {
            self.master
                .create(
                    TEACHERS,
                    json!({
                        "id": id,
                        "name": fields.name,
                        "email": fields.email,
                        "specialty_id": fields.specialty_id,
                        "career_id": fields.career_id,
                    }),
                )
                .await?;
            info!("🔄 Restored master record for teacher {}", id);
        }

        self.reference
            .create(
                TEACHERS,
                json!({
                    "id": id,
                    "name": fields.name,
                    "email": fields.email,
                    "career_id": fields.career_id,
                }),
            )
            .await?;
        info!("🔄 Replayed reference create for teacher {}", id);
        Ok(())
    }

    async fn replay_update(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: UpdateReplayFields = serde_json::from_value(operation.payload.clone())?;
        let adapter = self.adapter_for(operation.target_store);

        match adapter.update(TEACHERS, fields.id, fields.changes).await {
            Ok(_) => {
                info!(
                    "🔄 Replayed update for teacher {} in {} store",
                    fields.id, operation.target_store
                );
                Ok(())
            }
            Err(MaesterError::NotFound { .. }) => {
                warn!(
                    "⚠️ Teacher {} vanished before its queued update, dropping it",
                    fields.id
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn replay_delete(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: DeleteReplayFields = serde_json::from_value(operation.payload.clone())?;
        let adapter = self.adapter_for(operation.target_store);

        match adapter.delete(TEACHERS, fields.id).await {
            Ok(_) | Err(MaesterError::NotFound { .. }) => {
                info!(
                    "🔄 Replayed delete for teacher {} in {} store",
                    fields.id, operation.target_store
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl RetryHandler for TeacherRetryHandler {
    async fn replay(&self, operation: &PendingOperation) -> MaesterResult<()> {
        match operation.op_type {
            OperationType::Create => self.replay_create(operation).await,
            OperationType::Update => self.replay_update(operation).await,
            OperationType::Delete => self.replay_delete(operation).await,
        }
    }

    fn entity(&self) -> SyncEntity {
        SyncEntity::Teacher
    }
}

/// Replays queued course operations against the right store
pub struct CourseRetryHandler {
    master: StoreAdapter,
    reference: StoreAdapter,
}

impl CourseRetryHandler {
    pub fn new(master: StoreAdapter, reference: StoreAdapter) -> Self {
        Self { master, reference }
    }

    fn adapter_for(&self, store: StoreId) -> &StoreAdapter {
        if store == self.master.store() {
            &self.master
        } else {
            &self.reference
        }
    }

    async fn replay_create(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: CourseReplayFields = serde_json::from_value(operation.payload.clone())?;

        if operation.target_store == self.master.store() {
            let master = self
                .master
                .create(
                    COURSES,
                    json!({
                        "name": fields.name,
                        "code": fields.code,
                        "teacher_id": fields.teacher_id,
                        "career_id": fields.career_id,
                        "available_seats": fields.available_seats,
                        "enrolled_students": [],
                    }),
                )
                .await?;
            let id = super::teacher::record_id(&master)?;

            if let Err(error) = self
                .reference
                .create(
                    COURSES,
                    json!({
                        "id": id,
                        "name": fields.name,
                        "code": fields.code,
                        "teacher_id": fields.teacher_id,
                    }),
                )
                .await
            {
                warn!(
                    "⚠️ Replay reference write failed for course {}, rolling back: {}",
                    id, error
                );
                if let Err(rollback) = self.master.delete(COURSES, id).await {
                    warn!("⚠️ Replay rollback failed for course {}: {}", id, rollback);
                }
                return Err(error);
            }

            info!("🔄 Replayed full course create, new ID: {}", id);
            return Ok(());
        }

        let id = fields.id.ok_or_else(|| {
            MaesterError::internal("queued reference create is missing the record id")
        })?;

        if self.reference.find_by_id(COURSES, id).await?.is_some() {
            info!("🔄 Course {} already present in profiles store", id);
            return Ok(());
        }

        if self.master.find_by_id(COURSES, id).await?.is_none() {
            self.master
                .create(
                    COURSES,
                    json!({
                        "id": id,
                        "name": fields.name,
                        "code": fields.code,
                        "teacher_id": fields.teacher_id,
                        "career_id": fields.career_id,
                        "available_seats": fields.available_seats,
                        "enrolled_students": [],
                    }),
                )
                .await?;
            info!("🔄 Restored master record for course {}", id);
        }

        self.reference
            .create(
                COURSES,
                json!({
                    "id": id,
                    "name": fields.name,
                    "code": fields.code,
                    "teacher_id": fields.teacher_id,
                }),
            )
            .await?;
        info!("🔄 Replayed reference create for course {}", id);
        Ok(())
    }

    async fn replay_update(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: UpdateReplayFields = serde_json::from_value(operation.payload.clone())?;
        let adapter = self.adapter_for(operation.target_store);

        match adapter.update(COURSES, fields.id, fields.changes).await {
            Ok(_) => {
                info!(
                    "🔄 Replayed update for course {} in {} store",
                    fields.id, operation.target_store
                );
                Ok(())
            }
            Err(MaesterError::NotFound { .. }) => {
                warn!(
                    "⚠️ Course {} vanished before its queued update, dropping it",
                    fields.id
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn replay_delete(&self, operation: &PendingOperation) -> MaesterResult<()> {
        let fields: DeleteReplayFields = serde_json::from_value(operation.payload.clone())?;
        let adapter = self.adapter_for(operation.target_store);

        match adapter.delete(COURSES, fields.id).await {
            Ok(_) | Err(MaesterError::NotFound { .. }) => {
                info!(
                    "🔄 Replayed delete for course {} in {} store",
                    fields.id, operation.target_store
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl RetryHandler for CourseRetryHandler {
    async fn replay(&self, operation: &PendingOperation) -> MaesterResult<()> {
        match operation.op_type {
            OperationType::Create => self.replay_create(operation).await,
            OperationType::Update => self.replay_update(operation).await,
            OperationType::Delete => self.replay_delete(operation).await,
        }
    }

    fn entity(&self) -> SyncEntity {
        SyncEntity::Course
    }
}
