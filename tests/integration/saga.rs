// End-to-end saga tests across all three stores

use crate::test_stack;
use academic_records_sync_server::error::MaesterError;
use academic_records_sync_server::sync::{
    CreateCourseInput, CreateTeacherInput, SyncEntity, UpdateTeacherInput,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn teacher_lifecycle_converges_across_stores() {
    let stack = test_stack().await;

    // The academic store already knows the career the teacher belongs to
    stack
        .academic_adapter
        .create("careers", json!({"id": 9, "name": "Computer Science"}))
        .await
        .unwrap();

    let created = stack
        .teachers
        .create(CreateTeacherInput {
            name: "Marwyn".into(),
            email: "marwyn@citadel.edu".into(),
            specialty_id: 3,
            career_id: 9,
        })
        .await
        .unwrap();
    assert_eq!(created.name, "Marwyn");
    assert_eq!(
        created.career.as_ref().and_then(|c| c.get("name")),
        Some(&json!("Computer Science"))
    );
    assert_eq!(stack.profiles.record_count("teachers"), 1);
    assert_eq!(stack.academic.record_count("teachers"), 1);

    let found = stack.teachers.find_one(created.id).await.unwrap().unwrap();
    assert_eq!(found.email, "marwyn@citadel.edu");

    // An email change must land in both halves
    stack
        .teachers
        .update(
            created.id,
            UpdateTeacherInput {
                email: Some("archmaester@citadel.edu".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    for adapter in [&stack.profiles_adapter, &stack.academic_adapter] {
        let record = adapter
            .find_by_id("teachers", created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["email"], json!("archmaester@citadel.edu"));
    }

    stack.teachers.remove(created.id).await.unwrap();
    assert_eq!(stack.profiles.record_count("teachers"), 0);
    assert_eq!(stack.academic.record_count("teachers"), 0);
    assert!(stack.queue.list_pending().await.is_empty());
}

#[tokio::test]
async fn course_enrollment_round_trip() {
    let stack = test_stack().await;

    let course = stack
        .courses
        .create(CreateCourseInput {
            name: "Ravenry".into(),
            code: "RAV-101".into(),
            teacher_id: 1,
            career_id: 1,
            available_seats: 3,
        })
        .await
        .unwrap();

    let view = stack
        .courses
        .assign_students(course.id, vec![1, 2])
        .await
        .unwrap();
    assert_eq!(view.available_seats, 1);
    assert_eq!(view.enrolled_students, vec![1, 2]);

    // Re-enrolling student 2 is skipped, only student 3 takes a seat
    let view = stack
        .courses
        .assign_students(course.id, vec![2, 3])
        .await
        .unwrap();
    assert_eq!(view.available_seats, 0);
    assert_eq!(view.enrolled_students, vec![1, 2, 3]);

    let err = stack
        .courses
        .assign_students(course.id, vec![4])
        .await
        .unwrap_err();
    assert!(matches!(err, MaesterError::ConstraintViolation { .. }));
    assert!(err
        .to_string()
        .contains("Not enough available seats in course"));

    let view = stack
        .courses
        .remove_students(course.id, vec![1])
        .await
        .unwrap();
    assert_eq!(view.available_seats, 1);
    assert_eq!(view.enrolled_students, vec![2, 3]);
}

#[tokio::test]
async fn outage_queues_and_manual_replay_converges() {
    let stack = test_stack().await;
    stack.profiles.set_available(false);

    let err = stack
        .teachers
        .create(CreateTeacherInput {
            name: "Ebrose".into(),
            email: "ebrose@citadel.edu".into(),
            specialty_id: 1,
            career_id: 1,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Professors database temporarily unavailable. Operation queued for retry."
    );

    let pending = stack.queue.list_pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity, SyncEntity::Teacher);

    stack.profiles.set_available(true);
    stack.queue.retry_operation(&pending[0].id).await.unwrap();

    assert_eq!(stack.profiles.record_count("teachers"), 1);
    assert_eq!(stack.academic.record_count("teachers"), 1);
    assert!(stack.queue.list_pending().await.is_empty());

    let teachers = stack.teachers.find_all().await.unwrap();
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0].name, "Ebrose");
}

#[tokio::test]
async fn outage_replay_via_background_sweep() {
    let stack = test_stack().await;
    stack.academic.set_available(false);

    let err = stack
        .courses
        .create(CreateCourseInput {
            name: "Healing".into(),
            code: "HEA-201".into(),
            teacher_id: 1,
            career_id: 1,
            available_seats: 20,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Academic database temporarily unavailable. Operation queued for retry."
    );
    assert_eq!(stack.queue.list_pending().await.len(), 1);

    stack.academic.set_available(true);
    stack.queue.start_processing().await.unwrap();

    // The first automatic attempt becomes eligible one second after the
    // enqueue, the sweep itself runs every 50ms
    tokio::time::sleep(Duration::from_millis(1400)).await;
    stack.queue.stop_processing();

    assert!(stack.queue.list_pending().await.is_empty());
    assert_eq!(stack.academic.record_count("courses"), 1);
    assert_eq!(stack.profiles.record_count("courses"), 1);
}

#[tokio::test]
async fn reference_failure_compensates_then_replay_restores_both_halves() {
    let stack = test_stack().await;
    stack
        .academic
        .inject_failure(MaesterError::connection_error(
            "connection refused: academic store is unreachable",
        ))
        .await;

    let err = stack
        .teachers
        .create(CreateTeacherInput {
            name: "Qyburn".into(),
            email: "qyburn@citadel.edu".into(),
            specialty_id: 7,
            career_id: 2,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to create teacher in academic database. Operation queued for retry."
    );

    // The master write was compensated, nothing half-applied remains
    assert_eq!(stack.profiles.record_count("teachers"), 0);
    assert_eq!(stack.academic.record_count("teachers"), 0);

    let pending = stack.queue.list_pending().await;
    assert_eq!(pending.len(), 1);

    stack.queue.retry_operation(&pending[0].id).await.unwrap();

    // The replay restored the master half under the id the caller saw
    let restored = stack.teachers.find_one(1).await.unwrap().unwrap();
    assert_eq!(restored.name, "Qyburn");
    assert_eq!(stack.profiles.record_count("teachers"), 1);
    assert_eq!(stack.academic.record_count("teachers"), 1);
    assert!(stack.queue.list_pending().await.is_empty());
}

#[tokio::test]
async fn delete_saga_blocks_on_reference_constraint() {
    let stack = test_stack().await;

    let created = stack
        .teachers
        .create(CreateTeacherInput {
            name: "Pycelle".into(),
            email: "pycelle@citadel.edu".into(),
            specialty_id: 2,
            career_id: 1,
        })
        .await
        .unwrap();

    stack
        .academic
        .inject_failure(MaesterError::constraint_violation(
            "teacher still referenced by courses",
        ))
        .await;

    let err = stack.teachers.remove(created.id).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Constraint violation: Cannot delete teacher with assigned courses"
    );

    // Neither half was deleted and nothing was queued
    assert_eq!(stack.profiles.record_count("teachers"), 1);
    assert_eq!(stack.academic.record_count("teachers"), 1);
    assert!(stack.queue.list_pending().await.is_empty());
}
