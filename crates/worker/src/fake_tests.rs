// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::RuntimeAdapter as _;
use orion_core::Task;

#[tokio::test]
async fn run_succeeds_and_records_call() {
    let fake = FakeRuntime::new();
    let task = Task::builder().name("t1").build();

    let id = fake.run(&task).await.unwrap();
    assert_eq!(id, "fake-t1");
    assert_eq!(fake.run_calls(), ["t1".to_string()]);
}

#[tokio::test]
async fn second_run_with_same_name_conflicts() {
    let fake = FakeRuntime::new();
    let task = Task::builder().name("t1").build();

    fake.run(&task).await.unwrap();
    let err = fake.run(&task).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NameConflict(name) if name == "t1"));
}

#[tokio::test]
async fn stop_releases_the_name() {
    let fake = FakeRuntime::new();
    let task = Task::builder().name("t1").build();

    let id = fake.run(&task).await.unwrap();
    fake.stop(&id).await.unwrap();
    assert_eq!(fake.stop_calls(), [id]);

    // Name free again after stop.
    fake.run(&task).await.unwrap();
}

#[tokio::test]
async fn scripted_modes() {
    let fake = FakeRuntime::new();
    let task = Task::builder().name("t1").build();

    fake.always_conflict();
    assert!(matches!(fake.run(&task).await, Err(RuntimeError::NameConflict(_))));

    fake.always_fail();
    assert!(matches!(fake.run(&task).await, Err(RuntimeError::CommandFailed { .. })));
}

#[tokio::test]
async fn stats_empty_by_default() {
    let fake = FakeRuntime::new();
    assert!(fake.collect_stats().await.is_empty());
}
