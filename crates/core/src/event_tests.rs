// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};

#[test]
fn event_carries_task_id() {
    let task = Task::builder().id("t-9").build();
    let ts = Utc.timestamp_millis_opt(5_000).single().unwrap();
    let event = TaskEvent::new(EventId::new("e-1"), TaskState::Scheduled, ts, task);

    assert_eq!(event.task_id, "t-9");
    assert_eq!(event.state, TaskState::Scheduled);
    assert_eq!(event.task.id, "t-9");
}

#[test]
fn event_serde_round_trip() {
    let task = Task::builder().id("t-1").name("web").build();
    let ts = Utc.timestamp_millis_opt(42_000).single().unwrap();
    let event = TaskEvent::new(EventId::new("e-2"), TaskState::Pending, ts, task);

    let bytes = serde_json::to_vec(&event).unwrap();
    let parsed: TaskEvent = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed, event);
}
