// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Membership callbacks and the bridge into consensus configuration.

use crate::proto::Member;
use async_trait::async_trait;
use orion_store::Store;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callbacks fired as the member table changes.
///
/// Invoked from spawned tasks; implementations may block on consensus.
#[async_trait]
pub trait MembershipHandler: Send + Sync + 'static {
    async fn on_join(&self, member: &Member);
    async fn on_leave(&self, member: &Member);
    async fn on_update(&self, _member: &Member) {}
}

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

#[async_trait]
impl MembershipHandler for NoopHandler {
    async fn on_join(&self, _member: &Member) {}
    async fn on_leave(&self, _member: &Member) {}
}

/// Translates membership changes into consensus configuration changes.
///
/// Leader-only: followers ignore events because the actual leader
/// observes the same gossip. Both directions are idempotent on the
/// consensus side, so replayed or duplicated notifications are safe.
pub struct StoreBridge {
    store: Arc<Store>,
    local_id: String,
}

impl StoreBridge {
    pub fn new(store: Arc<Store>, local_id: impl Into<String>) -> Self {
        Self { store, local_id: local_id.into() }
    }
}

#[async_trait]
impl MembershipHandler for StoreBridge {
    async fn on_join(&self, member: &Member) {
        if member.id == self.local_id {
            return;
        }
        if !self.store.is_leader() {
            debug!(peer = %member.id, "ignoring join, not the leader");
            return;
        }

        let addr = member.consensus_addr();
        info!(peer = %member.id, addr = %addr, "adding gossip member as consensus voter");
        if let Err(e) = self.store.join_peer(&member.id, &addr).await {
            warn!(peer = %member.id, error = %e, "failed to add voter");
        }
    }

    async fn on_leave(&self, member: &Member) {
        if member.id == self.local_id {
            return;
        }
        if !self.store.is_leader() {
            return;
        }

        info!(peer = %member.id, "removing departed member from consensus");
        if let Err(e) = self.store.remove_peer(&member.id).await {
            warn!(peer = %member.id, error = %e, "failed to remove server");
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
