// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gossip engine: probe loop, datagram handling, and merge rules.
//!
//! Lock order is local → members → updates; ack and join waiters are
//! independent. Merge functions run under the locks and return
//! notifications; handler callbacks are spawned after release.

use crate::bridge::MembershipHandler;
use crate::config::ClusterConfig;
use crate::proto::{Datagram, Gossip, Member, MemberState};
use orion_core::NodeMeta;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the gossip layer.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("gossip bind failed: {0}")]
    Bind(std::io::Error),

    #[error("seed resolution failed: {0}")]
    Resolve(String),

    #[error("no seed could be joined")]
    JoinFailed,

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

struct MemberEntry {
    member: Member,
    suspect_since: Option<Instant>,
}

/// Pending rebroadcasts, one slot per member id.
#[derive(Default)]
struct UpdateQueue {
    items: Vec<(Member, u32)>,
}

impl UpdateQueue {
    fn push(&mut self, member: Member, limit: u32) {
        self.items.retain(|(m, _)| m.id != member.id);
        self.items.push((member, limit.max(1)));
    }

    fn take(&mut self, max: usize) -> Vec<Member> {
        let mut out = Vec::new();
        for item in self.items.iter_mut().take(max) {
            out.push(item.0.clone());
            item.1 -= 1;
        }
        self.items.retain(|(_, remaining)| *remaining > 0);
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items.len()
    }
}

enum Notify {
    Join(Member),
    Leave(Member),
    Update(Member),
}

fn state_rank(state: MemberState) -> u8 {
    match state {
        MemberState::Alive => 0,
        MemberState::Suspect => 1,
        MemberState::Dead => 2,
        MemberState::Left => 3,
    }
}

struct Inner {
    config: ClusterConfig,
    local: Mutex<Member>,
    members: Mutex<HashMap<String, MemberEntry>>,
    updates: Mutex<UpdateQueue>,
    socket: UdpSocket,
    handler: Arc<dyn MembershipHandler>,
    seq: AtomicU64,
    acks: Mutex<HashMap<u64, oneshot::Sender<()>>>,
    join_waiters: Mutex<HashMap<SocketAddr, oneshot::Sender<()>>>,
    /// Local-health score: 0 is healthy; each point widens probe
    /// timeouts by one multiple, capped by the awareness ceiling.
    awareness: AtomicU32,
    probe_queue: Mutex<Vec<String>>,
    cancel: CancellationToken,
}

impl Inner {
    fn local_id(&self) -> String {
        self.local.lock().id.clone()
    }

    /// Members including self; n for timeout and retransmit scaling.
    fn cluster_size(&self) -> usize {
        self.members.lock().len() + 1
    }

    fn enqueue_update(&self, member: Member) {
        let limit = self.config.retransmit_limit(self.cluster_size());
        self.updates.lock().push(member, limit);
    }

    /// Apply one member report, returning notifications to dispatch.
    ///
    /// `observed_addr` overrides the advertised address with the
    /// datagram's source; first-hand observation beats hearsay and
    /// makes wildcard binds workable.
    fn merge_member(&self, mut incoming: Member, observed_addr: Option<SocketAddr>) -> Vec<Notify> {
        let mut notifications = Vec::new();

        // Reports about ourselves: refute suspicion by re-advertising
        // with a higher incarnation.
        let refutation = {
            let mut local = self.local.lock();
            if incoming.id == local.id {
                if matches!(incoming.state, MemberState::Suspect | MemberState::Dead)
                    && incoming.incarnation >= local.incarnation
                {
                    local.incarnation = incoming.incarnation + 1;
                    Some(local.clone())
                } else {
                    return notifications;
                }
            } else {
                None
            }
        };
        if let Some(refutation) = refutation {
            info!(incarnation = refutation.incarnation, "refuting suspicion about self");
            self.enqueue_update(refutation);
            return notifications;
        }

        if let Some(addr) = observed_addr {
            incoming.addr = addr;
        }

        let mut members = self.members.lock();
        let existing = members.get(&incoming.id).map(|e| e.member.clone());

        // Incarnation numbers order conflicting reports; at equal
        // incarnation the worse state wins.
        if let Some(current) = &existing {
            let newer = incoming.incarnation > current.incarnation
                || (incoming.incarnation == current.incarnation
                    && state_rank(incoming.state) > state_rank(current.state));
            if !newer {
                return notifications;
            }
        }

        let changed = match incoming.state {
            MemberState::Alive | MemberState::Suspect => match existing {
                None => {
                    debug!(member = %incoming.id, state = %incoming.state, "learned new member");
                    notifications.push(Notify::Join(incoming.clone()));
                    members.insert(
                        incoming.id.clone(),
                        MemberEntry {
                            suspect_since: (incoming.state == MemberState::Suspect)
                                .then(Instant::now),
                            member: incoming.clone(),
                        },
                    );
                    true
                }
                Some(current) => {
                    if incoming.state == MemberState::Alive
                        && incoming.incarnation > current.incarnation
                        && incoming.meta != current.meta
                    {
                        notifications.push(Notify::Update(incoming.clone()));
                    }
                    if let Some(entry) = members.get_mut(&incoming.id) {
                        entry.member = incoming.clone();
                        match incoming.state {
                            MemberState::Suspect => {
                                if entry.suspect_since.is_none() {
                                    entry.suspect_since = Some(Instant::now());
                                }
                            }
                            _ => entry.suspect_since = None,
                        }
                    }
                    true
                }
            },
            MemberState::Dead | MemberState::Left => {
                if existing.is_some() {
                    members.remove(&incoming.id);
                    notifications.push(Notify::Leave(incoming.clone()));
                    true
                } else {
                    // A death notice for a member we never knew.
                    false
                }
            }
        };
        drop(members);

        if changed {
            self.enqueue_update(incoming);
        }
        notifications
    }

    /// Everything we know, self included, for join replies.
    fn full_state(&self) -> Vec<Member> {
        let mut all = vec![self.local.lock().clone()];
        all.extend(self.members.lock().values().map(|e| e.member.clone()));
        all
    }

    fn awareness_better(&self) {
        let _ = self
            .awareness
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    fn awareness_worse(&self) {
        let ceiling = self.config.awareness_max_multiplier.saturating_sub(1);
        let _ = self.awareness.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            (v < ceiling).then_some(v + 1)
        });
    }

    fn probe_timeout(&self) -> Duration {
        self.config.probe_timeout * (self.awareness.load(Ordering::Relaxed) + 1)
    }
}

/// Handle to a running gossip member.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<Inner>,
}

impl Cluster {
    /// Bind the gossip socket and start the probe and receive loops.
    pub async fn new(
        config: ClusterConfig,
        meta: NodeMeta,
        handler: Arc<dyn MembershipHandler>,
    ) -> Result<Cluster, ClusterError> {
        let socket = UdpSocket::bind(&config.bind_addr).await.map_err(ClusterError::Bind)?;
        let local_addr = socket.local_addr().map_err(ClusterError::Bind)?;

        // A wildcard bind address is unroutable for peers; advertise a
        // concrete interface address instead.
        let advertise = if local_addr.ip().is_unspecified() {
            match detect_advertise_ip().await {
                Some(ip) => SocketAddr::new(ip, local_addr.port()),
                None => local_addr,
            }
        } else {
            local_addr
        };

        let local = Member {
            id: meta.id.clone(),
            addr: advertise,
            meta,
            incarnation: 1,
            state: MemberState::Alive,
        };
        info!(id = %local.id, addr = %advertise, "gossip listening");

        let inner = Arc::new(Inner {
            config,
            local: Mutex::new(local),
            members: Mutex::new(HashMap::new()),
            updates: Mutex::new(UpdateQueue::default()),
            socket,
            handler,
            seq: AtomicU64::new(1),
            acks: Mutex::new(HashMap::new()),
            join_waiters: Mutex::new(HashMap::new()),
            awareness: AtomicU32::new(0),
            probe_queue: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(recv_loop(Arc::clone(&inner)));
        tokio::spawn(probe_loop(Arc::clone(&inner)));

        Ok(Cluster { inner })
    }

    /// Address the gossip socket actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local.lock().addr
    }

    /// The local member record.
    pub fn local_member(&self) -> Member {
        self.inner.local.lock().clone()
    }

    /// Contact seeds and pull their member lists. Returns how many
    /// seeds answered; errors only when every seed failed.
    pub async fn join(&self, seeds: &[String]) -> Result<usize, ClusterError> {
        let mut joined = 0;
        for seed in seeds {
            let addr = match tokio::net::lookup_host(seed.as_str()).await {
                Ok(mut addrs) => match addrs.next() {
                    Some(addr) => addr,
                    None => return Err(ClusterError::Resolve(format!("no address for {seed}"))),
                },
                Err(e) => return Err(ClusterError::Resolve(format!("{seed}: {e}"))),
            };

            let (tx, rx) = oneshot::channel();
            self.inner.join_waiters.lock().insert(addr, tx);
            let local = self.inner.local.lock().clone();
            send_datagram(&self.inner, Gossip::Join { from: local }, addr).await;

            match tokio::time::timeout(self.inner.config.join_timeout, rx).await {
                Ok(Ok(())) => {
                    info!(seed = %seed, "joined cluster");
                    joined += 1;
                }
                _ => {
                    self.inner.join_waiters.lock().remove(&addr);
                    warn!(seed = %seed, "join attempt timed out");
                }
            }
        }

        if joined == 0 && !seeds.is_empty() {
            return Err(ClusterError::JoinFailed);
        }
        Ok(joined)
    }

    /// Announce departure to every known member, wait out the given
    /// grace period, then stop the loops.
    pub async fn leave(&self, timeout: Duration) -> Result<(), ClusterError> {
        let (id, incarnation) = {
            let local = self.inner.local.lock();
            (local.id.clone(), local.incarnation)
        };
        let peers: Vec<SocketAddr> =
            self.inner.members.lock().values().map(|e| e.member.addr).collect();

        info!(id = %id, "leaving cluster");
        for addr in peers {
            send_datagram(
                &self.inner,
                Gossip::Leave { id: id.clone(), incarnation },
                addr,
            )
            .await;
        }

        tokio::time::sleep(timeout.min(Duration::from_millis(500))).await;
        self.inner.cancel.cancel();
        Ok(())
    }

    /// Current member list (self plus alive and suspect members).
    pub fn members(&self) -> Vec<Member> {
        let mut all = vec![self.inner.local.lock().clone()];
        all.extend(self.inner.members.lock().values().map(|e| e.member.clone()));
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

fn dispatch_notifications(inner: &Arc<Inner>, notifications: Vec<Notify>) {
    for notification in notifications {
        let handler = Arc::clone(&inner.handler);
        tokio::spawn(async move {
            match notification {
                Notify::Join(member) => handler.on_join(&member).await,
                Notify::Leave(member) => handler.on_leave(&member).await,
                Notify::Update(member) => handler.on_update(&member).await,
            }
        });
    }
}

async fn send_datagram(inner: &Arc<Inner>, msg: Gossip, to: SocketAddr) {
    let updates = inner.updates.lock().take(inner.config.piggyback_limit);
    let datagram = Datagram { msg, updates };
    match datagram.encode() {
        Ok(bytes) => {
            if let Err(e) = inner.socket.send_to(&bytes, to).await {
                debug!(to = %to, error = %e, "gossip send failed");
            }
        }
        Err(e) => error!(error = %e, "gossip encode failed"),
    }
}

async fn recv_loop(inner: Arc<Inner>) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            result = inner.socket.recv_from(&mut buf) => match result {
                Ok((len, src)) => match Datagram::decode(&buf[..len]) {
                    Ok(datagram) => handle_datagram(&inner, datagram, src).await,
                    Err(e) => debug!(from = %src, error = %e, "undecodable datagram"),
                },
                Err(e) => warn!(error = %e, "gossip recv error"),
            }
        }
    }
}

async fn handle_datagram(inner: &Arc<Inner>, datagram: Datagram, src: SocketAddr) {
    let mut notifications = Vec::new();
    for update in datagram.updates {
        notifications.extend(inner.merge_member(update, None));
    }

    match datagram.msg {
        Gossip::Ping { seq, .. } => {
            let from = inner.local_id();
            send_datagram(inner, Gossip::Ack { seq, from }, src).await;
        }
        Gossip::Ack { seq, .. } => {
            if let Some(tx) = inner.acks.lock().remove(&seq) {
                let _ = tx.send(());
            }
        }
        Gossip::PingReq { seq, target, .. } => {
            // Probe on the requester's behalf and relay the ack.
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let probe_seq = inner.seq.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                inner.acks.lock().insert(probe_seq, tx);
                let from = inner.local_id();
                send_datagram(&inner, Gossip::Ping { seq: probe_seq, from }, target.addr).await;

                let acked =
                    tokio::time::timeout(inner.config.probe_timeout, rx).await.is_ok();
                inner.acks.lock().remove(&probe_seq);
                if acked {
                    let from = inner.local_id();
                    send_datagram(&inner, Gossip::Ack { seq, from }, src).await;
                }
            });
        }
        Gossip::Join { from } => {
            notifications.extend(inner.merge_member(from, Some(src)));
            let members = inner.full_state();
            send_datagram(inner, Gossip::JoinReply { members }, src).await;
        }
        Gossip::JoinReply { members } => {
            for member in members {
                notifications.extend(inner.merge_member(member, None));
            }
            if let Some(tx) = inner.join_waiters.lock().remove(&src) {
                let _ = tx.send(());
            }
        }
        Gossip::Leave { id, incarnation } => {
            let known = inner.members.lock().get(&id).map(|e| e.member.clone());
            if let Some(mut member) = known {
                member.state = MemberState::Left;
                member.incarnation = incarnation;
                notifications.extend(inner.merge_member(member, None));
            }
        }
    }

    dispatch_notifications(inner, notifications);
}

async fn probe_loop(inner: Arc<Inner>) {
    let mut interval = tokio::time::interval(inner.config.probe_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = interval.tick() => probe_round(&inner).await,
        }
    }
}

async fn probe_round(inner: &Arc<Inner>) {
    sweep_suspects(inner);

    let Some(target) = next_probe_target(inner) else {
        return;
    };

    let seq = inner.seq.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    inner.acks.lock().insert(seq, tx);

    let from = inner.local_id();
    send_datagram(inner, Gossip::Ping { seq, from: from.clone() }, target.addr).await;

    if tokio::time::timeout(inner.probe_timeout(), rx).await.is_ok() {
        inner.acks.lock().remove(&seq);
        inner.awareness_better();
        return;
    }

    // Direct probe failed; ask witnesses to check before suspecting.
    let witnesses: Vec<Member> = {
        let members = inner.members.lock();
        let mut candidates: Vec<Member> = members
            .values()
            .filter(|e| e.member.id != target.id && e.member.state == MemberState::Alive)
            .map(|e| e.member.clone())
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(inner.config.indirect_checks);
        candidates
    };

    if !witnesses.is_empty() {
        let (tx, rx) = oneshot::channel();
        inner.acks.lock().insert(seq, tx);
        for witness in &witnesses {
            send_datagram(
                inner,
                Gossip::PingReq { seq, from: from.clone(), target: target.clone() },
                witness.addr,
            )
            .await;
        }
        if tokio::time::timeout(inner.probe_timeout() * 2, rx).await.is_ok() {
            inner.acks.lock().remove(&seq);
            inner.awareness_better();
            return;
        }
    }

    inner.acks.lock().remove(&seq);
    inner.awareness_worse();
    suspect_member(inner, &target.id);
}

fn suspect_member(inner: &Arc<Inner>, id: &str) {
    let suspected = {
        let mut members = inner.members.lock();
        match members.get_mut(id) {
            Some(entry) if entry.member.state == MemberState::Alive => {
                entry.member.state = MemberState::Suspect;
                entry.suspect_since = Some(Instant::now());
                Some(entry.member.clone())
            }
            _ => None,
        }
    };
    if let Some(member) = suspected {
        warn!(member = %member.id, "member failed probes, now suspect");
        inner.enqueue_update(member);
    }
}

fn sweep_suspects(inner: &Arc<Inner>) {
    let timeout = inner.config.suspicion_timeout(inner.cluster_size());
    let expired: Vec<Member> = {
        let members = inner.members.lock();
        members
            .values()
            .filter(|e| {
                e.member.state == MemberState::Suspect
                    && e.suspect_since.map(|t| t.elapsed() >= timeout).unwrap_or(false)
            })
            .map(|e| e.member.clone())
            .collect()
    };

    let mut notifications = Vec::new();
    for mut member in expired {
        warn!(member = %member.id, "suspicion expired, declaring dead");
        member.state = MemberState::Dead;
        notifications.extend(inner.merge_member(member, None));
    }
    dispatch_notifications(inner, notifications);
}

/// Routable local address, discovered by the routing table without
/// sending any packets.
async fn detect_advertise_ip() -> Option<std::net::IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    probe.connect("8.8.8.8:80").await.ok()?;
    probe.local_addr().ok().map(|addr| addr.ip())
}

fn next_probe_target(inner: &Arc<Inner>) -> Option<Member> {
    let members = inner.members.lock();
    if members.is_empty() {
        return None;
    }

    let mut queue = inner.probe_queue.lock();
    loop {
        match queue.pop() {
            Some(id) => {
                if let Some(entry) = members.get(&id) {
                    if entry.member.state != MemberState::Dead {
                        return Some(entry.member.clone());
                    }
                }
            }
            None => {
                let mut ids: Vec<String> = members.keys().cloned().collect();
                ids.shuffle(&mut rand::thread_rng());
                *queue = ids;
                if queue.is_empty() {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
