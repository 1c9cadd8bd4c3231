//! LocalCluster: an in-process substrate for running a network
//!
//! Every node instance runs as a tokio task with its own unbounded inbox.
//! Deliveries to a component are shuffled round-robin across its instances.
//!
//! ## Tracking
//!
//! Each `submit()` starts a tuple tree rooted at a fresh anchor. Every
//! delivery gets its own anchor id mapped to that root, and the root keeps
//! a count of unsettled deliveries. Emissions increment the count before the
//! emitting node settles its own delivery, so a root only reaches zero once
//! its whole tree has been processed. A root with any failed delivery
//! completes as failed, and so does a root whose delivery could not be sent.
//!
//! A node that panics takes its instance down: the delivery it was handling
//! is failed, and so is everything later shuffled to that instance.

use super::cancel::ShutdownToken;
use super::topology::Topology;
use crate::config::ConfigError;
use crate::fact::{Anchor, AnchorId, ChannelId};
use crate::gateway::{EmitError, OutputHandle};
use crate::node::{Node, NodeError};
use crate::schema::{FieldValues, OutputSchema};
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Producer id under which `submit()` emits
pub const INGEST: &str = "ingest";

/// The single channel the ingest producer declares
pub const DEFAULT_STREAM: &str = "default";

struct Component {
    id: ChannelId,
    config: serde_json::Value,
    instances: Vec<Box<dyn Node>>,
}

/// A network under construction.
pub struct LocalCluster {
    topology: Topology,
    components: Vec<Component>,
}

impl LocalCluster {
    pub fn new() -> Self {
        let mut topology = Topology::new();
        // A fresh topology has no components, so this cannot collide.
        let _ = topology.declare(
            ChannelId::from(INGEST),
            OutputSchema::uniform(&[ChannelId::from(DEFAULT_STREAM)]),
        );
        Self {
            topology,
            components: Vec::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Add a component. All instances must share one id; each is
    /// initialized with `config` when the cluster starts.
    pub fn add_node(
        &mut self,
        config: serde_json::Value,
        instances: Vec<Box<dyn Node>>,
    ) -> Result<ChannelId, ConfigError> {
        let first = instances
            .first()
            .ok_or_else(|| ConfigError::Invalid("component needs at least one instance".into()))?;
        let id = first.id().clone();
        if let Some(other) = instances.iter().find(|n| n.id() != &id) {
            return Err(ConfigError::Invalid(format!(
                "instances of '{}' disagree on their id ('{}')",
                id,
                other.id()
            )));
        }
        self.topology.declare(id.clone(), first.declare_outputs())?;
        self.components.push(Component {
            id: id.clone(),
            config,
            instances,
        });
        Ok(id)
    }

    /// Deliver `producer`'s `channel` to `consumer`.
    pub fn subscribe(
        &mut self,
        consumer: impl Into<ChannelId>,
        producer: impl Into<ChannelId>,
        channel: impl Into<ChannelId>,
    ) {
        self.topology.subscribe(consumer, producer, channel);
    }

    /// Validate the wiring, initialize every instance and spawn its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<RunningCluster, ConfigError> {
        self.topology.validate()?;

        let mut routes: HashMap<(ChannelId, ChannelId), Vec<ChannelId>> = HashMap::new();
        for sub in self.topology.subscriptions() {
            routes
                .entry((sub.producer.clone(), sub.channel.clone()))
                .or_default()
                .push(sub.consumer.clone());
        }

        let mut inboxes = HashMap::new();
        let mut receivers = Vec::new();
        for component in &self.components {
            let mut senders = Vec::with_capacity(component.instances.len());
            for _ in &component.instances {
                let (tx, rx) = mpsc::unbounded_channel();
                senders.push(tx);
                receivers.push(rx);
            }
            inboxes.insert(
                component.id.clone(),
                Inbox {
                    senders,
                    next: AtomicUsize::new(0),
                },
            );
        }

        let declared = self
            .topology
            .components()
            .filter_map(|c| self.topology.outputs(c).map(|o| (c.clone(), o.clone())))
            .collect();

        let shared = Arc::new(Shared {
            declared,
            routes,
            inboxes,
            tracker: Tracker::default(),
        });

        let token = ShutdownToken::new();
        let mut workers = Vec::new();
        let mut receivers = receivers.into_iter();
        for component in self.components {
            let total = component.instances.len();
            for (index, mut node) in component.instances.into_iter().enumerate() {
                let output = Arc::new(InstanceOutput {
                    component: component.id.clone(),
                    shared: shared.clone(),
                });
                if let Err(e) = node.initialize(&component.config, output) {
                    token.cancel();
                    return Err(e);
                }
                let inbox = receivers
                    .next()
                    .ok_or_else(|| ConfigError::Invalid(format!("no inbox for '{}'", component.id)))?;
                workers.push(tokio::spawn(run_worker(node, inbox, shared.clone(), token.clone())));
                debug!(component = %component.id, instance = index, of = total, "worker started");
            }
        }

        info!(
            components = shared.inboxes.len(),
            workers = workers.len(),
            "local cluster started"
        );
        Ok(RunningCluster {
            shared,
            token,
            workers,
        })
    }
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters collected while the cluster runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterReport {
    /// Trees started through `submit()`
    pub submitted: usize,
    /// Tuples emitted by nodes
    pub emitted: usize,
    /// Deliveries acknowledged
    pub acks: usize,
    /// Deliveries failed
    pub fails: usize,
    /// Trees fully processed with every delivery acknowledged
    pub completed: usize,
    /// Trees fully processed with at least one failed delivery
    pub failed: usize,
}

impl ClusterReport {
    /// Trees still being processed
    pub fn pending(&self) -> usize {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

/// A started cluster.
pub struct RunningCluster {
    shared: Arc<Shared>,
    token: ShutdownToken,
    workers: Vec<JoinHandle<()>>,
}

impl RunningCluster {
    /// Emit `values` from the ingest producer, starting a new tuple tree.
    pub fn submit(&self, values: FieldValues) -> Result<AnchorId, EmitError> {
        if self.token.is_cancelled() {
            return Err(EmitError::Closed);
        }
        let root = AnchorId::new();
        let ingest = ChannelId::from(INGEST);
        let consumers = self.shared.consumers(&ingest, &ChannelId::from(DEFAULT_STREAM));

        let tracker = &self.shared.tracker;
        tracker.submitted.fetch_add(1, Ordering::Relaxed);
        tracker.pending.insert(root, consumers.len());
        if consumers.is_empty() {
            debug!(root = %root, "no subscribers on ingest, fact dropped");
            tracker.complete(root);
            return Ok(root);
        }

        self.shared.fan_out(&ingest, consumers, root, &values)?;
        trace!(root = %root, "fact submitted");
        Ok(root)
    }

    /// Resolves once every submitted tree has been fully processed.
    pub async fn wait_idle(&self) {
        let tracker = &self.shared.tracker;
        loop {
            let notified = tracker.idle.notified();
            if tracker.pending.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn report(&self) -> ClusterReport {
        self.shared.tracker.report()
    }

    /// Roots that completed as failed since the last call, oldest first
    pub fn take_failed_roots(&self) -> Vec<AnchorId> {
        let mut failed = self
            .shared
            .tracker
            .failed_roots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *failed)
    }

    /// Stop every worker, shutting down its node, and return the final counters.
    pub async fn shutdown(self) -> ClusterReport {
        self.token.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker panicked");
            }
        }
        let report = self.shared.tracker.report();
        info!(?report, "local cluster stopped");
        report
    }
}

struct Delivery {
    anchor: Anchor,
    values: FieldValues,
}

struct Inbox {
    senders: Vec<mpsc::UnboundedSender<Delivery>>,
    next: AtomicUsize,
}

impl Inbox {
    fn pick(&self) -> &mpsc::UnboundedSender<Delivery> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        &self.senders[i]
    }
}

struct Shared {
    declared: HashMap<ChannelId, OutputSchema>,
    routes: HashMap<(ChannelId, ChannelId), Vec<ChannelId>>,
    inboxes: HashMap<ChannelId, Inbox>,
    tracker: Tracker,
}

impl Shared {
    fn consumers(&self, producer: &ChannelId, channel: &ChannelId) -> &[ChannelId] {
        self.routes
            .get(&(producer.clone(), channel.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Deliver to each consumer. The caller must already have counted every
    /// delivery in `pending`; on error the undelivered ones are released.
    fn fan_out(
        &self,
        producer: &ChannelId,
        consumers: &[ChannelId],
        root: AnchorId,
        values: &FieldValues,
    ) -> Result<(), EmitError> {
        for (i, consumer) in consumers.iter().enumerate() {
            if let Err(e) = self.deliver(producer, consumer, root, values.clone()) {
                for _ in i + 1..consumers.len() {
                    self.tracker.release(root);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Send one delivery to `consumer`, counted against `root`.
    fn deliver(
        &self,
        producer: &ChannelId,
        consumer: &ChannelId,
        root: AnchorId,
        values: FieldValues,
    ) -> Result<(), EmitError> {
        let child = AnchorId::new();
        self.tracker.roots.insert(child, root);
        let sent = self
            .inboxes
            .get(consumer)
            .ok_or(EmitError::Closed)
            .and_then(|inbox| {
                inbox
                    .pick()
                    .send(Delivery {
                        anchor: Anchor::with_id(child, producer.clone()),
                        values,
                    })
                    .map_err(|_| EmitError::Closed)
            });
        if sent.is_err() {
            warn!(consumer = %consumer, root = %root, "delivery could not be sent");
            self.tracker.roots.remove(&child);
            self.tracker.failing.insert(root);
            self.tracker.release(root);
        }
        sent
    }
}

#[derive(Default)]
struct Tracker {
    /// Delivery anchor -> tree root
    roots: DashMap<AnchorId, AnchorId>,
    /// Tree root -> unsettled deliveries
    pending: DashMap<AnchorId, usize>,
    /// Roots still in flight that already saw a failure
    failing: DashSet<AnchorId>,
    /// Failed roots not yet taken by the caller
    failed_roots: Mutex<Vec<AnchorId>>,
    idle: Notify,
    submitted: AtomicUsize,
    emitted: AtomicUsize,
    acks: AtomicUsize,
    fails: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl Tracker {
    fn root_of(&self, anchor: AnchorId) -> Option<AnchorId> {
        self.roots.get(&anchor).map(|r| *r)
    }

    fn settle(&self, anchor: &Anchor, failed: bool) {
        let Some((_, root)) = self.roots.remove(&anchor.id) else {
            debug!(anchor = %anchor.id, "settle for unknown anchor ignored");
            return;
        };
        if failed {
            self.fails.fetch_add(1, Ordering::Relaxed);
            self.failing.insert(root);
        } else {
            self.acks.fetch_add(1, Ordering::Relaxed);
        }
        self.release(root);
    }

    /// One delivery of `root` is done.
    fn release(&self, root: AnchorId) {
        let done = match self.pending.get_mut(&root) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if done {
            self.complete(root);
        }
    }

    fn complete(&self, root: AnchorId) {
        if self.pending.remove_if(&root, |_, count| *count == 0).is_none() {
            return;
        }
        if self.failing.remove(&root).is_some() {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.failed_roots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(root);
            debug!(root = %root, "tree failed");
        } else {
            self.completed.fetch_add(1, Ordering::Relaxed);
            trace!(root = %root, "tree completed");
        }
        if self.pending.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn report(&self) -> ClusterReport {
        ClusterReport {
            submitted: self.submitted.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// The `OutputHandle` given to one node instance.
struct InstanceOutput {
    component: ChannelId,
    shared: Arc<Shared>,
}

impl OutputHandle for InstanceOutput {
    fn emit(&self, channel: &ChannelId, anchor: &Anchor, values: FieldValues) -> Result<(), EmitError> {
        let declared = self
            .shared
            .declared
            .get(&self.component)
            .is_some_and(|schema| schema.contains(channel));
        if !declared {
            return Err(EmitError::UndeclaredChannel(channel.clone()));
        }

        let tracker = &self.shared.tracker;
        let root = tracker.root_of(anchor.id).ok_or(EmitError::AnchorNotOpen(anchor.id))?;
        let consumers = self.shared.consumers(&self.component, channel);
        if consumers.is_empty() {
            trace!(producer = %self.component, channel = %channel, "no subscribers, tuple dropped");
        }

        match tracker.pending.get_mut(&root) {
            Some(mut count) => *count += consumers.len(),
            None => return Err(EmitError::AnchorNotOpen(anchor.id)),
        }
        self.shared.fan_out(&self.component, consumers, root, &values)?;
        tracker.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn ack(&self, anchor: &Anchor) {
        self.shared.tracker.settle(anchor, false);
    }

    fn fail(&self, anchor: &Anchor) {
        self.shared.tracker.settle(anchor, true);
    }
}

async fn run_worker(
    node: Box<dyn Node>,
    mut inbox: mpsc::UnboundedReceiver<Delivery>,
    shared: Arc<Shared>,
    token: ShutdownToken,
) {
    let id = node.id().clone();
    let mut node = Some(node);
    loop {
        let delivery = tokio::select! {
            _ = token.cancelled() => break,
            delivery = inbox.recv() => match delivery {
                Some(d) => d,
                None => break,
            },
        };
        let Some(current) = node.take() else {
            debug!(node = %id, anchor = %delivery.anchor.id, "instance is down, delivery failed");
            shared.tracker.settle(&delivery.anchor, true);
            continue;
        };
        let anchor = delivery.anchor.clone();
        match tokio::spawn(process(current, delivery)).await {
            Ok((current, result)) => {
                if let Err(e) = result {
                    error!(node = %id, anchor = %anchor.id, error = %e, "node failed to settle delivery");
                    shared.tracker.settle(&anchor, true);
                }
                node = Some(current);
            }
            Err(e) => {
                error!(node = %id, anchor = %anchor.id, error = %e, "node panicked, instance is down");
                shared.tracker.settle(&anchor, true);
            }
        }
    }
    if let Some(mut node) = node {
        node.shutdown();
    }
}

/// Run one delivery on its own task so a panicking node surfaces as a `JoinError`.
async fn process(
    mut node: Box<dyn Node>,
    delivery: Delivery,
) -> (Box<dyn Node>, Result<(), NodeError>) {
    let result = node.on_fact(&delivery.anchor, &delivery.values).await.map(|_| ());
    (node, result)
}
