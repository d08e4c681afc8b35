// SPDX-License-Identifier: Apache-2.0

//! Behaviour shared by every source driver.
//!
//! Concrete drivers embed a [`SourceDriver`] and delegate to its `*_method`
//! functions for the generic parts of their lifecycle, the same way they
//! delegate message queuing to a [`SourceQueue`].

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bounded_channel::{BoundedSender, SendError};
use crate::config::GlobalConfig;
use crate::sources::get_meter;
use crate::topology::message::{LogMessage, PathOptions};
use crate::topology::pipe::{PipeError, PipeId, PipeState, Transition};

/// Counters for one source
struct QueueMetrics {
    queued: Counter<u64>,
    dropped: Counter<u64>,
    tags: Vec<KeyValue>,
    queued_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl QueueMetrics {
    fn new(tags: Vec<KeyValue>) -> Self {
        Self {
            queued: get_meter()
                .u64_counter("filesource_queued_messages")
                .with_description("Number of messages pushed into the pipeline by a source.")
                .with_unit("messages")
                .build(),
            dropped: get_meter()
                .u64_counter("filesource_dropped_messages")
                .with_description(
                    "Number of messages a source could not push into the pipeline.",
                )
                .with_unit("messages")
                .build(),
            tags,
            queued_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    fn add_queued(&self) {
        self.queued.add(1, &self.tags);
        self.queued_total.fetch_add(1, Ordering::Relaxed);
    }

    fn add_dropped(&self) {
        self.dropped.add(1, &self.tags);
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// The generic message queuing path of a source.
///
/// Safe to call from reader callbacks: it never blocks. Messages are only
/// accepted between [`SourceQueue::start`] and [`SourceQueue::stop`], which
/// the owning driver calls from its init and deinit. When the queue is stopped
/// or the pipeline channel is full or gone the message is dropped and counted.
pub struct SourceQueue {
    output: Option<BoundedSender<LogMessage>>,
    running: AtomicBool,
    metrics: QueueMetrics,
}

impl SourceQueue {
    pub fn new(output: Option<BoundedSender<LogMessage>>, tags: Vec<KeyValue>) -> Self {
        Self {
            output,
            running: AtomicBool::new(false),
            metrics: QueueMetrics::new(tags),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns true if the message was handed to the pipeline.
    pub fn queue(&self, msg: LogMessage, path_options: &PathOptions) -> bool {
        if !self.is_running() {
            debug!("Source is not running, dropping message");
            self.metrics.add_dropped();
            return false;
        }

        let Some(output) = &self.output else {
            // No output configured, just discard
            self.metrics.add_dropped();
            return false;
        };

        match output.try_send(msg) {
            Ok(()) => {
                self.metrics.add_queued();
                true
            }
            Err(SendError::Full) => {
                debug!(
                    flow_control = path_options.flow_control_requested,
                    "Pipeline channel full, dropping message"
                );
                self.metrics.add_dropped();
                false
            }
            Err(SendError::Disconnected) => {
                debug!("Pipeline channel disconnected, dropping message");
                self.metrics.add_dropped();
                false
            }
        }
    }

    pub fn queued(&self) -> u64 {
        self.metrics.queued_total.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.metrics.dropped_total.load(Ordering::Relaxed)
    }
}

/// Generic source driver record embedded in every concrete source driver.
pub struct SourceDriver {
    id: PipeId,
    stats_source: &'static str,
    group: Option<String>,
    state: PipeState,
    queue: Arc<SourceQueue>,
}

impl SourceDriver {
    pub fn new(
        stats_source: &'static str,
        group: Option<String>,
        output: Option<BoundedSender<LogMessage>>,
    ) -> Self {
        let mut tags = vec![KeyValue::new("source", stats_source)];
        if let Some(group) = &group {
            tags.push(KeyValue::new("group", group.clone()));
        }

        Self {
            id: PipeId::next(),
            stats_source,
            group,
            state: PipeState::Uninitialized,
            queue: Arc::new(SourceQueue::new(output, tags)),
        }
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    pub fn stats_source(&self) -> &'static str {
        self.stats_source
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    /// Handle to the queuing path, for upstream pipes that forward into this driver.
    pub fn queue_handle(&self) -> Arc<SourceQueue> {
        self.queue.clone()
    }

    pub fn init_method(&mut self, cfg: &GlobalConfig) -> Result<(), PipeError> {
        self.state = self.state.next(Transition::Init)?;
        self.queue.start();
        info!(
            pipe = %self.id,
            source = self.stats_source,
            group = self.group.as_deref().unwrap_or(""),
            config_version = %cfg.version,
            "Source driver initialized"
        );
        Ok(())
    }

    pub fn deinit_method(&mut self) -> Result<(), PipeError> {
        self.state = self.state.next(Transition::Deinit)?;
        self.queue.stop();
        info!(
            pipe = %self.id,
            source = self.stats_source,
            queued = self.queue.queued(),
            dropped = self.queue.dropped(),
            "Source driver deinitialized"
        );
        Ok(())
    }

    pub fn queue_method(&self, msg: LogMessage, path_options: &PathOptions) {
        self.queue.queue(msg, path_options);
    }

    pub fn free_method(&mut self) -> Result<(), PipeError> {
        self.state = self.state.next(Transition::Free)?;
        debug!(pipe = %self.id, source = self.stats_source, "Source driver freed");
        Ok(())
    }
}
