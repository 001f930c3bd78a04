use std::collections::{BinaryHeap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::config::{EngineConfig, Priority};
use crate::error::OffloadError;
use crate::index::TreeIndex;
use crate::node::{NodeId, RawRecord};
use crate::search::SearchOutcome;
use crate::select::CheckChange;
use crate::visible::VisibleOrder;
use crate::window::{RowView, Window, compute_window, materialize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier pairing a request with its progress and terminal events.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

/// One operation inside a [`Command::BatchUpdate`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOp {
    SetChecked { id: NodeId, value: bool },
    SetExpanded { id: NodeId, value: bool },
}

/// Typed commands crossing the offload boundary.
///
/// Payloads are owned values; nothing is shared with the executor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Replace the executor's tree with one built from `records`.
    Build { records: Vec<RawRecord> },
    ToggleExpand { id: NodeId },
    ToggleCheck { id: NodeId, checked: bool },
    Search { query: String },
    /// Recompute the viewport slice. `generation` is echoed in the result so
    /// the caller can discard responses a newer request has superseded.
    ComputeWindow {
        scroll_offset: u64,
        viewport_extent: u64,
        generation: u64,
    },
    /// Large mutation applied in chunks, yielding between them.
    BatchUpdate { ops: Vec<BatchOp> },
}

/// Terminal payload of a successfully executed command.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutput {
    Built {
        node_count: usize,
    },
    ExpandToggled {
        id: NodeId,
        /// New expansion state, or `None` for unknown ids.
        expanded: Option<bool>,
        visible_count: usize,
    },
    CheckToggled {
        changes: Vec<CheckChange>,
    },
    SearchDone {
        outcome: SearchOutcome,
    },
    WindowComputed {
        generation: u64,
        window: Window,
        rows: Vec<RowView>,
    },
    BatchApplied {
        processed: usize,
    },
}

/// Events flowing back from the executor.
///
/// Per command: zero or more `Progress` events, then exactly one `Done` or
/// `Failed`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum OffloadEvent {
    Progress {
        command: CommandId,
        processed: usize,
        total: usize,
    },
    Done {
        command: CommandId,
        output: CommandOutput,
    },
    Failed {
        command: CommandId,
        error: String,
    },
}

fn priority_of(command: &Command, config: &EngineConfig) -> Priority {
    let table = &config.priorities;
    match command {
        Command::Build { .. } => table.build,
        Command::ToggleExpand { .. } => table.expand,
        Command::ToggleCheck { .. } => table.check,
        Command::Search { .. } => table.search,
        Command::ComputeWindow { .. } => table.window,
        Command::BatchUpdate { .. } => table.batch,
    }
}

/// A command in flight, with its batch cursor.
#[derive(Debug)]
struct Task {
    id: CommandId,
    command: Command,
    cursor: usize,
}

impl Task {
    fn new(id: CommandId, command: Command) -> Self {
        Self {
            id,
            command,
            cursor: 0,
        }
    }
}

/// Executor-side state: one tree copy, one visible-order cache, the config.
///
/// Constructed once per channel and owned exclusively by whichever context
/// currently runs commands: the worker thread in offloaded mode, the
/// channel itself in fallback mode. There is no ambient state.
#[derive(Debug)]
pub struct ExecutorSession {
    index: TreeIndex,
    order: VisibleOrder,
    config: EngineConfig,
}

impl ExecutorSession {
    /// Creates a session with an empty tree.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            index: TreeIndex::empty(),
            order: VisibleOrder::new(),
            config,
        }
    }

    /// The session's tree, for callers running in fallback mode.
    #[must_use]
    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    /// Mutable access to the session's tree in fallback mode.
    pub fn index_mut(&mut self) -> &mut TreeIndex {
        &mut self.index
    }

    /// Runs one slice of a task.
    ///
    /// Everything except `BatchUpdate` completes in a single slice. A batch
    /// applies at most `batch_chunk_size` operations, reports progress, and
    /// hands the remainder back for re-scheduling. That is the cooperative
    /// yield point letting higher-priority work interleave.
    fn run_slice(&mut self, task: Task, emit: &mut dyn FnMut(OffloadEvent)) -> Option<Task> {
        let Task { id, command, cursor } = task;
        match command {
            Command::Build { records } => {
                match TreeIndex::build(&records) {
                    Ok(index) => {
                        let node_count = index.len();
                        self.index = index;
                        self.order = VisibleOrder::new();
                        emit(OffloadEvent::Done {
                            command: id,
                            output: CommandOutput::Built { node_count },
                        });
                    }
                    // Fatal to this build only; the previous tree stays.
                    Err(err) => emit(OffloadEvent::Failed {
                        command: id,
                        error: err.to_string(),
                    }),
                }
                None
            }
            Command::ToggleExpand { id: node } => {
                let expanded = self.index.toggle_expand(node);
                self.order.ensure(&self.index);
                emit(OffloadEvent::Done {
                    command: id,
                    output: CommandOutput::ExpandToggled {
                        id: node,
                        expanded,
                        visible_count: self.order.len(),
                    },
                });
                None
            }
            Command::ToggleCheck { id: node, checked } => {
                let changes = self.index.toggle_checked(node, checked);
                emit(OffloadEvent::Done {
                    command: id,
                    output: CommandOutput::CheckToggled { changes },
                });
                None
            }
            Command::Search { query } => {
                let outcome = self.index.search(&query);
                emit(OffloadEvent::Done {
                    command: id,
                    output: CommandOutput::SearchDone { outcome },
                });
                None
            }
            Command::ComputeWindow {
                scroll_offset,
                viewport_extent,
                generation,
            } => {
                self.order.ensure(&self.index);
                let window = compute_window(
                    &self.order,
                    scroll_offset,
                    viewport_extent,
                    self.config.row_extent,
                    self.config.overscan_rows,
                );
                let rows = materialize(&self.index, &self.order, &window);
                emit(OffloadEvent::Done {
                    command: id,
                    output: CommandOutput::WindowComputed {
                        generation,
                        window,
                        rows,
                    },
                });
                None
            }
            Command::BatchUpdate { ops } => {
                let total = ops.len();
                let chunk = self.config.batch_chunk_size.max(1);
                let end = cursor.saturating_add(chunk).min(total);
                for op in &ops[cursor..end] {
                    match *op {
                        BatchOp::SetChecked { id, value } => {
                            let _ = self.index.toggle_checked(id, value);
                        }
                        BatchOp::SetExpanded { id, value } => {
                            let _ = self.index.set_expanded(id, value);
                        }
                    }
                }
                emit(OffloadEvent::Progress {
                    command: id,
                    processed: end,
                    total,
                });
                if end == total {
                    emit(OffloadEvent::Done {
                        command: id,
                        output: CommandOutput::BatchApplied { processed: end },
                    });
                    None
                } else {
                    Some(Task {
                        id,
                        command: Command::BatchUpdate { ops },
                        cursor: end,
                    })
                }
            }
        }
    }

    /// Runs a task to completion, slicing batches but never yielding.
    fn run_to_completion(&mut self, task: Task, emit: &mut dyn FnMut(OffloadEvent)) {
        let mut current = Some(task);
        while let Some(task) = current {
            current = self.run_slice(task, emit);
        }
    }
}

struct Queued {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl Queued {
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap; invert so the lowest (priority, seq) pops
    // first: best tier wins, FIFO within a tier.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.key().cmp(&self.key())
    }
}

/// Priority queue over in-flight tasks.
struct Scheduler {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn enqueue(&mut self, priority: Priority, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued {
            priority,
            seq,
            task,
        });
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Runs one slice of the best queued task. A yielded remainder keeps its
    /// original sequence number, so it resumes ahead of later equal-tier
    /// work but behind anything higher-tier.
    fn run_next(
        &mut self,
        session: &mut ExecutorSession,
        emit: &mut dyn FnMut(OffloadEvent),
    ) -> bool {
        let Some(queued) = self.heap.pop() else {
            return false;
        };
        let Queued {
            priority,
            seq,
            task,
        } = queued;
        if let Some(remainder) = session.run_slice(task, emit) {
            self.heap.push(Queued {
                priority,
                seq,
                task: remainder,
            });
        }
        true
    }
}

struct Request {
    id: CommandId,
    command: Command,
}

fn worker_loop(
    mut session: ExecutorSession,
    requests: &Receiver<Request>,
    events: &Sender<OffloadEvent>,
) {
    let mut scheduler = Scheduler::new();
    let mut connected = true;
    loop {
        if scheduler.is_empty() {
            if !connected {
                break;
            }
            match requests.recv() {
                Ok(request) => {
                    let priority = priority_of(&request.command, &session.config);
                    scheduler.enqueue(priority, Task::new(request.id, request.command));
                }
                Err(_) => break,
            }
        }
        // Pick up everything that arrived while the last slice ran, so a
        // fresh high-priority request preempts a yielded batch.
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    let priority = priority_of(&request.command, &session.config);
                    scheduler.enqueue(priority, Task::new(request.id, request.command));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    connected = false;
                    break;
                }
            }
        }
        let mut caller_gone = false;
        let _ = scheduler.run_next(&mut session, &mut |event| {
            if events.send(event).is_err() {
                caller_gone = true;
            }
        });
        if caller_gone {
            break;
        }
    }
}

enum Backend {
    Worker {
        requests: Sender<Request>,
        events: Receiver<OffloadEvent>,
        _handle: thread::JoinHandle<()>,
    },
    Inline {
        session: Box<ExecutorSession>,
        pending: VecDeque<OffloadEvent>,
    },
}

/// Asynchronous boundary between the interactive caller and the executor.
///
/// Commands are submitted with a priority taken from the config table and
/// answered with [`OffloadEvent`]s; only owned payloads cross. If the worker
/// cannot be spawned (or dies), the channel degrades to running the same
/// session synchronously in-process, logged but never surfaced as a failure.
pub struct OffloadChannel {
    backend: Backend,
    config: EngineConfig,
    next_command: u64,
    window_generation: u64,
}

impl OffloadChannel {
    /// Spawns the executor worker, falling back to in-process execution if
    /// the thread cannot be created.
    #[must_use]
    pub fn spawn(config: EngineConfig) -> Self {
        match Self::try_spawn(config) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!(error = %err, "offload worker unavailable, running in-process");
                Self::inline(config)
            }
        }
    }

    fn try_spawn(config: EngineConfig) -> Result<Self, OffloadError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let session = ExecutorSession::new(config);
        let handle = thread::Builder::new()
            .name("treelist-executor".to_owned())
            .spawn(move || worker_loop(session, &request_rx, &event_tx))
            .map_err(|err| OffloadError::ChannelUnavailable(err.to_string()))?;
        Ok(Self {
            backend: Backend::Worker {
                requests: request_tx,
                events: event_rx,
                _handle: handle,
            },
            config,
            next_command: 0,
            window_generation: 0,
        })
    }

    /// Creates a channel that executes every command synchronously on the
    /// caller's thread. Same protocol, no concurrency.
    #[must_use]
    pub fn inline(config: EngineConfig) -> Self {
        Self {
            backend: Backend::Inline {
                session: Box::new(ExecutorSession::new(config)),
                pending: VecDeque::new(),
            },
            config,
            next_command: 0,
            window_generation: 0,
        }
    }

    /// Returns `true` while commands run on the worker thread.
    #[must_use]
    pub fn is_offloaded(&self) -> bool {
        matches!(self.backend, Backend::Worker { .. })
    }

    /// Submits a command, returning the id its events will carry.
    pub fn submit(&mut self, command: Command) -> CommandId {
        let id = CommandId(self.next_command);
        self.next_command += 1;
        if let Command::ComputeWindow { generation, .. } = &command {
            self.window_generation = self.window_generation.max(*generation);
        }
        let rejected = match &mut self.backend {
            Backend::Worker { requests, .. } => requests
                .send(Request { id, command })
                .err()
                .map(|returned| returned.0),
            Backend::Inline { session, pending } => {
                session.run_to_completion(Task::new(id, command), &mut |event| {
                    pending.push_back(event);
                });
                None
            }
        };
        if let Some(request) = rejected {
            let fault = OffloadError::ExecutorFault("worker thread terminated".to_owned());
            tracing::warn!(error = %fault, "degrading to in-process execution");
            self.degrade_and_run(request.id, request.command);
        }
        id
    }

    /// Submits a viewport recomputation tagged with a fresh generation.
    ///
    /// Returns the command id and the generation; results whose generation
    /// is no longer [`Self::is_current_window`] should be discarded
    /// (last-request-wins).
    pub fn submit_window(&mut self, scroll_offset: u64, viewport_extent: u64) -> (CommandId, u64) {
        self.window_generation += 1;
        let generation = self.window_generation;
        let id = self.submit(Command::ComputeWindow {
            scroll_offset,
            viewport_extent,
            generation,
        });
        (id, generation)
    }

    /// Returns `true` if `generation` is still the newest window request.
    #[must_use]
    pub fn is_current_window(&self, generation: u64) -> bool {
        generation == self.window_generation
    }

    /// Drains every event currently available, without blocking.
    pub fn poll(&mut self) -> Vec<OffloadEvent> {
        match &mut self.backend {
            Backend::Worker { events, .. } => {
                let mut drained = Vec::new();
                while let Ok(event) = events.try_recv() {
                    drained.push(event);
                }
                drained
            }
            Backend::Inline { pending, .. } => pending.drain(..).collect(),
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<OffloadEvent> {
        match &mut self.backend {
            Backend::Worker { events, .. } => events.recv_timeout(timeout).ok(),
            Backend::Inline { pending, .. } => pending.pop_front(),
        }
    }

    // The worker's tree copy is gone with the thread; a fresh session takes
    // over and the caller's next Build repopulates it.
    fn degrade_and_run(&mut self, id: CommandId, command: Command) {
        let mut session = Box::new(ExecutorSession::new(self.config));
        let mut pending = VecDeque::new();
        session.run_to_completion(Task::new(id, command), &mut |event| {
            pending.push_back(event);
        });
        self.backend = Backend::Inline { session, pending };
    }
}
