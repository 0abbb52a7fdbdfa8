//! The MAIL runtime core.
//!
//! One [`MailRuntime`] exists per tenant. It owns the priority queue, the
//! pending per-task futures, the per-agent conversation histories, the event
//! buffer and the shutdown signal. The dispatcher loop dequeues one message
//! at a time and spawns an independent dispatch task per resolved recipient;
//! agent turns therefore run concurrently across agents while history
//! mutation stays serialized per agent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::{oneshot, watch, Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{AgentError, RuntimeError};
use crate::domain::models::{
    action_complete_broadcast, call_to_message, render_incoming, split_address, trim_history,
    Address, EventKind, HistoryEntry, MailMessage, MailTool, MessageBody, MessageKind,
    MessageQueue, TaskEvent, ToolCallRecord, ALL_AGENTS,
};
use crate::domain::ports::{
    ActionOverride, ActionRegistry, AgentMemory, AgentRoster, InterswarmTransport, ToolChoice,
};
use crate::services::action_executor::execute_action_tool;
use crate::services::events::EventStream;

/// Default wait for a task response.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Heartbeat cadence for idle event streams.
const STREAM_HEARTBEAT: Duration = Duration::from_secs(15);

/// How long shutdown waits for in-flight dispatch tasks.
const SHUTDOWN_TASK_GRACE: Duration = Duration::from_secs(30);

/// Additional grace for cancelled dispatch tasks to unwind.
const SHUTDOWN_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Stub tool-response appended for every message-producing MAIL tool call.
const MESSAGE_SENT_STUB: &str =
    "Message sent. The response, if any, will be sent in the next user message.";

/// Static identity of one runtime instance.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Namespaced tenant id this runtime serves.
    pub user_id: String,
    /// Name of the local swarm.
    pub swarm_name: String,
    /// Default agent user-submitted requests are routed to.
    pub entrypoint: String,
}

impl RuntimeConfig {
    pub fn new(
        user_id: impl Into<String>,
        swarm_name: impl Into<String>,
        entrypoint: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            swarm_name: swarm_name.into(),
            entrypoint: entrypoint.into(),
        }
    }
}

type PendingMap = HashMap<Uuid, oneshot::Sender<MailMessage>>;
type HistoryCell = Arc<Mutex<Vec<HistoryEntry>>>;

/// Runtime for an individual MAIL swarm tenant.
///
/// Drives the local message queue, executes agent turns and interprets the
/// tool calls they emit.
pub struct MailRuntime {
    agents: AgentRoster,
    actions: ActionRegistry,
    user_id: String,
    swarm_name: String,
    entrypoint: String,

    queue: Mutex<MessageQueue>,
    queue_notify: Notify,
    unfinished: AtomicI64,
    pending: Mutex<PendingMap>,
    histories: std::sync::Mutex<HashMap<String, HistoryCell>>,
    events: Arc<EventStream>,
    tasks: Mutex<JoinSet<()>>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    is_running: AtomicBool,

    router: Option<Arc<dyn InterswarmTransport>>,
    memory: Option<Arc<dyn AgentMemory>>,
    action_override: Option<Arc<dyn ActionOverride>>,
}

impl MailRuntime {
    /// Create a runtime over the given agents and actions.
    pub fn new(agents: AgentRoster, actions: ActionRegistry, config: RuntimeConfig) -> Self {
        let histories = agents
            .keys()
            .map(|name| (name.clone(), HistoryCell::default()))
            .collect();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            agents,
            actions,
            user_id: config.user_id,
            swarm_name: config.swarm_name,
            entrypoint: config.entrypoint,
            queue: Mutex::new(MessageQueue::new()),
            queue_notify: Notify::new(),
            unfinished: AtomicI64::new(0),
            pending: Mutex::new(PendingMap::new()),
            histories: std::sync::Mutex::new(histories),
            events: Arc::new(EventStream::new()),
            tasks: Mutex::new(JoinSet::new()),
            shutdown_tx,
            shutdown_rx,
            is_running: AtomicBool::new(false),
            router: None,
            memory: None,
            action_override: None,
        }
    }

    /// Attach an interswarm transport, enabling federation.
    pub fn with_router(mut self, router: Arc<dyn InterswarmTransport>) -> Self {
        self.router = Some(router);
        self
    }

    /// Attach the per-agent memory store used by `acknowledge_broadcast`.
    pub fn with_memory(mut self, memory: Arc<dyn AgentMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Intercept every action invocation with the given override.
    pub fn with_action_override(mut self, action_override: Arc<dyn ActionOverride>) -> Self {
        self.action_override = Some(action_override);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn swarm_name(&self) -> &str {
        &self.swarm_name
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Whether a dispatcher loop is currently driving this runtime.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Queue entries submitted but not yet dispatched.
    pub fn unfinished_count(&self) -> i64 {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// All events recorded for a task so far.
    pub fn events_for_task(&self, task_id: Uuid) -> Vec<TaskEvent> {
        self.events.events_for_task(task_id)
    }

    /// Whether a pending future exists for this task.
    pub async fn has_pending(&self, task_id: Uuid) -> bool {
        self.pending.lock().await.contains_key(&task_id)
    }

    /// Open the interswarm transport, if one is attached.
    pub async fn start_interswarm(&self) -> Result<(), crate::domain::errors::RouterError> {
        if let Some(router) = &self.router {
            router.start().await?;
            info!(swarm = %self.swarm_name, "started interswarm messaging");
        }
        Ok(())
    }

    /// Close the interswarm transport, if one is attached.
    pub async fn stop_interswarm(&self) {
        if let Some(router) = &self.router {
            router.stop().await;
            info!(swarm = %self.swarm_name, "stopped interswarm messaging");
        }
    }

    /// Whether the interswarm transport is open.
    pub async fn is_interswarm_running(&self) -> bool {
        match &self.router {
            Some(router) => router.is_running().await,
            None => false,
        }
    }

    /// Re-inject a response that arrived from a remote swarm.
    ///
    /// The response goes through the normal queue so the local entrypoint
    /// processes it and eventually produces the terminal message itself.
    pub async fn handle_interswarm_response(&self, response: MailMessage) {
        info!(id = %response.id, "handling interswarm response");
        self.submit(response).await;
    }

    /// Route a message through the interswarm transport directly.
    pub async fn route_interswarm(
        &self,
        message: MailMessage,
    ) -> Result<MailMessage, crate::domain::errors::RouterError> {
        match &self.router {
            Some(router) => router.route_message(message).await,
            None => Err(crate::domain::errors::RouterError::NotStarted),
        }
    }

    /// Enqueue a message under the priority of its kind.
    ///
    /// Never blocks beyond queue mutex contention and always succeeds.
    pub async fn submit(&self, message: MailMessage) {
        let recipients: Vec<&str> = message
            .message
            .recipients()
            .iter()
            .map(|address| address.address.as_str())
            .collect();
        info!(
            sender = %message.message.sender().address,
            recipients = ?recipients,
            subject = %message.message.subject(),
            "submitting message"
        );

        let (priority, seq) = self.queue.lock().await.push(message);
        debug!(priority, seq, "message enqueued");
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.queue_notify.notify_one();
    }

    /// Submit a message and wait for the task's terminal response.
    ///
    /// Registers a pending future keyed by the message's task id. A second
    /// concurrent wait on the same task id is a caller error. On timeout the
    /// future is evicted and [`RuntimeError::TaskTimeout`] is raised; any
    /// dispatch tasks already running are left to finish on their own.
    pub async fn submit_and_wait(
        &self,
        message: MailMessage,
        timeout: Duration,
    ) -> Result<MailMessage, RuntimeError> {
        let task_id = message.task_id();
        info!(%task_id, user_id = %self.user_id, "creating pending future");

        let receiver = self.register_pending(task_id).await?;
        self.submit(message).await;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => {
                self.events.emit(
                    EventKind::TaskComplete,
                    task_id,
                    format!("response: '{}'", response.message.text()),
                );
                Ok(response)
            }
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&task_id);
                error!(%task_id, "pending future dropped without a result");
                Err(RuntimeError::TaskAbandoned(task_id))
            }
            Err(_) => {
                self.pending.lock().await.remove(&task_id);
                error!(%task_id, "submit_and_wait timed out");
                Err(RuntimeError::TaskTimeout {
                    task_id,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Submit a message and stream the task's telemetry.
    ///
    /// The returned sequence is finite and single-consumer: it yields events
    /// for this task as they accumulate, a `ping` heartbeat after any 15
    /// seconds of silence, and terminates with a final `task_complete`
    /// carrying the response body once the pending future resolves. Past the
    /// overall timeout the future is evicted and the stream ends.
    pub async fn submit_and_stream(
        self: &Arc<Self>,
        message: MailMessage,
        timeout: Duration,
    ) -> Result<impl Stream<Item = TaskEvent> + Send + 'static, RuntimeError> {
        let task_id = message.task_id();
        info!(%task_id, user_id = %self.user_id, "creating pending future for stream");

        let receiver = self.register_pending(task_id).await?;
        self.submit(message).await;

        struct StreamState {
            runtime: Arc<MailRuntime>,
            task_id: Uuid,
            receiver: Option<oneshot::Receiver<MailMessage>>,
            buffered: VecDeque<TaskEvent>,
            deadline: tokio::time::Instant,
        }

        let state = StreamState {
            runtime: Arc::clone(self),
            task_id,
            receiver: Some(receiver),
            buffered: VecDeque::new(),
            deadline: tokio::time::Instant::now() + timeout,
        };

        enum Wake {
            Resolved(Result<MailMessage, oneshot::error::RecvError>),
            Events,
            Heartbeat,
            Deadline,
        }

        Ok(futures::stream::unfold(state, |mut state| async move {
            if let Some(event) = state.buffered.pop_front() {
                return Some((event, state));
            }
            loop {
                let wake = {
                    let Some(receiver) = state.receiver.as_mut() else {
                        return None;
                    };
                    tokio::select! {
                        result = receiver => Wake::Resolved(result),
                        () = state.runtime.events.wait_available() => Wake::Events,
                        () = tokio::time::sleep(STREAM_HEARTBEAT) => Wake::Heartbeat,
                        () = tokio::time::sleep_until(state.deadline) => Wake::Deadline,
                    }
                };

                match wake {
                    Wake::Resolved(result) => {
                        state.receiver = None;
                        let event = match result {
                            Ok(response) => TaskEvent::task_complete(
                                state.task_id,
                                Some(response.message.text()),
                            ),
                            Err(_) => TaskEvent::task_complete(state.task_id, None),
                        };
                        return Some((event, state));
                    }
                    Wake::Events => {
                        for event in state.runtime.events.drain() {
                            if event.task_id == state.task_id {
                                state.buffered.push_back(event);
                            }
                        }
                        if let Some(event) = state.buffered.pop_front() {
                            return Some((event, state));
                        }
                    }
                    Wake::Heartbeat => {
                        return Some((TaskEvent::ping(state.task_id), state));
                    }
                    Wake::Deadline => {
                        state.runtime.pending.lock().await.remove(&state.task_id);
                        error!(task_id = %state.task_id, "submit_and_stream timed out");
                        state.receiver = None;
                        return None;
                    }
                }
            }
        }))
    }

    /// Run until the first `broadcast_complete` and return it.
    ///
    /// Re-entry while a loop is active is an error.
    pub async fn run(self: &Arc<Self>) -> Result<MailMessage, RuntimeError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(user_id = %self.user_id, "runtime already running, cannot start another run");
            return Err(RuntimeError::AlreadyRunning(self.user_id.clone()));
        }

        let result = self.run_until_complete().await;
        self.is_running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_until_complete(self: &Arc<Self>) -> Result<MailMessage, RuntimeError> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                info!(user_id = %self.user_id, "shutdown requested");
                return Ok(MailMessage::system_shutdown(
                    Uuid::new_v4(),
                    &self.swarm_name,
                    "shutdown requested",
                ));
            }

            let message = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                message = self.next_message() => message,
            };

            if message.kind() == MessageKind::BroadcastComplete {
                self.task_done();
                return Ok(message);
            }

            self.process_message(message).await;
        }
    }

    /// Run continuously, handling multiple tasks, until shutdown.
    pub async fn run_continuous(self: Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(user_id = %self.user_id, "runtime already running, refusing second loop");
            return;
        }
        info!(user_id = %self.user_id, "starting continuous operation");

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let message = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                message = self.next_message() => message,
            };

            if message.kind() == MessageKind::BroadcastComplete {
                let task_id = message.task_id();
                if self.resolve_pending(task_id, message.clone()).await {
                    info!(%task_id, "task completed, resolved pending request");
                    self.task_done();
                    continue;
                }
                // No waiter: fall through and dispatch the terminal
                // broadcast to its recipients like any other message.
            }

            self.process_message(message).await;
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!(user_id = %self.user_id, "continuous operation stopped");
    }

    /// Request a graceful shutdown.
    ///
    /// Stops interswarm messaging, signals the dispatcher, waits up to 30
    /// seconds for in-flight dispatch tasks (5 more after cancelling), then
    /// drains every pending future with a `System Shutdown` terminal
    /// response.
    pub async fn shutdown(&self) {
        info!(user_id = %self.user_id, "requesting shutdown");

        self.stop_interswarm().await;
        let _ = self.shutdown_tx.send(true);

        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            info!(active = tasks.len(), "waiting for active dispatch tasks");
            let drained = tokio::time::timeout(SHUTDOWN_TASK_GRACE, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!("timeout waiting for dispatch tasks, cancelling remainder");
                tasks.abort_all();
                let cancelled = tokio::time::timeout(SHUTDOWN_CANCEL_GRACE, async {
                    while tasks.join_next().await.is_some() {}
                })
                .await;
                if cancelled.is_err() {
                    warn!("some dispatch tasks could not be cancelled cleanly");
                }
            }
        }
        drop(tasks);

        let drained: Vec<(Uuid, oneshot::Sender<MailMessage>)> =
            self.pending.lock().await.drain().collect();
        for (task_id, sender) in drained {
            info!(%task_id, "resolving pending future with shutdown response");
            let _ = sender.send(MailMessage::system_shutdown(
                task_id,
                &self.swarm_name,
                "shutdown requested",
            ));
        }

        info!(user_id = %self.user_id, "graceful shutdown completed");
    }

    /// Snapshot of one agent's history.
    pub async fn agent_history(&self, agent: &str) -> Vec<HistoryEntry> {
        let cell = self.history_cell(agent);
        let snapshot = cell.lock().await.clone();
        snapshot
    }

    // ---- internals -------------------------------------------------------

    async fn register_pending(
        &self,
        task_id: Uuid,
    ) -> Result<oneshot::Receiver<MailMessage>, RuntimeError> {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&task_id) {
            return Err(RuntimeError::DuplicateWait(task_id));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(task_id, sender);
        Ok(receiver)
    }

    /// Resolve the pending future for a task, if one exists.
    ///
    /// The future is removed from the map before the result is delivered.
    async fn resolve_pending(&self, task_id: Uuid, response: MailMessage) -> bool {
        let sender = self.pending.lock().await.remove(&task_id);
        match sender {
            Some(sender) => {
                if sender.send(response).is_err() {
                    warn!(%task_id, "waiter went away before resolution");
                }
                true
            }
            None => false,
        }
    }

    async fn next_message(&self) -> MailMessage {
        loop {
            if let Some(message) = self.queue.lock().await.pop() {
                return message;
            }
            self.queue_notify.notified().await;
        }
    }

    fn task_done(&self) {
        self.unfinished.fetch_sub(1, Ordering::SeqCst);
    }

    fn history_cell(&self, agent: &str) -> HistoryCell {
        let mut histories = self.histories.lock().expect("history map lock poisoned");
        histories.entry(agent.to_string()).or_default().clone()
    }

    /// Dispatch one dequeued message.
    ///
    /// Messages with any remote recipient are delegated to the interswarm
    /// transport; everything else expands to local dispatch turns. The queue
    /// entry is marked done exactly once on every path.
    async fn process_message(self: &Arc<Self>, message: MailMessage) {
        if let Some(router) = &self.router {
            let has_remote = message.message.recipients().iter().any(|recipient| {
                recipient
                    .swarm()
                    .is_some_and(|swarm| swarm != self.swarm_name)
            });

            if has_remote {
                let runtime = Arc::clone(self);
                let router = Arc::clone(router);
                self.spawn_task(async move {
                    match router.route_message(message.clone()).await {
                        Ok(response) => {
                            info!(id = %response.id, "received routed response, enqueuing for local processing");
                            runtime.submit(response).await;
                        }
                        Err(error) => {
                            error!(%error, "error in interswarm routing, falling back to local processing");
                            runtime.dispatch_locally(&message).await;
                        }
                    }
                })
                .await;
                self.task_done();
                return;
            }
        }

        self.dispatch_locally(&message).await;
        self.task_done();
    }

    /// Expand recipients and spawn one dispatch turn per local agent.
    async fn dispatch_locally(self: &Arc<Self>, message: &MailMessage) {
        let sender_name = message.message.sender().name();
        let recipients = message.message.recipients();

        let expanded: Vec<String> = if matches!(
            message.message,
            MessageBody::Broadcast(_) | MessageBody::Interrupt(_)
        ) && recipients.len() == 1
            && recipients[0].address == ALL_AGENTS
        {
            self.agents
                .keys()
                .filter(|name| **name != sender_name)
                .cloned()
                .collect()
        } else {
            recipients
                .iter()
                .map(|address| address.address.clone())
                .collect()
        };

        for recipient in expanded {
            let (agent_name, swarm) = split_address(&recipient);

            if swarm.as_deref().is_some_and(|swarm| swarm != self.swarm_name) {
                debug!(recipient = %recipient, "skipping remote agent in local processing");
                continue;
            }

            if self.agents.contains_key(&agent_name) {
                self.spawn_agent_turn(agent_name, message.clone()).await;
                continue;
            }

            warn!(agent = %agent_name, "unknown local agent");
            let reply = if agent_name == self.user_id {
                MailMessage::system_response(
                    message,
                    &self.swarm_name,
                    &self.user_id,
                    "Improper response to user",
                    format!(
                        "The user ('{}') is unable to respond to this message.\nTo respond to the user once their requested task is complete, use the 'task_complete' tool.",
                        self.user_id
                    ),
                )
            } else {
                MailMessage::system_response(
                    message,
                    &self.swarm_name,
                    &self.user_id,
                    format!("Unknown Agent: '{agent_name}'"),
                    format!("The agent '{agent_name}' is not known to this swarm."),
                )
            };

            if self.agents.contains_key(&sender_name) {
                self.spawn_agent_turn(sender_name.clone(), reply).await;
            } else {
                // Sender is not an agent (user or system); record the
                // synthesized response in the event stream only.
                self.events.emit(
                    EventKind::NewMessage,
                    reply.task_id(),
                    format!("sending message:\n{}", render_incoming(&reply)),
                );
            }
        }
    }

    async fn spawn_task(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        // No new dispatch tasks once shutdown has been requested.
        if *self.shutdown_rx.borrow() {
            debug!("shutdown in progress, dropping dispatch task");
            return;
        }
        let mut tasks = self.tasks.lock().await;
        // Reap completed handles so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(future);
    }

    /// Fire one dispatch turn for a recipient agent.
    async fn spawn_agent_turn(self: &Arc<Self>, recipient: String, message: MailMessage) {
        info!(
            sender = %message.message.sender().address,
            recipient = %recipient,
            subject = %message.message.subject(),
            "sending message"
        );
        self.events.emit(
            EventKind::NewMessage,
            message.task_id(),
            format!("sending message:\n{}", render_incoming(&message)),
        );

        let runtime = Arc::clone(self);
        self.spawn_task(async move {
            if let Err(error) = runtime.run_agent_turn(&recipient, &message).await {
                // Agent and action failures end the turn without output;
                // the runtime itself keeps going.
                error!(agent = %recipient, %error, "dispatch turn failed");
            }
        })
        .await;
    }

    /// One agent turn: render the message in, invoke the agent, interpret
    /// every tool call, then trim the history.
    async fn run_agent_turn(
        self: &Arc<Self>,
        recipient: &str,
        message: &MailMessage,
    ) -> anyhow::Result<()> {
        let task_id = message.task_id();
        let rendered = render_incoming(message);

        let agent = self
            .agents
            .get(recipient)
            .ok_or_else(|| AgentError::UnknownAgent(recipient.to_string()))?;

        // Holding the cell lock for the whole turn serializes dispatch per
        // agent; turns for other agents proceed in parallel.
        let cell = self.history_cell(recipient);
        let mut history = cell.lock().await;

        history.push(HistoryEntry::user(rendered.clone()));

        let turn = agent
            .adapter
            .complete(&history, ToolChoice::Required)
            .await?;

        let records: Vec<ToolCallRecord> = turn
            .calls
            .iter()
            .map(|call| ToolCallRecord {
                id: call.call_id.clone(),
                name: call.name.clone(),
                arguments: call.args.clone(),
            })
            .collect();
        history.push(HistoryEntry::assistant(
            turn.text.clone().unwrap_or_default(),
            records,
        ));

        for call in &turn.calls {
            if MailTool::from_name(&call.name).is_some_and(MailTool::emits_stub_response) {
                history.push(call.response_entry(MESSAGE_SENT_STUB));
            }
        }

        for call in &turn.calls {
            match MailTool::from_name(&call.name) {
                Some(MailTool::AcknowledgeBroadcast) => {
                    if message.kind() == MessageKind::Broadcast {
                        if let Some(memory) = &self.memory {
                            let note = call.arg_opt_str("note");
                            if let Err(error) = memory
                                .store_acknowledgement(recipient, &rendered, note)
                                .await
                            {
                                error!(%error, "error acknowledging broadcast");
                            }
                        }
                    } else {
                        debug!("acknowledge_broadcast used on non-broadcast message; ignoring");
                    }
                }
                Some(MailTool::IgnoreBroadcast) => {
                    info!(agent = %recipient, "broadcast ignored via ignore_broadcast tool");
                }
                Some(MailTool::TaskComplete) => {
                    let finish_message = call
                        .arg_opt_str("finish_message")
                        .unwrap_or("Task completed successfully")
                        .to_string();
                    let response = MailMessage::broadcast_complete(
                        task_id,
                        Address::agent(&self.entrypoint),
                        "Task complete",
                        finish_message,
                        &self.swarm_name,
                    );
                    if self.resolve_pending(task_id, response).await {
                        info!(%task_id, user_id = %self.user_id, "task completed, resolving pending request");
                    } else {
                        info!(%task_id, "task completed but no pending request found, submitting message");
                        match call_to_message(call, recipient, task_id) {
                            Ok(outgoing) => self.submit(outgoing).await,
                            Err(error) => warn!(%error, "dropping malformed task_complete call"),
                        }
                    }
                }
                Some(
                    MailTool::SendRequest
                    | MailTool::SendResponse
                    | MailTool::SendInterrupt
                    | MailTool::SendBroadcast,
                ) => match call_to_message(call, recipient, task_id) {
                    Ok(outgoing) => self.submit(outgoing).await,
                    Err(error) => {
                        warn!(tool = %call.name, %error, "dropping malformed tool call");
                    }
                },
                None => {
                    info!(tool = %call.name, "executing action tool");
                    self.events.emit(
                        EventKind::ActionToolCall,
                        task_id,
                        format!("executing action tool (caller = '{recipient}'): '{}'", call.name),
                    );

                    let entry =
                        execute_action_tool(call, &self.actions, self.action_override.as_deref())
                            .await?;
                    let content = entry.content.clone();
                    history.push(entry);

                    self.events.emit(
                        EventKind::ActionToolComplete,
                        task_id,
                        format!("action tool complete (caller = '{recipient}'): '{content}'"),
                    );
                    self.submit(action_complete_broadcast(
                        &call.name,
                        &content,
                        &self.swarm_name,
                        recipient,
                        task_id,
                    ))
                    .await;
                }
            }
        }

        trim_history(&mut history);
        Ok(())
    }
}

impl std::fmt::Debug for MailRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailRuntime")
            .field("user_id", &self.user_id)
            .field("swarm_name", &self.swarm_name)
            .field("entrypoint", &self.entrypoint)
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
