//! Subagent Manager: delegated tasks run by nested agent loops.
//!
//! Each sub-agent is a fresh [`AgentLoop`] with:
//! - its own [`Conversation`] (nothing is shared with the parent or siblings)
//! - a task-focused system prompt
//! - the parent's provider and a subset of the parent's base tools
//!
//! Children are built from the base tool set, which never contains the
//! sub-agent tools, so nesting stops at depth one.
//!
//! Tasks run as `tokio::spawn` tasks. Their state is published through a
//! `watch` channel so callers can poll, wait, or cancel by id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{watch, RwLock};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use mycoder_providers::traits::LlmProvider;

use crate::agent_loop::{AgentLoop, Conversation, LoopConfig};
use crate::context::ContextBuilder;
use crate::tools::{ToolError, ToolManager};

/// Upper bound on provider calls for one delegated task.
const SUBAGENT_MAX_TURNS: usize = 15;

// ─────────────────────────────────────────────
// Status & requests
// ─────────────────────────────────────────────

/// Lifecycle of one sub-agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubagentStatus {
    Running,
    Completed(String),
    Failed(String),
    Cancelled,
}

impl SubagentStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SubagentStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentStatus::Running => "running",
            SubagentStatus::Completed(_) => "completed",
            SubagentStatus::Failed(_) => "failed",
            SubagentStatus::Cancelled => "cancelled",
        }
    }
}

/// Status of one sub-agent, as returned to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubagentReport {
    pub agent_id: String,
    pub status: SubagentStatus,
}

impl SubagentReport {
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "agent_id": self.agent_id,
            "status": self.status.as_str(),
        });
        match &self.status {
            SubagentStatus::Completed(result) => out["result"] = json!(result),
            SubagentStatus::Failed(error) => out["error"] = json!(error),
            _ => {}
        }
        out
    }
}

/// One task to delegate.
#[derive(Clone, Debug, Default)]
pub struct SubagentRequest {
    pub prompt: String,
    /// Tool names the child may use; all base tools when `None`.
    pub tools: Option<Vec<String>>,
    pub working_dir: Option<String>,
}

impl SubagentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// When a group of sub-agents counts as done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Wait for every task.
    WaitAll,
    /// Continue once this many tasks have finished; the rest are cancelled.
    Threshold(usize),
}

/// Finished tasks kept for later `status` queries; older ones are evicted.
const FINISHED_RETENTION: usize = 64;

/// Shared handle to one spawned task.
struct TaskControl {
    status: Arc<watch::Sender<SubagentStatus>>,
    abort: AbortHandle,
}

impl TaskControl {
    fn snapshot(&self) -> SubagentStatus {
        self.status.borrow().clone()
    }

    /// Mark the task cancelled and abort it. `false` if it had already finished.
    fn cancel(&self) -> bool {
        let cancelled = self.status.send_if_modified(|current| {
            if current.is_finished() {
                return false;
            }
            *current = SubagentStatus::Cancelled;
            true
        });
        if cancelled {
            self.abort.abort();
        }
        cancelled
    }
}

/// Cancels the task if dropped while it is still running.
struct CancelOnDrop(Arc<TaskControl>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.0.cancel() {
            debug!("sub-agent abandoned by its caller, cancelled");
        }
    }
}

struct TaskEntry {
    prompt: String,
    seq: u64,
    control: Arc<TaskControl>,
}

// ─────────────────────────────────────────────
// SubagentManager
// ─────────────────────────────────────────────

/// Spawns and tracks sub-agents.
///
/// Shared via `Arc` by the `sub_agent*` tools.
pub struct SubagentManager {
    provider: Arc<dyn LlmProvider>,
    /// Base tools available to children.
    tools: ToolManager,
    config: LoopConfig,
    context: ContextBuilder,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    next_seq: AtomicU64,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolManager,
        config: LoopConfig,
        context: ContextBuilder,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
            context,
            tasks: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Names of the tools a child may be given.
    pub fn available_tools(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    /// Start a sub-agent in the background and return its id.
    pub async fn spawn(&self, request: SubagentRequest) -> Result<String, ToolError> {
        let (agent_id, _) = self.start(request).await?;
        Ok(agent_id)
    }

    async fn start(&self, request: SubagentRequest) -> Result<(String, Arc<TaskControl>), ToolError> {
        let tools = match &request.tools {
            Some(names) => self.tools.subset(names)?,
            None => self.tools.clone(),
        };
        if let Some(dir) = &request.working_dir {
            if !Path::new(dir).is_dir() {
                return Err(ToolError::execution(
                    "sub_agent",
                    anyhow::anyhow!("Working directory {dir} does not exist or is not a directory"),
                ));
            }
        }

        let config = LoopConfig {
            max_turns: self.config.max_turns.min(SUBAGENT_MAX_TURNS),
            ..self.config.clone()
        };
        let agent = AgentLoop::new(self.provider.clone(), Arc::new(tools), config);
        let system_prompt = self.context.build_subagent_prompt(request.working_dir.as_deref());

        let agent_id = uuid::Uuid::new_v4().to_string();
        let (status, _) = watch::channel(SubagentStatus::Running);
        let status = Arc::new(status);
        let publisher = status.clone();
        let prompt = request.prompt.clone();
        let id = agent_id.clone();

        let handle = tokio::spawn(async move {
            let mut conversation = Conversation::with_system(system_prompt);
            let outcome = match agent.run_prompt(&mut conversation, prompt).await {
                Ok(answer) => {
                    info!(agent_id = %id, turns = conversation.turns(), "sub-agent completed");
                    SubagentStatus::Completed(answer)
                }
                Err(e) => {
                    warn!(agent_id = %id, error = %e, "sub-agent failed");
                    SubagentStatus::Failed(e.to_string())
                }
            };
            publisher.send_if_modified(|current| {
                if current.is_finished() {
                    return false;
                }
                *current = outcome;
                true
            });
        });

        let control = Arc::new(TaskControl {
            status,
            abort: handle.abort_handle(),
        });
        info!(agent_id = %agent_id, prompt_len = request.prompt.len(), "sub-agent spawned");

        let mut tasks = self.tasks.write().await;
        evict_finished(&mut tasks, FINISHED_RETENTION);
        tasks.insert(
            agent_id.clone(),
            TaskEntry {
                prompt: request.prompt,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                control: control.clone(),
            },
        );
        Ok((agent_id, control))
    }

    async fn control(&self, agent_id: &str) -> Result<Arc<TaskControl>, ToolError> {
        let tasks = self.tasks.read().await;
        tasks
            .get(agent_id)
            .map(|entry| entry.control.clone())
            .ok_or_else(|| not_found(agent_id))
    }

    /// Spawn and wait for the answer.
    ///
    /// Dropping the returned future before it resolves cancels the child.
    pub async fn run(&self, request: SubagentRequest) -> Result<SubagentReport, ToolError> {
        let (agent_id, control) = self.start(request).await?;
        let _guard = CancelOnDrop(control.clone());
        let status = wait_finished(&control).await;
        Ok(SubagentReport { agent_id, status })
    }

    /// Current status without waiting.
    pub async fn status(&self, agent_id: &str) -> Result<SubagentReport, ToolError> {
        let status = self.control(agent_id).await?.snapshot();
        Ok(SubagentReport {
            agent_id: agent_id.to_string(),
            status,
        })
    }

    /// Wait until the sub-agent finishes.
    pub async fn wait(&self, agent_id: &str) -> Result<SubagentReport, ToolError> {
        let control = self.control(agent_id).await?;
        let status = wait_finished(&control).await;
        Ok(SubagentReport {
            agent_id: agent_id.to_string(),
            status,
        })
    }

    /// Abort a running sub-agent. Returns `false` if it had already finished.
    pub async fn cancel(&self, agent_id: &str) -> Result<bool, ToolError> {
        let tasks = self.tasks.read().await;
        let entry = tasks.get(agent_id).ok_or_else(|| not_found(agent_id))?;
        let cancelled = entry.control.cancel();
        if cancelled {
            info!(agent_id, task = %truncate_prompt(&entry.prompt), "sub-agent cancelled");
        }
        Ok(cancelled)
    }

    /// Abort everything still running.
    pub async fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        let mut count = 0;
        for id in ids {
            if let Ok(true) = self.cancel(&id).await {
                count += 1;
            }
        }
        count
    }

    /// Ids of sub-agents still running.
    pub async fn running(&self) -> Vec<String> {
        let tasks = self.tasks.read().await;
        let mut ids: Vec<String> = tasks
            .iter()
            .filter(|(_, e)| !e.control.snapshot().is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Run several tasks concurrently and join them by `policy`.
    ///
    /// Reports come back in request order. Under `Threshold(n)` the tasks
    /// still running once `n` have finished are cancelled, as are all of
    /// them if the returned future is dropped early.
    pub async fn run_group(
        &self,
        requests: Vec<SubagentRequest>,
        policy: JoinPolicy,
    ) -> Result<Vec<SubagentReport>, ToolError> {
        let mut started: Vec<(String, CancelOnDrop)> = Vec::with_capacity(requests.len());
        for request in requests {
            // An early return drops `started`, which cancels the siblings.
            let (id, control) = self.start(request).await?;
            started.push((id, CancelOnDrop(control)));
        }

        let needed = match policy {
            JoinPolicy::WaitAll => started.len(),
            JoinPolicy::Threshold(n) => n.clamp(1, started.len().max(1)),
        };
        debug!(tasks = started.len(), needed, "waiting on sub-agent group");

        let mut waiting = JoinSet::new();
        for (_, guard) in &started {
            let control = guard.0.clone();
            waiting.spawn(async move {
                wait_finished(&control).await;
            });
        }
        let mut finished = 0;
        while finished < needed && waiting.join_next().await.is_some() {
            finished += 1;
        }
        waiting.abort_all();

        Ok(started
            .into_iter()
            .map(|(agent_id, guard)| {
                if guard.0.cancel() {
                    info!(agent_id = %agent_id, "sub-agent cancelled after group threshold");
                }
                SubagentReport {
                    agent_id,
                    status: guard.0.snapshot(),
                }
            })
            .collect())
    }
}

/// Block until the task publishes a final status.
async fn wait_finished(control: &TaskControl) -> SubagentStatus {
    let mut rx = control.status.subscribe();
    let status = rx
        .wait_for(SubagentStatus::is_finished)
        .await
        .map(|s| s.clone())
        .unwrap_or(SubagentStatus::Cancelled);
    status
}

/// Drop the oldest finished entries beyond `keep`. Running tasks stay.
fn evict_finished(tasks: &mut HashMap<String, TaskEntry>, keep: usize) {
    let mut finished: Vec<(u64, String)> = tasks
        .iter()
        .filter(|(_, e)| e.control.snapshot().is_finished())
        .map(|(id, e)| (e.seq, id.clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
    debug!(evicted = excess, "evicted finished sub-agents");
}

fn not_found(agent_id: &str) -> ToolError {
    ToolError::execution(
        "sub_agent",
        anyhow::anyhow!("Sub-agent with ID {agent_id} not found"),
    )
}

fn truncate_prompt(prompt: &str) -> String {
    mycoder_core::utils::truncate_string(prompt, 50)
}
