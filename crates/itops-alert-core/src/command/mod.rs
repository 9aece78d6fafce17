// ── Command API ──
//
// Every problem write flows through a unified `Command` enum. A single
// processor task owns the problem index, so grouping, callbacks, operator
// actions and expiry never race each other.

pub mod requests;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::CoreError;
use crate::fault::ProblemHandler;
use crate::model::{CloseRequest, FaultPointObject, ProblemStatus, RcaCallback};
use crate::store::RcaUpdate;

pub use requests::{CloseProblemRequest, SetRootCauseRequest};

/// Capacity of the command channel.
pub const COMMAND_CHANNEL_SIZE: usize = 256;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against problems.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Correlation ──────────────────────────────────────────────────
    HandleFaultPoint(Box<FaultPointObject>),
    FaultPointRecovered {
        fault_id: u64,
    },

    // ── Analysis ─────────────────────────────────────────────────────
    RcaCallback(Box<RcaCallback>),
    UpdateRca {
        problem_id: u64,
        update: RcaUpdate,
    },

    // ── Operator ─────────────────────────────────────────────────────
    CloseProblem {
        problem_id: u64,
        request: CloseRequest,
    },
    SetRootCause {
        problem_id: u64,
        request: SetRootCauseRequest,
    },
}

/// Outcome of a close transition, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseSummary {
    pub problem_id: u64,
    pub status: ProblemStatus,
    pub events_closed: usize,
    pub faults_closed: usize,
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    /// Problem the fault point now belongs to.
    Problem(u64),
    Closed(CloseSummary),
}

// ── Handle ───────────────────────────────────────────────────────────

/// Cloneable sender side of the problem engine.
#[derive(Clone)]
pub struct ProblemHandle {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl ProblemHandle {
    pub(crate) fn new(tx: mpsc::Sender<CommandEnvelope>) -> Self {
        Self { tx }
    }

    /// Send a command to the processor and await its result.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| CoreError::Cancelled)?;
        response_rx.await.map_err(|_| CoreError::Cancelled)?
    }

    pub async fn close_problem(
        &self,
        problem_id: u64,
        request: CloseRequest,
    ) -> Result<CloseSummary, CoreError> {
        match self
            .execute(Command::CloseProblem {
                problem_id,
                request,
            })
            .await?
        {
            CommandResult::Closed(summary) => Ok(summary),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn set_root_cause(
        &self,
        problem_id: u64,
        request: SetRootCauseRequest,
    ) -> Result<(), CoreError> {
        self.execute(Command::SetRootCause {
            problem_id,
            request,
        })
        .await
        .map(|_| ())
    }

    pub async fn rca_callback(&self, callback: RcaCallback) -> Result<(), CoreError> {
        self.execute(Command::RcaCallback(Box::new(callback)))
            .await
            .map(|_| ())
    }

    pub async fn update_rca(&self, problem_id: u64, update: RcaUpdate) -> Result<(), CoreError> {
        self.execute(Command::UpdateRca { problem_id, update })
            .await
            .map(|_| ())
    }
}

fn unexpected(result: &CommandResult) -> CoreError {
    CoreError::Internal(format!("unexpected command result: {result:?}"))
}

impl std::fmt::Debug for ProblemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProblemHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProblemHandler for ProblemHandle {
    async fn handle_fault_point(&self, fault: FaultPointObject) -> Result<(), CoreError> {
        self.execute(Command::HandleFaultPoint(Box::new(fault)))
            .await
            .map(|_| ())
    }

    async fn handle_fault_point_recovered(&self, fault_id: u64) -> Result<(), CoreError> {
        self.execute(Command::FaultPointRecovered { fault_id })
            .await
            .map(|_| ())
    }
}
