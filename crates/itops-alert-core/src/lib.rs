//! Alert correlation engines between `itops-alert-api` and the service binary.
//!
//! This crate owns the domain model and the correlation pipeline:
//!
//! - **[`IngestConsumer`]**: Reads raw webhook payloads from the
//!   [`Broker`] in offset order, normalizes them through the
//!   [`Normalizer`], persists them and hands them to the fault engine under
//!   a bounded retry.
//!
//! - **[`FaultEngine`]**: Collapses repeated events on one entity into a
//!   single open fault point per `(entity, fault_mode)` and expires stale
//!   ones.
//!
//! - **[`ProblemEngine`]**: Groups fault points into problems by topology
//!   adjacency and time window, merges problems that new evidence
//!   connects, and owns every problem transition. Writes are typed
//!   [`Command`]s routed through an `mpsc` channel to a single processor
//!   task; [`ProblemHandle`] is the cloneable sender.
//!
//! - **[`RcaDispatcher`]**: Submits stabilized problems to the external
//!   root-cause analyzer; results return as callbacks through the problem
//!   engine.
//!
//! - **Repositories** ([`store`]): Trait per index with a search-index
//!   backend ([`SearchStore`]) and an in-memory one ([`MemoryStore`]).

pub mod broker;
pub mod command;
pub mod correlation;
pub mod directory;
pub mod error;
pub mod fault;
pub mod idgen;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod problem;
pub mod rca;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broker::{Broker, BrokerMessage, MemoryBroker, RAW_EVENT_TOPIC, Subscription};
#[cfg(feature = "kafka")]
pub use broker::{KafkaBroker, KafkaSettings};
pub use command::requests::*;
pub use command::{CloseSummary, Command, CommandResult, ProblemHandle};
pub use correlation::{Correlation, CorrelationConfig};
pub use directory::{Directory, DirectoryCache, HttpDirectory, StaticDirectory};
pub use error::CoreError;
pub use fault::{FaultEngine, FaultEngineConfig, ProblemHandler};
pub use idgen::IdGenerator;
pub use ingest::{EventHandler, IngestConsumer, Outcome, RetryPolicy};
pub use normalize::{EntityResolver, Normalizer, SourceKind};
pub use problem::{ProblemEngine, ProblemEngineConfig};
pub use rca::{RcaDispatcher, RcaDispatcherConfig, RcaSubmitter, TickStats};
pub use store::{MemoryStore, RcaUpdate, Repositories, SearchStore};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    CloseRequest, CloseType, EventStatus, FaultPointObject, FaultStatus, Problem, ProblemStatus,
    RawEvent, RcaCallback, RcaStatus, Severity,
};
