use thiserror::Error;

/// Crate-wide result alias, used everywhere instead of ad hoc `Result<T, String>`.
pub type EvoResult<T> = Result<T, EvoError>;

#[derive(Debug, Error)]
pub enum EvoError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Evolution(#[from] EvolutionError),

    #[error(transparent)]
    Io(#[from] IoError),
}

impl EvoError {
    /// Stable taxonomy token (spec §7), persisted in artifacts and progress
    /// events. Consumers key off this string, not the Rust variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            EvoError::Graph(e) => e.kind(),
            EvoError::Execution(_) => "execution_error",
            EvoError::Sampling(_) => "sampling_error",
            EvoError::Aggregate(e) => e.kind(),
            EvoError::Llm(e) => e.kind(),
            EvoError::Evolution(e) => e.kind(),
            EvoError::Io(_) => "io_error",
        }
    }
}

/// Errors validating or constructing a `StrategyGraph` (invariants I1-I5).
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph contains a cycle")]
    Cycle,

    #[error("node '{0}' references unresolved input '{1}'")]
    UnresolvedInput(String, String),

    #[error("port type mismatch at node '{node}' input '{port}': expected {expected}, got {got}")]
    PortTypeMismatch {
        node: String,
        port: String,
        expected: String,
        got: String,
    },

    #[error("graph is missing a required node: {0}")]
    MissingRequiredNode(String),

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("invalid parameter '{param}' on node '{node}': {msg}")]
    InvalidParam {
        node: String,
        param: String,
        msg: String,
    },

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
}

impl GraphError {
    fn kind(&self) -> &'static str {
        "graph_validation_error"
    }
}

/// Errors raised while a single node executes during a backtest.
///
/// Per spec §4.1, these are caught by the executor and reported as
/// `EpisodeResult::error_details`, not propagated with `?`, except when
/// explicitly surfaced through `EvoError` for developer-observability
/// paths such as `aggregate_failure`.
#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("unresolved input reference: {0}")]
    UnresolvedInput(String),

    #[error("type mismatch at port '{0}'")]
    TypeMismatch(String),

    #[error("division by zero during indicator warmup in node '{0}'")]
    DivisionByZero(String),

    #[error("frame is missing a usable timestamp position")]
    AbsentTimestamp,

    #[error("frame has fewer than the required warmup bars: needed {needed}, had {had}")]
    InsufficientWarmup { needed: usize, had: usize },
}

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("dataset has fewer than min_bars ({min_bars}) usable bars")]
    InsufficientBars { min_bars: usize },

    #[error("cannot sample {requested} disjoint windows from a dataset of length {available}")]
    CannotSatisfyRequestedCount { requested: usize, available: usize },

    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(
        "all {n_episodes} episodes failed execution; first failures: {first_failures:?}"
    )]
    AllEpisodesFailed {
        n_episodes: usize,
        first_failures: Vec<String>,
    },
}

impl AggregateError {
    fn kind(&self) -> &'static str {
        "aggregate_failure"
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("compile failed after repair: {0}")]
    CompileFailed(String),

    #[error("mutate failed after repair: {0}")]
    MutateFailed(String),

    #[error("provider request timed out after {0} retries")]
    Timeout(usize),

    #[error("provider returned malformed JSON: {0}")]
    MalformedResponse(String),

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("cache I/O error: {0}")]
    Cache(String),
}

impl LlmError {
    fn kind(&self) -> &'static str {
        match self {
            LlmError::CompileFailed(_) => "compile_error",
            LlmError::MutateFailed(_) => "mutate_error",
            LlmError::Timeout(_) => "provider_timeout",
            LlmError::MalformedResponse(_) | LlmError::Transport(_) | LlmError::Cache(_) => {
                "provider_error"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("adam failed to compile: {0}")]
    FailedCompileAdam(String),

    #[error("max_total_evals ({0}) exhausted")]
    BudgetExhausted(usize),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("run was cancelled at generation {0}")]
    Cancelled(usize),
}

impl EvolutionError {
    fn kind(&self) -> &'static str {
        match self {
            EvolutionError::FailedCompileAdam(_) => "compile_error",
            EvolutionError::BudgetExhausted(_) => "budget_exhausted",
            EvolutionError::InvalidConfig(_) => "invalid_config",
            EvolutionError::Cancelled(_) => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact path escapes run directory: {0}")]
    PathEscape(String),

    #[error("unexpected artifact layout: {0}")]
    Layout(String),
}
