use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed environment reference '{reference}': expected ENV:<KEY>:<fallback>")]
    MalformedReference { reference: String },

    #[error("unresolved environment reference '{reference}': {key} is unset or empty and no fallback was given")]
    UnresolvedReference { key: String, reference: String },

    #[error("value of {key} is not numeric: '{raw}'")]
    TypeCoercion { key: String, raw: String },

    #[error("scenario or round '{id}' not found in the scenario tree")]
    NotFound { id: String },

    #[error("round {round} of scenario {scenario} uses the OPTIMAL placeholder but no optimal TPS was supplied (use --optimal-tps)")]
    MissingOverride { scenario: String, round: String },

    #[error("missing required argument {field} for {scope}")]
    MissingRequiredArgument { scope: String, field: String },

    #[error("scenario {scenario} is malformed: {reason}")]
    MalformedScenario { scenario: String, reason: String },

    #[error("round id '{id}' is ambiguous: present in scenarios {}", parents.join(", "))]
    AmbiguousRound { id: String, parents: Vec<String> },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("scenario tree schema validation failed: {}", messages.join("; "))]
    Schema { messages: Vec<String> },

    #[error("failed to render plan: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("{scope}, field {field}: {source}")]
    Within {
        scope: String,
        field: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Pins a failure to the scenario/round and field it came from.
    pub fn within(self, scope: impl Into<String>, field: impl Into<String>) -> Self {
        CompileError::Within {
            scope: scope.into(),
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with every `Within` layer removed.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::Within { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable machine-readable code used by the CLI's JSON envelope.
    pub fn code(&self) -> &'static str {
        match self.root() {
            CompileError::MalformedReference { .. } => "malformed_reference",
            CompileError::UnresolvedReference { .. } => "unresolved_reference",
            CompileError::TypeCoercion { .. } => "type_coercion",
            CompileError::NotFound { .. } => "not_found",
            CompileError::MissingOverride { .. } => "missing_override",
            CompileError::MissingRequiredArgument { .. } => "missing_required_argument",
            CompileError::MalformedScenario { .. } => "malformed_scenario",
            CompileError::AmbiguousRound { .. } => "ambiguous_round",
            CompileError::Io { .. } => "io_error",
            CompileError::Parse { .. } => "parse_error",
            CompileError::Schema { .. } => "schema_error",
            CompileError::Render(_) => "render_error",
            CompileError::Within { .. } => "compile_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
