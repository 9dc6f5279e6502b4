//! Query-Type Deducer
//!
//! Reconciles two independent signals into a single [`QueryKind`]:
//! - explicit: the command verb, or the `-I`/`-U`/`-D` flags
//! - implicit: the modification operators embedded in the tokens
//!
//! A query with neither signal is a SELECT. Contradictions fail with
//! [`MiniError::InconsistentQueryType`] before any SQL is synthesized.

use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifiedQuery, Operator};
use crate::error::{MiniError, Result};

/// Kind of statement a classified query describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Undetermined,
}

impl QueryKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Undetermined => "UNDETERMINED",
        }
    }

    /// Kind named by an explicit query verb
    #[must_use]
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb.to_ascii_lowercase().as_str() {
            "select" => Some(Self::Select),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_determined(&self) -> bool {
        !matches!(self, Self::Undetermined)
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single-letter option flags naming a kind
pub const KIND_FLAGS: [(&str, QueryKind); 3] =
    [("I", QueryKind::Insert), ("U", QueryKind::Update), ("D", QueryKind::Delete)];

/// Insert-style assignment
pub const INSERT_OPERATOR: &str = ".=";

/// Delete marker
pub const DELETE_OPERATOR: &str = "~=";

/// Compound assignments
pub const UPDATE_OPERATORS: [&str; 6] = ["+=", "-=", "*=", "/=", "%=", ":="];

/// Kind implied by a single operator
///
/// Operators longer than two characters are reserved and imply nothing.
#[must_use]
pub fn operator_kind(symbol: &str) -> QueryKind {
    if symbol.chars().count() != 2 {
        return QueryKind::Undetermined;
    }
    match symbol {
        INSERT_OPERATOR => QueryKind::Insert,
        DELETE_OPERATOR => QueryKind::Delete,
        s if UPDATE_OPERATORS.contains(&s) => QueryKind::Update,
        _ => QueryKind::Undetermined,
    }
}

/// A determined kind plus what the user wrote to imply it
struct Indicator {
    kind: QueryKind,
    label: String,
}

fn explicit_signal(query: &ClassifiedQuery) -> Result<Option<Indicator>> {
    if let Some(kind) = query.command_name.as_deref().and_then(QueryKind::from_verb) {
        return Ok(Some(Indicator {
            kind,
            label: format!("command '{}'", query.command_name.as_deref().unwrap_or_default()),
        }));
    }

    let mut found: Option<Indicator> = None;
    for (flag, kind) in KIND_FLAGS {
        if !query.has_option(flag) {
            continue;
        }
        let label = format!("flag '-{flag}'");
        match &found {
            Some(previous) if previous.kind != kind => {
                return Err(MiniError::inconsistent_query_type(&previous.label, label));
            }
            Some(_) => {}
            None => found = Some(Indicator { kind, label }),
        }
    }
    Ok(found)
}

fn operator_label(query: &ClassifiedQuery, op: &Operator) -> String {
    match query.bucket(&op.bucket).get(op.index) {
        Some(word) => format!("operator '{}' in '{}{word}'", op.symbol, op.bucket),
        None => format!("operator '{}'", op.symbol),
    }
}

fn operator_signal(query: &ClassifiedQuery) -> Result<Option<Indicator>> {
    let mut found: Option<Indicator> = None;
    for op in &query.operators {
        let kind = operator_kind(&op.symbol);
        if !kind.is_determined() {
            tracing::debug!(symbol = %op.symbol, "operator does not imply a query kind");
            continue;
        }
        match &found {
            Some(previous) if previous.kind != kind => {
                return Err(MiniError::inconsistent_query_type(
                    &previous.label,
                    operator_label(query, op),
                ));
            }
            Some(_) => {}
            None => found = Some(Indicator { kind, label: operator_label(query, op) }),
        }
    }
    Ok(found)
}

/// Infer the kind of a classified query
pub fn deduce_query_type(query: &ClassifiedQuery) -> Result<QueryKind> {
    let explicit = explicit_signal(query)?;
    let implicit = operator_signal(query)?;

    let kind = match (explicit, implicit) {
        (None, None) => QueryKind::Select,
        (Some(only), None) | (None, Some(only)) => only.kind,
        (Some(explicit), Some(implicit)) => {
            if explicit.kind != implicit.kind {
                return Err(MiniError::inconsistent_query_type(explicit.label, implicit.label));
            }
            explicit.kind
        }
    };

    tracing::debug!(%kind, "deduced query kind");
    Ok(kind)
}

/// Deduce and record the kind on the query
pub fn assign_query_kind(query: &mut ClassifiedQuery) -> Result<QueryKind> {
    let kind = deduce_query_type(query)?;
    query.kind = Some(kind);
    Ok(kind)
}
