//! Argument Classifier
//!
//! Sorts a pre-tokenized command line into a [`ClassifiedQuery`].
//!
//! # Token Destinations
//! Every token ends up in exactly one place:
//! - the command name (first token, when it starts with the leader)
//! - an option (leading run of dashes), stored in the transient scope
//! - the main table name (first plain token of a query command)
//! - an argument bucket keyed by the token's leading non-word prefix
//! - the literal SQL text (only for the `sq` command)
//!
//! Embedded modification operators (`+=`, `.=`, `~=`, ...) are recorded with
//! the bucket position of the token that carries them.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::CredentialOverride;
use crate::deducer::QueryKind;
use crate::options::{parse_option, OptionMap, OptionRegistry, OptionValue, Scope};

/// Explicit commands that are TQL queries
pub const QUERY_VERBS: [&str; 4] = ["select", "insert", "update", "delete"];

/// Explicit command for literal SQL
pub const LITERAL_SQL_VERB: &str = "sq";

/// Option carrying a per-command password
pub const CREDENTIAL_OPTION: &str = "pw";

/// Credential value meaning "use an empty password"
pub const EMPTY_CREDENTIAL_SENTINEL: &str = "-";

/// Two-character sequences that look like operators but compare
const COMPARISONS: [&str; 4] = ["<=", ">=", "!=", "=="];

/// An embedded modification operator found inside a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    /// Operator text including the trailing `=`
    pub symbol: String,
    /// Prefix of the bucket holding the token
    pub bucket: String,
    /// Position of the token within that bucket
    pub index: usize,
}

/// Structured description of one dispatched command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifiedQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,
    pub is_explicit_command: bool,
    pub is_query_command: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_table_name: Option<String>,
    /// Table name came from configuration rather than a token
    #[serde(skip)]
    pub table_from_config: bool,
    pub options: OptionMap,
    pub argument_buckets: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operators: Vec<Operator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<QueryKind>,
}

impl ClassifiedQuery {
    /// Words of a bucket, empty when the bucket does not exist
    #[must_use]
    pub fn bucket(&self, prefix: &str) -> &[String] {
        self.argument_buckets.get(prefix).map_or(&[], Vec::as_slice)
    }

    /// Operator carried by the token at `index` of bucket `prefix`
    #[must_use]
    pub fn operator_at(&self, prefix: &str, index: usize) -> Option<&Operator> {
        self.operators.iter().find(|op| op.bucket == prefix && op.index == index)
    }

    #[must_use]
    pub fn has_option(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Text value of an option, if it was given as `-key=value`
    #[must_use]
    pub fn option_text(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(OptionValue::as_text)
    }

    /// Lowercased command name
    #[must_use]
    pub fn command(&self) -> Option<String> {
        self.command_name.as_deref().map(str::to_ascii_lowercase)
    }

    /// Print the query back into token form
    ///
    /// Options are emitted as transient option tokens, the table name only when
    /// it did not come from configuration.
    #[must_use]
    pub fn to_tokens(&self, leader: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        if let Some(name) = &self.command_name {
            tokens.push(format!("{leader}{name}"));
        }
        for (key, value) in &self.options {
            match value {
                OptionValue::Flag => tokens.push(format!("-{key}")),
                OptionValue::Text(text) => tokens.push(format!("-{key}={text}")),
            }
        }
        if let Some(sql) = &self.literal_sql {
            tokens.extend(sql.split_whitespace().map(str::to_string));
            return tokens;
        }
        if let (Some(table), false) = (&self.main_table_name, self.table_from_config) {
            tokens.push(table.clone());
        }
        for (prefix, words) in &self.argument_buckets {
            tokens.extend(words.iter().map(|word| format!("{prefix}{word}")));
        }
        tokens
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split a token into its leading non-word run and the remainder
#[must_use]
pub fn split_prefix(token: &str) -> (&str, &str) {
    let end = token.find(is_word_char).unwrap_or(token.len());
    token.split_at(end)
}

/// Whether `token` is an option token (its non-word prefix is all dashes)
#[must_use]
pub fn is_option_token(token: &str) -> bool {
    let (prefix, _) = split_prefix(token);
    !prefix.is_empty() && prefix.chars().all(|c| c == '-')
}

/// `-+word` or `-+word=value`
fn looks_like_option(token: &str) -> bool {
    let body = token.trim_start_matches('-');
    if body.len() == token.len() {
        return false;
    }
    let key = body.split_once('=').map_or(body, |(key, _)| key);
    !key.is_empty() && key.chars().all(is_word_char)
}

/// First embedded modification operator in `word`
///
/// An operator is a non-empty run of non-word characters directly followed by
/// `=`. Comparison operators are skipped.
#[must_use]
pub fn find_operator(word: &str) -> Option<String> {
    for (eq, c) in word.char_indices() {
        if c != '=' {
            continue;
        }
        let start = word[..eq]
            .char_indices()
            .rev()
            .take_while(|(_, ch)| !is_word_char(*ch))
            .last()
            .map(|(idx, _)| idx);
        let Some(start) = start else { continue };
        let symbol = &word[start..=eq];
        if COMPARISONS.contains(&symbol) {
            continue;
        }
        return Some(symbol.to_string());
    }
    None
}

/// Classify a token list
///
/// `leader` marks explicit commands; `active_table` is the table already
/// resolved by configuration. Option tokens are written to the transient scope
/// of `registry`, and the query receives the merged options.
pub fn classify<S: AsRef<str>>(
    tokens: &[S],
    leader: &str,
    active_table: Option<&str>,
    registry: &mut OptionRegistry,
) -> ClassifiedQuery {
    let mut query = ClassifiedQuery::default();
    let mut remaining = tokens;

    if let Some(first) = tokens.first() {
        let first: &str = first.as_ref();
        if let Some(name) = first.strip_prefix(leader).filter(|_| !leader.is_empty()) {
            query.command_name = Some(name.to_string());
            query.is_explicit_command = true;
            remaining = &tokens[1..];
        }
    }

    query.is_query_command = match &query.command_name {
        Some(name) => QUERY_VERBS.iter().any(|verb| verb.eq_ignore_ascii_case(name)),
        None => true,
    };

    if let Some(table) = active_table {
        query.main_table_name = Some(table.to_string());
        query.table_from_config = true;
    }

    let literal = query
        .command_name
        .as_deref()
        .is_some_and(|name| name.eq_ignore_ascii_case(LITERAL_SQL_VERB));

    if literal {
        classify_literal(remaining, registry, &mut query);
    } else {
        for token in remaining {
            classify_token(token.as_ref(), registry, &mut query);
        }
    }

    query.options = registry.effective_options();
    tracing::debug!(
        command = ?query.command_name,
        table = ?query.main_table_name,
        buckets = query.argument_buckets.len(),
        operators = query.operators.len(),
        "classified command"
    );
    query
}

fn classify_literal<S: AsRef<str>>(
    tokens: &[S],
    registry: &mut OptionRegistry,
    query: &mut ClassifiedQuery,
) {
    let mut tokens = tokens.iter().map(|token| -> &str { token.as_ref() }).peekable();
    while let Some(token) = tokens.next_if(|token| looks_like_option(token)) {
        let (key, value) = parse_option(token);
        registry.set_option(&key, value, Scope::Transient);
    }
    let sql: Vec<&str> = tokens.collect();
    if !sql.is_empty() {
        query.literal_sql = Some(sql.join(" "));
    }
}

fn classify_token(token: &str, registry: &mut OptionRegistry, query: &mut ClassifiedQuery) {
    if is_option_token(token) {
        let (key, value) = parse_option(token);
        registry.set_option(&key, value, Scope::Transient);
        return;
    }

    let (prefix, word) = split_prefix(token);
    let operator = find_operator(word);

    // Tokens carrying an operator are never table names
    if operator.is_none()
        && query.is_query_command
        && prefix.is_empty()
        && !word.is_empty()
        && query.main_table_name.is_none()
    {
        query.main_table_name = Some(word.to_string());
        return;
    }

    let bucket = query.argument_buckets.entry(prefix.to_string()).or_default();
    if let Some(symbol) = operator {
        query.operators.push(Operator { symbol, bucket: prefix.to_string(), index: bucket.len() });
    }
    bucket.push(word.to_string());
}

/// Per-command password carried by `-pw`
///
/// `-pw=secret` overrides the stored password; `-pw=-` forces an empty one. A
/// bare `-pw` or an empty value counts as not supplied.
#[must_use]
pub fn credential_override(query: &ClassifiedQuery) -> Option<CredentialOverride> {
    match query.option_text(CREDENTIAL_OPTION) {
        None | Some("") => None,
        Some(EMPTY_CREDENTIAL_SENTINEL) => Some(CredentialOverride::Empty),
        Some(secret) => Some(CredentialOverride::Supplied(secret.to_string())),
    }
}
