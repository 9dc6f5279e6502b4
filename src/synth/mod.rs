//! SQL Synthesis
//!
//! Turns a [`ClassifiedQuery`] into SQL text. The [`SqlSynthesizer`] trait is
//! the seam the session calls after deduction; [`TqlSynthesizer`] implements
//! the terse grammar:
//!
//! | Token | Meaning |
//! |---|---|
//! | `+col` | select-list entry (default `*`) |
//! | `/col` | ORDER BY column |
//! | `%col` | GROUP BY column |
//! | `col=v`, `col<v`, `col!=v`, ... | WHERE predicate |
//! | `col:=v`, `col+=v`, ... | UPDATE assignment |
//! | `col.=v` | INSERT column/value |
//! | `col~=v` | DELETE row marker |
//! | `-o` | join predicates with OR instead of AND |
//! | `-2v` | `!=` also matches NULL |
//! | `-limit=N` | LIMIT clause |

use crate::classifier::{ClassifiedQuery, Operator};
use crate::deducer::{
    deduce_query_type, operator_kind, QueryKind, DELETE_OPERATOR, INSERT_OPERATOR,
};
use crate::error::{MiniError, Result};

/// Bucket of plain tokens
const WHERE_BUCKET: &str = "";
const SELECT_BUCKET: &str = "+";
const ORDER_BUCKET: &str = "/";
const GROUP_BUCKET: &str = "%";

/// Option selecting OR as the predicate connective
const OR_OPTION: &str = "o";
/// Option selecting two-valued logic
const TWO_VALUED_OPTION: &str = "2v";
/// Option carrying the row limit
const LIMIT_OPTION: &str = "limit";
/// Flag naming an insert
const INSERT_FLAG: &str = "I";

/// Comparison operators, longest first
const PREDICATE_OPERATORS: [&str; 8] = ["<=", ">=", "!=", "<>", "==", "=", "<", ">"];

/// Builds SQL text from a classified query
pub trait SqlSynthesizer {
    /// SQL text plus the kind of statement it is
    fn synthesize(&self, query: &ClassifiedQuery) -> Result<(String, QueryKind)>;
}

/// Synthesizer for the terse query language
#[derive(Debug, Clone, Copy, Default)]
pub struct TqlSynthesizer;

impl SqlSynthesizer for TqlSynthesizer {
    fn synthesize(&self, query: &ClassifiedQuery) -> Result<(String, QueryKind)> {
        if let Some(sql) = &query.literal_sql {
            let kind = sql
                .split_whitespace()
                .next()
                .and_then(QueryKind::from_verb)
                .unwrap_or(QueryKind::Undetermined);
            return Ok((sql.clone(), kind));
        }

        let kind = match query.kind {
            Some(kind) => kind,
            None => deduce_query_type(query)?,
        };
        let table = query.main_table_name.as_deref().ok_or(MiniError::MissingTable)?;
        if !is_identifier(table) {
            return Err(MiniError::infeasible(table));
        }

        if let Some((prefix, words)) = query.argument_buckets.iter().find(|(prefix, _)| {
            ![WHERE_BUCKET, SELECT_BUCKET, ORDER_BUCKET, GROUP_BUCKET].contains(&prefix.as_str())
        }) {
            let word = words.first().map_or("", String::as_str);
            return Err(MiniError::infeasible(format!("{prefix}{word}")));
        }
        if let Some(op) = query.operators.iter().find(|op| op.bucket != WHERE_BUCKET) {
            return Err(MiniError::infeasible(token_text(query, op)));
        }

        let sql = match kind {
            QueryKind::Select => select(query, table)?,
            QueryKind::Insert => insert(query, table)?,
            QueryKind::Update => update(query, table)?,
            QueryKind::Delete => delete(query, table)?,
            QueryKind::Undetermined => {
                return Err(MiniError::invalid_input("Query kind could not be determined"));
            }
        };

        tracing::debug!(%kind, %sql, "synthesized statement");
        Ok((sql, kind))
    }
}

fn token_text(query: &ClassifiedQuery, op: &Operator) -> String {
    let word = query.bucket(&op.bucket).get(op.index).map_or("", String::as_str);
    format!("{}{word}", op.bucket)
}

/// A plain `lhs OP rhs` token
#[derive(Debug, PartialEq)]
struct Predicate<'a> {
    column: &'a str,
    op: &'a str,
    value: &'a str,
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn parse_predicate(word: &str) -> Result<Predicate<'_>> {
    let found = word.char_indices().find_map(|(idx, _)| {
        PREDICATE_OPERATORS.iter().find(|op| word[idx..].starts_with(**op)).map(|op| (idx, *op))
    });
    let Some((idx, op)) = found else {
        return Err(MiniError::infeasible(word));
    };
    let column = &word[..idx];
    if !is_identifier(column) {
        return Err(MiniError::infeasible(word));
    }
    Ok(Predicate { column, op, value: &word[idx + op.len()..] })
}

fn is_null(value: &str) -> bool {
    value.eq_ignore_ascii_case("null")
}

fn is_numeric(value: &str) -> bool {
    value.parse::<f64>().is_ok()
        && value.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
}

/// SQL literal for a token value
///
/// Numbers and `NULL` pass through; values already in single quotes are kept;
/// everything else is quoted with embedded quotes doubled.
fn sql_literal(value: &str) -> String {
    if is_null(value) {
        return "NULL".to_string();
    }
    if is_numeric(value) {
        return value.to_string();
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

fn predicate_sql(predicate: &Predicate<'_>, two_valued: bool) -> Result<String> {
    let Predicate { column, op, value } = *predicate;
    let negated = matches!(op, "!=" | "<>");

    if is_null(value) {
        return match op {
            "=" | "==" => Ok(format!("{column} IS NULL")),
            _ if negated => Ok(format!("{column} IS NOT NULL")),
            _ => Err(MiniError::infeasible(format!("{column}{op}{value}"))),
        };
    }

    let literal = sql_literal(value);
    Ok(match op {
        "==" => format!("{column} = {literal}"),
        _ if negated && two_valued => format!("({column} <> {literal} OR {column} IS NULL)"),
        _ if negated => format!("{column} <> {literal}"),
        _ => format!("{column} {op} {literal}"),
    })
}

/// Split an operator-carrying word around its operator
fn split_assignment<'a>(word: &'a str, symbol: &str) -> Result<(&'a str, &'a str)> {
    let (column, value) = word.split_once(symbol).ok_or_else(|| MiniError::infeasible(word))?;
    if !is_identifier(column) {
        return Err(MiniError::infeasible(word));
    }
    Ok((column, value))
}

/// Plain where-bucket words and operator words, in bucket order
fn where_words(query: &ClassifiedQuery) -> impl Iterator<Item = (&str, Option<&Operator>)> {
    query
        .bucket(WHERE_BUCKET)
        .iter()
        .enumerate()
        .map(move |(idx, word)| (word.as_str(), query.operator_at(WHERE_BUCKET, idx)))
        .filter(|(word, _)| !word.is_empty())
}

fn connective(query: &ClassifiedQuery) -> &'static str {
    if query.has_option(OR_OPTION) {
        " OR "
    } else {
        " AND "
    }
}

fn where_clause(query: &ClassifiedQuery, conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(connective(query)))
    }
}

fn limit_clause(query: &ClassifiedQuery) -> Result<String> {
    match query.option_text(LIMIT_OPTION) {
        None => Ok(String::new()),
        Some(text) => text
            .parse::<u64>()
            .map(|n| format!(" LIMIT {n}"))
            .map_err(|_| MiniError::infeasible(format!("-{LIMIT_OPTION}={text}"))),
    }
}

/// Reject words in buckets the statement kind has no use for
fn forbid_buckets(query: &ClassifiedQuery, prefixes: &[&str]) -> Result<()> {
    for prefix in prefixes {
        if let Some(word) = query.bucket(prefix).first() {
            return Err(MiniError::infeasible(format!("{prefix}{word}")));
        }
    }
    Ok(())
}

fn conditions(query: &ClassifiedQuery, marker: Option<&str>) -> Result<Vec<String>> {
    let two_valued = query.has_option(TWO_VALUED_OPTION);
    where_words(query)
        .filter_map(|(word, op)| match op {
            None => Some(parse_predicate(word).and_then(|p| predicate_sql(&p, two_valued))),
            Some(op) if Some(op.symbol.as_str()) == marker => Some(
                split_assignment(word, &op.symbol)
                    .map(|(column, value)| Predicate { column, op: "=", value })
                    .and_then(|p| predicate_sql(&p, two_valued)),
            ),
            Some(_) => None,
        })
        .collect()
}

fn select(query: &ClassifiedQuery, table: &str) -> Result<String> {
    if let Some((word, _)) = where_words(query).find(|(_, op)| op.is_some()) {
        return Err(MiniError::infeasible(word));
    }

    let columns = query.bucket(SELECT_BUCKET);
    let columns = if columns.is_empty() { "*".to_string() } else { columns.join(", ") };
    let mut sql = format!("SELECT {columns} FROM {table}");
    sql.push_str(&where_clause(query, &conditions(query, None)?));

    for (prefix, clause) in [(GROUP_BUCKET, "GROUP BY"), (ORDER_BUCKET, "ORDER BY")] {
        let words = query.bucket(prefix);
        if let Some(bad) = words.iter().find(|w| !is_identifier(w)) {
            return Err(MiniError::infeasible(format!("{prefix}{bad}")));
        }
        if !words.is_empty() {
            sql.push_str(&format!(" {clause} {}", words.join(", ")));
        }
    }

    sql.push_str(&limit_clause(query)?);
    Ok(sql)
}

fn explicit_insert(query: &ClassifiedQuery) -> bool {
    query.command().is_some_and(|verb| verb == "insert") || query.has_option(INSERT_FLAG)
}

fn insert(query: &ClassifiedQuery, table: &str) -> Result<String> {
    forbid_buckets(query, &[SELECT_BUCKET, ORDER_BUCKET, GROUP_BUCKET])?;

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (word, op) in where_words(query) {
        let (column, value) = match op {
            Some(op) if op.symbol == INSERT_OPERATOR => split_assignment(word, INSERT_OPERATOR)?,
            Some(_) => return Err(MiniError::infeasible(word)),
            // Plain pairs only count when the insert was asked for by name
            None if explicit_insert(query) => match parse_predicate(word)? {
                Predicate { column, op: "=" | "==", value } => (column, value),
                _ => return Err(MiniError::infeasible(word)),
            },
            None => return Err(MiniError::infeasible(word)),
        };
        columns.push(column);
        values.push(sql_literal(value));
    }

    if columns.is_empty() {
        return Err(MiniError::invalid_input(format!(
            "INSERT into {table} needs at least one col.=value"
        )));
    }
    Ok(format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), values.join(", ")))
}

fn update(query: &ClassifiedQuery, table: &str) -> Result<String> {
    forbid_buckets(query, &[SELECT_BUCKET, ORDER_BUCKET, GROUP_BUCKET])?;

    let mut assignments = Vec::new();
    for (word, op) in where_words(query) {
        let Some(op) = op else { continue };
        if operator_kind(&op.symbol) != QueryKind::Update {
            return Err(MiniError::infeasible(word));
        }
        let (column, value) = split_assignment(word, &op.symbol)?;
        let value = sql_literal(value);
        assignments.push(match op.symbol.as_str() {
            ":=" => format!("{column} = {value}"),
            arith => format!("{column} = {column} {} {value}", &arith[..1]),
        });
    }

    if assignments.is_empty() {
        return Err(MiniError::invalid_input(format!(
            "UPDATE of {table} needs at least one col:=value"
        )));
    }

    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
    sql.push_str(&where_clause(query, &conditions(query, None)?));
    Ok(sql)
}

fn delete(query: &ClassifiedQuery, table: &str) -> Result<String> {
    forbid_buckets(query, &[SELECT_BUCKET, ORDER_BUCKET, GROUP_BUCKET])?;

    if let Some((word, _)) =
        where_words(query).find(|(_, op)| op.is_some_and(|op| op.symbol != DELETE_OPERATOR))
    {
        return Err(MiniError::infeasible(word));
    }

    let mut sql = format!("DELETE FROM {table}");
    sql.push_str(&where_clause(query, &conditions(query, Some(DELETE_OPERATOR))?));
    Ok(sql)
}
