//! Option Registry
//!
//! Options live in two scopes:
//! - Persistent: seeded once per session from configuration defaults and the
//!   hidden `MINI_OPTIONS` backdoor, then changed only by explicit `set`/`unset`
//! - Transient: set by option tokens of a single command, cleared before the next
//!
//! # Radio Groups
//! Some keys are mutually exclusive. A static key → group table drives a single
//! [`OptionRegistry::set_exclusive`] operation; activating one key of a group
//! removes every other key of that group from the target scope.
//!
//! Unknown keys are accepted as opaque flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RunMode;
use crate::error::{MiniError, Result};
use crate::render::DisplayMode;

/// Environment variable holding the undocumented persistent option string
pub const BACKDOOR_ENV: &str = "MINI_OPTIONS";

/// Value of a single option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionValue {
    /// Bare flag (`-k`)
    Flag,
    /// Keyed value (`-k=v`)
    Text(String),
}

impl OptionValue {
    /// String payload, if any
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Flag => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// Merged or single-scope option map, ordered by key
pub type OptionMap = BTreeMap<String, OptionValue>;

/// Which option scope an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Session-wide
    Persistent,
    /// Current command only
    Transient,
}

/// Declared radio groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionGroup {
    /// `a` (and) / `o` (or)
    Connective,
    /// `2v` / `3v` logic
    Logic,
    /// `e` (run once) / `i` (interactive)
    Run,
    /// Result display format
    Format,
}

impl OptionGroup {
    /// All declared groups
    pub const ALL: [Self; 4] = [Self::Connective, Self::Logic, Self::Run, Self::Format];

    /// Member keys of this group
    #[must_use]
    pub const fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Connective => &["a", "o"],
            Self::Logic => &["2v", "3v"],
            Self::Run => &["e", "i"],
            Self::Format => &["tab", "wrap", "nowrap", "vertical"],
        }
    }

    /// Group that `key` belongs to, if any
    #[must_use]
    pub fn of(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.keys().contains(&key))
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connective => "connective",
            Self::Logic => "logic",
            Self::Run => "run",
            Self::Format => "format",
        }
    }
}

/// Split an option token (`--key=value`, `-flag`) into its key and value
///
/// Leading dashes are stripped and the remainder is split on the first `=`.
#[must_use]
pub fn parse_option(token: &str) -> (String, OptionValue) {
    let body = token.trim_start_matches('-');
    match body.split_once('=') {
        Some((key, value)) => (key.to_string(), OptionValue::Text(value.to_string())),
        None => (body.to_string(), OptionValue::Flag),
    }
}

/// Two-scope option store with radio-group exclusivity
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    persistent: OptionMap,
    transient: OptionMap,
    seeded: bool,
}

impl OptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_mut(&mut self, scope: Scope) -> &mut OptionMap {
        match scope {
            Scope::Persistent => &mut self.persistent,
            Scope::Transient => &mut self.transient,
        }
    }

    /// Set an option in the given scope
    ///
    /// Grouped keys go through [`Self::set_exclusive`] and are stored as flags;
    /// any value passed for them is discarded.
    pub fn set_option(&mut self, key: &str, value: OptionValue, scope: Scope) {
        match OptionGroup::of(key) {
            Some(group) => self.set_exclusive(group, key, scope),
            None => {
                self.scope_mut(scope).insert(key.to_string(), value);
            }
        }
    }

    /// Activate `key` in `group`, deactivating the rest of the group in `scope`
    pub fn set_exclusive(&mut self, group: OptionGroup, key: &str, scope: Scope) {
        debug_assert!(group.keys().contains(&key), "'{key}' is not in group {}", group.name());
        let map = self.scope_mut(scope);
        for member in group.keys() {
            map.remove(*member);
        }
        map.insert(key.to_string(), OptionValue::Flag);
    }

    /// Remove an option from a scope, returning its previous value
    pub fn unset(&mut self, key: &str, scope: Scope) -> Option<OptionValue> {
        self.scope_mut(scope).remove(key)
    }

    /// Forget all per-command options
    pub fn clear_transient(&mut self) {
        self.transient.clear();
    }

    #[must_use]
    pub fn persistent(&self) -> &OptionMap {
        &self.persistent
    }

    #[must_use]
    pub fn transient(&self) -> &OptionMap {
        &self.transient
    }

    /// Transient options layered over a copy of the persistent ones
    ///
    /// A grouped transient key also hides the persistent members of its group,
    /// so the merged view never holds two keys of one group.
    #[must_use]
    pub fn effective_options(&self) -> OptionMap {
        let mut merged = self.persistent.clone();
        for (key, value) in &self.transient {
            if let Some(group) = OptionGroup::of(key) {
                for member in group.keys() {
                    merged.remove(*member);
                }
            }
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// The active key of `group` in the merged view
    #[must_use]
    pub fn active_in_group(&self, group: OptionGroup) -> Option<&'static str> {
        let merged = self.effective_options();
        group.keys().iter().copied().find(|key| merged.contains_key(*key))
    }

    /// Seed the persistent scope from configuration defaults and the backdoor string
    ///
    /// May only be called once per session.
    pub fn seed_persistent(
        &mut self,
        format: DisplayMode,
        run_mode: RunMode,
        backdoor: Option<&str>,
    ) -> Result<()> {
        if self.seeded {
            return Err(MiniError::config_error("Persistent options have already been seeded"));
        }
        self.seeded = true;

        self.set_option(format.option_key(), OptionValue::Flag, Scope::Persistent);
        for key in run_mode.option_keys() {
            self.set_option(key, OptionValue::Flag, Scope::Persistent);
        }

        for token in backdoor.unwrap_or_default().split_whitespace() {
            if token.starts_with('-') {
                let (key, value) = parse_option(token);
                self.set_option(&key, value, Scope::Persistent);
            } else {
                tracing::debug!(token, "ignoring non-option token in {BACKDOOR_ENV}");
            }
        }

        Ok(())
    }
}
