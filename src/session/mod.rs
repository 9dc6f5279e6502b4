//! Session and Pipeline Driver
//!
//! A [`Session`] owns the settings and the persistent option scope of one
//! MINIQUERY session, and runs each dispatched command through the pipeline:
//!
//! 1. clear the transient option scope
//! 2. classify the tokens
//! 3. push a per-command credential into the executor's connection settings
//! 4. run a system command, or deduce, synthesize, execute and render a query
//!
//! Nothing outlives a dispatch except session settings, persistent options and
//! the last credential override. The override never reaches saved settings.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use crate::classifier::{
    classify, credential_override, is_option_token, ClassifiedQuery, LITERAL_SQL_VERB,
};
use crate::config::{local_settings_path, save_settings, CredentialOverride, Settings};
use crate::deducer::{assign_query_kind, QueryKind};
use crate::engine::Executor;
use crate::error::{MiniError, Result};
use crate::options::{parse_option, OptionRegistry, OptionValue, Scope};
use crate::render::{resolve_anchor, DisplayMode, Renderer, Rendering, TerminalWidth};
use crate::synth::{SqlSynthesizer, TqlSynthesizer};

/// Option that prints the synthesized SQL
const SHOW_OPTION: &str = "q";
/// Option that executes the synthesized SQL
const RUN_OPTION: &str = "r";

/// System commands: name, arguments, summary
const COMMANDS: [(&str, &str, &str); 19] = [
    ("sq", "<sql>", "Execute a literal SQL statement"),
    ("help", "", "Summary help for MINIQUERY commands"),
    ("db", "<name>", "Set the active database"),
    ("table", "[<name>]", "Set or show the active table"),
    ("clear", "", "Clear the active table"),
    ("format", "[<mode>]", "Set or show the result format"),
    ("set", "<key>[=<value>]", "Set a persistent option"),
    ("get", "[<key>]", "Inspect persistent options"),
    ("unset", "<key>", "Unset a persistent option"),
    ("setv", "<name>=<value>", "Set a variable"),
    ("getv", "<name>", "Inspect a variable"),
    ("unsetv", "<name>", "Unset a variable"),
    ("seta", "<alias>=<text>", "Set up an alias for a command"),
    ("geta", "<alias>", "Inspect an alias"),
    ("unseta", "<alias>", "Unset an alias"),
    ("setabb", "<abbr>=<full>", "Set up an abbreviation for object names"),
    ("getabb", "<abbr>", "Inspect an abbreviation"),
    ("unsetabb", "<abbr>", "Unset an abbreviation"),
    ("save", "[<file>]", "Save settings, aliases, abbreviations and variables"),
];

/// Result of one dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A system command completed
    Command,
    /// SQL was printed but not executed
    Shown { kind: QueryKind, sql: String },
    /// Rows were rendered
    Rows { kind: QueryKind, count: usize },
    /// A row-returning statement produced zero rows
    EmptyResult,
    /// A statement without result columns ran
    Affected { kind: QueryKind, rows: u64 },
}

/// One MINIQUERY session
#[derive(Debug)]
pub struct Session<E> {
    settings: Settings,
    registry: OptionRegistry,
    /// Last `-pw` override, applied on top of the stored connection settings
    credential: Option<CredentialOverride>,
    executor: E,
    synthesizer: TqlSynthesizer,
    width: TerminalWidth,
}

impl<E: Executor> Session<E> {
    #[must_use]
    pub fn new(settings: Settings, executor: E) -> Self {
        Self {
            settings,
            registry: OptionRegistry::new(),
            credential: None,
            executor,
            synthesizer: TqlSynthesizer,
            width: TerminalWidth::Unbounded,
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: TerminalWidth) -> Self {
        self.width = width;
        self
    }

    /// Seed persistent options from the settings and the backdoor string
    pub fn seed_options(&mut self, backdoor: Option<&str>) -> Result<()> {
        self.registry.seed_persistent(self.settings.format, self.settings.run_mode, backdoor)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn options(&self) -> &OptionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Classify `tokens` against the session state without running anything
    pub fn classify<T: AsRef<str>>(&mut self, tokens: &[T]) -> ClassifiedQuery {
        self.registry.clear_transient();
        classify(
            tokens,
            &self.settings.leader,
            self.settings.table.as_deref(),
            &mut self.registry,
        )
    }

    /// Settings the executor connects with: stored settings plus the credential override
    fn connection_settings(&self) -> Settings {
        let mut settings = self.settings.clone();
        if let Some(credential) = &self.credential {
            settings.connection.apply_credential(credential.clone());
        }
        settings
    }

    fn reconfigure(&mut self) -> Result<()> {
        let settings = self.connection_settings();
        self.executor.configure(&settings)
    }

    /// Run one command line, writing its output to `out`
    pub async fn dispatch<T: AsRef<str>, W: Write>(
        &mut self,
        tokens: &[T],
        out: &mut W,
    ) -> Result<Outcome> {
        let mut query = self.classify(tokens);

        if let Some(credential) = credential_override(&query) {
            tracing::debug!("per-command credential applied");
            self.credential = Some(credential);
            self.reconfigure()?;
        }

        let command = query.command();
        if query.is_explicit_command && !query.is_query_command {
            match command.as_deref() {
                Some(LITERAL_SQL_VERB) => {
                    if query.literal_sql.is_none() {
                        return Err(MiniError::invalid_input("sq requires an SQL statement"));
                    }
                }
                Some(name) => {
                    // Option tokens were consumed by the classifier
                    let args: Vec<&str> = tokens
                        .iter()
                        .skip(1)
                        .map(|token| -> &str { token.as_ref() })
                        .filter(|token| !is_option_token(token))
                        .collect();
                    return self.run_command(name, &args, out);
                }
                None => {}
            }
        } else {
            assign_query_kind(&mut query)?;
        }

        self.run_query(&query, out).await
    }

    async fn run_query<W: Write>(
        &mut self,
        query: &ClassifiedQuery,
        out: &mut W,
    ) -> Result<Outcome> {
        let (sql, kind) = self.synthesizer.synthesize(query)?;

        let show = query.has_option(SHOW_OPTION);
        let run = query.has_option(RUN_OPTION) || !show;
        if show {
            writeln!(out, "{sql}")?;
        }
        if !run {
            return Ok(Outcome::Shown { kind, sql });
        }

        let result = self.executor.execute(&sql).await?;

        if !result.has_columns() {
            let rows = result.rows_affected.unwrap_or(0);
            writeln!(out, "{rows} row(s) affected.")?;
            return Ok(Outcome::Affected { kind, rows });
        }

        let mode = DisplayMode::from_options(&query.options).unwrap_or(self.settings.format);
        let mut candidates: Vec<&str> = Vec::new();
        if let Some(sort) = query.bucket("/").first() {
            candidates.push(sort);
        }
        if let Some(anchor) =
            query.main_table_name.as_deref().and_then(|t| self.settings.anchor_column(t))
        {
            candidates.push(anchor);
        }
        let anchor = resolve_anchor(&result.columns, &candidates);

        match Renderer::new(mode, self.width).with_anchor(anchor).render(&result, out)? {
            Rendering::Empty => {
                tracing::warn!("No results returned.");
                Ok(Outcome::EmptyResult)
            }
            Rendering::Rows(count) => Ok(Outcome::Rows { kind, count }),
        }
    }

    fn run_command<W: Write>(
        &mut self,
        name: &str,
        args: &[&str],
        out: &mut W,
    ) -> Result<Outcome> {
        tracing::debug!(command = name, "system command");
        match name {
            "help" => {
                for (command, usage, summary) in COMMANDS {
                    let synopsis = format!("{}{command} {usage}", self.settings.leader);
                    writeln!(out, "{:<26} {summary}", synopsis.trim_end())?;
                }
            }
            "table" => match args.first() {
                Some(table) => self.settings.table = Some((*table).to_string()),
                None => writeln!(out, "{}", self.settings.table.as_deref().unwrap_or("(none)"))?,
            },
            "clear" => self.settings.table = None,
            "db" => {
                let database = required(args, "db <name>")?;
                let previous = self.settings.database.replace(database.to_string());
                if let Err(e) = self.reconfigure() {
                    self.settings.database = previous;
                    return Err(e);
                }
            }
            "format" => match args.first() {
                Some(format) => {
                    let mode: DisplayMode = format.parse()?;
                    self.settings.format = mode;
                    self.registry.set_option(
                        mode.option_key(),
                        OptionValue::Flag,
                        Scope::Persistent,
                    );
                }
                None => writeln!(out, "{}", self.settings.format)?,
            },
            "set" => {
                required(args, "set <key>[=<value>]")?;
                for arg in args {
                    let (key, value) = parse_option(arg);
                    if key.is_empty() {
                        return Err(MiniError::invalid_input(format!("Invalid option '{arg}'")));
                    }
                    self.registry.set_option(&key, value, Scope::Persistent);
                }
            }
            "get" => match args.first() {
                Some(arg) => {
                    let (key, _) = parse_option(arg);
                    match self.registry.persistent().get(&key) {
                        Some(value) => writeln!(out, "{}", option_display(&key, value))?,
                        None => writeln!(out, "{key} is not set")?,
                    }
                }
                None => {
                    for (key, value) in self.registry.persistent() {
                        writeln!(out, "{}", option_display(key, value))?;
                    }
                }
            },
            "unset" => {
                let (key, _) = parse_option(required(args, "unset <key>")?);
                self.registry.unset(&key, Scope::Persistent);
            }
            "setv" => {
                let (key, value) = assignment(args, "setv <name>=<value>")?;
                self.settings.variables.insert(key, value);
            }
            "getv" => lookup(&self.settings.variables, args, "getv <name>", "Variable", out)?,
            "unsetv" => {
                self.settings.variables.remove(required(args, "unsetv <name>")?);
            }
            "seta" => {
                let (key, value) = assignment(args, "seta <alias>=<text>")?;
                self.settings.aliases.insert(key, value);
            }
            "geta" => lookup(&self.settings.aliases, args, "geta <alias>", "Alias", out)?,
            "unseta" => {
                self.settings.aliases.remove(required(args, "unseta <alias>")?);
            }
            "setabb" => {
                let (key, value) = assignment(args, "setabb <abbr>=<full>")?;
                self.settings.abbreviations.insert(key, value);
            }
            "getabb" => lookup(
                &self.settings.abbreviations,
                args,
                "getabb <abbr>",
                "Abbreviation",
                out,
            )?,
            "unsetabb" => {
                self.settings.abbreviations.remove(required(args, "unsetabb <abbr>")?);
            }
            "save" => {
                let path = match args.first() {
                    Some(path) => PathBuf::from(*path),
                    None => local_settings_path()?,
                };
                save_settings(&path, &self.settings)?;
                writeln!(out, "Settings saved to {}", path.display())?;
            }
            other => return Err(MiniError::invalid_input(format!("Unknown command '{other}'"))),
        }
        Ok(Outcome::Command)
    }
}

fn required<'a>(args: &[&'a str], usage: &str) -> Result<&'a str> {
    args.first().copied().ok_or_else(|| MiniError::invalid_input(format!("Usage: {usage}")))
}

/// `name=value` spread over the remaining arguments
fn assignment(args: &[&str], usage: &str) -> Result<(String, String)> {
    let text = args.join(" ");
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(MiniError::invalid_input(format!("Usage: {usage}"))),
    }
}

/// Print the entry of `registry` named by the first argument
fn lookup<W: Write>(
    registry: &BTreeMap<String, String>,
    args: &[&str],
    usage: &str,
    what: &str,
    out: &mut W,
) -> Result<()> {
    let key = required(args, usage)?;
    let value = registry
        .get(key)
        .ok_or_else(|| MiniError::invalid_input(format!("{what} '{key}' is not defined")))?;
    writeln!(out, "{value}")?;
    Ok(())
}

fn option_display(key: &str, value: &OptionValue) -> String {
    match value.as_text() {
        Some(text) => format!("{key}={text}"),
        None => key.to_string(),
    }
}
