//! Result Rendering Engine
//!
//! Formats a [`ResultSet`] as text in one of four display modes:
//! - [`DisplayMode::Tab`]: tab-separated, streamed row by row
//! - [`DisplayMode::NoWrap`]: fixed-width columns regardless of terminal width
//! - [`DisplayMode::Wrap`]: fixed-width columns split into chunks that fit the
//!   terminal, repeating an anchor column in every chunk after the first
//! - [`DisplayMode::Vertical`]: one `header: value` line per column per row
//!
//! Column width is the larger of the driver-reported display width and the
//! header length. A column holding any null is at least four wide so the
//! literal `NULL` fits.

use std::io::{IsTerminal, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::ResultSet;
use crate::error::{MiniError, Result};
use crate::options::{OptionGroup, OptionMap};

/// Text printed for SQL NULL in the fixed-width and vertical modes
pub const NULL_TEXT: &str = "NULL";

/// Minimum stars on each side of a vertical-mode banner
const BANNER_MIN_STARS: usize = 3;

/// Columns within this distance before a chunk still count as "in view"
const ANCHOR_PROXIMITY: usize = 3;

/// Display mode selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Tab,
    NoWrap,
    #[default]
    Wrap,
    Vertical,
}

impl DisplayMode {
    /// Option key selecting this mode (a member of the format group)
    #[must_use]
    pub const fn option_key(self) -> &'static str {
        match self {
            Self::Tab => "tab",
            Self::NoWrap => "nowrap",
            Self::Wrap => "wrap",
            Self::Vertical => "vertical",
        }
    }

    #[must_use]
    pub fn from_option_key(key: &str) -> Option<Self> {
        match key {
            "tab" => Some(Self::Tab),
            "nowrap" => Some(Self::NoWrap),
            "wrap" => Some(Self::Wrap),
            "vertical" => Some(Self::Vertical),
            _ => None,
        }
    }

    /// Mode selected by a merged option map, if any format option is active
    #[must_use]
    pub fn from_options(options: &OptionMap) -> Option<Self> {
        OptionGroup::Format
            .keys()
            .iter()
            .find(|key| options.contains_key(**key))
            .and_then(|key| Self::from_option_key(key))
    }
}

impl FromStr for DisplayMode {
    type Err = MiniError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_option_key(&s.to_ascii_lowercase()).ok_or_else(|| {
            MiniError::invalid_input(format!(
                "Unknown display format '{s}' (expected tab, wrap, nowrap or vertical)"
            ))
        })
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.option_key())
    }
}

/// Width available for a rendered line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalWidth {
    Columns(usize),
    Unbounded,
}

impl TerminalWidth {
    /// Column count of stdout, or `Unbounded` when stdout is not a terminal
    #[must_use]
    pub fn probe() -> Self {
        if !std::io::stdout().is_terminal() {
            return Self::Unbounded;
        }
        match terminal_size::terminal_size() {
            Some((terminal_size::Width(width), _)) => {
                tracing::debug!(width, "probed terminal width");
                Self::Columns(usize::from(width))
            }
            None => Self::Unbounded,
        }
    }

    fn fits(self, total: usize) -> bool {
        match self {
            Self::Columns(limit) => total <= limit,
            Self::Unbounded => true,
        }
    }
}

/// What a render call produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    /// Zero rows; nothing was written
    Empty,
    /// Number of rows written
    Rows(usize),
}

/// Display text of a scalar value
#[must_use]
pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => NULL_TEXT.to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Terminal columns occupied by `text`
///
/// Wide characters (CJK, most emoji) count as two columns.
#[must_use]
pub fn display_width(text: &str) -> usize {
    textwrap::core::display_width(text)
}

/// Per-column display width
#[must_use]
pub fn column_widths(result: &ResultSet) -> Vec<usize> {
    result
        .columns
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let reported = result.display_widths.get(col).copied().unwrap_or(0);
            let width = reported.max(display_width(header));
            let has_null = result
                .rows
                .iter()
                .any(|row| row.get(col).map_or(true, serde_json::Value::is_null));
            if has_null {
                width.max(NULL_TEXT.len())
            } else {
                width
            }
        })
        .collect()
}

/// Index of the anchor column
///
/// The first candidate naming an existing column wins (names compare
/// case-insensitively); otherwise the first column is the anchor.
#[must_use]
pub fn resolve_anchor(columns: &[String], candidates: &[&str]) -> usize {
    candidates
        .iter()
        .find_map(|candidate| columns.iter().position(|c| c.eq_ignore_ascii_case(candidate)))
        .unwrap_or(0)
}

/// One block of a wrapped layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Anchor column printed ahead of the range
    pub anchor: Option<usize>,
    pub first: usize,
    pub last: usize,
}

impl Chunk {
    /// Column indices in print order
    pub fn columns(&self) -> impl Iterator<Item = usize> {
        self.anchor.into_iter().chain(self.first..=self.last)
    }
}

/// Last column that fits when packing from `first`, or `None` if none fit
fn pack(
    widths: &[usize],
    limit: TerminalWidth,
    first: usize,
    anchor: Option<usize>,
) -> Option<usize> {
    let mut total = anchor.map_or(0, |a| widths[a] + 1);
    let mut last = None;
    for (col, width) in widths.iter().enumerate().skip(first) {
        if !limit.fits(total + width + 1) {
            break;
        }
        total += width + 1;
        last = Some(col);
    }
    last
}

/// Split columns into chunks that each fit `limit`
///
/// The first chunk never repeats the anchor. A later chunk drops it when its
/// natural position already lies in the chunk or within three columns before
/// it, or when nothing fits beside it. A column wider than the limit is
/// printed alone.
#[must_use]
pub fn plan_chunks(widths: &[usize], limit: TerminalWidth, anchor: usize) -> Vec<Chunk> {
    let anchor = (anchor < widths.len()).then_some(anchor);
    let mut chunks = Vec::new();
    let mut first = 0;

    while first < widths.len() {
        let mut with_anchor = if chunks.is_empty() { None } else { anchor };
        let mut last = pack(widths, limit, first, with_anchor);

        if let Some(a) = with_anchor {
            let redundant = last.is_some_and(|l| a <= l && a + ANCHOR_PROXIMITY >= first);
            if redundant || last.is_none() {
                with_anchor = None;
                last = pack(widths, limit, first, None);
            }
        }

        let last = last.unwrap_or(first);
        chunks.push(Chunk { anchor: with_anchor, first, last });
        first = last + 1;
    }

    chunks
}

/// Left-justify cells to their widths, trimming trailing padding
fn format_line<'a>(cells: impl Iterator<Item = (&'a str, usize)>) -> String {
    let mut line = String::new();
    for (i, (text, width)) in cells.enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(text);
        let len = display_width(text);
        if len < width {
            line.push_str(&" ".repeat(width - len));
        }
    }
    line.truncate(line.trim_end().len());
    line
}

/// Formats result sets for display
#[derive(Debug, Clone)]
pub struct Renderer {
    mode: DisplayMode,
    width: TerminalWidth,
    anchor: usize,
}

impl Renderer {
    #[must_use]
    pub const fn new(mode: DisplayMode, width: TerminalWidth) -> Self {
        Self { mode, width, anchor: 0 }
    }

    /// Repeat this column in every wrapped chunk after the first
    #[must_use]
    pub const fn with_anchor(mut self, anchor: usize) -> Self {
        self.anchor = anchor;
        self
    }

    /// Write `result` to `out`
    ///
    /// Zero rows writes nothing and returns [`Rendering::Empty`].
    pub fn render<W: Write>(&self, result: &ResultSet, out: &mut W) -> Result<Rendering> {
        if result.rows.is_empty() {
            return Ok(Rendering::Empty);
        }

        match self.mode {
            DisplayMode::Tab => write_tab(result, out)?,
            DisplayMode::NoWrap => {
                let widths = column_widths(result);
                let all = Chunk { anchor: None, first: 0, last: widths.len().saturating_sub(1) };
                write_block(result, &widths, all, out)?;
            }
            DisplayMode::Wrap => {
                let widths = column_widths(result);
                let chunks = plan_chunks(&widths, self.width, self.anchor);
                tracing::debug!(chunks = chunks.len(), "wrapped layout");
                for (i, chunk) in chunks.into_iter().enumerate() {
                    if i > 0 {
                        writeln!(out)?;
                    }
                    write_block(result, &widths, chunk, out)?;
                }
            }
            DisplayMode::Vertical => write_vertical(result, out)?,
        }

        Ok(Rendering::Rows(result.rows.len()))
    }

    /// Render into a string
    pub fn render_to_string(&self, result: &ResultSet) -> Result<(String, Rendering)> {
        let mut buf = Vec::new();
        let rendering = self.render(result, &mut buf)?;
        Ok((String::from_utf8_lossy(&buf).into_owned(), rendering))
    }
}

fn write_tab<W: Write>(result: &ResultSet, out: &mut W) -> Result<()> {
    writeln!(out, "{}", result.columns.join("\t"))?;
    for row in &result.rows {
        let fields: Vec<String> = row
            .iter()
            .map(|value| if value.is_null() { String::new() } else { cell_text(value) })
            .collect();
        writeln!(out, "{}", fields.join("\t"))?;
    }
    Ok(())
}

/// Header line, blank separator, then one line per row
fn write_block<W: Write>(
    result: &ResultSet,
    widths: &[usize],
    chunk: Chunk,
    out: &mut W,
) -> Result<()> {
    let header = format_line(chunk.columns().map(|c| (result.columns[c].as_str(), widths[c])));
    writeln!(out, "{header}")?;
    writeln!(out)?;

    for row in &result.rows {
        let texts: Vec<(String, usize)> = chunk
            .columns()
            .map(|c| (row.get(c).map_or_else(|| NULL_TEXT.to_string(), cell_text), widths[c]))
            .collect();
        writeln!(out, "{}", format_line(texts.iter().map(|(t, w)| (t.as_str(), *w))))?;
    }
    Ok(())
}

fn write_vertical<W: Write>(result: &ResultSet, out: &mut W) -> Result<()> {
    let header_width = result.columns.iter().map(|h| display_width(h)).max().unwrap_or(0);
    let value_width = column_widths(result).into_iter().max().unwrap_or(0);
    let record_width = header_width + 2 + value_width;

    for (ordinal, row) in result.rows.iter().enumerate() {
        writeln!(out, "{}", banner(ordinal + 1, record_width))?;
        for (col, header) in result.columns.iter().enumerate() {
            let value = row.get(col).map_or_else(|| NULL_TEXT.to_string(), cell_text);
            let pad = header_width - display_width(header);
            writeln!(out, "{}{header}: {value}", " ".repeat(pad))?;
        }
    }
    Ok(())
}

/// `*** 1. row ***` centered in `record_width` stars
fn banner(ordinal: usize, record_width: usize) -> String {
    let label = format!(" {ordinal}. row ");
    let label_len = label.chars().count();
    let total = record_width.max(label_len + 2 * BANNER_MIN_STARS);
    let left = (total - label_len) / 2;
    let right = total - label_len - left;
    format!("{}{label}{}", "*".repeat(left), "*".repeat(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users() -> ResultSet {
        ResultSet::new(
            vec!["id".to_string(), "name".to_string(), "email".to_string()],
            vec![
                vec![json!(1), json!("Alice"), json!("alice@example.com")],
                vec![json!(2), json!("Bob"), json!(null)],
            ],
        )
    }

    fn render(mode: DisplayMode, width: TerminalWidth, result: &ResultSet) -> String {
        Renderer::new(mode, width).render_to_string(result).unwrap().0
    }

    // ========================================================================
    // Mode selection
    // ========================================================================

    #[test]
    fn test_display_mode_keys() {
        for mode in [DisplayMode::Tab, DisplayMode::NoWrap, DisplayMode::Wrap, DisplayMode::Vertical] {
            assert_eq!(DisplayMode::from_option_key(mode.option_key()), Some(mode));
            assert_eq!(OptionGroup::of(mode.option_key()), Some(OptionGroup::Format));
        }
        assert_eq!("VERTICAL".parse::<DisplayMode>().unwrap(), DisplayMode::Vertical);
        assert_eq!("grid".parse::<DisplayMode>().unwrap_err().error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_display_mode_from_options() {
        let mut options = OptionMap::new();
        assert_eq!(DisplayMode::from_options(&options), None);
        options.insert("nowrap".to_string(), crate::options::OptionValue::Flag);
        assert_eq!(DisplayMode::from_options(&options), Some(DisplayMode::NoWrap));
    }

    // ========================================================================
    // Widths and anchors
    // ========================================================================

    #[test]
    fn test_column_widths() {
        let result = ResultSet::new(
            vec!["identifier".to_string(), "n".to_string()],
            vec![vec![json!(7), json!(null)]],
        );
        assert_eq!(column_widths(&result), vec![10, 4]);

        let reported = result.with_display_widths(vec![3, 12]);
        assert_eq!(column_widths(&reported), vec![10, 12]);
    }

    #[test]
    fn test_null_widens_column() {
        let result = ResultSet::new(vec!["x".to_string()], vec![vec![json!(null)]])
            .with_display_widths(vec![1]);
        assert_eq!(column_widths(&result), vec![4]);
    }

    #[test]
    fn test_resolve_anchor() {
        let columns = vec!["id".to_string(), "name".to_string(), "email".to_string()];
        assert_eq!(resolve_anchor(&columns, &["NAME"]), 1);
        assert_eq!(resolve_anchor(&columns, &["missing", "email"]), 2);
        assert_eq!(resolve_anchor(&columns, &[]), 0);
    }

    // ========================================================================
    // Chunk planning
    // ========================================================================

    #[test]
    fn test_narrow_terminal_prints_each_column_alone() {
        let chunks = plan_chunks(&[2, 4], TerminalWidth::Columns(3), 0);
        assert_eq!(
            chunks,
            vec![
                Chunk { anchor: None, first: 0, last: 0 },
                Chunk { anchor: None, first: 1, last: 1 },
            ]
        );
    }

    #[test]
    fn test_everything_fits_in_one_chunk() {
        let chunks = plan_chunks(&[2, 4, 6], TerminalWidth::Columns(80), 0);
        assert_eq!(chunks, vec![Chunk { anchor: None, first: 0, last: 2 }]);

        let chunks = plan_chunks(&[200, 300], TerminalWidth::Unbounded, 0);
        assert_eq!(chunks, vec![Chunk { anchor: None, first: 0, last: 1 }]);
    }

    #[test]
    fn test_anchor_repeats_in_later_chunks() {
        // 3 + 9 + 9 = 21 > 20 -> [0,1] then anchor 0 + [2] etc.
        let widths = [2, 8, 8, 8, 8, 8];
        let chunks = plan_chunks(&widths, TerminalWidth::Columns(20), 0);
        assert_eq!(chunks[0], Chunk { anchor: None, first: 0, last: 1 });
        // column 2 is within three of the anchor, so no repeat yet
        assert_eq!(chunks[1], Chunk { anchor: None, first: 2, last: 3 });
        assert_eq!(chunks[2], Chunk { anchor: Some(0), first: 4, last: 4 });
        assert_eq!(chunks[3], Chunk { anchor: Some(0), first: 5, last: 5 });
    }

    #[test]
    fn test_anchor_dropped_when_nothing_fits_beside_it() {
        let widths = [9, 3, 9];
        let chunks = plan_chunks(&widths, TerminalWidth::Columns(10), 0);
        assert_eq!(chunks[0], Chunk { anchor: None, first: 0, last: 0 });
        assert_eq!(chunks[1], Chunk { anchor: None, first: 1, last: 1 });
        assert_eq!(chunks[2], Chunk { anchor: None, first: 2, last: 2 });
    }

    #[test]
    fn test_anchor_inside_chunk_is_not_duplicated() {
        let widths = [4, 4, 4, 4, 4, 4, 4, 4, 4];
        let chunks = plan_chunks(&widths, TerminalWidth::Columns(16), 6);
        assert_eq!(chunks[0], Chunk { anchor: None, first: 0, last: 2 });
        // anchor 6 lies beyond [3..=4] with the anchor packed in
        assert_eq!(chunks[1], Chunk { anchor: Some(6), first: 3, last: 4 });
        // anchor 6 would fall inside [5..=6]
        assert_eq!(chunks[2], Chunk { anchor: None, first: 5, last: 7 });
        // anchor 6 sits two columns before 8
        assert_eq!(chunks[3], Chunk { anchor: None, first: 8, last: 8 });
    }

    #[test]
    fn test_oversized_column_printed_alone() {
        let chunks = plan_chunks(&[3, 50, 3], TerminalWidth::Columns(20), 0);
        assert_eq!(chunks[1], Chunk { anchor: None, first: 1, last: 1 });
        assert!(chunks.iter().all(|c| c.first <= c.last));
        assert_eq!(chunks.last().map(|c| c.last), Some(2));
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn test_empty_result_writes_nothing() {
        let result = ResultSet::new(vec!["id".to_string()], vec![]);
        let (text, rendering) = Renderer::new(DisplayMode::Wrap, TerminalWidth::Unbounded)
            .render_to_string(&result)
            .unwrap();
        assert_eq!(rendering, Rendering::Empty);
        assert_eq!(text, "");
    }

    #[test]
    fn test_tab_mode() {
        let text = render(DisplayMode::Tab, TerminalWidth::Columns(5), &users());
        assert_eq!(text, "id\tname\temail\n1\tAlice\talice@example.com\n2\tBob\t\n");
    }

    #[test]
    fn test_nowrap_mode() {
        let text = render(DisplayMode::NoWrap, TerminalWidth::Columns(10), &users());
        insta::assert_snapshot!(text.trim_end(), @r"
        id name  email

        1  Alice alice@example.com
        2  Bob   NULL
        ");
    }

    #[test]
    fn test_wide_characters_pad_by_display_width() {
        let result = ResultSet::new(
            vec!["city".to_string(), "n".to_string()],
            vec![vec![json!("東京都"), json!(1)], vec![json!("Oslo"), json!(2)]],
        );
        assert_eq!(column_widths(&result), vec![6, 1]);

        let text = render(DisplayMode::NoWrap, TerminalWidth::Unbounded, &result);
        assert_eq!(text, "city   n\n\n東京都 1\nOslo   2\n");

        // Six display columns plus the separator do not fit in six
        let chunks = plan_chunks(&column_widths(&result), TerminalWidth::Columns(6), 0);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_vertical_aligns_wide_headers() {
        let result = ResultSet::new(
            vec!["名前".to_string(), "id".to_string()],
            vec![vec![json!("x"), json!(1)]],
        );
        let text = render(DisplayMode::Vertical, TerminalWidth::Unbounded, &result);
        assert_eq!(text, "*** 1. row ***\n名前: x\n  id: 1\n");
    }

    #[test]
    fn test_wrap_matches_nowrap_when_it_fits() {
        let wide = render(DisplayMode::Wrap, TerminalWidth::Columns(80), &users());
        let nowrap = render(DisplayMode::NoWrap, TerminalWidth::Columns(80), &users());
        assert_eq!(wide, nowrap);
    }

    #[test]
    fn test_wrap_narrow_two_columns() {
        let result = ResultSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![json!(1), json!("Anna")]],
        )
        .with_display_widths(vec![2, 4]);
        let text = render(DisplayMode::Wrap, TerminalWidth::Columns(3), &result);
        assert_eq!(text, "id\n\n1\n\nname\n\nAnna\n");
    }

    #[test]
    fn test_wrap_with_anchor() {
        let columns = ["id", "col1", "col2", "col3", "col4", "col5"];
        let result = ResultSet::new(
            columns.iter().map(ToString::to_string).collect(),
            vec![vec![json!(1), json!("a"), json!("b"), json!("c"), json!("d"), json!("e")]],
        );
        let text = render(DisplayMode::Wrap, TerminalWidth::Columns(11), &result);
        insta::assert_snapshot!(text.trim_end(), @r"
        id col1

        1  a

        col2 col3

        b    c

        id col4

        1  d

        id col5

        1  e
        ");
    }

    #[test]
    fn test_vertical_mode() {
        let text = render(DisplayMode::Vertical, TerminalWidth::Unbounded, &users());
        insta::assert_snapshot!(text.trim_end(), @r"
        ******** 1. row ********
           id: 1
         name: Alice
        email: alice@example.com
        ******** 2. row ********
           id: 2
         name: Bob
        email: NULL
        ");
    }

    #[test]
    fn test_null_literal_in_fixed_modes() {
        for mode in [DisplayMode::NoWrap, DisplayMode::Wrap, DisplayMode::Vertical] {
            let text = render(mode, TerminalWidth::Unbounded, &users());
            assert!(text.contains("NULL"), "{mode}: {text}");
        }
        let tab = render(DisplayMode::Tab, TerminalWidth::Unbounded, &users());
        assert!(!tab.contains("NULL"));
    }

    #[test]
    fn test_banner() {
        assert_eq!(banner(1, 0), "*** 1. row ***");
        assert_eq!(banner(12, 20), "***** 12. row ******");
    }
}
