//! Splits a `.sql` migration into ordered statements per direction.
//!
//! Scripts are annotated with `-- +goose` directives:
//!
//! ```sql
//! -- +goose Up
//! CREATE TABLE post (id INTEGER PRIMARY KEY, title TEXT);
//!
//! -- +goose StatementBegin
//! CREATE TRIGGER post_touch AFTER UPDATE ON post BEGIN
//!     UPDATE post SET title = title WHERE id = NEW.id;
//! END;
//! -- +goose StatementEnd
//!
//! -- +goose Down
//! DROP TABLE post;
//! ```
//!
//! `-- +goose NO TRANSACTION` anywhere in the file disables the transaction
//! wrapper for both directions.

use gosling_common::{Error, Result};

use crate::migration::Direction;

const DIRECTIVE_PREFIX: &str = "-- +goose";
const CONTEXT_WIDTH: usize = 60;

/// Statements for one direction of one script, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub statements: Vec<String>,
    pub use_tx: bool,
}

impl Statements {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }
}

/// Both sections of a script after a full validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScript {
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub use_tx: bool,
}

impl ParsedScript {
    pub fn statements(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn into_direction(self, direction: Direction) -> Statements {
        let statements = match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        };
        Statements {
            statements,
            use_tx: self.use_tx,
        }
    }

    /// Serialize back into script text. Parsing the result yields the same
    /// statements and transaction mode.
    pub fn to_script(&self) -> String {
        let mut out = String::new();
        if !self.use_tx {
            out.push_str("-- +goose NO TRANSACTION\n");
        }
        out.push_str("-- +goose Up\n");
        for stmt in &self.up {
            write_statement(&mut out, stmt);
        }
        out.push_str("-- +goose Down\n");
        for stmt in &self.down {
            write_statement(&mut out, stmt);
        }
        out
    }
}

/// Parse `script` and return the statements for `direction`.
pub fn parse(script: &str, direction: Direction) -> Result<Statements> {
    Ok(parse_script(script)?.into_direction(direction))
}

/// Cheap scan for `-- +goose NO TRANSACTION` without validating the rest of
/// the script. Used when a migration is collected, long before it runs.
pub fn declares_no_transaction(script: &str) -> bool {
    script
        .lines()
        .any(|line| directive(line.trim()) == Some("NO TRANSACTION"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

struct Parser<'a> {
    section: Section,
    seen_up: bool,
    seen_down: bool,
    use_tx: bool,
    /// Line number and text of an open `StatementBegin`.
    block: Option<(usize, &'a str)>,
    /// Lines of the statement being assembled, with the first line's number.
    buf: Vec<&'a str>,
    buf_start: usize,
    up: Vec<String>,
    down: Vec<String>,
}

/// Parse and validate the whole script, collecting both directions.
pub fn parse_script(script: &str) -> Result<ParsedScript> {
    let mut parser = Parser {
        section: Section::Preamble,
        seen_up: false,
        seen_down: false,
        use_tx: true,
        block: None,
        buf: Vec::new(),
        buf_start: 0,
        up: Vec::new(),
        down: Vec::new(),
    };

    let mut last_line = 0;
    for (idx, line) in script.lines().enumerate() {
        last_line = idx + 1;
        parser.feed(last_line, line)?;
    }
    parser.close_section(last_line, "end of file")?;

    if !parser.seen_up && !parser.seen_down {
        return Err(malformed(
            last_line,
            script.lines().next().unwrap_or(""),
            "no `-- +goose Up` or `-- +goose Down` directive found",
        ));
    }

    Ok(ParsedScript {
        up: parser.up,
        down: parser.down,
        use_tx: parser.use_tx,
    })
}

impl<'a> Parser<'a> {
    fn feed(&mut self, lineno: usize, line: &'a str) -> Result<()> {
        let trimmed = line.trim();

        if let Some(cmd) = directive(trimmed) {
            return self.directive(lineno, line, cmd);
        }

        if self.section == Section::Preamble {
            return Ok(());
        }

        // Bracketed statements are kept verbatim, comments and blanks included.
        if self.block.is_some() {
            self.push_line(lineno, line);
            return Ok(());
        }

        if trimmed.is_empty() || trimmed.starts_with("--") {
            return Ok(());
        }

        self.push_line(lineno, line);
        if ends_with_semicolon(line) {
            self.emit();
        }
        Ok(())
    }

    fn directive(&mut self, lineno: usize, line: &'a str, cmd: &str) -> Result<()> {
        match cmd {
            "Up" => {
                self.close_section(lineno, line)?;
                if self.seen_up {
                    return Err(malformed(lineno, line, "duplicate `-- +goose Up` section"));
                }
                if self.seen_down {
                    return Err(malformed(
                        lineno,
                        line,
                        "`-- +goose Up` must come before `-- +goose Down`",
                    ));
                }
                self.seen_up = true;
                self.section = Section::Up;
            }
            "Down" => {
                self.close_section(lineno, line)?;
                if self.seen_down {
                    return Err(malformed(
                        lineno,
                        line,
                        "duplicate `-- +goose Down` section",
                    ));
                }
                self.seen_down = true;
                self.section = Section::Down;
            }
            "StatementBegin" => {
                if self.section == Section::Preamble {
                    return Err(malformed(
                        lineno,
                        line,
                        "`StatementBegin` outside of an Up or Down section",
                    ));
                }
                if let Some((open, _)) = self.block {
                    return Err(malformed(
                        lineno,
                        line,
                        &format!("nested `StatementBegin` (block opened at line {open})"),
                    ));
                }
                if !self.buf.is_empty() {
                    return Err(malformed(
                        self.buf_start,
                        self.buf[0],
                        "unfinished SQL statement before `StatementBegin` (missing semicolon?)",
                    ));
                }
                // The directive line itself is not part of the statement.
                self.block = Some((lineno, line.trim()));
            }
            "StatementEnd" => {
                if self.block.take().is_none() {
                    return Err(malformed(
                        lineno,
                        line,
                        "`StatementEnd` without a matching `StatementBegin`",
                    ));
                }
                self.emit();
            }
            "NO TRANSACTION" => self.use_tx = false,
            other => {
                return Err(malformed(
                    lineno,
                    line,
                    &format!("unknown directive `{other}`"),
                ));
            }
        }
        Ok(())
    }

    /// Validate that nothing is left dangling when a section ends.
    fn close_section(&mut self, lineno: usize, at: &str) -> Result<()> {
        if let Some((open, text)) = self.block {
            return Err(malformed(
                open,
                text,
                &format!("`StatementBegin` has no matching `StatementEnd` before line {lineno} ({at})"),
            ));
        }
        if !self.buf.is_empty() {
            return Err(malformed(
                self.buf_start,
                self.buf[0],
                "unfinished SQL statement (missing semicolon?)",
            ));
        }
        Ok(())
    }

    fn push_line(&mut self, lineno: usize, line: &'a str) {
        if self.buf.is_empty() {
            self.buf_start = lineno;
        }
        self.buf.push(line);
    }

    fn emit(&mut self) {
        let stmt = self.buf.join("\n").trim().to_string();
        self.buf.clear();
        if stmt.is_empty() {
            return;
        }
        match self.section {
            Section::Up => self.up.push(stmt),
            Section::Down => self.down.push(stmt),
            Section::Preamble => {}
        }
    }
}

fn directive(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix(DIRECTIVE_PREFIX)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// True when the code part of `line` (before any `--` comment) ends with `;`.
fn ends_with_semicolon(line: &str) -> bool {
    code_part(line).trim_end().ends_with(';')
}

/// `line` up to the first `--` that is outside a quoted literal or identifier.
/// Literals are tracked per line; a doubled quote (`'it''s'`) toggles twice.
fn code_part(line: &str) -> &str {
    let mut quote: Option<u8> = None;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'-' && bytes.get(i + 1) == Some(&b'-') => return &line[..i],
            None => {}
        }
    }
    line
}

fn write_statement(out: &mut String, stmt: &str) {
    if needs_bracket(stmt) {
        out.push_str("-- +goose StatementBegin\n");
        out.push_str(stmt);
        out.push_str("\n-- +goose StatementEnd\n");
    } else {
        out.push_str(stmt);
        out.push('\n');
    }
}

/// Whether a statement would be split or altered if written unbracketed.
fn needs_bracket(stmt: &str) -> bool {
    let lines: Vec<&str> = stmt.lines().collect();
    let Some((last, body)) = lines.split_last() else {
        return false;
    };
    if !ends_with_semicolon(last) {
        return true;
    }
    lines.iter().any(|l| {
        let t = l.trim();
        t.is_empty() || t.starts_with("--")
    }) || body.iter().any(|l| ends_with_semicolon(l))
}

fn malformed(line: usize, context: &str, message: &str) -> Error {
    let context = context.trim();
    let context = match context.char_indices().nth(CONTEXT_WIDTH) {
        Some((idx, _)) => format!("{}...", &context[..idx]),
        None => context.to_string(),
    };
    Error::MalformedScript {
        line,
        context,
        message: message.to_string(),
    }
}
