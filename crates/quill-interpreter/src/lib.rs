//! # quill-interpreter
//!
//! Pure, synchronous interpreter for pattern-based edit commands against a
//! draft buffer. Commands are all-or-nothing: a failure returns a typed
//! [`EngineError`] and the caller's buffer is untouched — the interpreter
//! never mutates in place, it returns the next buffer on success.
//!
//! The interpreter only ever sees the AI draft, never canonical content, so
//! staleness of the human-owned copy cannot affect it.

use quill_protocol::{CommandOutcome, EditCommand, EngineError, EngineResult, LineRange};

/// Apply one command to `buffer`, producing the outcome without touching
/// the input.
pub fn apply(buffer: &str, command: &EditCommand) -> EngineResult<CommandOutcome> {
    match command {
        EditCommand::View { range } => view(buffer, *range),
        EditCommand::StrReplace { old, new } => str_replace(buffer, old, new),
        EditCommand::Insert { insert_line, text } => insert(buffer, *insert_line, text),
        EditCommand::Append { text } => Ok(append(buffer, text)),
        EditCommand::Create { text } => Ok(CommandOutcome::Mutated {
            buffer: text.clone(),
        }),
    }
}

fn view(buffer: &str, range: Option<LineRange>) -> EngineResult<CommandOutcome> {
    let lines: Vec<&str> = buffer.lines().collect();
    let line_count = lines.len();

    let text = match range {
        None => buffer.to_string(),
        Some(LineRange { start, end }) => {
            if start == 0 {
                return Err(EngineError::InvalidRange(
                    "view range is 1-indexed, start must be at least 1".into(),
                ));
            }
            if start > end {
                return Err(EngineError::InvalidRange(format!(
                    "view range start {start} is past end {end}"
                )));
            }
            if start > line_count {
                return Err(EngineError::InvalidRange(format!(
                    "view range starts at line {start} but the buffer has {line_count} lines"
                )));
            }
            let end = end.min(line_count);
            lines[start - 1..end].join("\n")
        }
    };

    Ok(CommandOutcome::View { text, line_count })
}

fn str_replace(buffer: &str, old: &str, new: &str) -> EngineResult<CommandOutcome> {
    if old.is_empty() {
        return Err(EngineError::InvalidCommand(
            "str_replace requires a non-empty search string".into(),
        ));
    }

    let count = buffer.matches(old).count();
    match count {
        0 => Err(EngineError::NoMatch),
        1 => Ok(CommandOutcome::Mutated {
            buffer: buffer.replacen(old, new, 1),
        }),
        count => Err(EngineError::AmbiguousMatch { count }),
    }
}

fn insert(buffer: &str, insert_line: usize, text: &str) -> EngineResult<CommandOutcome> {
    let mut lines: Vec<&str> = buffer.lines().collect();
    if insert_line > lines.len() {
        return Err(EngineError::InvalidRange(format!(
            "insert_line {insert_line} is past the last line ({})",
            lines.len()
        )));
    }

    lines.insert(insert_line, text);
    let mut joined = lines.join("\n");
    if buffer.ends_with('\n') {
        joined.push('\n');
    }
    Ok(CommandOutcome::Mutated { buffer: joined })
}

fn append(buffer: &str, text: &str) -> CommandOutcome {
    let mut next = buffer.to_string();
    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(text);
    CommandOutcome::Mutated { buffer: next }
}
