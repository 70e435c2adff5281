//! Line-based operator input.
//!
//! [`terminal`] edits lines with rustyline; [`LineInput`] reads any
//! `BufRead`, which is what tests feed.

use std::cell::RefCell;
use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::cancel::CancelFlag;
use crate::gate::InputSource;

/// Marker printed before the operator types.
pub const INPUT_MARKER: &str = "You: ";

/// Prints each prompt to `writer` and reads one line from `reader`.
pub struct LineInput<R, W> {
    reader: RefCell<R>,
    writer: RefCell<W>,
}

impl<R: BufRead, W: Write> LineInput<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: RefCell::new(reader),
            writer: RefCell::new(writer),
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

impl<R: BufRead, W: Write> InputSource for LineInput<R, W> {
    fn read_line(&self, prompt: &str) -> Result<String> {
        {
            let mut writer = self.writer.borrow_mut();
            write!(writer, "\n{}\n{INPUT_MARKER}", prompt.trim_end()).context("write prompt")?;
            writer.flush().context("flush prompt")?;
        }

        let mut line = String::new();
        let read = self
            .reader
            .borrow_mut()
            .read_line(&mut line)
            .context("read operator input")?;
        if read == 0 {
            bail!("operator input closed");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Interactive operator input on the controlling terminal.
///
/// The editor is opened on the first question, so commands that never ask
/// anything leave the terminal alone. Ctrl-C trips the optional cancel flag.
pub struct ReadlineInput {
    editor: RefCell<Option<DefaultEditor>>,
    cancel: Option<CancelFlag>,
}

impl ReadlineInput {
    pub fn new() -> Self {
        Self {
            editor: RefCell::new(None),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for ReadlineInput {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator input for the CLI.
pub fn terminal() -> ReadlineInput {
    ReadlineInput::new()
}

impl InputSource for ReadlineInput {
    fn read_line(&self, prompt: &str) -> Result<String> {
        let mut slot = self.editor.borrow_mut();
        if slot.is_none() {
            *slot = Some(DefaultEditor::new().context("open line editor")?);
        }
        let Some(editor) = slot.as_mut() else {
            bail!("line editor unavailable");
        };

        eprintln!("\n{}", prompt.trim_end());
        let line = answer(editor.readline(INPUT_MARKER), self.cancel.as_ref())?;
        if !line.trim().is_empty()
            && let Err(err) = editor.add_history_entry(line.as_str())
        {
            debug!(%err, "answer not added to history");
        }
        Ok(line)
    }
}

/// Map a readline outcome to an answer. Ctrl-C and Ctrl-D both close the
/// input; Ctrl-C also cancels.
fn answer(read: Result<String, ReadlineError>, cancel: Option<&CancelFlag>) -> Result<String> {
    match read {
        Ok(line) => Ok(line),
        Err(ReadlineError::Interrupted) => {
            if let Some(cancel) = cancel {
                cancel.cancel();
            }
            bail!("operator input closed (interrupted)")
        }
        Err(ReadlineError::Eof) => bail!("operator input closed"),
        Err(err) => Err(err).context("read operator input"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn prints_prompt_then_reads_a_line() {
        let input = LineInput::new(Cursor::new("moderate\r\nlong-term\n"), Vec::new());

        assert_eq!(input.read_line("Risk?").expect("first"), "moderate");
        assert_eq!(input.read_line("Horizon?\n").expect("second"), "long-term");

        let (_, written) = input.into_parts();
        let written = String::from_utf8(written).expect("utf8");
        assert_eq!(written, "\nRisk?\nYou: \nHorizon?\nYou: ");
    }

    #[test]
    fn end_of_input_is_an_error() {
        let input = LineInput::new(Cursor::new(""), Vec::new());
        let err = input.read_line("Ticker?").unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn blank_line_is_an_answer() {
        let input = LineInput::new(Cursor::new("\n"), Vec::new());
        assert_eq!(input.read_line("Ticker?").expect("read"), "");
    }

    #[test]
    fn interrupt_closes_input_and_cancels() {
        let cancel = CancelFlag::new();
        let err = answer(Err(ReadlineError::Interrupted), Some(&cancel)).unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn end_of_file_closes_input_without_cancelling() {
        let cancel = CancelFlag::new();
        let err = answer(Err(ReadlineError::Eof), Some(&cancel)).unwrap_err();
        assert_eq!(err.to_string(), "operator input closed");
        assert!(!cancel.is_cancelled());
        assert_eq!(
            answer(Ok("moderate".into()), None).expect("answer"),
            "moderate"
        );
    }

    #[test]
    fn terminal_does_not_open_an_editor_until_asked() {
        let input = terminal();
        assert!(input.editor.borrow().is_none());
    }
}
