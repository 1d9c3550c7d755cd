//! Raw-mode line editor: byte-at-a-time key handling, history recall over
//! the arrow keys and tab completion against the command index.
//!
//! The editor itself is generic over its key source and terminal sink so the
//! whole state machine is testable without a tty. [`read_line`] owns the
//! terminal side: it flips the tty into raw mode for the duration of one
//! line and guarantees restoration on every exit path.

use crate::completion::CompletionTrie;
use std::io::{self, Read, Write};

const KEY_CTRL_C: u8 = 0x03;
const KEY_CTRL_D: u8 = 0x04;
const KEY_TAB: u8 = b'\t';
const KEY_ESC: u8 = 0x1b;
const KEY_BACKSPACE: u8 = 0x7f;
const BELL: &[u8] = b"\x07";
const CURSOR_LEFT: &[u8] = b"\x1b[D";
const CURSOR_RIGHT: &[u8] = b"\x1b[C";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Editing,
    AwaitingEscape,
    AwaitingEscapeSequence,
}

/// One line's worth of editing state over a key source and a terminal sink.
pub struct LineEditor<'a, R: Read, W: Write> {
    keys: R,
    term: W,
    prompt: &'a str,
    buffer: Vec<char>,
    cursor: usize,
    history: &'a [String],
    completions: &'a CompletionTrie,
    /// Index into `history`; equal to `history.len()` while editing the
    /// fresh, not-yet-submitted line.
    history_index: usize,
    saved_line: Vec<char>,
    /// Width drawn by the previous redraw, so shrinking lines get erased.
    rendered: usize,
    pending_tab: bool,
    state: State,
}

impl<'a, R: Read, W: Write> LineEditor<'a, R, W> {
    pub fn new(
        keys: R,
        term: W,
        prompt: &'a str,
        history: &'a [String],
        completions: &'a CompletionTrie,
    ) -> Self {
        Self {
            keys,
            term,
            prompt,
            buffer: Vec::new(),
            cursor: 0,
            history,
            completions,
            history_index: history.len(),
            saved_line: Vec::new(),
            rendered: 0,
            pending_tab: false,
            state: State::Editing,
        }
    }

    /// Drive the editor until the line is accepted or input ends.
    ///
    /// `Ok(None)` means end of input with nothing typed: the session should
    /// terminate. A cancelled line comes back as `Ok(Some(""))`.
    pub fn run(&mut self) -> io::Result<Option<String>> {
        write!(self.term, "{}", self.prompt)?;
        self.term.flush()?;

        let mut byte = [0u8; 1];
        loop {
            let n = match self.keys.read(&mut byte) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                // Input source closed mid-line: accept what was typed.
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                self.term.write_all(b"\r\n")?;
                self.term.flush()?;
                return Ok(Some(self.buffer.iter().collect()));
            }

            let key = byte[0];
            if key != KEY_TAB {
                self.pending_tab = false;
            }
            match self.state {
                State::Editing => {
                    if let Some(line) = self.handle_key(key)? {
                        return Ok(line);
                    }
                }
                State::AwaitingEscape => {
                    self.state = match key {
                        b'[' | b'O' => State::AwaitingEscapeSequence,
                        _ => State::Editing,
                    };
                }
                State::AwaitingEscapeSequence => self.handle_escape_sequence(key)?,
            }
        }
    }

    /// One key in the ordinary editing state. `Some` means the read is over.
    fn handle_key(&mut self, key: u8) -> io::Result<Option<Option<String>>> {
        match key {
            b'\r' | b'\n' => {
                self.term.write_all(b"\r\n")?;
                self.term.flush()?;
                Ok(Some(Some(self.buffer.iter().collect())))
            }
            KEY_CTRL_C => {
                // Discard the line; the caller prompts afresh.
                self.term.write_all(b"^C\r\n")?;
                self.term.flush()?;
                Ok(Some(Some(String::new())))
            }
            KEY_CTRL_D => {
                if self.buffer.is_empty() {
                    self.term.write_all(b"\r\n")?;
                    self.term.flush()?;
                    return Ok(Some(None));
                }
                // On a non-empty line Ctrl-D deletes under the cursor.
                if self.cursor < self.buffer.len() {
                    self.buffer.remove(self.cursor);
                    self.redraw()?;
                }
                Ok(None)
            }
            KEY_BACKSPACE | 0x08 => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.buffer.remove(self.cursor);
                    self.redraw()?;
                }
                Ok(None)
            }
            KEY_TAB => {
                self.complete()?;
                Ok(None)
            }
            KEY_ESC => {
                self.state = State::AwaitingEscape;
                Ok(None)
            }
            printable @ 0x20..=0x7e => {
                let ch = printable as char;
                self.buffer.insert(self.cursor, ch);
                self.cursor += 1;
                if self.cursor == self.buffer.len() {
                    // Appending at the end only needs the echo.
                    self.term.write_all(&[printable])?;
                    self.term.flush()?;
                    self.rendered = self.buffer.len();
                } else {
                    self.redraw()?;
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn handle_escape_sequence(&mut self, key: u8) -> io::Result<()> {
        match key {
            b'A' => {
                self.state = State::Editing;
                self.history_previous()
            }
            b'B' => {
                self.state = State::Editing;
                self.history_next()
            }
            b'C' => {
                self.state = State::Editing;
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                    self.term.write_all(CURSOR_RIGHT)?;
                    self.term.flush()?;
                }
                Ok(())
            }
            b'D' => {
                self.state = State::Editing;
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.term.write_all(CURSOR_LEFT)?;
                    self.term.flush()?;
                }
                Ok(())
            }
            // Parameter bytes of longer sequences (e.g. "\x1b[1;5C").
            b'0'..=b'9' | b';' => Ok(()),
            _ => {
                self.state = State::Editing;
                Ok(())
            }
        }
    }

    fn history_previous(&mut self) -> io::Result<()> {
        if self.history_index == 0 {
            self.term.write_all(BELL)?;
            self.term.flush()?;
            return Ok(());
        }
        if self.history_index == self.history.len() {
            self.saved_line = self.buffer.clone();
        }
        self.history_index -= 1;
        self.buffer = self.history[self.history_index].chars().collect();
        self.cursor = self.buffer.len();
        self.redraw()
    }

    fn history_next(&mut self) -> io::Result<()> {
        if self.history_index >= self.history.len() {
            self.term.write_all(BELL)?;
            self.term.flush()?;
            return Ok(());
        }
        self.history_index += 1;
        self.buffer = if self.history_index == self.history.len() {
            std::mem::take(&mut self.saved_line)
        } else {
            self.history[self.history_index].chars().collect()
        };
        self.cursor = self.buffer.len();
        self.redraw()
    }

    /// Tab completion over the command word.
    ///
    /// Only the first word completes, and only with the cursor at the end of
    /// the line. One candidate is inserted with a trailing space; several
    /// candidates first extend to their longest shared prefix, and a second
    /// consecutive tab lists them all.
    fn complete(&mut self) -> io::Result<()> {
        let at_end = self.cursor == self.buffer.len();
        let single_word = !self.buffer.iter().any(|c| c.is_whitespace());
        if self.buffer.is_empty() || !at_end || !single_word {
            self.pending_tab = false;
            return self.bell();
        }

        let prefix: String = self.buffer.iter().collect();
        let candidates = self.completions.matches(&prefix);
        match candidates.len() {
            0 => {
                self.pending_tab = false;
                self.bell()
            }
            1 => {
                self.pending_tab = false;
                self.buffer.extend(candidates[0][prefix.len()..].chars());
                self.buffer.push(' ');
                self.cursor = self.buffer.len();
                self.redraw()
            }
            _ => {
                if self.pending_tab {
                    self.pending_tab = false;
                    write!(self.term, "\r\n{}\r\n", candidates.join("  "))?;
                    self.rendered = 0;
                    return self.redraw();
                }
                self.pending_tab = true;
                match self.completions.longest_unique_extension(&prefix) {
                    Some(ext) if !ext.is_empty() => {
                        self.buffer.extend(ext.chars());
                        self.cursor = self.buffer.len();
                        self.redraw()
                    }
                    _ => self.bell(),
                }
            }
        }
    }

    fn bell(&mut self) -> io::Result<()> {
        self.term.write_all(BELL)?;
        self.term.flush()
    }

    /// Repaint the whole line in place and park the cursor.
    fn redraw(&mut self) -> io::Result<()> {
        let text: String = self.buffer.iter().collect();
        write!(self.term, "\r{}{}", self.prompt, text)?;
        let width = self.buffer.len();
        if self.rendered > width {
            for _ in width..self.rendered {
                self.term.write_all(b" ")?;
            }
            for _ in width..self.rendered {
                self.term.write_all(CURSOR_LEFT)?;
            }
        }
        for _ in self.cursor..width {
            self.term.write_all(CURSOR_LEFT)?;
        }
        self.rendered = width;
        self.term.flush()
    }
}

/// Read one line from the controlling terminal in raw mode.
///
/// Restores the terminal attributes on every exit path, including errors.
/// When stdin is not a tty (a piped script, say) the editor is skipped and a
/// plain buffered line read is used instead.
#[cfg(unix)]
pub fn read_line(
    prompt: &str,
    history: &[String],
    completions: &CompletionTrie,
) -> io::Result<Option<String>> {
    use termios::{ECHO, ICANON, ISIG, TCSANOW, Termios, VMIN, VTIME, tcsetattr};

    let fd = libc::STDIN_FILENO;
    if unsafe { libc::isatty(fd) } == 0 {
        return read_line_cooked(prompt);
    }

    let original = Termios::from_fd(fd)?;
    let mut raw = original;
    raw.c_lflag &= !(ICANON | ECHO | ISIG);
    raw.c_cc[VMIN] = 1;
    raw.c_cc[VTIME] = 0;
    tcsetattr(fd, TCSANOW, &raw)?;
    let _restore = scopeguard::guard(original, |orig| {
        let _ = tcsetattr(fd, TCSANOW, &orig);
    });

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut editor = LineEditor::new(stdin.lock(), stdout.lock(), prompt, history, completions);
    editor.run()
}

#[cfg(not(unix))]
pub fn read_line(
    prompt: &str,
    _history: &[String],
    _completions: &CompletionTrie,
) -> io::Result<Option<String>> {
    read_line_cooked(prompt)
}

fn read_line_cooked(prompt: &str) -> io::Result<Option<String>> {
    let mut out = io::stdout();
    write!(out, "{}", prompt)?;
    out.flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn trie() -> CompletionTrie {
        let mut t = CompletionTrie::new();
        for name in ["git", "grep", "grpc-tool"] {
            t.insert(name);
        }
        t
    }

    fn run_editor(keys: &[u8], history: &[String], trie: &CompletionTrie) -> (Option<String>, String) {
        let mut term = Vec::new();
        let result = {
            let mut editor = LineEditor::new(Cursor::new(keys.to_vec()), &mut term, "$ ", history, trie);
            editor.run().unwrap()
        };
        (result, String::from_utf8_lossy(&term).into_owned())
    }

    #[test]
    fn typing_and_enter_accepts_the_line() {
        let t = trie();
        let (line, term) = run_editor(b"echo hi\r", &[], &t);
        assert_eq!(line, Some("echo hi".to_string()));
        assert!(term.starts_with("$ echo hi"));
        assert!(term.ends_with("\r\n"));
    }

    #[test]
    fn backspace_removes_the_previous_char() {
        let t = trie();
        let (line, _) = run_editor(b"ab\x7f\r", &[], &t);
        assert_eq!(line, Some("a".to_string()));
    }

    #[test]
    fn left_arrow_then_typing_inserts_mid_line() {
        let t = trie();
        let (line, _) = run_editor(b"ac\x1b[Db\r", &[], &t);
        assert_eq!(line, Some("abc".to_string()));
    }

    #[test]
    fn right_arrow_moves_back_toward_the_end() {
        let t = trie();
        let (line, _) = run_editor(b"ab\x1b[D\x1b[Dx\x1b[C\x1b[Cy\r", &[], &t);
        assert_eq!(line, Some("xaby".to_string()));
    }

    #[test]
    fn up_arrow_recalls_most_recent_entry() {
        let t = trie();
        let history = vec!["older".to_string(), "newest".to_string()];
        let (line, _) = run_editor(b"\x1b[A\r", &history, &t);
        assert_eq!(line, Some("newest".to_string()));
    }

    #[test]
    fn up_up_walks_backward_in_order() {
        let t = trie();
        let history = vec!["older".to_string(), "newest".to_string()];
        let (line, _) = run_editor(b"\x1b[A\x1b[A\r", &history, &t);
        assert_eq!(line, Some("older".to_string()));
    }

    #[test]
    fn down_arrow_restores_the_line_in_progress() {
        let t = trie();
        let history = vec!["recalled".to_string()];
        let (line, _) = run_editor(b"xy\x1b[A\x1b[B\r", &history, &t);
        assert_eq!(line, Some("xy".to_string()));
    }

    #[test]
    fn up_past_the_oldest_entry_rings_the_bell() {
        let t = trie();
        let history = vec!["only".to_string()];
        let (line, term) = run_editor(b"\x1b[A\x1b[A\r", &history, &t);
        assert_eq!(line, Some("only".to_string()));
        assert!(term.contains('\x07'));
    }

    #[test]
    fn unique_completion_inserts_name_and_space() {
        let t = trie();
        let (line, _) = run_editor(b"gi\t\r", &[], &t);
        assert_eq!(line, Some("git ".to_string()));
    }

    #[test]
    fn ambiguous_completion_bells_then_lists_on_second_tab() {
        let t = trie();
        let (line, term) = run_editor(b"gr\t\t\r", &[], &t);
        assert_eq!(line, Some("gr".to_string()));
        assert!(term.contains('\x07'));
        assert!(term.contains("grep  grpc-tool"));
    }

    #[test]
    fn shared_prefix_is_extended_before_listing() {
        let mut t = CompletionTrie::new();
        t.insert("grep-files");
        t.insert("grep-dirs");
        let (line, _) = run_editor(b"gr\t\r", &[], &t);
        assert_eq!(line, Some("grep-".to_string()));
    }

    #[test]
    fn completion_with_no_candidates_bells() {
        let t = trie();
        let (line, term) = run_editor(b"zz\t\r", &[], &t);
        assert_eq!(line, Some("zz".to_string()));
        assert!(term.contains('\x07'));
    }

    #[test]
    fn completion_ignores_later_words() {
        let t = trie();
        let (line, term) = run_editor(b"git stat\t\r", &[], &t);
        assert_eq!(line, Some("git stat".to_string()));
        assert!(term.contains('\x07'));
    }

    #[test]
    fn ctrl_d_on_empty_line_ends_input() {
        let t = trie();
        let (line, _) = run_editor(b"\x04", &[], &t);
        assert_eq!(line, None);
    }

    #[test]
    fn ctrl_d_mid_line_deletes_under_cursor() {
        let t = trie();
        let (line, _) = run_editor(b"abc\x1b[D\x1b[D\x04\r", &[], &t);
        assert_eq!(line, Some("ac".to_string()));
    }

    #[test]
    fn ctrl_c_cancels_the_line() {
        let t = trie();
        let (line, term) = run_editor(b"doomed\x03", &[], &t);
        assert_eq!(line, Some(String::new()));
        assert!(term.contains("^C"));
    }

    #[test]
    fn eof_mid_line_accepts_what_was_typed() {
        let t = trie();
        let (line, _) = run_editor(b"partial", &[], &t);
        assert_eq!(line, Some("partial".to_string()));
    }

    #[test]
    fn unknown_escape_sequences_are_swallowed() {
        let t = trie();
        // Home key ("\x1b[1~" style prefix) must not leak bytes into the line.
        let (line, _) = run_editor(b"ok\x1b[1Z\r", &[], &t);
        assert_eq!(line, Some("ok".to_string()));
    }
}
