//! Lexical analysis for command lines: quote/escape-aware tokenization and
//! pipe-boundary splitting.

/// Character scanner shared by [`tokenize`] and [`split_pipeline`].
///
/// A single left-to-right pass with three sticky flags. Quote characters are
/// consumed, never emitted; whitespace outside quotes closes the current
/// token. Backslash handling follows shell conventions: outside quotes the
/// next character is taken literally, inside double quotes only `$`, `` ` ``,
/// `"`, `\` and newline are unescaped, and inside single quotes the backslash
/// is re-emitted together with the following character.
#[derive(Debug, Default)]
struct Scanner {
    in_single: bool,
    in_double: bool,
    escaped: bool,
    token: String,
    tokens: Vec<String>,
}

impl Scanner {
    fn new() -> Self {
        Self::default()
    }

    fn accept(&mut self, ch: char) {
        if self.escaped {
            self.escaped = false;
            if self.in_single {
                self.token.push('\\');
                self.token.push(ch);
            } else if self.in_double {
                match ch {
                    '$' | '`' | '"' | '\\' | '\n' => self.token.push(ch),
                    other => {
                        self.token.push('\\');
                        self.token.push(other);
                    }
                }
            } else {
                self.token.push(ch);
            }
            return;
        }

        match ch {
            '\\' => self.escaped = true,
            '\'' if !self.in_double => self.in_single = !self.in_single,
            '"' if !self.in_single => self.in_double = !self.in_double,
            c if c.is_whitespace() && !self.in_single && !self.in_double => self.flush_token(),
            c => self.token.push(c),
        }
    }

    /// True while the scanner sits inside a quoted span or a pending escape,
    /// i.e. while metacharacters must be taken literally.
    fn quoted(&self) -> bool {
        self.in_single || self.in_double || self.escaped
    }

    fn flush_token(&mut self) {
        if !self.token.is_empty() {
            self.tokens.push(std::mem::take(&mut self.token));
        }
    }

    fn take_tokens(&mut self) -> Vec<String> {
        self.flush_token();
        std::mem::take(&mut self.tokens)
    }

    /// Finish the scan. A dangling escape at end of input emits a literal
    /// trailing backslash; unterminated quotes are implicitly closed.
    fn finish(mut self) -> Vec<String> {
        if self.escaped {
            self.token.push('\\');
        }
        self.flush_token();
        self.tokens
    }
}

/// Split one command invocation into its argument vector.
///
/// Empty input (or input that is all unquoted whitespace) yields an empty
/// list. Quoting errors are never fatal: end of input closes any open quote.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut scanner = Scanner::new();
    for ch in line.chars() {
        scanner.accept(ch);
    }
    scanner.finish()
}

/// Split a command line on unquoted `|` into per-segment argument vectors.
///
/// Empty segments are dropped. Fewer than two segments means the line is not
/// a pipeline and must be dispatched as a single command.
pub fn split_pipeline(line: &str) -> Vec<Vec<String>> {
    let mut scanner = Scanner::new();
    let mut segments = Vec::new();
    for ch in line.chars() {
        if ch == '|' && !scanner.quoted() {
            let tokens = scanner.take_tokens();
            if !tokens.is_empty() {
                segments.push(tokens);
            }
        } else {
            scanner.accept(ch);
        }
    }
    let tokens = scanner.finish();
    if !tokens.is_empty() {
        segments.push(tokens);
    }
    segments
}
