use crate::lexer;

/// Which standard stream a redirection captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectStream {
    Stdout,
    Stderr,
}

/// Whether the target file is truncated or appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate,
    Append,
}

/// A trailing `> file` style redirection attached to a single command.
///
/// Redirection and pipelines are mutually exclusive on one line: the
/// operators are only recognized on the final, non-pipelined form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    pub target: String,
    pub stream: RedirectStream,
    pub mode: RedirectMode,
}

/// The overall shape of one input line.
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedLine {
    /// Nothing to execute.
    Empty,
    /// A single command, possibly with a trailing redirection.
    Command {
        argv: Vec<String>,
        redirect: Option<RedirectionSpec>,
    },
    /// Two or more commands connected output-to-input, in order.
    Pipeline(Vec<Vec<String>>),
}

/// Classify one raw input line into [`ParsedLine`].
pub fn parse_line(line: &str) -> ParsedLine {
    let mut segments = lexer::split_pipeline(line);
    match segments.len() {
        0 => ParsedLine::Empty,
        1 => {
            let mut argv = segments.remove(0);
            let redirect = extract_redirection(&mut argv);
            if argv.is_empty() {
                ParsedLine::Empty
            } else {
                ParsedLine::Command { argv, redirect }
            }
        }
        _ => ParsedLine::Pipeline(segments),
    }
}

/// Recognize a trailing redirection operator plus target and strip both from
/// the argument vector. Operators must be standalone tokens.
fn extract_redirection(argv: &mut Vec<String>) -> Option<RedirectionSpec> {
    let op_index = argv.len().checked_sub(2)?;
    let (stream, mode) = match argv[op_index].as_str() {
        ">" | "1>" => (RedirectStream::Stdout, RedirectMode::Truncate),
        ">>" | "1>>" => (RedirectStream::Stdout, RedirectMode::Append),
        "2>" => (RedirectStream::Stderr, RedirectMode::Truncate),
        "2>>" => (RedirectStream::Stderr, RedirectMode::Append),
        _ => return None,
    };
    let target = argv.pop()?;
    argv.pop();
    Some(RedirectionSpec { target, stream, mode })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(parse_line(""), ParsedLine::Empty);
        assert_eq!(parse_line("   "), ParsedLine::Empty);
    }

    #[test]
    fn simple_command_has_no_redirect() {
        assert_eq!(
            parse_line("echo hi"),
            ParsedLine::Command { argv: argv(&["echo", "hi"]), redirect: None }
        );
    }

    #[test]
    fn pipeline_of_three() {
        assert_eq!(
            parse_line("a | b | c"),
            ParsedLine::Pipeline(vec![argv(&["a"]), argv(&["b"]), argv(&["c"])])
        );
    }

    #[test]
    fn quoted_pipe_stays_single_command() {
        assert_eq!(
            parse_line("echo 'x | y'"),
            ParsedLine::Command { argv: argv(&["echo", "x | y"]), redirect: None }
        );
    }

    #[test]
    fn stdout_redirect_operators() {
        for (op, mode) in [(">", RedirectMode::Truncate), (">>", RedirectMode::Append)] {
            let line = format!("echo hi {op} out.txt");
            assert_eq!(
                parse_line(&line),
                ParsedLine::Command {
                    argv: argv(&["echo", "hi"]),
                    redirect: Some(RedirectionSpec {
                        target: "out.txt".to_string(),
                        stream: RedirectStream::Stdout,
                        mode,
                    }),
                }
            );
        }
    }

    #[test]
    fn explicit_fd_operators() {
        let parsed = parse_line("cmd 1>> log.txt");
        assert_eq!(
            parsed,
            ParsedLine::Command {
                argv: argv(&["cmd"]),
                redirect: Some(RedirectionSpec {
                    target: "log.txt".to_string(),
                    stream: RedirectStream::Stdout,
                    mode: RedirectMode::Append,
                }),
            }
        );

        let parsed = parse_line("cmd 2> err.txt");
        assert_eq!(
            parsed,
            ParsedLine::Command {
                argv: argv(&["cmd"]),
                redirect: Some(RedirectionSpec {
                    target: "err.txt".to_string(),
                    stream: RedirectStream::Stderr,
                    mode: RedirectMode::Truncate,
                }),
            }
        );
    }

    #[test]
    fn operator_without_command_is_empty() {
        assert_eq!(parse_line("> out.txt"), ParsedLine::Empty);
    }

    #[test]
    fn operator_not_in_trailing_position_is_plain_argument() {
        assert_eq!(
            parse_line("echo > out.txt extra"),
            ParsedLine::Command { argv: argv(&["echo", ">", "out.txt", "extra"]), redirect: None }
        );
    }
}
