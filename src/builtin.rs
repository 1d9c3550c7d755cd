use crate::command::{CommandHandle, CommandKind, ExitCode, HandleFactory, Wiring};
use crate::env::Environment;
use crate::external::find_command_path;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

/// Names every builtin answers to, in dispatch order.
///
/// Kept as data so the completion index and `type` can enumerate builtins
/// without instantiating them.
pub const BUILTIN_NAMES: &[&str] = &["echo", "cd", "pwd", "exit", "type", "history", "cat", "wc"];

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// in-process on a worker thread, behind the same [`CommandHandle`] protocol
/// external processes use.
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero
    /// for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

pub(crate) type BuiltinJob = Box<
    dyn FnOnce(&mut dyn Read, &mut dyn Write, &mut dyn Write, &mut Environment) -> Result<ExitCode>
        + Send,
>;

impl<T: BuiltinCommand> HandleFactory for Factory<T> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn CommandHandle>> {
        if name != T::name() {
            return None;
        }
        let job: BuiltinJob = match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(move |stdin, stdout, stderr, env| {
                cmd.execute(stdin, stdout, stderr, env)
            }),
            // argh help output goes to stdout with status 0; usage errors go
            // to stderr with status 1.
            Err(EarlyExit { output, status }) => Box::new(move |_stdin, stdout, stderr, _env| {
                if status.is_err() {
                    writeln!(stderr, "{}", output.trim_end())?;
                    Ok(1)
                } else {
                    writeln!(stdout, "{}", output.trim_end())?;
                    Ok(0)
                }
            }),
        };
        Some(Box::new(BuiltinHandle::new(env.clone(), job)))
    }
}

/// In-process command behind the external-process handle protocol.
///
/// The job runs on its own thread over whatever streams the wirings
/// selected, so a builtin inside a pipeline pumps concurrently with its
/// neighbors exactly like a child process would. The thread works on a clone
/// of the session environment; the dispatcher decides via
/// [`CommandHandle::take_env`] whether the mutations are committed.
pub struct BuiltinHandle {
    job: Option<BuiltinJob>,
    env: Option<Environment>,
    input_wiring: Wiring,
    output_wiring: Wiring,
    error_wiring: Wiring,
    input_endpoint: Option<Box<dyn Write + Send>>,
    output_endpoint: Option<Box<dyn Read + Send>>,
    error_endpoint: Option<Box<dyn Read + Send>>,
    task: Option<JoinHandle<(ExitCode, Environment)>>,
    finished_env: Option<Environment>,
}

impl BuiltinHandle {
    pub(crate) fn new(env: Environment, job: BuiltinJob) -> Self {
        Self {
            job: Some(job),
            env: Some(env),
            input_wiring: Wiring::Terminal,
            output_wiring: Wiring::Terminal,
            error_wiring: Wiring::Terminal,
            input_endpoint: None,
            output_endpoint: None,
            error_endpoint: None,
            task: None,
            finished_env: None,
        }
    }
}

impl CommandHandle for BuiltinHandle {
    fn kind(&self) -> CommandKind {
        CommandKind::Builtin
    }

    fn wire_input(&mut self, wiring: Wiring) {
        self.input_wiring = wiring;
    }

    fn wire_output(&mut self, wiring: Wiring) {
        self.output_wiring = wiring;
    }

    fn wire_error(&mut self, wiring: Wiring) {
        self.error_wiring = wiring;
    }

    fn input(&mut self) -> Option<Box<dyn Write + Send>> {
        self.input_endpoint.take()
    }

    fn output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.output_endpoint.take()
    }

    fn error(&mut self) -> Option<Box<dyn Read + Send>> {
        self.error_endpoint.take()
    }

    fn start(&mut self) -> Result<()> {
        let mut stdin: Box<dyn Read + Send> =
            match std::mem::replace(&mut self.input_wiring, Wiring::Closed) {
                Wiring::Terminal => Box::new(io::stdin()),
                Wiring::Piped => {
                    let (reader, writer) = io::pipe()?;
                    self.input_endpoint = Some(Box::new(writer));
                    Box::new(reader)
                }
                Wiring::Closed => Box::new(io::empty()),
                Wiring::File(file) => Box::new(file),
            };
        let mut stdout: Box<dyn Write + Send> =
            match std::mem::replace(&mut self.output_wiring, Wiring::Closed) {
                Wiring::Terminal => Box::new(io::stdout()),
                Wiring::Piped => {
                    let (reader, writer) = io::pipe()?;
                    self.output_endpoint = Some(Box::new(reader));
                    Box::new(writer)
                }
                Wiring::Closed => Box::new(io::sink()),
                Wiring::File(file) => Box::new(file),
            };
        let mut stderr: Box<dyn Write + Send> =
            match std::mem::replace(&mut self.error_wiring, Wiring::Closed) {
                Wiring::Terminal => Box::new(io::stderr()),
                Wiring::Piped => {
                    let (reader, writer) = io::pipe()?;
                    self.error_endpoint = Some(Box::new(reader));
                    Box::new(writer)
                }
                Wiring::Closed => Box::new(io::sink()),
                Wiring::File(file) => Box::new(file),
            };

        let job = self.job.take().context("builtin started twice")?;
        let mut env = self.env.take().context("builtin started twice")?;
        self.task = Some(std::thread::spawn(move || {
            let code = match job(&mut *stdin, &mut *stdout, &mut *stderr, &mut env) {
                Ok(code) => code,
                Err(err) => {
                    let _ = writeln!(stderr, "{err}");
                    1
                }
            };
            let _ = stdout.flush();
            let _ = stderr.flush();
            (code, env)
        }));
        Ok(())
    }

    fn wait(&mut self) -> Result<ExitCode> {
        let task = self
            .task
            .take()
            .context("wait called before the builtin was started")?;
        match task.join() {
            Ok((code, env)) => {
                self.finished_env = Some(env);
                Ok(code)
            }
            Err(_) => Ok(1),
        }
    }

    fn take_env(&mut self) -> Option<Environment> {
        self.finished_env.take()
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME
/// environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    /// Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if t != "~" && !t.is_empty() => PathBuf::from(t),
            _ => {
                if let Some(home) = env.get_var("HOME") {
                    PathBuf::from(home)
                } else {
                    return Err(anyhow::anyhow!("cd: no target and HOME not set"));
                }
            }
        };

        let new_dir = env.resolve(&target);
        // Only the session's notion of the working directory moves; the
        // hosting process never chdirs.
        let canonical = std::fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}: No such file or directory", target.display()))?;
        if !canonical.is_dir() {
            return Err(anyhow::anyhow!("cd: {}: Not a directory", target.display()));
        }
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Terminate the session with an optional numeric status.
pub struct Exit {
    #[argh(positional)]
    /// exit status; defaults to 0, non-numeric values are treated as 0.
    pub status: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let status = self
            .status
            .as_deref()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        env.should_exit = true;
        env.exit_code = status;
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Report how a command name would be dispatched.
pub struct Type {
    #[argh(positional)]
    /// command name to classify.
    pub name: String,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if BUILTIN_NAMES.contains(&self.name.as_str()) {
            writeln!(stdout, "{} is a shell builtin", self.name)?;
            return Ok(0);
        }
        let search_paths = env.get_var("PATH").map(String::as_str).unwrap_or("");
        if let Some(path) =
            find_command_path(OsStr::new(search_paths), &env.current_dir, Path::new(&self.name))
        {
            writeln!(stdout, "{} is {}", self.name, path.display())?;
            return Ok(0);
        }
        writeln!(stdout, "{}: not found", self.name)?;
        Ok(1)
    }
}

#[derive(FromArgs)]
/// List the session history, or sync it with a file.
pub struct HistoryCmd {
    #[argh(option, short = 'r')]
    /// append the entries of this file to the in-memory history.
    pub read: Option<String>,

    #[argh(option, short = 'w')]
    /// overwrite this file with the full history.
    pub write: Option<String>,

    #[argh(option, short = 'a')]
    /// append entries recorded since the last sync with this file.
    pub append: Option<String>,

    #[argh(positional)]
    /// list only the last COUNT entries.
    pub count: Option<usize>,
}

impl BuiltinCommand for HistoryCmd {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if let Some(file) = &self.read {
            let path = env.resolve(Path::new(file));
            env.history.load(&path)?;
            return Ok(0);
        }
        if let Some(file) = &self.write {
            let path = env.resolve(Path::new(file));
            env.history.save(&path)?;
            return Ok(0);
        }
        if let Some(file) = &self.append {
            let path = env.resolve(Path::new(file));
            env.history.append_new(&path)?;
            return Ok(0);
        }

        let total = env.history.len();
        let skip = match self.count {
            Some(n) => total.saturating_sub(n),
            None => 0,
        };
        for (i, entry) in env.history.entries().iter().enumerate().skip(skip) {
            writeln!(stdout, "{:>5}  {}", i + 1, entry)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print file(s) to stdout
pub struct Cat {
    #[argh(positional, greedy)]
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            io::copy(stdin, stdout)?;
            return Ok(0);
        }
        for fname in self.files {
            let path = env.resolve(Path::new(&fname));
            let mut f = std::fs::File::open(&path)
                .map_err(|e| anyhow::anyhow!("cat: {}: {}", fname, e))?;
            io::copy(&mut f, stdout)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// count lines, words and bytes
pub struct Wc {
    #[argh(positional, greedy)]
    pub files: Vec<String>,
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            let mut buf = Vec::new();
            stdin.read_to_end(&mut buf)?;
            let (lines, words, bytes) = wc_counts(&buf);
            writeln!(stdout, "{} {} {}", lines, words, bytes)?;
            return Ok(0);
        }
        for fname in self.files {
            let path = env.resolve(Path::new(&fname));
            let data =
                std::fs::read(&path).map_err(|e| anyhow::anyhow!("wc: {}: {}", fname, e))?;
            let (lines, words, bytes) = wc_counts(&data);
            writeln!(stdout, "{} {} {} {}", lines, words, bytes, fname)?;
        }
        Ok(0)
    }
}

/// Counts over raw bytes, so arbitrary (non-UTF-8) stream data is handled.
fn wc_counts(data: &[u8]) -> (usize, usize, usize) {
    let lines = data.iter().filter(|&&b| b == b'\n').count();
    let words = data
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .count();
    (lines, words, data.len())
}
