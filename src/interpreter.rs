use crate::command::{CommandHandle, ExitCode, HandleFactory, Wiring};
use crate::completion::{self, CompletionTrie};
use crate::env::Environment;
use crate::parser::{self, ParsedLine, RedirectMode, RedirectStream, RedirectionSpec};
use crate::{builtin, editor, pipeline};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Factory allows creating instances of [`CommandHandle`].
///
/// Only supports commands defined in this crate — builtins and the external
/// process launcher.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A shell-like interpreter that executes built-in and external commands.
///
/// The interpreter maintains an [`Environment`] and a list of
/// [`HandleFactory`] objects that are queried in order to create commands by
/// name. See [`Default`] for the factories included out of the box.
///
/// Example
/// ```
/// use minishell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello world").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn HandleFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn HandleFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
        }
    }

    fn create_handle(&self, name: &str, args: &[&str]) -> Option<Box<dyn CommandHandle>> {
        self.commands
            .iter()
            .find_map(|factory| factory.try_create(&self.env, name, args))
    }

    /// Execute one raw input line and return its exit status.
    ///
    /// An unresolvable command name is not an error of the interpreter: it
    /// is reported on stderr and yields status 127, shell style.
    pub fn run_line(&mut self, line: &str) -> Result<ExitCode> {
        match parser::parse_line(line) {
            ParsedLine::Empty => Ok(0),
            ParsedLine::Command { argv, redirect } => self.run_single(&argv, redirect),
            ParsedLine::Pipeline(segments) => self.run_pipeline(&segments),
        }
    }

    fn run_single(
        &mut self,
        argv: &[String],
        redirect: Option<RedirectionSpec>,
    ) -> Result<ExitCode> {
        let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
        let Some(mut handle) = self.create_handle(&argv[0], &args) else {
            eprintln!("{}: command not found", argv[0]);
            return Ok(127);
        };

        handle.wire_input(Wiring::Terminal);
        handle.wire_output(Wiring::Terminal);
        handle.wire_error(Wiring::Terminal);
        if let Some(spec) = redirect {
            let file = self.open_redirect_target(&spec)?;
            match spec.stream {
                RedirectStream::Stdout => handle.wire_output(Wiring::File(file)),
                RedirectStream::Stderr => handle.wire_error(Wiring::File(file)),
            }
        }

        handle.start()?;
        let status = handle.wait()?;
        // Outside a pipeline a builtin's environment mutations stick.
        if let Some(env) = handle.take_env() {
            self.env = env;
        }
        Ok(status)
    }

    fn run_pipeline(&mut self, segments: &[Vec<String>]) -> Result<ExitCode> {
        // Resolve every segment before anything starts, so a bad name in the
        // middle never leaves half a pipeline running.
        let mut handles = Vec::with_capacity(segments.len());
        let mut missing = Vec::new();
        for argv in segments {
            let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
            match self.create_handle(&argv[0], &args) {
                Some(handle) => handles.push(handle),
                None => missing.push(argv[0].as_str()),
            }
        }
        if !missing.is_empty() {
            for name in missing {
                eprintln!("{name}: command not found");
            }
            return Ok(127);
        }
        pipeline::run(handles)
    }

    fn open_redirect_target(&self, spec: &RedirectionSpec) -> Result<File> {
        let path = self.env.resolve(Path::new(&spec.target));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("can't create {}", parent.display()))?;
        }
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);
        match spec.mode {
            RedirectMode::Truncate => options.truncate(true),
            RedirectMode::Append => options.append(true),
        };
        options
            .open(&path)
            .with_context(|| format!("can't open {}", path.display()))
    }

    /// The interactive read-eval-print loop.
    ///
    /// Loads HISTFILE on entry and writes it back on exit when the variable
    /// is set. Returns the status `exit` requested, or 0 on end of input.
    pub fn repl(&mut self) -> Result<ExitCode> {
        if let Some(histfile) = self.histfile() {
            if histfile.exists() {
                if let Err(err) = self.env.history.load(&histfile) {
                    eprintln!("{err:#}");
                }
            }
        }

        loop {
            if self.env.should_exit {
                break;
            }
            let completions = self.completion_index();
            let Some(line) = editor::read_line("$ ", self.env.history.entries(), &completions)?
            else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            self.env.history.push(line.clone());
            if let Err(err) = self.run_line(&line) {
                eprintln!("{err:#}");
            }
        }

        if let Some(histfile) = self.histfile() {
            if let Err(err) = self.env.history.save(&histfile) {
                eprintln!("{err:#}");
            }
        }
        Ok(self.env.exit_code)
    }

    fn histfile(&self) -> Option<PathBuf> {
        self.env.get_var("HISTFILE").map(PathBuf::from)
    }

    fn completion_index(&self) -> CompletionTrie {
        let search_paths = self.env.get_var("PATH").map(String::as_str).unwrap_or("");
        let mut trie = completion::index_search_path(OsStr::new(search_paths));
        for name in builtin::BUILTIN_NAMES {
            trie.insert(name);
        }
        trie
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `echo`, `cd`, `pwd`, `exit`, `type`, `history`, `cat`, `wc`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalHandle;
        Self::new(vec![
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<HistoryCmd>::default()),
            Box::new(Factory::<Cat>::default()),
            Box::new(Factory::<Wc>::default()),
            Box::new(Factory::<ExternalHandle>::default()),
        ])
    }
}
