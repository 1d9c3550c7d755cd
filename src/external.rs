use crate::command::{CommandHandle, CommandKind, ExitCode, HandleFactory, Wiring};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Command resolved to an executable on disk, run as a child process.
pub struct ExternalHandle {
    program: OsString,
    args: Vec<OsString>,
    vars: Vec<(String, String)>,
    current_dir: PathBuf,
    input_wiring: Wiring,
    output_wiring: Wiring,
    error_wiring: Wiring,
    child: Option<Child>,
}

impl ExternalHandle {
    pub fn new(env: &Environment, program: OsString, args: Vec<OsString>) -> Self {
        Self {
            program,
            args,
            vars: env.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            current_dir: env.current_dir.clone(),
            input_wiring: Wiring::Terminal,
            output_wiring: Wiring::Terminal,
            error_wiring: Wiring::Terminal,
            child: None,
        }
    }
}

impl HandleFactory for Factory<ExternalHandle> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn CommandHandle>> {
        let search_paths = env.get_var("PATH")?;
        let executable =
            find_command_path(OsStr::new(&search_paths), &env.current_dir, Path::new(&name))?;
        Some(Box::new(ExternalHandle::new(
            env,
            executable.as_os_str().to_owned(),
            args.iter().map(|x| x.into()).collect(),
        )))
    }
}

fn wiring_stdio(wiring: Wiring) -> Stdio {
    match wiring {
        Wiring::Terminal => Stdio::inherit(),
        Wiring::Piped => Stdio::piped(),
        Wiring::Closed => Stdio::null(),
        Wiring::File(file) => Stdio::from(file),
    }
}

impl CommandHandle for ExternalHandle {
    fn kind(&self) -> CommandKind {
        CommandKind::External
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
        let stdin = self.child.as_mut()?.stdin.take()?;
        Some(Box::new(stdin))
    }

    fn output(&mut self) -> Option<Box<dyn Read + Send>> {
        let stdout = self.child.as_mut()?.stdout.take()?;
        Some(Box::new(stdout))
    }

    fn error(&mut self) -> Option<Box<dyn Read + Send>> {
        let stderr = self.child.as_mut()?.stderr.take()?;
        Some(Box::new(stderr))
    }

    fn start(&mut self) -> Result<()> {
        let input = std::mem::replace(&mut self.input_wiring, Wiring::Closed);
        let output = std::mem::replace(&mut self.output_wiring, Wiring::Closed);
        let error = std::mem::replace(&mut self.error_wiring, Wiring::Closed);
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(wiring_stdio(input))
            .stdout(wiring_stdio(output))
            .stderr(wiring_stdio(error))
            .envs(self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.current_dir)
            .spawn()
            .with_context(|| format!("can't spawn {}", self.program.display()))?;
        self.child = Some(child);
        Ok(())
    }

    fn wait(&mut self) -> Result<ExitCode> {
        let mut child = self
            .child
            .take()
            .context("wait called before the process was started")?;
        let exit_status = child.wait()?;
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names an executable file.
/// - Relative with multiple components (e.g., `bin/sh`): resolved against
///   `current_dir`, returned absolute if it names an executable file.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: likewise.
/// - Single path component (no separators): search each directory in
///   `search_paths` (PATH) and return the first executable match.
/// - Empty path: returns `None`.
///
/// Relative candidates resolve against the session's `current_dir`, never
/// the process working directory, so resolution agrees with the directory
/// the command will actually run in.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    current_dir: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir {
        let candidate = current_dir.join(path);
        if is_executable(&candidate) {
            return Some(Cow::Owned(candidate));
        }
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => {
            // Empty path -> not found
            None
        }
        (Some(x), None) => {
            // Single component -> search in PATH
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            // Multiple components -> search in the session dir
            let candidate = current_dir.join(path);
            if is_executable(&candidate) {
                Some(Cow::Owned(candidate))
            } else {
                None
            }
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
