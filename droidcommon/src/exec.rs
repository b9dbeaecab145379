use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

/// A single invocation of an external tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    executable: OsString,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    fail_on_stderr: bool,
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(executable: S) -> Self {
        Self {
            executable: executable.as_ref().to_owned(),
            args: vec![],
            working_dir: None,
            fail_on_stderr: true,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Whether any output on stderr fails the invocation. Defaults to `true`.
    pub fn fail_on_stderr(mut self, fail: bool) -> Self {
        self.fail_on_stderr = fail;
        self
    }

    pub fn executable(&self) -> &OsStr {
        &self.executable
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn is_stderr_fatal(&self) -> bool {
        self.fail_on_stderr
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.executable.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Exit code and captured output of the last invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with exit code {code}{}", stderr_summary(.stderr))]
    Failed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
}

fn stderr_summary(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

impl ExecutionError {
    pub fn stdout(&self) -> &str {
        match self {
            Self::Failed { stdout, .. } => stdout,
            Self::Spawn { .. } => "",
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            Self::Spawn { .. } => "",
        }
    }
}

/// Runs commands and keeps the result of the last one around.
pub trait Execute {
    fn execute(&mut self, command: &Command) -> Result<&ExecutionResult, ExecutionError>;

    fn result(&self) -> Option<&ExecutionResult>;
}

#[derive(Debug, Default)]
pub struct CommandExecutor {
    result: Option<ExecutionResult>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(&self) -> &str {
        self.result.as_ref().map(|r| r.stdout.as_str()).unwrap_or("")
    }

    pub fn stderr(&self) -> &str {
        self.result.as_ref().map(|r| r.stderr.as_str()).unwrap_or("")
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.result.as_ref().map(|r| r.code)
    }

    fn spawn(command: &Command) -> std::io::Result<Child> {
        let mut cmd = std::process::Command::new(&command.executable);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match command.working_dir.as_deref() {
            Some(dir) if dir.is_dir() => {
                cmd.current_dir(dir);
            }
            Some(dir) => {
                tracing::debug!(
                    "working directory {} does not exist, using the current directory",
                    dir.display()
                );
            }
            None => {}
        }
        cmd.spawn()
    }
}

impl Execute for CommandExecutor {
    fn execute(&mut self, command: &Command) -> Result<&ExecutionResult, ExecutionError> {
        let commandline = command.to_string();
        tracing::debug!("{}", commandline);
        self.result = None;
        let mut child = Self::spawn(command).map_err(|source| ExecutionError::Spawn {
            command: commandline.clone(),
            source,
        })?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let fatal = command.fail_on_stderr;
        let (stdout, joined) = std::thread::scope(|s| {
            let errors = s.spawn(move || {
                consume(stderr_pipe, |line| {
                    if fatal {
                        tracing::error!("{}", line);
                    } else {
                        tracing::warn!("{}", line);
                    }
                })
            });
            let out = consume(stdout_pipe, |line| tracing::debug!("{}", line)).0;
            (out, errors.join())
        });
        let code = match child.wait() {
            Ok(status) => status.code().unwrap_or(-1),
            Err(source) => {
                return Err(ExecutionError::Spawn {
                    command: commandline,
                    source,
                })
            }
        };
        tracing::debug!(
            "Executed command: Commandline = {}, Result = {}",
            commandline,
            code
        );
        let (stderr, stderr_lines) = stderr_output(joined, &commandline, code, &stdout)?;
        let result = ExecutionResult {
            code,
            stdout,
            stderr,
        };
        if code != 0 || (fatal && stderr_lines > 0) {
            let err = ExecutionError::Failed {
                command: commandline,
                code,
                stdout: result.stdout.clone(),
                stderr: result.stderr.clone(),
            };
            self.result = Some(result);
            return Err(err);
        }
        Ok(&*self.result.insert(result))
    }

    fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }
}

/// Output of the stderr reader thread, or a failure when it panicked.
fn stderr_output(
    joined: std::thread::Result<(String, usize)>,
    command: &str,
    code: i32,
    stdout: &str,
) -> Result<(String, usize), ExecutionError> {
    joined.map_err(|_| ExecutionError::Failed {
        command: command.to_string(),
        code,
        stdout: stdout.to_string(),
        stderr: "failed to read stderr of the subprocess".to_string(),
    })
}

/// Reads a pipe to the end one line at a time, returning the text and the
/// number of lines seen.
fn consume<R: Read>(pipe: Option<R>, mut on_line: impl FnMut(&str)) -> (String, usize) {
    let mut text = String::new();
    let mut lines = 0;
    let Some(pipe) = pipe else {
        return (text, lines);
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = vec![];
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(['\n', '\r']));
                text.push_str(&line);
                lines += 1;
            }
            Err(err) => {
                tracing::debug!("error reading subprocess output: {}", err);
                break;
            }
        }
    }
    (text, lines)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        Command::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn captures_stdout_exactly() {
        let mut exec = CommandExecutor::new();
        let result = exec
            .execute(&sh("printf 'hello\\nworld'; echo ' and more'"))
            .unwrap();
        assert_eq!(result.code, 0);
        assert_eq!(result.stdout, "hello\nworld and more\n");
        assert_eq!(result.stderr, "");
        assert_eq!(exec.stdout(), "hello\nworld and more\n");
        assert_eq!(exec.exit_code(), Some(0));
    }

    #[test]
    fn stderr_fails_by_default() {
        let mut exec = CommandExecutor::new();
        let err = exec.execute(&sh("echo out; echo oops >&2")).unwrap_err();
        match &err {
            ExecutionError::Failed { code, stderr, .. } => {
                assert_eq!(*code, 0);
                assert_eq!(stderr, "oops\n");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.stdout(), "out\n");
        assert_eq!(exec.stderr(), "oops\n");
    }

    #[test]
    fn stderr_tolerated_when_not_fatal() {
        let mut exec = CommandExecutor::new();
        let result = exec
            .execute(&sh("echo chatter >&2; echo done").fail_on_stderr(false))
            .unwrap();
        assert_eq!(result.stdout, "done\n");
        assert_eq!(result.stderr, "chatter\n");
    }

    #[test]
    fn nonzero_exit_fails_even_when_stderr_is_tolerated() {
        let mut exec = CommandExecutor::new();
        let err = exec
            .execute(&sh("echo bad; exit 3").fail_on_stderr(false))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Failed { code: 3, .. }));
        assert_eq!(exec.exit_code(), Some(3));
        assert_eq!(exec.stdout(), "bad\n");
    }

    #[test]
    fn missing_working_dir_is_ignored() {
        let mut exec = CommandExecutor::new();
        let result = exec
            .execute(&sh("echo ok").current_dir("/does/not/exist/anywhere"))
            .unwrap();
        assert_eq!(result.stdout, "ok\n");
    }

    #[test]
    fn working_dir_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut exec = CommandExecutor::new();
        let result = exec.execute(&sh("pwd").current_dir(dir.path())).unwrap();
        let expected = dunce::canonicalize(dir.path()).unwrap();
        let actual = dunce::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn spawn_failure() {
        let mut exec = CommandExecutor::new();
        let err = exec
            .execute(&Command::new("/no/such/tool-for-droid"))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
        assert!(exec.result().is_none());
    }

    #[test]
    fn result_is_overwritten() {
        let mut exec = CommandExecutor::new();
        exec.execute(&sh("echo first")).unwrap();
        exec.execute(&sh("echo second")).unwrap();
        assert_eq!(exec.stdout(), "second\n");
    }

    #[test]
    fn panicked_stderr_reader_fails_the_command() {
        let joined = std::thread::spawn(|| -> (String, usize) { panic!("reader") }).join();
        let err = stderr_output(joined, "adb devices", 0, "List of devices\n").unwrap_err();
        match err {
            ExecutionError::Failed { command, stdout, .. } => {
                assert_eq!(command, "adb devices");
                assert_eq!(stdout, "List of devices\n");
            }
            other => panic!("unexpected error {:?}", other),
        }
        let joined = Ok(("warning\n".to_string(), 1));
        assert_eq!(stderr_output(joined, "aapt", 0, "").unwrap().1, 1);
    }

    #[test]
    fn display_joins_args() {
        let cmd = Command::new("aapt").args(["package", "-f"]).arg("-M");
        assert_eq!(cmd.to_string(), "aapt package -f -M");
        assert!(cmd.is_stderr_fatal());
    }
}
