use crate::context::TaskContext;
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {elapsed:?}")]
    TimedOut { program: String, elapsed: Duration },
    #[error("{program} cancelled")]
    Cancelled { program: String },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program_label(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    pub fn args_label(&self) -> String {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs a request to completion, killing the child when the task deadline
/// passes or the run is cancelled. Output pipes are drained on helper
/// threads so a chatty child never blocks on a full pipe.
pub fn run(request: &ExecRequest, task: &TaskContext) -> Result<ExecOutput, ExecError> {
    let program = request.program_label();
    if task.is_cancelled() {
        return Err(ExecError::Cancelled { program });
    }

    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }

    debug!(program = %program, args = %request.args_label(), "spawning");
    let started = Instant::now();
    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_budget(&mut child, task) {
        Ok(status) => status,
        Err(WaitEnd::TimedOut) => {
            // Grandchildren may still hold the pipes; the drain threads are
            // detached rather than joined.
            kill(&mut child);
            return Err(ExecError::TimedOut {
                program,
                elapsed: started.elapsed(),
            });
        }
        Err(WaitEnd::Cancelled) => {
            kill(&mut child);
            return Err(ExecError::Cancelled { program });
        }
        Err(WaitEnd::Io(source)) => {
            kill(&mut child);
            return Err(ExecError::Wait { program, source });
        }
    };

    Ok(ExecOutput {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
        duration: started.elapsed(),
    })
}

enum WaitEnd {
    TimedOut,
    Cancelled,
    Io(std::io::Error),
}

fn wait_with_budget(child: &mut Child, task: &TaskContext) -> Result<ExitStatus, WaitEnd> {
    loop {
        if task.is_cancelled() {
            return Err(WaitEnd::Cancelled);
        }
        let slice = match task.remaining() {
            Some(remaining) if remaining.is_zero() => return Err(WaitEnd::TimedOut),
            Some(remaining) => remaining.min(POLL_SLICE),
            None => POLL_SLICE,
        };
        match child.wait_timeout(slice) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => continue,
            Err(err) => return Err(WaitEnd::Io(err)),
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
