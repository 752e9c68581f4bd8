//! Elevated execution channel
//!
//! Operations flagged as elevated never run in the engine's own privilege
//! context. They are serialized as a request over a single helper process
//! (spawned at most once per installation run, so the operator sees at most
//! one privilege prompt) and the structured result is applied back onto the
//! local operation before the sequence continues.
//!
//! The protocol is JSON lines over the helper's stdio: one
//! [`ElevationRequest`] per line in, one [`ElevationResponse`] per line out,
//! strictly one request in flight at a time.

pub mod helper;

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{Result, elevation};
use crate::operation::{OperationError, RecordedOperation};

/// Handshake line the helper prints once it is ready to serve requests
pub const HANDSHAKE: &str = "instack-helper v1 ready";

/// Which lifecycle call the helper should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElevatedAction {
    Perform,
    Undo,
}

/// A single elevated execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationRequest {
    pub action: ElevatedAction,
    pub operation: RecordedOperation,
}

/// Structured result relayed back from the helper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    /// Backup/output state after the call (paths written etc.), applied to
    /// the local operation so a later undo still works
    #[serde(default)]
    pub output: serde_json::Value,
}

/// Executes elevated operations on behalf of the orchestrator
///
/// Exactly one request is in flight at a time; the caller blocks on the
/// result before continuing the operation sequence.
pub trait ElevatedExecutor: Send {
    fn execute(&mut self, request: &ElevationRequest) -> Result<ElevationResponse>;
}

struct HelperProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Production channel: one privileged helper process per installation run
///
/// The command is typically `["sudo", "instack-helper"]` or a platform
/// equivalent; the escalation prompt happens when the process is spawned.
pub struct ProcessChannel {
    command: Vec<String>,
    process: Option<HelperProcess>,
}

impl ProcessChannel {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            process: None,
        }
    }

    fn establish(&mut self) -> Result<&mut HelperProcess> {
        if self.process.is_none() {
            let (program, args) = self
                .command
                .split_first()
                .ok_or_else(|| elevation::unavailable("no helper command configured"))?;

            tracing::info!(helper = %program, "establishing elevated execution channel");
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| elevation::unavailable(e.to_string()))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| elevation::unavailable("helper stdin not available"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| elevation::unavailable("helper stdout not available"))?;
            let mut stdout = BufReader::new(stdout);

            // A helper that exits or answers anything but the handshake means
            // the escalation was rejected.
            let mut line = String::new();
            let read = stdout.read_line(&mut line).unwrap_or(0);
            if read == 0 || line.trim() != HANDSHAKE {
                let _ = child.kill();
                return Err(elevation::denied());
            }

            self.process = Some(HelperProcess {
                child,
                stdin,
                stdout,
            });
        }
        self.process
            .as_mut()
            .ok_or_else(|| elevation::unavailable("helper not established"))
    }
}

impl ElevatedExecutor for ProcessChannel {
    fn execute(&mut self, request: &ElevationRequest) -> Result<ElevationResponse> {
        let process = self.establish()?;

        let mut line = serde_json::to_string(request)
            .map_err(|e| elevation::protocol(e.to_string()))?;
        line.push('\n');
        process
            .stdin
            .write_all(line.as_bytes())
            .map_err(|e| elevation::protocol(e.to_string()))?;
        process
            .stdin
            .flush()
            .map_err(|e| elevation::protocol(e.to_string()))?;

        let mut response_line = String::new();
        let read = process
            .stdout
            .read_line(&mut response_line)
            .map_err(|e| elevation::protocol(e.to_string()))?;
        if read == 0 {
            return Err(elevation::protocol("helper closed the channel"));
        }
        serde_json::from_str(&response_line).map_err(|e| elevation::protocol(e.to_string()))
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            // Closing stdin lets the helper exit on EOF.
            drop(process.stdin);
            let _ = process.child.wait();
        }
    }
}

/// In-process executor for runs that already hold sufficient privilege
/// (and for tests): applies the request through the local registry.
pub struct LocalExecutor {
    registry: crate::operation::OperationRegistry,
}

impl LocalExecutor {
    pub fn new(registry: crate::operation::OperationRegistry) -> Self {
        Self { registry }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(crate::operation::OperationRegistry::default())
    }
}

impl ElevatedExecutor for LocalExecutor {
    fn execute(&mut self, request: &ElevationRequest) -> Result<ElevationResponse> {
        Ok(helper::apply_request(&self.registry, request))
    }
}
