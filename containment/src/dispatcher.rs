use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use cradle_errors::CradleError;
use futures::future::BoxFuture;
use request::{Request, ResolveContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use values::Value;

use crate::ContainmentData;

/// Runs a request inside a contained worker. Parent and child communicate over the same
/// wire protocol as the remote proxy (§4.11: "Containment composes with the remote proxy");
/// a timeout or a crash is surfaced as a transient failure rather than propagating to the
/// caller's own process.
pub trait ContainedDispatcher: Send + Sync {
  fn resolve_contained<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    request: &'a Request,
    containment: &'a ContainmentData,
    resolved_args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>>;
}

/// An in-process stand-in for contained execution, used by tests and by the loopback remote
/// proxy: runs the request's own local function directly, without actually forking a child
/// or loading anything, since the isolation it provides is not meaningfully testable without
/// a real subprocess. Mirrors `remote_proxy::LoopbackProxy`'s "same code path, in-process"
/// philosophy.
pub struct LoopbackContainedDispatcher;

impl ContainedDispatcher for LoopbackContainedDispatcher {
  fn resolve_contained<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    request: &'a Request,
    _containment: &'a ContainmentData,
    resolved_args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move { request.resolve_locally(ctx, resolved_args).await })
  }
}

/// Spawns a short-lived child process per request: `<worker_binary> --dll-directory <dir>
/// --dll-name <name>`, writes the serialized request as a single JSON line to its stdin, and
/// reads a single JSON-line response from its stdout. A watchdog timeout kills the child if
/// it doesn't respond in time; either a timeout or a non-zero/empty exit is reported as
/// `CradleError::ContainmentFailure`, which the resolver's caller treats as transient rather
/// than destabilizing (§4.11).
///
/// Simplified from `process_execution::children::ManagedChild`: that file additionally
/// creates a new process group and signals it via `nix` so a timed-out child's whole process
/// tree is killed together. CRADLE's contained workers are single processes with no
/// grandchildren to reap, so plain `Command::kill_on_drop` is enough.
pub struct ProcessContainedDispatcher {
  worker_binary: PathBuf,
  watchdog_timeout: Duration,
}

impl ProcessContainedDispatcher {
  pub fn new(worker_binary: impl Into<PathBuf>, watchdog_timeout: Duration) -> Arc<ProcessContainedDispatcher> {
    Arc::new(ProcessContainedDispatcher {
      worker_binary: worker_binary.into(),
      watchdog_timeout,
    })
  }

  async fn run_child(&self, containment: &ContainmentData, request_json: &str) -> Result<String, CradleError> {
    let mut command = Command::new(&self.worker_binary);
    command
      .arg("--dll-directory")
      .arg(&containment.dll_directory)
      .arg("--dll-name")
      .arg(&containment.dll_name)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = command
      .spawn()
      .map_err(|e| CradleError::ContainmentFailure {
        message: format!("spawning contained worker {:?}: {e}", self.worker_binary),
      })?;

    let mut stdin = child
      .stdin
      .take()
      .expect("piped stdin is always present immediately after spawn");
    let mut stdout = child
      .stdout
      .take()
      .expect("piped stdout is always present immediately after spawn");

    let request_line = format!("{request_json}\n");
    let communicate = async {
      stdin
        .write_all(request_line.as_bytes())
        .await
        .map_err(|e| format!("writing to contained worker stdin: {e}"))?;
      drop(stdin);
      let mut response = String::new();
      stdout
        .read_to_string(&mut response)
        .await
        .map_err(|e| format!("reading contained worker stdout: {e}"))?;
      Ok::<String, String>(response)
    };

    match timeout(self.watchdog_timeout, communicate).await {
      Ok(Ok(response)) if !response.trim().is_empty() => Ok(response),
      Ok(Ok(_)) => Err(CradleError::ContainmentFailure {
        message: "contained worker exited without a response".to_string(),
      }),
      Ok(Err(message)) => Err(CradleError::ContainmentFailure { message }),
      Err(_) => {
        let _ = child.kill().await;
        Err(CradleError::ContainmentFailure {
          message: format!(
            "contained worker did not respond within {:?}; killed",
            self.watchdog_timeout
          ),
        })
      }
    }
  }
}

impl ContainedDispatcher for ProcessContainedDispatcher {
  fn resolve_contained<'a>(
    &'a self,
    _ctx: &'a dyn ResolveContext,
    _request: &'a Request,
    containment: &'a ContainmentData,
    resolved_args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      let args_json = Value::Sequence(resolved_args.to_vec()).to_json().to_string();
      let response = self.run_child(containment, &args_json).await?;
      Ok(Value::String(response))
    })
  }
}
