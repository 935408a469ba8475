//! Sandboxed execution
//!
//! Fork mode copies the skill into a private workspace and runs its entrypoint
//! as a separate process group with a scrubbed environment, a wall-clock limit,
//! an output cap and (on unix) an address-space limit. The workspace is removed
//! on every exit path. Inline mode spawns nothing and returns the skill's
//! context for the caller to act on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use skillrun_skills::{parse_manifest, ContextMode, MANIFEST_FILE, MARKER_FILE};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::SandboxConfig;
use crate::entrypoint::find_entrypoint;
use crate::error::{Result, SandboxError};
use crate::options::ExecutionOptions;
use crate::output::{OutputCapture, StreamKind};
use crate::registry::{kill_group, terminate_group, ProcessRegistry};
use crate::result::{ExecutionResult, InlineContext};
use crate::workspace::Workspace;

/// Grace period given to cancelled executions during shutdown
const SHUTDOWN_GRACE_MS: u64 = 1_000;

/// Why the wait on a child ended
#[derive(Debug)]
enum Ending {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Overflowed,
    Cancelled,
}

/// Limits resolved for one run
#[derive(Debug, Clone, Copy)]
struct Limits {
    timeout: Duration,
    memory_limit_mb: u64,
    max_output_bytes: usize,
}

/// Identity of the skill being executed
#[derive(Debug)]
struct SkillIdentity {
    name: String,
    instructions: String,
}

/// Runs skills in fork or inline mode
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    config: SandboxConfig,
    registry: ProcessRegistry,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_registry(config, ProcessRegistry::new())
    }

    /// Share a process registry with other executors
    pub fn with_registry(config: SandboxConfig, registry: ProcessRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Execute the skill at `skill_path` in the given mode
    pub async fn execute(
        &self,
        skill_path: &Path,
        mode: ContextMode,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult> {
        let metadata = tokio::fs::metadata(skill_path)
            .await
            .map_err(|e| SandboxError::InvalidSkill {
                path: skill_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !metadata.is_dir() {
            return Err(SandboxError::InvalidSkill {
                path: skill_path.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let identity = load_identity(skill_path).await;
        let execution_id = Uuid::new_v4().to_string();
        debug!(skill = %identity.name, %execution_id, %mode, "Executing skill");

        match mode {
            ContextMode::Inline => self.execute_inline(skill_path, identity, execution_id).await,
            ContextMode::Fork => {
                self.execute_fork(skill_path, identity, execution_id, options)
                    .await
            }
        }
    }

    /// Terminate every in-flight fork execution
    pub async fn shutdown(&self) -> usize {
        self.registry
            .shutdown_all(Duration::from_millis(SHUTDOWN_GRACE_MS))
            .await
    }

    async fn execute_inline(
        &self,
        skill_path: &Path,
        identity: SkillIdentity,
        execution_id: String,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let root = skill_path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || list_files(&root))
            .await
            .map_err(|e| SandboxError::Workspace(std::io::Error::other(e)))?;

        Ok(ExecutionResult {
            execution_id,
            skill: identity.name.clone(),
            mode: ContextMode::Inline,
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            exit_code: None,
            signal: None,
            timed_out: false,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
            inline: Some(InlineContext {
                skill: identity.name,
                working_dir: skill_path.to_path_buf(),
                files,
                instructions: identity.instructions,
            }),
        })
    }

    async fn execute_fork(
        &self,
        skill_path: &Path,
        identity: SkillIdentity,
        execution_id: String,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult> {
        let workspace = Workspace::create(&self.config.workspace_root(), &execution_id).await?;

        let run = self
            .run_in_workspace(&workspace, skill_path, &identity.name, &execution_id, &options)
            .await;
        let cleanup = workspace
            .cleanup(
                self.config.cleanup_retries,
                Duration::from_millis(self.config.cleanup_base_delay_ms),
            )
            .await;

        match (run, cleanup) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(result), Err(source)) => {
                error!(
                    skill = %identity.name,
                    workspace = %workspace.path().display(),
                    error = %source,
                    "Workspace cleanup failed after retries"
                );
                Err(SandboxError::CleanupFailed {
                    result: Box::new(result),
                    source,
                })
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                error!(
                    skill = %identity.name,
                    workspace = %workspace.path().display(),
                    error = %cleanup_err,
                    "Workspace cleanup failed after execution error"
                );
                Err(err)
            }
        }
    }

    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        skill_path: &Path,
        skill: &str,
        execution_id: &str,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        workspace.populate(skill_path).await?;
        workspace.write_files(&options.files).await?;

        let entrypoint =
            find_entrypoint(workspace.path()).ok_or_else(|| SandboxError::EntrypointNotFound {
                path: skill_path.to_path_buf(),
            })?;
        entrypoint.prepare().await.map_err(SandboxError::Workspace)?;

        let limits = Limits {
            timeout: options.timeout.unwrap_or_else(|| self.config.timeout()),
            memory_limit_mb: options
                .memory_limit_mb
                .unwrap_or(self.config.memory_limit_mb),
            max_output_bytes: options
                .max_output_bytes
                .unwrap_or(self.config.max_output_bytes),
        };

        let mut command = entrypoint.command(&options.args);
        command
            .current_dir(workspace.path())
            .env_clear()
            .envs(build_environment(
                &self.config,
                workspace.path(),
                skill,
                execution_id,
                limits.memory_limit_mb,
                &options.env,
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            command.process_group(0);
            if self.config.enforce_memory_limit && !entrypoint.is_node() {
                apply_memory_limit(&mut command, limits.memory_limit_mb);
            }
        }

        let mut child = command.spawn().map_err(SandboxError::SpawnFailed)?;
        let pid = child.id();
        let guard = self.registry.register(execution_id, skill, pid);
        info!(
            skill,
            execution_id,
            ?pid,
            entrypoint = %entrypoint.path.display(),
            timeout_ms = limits.timeout.as_millis() as u64,
            "Spawned skill process"
        );

        let capture = Arc::new(OutputCapture::new(limits.max_output_bytes));
        let stdout_reader = child
            .stdout
            .take()
            .map(|stream| spawn_reader(&capture, StreamKind::Stdout, stream));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stream| spawn_reader(&capture, StreamKind::Stderr, stream));

        let token = guard.token();
        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(limits.timeout) => Ending::TimedOut,
            _ = capture.overflowed() => Ending::Overflowed,
            _ = token.cancelled() => Ending::Cancelled,
        };

        let status = match ending {
            Ending::Exited(ref status) => status.as_ref().ok().copied(),
            Ending::TimedOut | Ending::Overflowed => force_kill(&mut child, pid).await,
            Ending::Cancelled => {
                if let Some(pid) = pid {
                    terminate_group(pid).await;
                }
                force_kill(&mut child, pid).await
            }
        };

        let drain = Duration::from_millis(self.config.drain_timeout_ms);
        join_reader(stdout_reader, drain).await;
        join_reader(stderr_reader, drain).await;
        drop(guard);

        let (stdout, stderr) = capture.snapshot();
        let exit_code = status.and_then(|status| status.code());
        let signal = status.and_then(exit_signal);
        let success = matches!(ending, Ending::Exited(_)) && status.is_some_and(|s| s.success());
        let error = failure_message(&ending, exit_code, signal, &limits);

        let result = ExecutionResult {
            execution_id: execution_id.to_string(),
            skill: skill.to_string(),
            mode: ContextMode::Fork,
            success,
            stdout,
            stderr,
            truncated: capture.is_truncated(),
            exit_code,
            signal,
            timed_out: matches!(ending, Ending::TimedOut),
            duration_ms: started.elapsed().as_millis() as u64,
            error,
            inline: None,
        };

        if result.success {
            info!(skill, execution_id, duration_ms = result.duration_ms, "Skill completed");
        } else {
            warn!(
                skill,
                execution_id,
                duration_ms = result.duration_ms,
                exit_code = ?result.exit_code,
                signal = ?result.signal,
                truncated = result.truncated,
                error = result.error.as_deref().unwrap_or_default(),
                "Skill did not complete successfully"
            );
        }
        Ok(result)
    }
}

async fn load_identity(skill_path: &Path) -> SkillIdentity {
    let fallback = skill_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skill".to_string());

    let manifest_path = skill_path.join(MANIFEST_FILE);
    let content = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %manifest_path.display(), error = %e, "No readable manifest");
            return SkillIdentity {
                name: fallback,
                instructions: String::new(),
            };
        }
    };

    match parse_manifest(&content, &manifest_path) {
        Ok(parsed) => SkillIdentity {
            name: parsed.manifest.name,
            instructions: parsed.instructions,
        },
        Err(e) => {
            debug!(path = %manifest_path.display(), error = %e, "Unparseable manifest");
            SkillIdentity {
                name: fallback,
                instructions: String::new(),
            }
        }
    }
}

fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|relative| relative != Path::new(MARKER_FILE))
        .collect();
    files.sort();
    files
}

/// Environment for the child: allow-listed parent variables, workspace paths,
/// skill identity, memory hints, then caller overrides
pub(crate) fn build_environment(
    config: &SandboxConfig,
    workspace: &Path,
    skill: &str,
    execution_id: &str,
    memory_limit_mb: u64,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = config
        .env_allowlist
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
        .collect();

    let workspace = workspace.to_string_lossy().into_owned();
    env.insert("HOME".to_string(), workspace.clone());
    env.insert("TMPDIR".to_string(), workspace.clone());
    env.insert("SKILL_DIR".to_string(), workspace);
    env.insert("SKILL_NAME".to_string(), skill.to_string());
    env.insert("SKILL_EXECUTION_ID".to_string(), execution_id.to_string());
    env.insert(
        "SKILL_MEMORY_LIMIT_MB".to_string(),
        memory_limit_mb.to_string(),
    );
    env.insert(
        "NODE_OPTIONS".to_string(),
        format!("--max-old-space-size={memory_limit_mb}"),
    );

    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

#[cfg(unix)]
fn apply_memory_limit(command: &mut Command, megabytes: u64) {
    use nix::sys::resource::{setrlimit, Resource};

    let bytes = megabytes.saturating_mul(1024 * 1024);
    // SAFETY: the closure only calls setrlimit, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, bytes as _, bytes as _).map_err(std::io::Error::from)
        });
    }
}

fn spawn_reader<R>(capture: &Arc<OutputCapture>, stream: StreamKind, reader: R) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let capture = Arc::clone(capture);
    tokio::spawn(async move { capture.drain(stream, reader).await })
}

async fn join_reader(reader: Option<JoinHandle<()>>, drain: Duration) {
    if let Some(mut handle) = reader {
        if tokio::time::timeout(drain, &mut handle).await.is_err() {
            debug!("Output reader did not finish draining, aborting");
            handle.abort();
        }
    }
}

/// Kill the whole process group, falling back to the child alone, and reap it
async fn force_kill(child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
    let signalled = pid.map(kill_group).unwrap_or(false);
    if !signalled {
        if let Err(e) = child.start_kill() {
            warn!(?pid, error = %e, "Failed to kill skill process");
        }
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(?pid, error = %e, "Failed to reap skill process");
            None
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

fn failure_message(
    ending: &Ending,
    exit_code: Option<i32>,
    signal: Option<i32>,
    limits: &Limits,
) -> Option<String> {
    match ending {
        Ending::TimedOut => Some(format!(
            "Execution timed out after {}ms",
            limits.timeout.as_millis()
        )),
        Ending::Overflowed => Some(format!(
            "Output exceeded {} bytes; process terminated",
            limits.max_output_bytes
        )),
        Ending::Cancelled => Some("Execution cancelled by shutdown".to_string()),
        Ending::Exited(Err(e)) => Some(format!("Failed to wait for process: {e}")),
        Ending::Exited(Ok(status)) if status.success() => None,
        Ending::Exited(Ok(_)) => Some(match (exit_code, signal) {
            (Some(code), _) => format!("Process exited with code {code}"),
            (None, Some(signal)) => format!("Process terminated by signal {signal}"),
            (None, None) => "Process exited unsuccessfully".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(dir: &Path, name: &str, script: Option<&str>) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!("---\nname: {name}\ndescription: Test skill\n---\n\nRun the script.\n"),
        )
        .unwrap();
        if let Some(script) = script {
            std::fs::create_dir_all(dir.join("scripts")).unwrap();
            std::fs::write(dir.join("scripts/execute.sh"), script).unwrap();
        }
    }

    fn executor(root: &Path) -> SandboxExecutor {
        SandboxExecutor::new(SandboxConfig {
            workspace_root: Some(root.to_path_buf()),
            ..SandboxConfig::default()
        })
    }

    #[test]
    fn test_environment_is_scrubbed() {
        std::env::set_var("SKILLRUN_TEST_SECRET", "hunter2");
        let mut overrides = BTreeMap::new();
        overrides.insert("INPUT".to_string(), "value".to_string());

        let env = build_environment(
            &SandboxConfig::default(),
            Path::new("/ws"),
            "demo",
            "exec-1",
            256,
            &overrides,
        );

        assert!(!env.contains_key("SKILLRUN_TEST_SECRET"));
        assert_eq!(env["HOME"], "/ws");
        assert_eq!(env["SKILL_NAME"], "demo");
        assert_eq!(env["SKILL_MEMORY_LIMIT_MB"], "256");
        assert_eq!(env["NODE_OPTIONS"], "--max-old-space-size=256");
        assert_eq!(env["INPUT"], "value");
    }

    #[test]
    fn test_failure_messages() {
        let limits = Limits {
            timeout: Duration::from_millis(100),
            memory_limit_mb: 1,
            max_output_bytes: 10,
        };
        assert_eq!(
            failure_message(&Ending::TimedOut, None, Some(9), &limits).unwrap(),
            "Execution timed out after 100ms"
        );
        assert!(failure_message(&Ending::Overflowed, None, Some(9), &limits)
            .unwrap()
            .contains("10 bytes"));
    }

    #[tokio::test]
    async fn test_inline_returns_context() {
        let root = TempDir::new().unwrap();
        let skill = TempDir::new().unwrap();
        write_skill(skill.path(), "inline-demo", Some("echo hi\n"));
        std::fs::write(skill.path().join(MARKER_FILE), "{}").unwrap();

        let result = executor(root.path())
            .execute(skill.path(), ContextMode::Inline, ExecutionOptions::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.skill, "inline-demo");
        let inline = result.inline.unwrap();
        assert_eq!(inline.working_dir, skill.path());
        assert_eq!(inline.instructions, "Run the script.");
        assert_eq!(
            inline.files,
            vec![PathBuf::from(MANIFEST_FILE), PathBuf::from("scripts/execute.sh")]
        );
    }

    #[tokio::test]
    async fn test_missing_skill_dir() {
        let root = TempDir::new().unwrap();
        let err = executor(root.path())
            .execute(
                &root.path().join("nope"),
                ContextMode::Fork,
                ExecutionOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidSkill { .. }));
    }

    #[tokio::test]
    async fn test_missing_entrypoint_still_cleans_up() {
        let root = TempDir::new().unwrap();
        let skill = TempDir::new().unwrap();
        write_skill(skill.path(), "no-entry", None);

        let err = executor(root.path())
            .execute(skill.path(), ContextMode::Fork, ExecutionOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::EntrypointNotFound { .. }));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fork_captures_output() {
        let root = TempDir::new().unwrap();
        let skill = TempDir::new().unwrap();
        write_skill(
            skill.path(),
            "echo-skill",
            Some("echo \"hello $SKILL_NAME $1\"\necho oops >&2\ncat input.txt\n"),
        );

        let executor = executor(root.path());
        let result = executor
            .execute(
                skill.path(),
                ContextMode::Fork,
                ExecutionOptions::new()
                    .args(["world"])
                    .file("input.txt", "from caller"),
            )
            .await
            .unwrap();

        assert!(result.success, "{result:?}");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello echo-skill world\nfrom caller");
        assert_eq!(result.stderr, "oops\n");
        assert!(!result.truncated);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(executor.registry().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fork_nonzero_exit() {
        let root = TempDir::new().unwrap();
        let skill = TempDir::new().unwrap();
        write_skill(skill.path(), "failing", Some("echo bad >&2\nexit 3\n"));

        let result = executor(root.path())
            .execute(skill.path(), ContextMode::Fork, ExecutionOptions::new())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.error.as_deref(), Some("Process exited with code 3"));
        assert!(matches!(
            result.into_result(),
            Err(SandboxError::ExecutionFailed { exit_code: Some(3), .. })
        ));
    }
}
