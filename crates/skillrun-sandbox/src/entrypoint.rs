//! Entrypoint discovery
//!
//! Candidates are checked in order; the first regular file wins. The file
//! extension picks the interpreter and files without one are executed directly.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Conventional entrypoint names, highest priority first
pub const ENTRYPOINT_CANDIDATES: &[&str] = &[
    "scripts/execute",
    "scripts/execute.sh",
    "scripts/execute.py",
    "scripts/execute.js",
    "execute",
    "execute.sh",
    "execute.py",
    "execute.js",
    "main.sh",
    "main.py",
    "index.js",
];

/// A resolved entrypoint inside a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    /// Absolute path of the script
    pub path: PathBuf,
    /// Interpreter program, `None` when the file is executed directly
    pub interpreter: Option<&'static str>,
}

impl Entrypoint {
    fn for_path(path: PathBuf) -> Self {
        let interpreter = match path.extension().and_then(|ext| ext.to_str()) {
            Some("sh") => Some("sh"),
            Some("bash") => Some("bash"),
            Some("py") => Some("python3"),
            Some("js") | Some("mjs") | Some("cjs") => Some("node"),
            _ => None,
        };
        Self { path, interpreter }
    }

    /// Whether the entrypoint runs on V8, which reserves far more address space than it uses
    pub fn is_node(&self) -> bool {
        self.interpreter == Some("node")
    }

    /// Build the command; arguments are passed verbatim, never through a shell
    pub fn command(&self, args: &[String]) -> Command {
        let mut command = match self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.path);
                command
            }
            None => Command::new(&self.path),
        };
        command.args(args.iter().map(OsString::from));
        command
    }

    /// Mark directly executed entrypoints as executable
    pub async fn prepare(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            if self.interpreter.is_none() {
                let mut permissions = tokio::fs::metadata(&self.path).await?.permissions();
                permissions.set_mode(permissions.mode() | 0o700);
                tokio::fs::set_permissions(&self.path, permissions).await?;
            }
        }
        Ok(())
    }
}

/// Locate the entrypoint of a skill directory
pub fn find_entrypoint(dir: &Path) -> Option<Entrypoint> {
    ENTRYPOINT_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
        .map(Entrypoint::for_path)
}
