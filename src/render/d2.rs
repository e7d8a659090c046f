//! External D2 diagram compilation.
//!
//! Fenced ```` ```d2 ```` blocks are piped through the `d2` binary
//! (stdin to stdout, SVG output). Compilation is bounded by a hard
//! timeout; a failure or a missing binary produces an inline error stub
//! instead of failing the document render.

use crate::log;
use crate::render::markdown::escape_html;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const COMPILE_TIMEOUT: Duration = Duration::from_secs(12);

/// Handle to a detected `d2` binary.
pub struct D2Compiler {
    command: String,
}

impl D2Compiler {
    /// Probe for a usable `d2` binary on PATH.
    pub fn detect() -> Option<Self> {
        let found = Command::new("d2")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if !found {
            log!("render"; "d2 binary not found, diagram blocks render as errors");
            return None;
        }
        Some(Self {
            command: "d2".to_string(),
        })
    }

    /// Compile D2 source to SVG. Kills the child after the compile timeout.
    pub fn compile(&self, source: &str) -> Result<String, String> {
        let mut child = Command::new(&self.command)
            .args(["-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("spawn d2: {e}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| format!("write d2 source: {e}"))?;
        }
        let mut stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // Stderr drains on its own thread so a chatty compiler cannot
        // deadlock against our stdout read.
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let mut stderr = stderr;
            stderr.read_to_string(&mut buf).ok();
            buf
        });

        let child = Arc::new(Mutex::new(child));
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watchdog = thread::spawn({
            let child = Arc::clone(&child);
            move || {
                if done_rx.recv_timeout(COMPILE_TIMEOUT).is_err() {
                    let _ = child.lock().kill();
                }
            }
        });

        let mut svg = String::new();
        let read_result = stdout.read_to_string(&mut svg);
        done_tx.send(()).ok();

        let status = child.lock().wait().map_err(|e| format!("wait d2: {e}"))?;
        watchdog.join().ok();
        let stderr_text = stderr_reader.join().unwrap_or_default();

        read_result.map_err(|e| format!("read d2 output: {e}"))?;
        if !status.success() {
            let detail = stderr_text.trim();
            if detail.is_empty() {
                return Err(format!("d2 exited with {status}"));
            }
            return Err(detail.to_string());
        }
        Ok(svg)
    }
}

/// Render a ```` ```d2 ```` fence into its HTML container: compiled SVG on
/// success, an error stub otherwise.
pub fn render_block(compiler: Option<&D2Compiler>, source: &str) -> String {
    let result = match compiler {
        Some(compiler) => compiler.compile(source),
        None => Err("d2 binary not available".to_string()),
    };

    match result {
        Ok(svg) => format!("<div class=\"d2-block\">{svg}</div>\n"),
        Err(err) => {
            log!("render"; "d2 compile failed: {err}");
            format!(
                "<div class=\"d2-block\"><div class=\"d2-error\">{}</div></div>\n",
                escape_html(&err)
            )
        }
    }
}
