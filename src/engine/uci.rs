// src/engine/uci.rs

//! A single UCI engine process. Speaks the subset of the protocol the
//! adapter needs: `uci`, `isready`, `setoption MultiPV`, `position fen`,
//! `go depth N`, and the `info`/`bestmove` responses.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::{build_result, parse_info_line, AnalysisResult, EngineError, InfoLine};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
// Per-`go` budget scales with depth; deep searches on slow hardware are slow.
const GO_TIMEOUT_BASE_SECS: u64 = 20;
const GO_TIMEOUT_PER_DEPTH_SECS: u64 = 5;

pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    current_multipv: u32,
    label: String,
}

impl UciEngine {
    /// Spawn and handshake a UCI engine at `path`.
    pub async fn spawn(path: &str, label: &str) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdout unavailable".into()))?;

        let mut engine = UciEngine {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            current_multipv: 1,
            label: label.to_string(),
        };

        engine.send("uci").await?;
        engine.read_until(HANDSHAKE_TIMEOUT, "uciok").await?;
        engine.ensure_ready().await?;
        debug!(engine = %engine.label, "engine handshake complete");
        Ok(engine)
    }

    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        trace!(engine = %self.label, command, "uci >");
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, EngineError> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).await?;
        if read == 0 {
            return Err(EngineError::Protocol("engine closed its stdout".into()));
        }
        trace!(engine = %self.label, line = line.trim(), "uci <");
        Ok(line)
    }

    async fn read_until(&mut self, budget: Duration, marker: &str) -> Result<(), EngineError> {
        timeout(budget, async {
            loop {
                let line = self.read_line().await?;
                if line.trim_start().starts_with(marker) {
                    return Ok(());
                }
            }
        })
        .await
        .map_err(|_| EngineError::Timeout)?
    }

    async fn ensure_ready(&mut self) -> Result<(), EngineError> {
        self.send("isready").await?;
        self.read_until(HANDSHAKE_TIMEOUT, "readyok").await
    }

    async fn ensure_multipv(&mut self, multipv: u32) -> Result<(), EngineError> {
        if multipv == self.current_multipv {
            return Ok(());
        }
        self.send(&format!("setoption name MultiPV value {multipv}"))
            .await?;
        self.ensure_ready().await?;
        self.current_multipv = multipv;
        Ok(())
    }

    /// Run one analysis. Any failure is logged and degraded to an empty
    /// result so the caller never sees an engine error.
    pub async fn analyze(&mut self, fen: &str, depth: u32, multipv: u32) -> AnalysisResult {
        match self.try_analyze(fen, depth, multipv).await {
            Ok(result) => result,
            Err(err) => {
                warn!(engine = %self.label, fen, depth, %err, "analysis failed, returning empty result");
                AnalysisResult::empty(fen, depth, multipv)
            }
        }
    }

    async fn try_analyze(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<AnalysisResult, EngineError> {
        // Refuse positions we cannot reconstruct; an engine fed a FEN the
        // adapter cannot parse would desynchronize every later conversion.
        if crate::board::parse_fen(fen).is_none() {
            return Ok(AnalysisResult::empty(fen, depth, multipv));
        }

        self.ensure_multipv(multipv).await?;
        self.send(&format!("position fen {fen}")).await?;
        self.ensure_ready().await?;
        self.send(&format!("go depth {depth}")).await?;

        let budget =
            Duration::from_secs(GO_TIMEOUT_BASE_SECS + GO_TIMEOUT_PER_DEPTH_SECS * depth as u64);
        let mut last_per_index: HashMap<u32, InfoLine> = HashMap::new();

        let collected = timeout(budget, async {
            loop {
                let line = self.read_line().await?;
                let trimmed = line.trim();
                if trimmed.starts_with("bestmove") {
                    return Ok::<_, EngineError>(trimmed.to_string());
                }
                if let Some(info) = parse_info_line(trimmed) {
                    // The adapter consumes the last info per multipv index.
                    last_per_index.insert(info.multipv, info);
                }
            }
        })
        .await
        .map_err(|_| EngineError::Timeout)??;

        if collected.starts_with("bestmove (none)") {
            return Ok(AnalysisResult::empty(fen, depth, multipv));
        }

        let mut lines: Vec<InfoLine> = last_per_index.into_values().collect();
        lines.sort_by_key(|l| l.multipv);
        Ok(build_result(fen, depth, multipv, &lines))
    }

    /// Ask the engine to quit, then reap the process.
    pub async fn shutdown(mut self) {
        let _ = self.send("quit").await;
        let _ = timeout(Duration::from_secs(2), self.child.wait()).await;
    }
}
