use acctz::Recorder;
use anyhow::{Context, Result};
use authz_gate::Gate;
use authz_policy::Verdict;
use call_context::CallContext;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What the binary reports for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallVerdict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub verdict: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Permit,
    Deny,
}

impl CallVerdict {
    /// A denial for a call that could not be evaluated at all.
    pub fn rejected(method: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            method,
            verdict: Outcome::Deny,
            policy: None,
            matched_rule: None,
            reason: reason.into(),
        }
    }
}

/// Runs the accounting and authorization interceptors, in that order, for
/// every call.
pub struct Interceptor {
    gate: Gate,
    recorder: Option<Recorder>,
}

impl Interceptor {
    /// `recorder` is optional; without one calls are only authorized.
    pub fn new(gate: Gate, recorder: Option<Recorder>) -> Self {
        Self { gate, recorder }
    }

    pub async fn intercept(&self, ctx: &CallContext) -> CallVerdict {
        if let Some(recorder) = &self.recorder {
            match recorder.record_from_context(ctx) {
                Ok(record) => recorder.account(record).await,
                Err(err) => warn!(%err, method = ?ctx.full_method, "call not accounted"),
            }
        }

        match self.gate.authorize(ctx) {
            Ok(decision) => CallVerdict {
                method: ctx.full_method.clone(),
                verdict: match decision.verdict {
                    Verdict::Permit => Outcome::Permit,
                    Verdict::Deny => Outcome::Deny,
                },
                policy: Some(decision.policy_name),
                matched_rule: decision.matched_rule,
                reason: decision.reason,
            },
            Err(err) => {
                warn!(%err, method = ?ctx.full_method, "authorization failed; denying call");
                CallVerdict::rejected(ctx.full_method.clone(), err.to_string())
            }
        }
    }

    /// Read one JSON [`CallContext`] per line from `reader` and write one
    /// JSON [`CallVerdict`] per line to `writer`, until EOF or `shutdown`.
    ///
    /// Blank lines are skipped. A line that is not a valid call is answered
    /// with a denial. Returns the number of verdicts written.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        mut writer: W,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut served = 0u64;

        loop {
            let line = tokio::select! {
                _ = shutdown.recv() => {
                    info!(served, "shutdown requested; no longer reading calls");
                    break;
                }
                line = lines.next_line() => line.context("failed to read call")?,
            };
            let Some(line) = line else {
                info!(served, "input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let verdict = match serde_json::from_str::<CallContext>(&line) {
                Ok(ctx) => self.intercept(&ctx).await,
                Err(err) => {
                    debug!(%err, "malformed call line");
                    CallVerdict::rejected(None, format!("invalid call: {err}"))
                }
            };

            let mut out = serde_json::to_vec(&verdict).context("failed to encode verdict")?;
            out.push(b'\n');
            writer
                .write_all(&out)
                .await
                .context("failed to write verdict")?;
            writer.flush().await.context("failed to flush verdict")?;
            served += 1;
        }

        Ok(served)
    }

    /// Stop the policy reloader and release the recorder so its exporter can
    /// drain and exit.
    pub async fn shutdown(self) {
        self.gate.shutdown().await;
    }
}
