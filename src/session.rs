use serde::Serialize;
use tracing::{debug, warn};

use crate::content::{
    ExecuteReply, ExecuteRequest, ExecutionState, KernelInfo, KernelStatus, OutputMsg, ShellRequest,
};
use crate::engine::ExecutionEngine;
use crate::error::{Result, WireError};
use crate::messaging::{frames_for, Envelope, Message};
use crate::sockets::Channel;

/// Whether the dispatch loop should keep going after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Continue,
    Shutdown,
}

/// A decoded request plus where its replies go.
pub struct Receipt<'a> {
    pub msg: Message,
    pub envelope: Envelope,
    pub reply_to: &'a dyn Channel,
    pub iopub: &'a dyn Channel,
    pub key: &'a [u8],
}

impl Receipt<'_> {
    fn send<T: Serialize>(
        &self,
        channel: &dyn Channel,
        msg_type: &str,
        content: &T,
    ) -> Result<()> {
        let msg = self.msg.reply(msg_type, content)?;
        debug!(msg_type, "<--");
        channel.send_frames(frames_for(&self.envelope, &msg, self.key)?)
    }

    pub fn respond<T: Serialize>(&self, msg_type: &str, content: &T) -> Result<()> {
        self.send(self.reply_to, msg_type, content)
    }

    pub fn broadcast<T: Serialize>(&self, msg_type: &str, content: &T) -> Result<()> {
        self.send(self.iopub, msg_type, content)
    }

    pub fn send_status(&self, execution_state: ExecutionState) -> Result<()> {
        self.broadcast("status", &KernelStatus { execution_state })
    }
}

/// Execution counter and engine. Only the dispatch loop holds one, through
/// `&mut`.
pub struct Session<E> {
    execution_count: u32,
    engine: E,
}

impl<E: ExecutionEngine> Session<E> {
    pub fn new(engine: E) -> Session<E> {
        Session {
            execution_count: 0,
            engine,
        }
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Handles one request between a busy and an idle status broadcast.
    pub fn handle(&mut self, receipt: &Receipt) -> Result<LoopOutcome> {
        let request = match ShellRequest::parse(&receipt.msg) {
            Ok(request) => request,
            Err(e) if receipt.msg.msg_type() == "execute_request" => {
                warn!("rejecting execute_request: {}", e);
                receipt.send_status(ExecutionState::Busy)?;
                self.reject_execute(receipt, &e)?;
                receipt.send_status(ExecutionState::Idle)?;
                return Ok(LoopOutcome::Continue);
            }
            Err(e) => {
                warn!(msg_type = receipt.msg.msg_type(), "dropping request: {}", e);
                return Ok(LoopOutcome::Continue);
            }
        };

        receipt.send_status(ExecutionState::Busy)?;
        let outcome = match request {
            ShellRequest::KernelInfo => {
                self.kernel_info(receipt)?;
                LoopOutcome::Continue
            }
            ShellRequest::Execute(req) => {
                self.execute(receipt, &req)?;
                LoopOutcome::Continue
            }
            ShellRequest::Shutdown(req) => {
                receipt.respond("shutdown_reply", &req)?;
                LoopOutcome::Shutdown
            }
            ShellRequest::Unrecognized(msg_type) => {
                debug!(%msg_type, "unhandled message");
                LoopOutcome::Continue
            }
        };
        receipt.send_status(ExecutionState::Idle)?;
        Ok(outcome)
    }

    fn kernel_info(&self, receipt: &Receipt) -> Result<()> {
        let info = KernelInfo::new(self.engine.language(), self.engine.banner());
        receipt.respond("kernel_info_reply", &info)
    }

    /// Answers an unparseable execute request so the frontend isn't left
    /// waiting. The counter does not move.
    fn reject_execute(&self, receipt: &Receipt, err: &WireError) -> Result<()> {
        let reply = ExecuteReply::error(
            self.execution_count,
            "MalformedPayload".to_owned(),
            err.to_string(),
        );
        receipt.respond("execute_reply", &reply)
    }

    fn execute(&mut self, receipt: &Receipt, req: &ExecuteRequest) -> Result<()> {
        self.execution_count += 1;
        let count = self.execution_count;
        let reply = match self.engine.execute(&req.code) {
            Ok(value) => {
                if let Some(value) = value {
                    let output = OutputMsg::plain_text(count, value.to_string());
                    receipt.broadcast("pyout", &output)?;
                }
                ExecuteReply::ok(count)
            }
            Err(e) => {
                debug!(execution_count = count, "execution failed: {}", e);
                ExecuteReply::error(count, e.ename, e.evalue)
            }
        };
        receipt.respond("execute_reply", &reply)
    }
}
