use tracing::{debug, info, warn};

use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::messaging::decode;
use crate::session::{LoopOutcome, Receipt, Session};
use crate::sockets::KernelSockets;

/// The dispatch loop: waits on the request sockets and hands each message to
/// the session, one at a time.
pub struct Kernel<E> {
    sockets: KernelSockets,
    session: Session<E>,
}

impl<E: ExecutionEngine> Kernel<E> {
    pub fn new(sockets: KernelSockets, engine: E) -> Kernel<E> {
        Kernel {
            sockets,
            session: Session::new(engine),
        }
    }

    /// Runs until a shutdown request arrives or the transport fails.
    pub fn run(&mut self) -> Result<()> {
        info!("kernel ready");
        loop {
            if self.poll_once()? == LoopOutcome::Shutdown {
                info!(
                    execution_count = self.session.execution_count(),
                    "shutting down"
                );
                return Ok(());
            }
        }
    }

    /// Blocks until at least one socket is readable, then serves whatever
    /// arrived.
    pub fn poll_once(&mut self) -> Result<LoopOutcome> {
        let (control, shell, stdin) = {
            let mut poll_items = [
                self.sockets.control.as_poll_item(zmq::POLLIN),
                self.sockets.shell.as_poll_item(zmq::POLLIN),
                self.sockets.stdin.as_poll_item(zmq::POLLIN),
            ];
            zmq::poll(&mut poll_items, -1)?;
            (
                poll_items[0].is_readable(),
                poll_items[1].is_readable(),
                poll_items[2].is_readable(),
            )
        };

        let mut outcome = LoopOutcome::Continue;
        let ready = [
            (control, &self.sockets.control, "control"),
            (shell, &self.sockets.shell, "shell"),
        ];
        for (readable, socket, role) in ready {
            if !readable {
                continue;
            }
            // nothing is served after a shutdown, even if the other socket is ready
            if serve(&mut self.session, &self.sockets, socket, role)? == LoopOutcome::Shutdown {
                outcome = LoopOutcome::Shutdown;
                break;
            }
        }
        if stdin {
            // input requests are never issued, so anything here is unsolicited
            let rawmsg = self.sockets.stdin.recv_multipart(0)?;
            debug!(frames = rawmsg.len(), "ignoring stdin message");
        }
        Ok(outcome)
    }
}

fn serve<E: ExecutionEngine>(
    session: &mut Session<E>,
    sockets: &KernelSockets,
    socket: &zmq::Socket,
    role: &'static str,
) -> Result<LoopOutcome> {
    let rawmsg = socket.recv_multipart(0)?;
    let (msg, envelope) = match decode(rawmsg, &sockets.key) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(role, "dropping message: {}", e);
            return Ok(LoopOutcome::Continue);
        }
    };
    debug!(role, msg_type = msg.msg_type(), "-->");
    let receipt = Receipt {
        msg,
        envelope,
        reply_to: socket,
        iopub: &sockets.iopub,
        key: &sockets.key,
    };
    session.handle(&receipt)
}
