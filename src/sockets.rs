use std::process;
use std::thread;

use tracing::{debug, error, info};

use crate::connection::ConnectInfo;
use crate::error::{KernelError, Result};

/// Somewhere a complete multipart message can be sent.
pub trait Channel {
    fn send_frames(&self, frames: Vec<Vec<u8>>) -> Result<()>;
}

impl Channel for zmq::Socket {
    fn send_frames(&self, frames: Vec<Vec<u8>>) -> Result<()> {
        self.send_multipart(frames, 0)?;
        Ok(())
    }
}

/// The sockets the dispatch loop talks through. The heartbeat socket lives on
/// its own thread and is not part of this.
pub struct KernelSockets {
    pub shell: zmq::Socket,
    pub control: zmq::Socket,
    pub stdin: zmq::Socket,
    pub iopub: zmq::Socket,
    pub key: Vec<u8>,
}

fn bind(
    ctx: &zmq::Context,
    kind: zmq::SocketType,
    role: &'static str,
    address: String,
) -> Result<zmq::Socket> {
    let socket = ctx.socket(kind)?;
    socket.bind(&address).map_err(|source| KernelError::Bind {
        role,
        address: address.clone(),
        source,
    })?;
    debug!(role, %address, "bound socket");
    Ok(socket)
}

impl KernelSockets {
    pub fn new(ci: &ConnectInfo) -> Result<KernelSockets> {
        KernelSockets::with_context(&zmq::Context::new(), ci)
    }

    /// Binds every socket, starting the heartbeat echo once its socket is up.
    pub fn with_context(ctx: &zmq::Context, ci: &ConnectInfo) -> Result<KernelSockets> {
        let hb = bind(ctx, zmq::REP, "heartbeat", ci.address(ci.hb_port))?;
        let iopub = bind(ctx, zmq::PUB, "iopub", ci.address(ci.iopub_port))?;
        let control = bind(ctx, zmq::ROUTER, "control", ci.address(ci.control_port))?;
        let stdin = bind(ctx, zmq::ROUTER, "stdin", ci.address(ci.stdin_port))?;
        let shell = bind(ctx, zmq::ROUTER, "shell", ci.address(ci.shell_port))?;
        spawn_heartbeat(hb)?;
        info!(shell_port = ci.shell_port, "kernel sockets bound");
        Ok(KernelSockets {
            shell,
            control,
            stdin,
            iopub,
            key: ci.key_bytes(),
        })
    }
}

fn spawn_heartbeat(hb: zmq::Socket) -> Result<()> {
    thread::Builder::new()
        .name("heartbeat".to_owned())
        .spawn(move || match heartbeat(&hb) {
            Ok(()) => debug!("heartbeat stopped with its context"),
            Err(e) => {
                // a kernel that can't answer pings looks dead to the frontend
                error!("heartbeat failed: {}", e);
                eprintln!("error: heartbeat failed: {e}");
                process::exit(1);
            }
        })?;
    Ok(())
}

/// Echoes every message straight back until the context is terminated.
fn heartbeat(hb: &zmq::Socket) -> Result<()> {
    loop {
        let ping = match retry_interrupted(|| hb.recv_multipart(0)) {
            Ok(ping) => ping,
            Err(zmq::Error::ETERM) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match retry_interrupted(|| hb.send_multipart(ping.iter().map(Vec::as_slice), 0)) {
            Ok(()) => {}
            Err(zmq::Error::ETERM) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Repeats `op` for as long as it is interrupted by a signal.
fn retry_interrupted<T>(mut op: impl FnMut() -> zmq::Result<T>) -> zmq::Result<T> {
    loop {
        match op() {
            Err(zmq::Error::EINTR) => debug!("interrupted, retrying"),
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inproc_info(name: &str) -> ConnectInfo {
        ConnectInfo {
            ip: name.to_owned(),
            transport: "inproc".to_owned(),
            key: "secret".to_owned(),
            signature_scheme: "hmac-sha256".to_owned(),
            kernel_name: String::new(),
            stdin_port: 1,
            hb_port: 2,
            control_port: 3,
            shell_port: 4,
            iopub_port: 5,
        }
    }

    #[test]
    fn heartbeat_echoes() {
        let ctx = zmq::Context::new();
        let ci = inproc_info("hb-echo");
        let _sockets = KernelSockets::with_context(&ctx, &ci).unwrap();

        let client = ctx.socket(zmq::REQ).unwrap();
        client.connect(&ci.address(ci.hb_port)).unwrap();
        for ping in [&b"ping"[..], &b"\x00\x01\x02"[..]] {
            client.send(ping, 0).unwrap();
            assert_eq!(client.recv_bytes(0).unwrap(), ping);
        }
    }

    #[test]
    fn interrupted_calls_are_retried() {
        let mut calls = 0;
        let result = retry_interrupted(|| {
            calls += 1;
            if calls < 3 {
                Err(zmq::Error::EINTR)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let result: zmq::Result<()> = retry_interrupted(|| {
            calls += 1;
            Err(zmq::Error::EFSM)
        });
        assert_eq!(result, Err(zmq::Error::EFSM));
        assert_eq!(calls, 1);
    }

    #[test]
    fn key_comes_from_connection_info() {
        let ctx = zmq::Context::new();
        let sockets = KernelSockets::with_context(&ctx, &inproc_info("key")).unwrap();
        assert_eq!(sockets.key, b"secret");
    }

    #[test]
    fn bind_failure_names_the_socket() {
        let ctx = zmq::Context::new();
        let ci = inproc_info("taken");
        let _first = KernelSockets::with_context(&ctx, &ci).unwrap();
        match KernelSockets::with_context(&ctx, &ci) {
            Err(KernelError::Bind { role, address, .. }) => {
                assert_eq!(role, "heartbeat");
                assert_eq!(address, "inproc://taken:2");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind should fail"),
        }
    }
}
