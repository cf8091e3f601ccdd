mod connection;
mod content;
mod engine;
mod error;
mod kernel;
mod logging;
mod messaging;
mod session;
mod sockets;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use crate::connection::ConnectInfo;
use crate::engine::Calculator;
use crate::kernel::Kernel;
use crate::sockets::KernelSockets;

/// Reverse polish notation calculator kernel for Jupyter frontends.
#[derive(Parser, Debug)]
#[command(name = "calckernel", version, about)]
struct Cli {
    /// Connection file written by the frontend
    connection_file: PathBuf,

    /// Log extra info to stderr
    #[arg(long)]
    debug: bool,
}

fn run(cli: &Cli) -> error::Result<()> {
    info!(path = %cli.connection_file.display(), "reading connection file");
    let connect_info = ConnectInfo::from_file(&cli.connection_file)?;
    info!(kernel_name = %connect_info.kernel_name, transport = %connect_info.transport, "loaded");
    let sockets = KernelSockets::new(&connect_info)?;
    Kernel::new(sockets, Calculator::new()).run()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
