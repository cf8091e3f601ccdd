use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::{KernelError, Result};

pub const SIGNATURE_SCHEME: &str = "hmac-sha256";

/// Contents of the connection file the frontend writes before starting us.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectInfo {
    pub ip: String,
    pub transport: String,
    pub key: String,
    pub signature_scheme: String,
    #[serde(default)]
    pub kernel_name: String,
    pub stdin_port: u16,
    pub hb_port: u16,
    pub control_port: u16,
    pub shell_port: u16,
    pub iopub_port: u16,
}

impl ConnectInfo {
    pub fn from_file(path: &Path) -> Result<ConnectInfo> {
        let f = File::open(path)?;
        let ci: ConnectInfo = serde_json::from_reader(f)?;
        ci.validate()?;
        Ok(ci)
    }

    /// An empty key means messages go unsigned, so the scheme is irrelevant.
    pub fn validate(&self) -> Result<()> {
        if !self.key.is_empty() && self.signature_scheme != SIGNATURE_SCHEME {
            return Err(KernelError::UnsupportedSignatureScheme(
                self.signature_scheme.clone(),
            ));
        }
        Ok(())
    }

    pub fn address(&self, port: u16) -> String {
        format!("{}://{}:{}", self.transport, self.ip, port)
    }

    pub fn key_bytes(&self) -> Vec<u8> {
        self.key.as_bytes().to_vec()
    }
}
