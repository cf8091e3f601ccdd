use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;
use crate::messaging::{Message, PROTOCOL_VERSION};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Shutdown {
    #[serde(default)]
    pub restart: bool,
}

/// What arrived on the shell or control socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellRequest {
    KernelInfo,
    Execute(ExecuteRequest),
    Shutdown(Shutdown),
    Unrecognized(String),
}

impl ShellRequest {
    pub fn parse(msg: &Message) -> Result<ShellRequest, WireError> {
        let req = match msg.msg_type() {
            "kernel_info_request" => ShellRequest::KernelInfo,
            "execute_request" => ShellRequest::Execute(parse_content(msg)?),
            "shutdown_request" => ShellRequest::Shutdown(parse_content(msg)?),
            other => ShellRequest::Unrecognized(other.to_owned()),
        };
        Ok(req)
    }
}

fn parse_content<T: DeserializeOwned>(msg: &Message) -> Result<T, WireError> {
    T::deserialize(&msg.content).map_err(|source| WireError::MalformedPayload {
        part: "content",
        source,
    })
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub file_extension: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct KernelInfo {
    pub protocol_version: [u32; 2],
    pub language: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub banner: String,
}

impl KernelInfo {
    pub fn new(language: &str, banner: &str) -> KernelInfo {
        KernelInfo {
            protocol_version: PROTOCOL_VERSION,
            language: language.to_owned(),
            implementation: env!("CARGO_PKG_NAME").to_owned(),
            implementation_version: env!("CARGO_PKG_VERSION").to_owned(),
            language_info: LanguageInfo {
                name: language.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                mimetype: "text/plain".to_owned(),
                file_extension: ".txt".to_owned(),
            },
            banner: banner.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KernelStatus {
    pub execution_state: ExecutionState,
}

/// Content of a `pyout` broadcast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutputMsg {
    pub execution_count: u32,
    pub data: BTreeMap<String, String>,
    pub metadata: Map<String, Value>,
}

impl OutputMsg {
    pub fn plain_text(execution_count: u32, text: String) -> OutputMsg {
        let mut data = BTreeMap::new();
        data.insert("text/plain".to_owned(), text);
        OutputMsg {
            execution_count,
            data,
            metadata: Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecuteReply {
    Ok {
        execution_count: u32,
        payload: Vec<Value>,
        user_variables: Map<String, Value>,
        user_expressions: Map<String, Value>,
    },
    Error {
        execution_count: u32,
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl ExecuteReply {
    pub fn ok(execution_count: u32) -> ExecuteReply {
        ExecuteReply::Ok {
            execution_count,
            payload: Vec::new(),
            user_variables: Map::new(),
            user_expressions: Map::new(),
        }
    }

    pub fn error(execution_count: u32, ename: String, evalue: String) -> ExecuteReply {
        ExecuteReply::Error {
            execution_count,
            ename,
            traceback: vec![evalue.clone()],
            evalue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MsgHeader;
    use serde_json::json;

    fn msg(msg_type: &str, content: Value) -> Message {
        Message {
            header: MsgHeader::new(msg_type, "s", "u"),
            parent_header: None,
            metadata: Map::new(),
            content,
        }
    }

    #[test]
    fn parses_known_requests() {
        assert_eq!(
            ShellRequest::parse(&msg("kernel_info_request", json!({}))).unwrap(),
            ShellRequest::KernelInfo
        );
        assert_eq!(
            ShellRequest::parse(&msg("execute_request", json!({"code": "1 1 +", "silent": false})))
                .unwrap(),
            ShellRequest::Execute(ExecuteRequest {
                code: "1 1 +".to_owned()
            })
        );
        assert_eq!(
            ShellRequest::parse(&msg("shutdown_request", json!({"restart": true}))).unwrap(),
            ShellRequest::Shutdown(Shutdown { restart: true })
        );
    }

    #[test]
    fn unknown_types_fall_through() {
        let req = ShellRequest::parse(&msg("complete_request", json!({"code": "x"}))).unwrap();
        assert_eq!(req, ShellRequest::Unrecognized("complete_request".to_owned()));
    }

    #[test]
    fn execute_without_code_is_malformed() {
        let err = ShellRequest::parse(&msg("execute_request", json!({"code": 3}))).unwrap_err();
        assert!(matches!(err, WireError::MalformedPayload { part: "content", .. }));
    }

    #[test]
    fn execute_reply_shapes() {
        assert_eq!(
            serde_json::to_value(ExecuteReply::ok(3)).unwrap(),
            json!({
                "status": "ok",
                "execution_count": 3,
                "payload": [],
                "user_variables": {},
                "user_expressions": {},
            })
        );
        assert_eq!(
            serde_json::to_value(ExecuteReply::error(4, "ERROR".into(), "boom".into())).unwrap(),
            json!({
                "status": "error",
                "execution_count": 4,
                "ename": "ERROR",
                "evalue": "boom",
                "traceback": ["boom"],
            })
        );
    }

    #[test]
    fn status_and_output_shapes() {
        let status = KernelStatus {
            execution_state: ExecutionState::Idle,
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"execution_state": "idle"})
        );
        assert_eq!(
            serde_json::to_value(OutputMsg::plain_text(1, "2".into())).unwrap(),
            json!({"execution_count": 1, "data": {"text/plain": "2"}, "metadata": {}})
        );
    }

    #[test]
    fn kernel_info_has_version_pair_and_language() {
        let info = serde_json::to_value(KernelInfo::new("rpn", "calc")).unwrap();
        assert_eq!(info["protocol_version"].as_array().unwrap().len(), 2);
        assert_eq!(info["language"], "rpn");
        assert_eq!(info["language_info"]["name"], "rpn");
    }
}
