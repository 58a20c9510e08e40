//! 请求 / 响应信封（调用方 ↔ RequestCoordinator）
//!
//! 请求：`{action, data: {text?, tone?, mode?, instruction?, context?}}`，mode 是 tone 的别名；
//! 响应：`{success, result?, error?}`，result 与 error 恰有其一。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ComposeError;

/// 可识别的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Rewrite,
    Shorten,
    Expand,
    Proofread,
    Write,
    Explain,
    Availability,
    Warmup,
}

impl FromStr for Action {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rewrite" => Ok(Self::Rewrite),
            "shorten" => Ok(Self::Shorten),
            "expand" => Ok(Self::Expand),
            "proofread" => Ok(Self::Proofread),
            "write" => Ok(Self::Write),
            "explain" => Ok(Self::Explain),
            "availability" => Ok(Self::Availability),
            "warmup" => Ok(Self::Warmup),
            other => Err(ComposeError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rewrite => "rewrite",
            Self::Shorten => "shorten",
            Self::Expand => "expand",
            Self::Proofread => "proofread",
            Self::Write => "write",
            Self::Explain => "explain",
            Self::Availability => "availability",
            Self::Warmup => "warmup",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl RequestData {
    /// tone 优先，其次 mode；空白值视为未设置
    pub fn tone(&self) -> Option<&str> {
        non_blank(&self.tone).or_else(|| non_blank(&self.mode))
    }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|t| !t.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: RequestData,
}

impl Request {
    pub fn new(action: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            data: RequestData::default(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.data.text = Some(text.to_string());
        self
    }

    pub fn with_tone(mut self, tone: &str) -> Self {
        self.data.tone = Some(tone.to_string());
        self
    }

    pub fn with_instruction(mut self, instruction: &str) -> Self {
        self.data.instruction = Some(instruction.to_string());
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.data.context = Some(context.to_string());
        self
    }

    /// 解析动作；缺失或为空 → InvalidRequest，未知 → UnknownAction
    pub fn action(&self) -> Result<Action, ComposeError> {
        match self.action.as_deref().map(str::trim) {
            None | Some("") => Err(ComposeError::InvalidRequest("missing action".to_string())),
            Some(a) => a.parse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// 文本结果（写作类动作）
    pub fn result_text(&self) -> Option<&str> {
        self.result.as_ref().and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_json() {
        let req: Request = serde_json::from_str(
            r#"{"action":"rewrite","data":{"text":"hi","mode":"casual"}}"#,
        )
        .unwrap();
        assert_eq!(req.action().unwrap(), Action::Rewrite);
        assert_eq!(req.data.tone(), Some("casual"));

        let bare: Request = serde_json::from_str(r#"{"action":"availability"}"#).unwrap();
        assert_eq!(bare.action().unwrap(), Action::Availability);
        assert_eq!(bare.data, RequestData::default());
    }

    #[test]
    fn test_missing_and_unknown_action() {
        let err = Request::default().action().unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: missing action");
        let err = Request::new("translate").action().unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: translate");
    }

    #[test]
    fn test_tone_takes_precedence_over_mode() {
        let mut data = RequestData {
            mode: Some("casual".into()),
            ..RequestData::default()
        };
        data.tone = Some("formal".into());
        assert_eq!(data.tone(), Some("formal"));
    }

    #[test]
    fn test_blank_tone_falls_through() {
        let data = RequestData {
            tone: Some("  ".into()),
            mode: Some("casual".into()),
            ..RequestData::default()
        };
        assert_eq!(data.tone(), Some("casual"));

        let data = RequestData {
            tone: Some(String::new()),
            mode: Some(String::new()),
            ..RequestData::default()
        };
        assert_eq!(data.tone(), None);
    }

    #[test]
    fn test_response_serialization_omits_absent_field() {
        let ok = serde_json::to_value(Response::ok(Value::String("done".into()))).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "result": "done"}));

        let fail = serde_json::to_value(Response::failure(ComposeError::Busy)).unwrap();
        assert_eq!(fail["success"], false);
        assert!(fail.get("result").is_none());
        assert!(fail["error"].as_str().unwrap().contains("busy"));
    }
}
