//! 写作任务：一次 prompt 构建 + 一次模型调用

use std::fmt;

use crate::core::ComposeError;
use crate::provider::SamplingParams;

/// explain 使用的固定指令
pub const EXPLAIN_INSTRUCTION: &str =
    "Explain the following clearly and objectively for a general audience. Avoid extra formatting.";

/// 校对时更确定的采样参数
pub const PROOFREAD_SAMPLING: SamplingParams = SamplingParams {
    top_k: 3,
    temperature: 0.3,
};

/// 改写语气
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Formal,
    Casual,
    Grammar,
    /// 未识别的语气：只提升清晰度与流畅度
    Clarity,
}

impl Tone {
    /// 大小写不敏感；未知值归为 Clarity
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "formal" => Self::Formal,
            "casual" => Self::Casual,
            "grammar" => Self::Grammar,
            _ => Self::Clarity,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Grammar => "grammar",
            Self::Clarity => "clarity",
        }
    }
}

/// 任务类别（日志与 envelope 用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Rewrite,
    Shorten,
    Expand,
    Proofread,
    Write,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rewrite => "rewrite",
            Self::Shorten => "shorten",
            Self::Expand => "expand",
            Self::Proofread => "proofread",
            Self::Write => "write",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Rewrite { text: String, tone: Tone },
    Shorten { text: String },
    Expand { text: String },
    Proofread { text: String },
    Write { instruction: String, context: String },
}

impl Task {
    /// explain 是固定指令的 write：选中文本作为上下文，只读
    pub fn explain(text: impl Into<String>) -> Self {
        Self::Write {
            instruction: EXPLAIN_INSTRUCTION.to_string(),
            context: text.into(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Rewrite { .. } => TaskKind::Rewrite,
            Self::Shorten { .. } => TaskKind::Shorten,
            Self::Expand { .. } => TaskKind::Expand,
            Self::Proofread { .. } => TaskKind::Proofread,
            Self::Write { .. } => TaskKind::Write,
        }
    }

    /// 主输入：write 为指令，其余为文本
    pub fn primary_input(&self) -> &str {
        match self {
            Self::Rewrite { text, .. }
            | Self::Shorten { text }
            | Self::Expand { text }
            | Self::Proofread { text } => text,
            Self::Write { instruction, .. } => instruction,
        }
    }

    /// 主输入去空白后为空时返回 InvalidInput
    pub fn validate(&self) -> Result<(), ComposeError> {
        if !self.primary_input().trim().is_empty() {
            return Ok(());
        }
        let msg = match self {
            Self::Write { .. } => "No instruction provided for write.".to_string(),
            other => format!("No text provided for {}.", other.kind()),
        };
        Err(ComposeError::InvalidInput(msg))
    }

    /// 单次调用的采样参数覆盖；None 表示使用会话基础参数
    pub fn sampling_override(&self) -> Option<SamplingParams> {
        match self {
            Self::Proofread { .. } => Some(PROOFREAD_SAMPLING),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_parse() {
        assert_eq!(Tone::parse("FORMAL"), Tone::Formal);
        assert_eq!(Tone::parse(" casual "), Tone::Casual);
        assert_eq!(Tone::parse("grammar"), Tone::Grammar);
        assert_eq!(Tone::parse("pirate"), Tone::Clarity);
    }

    #[test]
    fn test_explain_is_write_with_fixed_instruction() {
        let task = Task::explain("Photosynthesis converts light to energy.");
        assert_eq!(task.kind(), TaskKind::Write);
        match task {
            Task::Write { instruction, context } => {
                assert_eq!(instruction, EXPLAIN_INSTRUCTION);
                assert_eq!(context, "Photosynthesis converts light to energy.");
            }
            _ => panic!("Expected Write"),
        }
    }

    #[test]
    fn test_validate_rejects_blank_primary_input() {
        let err = Task::Shorten { text: "  \n\t".into() }.validate().unwrap_err();
        assert_eq!(err, ComposeError::InvalidInput("No text provided for shorten.".into()));

        let err = Task::Write {
            instruction: " ".into(),
            context: "has context".into(),
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("instruction"));

        assert!(Task::Expand { text: "ok".into() }.validate().is_ok());
    }

    #[test]
    fn test_only_proofread_overrides_sampling() {
        assert_eq!(
            Task::Proofread { text: "x".into() }.sampling_override(),
            Some(PROOFREAD_SAMPLING)
        );
        assert!(Task::Rewrite { text: "x".into(), tone: Tone::Formal }
            .sampling_override()
            .is_none());
    }
}
