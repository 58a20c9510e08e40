//! 任务 prompt 模板
//!
//! 每个 prompt = 指令行 + 一个定界的载荷块。所有指令都要求模型只返回结果文本，
//! 响应除 trim 外不做任何后处理。

use crate::core::task::{Task, Tone};

const TEXT_OPEN: &str = "<<<TEXT";
const CONTEXT_OPEN: &str = "<<<CONTEXT";
const INSTRUCTION_OPEN: &str = "<<<INSTRUCTION";
const CLOSE: &str = ">>>";

pub fn build_prompt(task: &Task) -> String {
    match task {
        Task::Rewrite { text, tone } => with_text(rewrite_instructions(*tone), text),
        Task::Shorten { text } => with_text(
            &[
                "Shorten the text conservatively while preserving all key meaning.",
                "Avoid bullet lists unless the original used them.",
                "Return only the shortened text.",
            ],
            text,
        ),
        Task::Expand { text } => with_text(
            &[
                "Expand the text by roughly 20 to 40 percent while keeping the same meaning and tone.",
                "Avoid inventing new facts.",
                "Return only the expanded text.",
            ],
            text,
        ),
        Task::Proofread { text } => with_text(
            &[
                "Proofread and correct grammar, punctuation, and word choice.",
                "Preserve the original tone and structure as much as possible.",
                "Return only the corrected text.",
            ],
            text,
        ),
        Task::Write { instruction, context } => write_prompt(instruction, context),
    }
}

fn rewrite_instructions(tone: Tone) -> &'static [&'static str] {
    match tone {
        Tone::Formal => &[
            "Rewrite the text in a professional and formal tone.",
            "Preserve meaning, facts, and intent.",
            "Return only the rewritten text.",
        ],
        Tone::Casual => &[
            "Rewrite the text in a relaxed, natural tone suitable for friendly conversation.",
            "Preserve meaning, facts, and intent.",
            "Return only the rewritten text.",
        ],
        Tone::Grammar => &[
            "Fix grammar, spelling, and clarity.",
            "Do not change tone or meaning.",
            "Return only the corrected text.",
        ],
        Tone::Clarity => &[
            "Rewrite the text to improve clarity and flow without changing its meaning.",
            "Return only the rewritten text.",
        ],
    }
}

fn with_text(instructions: &[&str], text: &str) -> String {
    let mut lines: Vec<&str> = instructions.to_vec();
    lines.extend([TEXT_OPEN, text, CLOSE]);
    lines.join("\n")
}

fn write_prompt(instruction: &str, context: &str) -> String {
    let mut lines = vec![
        "Follow the instruction and draft a concise response.",
        "Use clear, direct language.",
        "Return only the draft.",
    ];
    if !context.trim().is_empty() {
        lines.extend([
            "You may use the context to tailor wording without adding new facts.",
            CONTEXT_OPEN,
            context,
            CLOSE,
        ]);
    }
    lines.extend([INSTRUCTION_OPEN, instruction, CLOSE]);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::EXPLAIN_INSTRUCTION;

    #[test]
    fn test_rewrite_grammar_prompt() {
        let p = build_prompt(&Task::Rewrite {
            text: "this is bad grammer".into(),
            tone: Tone::Grammar,
        });
        assert_eq!(
            p,
            "Fix grammar, spelling, and clarity.\nDo not change tone or meaning.\n\
             Return only the corrected text.\n<<<TEXT\nthis is bad grammer\n>>>"
        );
    }

    #[test]
    fn test_every_text_task_fences_payload_once() {
        let tasks = [
            Task::Rewrite { text: "p".into(), tone: Tone::Formal },
            Task::Rewrite { text: "p".into(), tone: Tone::Casual },
            Task::Rewrite { text: "p".into(), tone: Tone::Clarity },
            Task::Shorten { text: "p".into() },
            Task::Expand { text: "p".into() },
            Task::Proofread { text: "p".into() },
        ];
        for task in tasks {
            let p = build_prompt(&task);
            assert!(p.ends_with("<<<TEXT\np\n>>>"), "{p}");
            assert_eq!(p.matches("<<<").count(), 1);
            assert!(p.contains("Return only"));
        }
    }

    #[test]
    fn test_expand_mentions_growth_range() {
        let p = build_prompt(&Task::Expand { text: "AI is cool.".into() });
        assert!(p.contains("20 to 40 percent"));
        assert!(p.contains("Avoid inventing new facts."));
    }

    #[test]
    fn test_write_without_context_omits_block() {
        let p = build_prompt(&Task::Write {
            instruction: "Write a short thank you email.".into(),
            context: "   ".into(),
        });
        assert!(!p.contains("<<<CONTEXT"));
        assert!(!p.contains("tailor wording"));
        assert!(p.ends_with("<<<INSTRUCTION\nWrite a short thank you email.\n>>>"));
    }

    #[test]
    fn test_write_with_context_precedes_instruction() {
        let p = build_prompt(&Task::Write {
            instruction: "Write a short thank you email.".into(),
            context: "For the gift.".into(),
        });
        let ctx = p.find("<<<CONTEXT\nFor the gift.\n>>>").unwrap();
        let ins = p.find("<<<INSTRUCTION").unwrap();
        assert!(ctx < ins);
        assert!(p.contains("without adding new facts"));
    }

    #[test]
    fn test_explain_prompt_uses_text_as_context() {
        let p = build_prompt(&Task::explain("Photosynthesis converts light to energy."));
        assert!(p.contains("<<<CONTEXT\nPhotosynthesis converts light to energy.\n>>>"));
        assert!(p.contains(&format!("<<<INSTRUCTION\n{}\n>>>", EXPLAIN_INSTRUCTION)));
    }
}
