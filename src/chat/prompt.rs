//! Prompt builders for the tutoring endpoints

use super::ChatMessage;

pub const CHAT_SYSTEM_PROMPT: &str = "You are an academic assistant helping students with \
their studies. Answer clearly and accurately, and say so when you are unsure.";

pub const QUESTION_EXTRACTION_PROMPT: &str = "Extract the question, including any answer \
choices, from the following OCR text. Return only the question.";

pub const ANSWER_PROMPT: &str = "You are a precise tutor. If the question has answer choices, \
return only the full text of the correct choice. Otherwise give a concise, complete answer.";

pub const MULTIMODAL_PROMPT: &str = "You are a precise tutor. Answer the question shown in \
the image. If it has answer choices, return only the full text of the correct choice.";

/// System prompt, prior turns as `role: content` lines, then the new turn.
pub fn chat_prompt(history: &[ChatMessage], message: &str) -> String {
    let mut prompt = format!("{}\n\n", CHAT_SYSTEM_PROMPT);
    for entry in history {
        prompt.push_str(&format!("{}: {}\n", entry.role, entry.content));
    }
    prompt.push_str(&format!("User: {}\nAssistant:", message));
    prompt
}

pub fn multimodal_system_prompt(context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{}\n\nAdditional context: {}", MULTIMODAL_PROMPT, context),
        None => MULTIMODAL_PROMPT.to_string(),
    }
}
