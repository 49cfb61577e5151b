//! Prompt for session feedback

use flashq_common::models::AnswerView;

const PREAMBLE: &[&str] = &[
    "The user is preparing for an exam. ",
    "They work through flashcards and mark each one as \"Remembered\" or \"Forgot\". ",
    "Below are the card number, the user's result and the card question. ",
    "Give personalized recommendations based on these results: what is difficult for them, ",
    "what to study and what to review. ",
    "Keep it short and simple, two or three paragraphs at most.",
];

const FENCE: &str = "```";

/// Build the prompt from the resolved answers of a session
///
/// Lines are emitted in the order given; callers pass answers sorted by
/// card uid. Unresolved answers are skipped.
pub fn build_prompt(answers: &[AnswerView]) -> String {
    let mut lines = vec![PREAMBLE.concat(), FENCE.to_string()];

    lines.extend(
        answers
            .iter()
            .filter(|a| a.answer.status.is_terminal())
            .map(|a| {
                format!(
                    "{}. {}. {}",
                    a.uid,
                    a.answer.status.condition(),
                    a.question.trim()
                )
            }),
    );

    lines.push(FENCE.to_string());
    lines.join("\n")
}
