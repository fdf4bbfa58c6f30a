use crate::models::NOT_MENTIONED_SENTINEL;
use std::fmt::Write;

const INSTRUCTIONS: &str = "\
You are an assistant that reads insurance policy documents.

Answer every question below using ONLY the context block paired with it.

Rules:
1. Answer each question precisely from its own context block.
2. If a context block does not contain the answer, reply with exactly: \"{sentinel}\"
3. Keep numbers, dates, percentages and durations exactly as written in the document.
4. Reply with a single JSON object with one key, \"answers\": a list of strings in the same order as the questions, one answer per question.
";

/// Renders the generator prompt with each question next to its context.
pub fn render_prompt(contexts: &[String], questions: &[String]) -> String {
    let mut prompt = INSTRUCTIONS.replace("{sentinel}", NOT_MENTIONED_SENTINEL);
    let _ = writeln!(prompt, "\nThere are {} questions.", questions.len());

    for (index, question) in questions.iter().enumerate() {
        let context = contexts.get(index).map(String::as_str).unwrap_or_default();
        let _ = write!(
            prompt,
            "\n### Question {number}\n{question}\n\n### Context {number}\n{context}\n",
            number = index + 1,
        );
    }

    prompt
}
