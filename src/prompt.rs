use crate::session::ConversationLog;

pub const CONTEXT_TURNS: usize = 3;
pub const CONTEXT_PREVIEW_CHARS: usize = 200;
pub const CONTEXT_HEADER: &str = "Previous conversation context:\n";

pub const INSTRUCTIONS_SUFFIX: &str = "\
Instructions:
- You are a professional research assistant
- Use web search tools to find current information
- Scrape websites for detailed content when necessary
- Always provide sources for your information
- If the query is about a specific location, include relevant local information
- Try to find the most recent information available
- Try to find information that is up-to-date and relevant according the timeframe of the query
- Provide detailed, helpful information
- Always include sources and citations
- If searching for professionals (doctors, lawyers, restaurants, etc.), include:
  * Names of specific people/businesses
  * Contact information (phone, address, email if available)
  * Professional credentials or specialties
- Format your response clearly Don't Include think in it.
- End with a \"Sources:\" section listing all websites/sources used
- Be specific and comprehensive in your answers
- give output in a way that is easy to read and understand and good for the user
";

/// First 200 characters followed by `...`. The ellipsis is added even when
/// nothing was cut.
pub fn preview(text: &str) -> String {
    let cut: String = text.chars().take(CONTEXT_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

/// Empty for an empty log.
pub fn context_block(log: &ConversationLog) -> String {
    if log.is_empty() {
        return String::new();
    }
    let mut context = String::from(CONTEXT_HEADER);
    for turn in log.recent(CONTEXT_TURNS) {
        context.push_str(&format!("User: {}\n", turn.user_text));
        context.push_str(&format!("Assistant: {}\n\n", preview(&turn.assistant_text)));
    }
    context
}

pub fn assemble(current_query: &str, log: &ConversationLog) -> String {
    format!(
        "{}Current user question: {}\n\n{}",
        context_block(log),
        current_query,
        INSTRUCTIONS_SUFFIX
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConversationTurn;

    fn log_of(n: usize) -> ConversationLog {
        let mut log = ConversationLog::new();
        for i in 0..n {
            log.append(ConversationTurn {
                timestamp: "12:00:00".into(),
                user_text: format!("question {}", i),
                assistant_text: format!("answer {}", i),
            });
        }
        log
    }

    #[test]
    fn empty_log_has_no_context_header() {
        let q = "Find top 3 dermatologists in Los Angeles with their names and contact information";
        let p = assemble(q, &ConversationLog::new());
        assert!(!p.contains("Previous conversation context"));
        assert!(p.starts_with(&format!("Current user question: {}", q)));
        assert!(p.ends_with(INSTRUCTIONS_SUFFIX));
    }

    #[test]
    fn instruction_lines_keep_their_exact_wording() {
        let p = assemble("q", &ConversationLog::new());
        assert!(p.contains("- Try to find information that is up-to-date and relevant according the timeframe of the query\n"));
        assert!(p.contains("- Format your response clearly Don't Include think in it.\n"));
        assert!(p.contains("- give output in a way that is easy to read and understand and good for the user\n"));
        assert!(p.contains("- End with a \"Sources:\" section listing all websites/sources used\n"));
    }

    #[test]
    fn only_last_three_turns_in_order() {
        let p = assemble("next", &log_of(5));
        assert!(p.starts_with(CONTEXT_HEADER));
        assert!(!p.contains("question 0"));
        assert!(!p.contains("question 1"));
        let i2 = p.find("User: question 2\n").unwrap();
        let i3 = p.find("User: question 3\n").unwrap();
        let i4 = p.find("User: question 4\n").unwrap();
        assert!(i2 < i3 && i3 < i4);
        assert!(p.contains("Assistant: answer 4...\n\nCurrent user question: next\n\n"));
        assert_eq!(p.matches("User: ").count(), 3);
    }

    #[test]
    fn fewer_than_three_turns_uses_all() {
        let block = context_block(&log_of(2));
        assert_eq!(
            block,
            "Previous conversation context:\nUser: question 0\nAssistant: answer 0...\n\nUser: question 1\nAssistant: answer 1...\n\n"
        );
    }

    #[test]
    fn assistant_text_truncated_to_200_chars_plus_ellipsis() {
        let long = "é".repeat(250);
        assert_eq!(preview(&long), format!("{}...", "é".repeat(200)));
        assert_eq!(preview("short"), "short...");
        assert_eq!(preview(""), "...");

        let mut log = ConversationLog::new();
        log.append(ConversationTurn { timestamp: "t".into(), user_text: "u".into(), assistant_text: "x".repeat(500) });
        let p = assemble("q", &log);
        assert!(p.contains(&format!("Assistant: {}...\n", "x".repeat(200))));
        assert!(!p.contains(&"x".repeat(201)));
    }

    #[test]
    fn assemble_is_deterministic() {
        let log = log_of(4);
        assert_eq!(assemble("same", &log), assemble("same", &log));
    }
}
