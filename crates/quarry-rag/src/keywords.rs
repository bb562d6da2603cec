const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "has", "have",
    "her", "his", "its", "was", "one", "our", "out", "get", "how", "why", "who", "what", "when",
    "where", "which", "does", "did", "doing", "this", "that", "these", "those", "with", "from",
    "into", "about", "there", "their", "they", "them", "then", "than", "been", "being", "were",
    "will", "would", "could", "should", "shall", "may", "might", "must", "some", "such", "only",
    "own", "same", "very", "just", "also", "use", "used", "uses", "using", "work", "works",
    "tell", "show", "explain", "describe", "please", "here", "each", "other",
];

/// Lower-cased question terms longer than two characters, minus stop words,
/// in first-seen order without duplicates.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let cleaned: String = question
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' {
                ch
            } else {
                ' '
            }
        })
        .collect();

    let mut keywords: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|existing| existing == token) {
            keywords.push(token.to_owned());
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_short_tokens_and_stop_words() {
        assert_eq!(
            extract_keywords("How does the Login flow handle JWT tokens? (login, again)"),
            vec!["login", "flow", "handle", "jwt", "tokens", "again"]
        );
    }

    #[test]
    fn keeps_identifiers_with_underscores() {
        assert_eq!(
            extract_keywords("Where is parse_config called?"),
            vec!["parse_config", "called"]
        );
    }

    #[test]
    fn stop_word_only_question_has_no_keywords() {
        assert!(extract_keywords("What is it? Why?").is_empty());
    }
}
