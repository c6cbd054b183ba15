//! Lowercasing, non-alphanumeric-splitting tokenizer.

/// Tokens of `text` with their 0-based positions.
pub fn tokenize(text: &str) -> Vec<(String, u32)> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(pos, t)| (t.to_lowercase(), pos as u32))
        .collect()
}

/// Distinct query terms in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(query)
        .into_iter()
        .map(|(t, _)| t)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_lowercases() {
        let tokens = tokenize("Hello, World! hello-again");
        let terms: Vec<_> = tokens.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["hello", "world", "hello", "again"]);
        assert_eq!(tokens[3].1, 3);
    }

    #[test]
    fn query_terms_are_distinct() {
        assert_eq!(query_terms("rust RUST borrow"), vec!["rust", "borrow"]);
        assert!(query_terms("  ,,, ").is_empty());
    }
}
