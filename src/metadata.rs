use std::collections::BTreeMap;

/// Decodes a free-text `key=value,...` annotation into a mapping.
///
/// Splits on commas, then on the first `=` per token; both sides are trimmed.
/// Tokens without `=` are dropped silently and duplicate keys keep the last
/// occurrence. Never fails; empty input yields an empty mapping.
pub fn parse_info(text: &str) -> BTreeMap<String, String> {
    let mut parsed = BTreeMap::new();
    for token in text.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_commas_and_first_equals() {
        let parsed = parse_info("a=1, b=2");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["a"], "1");
        assert_eq!(parsed["b"], "2");
    }

    #[test]
    fn empty_input_yields_empty_mapping() {
        assert!(parse_info("").is_empty());
    }

    #[test]
    fn tokens_without_equals_are_dropped() {
        assert!(parse_info("bad,token").is_empty());
    }

    #[test]
    fn last_duplicate_wins() {
        let parsed = parse_info("k=1,k=2");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["k"], "2");
    }

    #[test]
    fn value_may_contain_equals() {
        let parsed = parse_info("note=a=b");
        assert_eq!(parsed["note"], "a=b");
    }
}
