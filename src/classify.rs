use regex::Regex;

use crate::models::{ChangeType, ParsedCommit, RawCommit};

/// Strict conventional-commit classifier.
///
/// Policy: only commits whose subject line matches
/// `type(scope)?: title` with a type token in {feat, fix, improvement,
/// refactor} (case-insensitive) produce a changelog entry. Everything else
/// is unclassifiable and silently excluded from the sync. Merge commits and
/// empty messages are filtered out before classification even runs.
pub struct Classifier {
    pattern: Regex,
}

impl Classifier {
    pub fn new() -> Self {
        let pattern = Regex::new(r"(?i)^(feat|fix|improvement|refactor)(\(.+\))?:\s*(.+)$")
            .expect("conventional commit pattern is valid");
        Self { pattern }
    }

    /// Pre-filter: merge commits and empty messages never enter
    /// classification and are not counted anywhere.
    pub fn is_excluded(commit: &RawCommit) -> bool {
        commit.message.is_empty() || commit.message.starts_with("Merge")
    }

    /// Returns None when the commit does not follow the convention.
    pub fn classify(&self, commit: &RawCommit) -> Option<ParsedCommit> {
        let mut lines = commit.message.lines();
        let subject = lines.next().unwrap_or("");

        let captures = self.pattern.captures(subject)?;

        let change_type = match captures[1].to_lowercase().as_str() {
            "feat" => ChangeType::Feat,
            "fix" => ChangeType::Fix,
            // improvement and refactor both land here
            _ => ChangeType::Improvement,
        };

        let title = captures[3].trim().to_string();

        let body = lines.collect::<Vec<_>>().join("\n");
        let body = body.trim();
        let description = (!body.is_empty()).then(|| body.to_string());

        Some(ParsedCommit {
            hash: commit.hash.clone(),
            change_type,
            title,
            description,
            author_name: commit.author_name.clone(),
            author_avatar: commit.author_avatar.clone(),
            date: commit.author_date,
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn commit(message: &str) -> RawCommit {
        RawCommit {
            hash: "abc123".to_string(),
            message: message.to_string(),
            author_name: "Ada".to_string(),
            author_date: Utc::now(),
            author_avatar: None,
        }
    }

    #[test]
    fn maps_type_tokens() {
        let classifier = Classifier::new();

        let cases = [
            ("feat: add login", ChangeType::Feat),
            ("fix: crash on save", ChangeType::Fix),
            ("improvement: faster sync", ChangeType::Improvement),
            ("refactor: extract parser", ChangeType::Improvement),
        ];

        for (message, expected) in cases {
            let parsed = classifier.classify(&commit(message)).unwrap();
            assert_eq!(parsed.change_type, expected, "message: {message}");
        }
    }

    #[test]
    fn type_token_is_case_insensitive() {
        let classifier = Classifier::new();
        let parsed = classifier.classify(&commit("Feat: shouting")).unwrap();
        assert_eq!(parsed.change_type, ChangeType::Feat);
        assert_eq!(parsed.title, "shouting");
    }

    #[test]
    fn accepts_scoped_subjects() {
        let classifier = Classifier::new();
        let parsed = classifier.classify(&commit("feat(auth): add login")).unwrap();
        assert_eq!(parsed.change_type, ChangeType::Feat);
        assert_eq!(parsed.title, "add login");
    }

    #[test]
    fn title_is_trimmed_remainder_after_colon() {
        let classifier = Classifier::new();
        let parsed = classifier.classify(&commit("fix:    trailing space   ")).unwrap();
        assert_eq!(parsed.title, "trailing space");
    }

    #[test]
    fn body_becomes_description() {
        let classifier = Classifier::new();
        let parsed = classifier
            .classify(&commit("feat: add login\n\nSupports OAuth.\nAnd magic links."))
            .unwrap();
        assert_eq!(parsed.description.as_deref(), Some("Supports OAuth.\nAnd magic links."));
    }

    #[test]
    fn empty_body_gives_no_description() {
        let classifier = Classifier::new();
        let parsed = classifier.classify(&commit("feat: add login\n\n   ")).unwrap();
        assert_eq!(parsed.description, None);
    }

    #[test]
    fn rejects_non_conventional_subjects() {
        let classifier = Classifier::new();
        for message in ["update readme", "feat add login", "chore: bump deps", "feat:", ""] {
            assert!(classifier.classify(&commit(message)).is_none(), "message: {message}");
        }
    }

    #[test]
    fn only_first_line_is_the_subject() {
        let classifier = Classifier::new();
        // The convention token on a later line does not count.
        assert!(classifier.classify(&commit("wip\nfeat: not really")).is_none());
    }

    #[test]
    fn merge_commits_and_empty_messages_are_excluded() {
        assert!(Classifier::is_excluded(&commit("Merge pull request #42 from origin/dev")));
        assert!(Classifier::is_excluded(&commit("")));
        assert!(!Classifier::is_excluded(&commit("feat: add login")));
    }
}
