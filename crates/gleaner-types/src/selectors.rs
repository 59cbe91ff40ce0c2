//! Named selector sets: logical UI action -> ordered candidate locators.
//!
//! Each logical action (open the add dialog, pick the upload option, ...)
//! maps to a fallback chain of candidate locators tried strictly in order.
//! Candidates are prioritized by observed stability: semantic attributes
//! (`aria-label`) first, structural classes second, free-text matches last.
//! Free-text candidates use the `text=` prefix and are locale-dependent, so
//! every supported UI language needs its own entry kept in sync.
//!
//! A candidate is either a CSS selector or `text=<substring>` (matched
//! against the visible text of clickable elements by the probe script).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable configuration mapping action names to candidate locators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorBook {
    actions: BTreeMap<String, Vec<String>>,
}

impl SelectorBook {
    /// An empty book (no actions). Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Candidate locators for an action, in priority order.
    pub fn candidates(&self, action: &str) -> Option<&[String]> {
        self.actions.get(action).map(|v| v.as_slice())
    }

    /// Replace or add a candidate list for one action.
    pub fn set(&mut self, action: impl Into<String>, candidates: Vec<String>) {
        self.actions.insert(action.into(), candidates);
    }

    /// Apply per-action overrides (from configuration) on top of this book.
    /// An override replaces the whole candidate list for that action.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        for (action, candidates) in overrides {
            self.actions.insert(action.clone(), candidates.clone());
        }
        self
    }
}

impl Default for SelectorBook {
    /// Built-in selector sets for the injection dialog flow and upload
    /// confirmation, covering the English and Chinese UI variants.
    fn default() -> Self {
        let mut book = Self::empty();
        book.set(
            "open-add-dialog",
            vec![
                r#"button[aria-label="Add source"]"#.into(),
                r#"button[aria-label="添加来源"]"#.into(),
                "button.add-source-button".into(),
                "button.upload-button".into(),
                "text=Add source".into(),
                "text=添加来源".into(),
            ],
        );
        book.set(
            "pick-upload-file",
            vec![
                "text=Upload file".into(),
                "text=上传文件".into(),
                "text=Upload".into(),
            ],
        );
        book.set(
            "pick-website",
            vec!["text=Website".into(), "text=网站".into()],
        );
        book.set(
            "pick-paste-text",
            vec![
                "text=Copied text".into(),
                "text=Paste text".into(),
                "text=复制的文字".into(),
            ],
        );
        book.set(
            "url-field",
            vec![
                r#"textarea[aria-label="Enter URLs"]"#.into(),
                r#"textarea[aria-label="输入网址"]"#.into(),
                r#"textarea[placeholder*="URL"]"#.into(),
                r#"textarea[placeholder*="网址"]"#.into(),
            ],
        );
        book.set(
            "text-field",
            vec![
                r#"textarea[aria-label="Copied text"]"#.into(),
                r#"textarea[aria-label="Paste text"]"#.into(),
                r#"textarea[aria-label="粘贴的文字"]"#.into(),
                r#"textarea[placeholder*="paste"]"#.into(),
                r#"textarea[placeholder*="粘贴"]"#.into(),
            ],
        );
        book.set(
            "confirm-insert",
            vec![
                r#"button[aria-label="Insert"]"#.into(),
                r#"button[aria-label="插入"]"#.into(),
                "text=Insert".into(),
                "text=插入".into(),
            ],
        );
        book.set(
            "close-dialog",
            vec![
                r#"button[aria-label="Close"]"#.into(),
                r#"button[aria-label="关闭"]"#.into(),
                "button.close-button".into(),
            ],
        );
        book.set("file-input", vec![r#"input[type="file"]"#.into()]);
        book.set(
            "source-item",
            vec![
                ".source-item".into(),
                ".source-card".into(),
                r#"[class*="source-item"]"#.into(),
                r#"[class*="source-card"]"#.into(),
            ],
        );
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_book_has_dialog_flow_actions() {
        let book = SelectorBook::default();
        for action in [
            "open-add-dialog",
            "pick-upload-file",
            "pick-website",
            "pick-paste-text",
            "url-field",
            "text-field",
            "confirm-insert",
            "file-input",
            "source-item",
        ] {
            assert!(
                book.candidates(action).is_some(),
                "missing default action: {action}"
            );
        }
    }

    #[test]
    fn test_candidate_order_is_preserved() {
        let book = SelectorBook::default();
        let candidates = book.candidates("open-add-dialog").unwrap();
        // Semantic attribute candidates come before structural classes,
        // which come before free-text matches.
        assert!(candidates[0].starts_with("button[aria-label"));
        assert!(candidates
            .iter()
            .position(|c| c.starts_with("button."))
            .unwrap()
            > 1);
        assert!(candidates.last().unwrap().starts_with("text="));
    }

    #[test]
    fn test_overrides_replace_whole_list() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "open-add-dialog".to_string(),
            vec!["button#custom-add".to_string()],
        );
        let book = SelectorBook::default().with_overrides(&overrides);
        assert_eq!(
            book.candidates("open-add-dialog").unwrap(),
            ["button#custom-add".to_string()]
        );
        // Other actions are untouched.
        assert!(book.candidates("confirm-insert").is_some());
    }

    #[test]
    fn test_unknown_action_is_none() {
        assert!(SelectorBook::default().candidates("no-such-action").is_none());
    }

    #[test]
    fn test_book_roundtrips_through_serde() {
        let book = SelectorBook::default();
        let json = serde_json::to_string(&book).unwrap();
        let back: SelectorBook = serde_json::from_str(&json).unwrap();
        assert_eq!(book, back);
    }
}
