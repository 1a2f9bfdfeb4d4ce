//! Answer modes and how an answer is composed from the user's selection.

use crate::protocol::AnswerType;
use serde::Serialize;

/// Multiple-choice option that stands for the free-form comment box.
pub const COMMENT_OPTION: &str = "comment";

/// The shape of the next user response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnswerMode {
    #[default]
    FreeText,
    SingleChoice {
        options: Vec<String>,
        selected: Option<String>,
    },
    MultipleChoice {
        options: Vec<String>,
        /// Selected options in click order, without duplicates.
        selected: Vec<String>,
        comment_text: String,
    },
}

impl AnswerMode {
    /// Builds the mode announced by an agent turn.
    ///
    /// Choice types without options, or with choice rendering disabled,
    /// fall back to free text.
    pub fn from_agent(answer_type: Option<AnswerType>, options: &[String], choices_enabled: bool) -> Self {
        if !choices_enabled || options.is_empty() {
            return Self::FreeText;
        }
        match answer_type {
            Some(AnswerType::SingleChoice) => Self::SingleChoice {
                options: options.to_vec(),
                selected: None,
            },
            Some(AnswerType::MultipleChoice) => Self::MultipleChoice {
                options: options.to_vec(),
                selected: Vec::new(),
                comment_text: String::new(),
            },
            Some(AnswerType::FreeText) | None => Self::FreeText,
        }
    }

    pub fn is_choice(&self) -> bool {
        !matches!(self, Self::FreeText)
    }

    pub fn options(&self) -> &[String] {
        match self {
            Self::FreeText => &[],
            Self::SingleChoice { options, .. } | Self::MultipleChoice { options, .. } => options,
        }
    }

    /// Selects `option` in single-choice mode. Returns false if it is not offered.
    pub fn select(&mut self, option: &str) -> bool {
        match self {
            Self::SingleChoice { options, selected } if options.iter().any(|o| o == option) => {
                *selected = Some(option.to_string());
                true
            }
            _ => false,
        }
    }

    /// Toggles `option` in multiple-choice mode. The comment sentinel is always accepted.
    pub fn toggle(&mut self, option: &str) -> bool {
        match self {
            Self::MultipleChoice {
                options, selected, ..
            } if option == COMMENT_OPTION || options.iter().any(|o| o == option) => {
                if let Some(pos) = selected.iter().position(|s| s == option) {
                    selected.remove(pos);
                } else {
                    selected.push(option.to_string());
                }
                true
            }
            _ => false,
        }
    }

    pub fn set_comment(&mut self, text: &str) -> bool {
        match self {
            Self::MultipleChoice { comment_text, .. } => {
                *comment_text = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Produces the outbound content for this mode, or `None` if there is nothing to send.
    pub fn compose(&self, input: &str) -> Option<String> {
        match self {
            Self::FreeText => {
                let text = input.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Self::SingleChoice { selected, .. } => selected.clone(),
            Self::MultipleChoice {
                selected,
                comment_text,
                ..
            } => {
                let comment = comment_text.trim();
                let tokens: Vec<&str> = selected
                    .iter()
                    .filter_map(|s| {
                        if s == COMMENT_OPTION {
                            (!comment.is_empty()).then_some(comment)
                        } else {
                            Some(s.as_str())
                        }
                    })
                    .collect();
                (!tokens.is_empty()).then(|| tokens.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn multiple(values: &[&str]) -> AnswerMode {
        AnswerMode::from_agent(Some(AnswerType::MultipleChoice), &options(values), true)
    }

    #[test]
    fn test_from_agent_degrades_to_free_text() {
        let yes_no = options(&["Yes", "No"]);
        assert_eq!(AnswerMode::from_agent(None, &yes_no, true), AnswerMode::FreeText);
        assert_eq!(
            AnswerMode::from_agent(Some(AnswerType::SingleChoice), &[], true),
            AnswerMode::FreeText
        );
        assert_eq!(
            AnswerMode::from_agent(Some(AnswerType::SingleChoice), &yes_no, false),
            AnswerMode::FreeText
        );
        assert!(AnswerMode::from_agent(Some(AnswerType::SingleChoice), &yes_no, true).is_choice());
    }

    #[test]
    fn test_free_text_is_trimmed() {
        assert_eq!(AnswerMode::FreeText.compose("  hi  "), Some("hi".into()));
        assert_eq!(AnswerMode::FreeText.compose("   "), None);
    }

    #[test]
    fn test_single_choice_requires_offered_selection() {
        let mut mode = AnswerMode::from_agent(Some(AnswerType::SingleChoice), &options(&["Yes", "No"]), true);
        assert_eq!(mode.compose("ignored"), None);
        assert!(!mode.select("Maybe"));
        assert!(mode.select("No"));
        assert_eq!(mode.compose(""), Some("No".into()));
    }

    #[test]
    fn test_multiple_choice_keeps_click_order() {
        let mut mode = multiple(&["A", "B", "C"]);
        mode.toggle("C");
        mode.toggle("A");
        mode.toggle("B");
        mode.toggle("B");
        assert_eq!(mode.compose(""), Some("C, A".into()));
    }

    #[test]
    fn test_comment_substitution() {
        let mut mode = multiple(&["A", "B"]);
        mode.toggle("A");
        mode.toggle(COMMENT_OPTION);

        mode.set_comment("hello");
        assert_eq!(mode.compose(""), Some("A, hello".into()));

        mode.set_comment("");
        assert_eq!(mode.compose(""), Some("A".into()));
    }

    #[test]
    fn test_only_empty_comment_is_rejected() {
        let mut mode = multiple(&["A"]);
        mode.toggle(COMMENT_OPTION);
        mode.set_comment("   ");
        assert_eq!(mode.compose(""), None);
    }

    #[test]
    fn test_selection_ops_ignore_wrong_mode() {
        let mut mode = AnswerMode::FreeText;
        assert!(!mode.select("A"));
        assert!(!mode.toggle("A"));
        assert!(!mode.set_comment("x"));
    }
}
