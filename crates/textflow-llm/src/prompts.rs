use textflow_core::types::StepKind;

/// Categories offered to the model by the tagging step.
pub const CATEGORIES: &[&str] = &[
    "Business",
    "Technology",
    "Health",
    "Education",
    "Entertainment",
    "Science",
    "Politics",
    "Sports",
    "Finance",
    "Lifestyle",
];

/// Build the model prompt for a step.
pub fn prompt_for(kind: StepKind, text: &str) -> String {
    match kind {
        StepKind::CleanText => format!(
            "You are a text cleaning assistant. Remove unnecessary whitespace, fix formatting \
             issues, correct obvious typos, and normalize the text. Return only the cleaned text \
             without any explanation.\n\nText to clean:\n{}",
            text
        ),
        StepKind::Summarize => format!(
            "You are a summarization assistant. Create a concise summary of the input text, \
             capturing the main points. Keep it brief (2-3 sentences). Return only the summary \
             without any preamble.\n\nText to summarize:\n{}",
            text
        ),
        StepKind::ExtractKeyPoints => format!(
            "You are an analysis assistant. Extract the key points from the input text as a \
             bulleted list. Focus on the most important information. Return only the key points \
             in bullet format.\n\nText to analyze:\n{}",
            text
        ),
        StepKind::TagCategory => format!(
            "You are a categorization assistant. Analyze the input text and assign relevant \
             categories/tags. Common categories include: {}. Return 2-4 most relevant categories \
             as a comma-separated list.\n\nText to categorize:\n{}",
            CATEGORIES.join(", "),
            text
        ),
    }
}

/// Prefix for errors raised while running a step against the model.
pub fn error_prefix(kind: StepKind) -> &'static str {
    match kind {
        StepKind::CleanText => "Error cleaning text",
        StepKind::Summarize => "Error summarizing text",
        StepKind::ExtractKeyPoints => "Error extracting key points",
        StepKind::TagCategory => "Error tagging category",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prompt_embeds_text_last() {
        for kind in StepKind::ALL {
            let prompt = prompt_for(kind, "the input body");
            assert!(prompt.ends_with("\nthe input body"), "{}", kind);
        }
    }

    #[test]
    fn test_tag_prompt_lists_categories() {
        let prompt = prompt_for(StepKind::TagCategory, "x");
        assert!(prompt.contains("Business, Technology, Health"));
        assert!(prompt.contains("comma-separated"));
    }

    #[test]
    fn test_error_prefixes_are_distinct() {
        let prefixes: HashSet<_> = StepKind::ALL.iter().map(|k| error_prefix(*k)).collect();
        assert_eq!(prefixes.len(), StepKind::ALL.len());
    }
}
