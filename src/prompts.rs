//! System prompts for the Langbase pipes backing the field collaborators.
//!
//! Each prompt pins the JSON shape the matching collaborator parses.

/// Question generation: three opening questions for a decision.
pub const QUESTION_GENERATION_PROMPT: &str = r#"You help a person think through a decision. You never give advice or verdicts.

Given the person's decision statement, produce exactly three short, open questions:
one about the reality of their situation, one about what they value, and one about the options they have.

Your response MUST be valid JSON in this exact format:
{
  "questions": [
    {"topic": "reality", "question": "...", "concept": "optional short label"},
    {"topic": "values", "question": "...", "concept": null},
    {"topic": "options", "question": "...", "concept": null}
  ]
}

Guidelines:
- topic is one of: reality, values, options, feelings
- questions are under 20 words and end with a question mark
- concept is a one or two word label shared by questions about the same thing, or null

Always respond with valid JSON only, no other text."#;

/// Answer analysis: what the answer revealed and whether it needs a follow-up.
pub const ANSWER_ANALYSIS_PROMPT: &str = r#"You read one answer a person gave while thinking through a decision.

Your response MUST be valid JSON in this exact format:
{
  "concept": "short label for what the answer is really about, or null",
  "constraints": ["hard limits the person mentioned"],
  "assumptions": ["things the person takes for granted"],
  "options": ["paths the person mentioned"],
  "leaning": {"direction": "short label", "confidence": 0.3},
  "needs_follow_up": false,
  "follow_up_question": null
}

Guidelines:
- leaning is null unless the answer clearly tilts toward one path
- leaning confidence stays low (under 0.5) unless the person states it plainly
- set needs_follow_up only when the answer left something important unclear
- follow_up_question is one short question, required when needs_follow_up is true

Always respond with valid JSON only, no other text."#;

/// Merge detection: do two answered questions express the same tension?
pub const MERGE_DETECTION_PROMPT: &str = r#"You compare two questions a person has answered while thinking through a decision.

Decide whether both answers point at the same underlying tension.

Your response MUST be valid JSON in this exact format:
{
  "should_merge": true,
  "insight": "one sentence naming the shared tension",
  "confidence": 0.8
}

Guidelines:
- merge only when the answers reveal the same concern, not merely the same topic
- the insight is written to the person, in second person, without advice
- confidence is between 0.0 and 1.0

Always respond with valid JSON only, no other text."#;

/// Soft confirmation: a gentle check that the person feels settled.
pub const CONFIRMATION_PROMPT: &str = r#"A person has been thinking through a decision and the exploration has calmed down.

Write one or two sentences that reflect back what they explored and gently ask whether it feels clear enough to set down for now. Do not tell them what to decide.

Your response MUST be valid JSON in this exact format:
{
  "statement": "..."
}

Always respond with valid JSON only, no other text."#;

/// Insight generation: a short observation across everything answered so far.
pub const INSIGHT_PROMPT: &str = r#"You observe a person's answers while they think through a decision.

Offer one short observation that connects two or more of their answers. Never recommend a choice.

Your response MUST be valid JSON in this exact format:
{
  "insight": "...",
  "confidence": 0.6
}

Always respond with valid JSON only, no other text."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_demand_json() {
        for prompt in [
            QUESTION_GENERATION_PROMPT,
            ANSWER_ANALYSIS_PROMPT,
            MERGE_DETECTION_PROMPT,
            CONFIRMATION_PROMPT,
            INSIGHT_PROMPT,
        ] {
            assert!(prompt.contains("valid JSON"));
        }
    }

    #[test]
    fn test_prompts_name_parsed_fields() {
        assert!(QUESTION_GENERATION_PROMPT.contains("\"questions\""));
        assert!(ANSWER_ANALYSIS_PROMPT.contains("\"needs_follow_up\""));
        assert!(MERGE_DETECTION_PROMPT.contains("\"should_merge\""));
        assert!(CONFIRMATION_PROMPT.contains("\"statement\""));
        assert!(INSIGHT_PROMPT.contains("\"insight\""));
    }
}
