//! Prompt template for the model-tier classifier.

/// System prompt instructing the cheap classifier model to emit JSON only.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are an intent classifier for an LLM orchestration system.

Classify the query complexity and determine which tools might be needed.

**Complexity Levels:**
- simple: Quick factual questions, greetings, basic math (use 1 model)
- moderate: Questions requiring some analysis or current info (use 2-3 models)
- complex: Multi-faceted questions, comparisons, detailed analysis (use 3-4 models)
- expert: High-stakes content, deep analysis, multiple domains (use 4+ models)

**Available Tools:**
- calculator: Math and numerical computations
- web_search: Current events, recent information, facts
- code_execution: Running code, algorithms
- sports_data: Sports scores, odds, statistics
- rag_search: Search workspace documents

Respond with JSON only:
{
    "complexity": "simple|moderate|complex|expert",
    "reasoning": "brief explanation in 10 words or less",
    "tools_needed": ["tool1", "tool2"],
    "confidence": 0.0-1.0
}"#;

/// User-turn wrapper around the query under classification.
pub fn classification_request(query: &str) -> String {
    format!("Classify this query:\n\n{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_embeds_query() {
        let prompt = classification_request("what is rust?");
        assert!(prompt.starts_with("Classify this query:"));
        assert!(prompt.contains("what is rust?"));
    }

    #[test]
    fn system_prompt_demands_json() {
        assert!(CLASSIFIER_SYSTEM_PROMPT.contains("Respond with JSON only"));
        assert!(CLASSIFIER_SYSTEM_PROMPT.contains("tools_needed"));
    }
}
