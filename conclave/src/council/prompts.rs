//! Prompt builders for the council stages.
//!
//! The ranking prompt carries an explicit output contract (`FINAL RANKING:`
//! plus a numbered list); the parser in [`super::ranking`] is matched to it.

/// Stage-2 prompt: anonymized responses plus the ranking contract.
/// `responses_text` is the pre-joined `Response X:\n<text>` blocks.
pub fn ranking_prompt(user_query: &str, responses_text: &str) -> String {
    format!(
        r#"You are evaluating different responses to the following question:

Question: {user_query}

Here are the responses from different models (anonymized):

{responses_text}

Your task:
1. First, evaluate each response individually. For each response, explain what it does well and what it does poorly.
2. Then, at the very end of your response, provide a final ranking.

IMPORTANT: Your final ranking MUST be formatted EXACTLY as follows:
- Start with the line "FINAL RANKING:" (all caps, with colon)
- Then list the responses from best to worst as a numbered list
- Each line should be: number, period, space, then ONLY the response label (e.g., "1. Response A")
- Do not add any other text or explanations in the ranking section

Example of the correct format for your ENTIRE response:

Response A provides good detail on X but misses Y...
Response B is accurate but lacks depth on Z...
Response C offers the most comprehensive answer...

FINAL RANKING:
1. Response C
2. Response A
3. Response B

Now provide your evaluation and ranking:"#
    )
}

/// Stage-3 prompt handed to the chairman model. `stage1_text` and
/// `stage2_text` are the pre-rendered (and budget-trimmed) blocks.
pub fn chairman_prompt(user_query: &str, stage1_text: &str, stage2_text: &str) -> String {
    format!(
        r#"You are the Chairman of an LLM Council. Multiple AI models have provided responses to a user's question, and then ranked each other's responses.

Original Question: {user_query}

STAGE 1 - Individual Responses:
{stage1_text}

STAGE 2 - Peer Rankings:
{stage2_text}

Your task as Chairman is to synthesize all of this information into a single, comprehensive, accurate answer to the user's original question. Consider:
- The individual responses and their insights
- The peer rankings and what they reveal about response quality
- Any patterns of agreement or disagreement

Provide a clear, well-reasoned final answer that represents the council's collective wisdom:"#
    )
}

/// One-shot title request for a new conversation.
pub fn title_prompt(user_query: &str) -> String {
    format!(
        r#"Generate a very short title (3-5 words maximum) that summarizes the following question.
The title should be concise and descriptive. Do not use quotes or punctuation in the title.

Question: {user_query}

Title:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_prompt_states_the_contract() {
        let prompt = ranking_prompt("What is 2+2?", "Response A:\nFour.");
        assert!(prompt.contains("Question: What is 2+2?"));
        assert!(prompt.contains("Response A:\nFour."));
        assert!(prompt.contains("FINAL RANKING:"));
        assert!(prompt.contains("1. Response A"));
    }

    #[test]
    fn chairman_prompt_carries_both_stages() {
        let prompt = chairman_prompt("q", "Model: m\nResponse: r", "(Rankings omitted for efficiency)");
        assert!(prompt.contains("STAGE 1 - Individual Responses:\nModel: m"));
        assert!(prompt.contains("STAGE 2 - Peer Rankings:\n(Rankings omitted for efficiency)"));
        assert!(prompt.contains("Original Question: q"));
    }

    #[test]
    fn title_prompt_requests_three_to_five_words() {
        let prompt = title_prompt("how do tides work");
        assert!(prompt.contains("3-5 words maximum"));
        assert!(prompt.ends_with("Title:"));
    }
}
