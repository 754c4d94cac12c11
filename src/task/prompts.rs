//! Prompt text for each task and stage.
//!
//! Wording is kept short on purpose; callers that care about tone can build
//! their own [`RequestFactory`](crate::pipeline::RequestFactory).

pub const SUMMARY_PROMPT: &str = "Write a summary of this meeting that tells the story of what happened.

Start with a 2-3 sentence synopsis (who met, why, what was discussed, what came out of it), then:

**Key Takeaways:**
- 3-5 specific bullets with names, numbers and dates

**Next Steps:**
- one line on what happens next

**Action Items:**
- [Name]: [specific action]

Only include what is in the transcript.";

pub const SUMMARY_CHUNK_PROMPT: &str = "For this segment, identify:
- who was in the meeting (names, roles, companies)
- key insights or decisions
- action items with owners and deadlines
- deadlines or next meeting dates
- what happens next

Be specific. Use exact names, numbers and dates. No filler.";

pub const SUMMARY_MERGE_PROMPT: &str = "Merge these partial meeting extracts into one summary that tells the story of what happened.

Use the same format as a single summary: a 2-3 sentence synopsis, then **Key Takeaways:**, **Next Steps:** and **Action Items:**.

Deduplicate across parts and keep exact names, numbers and dates from the extracts.";

pub const CUSTOMER_EMAIL_PROMPT: &str = "Write a brief follow-up email (40-60 words) to the customer based on this meeting.

Start with \"Subject: ...\", greet the customer by first name, state what you will do next, and close with one clear question about their next step. No corporate filler.";

pub const TEAM_UPDATE_EMAIL_PROMPT: &str = "Write an internal team update email recapping this customer call. It is not sent to the customer.

Format:
Subject: [Customer Company] - Call recap

Key points and action items from today's call:
- 3-5 key points
Action items:
- [Name]: [action]

Next meeting: [date/time or TBD]";

pub const EMAIL_CHUNK_PROMPT: &str = "For this segment, extract what a follow-up email would need:
- participants and their companies
- commitments made by either side
- open questions, deadlines and next meeting dates

Be specific and brief.";

pub const EMAIL_MERGE_SUFFIX: &str = "The meeting was too long to include in full. Use these partial extracts of it instead.";

pub const ANSWER_SYSTEM_PROMPT: &str = "You are an analyst helping the user understand a meeting they took part in.

Answer first, in 2-4 sentences unless the user asks for detail. Use exact names, numbers and quotes from the transcript. If something was not discussed, say so in one sentence; never speculate beyond the transcript.";

pub const ANSWER_CHUNK_PROMPT: &str = "Extract everything in this segment that helps answer the question below. Quote exact names, numbers and statements. Reply \"Nothing relevant.\" if the segment does not help.";

pub const NAME_PROMPT: &str = "Generate a short descriptive name (max 30 characters) for this meeting recording based on the transcript. Return ONLY the name, nothing else. No quotes.";

pub const ANALYZE_PROMPT: &str = r#"Analyze this meeting transcript. Return ONLY valid JSON, no other text.

{
  "meeting_type": "sales | internal | learning | one_on_one",
  "email_default": "customer | team",
  "pills": ["question 1?", "question 2?", "question 3?"],
  "alerts": [{"type": "urgent | positive | risk | insight", "text": "brief alert"}]
}

Rules:
- pills: the 3 most relevant follow-up questions, 3-6 words each
- alerts: 1-3 key signals from the call, under 12 words each"#;

pub const SHORTER_EMAIL_PROMPT: &str = "Rewrite this email to be shorter (under 40 words). Keep the subject line, the greeting, the one action you will take and the one question you ask.";

pub const REWRITE_EMAIL_PROMPT: &str = "Write a completely different follow-up email (40-60 words): different subject, different angle, different ask. Use the meeting summary for facts.";

pub const QUICK_EDIT_PROMPT: &str = "Apply this edit to the email below. Return ONLY the edited email, with no commentary. Keep the \"Subject: ...\" line followed by the body.";

/// Placeholder for a summary that was not produced yet.
pub const NO_SUMMARY: &str = "Not generated yet.";

/// Append a labelled block to a prompt.
pub fn section(prompt: &str, label: &str, body: &str) -> String {
    format!("{}\n\n{}:\n{}", prompt, label, body)
}

/// Header for one chunk of a longer transcript.
pub fn chunk_header(index: usize, total: usize) -> String {
    format!(
        "This is part {} of {} of a meeting transcript.",
        index + 1,
        total
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_appends_labelled_block() {
        assert_eq!(section("Do it.", "Transcript", "hi"), "Do it.\n\nTranscript:\nhi");
    }

    #[test]
    fn test_chunk_header_is_one_based() {
        assert_eq!(chunk_header(0, 3), "This is part 1 of 3 of a meeting transcript.");
    }
}
