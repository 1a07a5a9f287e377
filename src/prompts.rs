//! Prompt templates for the single-call text generators.

use crate::errors::truncate_chars;

/// Body characters sent for a summary.
pub const SUMMARY_BODY_CHARS: usize = 2000;
/// Body characters sent when drafting a reply.
pub const REPLY_BODY_CHARS: usize = 3000;

pub const DEFAULT_REPORT_SECTIONS: [&str; 5] = [
    "Introduction",
    "Methodology",
    "Findings",
    "Recommendations",
    "Conclusion",
];

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn email_summary(sender: &str, subject: &str, body: &str) -> String {
    format!(
        "Please summarize this email concisely in 2-3 sentences:\n\n\
         From: {sender}\n\
         Subject: {subject}\n\n\
         {body}",
        body = clip(body, SUMMARY_BODY_CHARS)
    )
}

pub fn email_reply(tone: &str, sender: &str, subject: &str, body: &str) -> String {
    format!(
        "Please draft a reply to this email in a {tone} tone.\n\
         The reply should be contextually relevant and address the main points or questions in the email.\n\n\
         Original Email:\n\
         From: {sender}\n\
         Subject: {subject}\n\n\
         {body}\n\n\
         Draft a complete reply, including a suitable greeting and sign-off.",
        body = clip(body, REPLY_BODY_CHARS)
    )
}

pub fn project_plan(title: &str, description: &str, timeline_weeks: u32, team_size: u32) -> String {
    format!(
        "Create a comprehensive project plan for the following project:\n\n\
         Title: {title}\n\
         Description: {description}\n\
         Timeline: {timeline_weeks} weeks\n\
         Team Size: {team_size} people\n\n\
         Your plan should include:\n\
         1. Executive Summary\n\
         2. Project Scope and Objectives\n\
         3. Key Deliverables\n\
         4. Timeline with milestones (broken down by week)\n\
         5. Resource Allocation\n\
         6. Risk Management\n\
         7. Success Metrics\n\n\
         Format the plan as a structured document with clear headings and bullet points where appropriate."
    )
}

pub fn report_template(report_type: &str, topic: &str, sections: &[String]) -> String {
    let section_list = sections
        .iter()
        .map(|s| format!("- {}", s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Create a template for a {report_type} report on the topic of {topic}.\n\n\
         The report should include these sections:\n\
         {section_list}\n\n\
         For each section, provide:\n\
         1. A brief description of what should be included\n\
         2. 2-3 bullet points of example content or key points to address\n\
         3. Any relevant formatting suggestions\n\n\
         Format the template as a structured document with clear headings and placeholder text."
    )
}

pub fn presentation_outline(title: &str, audience: &str, duration_minutes: u32) -> String {
    format!(
        "Create an outline for a {duration_minutes}-minute presentation titled \"{title}\" for an audience of {audience}.\n\n\
         Your outline should include:\n\
         1. A recommended slide structure (number of slides and their titles)\n\
         2. Brief bullet points for the content of each slide\n\
         3. Suggestions for visuals or data to include\n\
         4. Estimated time allocation for each section\n\n\
         Format the outline as a structured document with clear slide numbers, titles, and content suggestions."
    )
}

pub fn code_review(code: &str, language: &str, focus: &str) -> String {
    format!(
        "Review the following {language} code with a focus on {focus} aspects.\n\n\
         Code to review:\n\
         ```{language}\n{code}\n```\n\n\
         Please provide:\n\
         1. A summary of the code's purpose and functionality\n\
         2. Key strengths of the implementation\n\
         3. Specific issues or areas for improvement (with line references when possible)\n\
         4. Suggested code changes or alternatives for identified issues\n\
         5. Overall assessment and recommendations\n\n\
         Format your review in a structured way with clear sections."
    )
}

pub fn refactoring(code: &str, language: &str, goal: &str) -> String {
    format!(
        "Analyze the following {language} code and suggest refactoring to achieve the goal: {goal}\n\n\
         Original code:\n\
         ```{language}\n{code}\n```\n\n\
         Please provide:\n\
         1. An analysis of the current code structure and potential issues\n\
         2. A detailed refactoring plan with specific changes\n\
         3. The refactored code with comments explaining key changes\n\
         4. Benefits of the suggested refactoring\n\n\
         Format your response in a structured way with clear sections."
    )
}

pub fn code_explanation(code: &str, language: &str, detail_level: &str) -> String {
    format!(
        "Explain the following {language} code at a {detail_level} level of detail.\n\n\
         Code to explain:\n\
         ```{language}\n{code}\n```\n\n\
         Please provide:\n\
         1. A high-level summary of what the code does\n\
         2. An explanation of the key components and their interactions\n\
         3. A walkthrough of the logic and control flow\n\
         4. Explanations of any complex or non-obvious parts\n\n\
         Format your explanation in a clear, educational style that would help someone understand this code."
    )
}

/// Reply subject: prefixes "Re: " unless the subject already has it.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let prefixed = trimmed
        .get(..3)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("re:"));
    if prefixed {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// `References` for a reply: the original chain plus the original Message-ID.
pub fn reply_references(references: Option<&str>, message_id: Option<&str>) -> Option<String> {
    let chain: Vec<&str> = references
        .into_iter()
        .chain(message_id)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if chain.is_empty() {
        None
    } else {
        Some(chain.join(" "))
    }
}

/// Shortened text for log lines.
pub fn preview(text: &str) -> String {
    truncate_chars(text, 100)
}
