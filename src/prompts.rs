//! # Prompts Module
//!
//! System prompts (preambles) and task templates for the four agent roles:
//! planner, analyst, account executive and reporter.
//!
//! Templates use `{company_name}`, `{topic}`, `{findings}`, `{feedback}` and
//! `{research}` placeholders, filled in by [`render`].

use research_flow::NO_FEEDBACK;

// =============================================================================
// PLANNER
// =============================================================================
pub const PLANNER_PREAMBLE: &str = r#"
You are a senior research strategist preparing a sales team for their first
meeting with a prospective customer. You break company research into a short
list of focused, non-overlapping topics.
"#;

pub const PLANNING_TEMPLATE: &str = r#"
Create a research plan for {company_name}.

List between 3 and 6 research topics a sales team needs before a first
meeting: business model, products, recent news, leadership, technology stack,
competitors, buying signals.

Answer with ONE topic per line and nothing else. No numbering, no commentary.
"#;

// =============================================================================
// ANALYST (RESEARCHER)
// =============================================================================
pub const ANALYST_PREAMBLE: &str = r#"
You are a meticulous business analyst. You research one topic at a time using
the web_search tool and report concrete, verifiable facts.

IMPORTANT INSTRUCTIONS:
1. Use the web_search tool to find current information on the topic
2. Do at most two searches, then write your findings
3. Cite every source by its full URL on its own line under "Sources:"
4. Never invent facts or URLs
"#;

pub const RESEARCH_TEMPLATE: &str = r#"
Research the following topic about {company_name}:

{topic}

Write a concise findings section with the facts a sales team can use, then a
"Sources:" list with the URLs you used.
"#;

pub const REVISION_TEMPLATE: &str = r#"
Your previous findings on this topic were reviewed. Address this feedback in a
new, complete version of the findings:

{feedback}
"#;

// =============================================================================
// ACCOUNT EXECUTIVE (REVIEWER)
// =============================================================================
pub const ACCOUNT_EXECUTIVE_PREAMBLE: &str = r#"
You are an experienced account executive. You judge whether research is
specific and actionable enough to walk into a customer meeting with.
"#;

pub const REVIEW_TEMPLATE: &str = r#"
Review these research findings:

{findings}

If the findings are good enough for a first sales meeting, answer with exactly:
{no_feedback}

Otherwise answer with short, concrete instructions on what is missing or wrong.
Do not answer with anything else.
"#;

// =============================================================================
// REPORTER
// =============================================================================
pub const REPORTER_PREAMBLE: &str = r#"
You are a sales enablement writer. You turn research notes into a clear,
well-structured markdown briefing for account executives.
"#;

pub const REPORT_TEMPLATE: &str = r#"
Write a sales readiness report for {company_name} in markdown.

Start with a one-paragraph executive summary, then one section per research
topic below, then a "Talking points" section and a "Sources" section listing
every cited URL once.

{research}
"#;

/// Substitute `{key}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.trim().to_string(), |text, (key, value)| {
            text.replace(&format!("{{{}}}", key), value)
        })
}

pub fn planning_prompt(company_name: &str) -> String {
    render(PLANNING_TEMPLATE, &[("company_name", company_name)])
}

pub fn research_prompt(company_name: &str, topic: &str, feedback: Option<&str>) -> String {
    let prompt = render(
        RESEARCH_TEMPLATE,
        &[("company_name", company_name), ("topic", topic)],
    );

    match feedback {
        Some(feedback) => format!(
            "{}\n\n{}",
            prompt,
            render(REVISION_TEMPLATE, &[("feedback", feedback)])
        ),
        None => prompt,
    }
}

pub fn review_prompt(findings: &str) -> String {
    render(
        REVIEW_TEMPLATE,
        &[("findings", findings), ("no_feedback", NO_FEEDBACK)],
    )
}

pub fn report_prompt(company_name: &str, research: &str) -> String {
    render(
        REPORT_TEMPLATE,
        &[("company_name", company_name), ("research", research)],
    )
}
