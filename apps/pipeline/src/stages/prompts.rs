// Prompt wording for every stage. Builders return ready-to-send conversations.

use crate::llm_client::prompts::json_system;
use crate::llm_client::ChatMessage;

const TECH_ANALYZER_ROLE: &str = "You are a technology requirements analyzer. \
    Analyze job postings and identify: \
    1. Required technical skills and tools \
    2. Common technology stacks \
    3. Emerging technology trends \
    4. Education and certification requirements\n\n\
    Format your response as a JSON object with these keys:\n\
    {\n  \"technical_skills\": {\"skill_name\": frequency_count, ...},\n  \
    \"tech_stacks\": {\"stack_name\": frequency_count, ...},\n  \
    \"emerging_trends\": [\"trend1\", \"trend2\", ...],\n  \
    \"education_requirements\": {\"requirement\": frequency_count, ...}\n}";

const ANALYST_ROLE: &str = "You are a job market analyst. Ground every observation \
    in the job postings provided. Be specific and quantitative where the data allows.";

const SUMMARIZER_ROLE: &str = "You condense job market analysis data into concise, \
    factual summaries. Preserve rankings, counts and percentages.";

const WRITER_ROLE: &str = "You are an expert job market analyst writing a report for \
    engineers and hiring managers. Write clear markdown without a top-level heading.";

pub fn tech_analysis(batch_json: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(json_system(TECH_ANALYZER_ROLE)),
        ChatMessage::user(format!(
            "Analyze these job postings and provide insights about technology requirements: {batch_json}"
        )),
    ]
}

pub fn aspect(focus: &str, postings_json: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANALYST_ROLE),
        ChatMessage::user(format!(
            "Based on the job market data, analyze the following aspect:\n{focus}\n\n\
             Provide insights about:\n\
             1. Common patterns and trends\n\
             2. Statistical observations\n\
             3. Notable outliers or unique cases\n\
             4. Market implications\n\n\
             Relevant job postings:\n{postings_json}"
        )),
    ]
}

pub fn chunk_summary(label: &str, chunk_json: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARIZER_ROLE),
        ChatMessage::user(format!(
            "Summarize the key points of this {label} data:\n{chunk_json}"
        )),
    ]
}

pub fn combine_summaries(label: &str, summaries: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARIZER_ROLE),
        ChatMessage::user(format!(
            "Combine these partial summaries of the {label} into one coherent summary \
             without repeating points:\n\n{}",
            summaries.join("\n\n---\n\n")
        )),
    ]
}

pub fn section(title: &str, summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(WRITER_ROLE),
        ChatMessage::user(format!(
            "Write the \"{title}\" section of the report from this summary. \
             Include specific statistics and rankings:\n\n{summary}"
        )),
    ]
}

pub fn recommendations(sections: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(WRITER_ROLE),
        ChatMessage::user(format!(
            "Based on these report sections, write actionable recommendations for job \
             seekers, employers and educators as bullet lists:\n\n{sections}"
        )),
    ]
}

pub fn executive_summary(sections: &str, statistics: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(WRITER_ROLE),
        ChatMessage::user(format!(
            "Write a one-paragraph executive summary of this report.\n\n\
             Key statistics: {statistics}\n\n{sections}"
        )),
    ]
}
