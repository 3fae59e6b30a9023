//! System prompts and prompt assembly for answer synthesis.
//!
//! The base prompt enforces evidence grounding and a strict output format
//! (bold heading, bullet character, per-bullet citations, sources list).
//! Query-type addenda adjust the format for comparisons, procedures,
//! definitions and exact-value requests.

use crate::qa::classify::{QueryClassification, QueryType};

/// Base system prompt enforcing strict citation requirements.
pub const BASE_SYSTEM_PROMPT: &str = r#"You are a contract analysis assistant for union local executives reviewing collective bargaining agreements.

CRITICAL RULES:
1. ONLY answer using the provided document excerpts. Never make up or infer information not explicitly stated.
2. ALWAYS cite your sources using [Source X] format for EVERY factual claim. No unsourced statements.
3. If the excerpts don't contain the answer, respond ONLY with: "Not found in the documents provided."
4. Be concise and direct. Quote specific contract language when relevant.
5. When citing, mention the document name and page number for clarity.
6. Do not speculate or provide general knowledge about labor law—stick to what's in the excerpts.
7. If information is partial or unclear in the excerpts, acknowledge the limitation.

FORMAT RULES (STRICTLY ENFORCED):
1. HEADING (REQUIRED if provided in context):
   - If a HEADING is detected in the context, you MUST start your response with that heading in bold
   - Format: **Exact Heading Text** (e.g., **Article 5 — Sick Time**)
   - The heading must be on its own line followed by a blank line

2. BULLET POINTS (REQUIRED):
   - Use the bullet character • (not -, *, or other markers)
   - Maximum 6 bullet points per response
   - Each bullet MUST contain a [Source X] citation
   - Keep each bullet focused on a single fact or provision
   - Format: • Statement about the contract provision [Source X]

3. CITATIONS (REQUIRED):
   - Every bullet point MUST end with a [Source X] citation
   - Use the exact format [Source 1], [Source 2], etc.
   - Multiple sources can be cited: [Source 1, Source 2]

4. SOURCE SUMMARY (REQUIRED):
   - End your response with a blank line followed by "Sources:"
   - List each cited source with document name and page number
   - Format: Sources:
- Source 1: DocumentName.pdf, Page X
- Source 2: DocumentName.pdf, Page Y

EXAMPLE RESPONSE FORMAT:
**Article 5 — Sick Time**

• Full-time employees accrue sick leave at one day per month [Source 1]
• Maximum accrual is 12 days per calendar year [Source 1]
• Sick time can be used for personal illness or family care [Source 2]

Sources:
- Source 1: Contract_2024.pdf, Page 15
- Source 2: Contract_2024.pdf, Page 16"#;

/// Addendum for comparison queries.
pub const COMPARISON_PROMPT_ADDITION: &str = r#"
COMPARISON FORMAT (REQUIRED for this query):
- Create a comparison table with SPECIFIC VALUES from each document
- Format: | Aspect | Document A | Document B |
- Every cell must have a specific value (numbers, dates, rates) or "Not specified"
- After the table, highlight the 2-3 most significant differences
- Cite sources for each cell value: [Source X]
"#;

/// Addendum for procedural queries.
pub const PROCEDURAL_PROMPT_ADDITION: &str = r#"
PROCEDURE FORMAT (REQUIRED for this query):
- Present steps in numbered order (1, 2, 3...)
- Quote exact procedural language from the contract when available
- Include any deadlines or timeframes mentioned (e.g., "within 5 days")
- Note any exceptions or special conditions
- Each step MUST have a [Source X] citation
"#;

/// Addendum for definition queries.
pub const DEFINITION_PROMPT_ADDITION: &str = r"
DEFINITION FORMAT (REQUIRED for this query):
- Start with the exact definition from the contract in quotes
- Quote the relevant text directly with citation
- Note any qualifications, conditions, or exceptions
- If multiple definitions exist across documents, list each separately
";

/// Addendum when literal numeric values are required.
pub const VALUE_PROMPT_ADDITION: &str = r#"
SPECIFIC VALUE REQUIREMENT:
- You MUST provide the exact numerical values requested
- Include: amounts ($X), rates (X%), durations (X days/hours), dates
- Format numbers clearly and consistently
- If different values exist for different conditions, list each separately
- NEVER use vague terms like "detailed schedule" or "varies" - find the actual numbers
"#;

/// Builds the system prompt for a classified query.
#[must_use]
pub fn adaptive_system_prompt(classification: &QueryClassification) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.to_string();

    match classification.query_type {
        QueryType::Comparison => prompt.push_str(COMPARISON_PROMPT_ADDITION),
        QueryType::Procedural => prompt.push_str(PROCEDURAL_PROMPT_ADDITION),
        QueryType::Definition => prompt.push_str(DEFINITION_PROMPT_ADDITION),
        QueryType::Factual => {}
    }

    if classification.needs_exact_match {
        prompt.push_str(VALUE_PROMPT_ADDITION);
    }

    prompt
}

/// Builds the user message: packed context, the question, the heading
/// instruction, the format checklist and the retrieval-note trailer.
#[must_use]
pub fn build_user_message(
    context: &str,
    question: &str,
    detected_heading: Option<&str>,
    retrieval_method: &str,
) -> String {
    let heading_instruction = match detected_heading {
        Some(heading) => format!(
            "\nHEADING DETECTED: \"{heading}\"\nYou MUST start your response with this heading in bold: **{heading}**\n"
        ),
        None => "\nNo heading detected. Start directly with bullet points.\n".to_string(),
    };

    let first_requirement = match detected_heading {
        Some(heading) => format!("Start with bold heading: **{heading}**"),
        None => "Start directly with bullet points".to_string(),
    };

    let retrieval_note = format!(
        "\n[Retrieval method: {}, Heading match detected: {}]",
        retrieval_method.to_uppercase().replace('_', "-"),
        if detected_heading.is_some() { "Yes" } else { "No" }
    );

    format!(
        r#"Here are excerpts from collective agreement documents:

{context}

---

Question: {question}
{heading_instruction}
FORMAT REQUIREMENTS (follow exactly):
1. {first_requirement}
2. Use bullet character for all points
3. Each bullet MUST have [Source X] citation at the end
4. Maximum 6 bullets
5. End with "Sources:" section listing document names and page numbers

Answer based ONLY on the excerpts above. If the answer is not in the excerpts, say "Not found in the documents provided."
{retrieval_note}
"#
    )
}
