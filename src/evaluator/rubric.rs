//! Judge instructions per metric and question type.

use serde_json::Value;

use crate::models::{DocumentMetadata, Metric, QaItem, QuestionType};

/// Returns the scoring rubric for `metric` applied to a `question_type` item.
///
/// Relevance is judged with the intent rubric.
pub fn rubric(metric: Metric, question_type: QuestionType) -> &'static str {
    use Metric::*;
    use QuestionType::*;

    match (metric, question_type) {
        (Accuracy, YesNo) => {
            "- Ensure the answer clearly matches the information in the chunk. The answer must be either \"Yes\" or \"No\".
- Penalise answers that add information beyond a clear Yes or No.
- Penalise any answer whose reasoning is inconsistent with the chunk.
- If the chunk is ambiguous or silent, the answer should reflect uncertainty, not make definitive claims."
        }
        (Accuracy, YesNoConditional) => {
            "- The answer must be either \"Yes\" or \"No\" and must follow logically from the chunk, assuming the provided condition holds.
- Also evaluate the condition itself: is it a meaningful conditional clause rather than a statement of fact, does it add context beyond the question, and is it supported by the chunk?
- Penalise empty conditions.
- Penalise answers that contradict the chunk under the condition, or that are anything other than \"Yes\" or \"No\".
- Penalise conditions that are redundant, vague or not truly conditional.
- Penalise when the chunk does not support a conclusion under the stated condition."
        }
        (Accuracy, LegalObligation) => {
            "- Verify that the answer accurately reflects mandatory versus optional obligations.
- Terms like \"must\", \"shall\" and \"is required to\" indicate obligation, while \"may\", \"can\" and \"is encouraged to\" do not.
- Deduct points if the answer exaggerates or softens the level of obligation stated in the chunk."
        }
        (Accuracy, Factual) => {
            "- Check that every stated fact (names, numbers, dates, procedures) matches the chunk exactly.
- No guessing or inferring beyond what is explicitly mentioned.
- Penalise any omitted or hallucinated detail."
        }
        (Accuracy, Descriptive) => {
            "- Confirm the answer captures the full scope and nuance of the description in the chunk.
- It should summarise, paraphrase or explain the original information without adding content or misinterpreting it.
- Penalise vague, incomplete or overly broad answers that dilute the document's intent."
        }

        (Completeness, YesNo) => {
            "- An unconditional question must be answered with a clear \"Yes\" or \"No\" whose reasoning is supported by the document.
- Answers missing relevant justification or stating unsupported claims are incomplete."
        }
        (Completeness, YesNoConditional) => {
            "- The answer must be a clear \"Yes\" or \"No\", and must cover the outcome given the provided condition.
- The chunk must support the answer under the stated condition.
- Penalise when the chunk contains important exceptions or qualifications that the conditions do not account for."
        }
        (Completeness, LegalObligation) => {
            "- The answer must state who is obligated, what is required, and under what conditions.
- It should distinguish mandatory actions from suggestions or permissions.
- Omitting any element of the obligation, or summarising it too vaguely, makes the answer incomplete."
        }
        (Completeness, Factual) => {
            "- Every specific piece of information asked for (values, names, rules, timelines) must be covered.
- If the question implies a list or set of facts, the answer must include all of them.
- Omitting a key fact or listing only part of a set reduces the score."
        }
        (Completeness, Descriptive) => {
            "- The answer must give a comprehensive explanation or summary grounded in the document.
- All relevant aspects must be covered, not just a narrow or superficial part.
- Missing key details, interpretations or oversimplifications indicate incompleteness."
        }

        (Groundedness, YesNo) => {
            "- The answer must be directly supported by statements in the document chunk.
- Do not reward generic or assumed responses; the Yes/No conclusion must be justified by explicit evidence.
- Penalise hallucinated conclusions or reasoning not grounded in the document."
        }
        (Groundedness, YesNoConditional) => {
            "- Both the Yes/No answer and its condition must be clearly supported by the document chunk.
- If either the outcome or the condition is not mentioned or implied in the chunk, penalise the answer.
- Penalise inferred or imagined conditions not grounded in the chunk."
        }
        (Groundedness, LegalObligation) => {
            "- The answer must be explicitly supported by legal obligations stated in the document.
- Penalise legal interpretations, duties or entities not present in the chunk.
- Do not reward answers that generalise or assume requirements beyond what is written."
        }
        (Groundedness, Factual) => {
            "- The answer must be factually accurate and verifiable from the chunk.
- Penalise figures, names or claims not found in the document.
- No extrapolation or assumptions; only stated facts may be used."
        }
        (Groundedness, Descriptive) => {
            "- The answer should describe information present or implied in the document chunk.
- Descriptions must stay faithful to the tone and scope of the original content.
- Penalise exaggerations, invented attributes or unsupported elaborations."
        }

        (Relevance | Intent, YesNo) => {
            "- The question should be clearly answerable with \"Yes\" or \"No\" from the chunk.
- It must directly reflect the document's core assertion without adding ambiguity.
- Avoid vague or overly broad formulations; precision is essential.
- Penalise questions that are grammatically incorrect or poorly phrased."
        }
        (Relevance | Intent, YesNoConditional) => {
            "- The question should not include conditions or statements that are not required to answer it.
- Penalise grammatically awkward or logically inconsistent questions."
        }
        (Relevance | Intent, LegalObligation) => {
            "- The question should explicitly ask about legal obligations, duties or compliance described in the chunk.
- Check that it uses precise legal terminology and reflects the scope of the obligations accurately.
- Avoid vague or generalised legal language not supported by the document.
- Penalise poorly structured questions or ones that conflate obligations with permissions."
        }
        (Relevance | Intent, Factual) => {
            "- The question should request a specific fact, such as a date, value, term or entity clearly stated in the chunk.
- It should be direct, unambiguous and precise.
- Penalise questions that are too broad, unclear or open to several interpretations.
- Penalise questions that combine several facts in a confusing way."
        }
        (Relevance | Intent, Descriptive) => {
            "- The question should be clearly worded, concise and directly related to descriptive information in the chunk.
- Avoid overly complex or verbose constructions.
- Penalise hypotheticals or any formulation that distracts from the core informative intent."
        }
    }
}

/// What a metric measures, shown to the judge above the rubric.
fn definition(metric: Metric) -> &'static str {
    match metric {
        Metric::Accuracy => "Accuracy: does the answer correctly reflect what the chunk states?",
        Metric::Completeness => {
            "Completeness: does the answer cover everything the question asks for?"
        }
        Metric::Groundedness => {
            "Groundedness: is every claim of the answer supported by the chunk?"
        }
        Metric::Relevance => {
            "Relevance: does the question address what this policy document is about?"
        }
        Metric::Intent => {
            "Intent: is the question well formed and does it ask exactly what its type requires?"
        }
    }
}

/// Builds the judge prompt for one metric of one QA item.
pub fn build_prompt(
    metadata: &DocumentMetadata,
    chunk: &str,
    item: &QaItem,
    metric: Metric,
    question_type: QuestionType,
) -> String {
    let conditions = if item.conditions.is_empty() {
        "None".to_string()
    } else {
        item.conditions.join("; ")
    };
    let incentive = match &metadata.incentive_amount_data {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    format!(
        "You are a strict reviewer of question-answer pairs generated from energy policy documents.

Document title: {title}
Program type: {program_type}
Sector: {sector}
Incentive amount data: {incentive}
Document summary: {summary}

Chunk:
\"\"\"
{chunk}
\"\"\"

Question type: {question_type}
Question: {question}
Answer: {answer}
Conditions: {conditions}
Supporting context: {context}

{definition}
Scoring guidelines:
{rubric}

Rate the pair on a scale from 0 (unusable) to 10 (flawless).
Respond with a JSON object only: {{\"score\": <number 0-10>, \"reason\": \"<one or two sentences>\"}}",
        title = metadata.title,
        program_type = metadata.program_type,
        sector = metadata.sector,
        summary = metadata.summary,
        question_type = question_type.label(),
        question = item.question,
        answer = item.answer,
        context = item.context,
        definition = definition(metric),
        rubric = rubric(metric, question_type),
    )
}
