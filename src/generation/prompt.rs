//! Generator prompt assembly.

use serde_json::json;

use crate::models::{DocumentMetadata, FewShotExample, PolicyType, QuestionType};

/// Extra guidance for one question type on one kind of policy document.
pub fn type_instructions(question_type: QuestionType, policy_type: PolicyType) -> &'static str {
    use PolicyType::*;
    use QuestionType::*;

    match (question_type, policy_type) {
        (YesNo, Incentives) => {
            "- Generate Yes/No questions about an Incentives policy document. Only create questions whose answer is Yes or No without any condition.
- The questions should confirm or deny specific eligibility, benefits, conditions or scenarios of the incentive.
- For example, ask whether a specific benefit is available or whether a certain group qualifies."
        }
        (YesNo, Regulatory) => {
            "- Generate Yes/No questions about a Regulatory policy document. Only create questions whose answer is Yes or No without any condition.
- The questions should verify the presence or absence of rules, requirements, enforcement dates or compliance expectations.
- Each question must be answerable with 'Yes' or 'No' directly from the policy text."
        }
        (YesNoConditional, Incentives) => {
            "- Generate Yes/No questions that depend on conditions, about an Incentives policy document.
- Only create questions that need some assumption from the text to hold, and list those assumptions.
- Do not create questions that need no condition.
- The questions should confirm or deny specific eligibility, benefits, conditions or scenarios of the incentive."
        }
        (YesNoConditional, Regulatory) => {
            "- Generate Yes/No questions that depend on conditions, about a Regulatory policy document.
- Only create questions that need some assumption from the text to hold, and list those assumptions.
- Do not create questions that need no condition.
- The questions should verify the presence or absence of rules, requirements, enforcement dates or compliance expectations."
        }
        (LegalObligation, Incentives) => {
            "- Generate questions that identify legal duties or formal commitments in an Incentives policy document.
- These may involve mandatory documentation, procedural requirements or compliance terms for receiving the incentive."
        }
        (LegalObligation, Regulatory) => {
            "- Generate questions that reveal the legal obligations imposed by a Regulatory policy.
- These include rules that must be followed, penalties for non-compliance, reporting duties or formal restrictions."
        }
        (Factual, Incentives) => {
            "- Generate factual questions that seek concrete details from an Incentives policy document.
- These can include benefit amounts, deadlines, scheme names or eligibility thresholds.
- The answer must be stated explicitly in the document."
        }
        (Factual, Regulatory) => {
            "- Generate factual questions that extract specific details from a Regulatory policy document.
- These may include enforcement dates, penalties, defined terms or mandatory actions.
- The answer must be a fact stated directly in the policy."
        }
        (Descriptive, Incentives) => {
            "- Generate descriptive questions asking for an explanation of the Incentives policy.
- These may cover the purpose of the incentive, how it operates or the broader goals it serves.
- The answer should summarise or paraphrase parts of the policy in detail."
        }
        (Descriptive, Regulatory) => {
            "- Generate descriptive questions prompting an explanation of the Regulatory policy.
- These could cover the reasoning behind the regulation, how it is enforced or the sectors it targets.
- The answer should give a clear, informative overview drawn from the document."
        }
    }
}

/// Renders few-shot examples as a JSON list of question/answer/conditions/context.
fn render_examples(examples: &[&FewShotExample]) -> String {
    let rows: Vec<_> = examples
        .iter()
        .map(|e| {
            json!({
                "question": e.question,
                "answer": e.answer,
                "conditions": e.conditions,
                "context": e.context,
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Everything a generator prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationPrompt<'a> {
    pub metadata: &'a DocumentMetadata,
    pub chunk: &'a str,
    pub question_type: QuestionType,
    pub examples: &'a [&'a FewShotExample],
    pub num_questions: usize,
}

impl GenerationPrompt<'_> {
    pub fn render(&self) -> String {
        let question_type = self.question_type.label();
        let additional = self
            .metadata
            .policy_type()
            .map_or("", |policy| type_instructions(self.question_type, policy));
        let examples = render_examples(self.examples);
        let DocumentMetadata {
            title,
            state,
            program_type,
            sector,
            ..
        } = self.metadata;

        format!(
            "You are a QA dataset generator that creates high-quality question-answer-context records from solar and energy policy documents. Follow the instructions carefully.

## Instructions:
- The text is a US solar policy document in markdown. Rewrite questions and answers so they are readable and user-friendly.
- Extract key findings that are valuable and avoid unnecessary or repetitive details.
- Every answer must be present in the text. Do not infer or answer beyond what is written.
- Generate at most {num_questions} questions, answers and contexts. Answers may be reworded; the context must be the exact words of the text.
- Capture all important information in distinct QA pairs without overlap between pairs.
- The text contains structured data such as tables and lists; create questions from that information too.
- Leave out HTML, markdown code, separators and list markers (a, b, 1., ...) from questions and answers.
- Every question must be of type {question_type}. There are five types: Yes/No (without conditions), Yes/No with conditions, Legal Obligation, Factual and Descriptive. Never produce another type.
- Questions should mention the location ({state}) and the policy title ({title}) and be as specific as possible.
- Where possible add first-person scenarios for the program sector ({sector}) that could change the outcome of the question.
- Do not refer to \"this program\" or to section numbers that would require the document to answer.
- Never build questions from the metadata alone; use it only to make questions richer.
- Remove references to other sections from answers.
- If no question is possible from the text, reply with exactly NA and nothing else.
- The examples below illustrate the task. Do not create questions from the examples.

## Additional instructions for {question_type} questions:
{additional}

## Examples:
{examples}

## Metadata (for reference only):
**title** - {title}
**state** - {state}
**Program Type** - {program_type}
**Program Sector** - {sector}

## Output Format:
### <QA pair number>
**Question** - <question>
**Answer** - <answer>
**Conditions** - [<conditions>]
**Context** - <context>

## Text:
{chunk}
",
            num_questions = self.num_questions,
            chunk = self.chunk,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;
    use serde_json::Value;

    fn metadata(program_type: &str) -> DocumentMetadata {
        DocumentMetadata {
            id: DocumentId::new(9),
            title: "Solar Easements".to_string(),
            state: "Colorado".to_string(),
            program_type: program_type.to_string(),
            sector: "Commercial".to_string(),
            summary: String::new(),
            incentive_amount_data: Value::Null,
        }
    }

    #[test]
    fn prompt_includes_type_guidance_examples_and_text() {
        let example = FewShotExample {
            policy_type: PolicyType::Regulatory,
            question_type: QuestionType::Factual,
            question: "When does the rule take effect?".to_string(),
            answer: "January 1, 2024".to_string(),
            conditions: String::new(),
            context: "effective January 1, 2024".to_string(),
            question_rating: 5.0,
            answer_rating: 5.0,
        };
        let meta = metadata("Regulatory Policy");
        let prompt = GenerationPrompt {
            metadata: &meta,
            chunk: "Easements must be in writing.",
            question_type: QuestionType::Factual,
            examples: &[&example],
            num_questions: 3,
        }
        .render();

        assert!(prompt.contains("at most 3 questions"));
        assert!(prompt.contains("must be of type Factual"));
        assert!(prompt.contains(type_instructions(QuestionType::Factual, PolicyType::Regulatory)));
        assert!(prompt.contains("When does the rule take effect?"));
        assert!(prompt.contains("**state** - Colorado"));
        assert!(prompt.trim_end().ends_with("Easements must be in writing."));
    }

    #[test]
    fn unknown_policy_type_gets_no_extra_guidance() {
        let meta = metadata("Technical Resource");
        let prompt = GenerationPrompt {
            metadata: &meta,
            chunk: "text",
            question_type: QuestionType::YesNo,
            examples: &[],
            num_questions: 1,
        }
        .render();

        assert!(!prompt.contains(type_instructions(QuestionType::YesNo, PolicyType::Regulatory)));
        assert!(!prompt.contains(type_instructions(QuestionType::YesNo, PolicyType::Incentives)));
    }
}
