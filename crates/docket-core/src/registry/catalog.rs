//! Built-in task types.

use crate::config::DEFAULT_TASK_TYPE;
use crate::domain::{CompletionRule, StageDefinition, TaskDefinition};

/// Pointer to the import counter written by question-import jobs.
const IMPORTED_QUESTIONS: &str = "/importSummary/totalQuestionsImported";

/// Every `formModule` the built-in catalogue references.
pub const BUILTIN_FORM_MODULES: &[&str] = &[
    "question_upload",
    "corpus_selection",
    "answer_generation",
    "review_export",
    "questionnaire_import",
    "rfp_analysis",
    "response_draft",
];

fn imported_at_least_one() -> CompletionRule {
    CompletionRule::MinCount {
        pointer: IMPORTED_QUESTIONS.to_string(),
        min: 1,
    }
}

pub fn builtin_definitions() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition::new(DEFAULT_TASK_TYPE, "RFP Question List")
            .with_stage(
                StageDefinition::new("upload_questions", "Upload Questions", "question_upload")
                    .with_data_source("question_import")
                    .with_completion(imported_at_least_one()),
            )
            .with_stage(
                StageDefinition::new(
                    "configure_corpus",
                    "Select Knowledge Sources",
                    "corpus_selection",
                )
                .with_data_source("corpus_selection"),
            )
            .with_stage(
                StageDefinition::new("generate_answers", "Generate Answers", "answer_generation")
                    .with_data_source("answer_generation"),
            )
            .with_stage(StageDefinition::new(
                "review_export",
                "Review & Export",
                "review_export",
            )),
        TaskDefinition::new("rfp_question_list", "RFP Question List (legacy)")
            .with_stage(
                StageDefinition::new("upload_questions", "Upload Questions", "question_upload")
                    .with_data_source("question_import")
                    .with_completion(imported_at_least_one()),
            )
            .with_stage(
                StageDefinition::new("generate_answers", "Generate Answers", "answer_generation")
                    .with_data_source("answer_generation"),
            ),
        TaskDefinition::new("security_questionnaire", "Security Questionnaire")
            .with_stage(
                StageDefinition::new(
                    "import_questionnaire",
                    "Import Questionnaire",
                    "questionnaire_import",
                )
                .with_data_source("questionnaire_import")
                .with_completion(imported_at_least_one()),
            )
            .with_stage(
                StageDefinition::new("generate_answers", "Generate Answers", "answer_generation")
                    .with_data_source("answer_generation"),
            )
            .with_stage(StageDefinition::new("review", "Review", "review_export")),
        TaskDefinition::new("rfp_response", "RFP Response")
            .with_stage(
                StageDefinition::new("analyze_rfp", "Analyze RFP", "rfp_analysis")
                    .with_data_source("rfp_analysis")
                    .with_completion(CompletionRule::NonEmpty {
                        pointer: "/analysis/summary".to_string(),
                    }),
            )
            .with_stage(
                StageDefinition::new("draft_response", "Draft Response", "response_draft")
                    .with_data_source("response_draft"),
            )
            .with_stage(StageDefinition::new("review", "Review", "review_export")),
    ]
}
