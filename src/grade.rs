//! Quiz grading.

use crate::error::StudyGenError;
use crate::output::Quiz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-question outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    /// `None` when the question was left unanswered.
    pub user_answer: Option<usize>,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: String,
}

/// Score sheet for one submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub quiz_id: Uuid,
    pub score: usize,
    pub total_questions: usize,
    /// `score / total_questions * 100`, or 0 for an empty quiz.
    pub percentage: f64,
    pub results: Vec<QuestionResult>,
}

impl Quiz {
    /// Grade `answers`, one entry per question in order.
    pub fn grade(&self, answers: &[Option<usize>]) -> Result<QuizResult, StudyGenError> {
        if answers.len() != self.questions.len() {
            return Err(StudyGenError::AnswerCountMismatch {
                answers: answers.len(),
                questions: self.questions.len(),
            });
        }

        let results: Vec<QuestionResult> = self
            .questions
            .iter()
            .zip(answers)
            .map(|(q, &answer)| QuestionResult {
                question_id: q.id.clone(),
                question: q.question.clone(),
                user_answer: answer,
                correct_answer: q.correct_answer,
                is_correct: answer == Some(q.correct_answer),
                explanation: q.explanation.clone(),
            })
            .collect();

        let score = results.iter().filter(|r| r.is_correct).count();
        let total_questions = results.len();
        let percentage = if total_questions == 0 {
            0.0
        } else {
            score as f64 / total_questions as f64 * 100.0
        };

        Ok(QuizResult {
            quiz_id: self.id,
            score,
            total_questions,
            percentage,
            results,
        })
    }
}
