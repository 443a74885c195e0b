pub mod analytics;
pub mod db;
pub mod error;
pub mod export;
pub mod grade;
pub mod ingest;
pub mod materialize;
pub mod model;
pub mod reduce;
pub mod score;

pub use error::EngineError;
pub use model::{
    AnswerPayload, Attempt, AttemptQuestion, CriteriaBand, QuestionType, RatingField,
    ReducePolicy, ResultQuestion, ResultRecord, ScoreFamily, TextField,
};
