pub mod error;
pub mod evaluator;
pub mod grader;
pub mod mock;
pub mod score;
pub mod text;

pub use error::{GradeError, Result};
pub use evaluator::{evaluate, EvalContext, Evaluation};
pub use grader::{Grader, GraderOptions};
pub use mock::mock_grade;
pub use score::compute_score;
