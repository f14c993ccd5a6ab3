//! Rule Evaluation and Alert Templates
//!
//! Both evaluators expose the same bindings for a data point: `point`, `pointTS`
//! and, when the point carries a scalar value, `pointVal`. Templates also see
//! `rule` and `device`.

mod error;
mod evaluator;
mod template;

pub use error::RuleError;
pub use evaluator::{test_rule, RuleEvaluator};
pub use template::TemplateRenderer;
