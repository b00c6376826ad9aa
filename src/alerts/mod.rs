pub mod evaluator;
pub mod format;
pub mod history;
pub mod rules;

pub use evaluator::AlertEvaluator;
pub use history::AlertHistoryTracker;
pub use rules::AlertRuleStore;
