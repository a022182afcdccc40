pub mod builder;
pub mod decay;
pub mod health;
pub mod update;

pub use builder::{LessonBuilder, LessonBuilderConfig, AGGRESSION_MULT_BOUNDS, SIZE_MULT_BOUNDS};
pub use decay::materialize;
pub use health::{HealthReportBuilder, HealthStatus, LessonHealthReport};
pub use update::UpdateRuleConfig;
