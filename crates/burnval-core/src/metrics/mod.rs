pub mod catalogue;
pub mod compose;
pub mod table;

pub use catalogue::Metric;
pub use compose::{compose, compose_all, RAW_COMPONENTS};
pub use table::{MetricColumns, MetricTable};
