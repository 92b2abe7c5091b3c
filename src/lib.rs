pub mod average;
pub mod batch;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod plaintext;
pub mod pool;
pub mod submit;
pub mod template;
pub mod transfer;

pub use average::{average, AverageOptions};
pub use dataset::{MeasurementResult, MetaValue, ResultKind};
pub use error::{Error, Result};
