//! Quality selection and stream-selection expressions

pub mod quality;
pub mod resolver;

pub use quality::{Container, QualitySelection};
pub use resolver::{FormatResolver, ResolverPreferences};
