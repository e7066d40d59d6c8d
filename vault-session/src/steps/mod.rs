//! Authentication step pipeline.
//!
//! [`StepChain`] builds a description of how to obtain a token;
//! [`StepExecutor`] (blocking) and [`StepOperator`] (async) interpret it.
//! Both yield the same token for the same server responses.

pub mod chain;
pub mod executor;
pub mod operator;

pub use chain::{AuthenticationSteps, StepChain};
pub use executor::StepExecutor;
pub use operator::StepOperator;
