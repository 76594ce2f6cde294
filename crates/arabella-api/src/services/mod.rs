//! Request-path services.

pub mod generation;

pub use generation::{
    GenerateVideoRequest, GenerationResponse, GenerationService, JobPage, JobStatusView,
};
