// src/analyze/mod.rs
//! AI analysis entry: provider abstraction, response parsing, caching.

pub mod ai_adapter;

pub use ai_adapter::{
    build_analyst, build_analyst_from_config, load_analyst_config, AnalysisError, AnalysisResult,
    Analyst, AnalystConfig, DynAnalyst, MockAnalyst,
};
