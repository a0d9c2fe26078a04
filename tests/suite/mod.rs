//! Integration test modules

mod analysis_flow;
mod config;
mod gemini_stream;
mod one_shot;
