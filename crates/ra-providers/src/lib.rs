//! ra-providers: Chat model provider implementations for research-assistant
//!
//! This crate provides implementations of the Provider trait for hosted chat APIs.

pub mod mistral;

pub use mistral::MistralProvider;
