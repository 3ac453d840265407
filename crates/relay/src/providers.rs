pub mod anthropic;
pub mod base;
pub mod configs;
pub mod factory;
pub mod images;
pub mod openai;
pub mod speech;
pub mod utils;

#[cfg(test)]
pub mod mock;
