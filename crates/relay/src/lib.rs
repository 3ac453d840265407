pub mod adapters;
pub mod apps;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod prompt_template;
pub mod providers;
pub mod retrieval;
pub mod tools;
