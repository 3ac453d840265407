//! These models represent the objects passed around by the turn pipeline
//!
//! There are several different related formats we need to interact with:
//! - chat widget messages, sent from a browser or terminal front-end
//! - slack thread replies, fetched from the messaging platform
//! - openai messages/tools, sent from the pipeline to the LLM
//! - anthropic messages/tools, sent from the pipeline to the LLM
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
