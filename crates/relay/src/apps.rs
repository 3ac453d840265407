//! The three assistants built on the turn pipeline.

pub mod flight;
pub mod wiki;
