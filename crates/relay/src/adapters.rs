//! Translation between platform message shapes and [`Conversation`](crate::models::message::Conversation).

pub mod slack;
pub mod widget;
