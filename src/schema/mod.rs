//! Plain data types: chat messages, story metadata, and the story tree.

pub mod message;
pub mod metadata;
pub mod story;
