//! The agent loop and everything it assembles per turn: conversation
//! analysis, prompt building, skills, tools, and the streaming think-tag
//! parser.

pub mod agent_loop;
pub mod analyzer;
pub mod prompt;
pub mod skills;
pub mod thinking;
pub mod tools;

pub use agent_loop::{AgentLoop, AgentStopper};
