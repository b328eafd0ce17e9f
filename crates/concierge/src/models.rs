//! These models represent the objects passed around by the support agent
//!
//! There are a few related formats we need to interact with:
//! - chat widget history, sent from the interface as role/content records or turn pairs
//! - openai messages/tools, sent from the agent to the LLM
//! - mcp tool descriptors and results, exchanged with the remote tool server
//!
//! We always convert those formats into the internal structs at the boundary, so the
//! agent loop only ever sees the types defined here.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
