//! Bridge core library: Slack webhook handling, completion client, relay, and the HTTP servers
//! used by the CLI.

pub mod agent;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod relay;
