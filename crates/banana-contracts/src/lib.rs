pub mod events;
pub mod jsonrpc;
pub mod mcp;
pub mod models;
