//! Outlook MCP server library
//!
//! An MCP stdio server exposing Microsoft Graph calendar and people
//! operations. The interesting part is the authentication core in [`auth`]:
//! three credential modes behind one manager, initialized lazily by the
//! first tool call via [`context::GraphContext`].

pub mod auth;
pub mod constants;
pub mod context;
pub mod graph;
pub mod server;
