// Library interface for agentmesh-cli, so the output helpers can be tested.

pub mod commands;

pub use commands::{build_request, render_agents, render_response, render_result};
