//! Tools Module - capability lookup by name
//!
//! - `registry`: `ToolInvoker` (what the engine calls), `Tool` + `ToolRegistry`
//!   (name → implementation), mutation classes and compensation metadata
//! - `scripted`: deterministic tools replayed from a script or fixture file

mod registry;
mod scripted;

pub use registry::{
    Compensation, CompensationContext, Mutation, Tool, ToolInvoker, ToolOutcome, ToolRegistry,
};
pub use scripted::{ScriptedTool, ToolFixture, ToolFixtures};
