//! Tools the desk agent can call mid-conversation.
//!
//! - Calculator: arithmetic expression evaluation
//! - Clock: current date and time

pub mod calculator;
pub mod clock;

pub use calculator::CalculatorTool;
pub use clock::CurrentTimeTool;

use crate::tool::ToolRegistry;

/// The fixed tool set handed to the agent at startup.
pub fn default_toolset() -> ToolRegistry {
    ToolRegistry::new()
        .with(CurrentTimeTool::new())
        .with(CalculatorTool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toolset_is_ordered() {
        let tools = default_toolset();
        assert_eq!(tools.names(), vec!["current_time", "calculator"]);
        assert!(tools.describe().iter().all(|t| t.parameters.is_some()));
    }
}
