//! Purchase staging tool
//!
//! Never buys anything. It hands back a pending action that only the
//! approval step can resolve.

use super::schema::{ArgSpec, ArgType, ToolSchema};
use super::{Tool, ToolError, ToolOutput};
use crate::state_machine::PendingAction;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct StagePurchaseTool;

#[derive(Debug, Deserialize)]
struct StagePurchaseInput {
    symbol: String,
    quantity: u32,
    price: f64,
}

#[async_trait]
impl Tool for StagePurchaseTool {
    fn name(&self) -> &'static str {
        "stage_purchase"
    }

    fn description(&self) -> String {
        "Prepare a buy order for human approval. `price` is the total price of the order \
         (quantity times the share price). Nothing is bought until a human approves."
            .to_string()
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ArgSpec::required("symbol", ArgType::String, "Ticker symbol, e.g. MSFT"),
            ArgSpec::required("quantity", ArgType::Integer, "Number of shares"),
            ArgSpec::required("price", ArgType::Number, "Total price of the order"),
        ])
    }

    async fn run(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let input: StagePurchaseInput = serde_json::from_value(args)
            .map_err(|e| ToolError::invalid_arguments(self.name(), e.to_string()))?;

        let symbol = input.symbol.trim();
        if symbol.is_empty() || symbol.contains(':') {
            return Err(ToolError::invalid_arguments(
                self.name(),
                format!("invalid symbol '{}'", input.symbol),
            ));
        }
        if !input.price.is_finite() || input.price < 0.0 {
            return Err(ToolError::invalid_arguments(
                self.name(),
                format!("invalid price {}", input.price),
            ));
        }

        // The action must survive its trip through the transcript
        let action = PendingAction::purchase(symbol, input.quantity, input.price);
        if PendingAction::parse_token(&action.to_token()).as_ref() != Some(&action) {
            return Err(ToolError::invalid_arguments(
                self.name(),
                format!("cannot stage '{}'", action.to_token()),
            ));
        }

        Ok(ToolOutput::Staged(action))
    }
}
