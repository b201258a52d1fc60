use ada_core::error::ToolError;
use ada_core::tool::Tool;
use async_trait::async_trait;
use chrono::Utc;
use chrono::format::{Item, StrftimeItems};

const DEFAULT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Reports the current UTC time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime format string, e.g. '%A %d %B %Y'. Defaults to RFC 3339."
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let format = arguments["format"].as_str().unwrap_or(DEFAULT_FORMAT);

        // chrono panics on Display for invalid specifiers; check first.
        let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(ToolError::InvalidArguments(format!("Invalid time format '{format}'")));
        }

        Ok(Utc::now().format_with_items(items.into_iter()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_format_is_rfc3339() {
        let output = CurrentTimeTool.execute(serde_json::json!({})).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&output).is_ok());
    }

    #[tokio::test]
    async fn custom_format() {
        let output = CurrentTimeTool
            .execute(serde_json::json!({ "format": "%Y" }))
            .await
            .unwrap();
        assert_eq!(output.len(), 4);
        assert!(output.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn bad_format_is_rejected() {
        let err = CurrentTimeTool
            .execute(serde_json::json!({ "format": "%Q" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
