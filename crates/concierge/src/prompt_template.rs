use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

#[derive(Debug, Clone, Serialize)]
pub struct ToolHint {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportPrompt {
    pub catalog: &'static str,
    pub duties: Vec<&'static str>,
    pub tools: Vec<ToolHint>,
    pub example_customer_id: &'static str,
}

impl Default for SupportPrompt {
    fn default() -> Self {
        Self {
            catalog: "computer products (monitors, printers, computers, etc.)",
            duties: vec![
                "Help customers find products",
                "Provide product information and details",
                "Help customers view their order history",
                "Answer questions about orders and products",
                "Be friendly, professional, and concise",
            ],
            tools: vec![
                ToolHint {
                    name: "search_products",
                    description: "Search for products by keyword",
                },
                ToolHint {
                    name: "list_products",
                    description: "Browse products by category",
                },
                ToolHint {
                    name: "get_product",
                    description: "Get detailed info for a specific product SKU",
                },
                ToolHint {
                    name: "verify_customer_pin",
                    description: "Verify customer identity with email and 4-digit PIN",
                },
                ToolHint {
                    name: "list_orders",
                    description: "List orders (requires customer_id from verify_customer_pin)",
                },
                ToolHint {
                    name: "get_order",
                    description: "Get order details by order_id",
                },
                ToolHint {
                    name: "get_customer",
                    description: "Get customer info (requires customer_id)",
                },
                ToolHint {
                    name: "create_order",
                    description: "Create a new order (requires customer_id)",
                },
            ],
            example_customer_id: "41c2903a-f1a5-47b7-a81d-86b50ade220f",
        }
    }
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Render the support system prompt, without the template's trailing newline
pub fn system_prompt(prompt: &SupportPrompt) -> Result<String, TeraError> {
    load_prompt(SYSTEM_TEMPLATE, prompt).map(|rendered| rendered.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        let result = load_prompt(template, &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_system_prompt_lists_every_tool() {
        let prompt = system_prompt(&SupportPrompt::default()).unwrap();

        for tool in [
            "search_products",
            "list_products",
            "get_product",
            "verify_customer_pin",
            "list_orders",
            "get_order",
            "get_customer",
            "create_order",
        ] {
            assert!(
                prompt.contains(&format!("- {tool}: ")),
                "missing {tool} in prompt"
            );
        }
    }

    #[test]
    fn test_system_prompt_encodes_pin_protocol() {
        let prompt = system_prompt(&SupportPrompt::default()).unwrap();

        assert!(prompt.starts_with("You are a helpful customer support chatbot"));
        assert!(prompt.contains("- Be friendly, professional, and concise\n"));
        assert!(prompt.contains("1. First ask the customer for their email and 4-digit PIN"));
        assert!(prompt.contains("'41c2903a-f1a5-47b7-a81d-86b50ade220f'"));
    }

    #[test]
    fn test_system_prompt_has_no_trailing_whitespace() {
        let prompt = system_prompt(&SupportPrompt::default()).unwrap();

        assert!(!prompt.ends_with('\n'));
        assert!(prompt.ends_with("format it nicely for the user."));
    }
}
