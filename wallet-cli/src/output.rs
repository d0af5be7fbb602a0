//! Output formatting utilities

use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use wallet_core::OperationResult;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print data wrapped in a successful OperationResult
pub fn json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
    Ok(())
}

/// Amount with an explicit sign: "+12.5" or "-3"
pub fn signed_amount(amount: Decimal) -> String {
    if amount.is_sign_negative() {
        format!("{}", amount).red().to_string()
    } else {
        format!("+{}", amount).green().to_string()
    }
}

/// Token shown with all but the last four characters hidden
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token_keeps_tail() {
        assert_eq!(mask_token("secret-token-1234"), "****1234");
    }

    #[test]
    fn test_mask_token_hides_short_tokens() {
        assert_eq!(mask_token("abc"), "****");
        assert_eq!(mask_token("abcd"), "****");
    }
}
