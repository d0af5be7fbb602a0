//! Profile command - show the caller's account

use anyhow::Result;
use colored::Colorize;
use wallet_core::LoggingService;

use super::{authenticate, get_context};
use crate::output;

pub async fn run(logger: &Option<LoggingService>, token: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context(logger).await?;
    let principal = authenticate(&ctx, token).await?;
    let account = ctx.profile.get_profile(&principal.email).await?;

    if json {
        return output::json(&account);
    }

    let name = account.display_name();
    let title = if name.is_empty() { account.email.clone() } else { name };
    println!("{}", title.bold());
    let mut table = output::create_table();
    table.add_row(vec!["Email".to_string(), account.email.clone()]);
    table.add_row(vec!["Account".to_string(), account.id.to_string()]);
    table.add_row(vec!["Balance".to_string(), account.balance.to_string()]);
    table.add_row(vec![
        "Since".to_string(),
        account.created_at.format("%Y-%m-%d").to_string(),
    ]);
    println!("{}", table);
    Ok(())
}
