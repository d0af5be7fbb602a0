//! Deposit, withdraw and transfer commands

use anyhow::Result;
use colored::Colorize;
use rust_decimal::Decimal;
use wallet_core::{LoggingService, TransactionType};

use super::{authenticate, get_context};
use crate::output;

pub async fn run_single(
    logger: &Option<LoggingService>,
    token: Option<&str>,
    amount: Decimal,
    kind: TransactionType,
    json: bool,
) -> Result<()> {
    let ctx = get_context(logger).await?;
    let principal = authenticate(&ctx, token).await?;

    let change = ctx
        .ledger
        .deposit_or_withdraw(&principal.email, amount, kind)
        .await?;

    if json {
        return output::json(&change);
    }

    let verb = match kind {
        TransactionType::Deposit => "Deposited",
        _ => "Withdrew",
    };
    output::success(&format!("{} {}", verb, amount));
    println!("  Transaction: {}", change.transaction.id.to_string().dimmed());
    println!("  Balance:     {}", change.balance.to_string().bold());
    Ok(())
}

pub async fn run_transfer(
    logger: &Option<LoggingService>,
    token: Option<&str>,
    amount: Decimal,
    recipient: &str,
    json: bool,
) -> Result<()> {
    let ctx = get_context(logger).await?;
    let principal = authenticate(&ctx, token).await?;

    let result = ctx
        .ledger
        .transfer(&principal.email, recipient, amount)
        .await?;

    if json {
        return output::json(&result);
    }

    output::success(&format!("Sent {} to {}", amount, recipient));
    println!("  Transaction: {}", result.transaction.id.to_string().dimmed());
    println!("  Balance:     {}", result.sender_balance.to_string().bold());
    Ok(())
}
