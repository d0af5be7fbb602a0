//! History command - transactions touching the caller's account

use anyhow::Result;
use wallet_core::{LoggingService, TransactionType, TransactionView};

use super::{authenticate, get_context};
use crate::output;

/// The other party of a transfer as seen from this account
fn counterparty(view: &TransactionView) -> String {
    if view.transaction_type != TransactionType::Transfer {
        return String::new();
    }
    let (label, email) = if view.is_positive {
        ("from", view.sender_email.as_deref())
    } else {
        ("to", view.recipient_email.as_deref())
    };
    format!("{} {}", label, email.unwrap_or("unknown"))
}

pub async fn run(
    logger: &Option<LoggingService>,
    token: Option<&str>,
    kind: Option<TransactionType>,
    json: bool,
) -> Result<()> {
    let ctx = get_context(logger).await?;
    let principal = authenticate(&ctx, token).await?;
    let views = ctx
        .history
        .get_transaction_history(&principal.email, kind)
        .await?;

    if json {
        return output::json(&views);
    }

    if views.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Type", "Amount", "Counterparty", "ID"]);
    for view in &views {
        table.add_row(vec![
            view.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            view.transaction_type.to_string(),
            output::signed_amount(view.amount),
            counterparty(view),
            view.id.to_string(),
        ]);
    }
    println!("{}", table);
    Ok(())
}
