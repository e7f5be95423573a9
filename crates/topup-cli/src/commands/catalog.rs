//! Catalogue and transaction commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use topup_cli::ClientContext;
use topup_notifications::status_label;
use topup_types::Transaction;

/// List games.
pub async fn games(
    context: &ClientContext,
    category: Option<String>,
    popular: bool,
    format: &OutputFormat,
) -> Result<()> {
    let response = match (category, popular) {
        (Some(category), _) => context.api.games_by_category(&category).await,
        (None, true) => context.api.popular_games().await,
        (None, false) => context.api.games().await,
    };
    let games = response.into_result_or_default()?;

    if format.is_json() {
        output::print_json(&games);
        return Ok(());
    }

    output::print_heading(&format!("Games ({})", games.len()));
    for game in &games {
        println!("  {:<16} {:<32} {}", game.code, game.name, game.publisher);
    }
    Ok(())
}

/// List transactions, or show one.
pub async fn transactions(
    context: &ClientContext,
    id: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    if !super::require_login(context, format) {
        return Ok(());
    }

    if let Some(id) = id {
        let transaction = context.api.transaction(&id).await.into_result()?;
        if format.is_json() {
            output::print_json(&transaction);
        } else {
            print_transaction(&transaction);
        }
        return Ok(());
    }

    let transactions = context
        .api
        .transactions()
        .await
        .into_result_or_default()?;
    if format.is_json() {
        output::print_json(&transactions);
        return Ok(());
    }

    output::print_heading(&format!("Transactions ({})", transactions.len()));
    for transaction in &transactions {
        println!(
            "  {:<20} {:<24} {:>12.0} {}",
            transaction.invoice_number,
            transaction.product_name,
            transaction.total_amount,
            status_label(transaction.status)
        );
    }
    Ok(())
}

fn print_transaction(transaction: &Transaction) {
    output::print_heading(&format!("Transaction #{}", transaction.invoice_number));
    output::print_row("Status", status_label(transaction.status));
    output::print_row("Game", &transaction.game_name);
    output::print_row("Product", &transaction.product_name);
    output::print_row("Player", &transaction.target_user_id);
    output::print_row("Amount", &format!("{:.0}", transaction.amount));
    output::print_row("Fee", &format!("{:.0}", transaction.admin_fee));
    output::print_row("Total", &format!("{:.0}", transaction.total_amount));
    output::print_row("Payment", &transaction.payment_method);
    if let Some(url) = &transaction.payment_url {
        output::print_row("Payment URL", url);
    }
    if let Some(expired_at) = &transaction.expired_at {
        output::print_row("Expires", expired_at);
    }
    output::print_row("Created", &transaction.created_at);
}
