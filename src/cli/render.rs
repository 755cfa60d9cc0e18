use comfy_table::Cell;

use super::ui;
use crate::core::model::{Account, Balance, HealthReport, Institution, Transaction};

pub fn render_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("{}", ui::style_text("No accounts found.", ui::StyleType::Subtle));
        return;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Currency"),
        ui::header_cell("Institution"),
        ui::header_cell("Provider"),
    ]);

    for account in accounts {
        table.add_row(vec![
            Cell::new(&account.id),
            Cell::new(&account.name),
            Cell::new(account.kind.to_string()),
            Cell::new(&account.currency),
            ui::format_optional_cell(
                account.institution.as_ref().map(|i| i.name.clone()),
                |name| name,
            ),
            Cell::new(account.provider.to_string()),
        ]);
    }

    println!("{table}");
}

pub fn render_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!(
            "{}",
            ui::style_text("No transactions found.", ui::StyleType::Subtle)
        );
        return;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Name"),
        ui::header_cell("Amount"),
        ui::header_cell("Currency"),
        ui::header_cell("Method"),
        ui::header_cell("Status"),
        ui::header_cell("Category"),
    ]);

    for transaction in transactions {
        table.add_row(vec![
            Cell::new(&transaction.date),
            Cell::new(&transaction.name),
            ui::amount_cell(transaction.amount),
            Cell::new(&transaction.currency),
            Cell::new(transaction.method.to_string()),
            Cell::new(transaction.status.to_string()),
            ui::format_optional_cell(transaction.category.clone(), |c| c),
        ]);
    }

    println!("{table}");
    println!(
        "{}",
        ui::style_text(&format!("{} transactions", transactions.len()), ui::StyleType::Subtle)
    );
}

pub fn render_balance(balance: Option<&Balance>) {
    match balance {
        Some(balance) => println!(
            "{} {}",
            ui::style_text(&format!("{:.2}", balance.amount), ui::StyleType::Healthy),
            balance.currency
        ),
        None => println!(
            "{}",
            ui::style_text("No balance available for this account.", ui::StyleType::Subtle)
        ),
    }
}

pub fn render_institutions(institutions: &[Institution]) {
    if institutions.is_empty() {
        println!(
            "{}",
            ui::style_text("No institutions found.", ui::StyleType::Subtle)
        );
        return;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Logo"),
        ui::header_cell("Provider"),
    ]);

    for institution in institutions {
        table.add_row(vec![
            Cell::new(&institution.id),
            Cell::new(&institution.name),
            ui::format_optional_cell(institution.logo.clone(), |logo| logo),
            Cell::new(institution.provider.to_string()),
        ]);
    }

    println!("{table}");
}

pub fn render_health(report: &HealthReport) {
    println!("{}", ui::style_text("Provider health", ui::StyleType::Title));

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Provider"), ui::header_cell("Status")]);

    for (kind, healthy) in report.entries() {
        table.add_row(vec![Cell::new(kind.to_string()), ui::health_cell(healthy)]);
    }

    println!("{table}");
}
