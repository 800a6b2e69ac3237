//! Local transaction commands: add, edit, delete, list.

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use finsync_engine::{AccountContext, TransactionDraft};
use finsync_store::{Identity, PendingOperation, SyncableRecord, Transaction};
use serde::Serialize;

/// One transaction row as printed by `list`.
#[derive(Debug, Serialize)]
pub struct RecordView {
    /// Identity (negative until synced).
    pub identity: i64,
    /// Owning account.
    pub account_id: i64,
    /// Category.
    pub category_id: i64,
    /// Amount in minor units.
    pub amount: i64,
    /// Transaction date.
    pub date: String,
    /// Note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// What the next pass will do with the row.
    pub state: &'static str,
    /// Last local write, Unix milliseconds.
    pub last_updated: i64,
}

impl From<SyncableRecord<Transaction>> for RecordView {
    fn from(record: SyncableRecord<Transaction>) -> Self {
        let state = match record.pending_operation() {
            PendingOperation::None => "synced",
            PendingOperation::Create => "pending create",
            PendingOperation::Update => "pending update",
            PendingOperation::Delete => "pending delete",
            PendingOperation::DiscardLocal => "discard",
        };
        Self {
            identity: record.identity.get(),
            account_id: record.payload.account_id,
            category_id: record.payload.category_id,
            amount: record.payload.amount,
            date: record.payload.transaction_date,
            comment: record.payload.comment,
            state,
            last_updated: record.last_updated,
        }
    }
}

/// Builds a draft from command-line fields.
pub fn draft(amount: i64, category: i64, date: String, comment: Option<String>) -> TransactionDraft {
    TransactionDraft {
        category_id: category,
        amount,
        transaction_date: date,
        comment,
    }
}

/// Runs the add command.
pub fn add(ctx: &AppContext, account: Option<i64>, draft: TransactionDraft) -> CliResult<()> {
    let service = ctx.service();
    let account = match account {
        Some(id) => AccountContext::explicit(Identity::new(id)),
        None => service.current_account()?,
    };
    let record = service.create(&account, draft)?;
    println!(
        "Created transaction {} on account {} (pending sync)",
        record.identity,
        account.account_id()
    );
    Ok(())
}

/// Runs the edit command.
pub fn edit(ctx: &AppContext, id: i64, draft: TransactionDraft) -> CliResult<()> {
    let record = ctx.service().edit(Identity::new(id), draft)?;
    println!("Updated transaction {} (pending sync)", record.identity);
    Ok(())
}

/// Runs the delete command.
pub fn delete(ctx: &AppContext, id: i64) -> CliResult<()> {
    let deleted = ctx.service().delete(Identity::new(id))?;
    if deleted.is_local() {
        println!("Deleted transaction {deleted} (never synced, dropped on next sync)");
    } else {
        println!("Deleted transaction {deleted} (pending sync)");
    }
    Ok(())
}

/// Collects the rows `list` prints.
pub fn views(ctx: &AppContext, dirty_only: bool) -> CliResult<Vec<RecordView>> {
    let service = ctx.service();
    let records = if dirty_only {
        service.pending()?
    } else {
        service.list()?
    };
    Ok(records.into_iter().map(RecordView::from).collect())
}

/// Runs the list command.
pub fn list(ctx: &AppContext, dirty_only: bool, format: &str) -> CliResult<()> {
    let views = views(ctx, dirty_only)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&views)?),
        "text" => print_table(&views),
        other => return Err(CliError::UnknownFormat(other.to_string())),
    }
    Ok(())
}

fn print_table(views: &[RecordView]) {
    if views.is_empty() {
        println!("No transactions");
        return;
    }
    println!(
        "{:>8}  {:>8}  {:>8}  {:>12}  {:<12}  {:<15}  Comment",
        "ID", "Account", "Category", "Amount", "Date", "State"
    );
    for view in views {
        println!(
            "{:>8}  {:>8}  {:>8}  {:>12}  {:<12}  {:<15}  {}",
            view.identity,
            view.account_id,
            view.category_id,
            view.amount,
            view.date,
            view.state,
            view.comment.as_deref().unwrap_or("")
        );
    }
}
