use crate::commands::common::{normalize_content, open_session, resolve_item, sync_and_report};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_edit_note(
    ctx: &CliContext,
    party: &str,
    item: &str,
    content_parts: &[String],
) -> Result<(), CliError> {
    let content = normalize_content(&content_parts.join(" ")).ok_or(CliError::EmptyContent)?;
    let session = open_session(ctx, party).await?;
    let item_id = resolve_item(&session.items().await, item)?;
    session.edit_note(&item_id, &content).await?;
    println!("{item_id}");
    sync_and_report(&session).await
}

pub async fn run_toggle(ctx: &CliContext, party: &str, item: &str) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let item_id = resolve_item(&session.items().await, item)?;
    let completed = session.toggle_complete(&item_id).await?;
    println!(
        "{item_id} {}",
        if completed { "completed" } else { "reopened" }
    );
    sync_and_report(&session).await
}
