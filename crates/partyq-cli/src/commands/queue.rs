use partyq_core::position::Direction;

use crate::commands::common::{open_session, resolve_item, sync_and_report};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_move(
    ctx: &CliContext,
    party: &str,
    item: &str,
    direction: Direction,
) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let item_id = resolve_item(&session.items().await, item)?;
    if session.move_item(&item_id, direction).await? {
        println!("{item_id}");
    } else {
        let edge = match direction {
            Direction::Up => "top",
            Direction::Down => "bottom",
        };
        println!("Already at the {edge} of the queue");
    }
    sync_and_report(&session).await
}

pub async fn run_delete(ctx: &CliContext, party: &str, item: &str) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let item_id = resolve_item(&session.items().await, item)?;
    session.delete_item(&item_id).await?;
    println!("{item_id}");
    sync_and_report(&session).await
}

pub async fn run_advance(ctx: &CliContext, party: &str) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let outcome = session.advance().await?;
    if outcome.is_noop() {
        println!("Queue is empty");
    } else if let Some(showing) = session.now_showing().await {
        println!("Now showing: {}", showing.title());
    } else {
        println!("Queue finished");
    }
    sync_and_report(&session).await
}

pub async fn run_show_next(ctx: &CliContext, party: &str, item: &str) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let item_id = resolve_item(&session.items().await, item)?;
    if session.show_next(&item_id).await? {
        println!("{item_id}");
    } else {
        println!("Nothing is showing; use `partyq advance` first");
    }
    sync_and_report(&session).await
}
