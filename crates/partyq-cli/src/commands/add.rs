use partyq_core::ItemContent;

use crate::cli::AddCommands;
use crate::commands::common::{normalize_content, open_session, sync_and_report};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_add(ctx: &CliContext, party: &str, item: AddCommands) -> Result<(), CliError> {
    let content = item_content(item)?;
    let session = open_session(ctx, party).await?;
    let stored = session.add_item(content).await?;
    println!("{}", stored.id);
    sync_and_report(&session).await
}

pub fn item_content(item: AddCommands) -> Result<ItemContent, CliError> {
    Ok(match item {
        AddCommands::Note { content } => ItemContent::Note {
            content: normalize_content(&content.join(" ")).ok_or(CliError::EmptyContent)?,
        },
        AddCommands::Video {
            url,
            title,
            channel,
            thumbnail,
        } => ItemContent::LinkVideo {
            url,
            title,
            channel,
            thumbnail_url: thumbnail,
        },
        AddCommands::Post { url, author, body } => ItemContent::ShortTextPost { url, author, body },
        AddCommands::Forum {
            url,
            title,
            community,
            body,
        } => ItemContent::ForumPost {
            url,
            title,
            community,
            body,
        },
        AddCommands::Image { url, caption } => ItemContent::Image { url, caption },
    })
}
