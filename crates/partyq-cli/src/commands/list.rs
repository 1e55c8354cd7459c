use crate::commands::common::{format_item_lines, item_to_list_item, open_session, QueueListItem};
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_list(
    ctx: &CliContext,
    party: &str,
    include_shown: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let session = open_session(ctx, party).await?;
    let items = if include_shown {
        session.items().await
    } else {
        session.live_queue().await
    };

    if as_json {
        let json_items = items
            .iter()
            .map(item_to_list_item)
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_item_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}
