use std::sync::Arc;

use chrono::{DateTime, Utc};
use partyq_core::{
    ConflictInfo, ItemId, ItemStatus, PartyId, QueueItem, QueueSession, SqliteQueueStore,
};
use serde::Serialize;

use crate::context::CliContext;
use crate::error::CliError;

pub type CliSession = QueueSession<SqliteQueueStore>;

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub status: String,
    pub position: f64,
    pub is_completed: bool,
    pub added_by: String,
    pub added_at: String,
    pub relative_time: String,
}

pub fn open_store(ctx: &CliContext) -> Result<Arc<SqliteQueueStore>, CliError> {
    Ok(Arc::new(SqliteQueueStore::open_path(
        &ctx.db_path,
        &ctx.config,
    )?))
}

/// Open the store and load the party's queue into a fresh session.
pub async fn open_session(ctx: &CliContext, party: &str) -> Result<CliSession, CliError> {
    let store = open_store(ctx)?;
    let party_id = PartyId::from(party.trim());
    if store.get_party(&party_id).await?.is_none() {
        return Err(CliError::PartyNotFound(party.to_string()));
    }

    let session = QueueSession::new(
        store,
        party_id,
        ctx.identity.clone(),
        ctx.config.clone(),
    );
    session.load().await?;
    Ok(session)
}

/// Refetch after a write and tell the user about anything that was overwritten.
pub async fn sync_and_report(session: &CliSession) -> Result<(), CliError> {
    for conflict in session.refresh().await? {
        eprintln!("{}", format_conflict(&conflict));
    }
    Ok(())
}

pub fn format_conflict(conflict: &ConflictInfo) -> String {
    format!(
        "conflict ({}): {} - {}",
        conflict.kind, conflict.item_title, conflict.description
    )
}

pub fn normalize_item_identifier(query: &str) -> Result<String, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::EmptyItemId);
    }
    Ok(query.to_string())
}

/// Exact id, or a prefix matching exactly one item.
pub fn resolve_item(items: &[QueueItem], query: &str) -> Result<ItemId, CliError> {
    let query = normalize_item_identifier(query)?;
    if let Some(item) = items.iter().find(|item| item.id.as_str() == query) {
        return Ok(item.id.clone());
    }

    let matches: Vec<&QueueItem> = items
        .iter()
        .filter(|item| item.id.as_str().starts_with(&query))
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::ItemNotFound(query)),
        [item] => Ok(item.id.clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| short_id(&item.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn short_id(id: &ItemId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn format_item_lines(items: &[QueueItem]) -> Vec<String> {
    let now = Utc::now();
    items
        .iter()
        .map(|item| {
            let marker = match item.status {
                ItemStatus::Showing => '>',
                ItemStatus::Shown => 'x',
                ItemStatus::Pending if item.is_completed => '*',
                ItemStatus::Pending => ' ',
            };
            let title = truncate(&item.title(), 40);
            format!(
                "{marker} {:<13}  {title:<40}  {:<10}  {}",
                short_id(&item.id),
                item.content.kind(),
                format_relative_time(item.added_at, now)
            )
        })
        .collect()
}

pub fn item_to_list_item(item: &QueueItem) -> QueueListItem {
    QueueListItem {
        id: item.id.to_string(),
        kind: item.content.kind().to_string(),
        title: item.title(),
        status: item.status.to_string(),
        position: item.position,
        is_completed: item.is_completed,
        added_by: item.added_by_session_id.to_string(),
        added_at: item.added_at.to_rfc3339(),
        relative_time: format_relative_time(item.added_at, Utc::now()),
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(at);
    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else {
        format!("{}d ago", diff.num_days())
    }
}
