use partyq_core::PartyId;

use crate::commands::common::open_store;
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_create(ctx: &CliContext, name: &str, display_name: &str) -> Result<(), CliError> {
    let store = open_store(ctx)?;
    let party = store
        .create_party(name, &ctx.identity, display_name)
        .await?;
    println!("{}", party.id);
    Ok(())
}

pub async fn run_join(ctx: &CliContext, party: &str, display_name: &str) -> Result<(), CliError> {
    let store = open_store(ctx)?;
    let party_id = PartyId::from(party.trim());
    let member = store
        .join_party(&party_id, &ctx.identity, display_name)
        .await?;
    println!("Joined {} as {}", member.party_id, member.display_name);
    Ok(())
}
