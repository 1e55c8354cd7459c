use partyq_core::PartyId;

use crate::commands::common::open_store;
use crate::context::CliContext;
use crate::error::CliError;

pub async fn run_renormalize(ctx: &CliContext, party: &str) -> Result<(), CliError> {
    let store = open_store(ctx)?;
    let party_id = PartyId::from(party.trim());
    if store.get_party(&party_id).await?.is_none() {
        return Err(CliError::PartyNotFound(party.to_string()));
    }
    let moved = store.renormalize_positions(&party_id).await?;
    println!("Renumbered {moved} items");
    Ok(())
}
