use crate::{
    Client,
    print_confirmation,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use futures::future::join_all;
use serde::Serialize;
use tick_client::{
    GameClient,
    backend::{
        GameBackend,
        ReceiptSource,
    },
    error::DispatchError,
};
use tracing::{
    info,
    warn,
};

/// Scripted session against a live shard: the same steps a new player takes.
pub(crate) async fn run(client: &Client, persona: &str, pet: &str, item: &str) -> Result<()> {
    let session = client
        .dispatcher()
        .session_guard()
        .current()
        .await
        .ok_or_else(|| eyre!("not signed in"))?;
    let account = client
        .dispatcher()
        .backend()
        .account(&session)
        .await
        .wrap_err("failed to read account")?;
    info!(
        user_id = %account.user.id,
        username = ?account.user.username,
        custom_id = ?account.custom_id,
        "account"
    );

    play(client, persona, pet, item).await
}

/// Game steps of the walkthrough. Queries about the new pet run only once its
/// creation is confirmed, and a failed query is logged rather than fatal.
pub(crate) async fn play<B, R>(
    client: &GameClient<B, R>,
    persona: &str,
    pet: &str,
    item: &str,
) -> Result<()>
where
    B: GameBackend,
    R: ReceiptSource,
{
    let outcome = client
        .claim_persona(persona)
        .await
        .wrap_err_with(|| format!("failed to claim persona {persona}"))?;
    println!("persona: {} ({:?})", outcome.persona().tag, outcome.persona().status);

    if let Some(submission) = client.create_player().await? {
        print_confirmation(&client.confirm(&submission).await?);
    }

    let created = client.create_pet(pet).await?;
    print_confirmation(&client.confirm(&created).await?);
    show("tick", client.current_tick().await)?;
    show("energy", client.pet_energy(pet).await)?;
    show("health", client.pet_health(pet).await)?;
    show("pets", client.pets().await)?;

    let bath = client.bath_pet(pet, item).await?;
    print_confirmation(&client.confirm(&bath).await?);

    // independent actions confirm concurrently and share only the session
    let sleep = client.sleep_pet(pet).await?;
    let play = client.play_pet(pet, item).await?;
    let confirmations = join_all([client.confirm(&sleep), client.confirm(&play)]).await;
    for confirmation in confirmations {
        match confirmation {
            Ok(confirmation) => print_confirmation(&confirmation),
            Err(err) => warn!(?err, "confirmation failed"),
        }
    }

    show("leaderboard", client.leaderboard().await)
}

fn show<T: Serialize>(label: &str, result: Result<T, DispatchError>) -> Result<()> {
    match result {
        Ok(value) => println!("{label}: {}", serde_json::to_string_pretty(&value)?),
        Err(err) => warn!(?err, query = label, "query failed"),
    }
    Ok(())
}
