use crate::{
    backend::{
        GameBackend,
        ReceiptSource,
    },
    command::Command,
    confirm::{
        CancelSignal,
        ConfirmPolicy,
        Confirmation,
        ConfirmationEngine,
    },
    dispatch::Dispatcher,
    error::{
        ActionError,
        ClaimError,
        ConfirmError,
        DispatchError,
        PreconditionError,
        SessionError,
    },
    identity::{
        ClaimOutcome,
        IdentityResolver,
    },
    messages::{
        BreedPetMsg,
        BuyItemMsg,
        CreatePetMsg,
        DrugsReply,
        Empty,
        FoodsReply,
        Item,
        ItemListReply,
        ItemUseMsg,
        Persona,
        PersonaTagMsg,
        Pet,
        PetEnergyReply,
        PetHealthReply,
        PetNicknameMsg,
        PetsReply,
        PlayerExistReply,
        SleepPetMsg,
        Submission,
        Tick,
        ToysReply,
    },
    session::{
        Credentials,
        Session,
        SessionGuard,
    },
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A gameplay transaction and its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    CreatePlayer,
    CreatePet { nickname: String },
    BathPet { target: String, item: String },
    FeedPet { target: String, item: String },
    CurePet { target: String, item: String },
    PlayPet { target: String, item: String },
    SleepPet { target: String },
    BreedPet { father: String, mother: String, born: String },
    BuyItem { name: String },
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ActionPayload {
    Empty(Empty),
    CreatePet(CreatePetMsg),
    ItemUse(ItemUseMsg),
    SleepPet(SleepPetMsg),
    BreedPet(BreedPetMsg),
    BuyItem(BuyItemMsg),
}

impl Action {
    pub fn command(&self) -> Command {
        match self {
            Action::CreatePlayer => Command::CreatePlayer,
            Action::CreatePet { .. } => Command::CreatePet,
            Action::BathPet { .. } => Command::BathPet,
            Action::FeedPet { .. } => Command::FeedPet,
            Action::CurePet { .. } => Command::CurePet,
            Action::PlayPet { .. } => Command::PlayPet,
            Action::SleepPet { .. } => Command::SleepPet,
            Action::BreedPet { .. } => Command::BreedPet,
            Action::BuyItem { .. } => Command::BuyItem,
        }
    }

    pub fn payload(&self) -> ActionPayload {
        let item_use = |target: &str, item: &str| {
            ActionPayload::ItemUse(ItemUseMsg {
                target: target.to_string(),
                item_name: item.to_string(),
            })
        };
        match self {
            Action::CreatePlayer => ActionPayload::Empty(Empty {}),
            Action::CreatePet { nickname } => ActionPayload::CreatePet(CreatePetMsg {
                nickname: nickname.clone(),
            }),
            Action::BathPet { target, item }
            | Action::FeedPet { target, item }
            | Action::CurePet { target, item }
            | Action::PlayPet { target, item } => item_use(target, item),
            Action::SleepPet { target } => ActionPayload::SleepPet(SleepPetMsg {
                target: target.clone(),
            }),
            Action::BreedPet {
                father,
                mother,
                born,
            } => ActionPayload::BreedPet(BreedPetMsg {
                mother_name: mother.clone(),
                father_name: father.clone(),
                born_name: born.clone(),
            }),
            Action::BuyItem { name } => ActionPayload::BuyItem(BuyItemMsg { name: name.clone() }),
        }
    }
}

/// High-level game client: one method per game action or query, plus confirmation.
pub struct GameClient<B, R> {
    dispatcher: Dispatcher<B>,
    receipts: R,
    policy: ConfirmPolicy,
}

impl<B: GameBackend, R: ReceiptSource> GameClient<B, R> {
    pub fn new(backend: B, receipts: R, guard: SessionGuard, policy: ConfirmPolicy) -> Self {
        Self {
            dispatcher: Dispatcher::new(backend, guard),
            receipts,
            policy,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    pub fn receipts(&self) -> &R {
        &self.receipts
    }

    pub fn policy(&self) -> &ConfirmPolicy {
        &self.policy
    }

    pub fn identity(&self) -> IdentityResolver<'_, B> {
        IdentityResolver::new(&self.dispatcher)
    }

    pub async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, SessionError> {
        self.dispatcher.authenticate(credentials).await
    }

    pub async fn persona(&self) -> Result<Option<Persona>, DispatchError> {
        self.dispatcher.persona().await
    }

    pub async fn claim_persona(&self, tag: &str) -> Result<ClaimOutcome, ClaimError> {
        self.identity().claim(tag).await
    }

    pub async fn submit(&self, action: &Action) -> Result<Submission, DispatchError> {
        self.dispatcher
            .submit(action.command(), &action.payload())
            .await
    }

    /// Submits then confirms with the client's policy.
    pub async fn perform(&self, action: &Action) -> Result<Confirmation, ActionError> {
        let submission = self.submit(action).await?;
        Ok(self.confirm(&submission).await?)
    }

    pub async fn confirm(&self, submission: &Submission) -> Result<Confirmation, ConfirmError> {
        self.confirm_with_cancel(submission, &CancelSignal::never())
            .await
    }

    pub async fn confirm_with_cancel(
        &self,
        submission: &Submission,
        cancel: &CancelSignal,
    ) -> Result<Confirmation, ConfirmError> {
        ConfirmationEngine::new(&self.dispatcher, &self.receipts)
            .confirm(submission, &self.policy, cancel)
            .await
    }

    /// Creates the player record for the bound persona. Returns `None` when it
    /// already exists, so calling this twice sends one transaction.
    pub async fn create_player(&self) -> Result<Option<Submission>, DispatchError> {
        let persona = self
            .dispatcher
            .persona()
            .await?
            .ok_or(PreconditionError::NoIdentity)?;
        if self.player_exists(&persona.tag).await? {
            info!(tag = %persona.tag, "player already exists");
            return Ok(None);
        }
        self.submit(&Action::CreatePlayer).await.map(Some)
    }

    pub async fn create_pet(&self, nickname: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::CreatePet {
            nickname: nickname.to_string(),
        })
        .await
    }

    pub async fn bath_pet(&self, target: &str, item: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::BathPet {
            target: target.to_string(),
            item: item.to_string(),
        })
        .await
    }

    pub async fn feed_pet(&self, target: &str, item: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::FeedPet {
            target: target.to_string(),
            item: item.to_string(),
        })
        .await
    }

    pub async fn cure_pet(&self, target: &str, item: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::CurePet {
            target: target.to_string(),
            item: item.to_string(),
        })
        .await
    }

    pub async fn play_pet(&self, target: &str, item: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::PlayPet {
            target: target.to_string(),
            item: item.to_string(),
        })
        .await
    }

    pub async fn sleep_pet(&self, target: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::SleepPet {
            target: target.to_string(),
        })
        .await
    }

    pub async fn breed_pet(
        &self,
        father: &str,
        mother: &str,
        born: &str,
    ) -> Result<Submission, DispatchError> {
        self.submit(&Action::BreedPet {
            father: father.to_string(),
            mother: mother.to_string(),
            born: born.to_string(),
        })
        .await
    }

    pub async fn buy_item(&self, name: &str) -> Result<Submission, DispatchError> {
        self.submit(&Action::BuyItem {
            name: name.to_string(),
        })
        .await
    }

    pub async fn current_tick(&self) -> Result<Tick, DispatchError> {
        self.dispatcher.current_tick().await
    }

    pub async fn pet_energy(&self, nickname: &str) -> Result<i64, DispatchError> {
        let reply: PetEnergyReply = self
            .dispatcher
            .query(Command::PetEnergy, &nickname_msg(nickname))
            .await?;
        Ok(reply.energy)
    }

    pub async fn pet_health(&self, nickname: &str) -> Result<i64, DispatchError> {
        let reply: PetHealthReply = self
            .dispatcher
            .query(Command::PetHealth, &nickname_msg(nickname))
            .await?;
        Ok(reply.health)
    }

    pub async fn pets(&self) -> Result<Vec<Pet>, DispatchError> {
        let reply: Option<PetsReply> = self
            .dispatcher
            .query_optional(Command::PetsList, &Empty {})
            .await?;
        Ok(reply.map(|r| r.pets).unwrap_or_default())
    }

    /// An empty reply counts as "no player".
    pub async fn player_exists(&self, persona_tag: &str) -> Result<bool, DispatchError> {
        let reply: Option<PlayerExistReply> = self
            .dispatcher
            .query_optional(Command::PlayerExist, &tag_msg(persona_tag))
            .await?;
        Ok(reply.unwrap_or_default().exist)
    }

    pub async fn persona_items(&self, persona_tag: &str) -> Result<Vec<Item>, DispatchError> {
        let reply: Option<ItemListReply> = self
            .dispatcher
            .query_optional(Command::PersonaItemList, &tag_msg(persona_tag))
            .await?;
        Ok(reply.map(|r| r.items).unwrap_or_default())
    }

    pub async fn leaderboard(&self) -> Result<Vec<Pet>, DispatchError> {
        let reply: Option<PetsReply> = self
            .dispatcher
            .query_optional(Command::Leaderboard, &Empty {})
            .await?;
        Ok(reply.map(|r| r.pets).unwrap_or_default())
    }

    pub async fn toy_store(&self) -> Result<Vec<Item>, DispatchError> {
        let reply: Option<ToysReply> = self
            .dispatcher
            .query_optional(Command::ToyStoreList, &Empty {})
            .await?;
        Ok(reply.map(|r| r.toys).unwrap_or_default())
    }

    pub async fn food_store(&self) -> Result<Vec<Item>, DispatchError> {
        let reply: Option<FoodsReply> = self
            .dispatcher
            .query_optional(Command::FoodStoreList, &Empty {})
            .await?;
        Ok(reply.map(|r| r.foods).unwrap_or_default())
    }

    pub async fn drug_store(&self) -> Result<Vec<Item>, DispatchError> {
        let reply: Option<DrugsReply> = self
            .dispatcher
            .query_optional(Command::DrugStoreList, &Empty {})
            .await?;
        Ok(reply.map(|r| r.drugs).unwrap_or_default())
    }
}

fn nickname_msg(nickname: &str) -> PetNicknameMsg {
    PetNicknameMsg {
        nickname: nickname.to_string(),
    }
}

fn tag_msg(persona_tag: &str) -> PersonaTagMsg {
    PersonaTagMsg {
        persona_tag: persona_tag.to_string(),
    }
}
