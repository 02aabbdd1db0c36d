use std::{
    fmt,
    str::FromStr,
};

/// Which gateway namespace a command lives under.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommandKind {
    /// Account-level persona management, handled by the gateway itself.
    Persona,
    /// Asynchronous game transaction; replies with a hash and a tick.
    Transaction,
    /// Read-only game query; replies with a value.
    Query,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    ShowPersona,
    ClaimPersona,
    CreatePlayer,
    CreatePet,
    BathPet,
    FeedPet,
    CurePet,
    PlayPet,
    SleepPet,
    BreedPet,
    BuyItem,
    CurrentTick,
    PetEnergy,
    PetHealth,
    PetsList,
    PlayerExist,
    PersonaItemList,
    Leaderboard,
    ToyStoreList,
    FoodStoreList,
    DrugStoreList,
}

impl Command {
    pub const ALL: [Command; 21] = [
        Command::ShowPersona,
        Command::ClaimPersona,
        Command::CreatePlayer,
        Command::CreatePet,
        Command::BathPet,
        Command::FeedPet,
        Command::CurePet,
        Command::PlayPet,
        Command::SleepPet,
        Command::BreedPet,
        Command::BuyItem,
        Command::CurrentTick,
        Command::PetEnergy,
        Command::PetHealth,
        Command::PetsList,
        Command::PlayerExist,
        Command::PersonaItemList,
        Command::Leaderboard,
        Command::ToyStoreList,
        Command::FoodStoreList,
        Command::DrugStoreList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::ShowPersona => "show-persona",
            Command::ClaimPersona => "claim-persona",
            Command::CreatePlayer => "create-player",
            Command::CreatePet => "create-pet",
            Command::BathPet => "bath-pet",
            Command::FeedPet => "feed-pet",
            Command::CurePet => "cure-pet",
            Command::PlayPet => "play-pet",
            Command::SleepPet => "sleep-pet",
            Command::BreedPet => "breed-pet",
            Command::BuyItem => "buy-item",
            Command::CurrentTick => "current-tick",
            Command::PetEnergy => "pet-energy",
            Command::PetHealth => "pet-health",
            Command::PetsList => "pets-list",
            Command::PlayerExist => "player-exist",
            Command::PersonaItemList => "personaItem-list",
            Command::Leaderboard => "leaderboard",
            Command::ToyStoreList => "toystore-list",
            Command::FoodStoreList => "foodstore-list",
            Command::DrugStoreList => "drugstore-list",
        }
    }

    pub fn kind(self) -> CommandKind {
        match self {
            Command::ShowPersona | Command::ClaimPersona => CommandKind::Persona,
            Command::CreatePlayer
            | Command::CreatePet
            | Command::BathPet
            | Command::FeedPet
            | Command::CurePet
            | Command::PlayPet
            | Command::SleepPet
            | Command::BreedPet
            | Command::BuyItem => CommandKind::Transaction,
            Command::CurrentTick
            | Command::PetEnergy
            | Command::PetHealth
            | Command::PetsList
            | Command::PlayerExist
            | Command::PersonaItemList
            | Command::Leaderboard
            | Command::ToyStoreList
            | Command::FoodStoreList
            | Command::DrugStoreList => CommandKind::Query,
        }
    }

    /// Gameplay transactions act on behalf of a persona and need one bound first.
    pub fn requires_identity(self) -> bool {
        self.kind() == CommandKind::Transaction
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
