//! Wire schemas for every command the client speaks, plus the receipt feed.
//!
//! There is one canonical shape per command. Field names follow the game
//! backend's JSON exactly, including its mixed casing, so decoding is the
//! validation step: a reply that does not fit is a decode error.

use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use serde_json::Value;

/// Logical clock value owned by the backend.
pub type Tick = u64;

/// Correlation handle returned when a transaction is accepted for processing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "TxHash")]
    pub tx_hash: String,
    #[serde(rename = "Tick")]
    pub tick: Tick,
}

impl Submission {
    pub fn new(tx_hash: impl Into<String>, tick: Tick) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            tick,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: String,
    pub tick: Tick,
    #[serde(default)]
    pub result: Value,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<String>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptBatch {
    pub start_tick: Tick,
    pub end_tick: Tick,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub receipts: Vec<Receipt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaStatus {
    Pending,
    Accepted,
    Rejected,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(rename = "personaTag")]
    pub tag: String,
    pub status: PersonaStatus,
    #[serde(default)]
    pub tick: Tick,
    #[serde(rename = "txHash", default)]
    pub tx_hash: String,
}

impl Persona {
    /// A rejected claim leaves the account without a persona.
    pub fn is_held(&self) -> bool {
        self.status != PersonaStatus::Rejected
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPersonaMsg {
    #[serde(rename = "personaTag")]
    pub persona_tag: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePetMsg {
    pub nickname: String,
}

/// Payload shared by bath, feed, cure and play: a target pet and the item used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUseMsg {
    pub target: String,
    pub item_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepPetMsg {
    pub target: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreedPetMsg {
    pub mother_name: String,
    pub father_name: String,
    pub born_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyItemMsg {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetNicknameMsg {
    #[serde(rename = "Nickname")]
    pub nickname: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTagMsg {
    #[serde(rename = "personaTag")]
    pub persona_tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTickReply {
    #[serde(rename = "currentTick")]
    pub current_tick: Tick,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetEnergyReply {
    #[serde(rename = "E")]
    pub energy: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetHealthReply {
    #[serde(rename = "HP")]
    pub health: i64,
}

/// The backend does not always serialise the flag, and a missing flag means no player.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerExistReply {
    #[serde(default)]
    pub exist: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PetsReply {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pets: Vec<Pet>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemListReply {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToysReply {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub toys: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodsReply {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub foods: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrugsReply {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub drugs: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    #[serde(rename = "personaTag")]
    pub persona_tag: String,
    pub nickname: String,
    #[serde(rename = "Gender", default)]
    pub gender: bool,
    #[serde(rename = "lvl", default)]
    pub level: i64,
    #[serde(rename = "exp", default)]
    pub xp: i64,
    #[serde(rename = "NextLevelXP", default)]
    pub next_level_xp: i64,
    #[serde(default)]
    pub born_tick: Tick,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
