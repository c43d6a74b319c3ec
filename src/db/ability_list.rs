//! Versioned ability-id list column
//!
//! Stored as `{"v":1,"ids":[...]}`. Rows written before versioning hold a
//! bare JSON array and decode as version 0.

use serde::{Deserialize, Serialize};

use crate::abilities::AbilityId;
use crate::error::GameResult;

pub const ABILITY_LIST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityList {
    pub v: u32,
    pub ids: Vec<AbilityId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Versioned(AbilityList),
    Legacy(Vec<AbilityId>),
}

impl AbilityList {
    pub fn new(ids: Vec<AbilityId>) -> Self {
        Self {
            v: ABILITY_LIST_VERSION,
            ids,
        }
    }

    pub fn encode(ids: &[AbilityId]) -> GameResult<String> {
        Ok(serde_json::to_string(&Self::new(ids.to_vec()))?)
    }

    /// Decode any stored form, migrating legacy arrays to the current version
    pub fn decode(raw: &str) -> GameResult<Self> {
        let list = match serde_json::from_str::<Stored>(raw)? {
            Stored::Versioned(list) => list,
            Stored::Legacy(ids) => Self { v: 0, ids },
        };
        Ok(list.migrate())
    }

    fn migrate(self) -> Self {
        match self.v {
            ABILITY_LIST_VERSION => self,
            _ => Self::new(self.ids),
        }
    }
}
