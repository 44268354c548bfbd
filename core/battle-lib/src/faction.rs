//! faction.rs：
//! - 陣營資料與敵我判定（ally/enemy/neutral/self），供能力合法性過濾使用。
//! - 關係以有向列表儲存；載入時驗證同一陣營不得同時為盟友與敵人。
use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{Display, EnumIter};

/// 兩實體間的關係分類
#[derive(Debug, Clone, Copy, Display, EnumIter, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Relation {
    SelfSame,
    Friendly,
    Enemy,
    Neutral,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Faction {
    #[serde(default)]
    pub name: String,
    /// 是否由玩家操控（否則進入 AI 回合）
    #[serde(default)]
    pub controllable: bool,
    #[serde(default)]
    pub allies: BTreeSet<FactionID>,
    #[serde(default)]
    pub enemies: BTreeSet<FactionID>,
}

#[derive(Debug, Default, Clone)]
pub struct FactionRegistry {
    factions: BTreeMap<FactionID, Faction>,
}

impl FactionRegistry {
    /// 建立陣營表並驗證關係：盟友與敵人列表不得重疊
    pub fn new(factions: BTreeMap<FactionID, Faction>) -> Result<Self, Error> {
        let func = "FactionRegistry::new";

        for (id, faction) in &factions {
            if let Some(conflict) = faction.allies.intersection(&faction.enemies).next() {
                return Err(Error::FactionRelationConflict {
                    func,
                    a: id.clone(),
                    b: conflict.clone(),
                });
            }
        }
        Ok(FactionRegistry { factions })
    }

    pub fn get(&self, id: &FactionID) -> Option<&Faction> {
        self.factions.get(id)
    }

    pub fn contains(&self, id: &FactionID) -> bool {
        self.factions.contains_key(id)
    }

    pub fn is_controllable(&self, id: &FactionID) -> bool {
        self.get(id).map_or(false, |f| f.controllable)
    }

    /// a 陣營對 b 陣營的關係（同陣營視為 Friendly，SelfSame 由實體層判定）
    pub fn relation(&self, a: &FactionID, b: &FactionID) -> Relation {
        if a == b {
            return Relation::Friendly;
        }
        match self.get(a) {
            None => Relation::Neutral,
            Some(faction) => {
                if faction.allies.contains(b) {
                    Relation::Friendly
                } else if faction.enemies.contains(b) {
                    Relation::Enemy
                } else {
                    Relation::Neutral
                }
            }
        }
    }

    pub fn is_ally(&self, a: &FactionID, b: &FactionID) -> bool {
        a != b && self.relation(a, b) == Relation::Friendly
    }

    pub fn is_enemy(&self, a: &FactionID, b: &FactionID) -> bool {
        self.relation(a, b) == Relation::Enemy
    }

    pub fn is_neutral(&self, a: &FactionID, b: &FactionID) -> bool {
        self.relation(a, b) == Relation::Neutral
    }

    /// 同陣營或盟友
    pub fn is_friendly(&self, a: &FactionID, b: &FactionID) -> bool {
        self.relation(a, b) == Relation::Friendly
    }
}
