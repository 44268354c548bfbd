//! entity.rs：
//! - 定義實體（Entity）、單位模板（UnitTemplate）等資料結構，僅負責靜態資料與屬性。
//! - 佔用格與移動合法性的計算在 world.rs，不在此處。
//! - 不負責戰鬥流程與效果套用。
use crate::*;
use abilities_lib::{AbilityDef, AbilityID};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum_macros::{Display, EnumIter, EnumString};

/// 實體種類（單一結構 + 判別值，不使用繼承階層）
#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, Default, EnumString, Display, EnumIter, PartialEq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Unit,
    Character,
    PlayerCharacter,
    /// 障礙物：不參與行動順序，能力需 environment 旗標才可作用
    Obstacle,
}

impl EntityKind {
    /// 是否參與行動順序
    pub fn acts_in_battle(&self) -> bool {
        !matches!(self, EntityKind::Obstacle)
    }
}

/// 基礎戰鬥屬性
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
pub struct BaseStats {
    #[serde(default)]
    pub max_hp: i32,
    /// 傷害與治療共用的威力值
    #[serde(default)]
    pub damage: f32,
    #[serde(default)]
    pub defense: f32,
    #[serde(default)]
    pub accuracy: i32,
    #[serde(default)]
    pub evasion: i32,
    #[serde(default)]
    pub initiative: i32,
    /// 能力施放距離加成（格）
    #[serde(default)]
    pub attack_range: u32,
    /// 每回合移動點數
    #[serde(default)]
    pub move_points: u32,
    /// 每回合行動點數
    #[serde(default)]
    pub action_points: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UnitTemplate {
    pub name: UnitTemplateType,
    #[serde(default)]
    pub kind: EntityKind,
    /// footprint 寬 × 高（格）
    #[serde(default = "default_size")]
    pub size: (u32, u32),
    #[serde(default)]
    pub altitude: f32,
    /// 是否阻擋同高度的其他實體
    #[serde(default = "default_true")]
    pub obstructs: bool,
    /// 可無視的格子阻擋標籤
    #[serde(default)]
    pub immunities: BTreeSet<String>,
    #[serde(default)]
    pub stats: BaseStats,
    /// 能力列表，順序即能力列槽位順序
    #[serde(default)]
    pub abilities: Vec<AbilityID>,
}

impl Default for UnitTemplate {
    fn default() -> Self {
        UnitTemplate {
            name: String::new(),
            kind: EntityKind::default(),
            size: default_size(),
            altitude: 0.0,
            obstructs: true,
            immunities: BTreeSet::new(),
            stats: BaseStats::default(),
            abilities: Vec::new(),
        }
    }
}

/// 實體在場景設定中的標記
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EntityMarker {
    pub id: EntityID,
    pub unit_template_type: UnitTemplateType,
    pub faction: FactionID,
    pub pos: Pos,
    /// 未指定時沿用模板名稱
    #[serde(default)]
    pub name: Option<String>,
}

/// 能力的執行期實例，定義自模板複製給每個使用者
#[derive(Debug, Clone, PartialEq)]
pub struct Ability {
    pub id: AbilityID,
    pub def: AbilityDef,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityID,
    pub name: String,
    pub unit_template_type: UnitTemplateType,
    pub kind: EntityKind,
    pub size: (u32, u32),
    pub altitude: f32,
    pub obstructs: bool,
    pub immunities: BTreeSet<String>,
    pub faction: FactionID,
    pub stats: BaseStats,
    pub hp: i32,
    pub max_hp: i32,
    /// 目前佔用的格子，與 World 的佔用索引保持同步
    pub occupied: Vec<CellID>,
    /// 本回合剩餘移動成本（半步單位）
    pub move_points: Cost,
    pub action_points: u32,
    pub abilities: Vec<Ability>,
}

impl Entity {
    pub fn from_template(
        marker: &EntityMarker,
        template: &UnitTemplate,
        abilities: &BTreeMap<AbilityID, AbilityDef>,
    ) -> Result<Self, Error> {
        let func = "Entity::from_template";

        let abilities: Result<Vec<_>, _> = template
            .abilities
            .iter()
            .map(|id| {
                abilities
                    .get(id)
                    .map(|def| Ability {
                        id: id.clone(),
                        def: def.clone(),
                    })
                    .ok_or_else(|| Error::MissingAbility {
                        func,
                        ability_id: id.clone(),
                    })
            })
            .collect();
        Ok(Entity {
            id: marker.id,
            name: marker
                .name
                .clone()
                .unwrap_or_else(|| template.name.clone()),
            unit_template_type: marker.unit_template_type.clone(),
            kind: template.kind,
            size: template.size,
            altitude: template.altitude,
            obstructs: template.obstructs,
            immunities: template.immunities.clone(),
            faction: marker.faction.clone(),
            stats: template.stats,
            hp: template.stats.max_hp,
            max_hp: template.stats.max_hp,
            occupied: Vec::new(),
            move_points: points_to_cost(template.stats.move_points),
            action_points: template.stats.action_points,
            abilities: abilities?,
        })
    }

    /// 回合開始時補滿移動與行動點數
    pub fn refill_points(&mut self) {
        self.move_points = points_to_cost(self.stats.move_points);
        self.action_points = self.stats.action_points;
    }

    /// 是否有任何付得起行動點數的能力
    pub fn can_afford_any_ability(&self) -> bool {
        self.abilities
            .iter()
            .any(|a| a.def.action_cost <= self.action_points)
    }

    pub fn ability(&self, slot: usize) -> Option<&Ability> {
        self.abilities.get(slot)
    }

    /// 兩實體是否共用同一高度
    pub fn shares_altitude_with(&self, other: &Entity) -> bool {
        self.altitude == other.altitude
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

fn default_size() -> (u32, u32) {
    (1, 1)
}

fn default_true() -> bool {
    true
}
