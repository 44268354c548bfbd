//! loader.rs：
//! - 將宣告式場景設定（TOML/JSON）建成 World：格子圖、陣營、實體。
//! - 陣營關係衝突與未註冊效果是載入期錯誤（直接失敗）；
//!   缺模板、缺陣營、放置失敗則記錄後跳過該實體，繼續載入其餘內容。
use crate::*;
use abilities_lib::{AbilityDef, AbilityID};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 場景檔中的一格
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CellConfig {
    #[serde(default = "default_movement_cost")]
    pub movement_cost: u32,
    #[serde(default)]
    pub altitude: f32,
    #[serde(default)]
    pub obstruction: Obstruction,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub edge_blockers: EdgeBlockers,
}

impl Default for CellConfig {
    fn default() -> Self {
        CellConfig {
            movement_cost: default_movement_cost(),
            altitude: 0.0,
            obstruction: Obstruction::default(),
            tags: BTreeSet::new(),
            edge_blockers: EdgeBlockers::default(),
        }
    }
}

/// 場景設定：外層列為 y、內層為 x（row-major）
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub cells: Vec<Vec<CellConfig>>,
    #[serde(default)]
    pub factions: BTreeMap<FactionID, Faction>,
    #[serde(default, with = "entityid_key_map")]
    pub entities: BTreeMap<EntityID, EntityMarker>,
}

impl ScenarioConfig {
    pub fn from_toml_str(data: &str) -> Result<Self, Error> {
        let func = "ScenarioConfig::from_toml_str";
        toml::from_str(data).map_err(|e| Error::InvalidParameter {
            func,
            detail: e.to_string(),
        })
    }

    pub fn width(&self) -> usize {
        self.cells.first().map_or(0, |row| row.len())
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }
}

/// 單位模板查詢介面
pub trait UnitTemplateGetter {
    fn get(&self, typ: &UnitTemplateType) -> Option<&UnitTemplate>;
}

impl UnitTemplateGetter for BTreeMap<UnitTemplateType, UnitTemplate> {
    fn get(&self, typ: &UnitTemplateType) -> Option<&UnitTemplate> {
        BTreeMap::get(self, typ)
    }
}

/// 以場景設定建立世界
/// - 能力效果在此驗證（未註冊的效果是載入期錯誤，不會留到施放時）
/// - 實體層級的問題記錄後跳過，不中斷整體載入
pub fn build_world(
    config: &ScenarioConfig,
    templates: &impl UnitTemplateGetter,
    abilities: &BTreeMap<AbilityID, AbilityDef>,
    effects: &EffectTable,
) -> Result<World, Error> {
    let func = "build_world";

    for (id, def) in abilities {
        effects.validate(id, def).map_err(|e| Error::Wrap {
            func,
            source: Box::new(e),
        })?;
    }
    let factions = FactionRegistry::new(config.factions.clone()).map_err(|e| Error::Wrap {
        func,
        source: Box::new(e),
    })?;

    let mut cells = Vec::new();
    for (y, row) in config.cells.iter().enumerate() {
        for (x, cfg) in row.iter().enumerate() {
            cells.push(Cell {
                pos: Pos { x, y },
                movement_cost: cfg.movement_cost,
                altitude: cfg.altitude,
                obstruction: cfg.obstruction,
                tags: cfg.tags.clone(),
                edge_blockers: cfg.edge_blockers,
                neighbours: Vec::new(),
            });
        }
    }
    let mut world = World::new(Grid::new(cells), factions);

    for marker in config.entities.values() {
        let Some(template) = templates.get(&marker.unit_template_type) else {
            log::error!(
                "實體 {} 缺少單位模板 {}，跳過",
                marker.id,
                marker.unit_template_type
            );
            continue;
        };
        if !world.factions.contains(&marker.faction) {
            log::error!("實體 {} 的陣營 {} 不存在，跳過", marker.id, marker.faction);
            continue;
        }
        let entity = match Entity::from_template(marker, template, abilities) {
            Ok(entity) => entity,
            Err(e) => {
                log::error!("實體 {} 建立失敗，跳過：{e}", marker.id);
                continue;
            }
        };
        if let Err(e) = world.place(entity, marker.pos) {
            // 放置失敗：捨棄該實體，其餘照常載入
            log::warn!("{e}");
        }
    }
    Ok(world)
}

fn default_movement_cost() -> u32 {
    1
}

// 讓 BTreeMap<EntityID, EntityMarker> 可以用 string key 序列化
mod entityid_key_map {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        map: &BTreeMap<EntityID, EntityMarker>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let string_map: BTreeMap<String, &EntityMarker> =
            map.iter().map(|(k, v)| (k.to_string(), v)).collect();
        string_map.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<EntityID, EntityMarker>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string_map: BTreeMap<String, EntityMarker> = BTreeMap::deserialize(deserializer)?;
        string_map
            .into_iter()
            .map(|(k, v)| {
                k.parse()
                    .map(|num| (num, v))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
