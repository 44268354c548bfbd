//! effect.rs：
//! - 效果以「tag + 倍率」的值物件宣告，載入時解析為套用函式（registry），
//!   不在施放時以名稱動態產生物件。
//! - 套用順序嚴格依宣告順序：effects[0] 最先作用。
//! - 死亡判定在全部效果套用完後統一收割。
use crate::*;
use abilities_lib::{AbilityDef, AbilityID, EffectKind, EffectSpec};
use std::collections::BTreeMap;

type EffectFn = fn(&mut World, EntityID, EntityID, f32) -> Option<String>;

#[derive(Debug, Default)]
pub struct EffectOutcome {
    pub messages: Vec<String>,
    pub destroyed: Vec<EntityID>,
}

/// 效果 registry：EffectKind → 套用函式
pub struct EffectTable {
    pub(crate) appliers: BTreeMap<EffectKind, EffectFn>,
}

impl EffectTable {
    /// 內建效果表
    pub fn standard() -> Self {
        let mut appliers = BTreeMap::new();
        appliers.insert(EffectKind::Damage, apply_damage as EffectFn);
        appliers.insert(EffectKind::Heal, apply_heal as EffectFn);
        appliers.insert(EffectKind::Slow, apply_slow as EffectFn);
        appliers.insert(EffectKind::Haste, apply_haste as EffectFn);
        appliers.insert(EffectKind::Exhaust, apply_exhaust as EffectFn);
        EffectTable { appliers }
    }

    /// 載入時驗證能力的所有效果都有對應的套用函式
    /// 未註冊的效果在這裡失敗，而不是等到施放時
    pub fn validate(&self, ability_id: &AbilityID, def: &AbilityDef) -> Result<(), Error> {
        let func = "EffectTable::validate";

        for spec in &def.effects {
            if !self.appliers.contains_key(&spec.kind) {
                return Err(Error::UnknownEffect {
                    func,
                    ability_id: ability_id.clone(),
                    kind: spec.kind.to_string(),
                });
            }
        }
        Ok(())
    }

    /// 依宣告順序將效果套用到所有目標實體
    /// 全部套用後收割 hp <= 0 的實體（移除佔用並自世界移除）
    pub fn apply(
        &self,
        world: &mut World,
        user: EntityID,
        targets: &[EntityID],
        effects: &[EffectSpec],
    ) -> EffectOutcome {
        let mut outcome = EffectOutcome::default();

        for spec in effects {
            let Some(apply) = self.appliers.get(&spec.kind) else {
                // validate 應已擋下；防衛性跳過並記錄
                log::error!("效果 {} 未註冊，跳過", spec.kind);
                continue;
            };
            for &target in targets {
                if let Some(msg) = apply(world, user, target, spec.multiplier) {
                    outcome.messages.push(msg);
                }
            }
        }

        let dead: Vec<EntityID> = targets
            .iter()
            .copied()
            .filter(|&id| world.entity(id).map_or(false, |e| !e.is_alive()))
            .collect();
        for id in dead {
            if let Some(entity) = world.remove(id) {
                log::info!("單位 {} 被擊倒", entity.name);
                outcome.messages.push(format!("單位 {} 被擊倒", entity.name));
                outcome.destroyed.push(id);
            }
        }
        outcome
    }
}

use inner::*;
mod inner {
    use super::*;

    /// 傷害 = 使用者威力 × 倍率 - 目標防禦，至少 1 點
    pub fn apply_damage(
        world: &mut World,
        user: EntityID,
        target: EntityID,
        multiplier: f32,
    ) -> Option<String> {
        let power = world.entity(user)?.stats.damage;
        let raw = power * multiplier;
        let entity = world.entity_mut(target)?;
        let reduced = (raw - entity.stats.defense).clamp(1.0, raw.max(1.0));
        let old_hp = entity.hp;
        entity.hp -= reduced.round() as i32;
        Some(format!("單位 {} HP: {old_hp} → {}", entity.name, entity.hp))
    }

    /// 治療 = 使用者威力 × 倍率，不超過 max_hp
    pub fn apply_heal(
        world: &mut World,
        user: EntityID,
        target: EntityID,
        multiplier: f32,
    ) -> Option<String> {
        let power = world.entity(user)?.stats.damage;
        let amount = (power * multiplier).round() as i32;
        let entity = world.entity_mut(target)?;
        let old_hp = entity.hp;
        entity.hp = (entity.hp + amount).min(entity.max_hp);
        Some(format!("單位 {} HP: {old_hp} → {}", entity.name, entity.hp))
    }

    /// 降低本回合移動點數（以移動點為單位）
    pub fn apply_slow(
        world: &mut World,
        _user: EntityID,
        target: EntityID,
        multiplier: f32,
    ) -> Option<String> {
        let entity = world.entity_mut(target)?;
        let amount = points_to_cost(multiplier.round().max(0.0) as u32);
        entity.move_points = entity.move_points.saturating_sub(amount);
        Some(format!(
            "單位 {} 移動點數剩餘 {}",
            entity.name, entity.move_points
        ))
    }

    /// 增加本回合移動點數
    pub fn apply_haste(
        world: &mut World,
        _user: EntityID,
        target: EntityID,
        multiplier: f32,
    ) -> Option<String> {
        let entity = world.entity_mut(target)?;
        let amount = points_to_cost(multiplier.round().max(0.0) as u32);
        entity.move_points += amount;
        Some(format!(
            "單位 {} 移動點數剩餘 {}",
            entity.name, entity.move_points
        ))
    }

    /// 扣除行動點數
    pub fn apply_exhaust(
        world: &mut World,
        _user: EntityID,
        target: EntityID,
        multiplier: f32,
    ) -> Option<String> {
        let entity = world.entity_mut(target)?;
        let amount = multiplier.round().max(0.0) as u32;
        entity.action_points = entity.action_points.saturating_sub(amount);
        Some(format!(
            "單位 {} 行動點數剩餘 {}",
            entity.name, entity.action_points
        ))
    }
}
