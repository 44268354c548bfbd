//! targeting.rs：
//! - 負責能力施放範圍、目標形狀解析與目標實體過濾。
//! - 能力傳播不受實體阻擋（與移動不同），只受完全阻擋格與高度差限制。
//! - 形狀解析一律以「施放範圍 ∩ 形狀」為結果，每次施放重新計算，不快取。
use crate::*;
use abilities_lib::{AbilityDef, TargetShape};
use std::collections::{BTreeSet, HashMap};

/// 光束與錐形排除施放者周邊的緩衝距離
const USER_BUFFER: f32 = 0.75;

/// 能力範圍搜尋視圖：高度與完全阻擋限制傳播，實體不阻擋
struct AbilityRangeView<'a> {
    world: &'a World,
    user: &'a Entity,
}

impl<'a> SearchGraph for AbilityRangeView<'a> {
    fn is_valid(&self, pos: Pos) -> bool {
        self.world.grid.get(pos).is_some()
    }

    fn is_admitted(&self, from: Pos, to: Pos, _total: Cost) -> bool {
        if let Some(cell) = self.world.grid.cell_at(to) {
            if self.user.occupied.contains(&cell) {
                return false; // 施放者自身格不是目標
            }
        }
        ability_can_propagate(self.world, from, to)
    }

    fn edge_cost(&self, from: Pos, to: Pos) -> Cost {
        step_cost(from, to) // 能力距離不受地形倍率影響
    }

    fn neighbours(&self, pos: Pos) -> Vec<Pos> {
        DIRECTIONS
            .iter()
            .filter_map(|&dir| pos.offset(dir))
            .collect()
    }
}

/// 作用區域搜尋視圖：自目標格向外擴散，規則同傳播但不排除施放者
struct AreaView<'a> {
    world: &'a World,
}

impl<'a> SearchGraph for AreaView<'a> {
    fn is_valid(&self, pos: Pos) -> bool {
        self.world.grid.get(pos).is_some()
    }

    fn is_admitted(&self, from: Pos, to: Pos, _total: Cost) -> bool {
        ability_can_propagate(self.world, from, to)
    }

    fn edge_cost(&self, from: Pos, to: Pos) -> Cost {
        step_cost(from, to)
    }

    fn neighbours(&self, pos: Pos) -> Vec<Pos> {
        DIRECTIONS
            .iter()
            .filter_map(|&dir| pos.offset(dir))
            .collect()
    }
}

/// 能力的有效施放距離（半步單位）：基礎距離 + 使用者距離加成
pub fn ability_reach(user: &Entity, def: &AbilityDef) -> Cost {
    points_to_cost(def.base_range + user.stats.attack_range)
}

/// 計算能力施放範圍：自使用者 footprint 多起點出發
/// 回傳的範圍不含使用者自身佔用的格子
pub fn ability_range(
    world: &World,
    user_id: EntityID,
    def: &AbilityDef,
) -> HashMap<Pos, (Cost, Pos)> {
    let Some(user) = world.entity(user_id) else {
        return HashMap::new();
    };
    let origins: Vec<Pos> = user
        .occupied
        .iter()
        .map(|&c| world.grid.cell(c).pos)
        .collect();
    let view = AbilityRangeView { world, user };
    let mut range = find_reachable(&view, &origins, ability_reach(user, def));
    for origin in origins {
        range.remove(&origin);
    }
    range
}

/// 以目標格為中心的作用區域（含中心）
pub fn area_cells(world: &World, origin: Pos, radius: u32) -> HashMap<Pos, (Cost, Pos)> {
    let view = AreaView { world };
    find_reachable(&view, &[origin], points_to_cost(radius))
}

/// 解析目標形狀，回傳最終目標格（排序後）
/// 不合法的指向（超出範圍、形狀退化）一律回傳空集合，不報錯
pub fn target_cells(
    world: &World,
    user_id: EntityID,
    def: &AbilityDef,
    range: &HashMap<Pos, (Cost, Pos)>,
    hover: Pos,
) -> Vec<Pos> {
    match &def.shape {
        TargetShape::SelfCast => Vec::new(),
        TargetShape::Point => point_target_cells(world, def, range, hover),
        TargetShape::Burst => {
            if range.contains_key(&hover) {
                range.keys().copied().collect::<BTreeSet<_>>().into_iter().collect()
            } else {
                Vec::new()
            }
        }
        TargetShape::Cone { degree, buffer } => {
            cone_target_cells(world, user_id, def, range, hover, *degree, *buffer)
        }
        TargetShape::Beam { width } => beam_target_cells(world, user_id, def, range, hover, *width),
    }
}

/// 能力是否可作用於實體：依陣營關係與 environment 旗標
pub fn can_target_entity(
    world: &World,
    def: &AbilityDef,
    user_id: EntityID,
    target_id: EntityID,
) -> bool {
    let Some(user) = world.entity(user_id) else {
        return false;
    };
    let Some(target) = world.entity(target_id) else {
        return false;
    };

    if target.kind == EntityKind::Obstacle {
        return def.affects.environment;
    }
    if user_id == target_id {
        return def.affects.self_target;
    }
    match world.factions.relation(&user.faction, &target.faction) {
        Relation::Friendly => def.affects.allies,
        Relation::Enemy => def.affects.enemies,
        Relation::Neutral => def.affects.neutrals,
        Relation::SelfSame => def.affects.self_target,
    }
}

/// 目標格上的可作用實體，依首次出現順序去重
pub fn target_entities(
    world: &World,
    def: &AbilityDef,
    user_id: EntityID,
    cells: &[Pos],
) -> Vec<EntityID> {
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    for &pos in cells {
        for &id in world.occupants_at(pos) {
            if seen.insert(id) && can_target_entity(world, def, user_id, id) {
                result.push(id);
            }
        }
    }
    result
}

use inner::*;
mod inner {
    use super::*;

    /// 能力能否從 from 格傳播到 to 格：完全阻擋與高度差會截斷
    pub fn ability_can_propagate(world: &World, from: Pos, to: Pos) -> bool {
        let (Some(from_cell), Some(to_cell)) = (world.grid.get(from), world.grid.get(to)) else {
            return false;
        };
        if to_cell.obstruction == Obstruction::Full {
            return false;
        }
        (from_cell.altitude - to_cell.altitude).abs() <= ALTITUDE_STEP
    }

    /// point 形狀：area_range == 0 時只取指向格本身（必須在範圍內）
    /// 否則以指向格為中心擴散 area_range，並與施放範圍取交集
    pub fn point_target_cells(
        world: &World,
        def: &AbilityDef,
        range: &HashMap<Pos, (Cost, Pos)>,
        hover: Pos,
    ) -> Vec<Pos> {
        if def.area_range == 0 {
            return if range.contains_key(&hover) {
                vec![hover]
            } else {
                Vec::new()
            };
        }
        if !range.contains_key(&hover) {
            return Vec::new();
        }
        area_cells(world, hover, def.area_range)
            .keys()
            .copied()
            .filter(|pos| range.contains_key(pos))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// cone 形狀：以施放者中心為頂點、指向 hover 的三角楔形
    /// 半角限制在 [10°, 89°]，避免退化為零寬或半平面
    pub fn cone_target_cells(
        world: &World,
        user_id: EntityID,
        def: &AbilityDef,
        range: &HashMap<Pos, (Cost, Pos)>,
        hover: Pos,
        degree: abilities_lib::Degree,
        buffer: f32,
    ) -> Vec<Pos> {
        let Some(user) = world.entity(user_id) else {
            return Vec::new();
        };
        let Some(from) = world.footprint_center(user_id) else {
            return Vec::new();
        };
        let to = hover.to_point();
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let dist = (dx * dx + dy * dy).sqrt();
        if dist == 0.0 {
            return Vec::new();
        }
        let dir = (dx / dist, dy / dist);

        let half_deg = degree.clamp(10, 89) as f32;
        let half_rad = half_deg.to_radians();
        let max_len = (ability_reach(user, def) as f32) / ORTHO_STEP as f32;
        let leg_len = max_len / half_rad.cos();

        let apex = (from.0 + dir.0 * buffer, from.1 + dir.1 * buffer);
        let left = rotate_vec(dir, half_rad);
        let right = rotate_vec(dir, -half_rad);
        let b = (apex.0 + left.0 * leg_len, apex.1 + left.1 * leg_len);
        let c = (apex.0 + right.0 * leg_len, apex.1 + right.1 * leg_len);

        range
            .keys()
            .filter(|pos| point_in_triangle(pos.to_point(), apex, b, c))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// beam 形狀：沿施放者中心 → hover 的線段，收集側向距離在半寬內的格子
    /// 排除施放者周邊緩衝內的格子
    pub fn beam_target_cells(
        world: &World,
        user_id: EntityID,
        def: &AbilityDef,
        range: &HashMap<Pos, (Cost, Pos)>,
        hover: Pos,
        width: f32,
    ) -> Vec<Pos> {
        let Some(user) = world.entity(user_id) else {
            return Vec::new();
        };
        let Some(from) = world.footprint_center(user_id) else {
            return Vec::new();
        };
        let to = hover.to_point();
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let dist = (dx * dx + dy * dy).sqrt();
        if dist == 0.0 {
            return Vec::new();
        }
        let dir = (dx / dist, dy / dist);
        let max_len = (ability_reach(user, def) as f32) / ORTHO_STEP as f32;
        let seg_len = dist.min(max_len);
        let half_width = width / 2.0;

        range
            .keys()
            .filter(|pos| {
                let p = pos.to_point();
                let v = (p.0 - from.0, p.1 - from.1);
                let along = v.0 * dir.0 + v.1 * dir.1;
                if along < USER_BUFFER || along > seg_len {
                    return false;
                }
                let lateral = (v.0 * dir.1 - v.1 * dir.0).abs();
                lateral <= half_width
            })
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 平面向量旋轉
    pub fn rotate_vec(v: (f32, f32), rad: f32) -> (f32, f32) {
        let (s, c) = rad.sin_cos();
        (v.0 * c - v.1 * s, v.0 * s + v.1 * c)
    }
}
