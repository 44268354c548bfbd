//! movement.rs：
//! - 負責單位移動相關邏輯：可移動範圍、路徑回溯、移動點數扣除與佔用搬移。
//! - 僅處理移動本身，不負責能力判定或回合流程。
//! - 移動動畫以顯式狀態機（Mover）表示，由外部渲染迴圈逐 tick 推進。
use crate::*;
use std::collections::{BTreeSet, HashMap};

/// 提供移動邏輯用的世界視圖，實作 SearchGraph 供路徑搜尋演算法使用
struct MovableView<'a> {
    world: &'a World,
    entity: &'a Entity,
}

impl<'a> SearchGraph for MovableView<'a> {
    /// footprint 放得下的錨點才是合法節點
    fn is_valid(&self, pos: Pos) -> bool {
        self.world.footprint_cells(pos, self.entity.size).is_ok()
    }

    /// 阻擋、高度、邊緣阻擋與切角規則都在 can_move_onto
    fn is_admitted(&self, from: Pos, to: Pos, _total: Cost) -> bool {
        self.world.can_move_onto(self.entity.id, from, to)
    }

    /// 邊成本 = 半步距離 × 目的 footprint 的最大地形倍率
    fn edge_cost(&self, from: Pos, to: Pos) -> Cost {
        let factor = self
            .world
            .footprint_cells(to, self.entity.size)
            .map(|cells| {
                cells
                    .iter()
                    .map(|&c| self.world.grid.cell(c).movement_cost)
                    .max()
                    .unwrap_or(1)
            })
            .unwrap_or(1);
        step_cost(from, to) * factor
    }

    fn neighbours(&self, pos: Pos) -> Vec<Pos> {
        DIRECTIONS
            .iter()
            .filter_map(|&dir| pos.offset(dir))
            .collect()
    }
}

/// 計算指定實體的可移動範圍（錨點 → (累積成本, 前驅錨點)）
/// 預算為實體目前剩餘的移動點數
pub fn movable_area(world: &World, id: EntityID) -> HashMap<Pos, (Cost, Pos)> {
    let Some(entity) = world.entity(id) else {
        return HashMap::new();
    };
    let Some(anchor) = world.anchor_pos(id) else {
        return HashMap::new();
    };
    let view = MovableView { world, entity };
    find_reachable(&view, &[anchor], entity.move_points)
}

/// 可移動範圍覆蓋到的所有格子（扣除實體自身佔用），供標記顯示使用
pub fn destination_cells(world: &World, id: EntityID, area: &HashMap<Pos, (Cost, Pos)>) -> Vec<Pos> {
    let Some(entity) = world.entity(id) else {
        return Vec::new();
    };
    let mut cells = BTreeSet::new();
    for &anchor in area.keys() {
        if let Ok(footprint) = world.footprint_cells(anchor, entity.size) {
            for cell in footprint {
                if !entity.occupied.contains(&cell) {
                    cells.insert(world.grid.cell(cell).pos);
                }
            }
        }
    }
    cells.into_iter().collect()
}

/// 由前驅鏈回溯 from → to 的路徑
pub fn reconstruct_path(
    map: &HashMap<Pos, (Cost, Pos)>,
    from: Pos,
    to: Pos,
) -> Result<Vec<Pos>, Error> {
    let func = "reconstruct_path";

    let mut path = Vec::new();
    let mut current = to;
    while current != from {
        let Some((_, prev)) = map.get(&current) else {
            return Err(Error::NotReachable { func, pos: to });
        };
        path.push(current);
        current = *prev;
    }
    path.push(from);
    path.reverse();
    Ok(path)
}

/// 提交移動：扣除實際路徑成本並搬移佔用
/// 佔用立即更新；位置內插只是顯示層的事（見 Mover）
pub fn commit_move(
    world: &mut World,
    id: EntityID,
    area: &HashMap<Pos, (Cost, Pos)>,
    to: Pos,
) -> Result<Cost, Error> {
    let func = "commit_move";

    let Some(&(cost, _)) = area.get(&to) else {
        return Err(Error::NotReachable { func, pos: to });
    };
    let entity = world.entity(id).ok_or(Error::NoActingEntity {
        func,
        entity_id: id,
    })?;
    if cost > entity.move_points {
        return Err(Error::NotEnoughPoints { func });
    }
    world.relocate(id, to).map_err(|e| Error::Wrap {
        func,
        source: Box::new(e),
    })?;
    if let Some(entity) = world.entity_mut(id) {
        entity.move_points -= cost;
    }
    Ok(cost)
}

/// 實體是否還付得起任何一步移動
pub fn can_move_with_points(world: &World, id: EntityID) -> bool {
    let Some(entity) = world.entity(id) else {
        return false;
    };
    if entity.move_points < ORTHO_STEP {
        return false;
    }
    let Some(anchor) = world.anchor_pos(id) else {
        return false;
    };
    let view = MovableView { world, entity };
    DIRECTIONS.iter().any(|&dir| {
        let Some(next) = anchor.offset(dir) else {
            return false;
        };
        view.is_valid(next)
            && view.edge_cost(anchor, next) <= entity.move_points
            && view.is_admitted(anchor, next, 0)
    })
}

/// 移動內插狀態機：Idle ↔ Interpolating
/// 暫停即「尚未抵達」，下一次 tick 恢復；沒有隱藏的控制流轉移
#[derive(Debug, Clone, PartialEq)]
pub enum Mover {
    Idle,
    Interpolating {
        points: Vec<(f32, f32)>,
        index: usize,
        position: (f32, f32),
        speed: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoverStatus {
    Idle,
    /// 仍在途中，附目前內插位置
    Moving((f32, f32)),
    /// 本次 tick 抵達終點
    Arrived((f32, f32)),
}

impl Mover {
    /// 以路徑建立內插；speed <= 0 代表瞬間移動（第一次 tick 即抵達）
    pub fn start(path: &[Pos], speed: f32) -> Mover {
        let points: Vec<(f32, f32)> = path.iter().map(|p| p.to_point()).collect();
        match points.first().copied() {
            None => Mover::Idle,
            Some(first) => Mover::Interpolating {
                position: first,
                points,
                index: 0,
                speed,
            },
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Mover::Idle)
    }

    /// 中斷移動（狀態退出時呼叫）
    pub fn halt(&mut self) {
        *self = Mover::Idle;
    }

    /// 推進一個 tick，回傳目前狀態；抵達後回到 Idle
    pub fn tick(&mut self, dt: f32) -> MoverStatus {
        let Mover::Interpolating {
            points,
            index,
            position,
            speed,
        } = self
        else {
            return MoverStatus::Idle;
        };

        let goal = points[points.len() - 1];
        if *speed <= 0.0 {
            *self = Mover::Idle;
            return MoverStatus::Arrived(goal);
        }

        let mut remaining = *speed * dt;
        while remaining > 0.0 {
            let target = points[*index];
            let dx = target.0 - position.0;
            let dy = target.1 - position.1;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist <= remaining {
                *position = target;
                remaining -= dist;
                if *index + 1 >= points.len() {
                    *self = Mover::Idle;
                    return MoverStatus::Arrived(goal);
                }
                *index += 1;
            } else {
                position.0 += dx / dist * remaining;
                position.1 += dy / dist * remaining;
                break;
            }
        }
        MoverStatus::Moving(*position)
    }
}
