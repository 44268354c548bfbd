//! world.rs：
//! - 戰鬥世界的唯一擁有者：格子圖、實體表、陣營表與佔用索引。
//! - 佔用關係以索引維護（cell → entities 與 entity.occupied），每次搬移交易式重建，
//!   不使用互相持有的參考。
//! - 移動合法性（阻擋、高度、邊緣阻擋、斜角切角）集中於此。
use crate::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 佔用索引：格子 → 佔用實體列表
#[derive(Debug, Default)]
pub struct OccupancyIndex {
    cell_to_entities: HashMap<CellID, Vec<EntityID>>,
}

impl OccupancyIndex {
    pub fn occupants(&self, cell: CellID) -> &[EntityID] {
        self.cell_to_entities
            .get(&cell)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    fn insert(&mut self, cell: CellID, entity: EntityID) {
        let list = self.cell_to_entities.entry(cell).or_default();
        if !list.contains(&entity) {
            list.push(entity);
        }
    }

    fn remove(&mut self, cell: CellID, entity: EntityID) {
        if let Some(list) = self.cell_to_entities.get_mut(&cell) {
            list.retain(|&id| id != entity);
            if list.is_empty() {
                self.cell_to_entities.remove(&cell);
            }
        }
    }
}

#[derive(Debug)]
pub struct World {
    pub grid: Grid,
    pub factions: FactionRegistry,
    entities: BTreeMap<EntityID, Entity>,
    occupancy: OccupancyIndex,
}

impl World {
    pub fn new(grid: Grid, factions: FactionRegistry) -> Self {
        World {
            grid,
            factions,
            entities: BTreeMap::new(),
            occupancy: OccupancyIndex::default(),
        }
    }

    pub fn entity(&self, id: EntityID) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityID) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// 依 id 排序走訪，結果可重現
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn occupants(&self, cell: CellID) -> &[EntityID] {
        self.occupancy.occupants(cell)
    }

    pub fn occupants_at(&self, pos: Pos) -> &[EntityID] {
        self.grid
            .cell_at(pos)
            .map(|cell| self.occupancy.occupants(cell))
            .unwrap_or(&[])
    }

    /// 位置上的第一個實體
    pub fn entity_at(&self, pos: Pos) -> Option<EntityID> {
        self.occupants_at(pos).first().copied()
    }

    /// 實體 footprint 的錨點（左上角）位置
    pub fn anchor_pos(&self, id: EntityID) -> Option<Pos> {
        let entity = self.entity(id)?;
        let cell = *entity.occupied.first()?;
        Some(self.grid.cell(cell).pos)
    }

    /// footprint 的世界座標中心
    pub fn footprint_center(&self, id: EntityID) -> Option<(f32, f32)> {
        let entity = self.entity(id)?;
        let anchor = self.anchor_pos(id)?;
        let (w, h) = entity.size;
        Some((
            anchor.x as f32 + (w as f32 - 1.0) / 2.0,
            anchor.y as f32 + (h as f32 - 1.0) / 2.0,
        ))
    }

    /// 計算以 origin 為錨點、w × h 的 footprint 格子
    /// 順序：先沿原點列向右，再沿每一行向下；缺格（地圖邊緣）回傳錯誤
    pub fn footprint_cells(&self, origin: Pos, size: (u32, u32)) -> Result<Vec<CellID>, Error> {
        let func = "World::footprint_cells";

        let (w, h) = size;
        let mut cells = Vec::with_capacity((w * h) as usize);
        for dx in 0..w {
            let pos = Pos {
                x: origin.x + dx as usize,
                y: origin.y,
            };
            let cell = self
                .grid
                .cell_at(pos)
                .ok_or(Error::NoCellAtPos { func, pos })?;
            cells.push(cell);
        }
        for dx in 0..w {
            for dy in 1..h {
                let pos = Pos {
                    x: origin.x + dx as usize,
                    y: origin.y + dy as usize,
                };
                let cell = self
                    .grid
                    .cell_at(pos)
                    .ok_or(Error::NoCellAtPos { func, pos })?;
                cells.push(cell);
            }
        }
        Ok(cells)
    }

    /// 格子對指定實體而言是否被阻擋（其他實體、格子阻擋種類、不可通行地形）
    pub fn cell_obstructed_for(&self, entity: &Entity, cell_id: CellID) -> bool {
        for &other_id in self.occupancy.occupants(cell_id) {
            if other_id == entity.id {
                continue;
            }
            if let Some(other) = self.entity(other_id) {
                if other.obstructs && entity.shares_altitude_with(other) {
                    return true;
                }
            }
        }

        let cell = self.grid.cell(cell_id);
        // 實體對格子的全部阻擋標籤免疫時，無視格子本身的阻擋
        let immune = !cell.tags.is_empty() && cell.tags.is_subset(&entity.immunities);
        if immune {
            return false;
        }
        if cell.movement_cost == 0 {
            return true;
        }
        match cell.obstruction {
            Obstruction::Full => true,
            Obstruction::Altitude => entity.altitude == 0.0,
            Obstruction::None => false,
        }
    }

    /// 實體能否從目前 footprint 的高度進入目標格
    pub fn can_access_altitude(&self, entity: &Entity, current: &[CellID], target: &Cell) -> bool {
        let mut max_alt = f32::NEG_INFINITY;
        let mut min_alt = f32::INFINITY;
        for &cell in current {
            let alt = self.grid.cell(cell).altitude;
            max_alt = max_alt.max(alt);
            min_alt = min_alt.min(alt);
        }

        // 飛行單位以自身高度跨越
        if entity.altitude > 0.0 && entity.altitude + max_alt >= target.altitude {
            return true;
        }

        (max_alt - target.altitude).abs() <= ALTITUDE_STEP
            || (min_alt - target.altitude).abs() <= ALTITUDE_STEP
    }

    /// 斜角移動的切角檢查：兩個直角相鄰 footprint 必須無阻擋、可達高度、未被邊緣阻擋
    fn diagonal_movement_blocked(
        &self,
        entity: &Entity,
        current: &[CellID],
        from: Pos,
        to: Pos,
    ) -> bool {
        let dir = from.direction_to(to);
        let checks = [
            (Pos { x: to.x, y: from.y }, (dir.0, 0)),
            (Pos { x: from.x, y: to.y }, (0, dir.1)),
        ];
        for (ortho, step_dir) in checks {
            let cells = match self.footprint_cells(ortho, entity.size) {
                Ok(cells) => cells,
                Err(_) => return true, // 地圖邊緣視同阻擋
            };
            for cell in cells {
                if entity.occupied.contains(&cell) {
                    continue;
                }
                if self.cell_obstructed_for(entity, cell) {
                    return true;
                }
                if !self.can_access_altitude(entity, current, self.grid.cell(cell)) {
                    return true;
                }
                if self.grid.cell(cell).edge_blockers.blocks_entry(step_dir) {
                    return true;
                }
            }
        }
        false
    }

    /// 實體的 footprint 能否從 from 錨點移到相鄰的 to 錨點
    pub fn can_move_onto(&self, id: EntityID, from: Pos, to: Pos) -> bool {
        let Some(entity) = self.entity(id) else {
            return false;
        };
        let Ok(target_cells) = self.footprint_cells(to, entity.size) else {
            return false; // 超出地圖
        };
        let Ok(current_cells) = self.footprint_cells(from, entity.size) else {
            return false;
        };

        let dir = from.direction_to(to);
        for &cell in &target_cells {
            if entity.occupied.contains(&cell) {
                continue;
            }
            if self.cell_obstructed_for(entity, cell) {
                return false;
            }
            if !self.can_access_altitude(entity, &current_cells, self.grid.cell(cell)) {
                return false;
            }
            if self.grid.cell(cell).edge_blockers.blocks_entry(dir) {
                return false;
            }
        }

        // 斜角不可切角
        if dir.0 != 0 && dir.1 != 0 {
            return !self.diagonal_movement_blocked(entity, &current_cells, from, to);
        }

        true
    }

    /// 放置實體：碰撞或缺格即為放置失敗（呼叫端記錄後跳過該實體）
    pub fn place(&mut self, mut entity: Entity, origin: Pos) -> Result<EntityID, Error> {
        let func = "World::place";

        let id = entity.id;
        let footprint =
            self.footprint_cells(origin, entity.size)
                .map_err(|_| Error::PlacementFailed {
                    func,
                    entity_id: id,
                    pos: origin,
                })?;
        for &cell in &footprint {
            if self.cell_obstructed_for(&entity, cell) {
                return Err(Error::PlacementFailed {
                    func,
                    entity_id: id,
                    pos: origin,
                });
            }
        }

        entity.occupied = footprint.clone();
        self.entities.insert(id, entity);
        for cell in footprint {
            self.occupancy.insert(cell, id);
        }
        Ok(id)
    }

    /// 移除實體並清除其所有佔用
    pub fn remove(&mut self, id: EntityID) -> Option<Entity> {
        let mut entity = self.entities.remove(&id)?;
        for cell in entity.occupied.drain(..) {
            self.occupancy.remove(cell, id);
        }
        Some(entity)
    }

    /// 交易式搬移：先驗證新 footprint，再清除舊佔用、寫入新佔用
    /// 不會留下殘缺的佔用狀態
    pub fn relocate(&mut self, id: EntityID, origin: Pos) -> Result<(), Error> {
        let func = "World::relocate";

        let entity = self.entity(id).ok_or(Error::NoActingEntity {
            func,
            entity_id: id,
        })?;
        let size = entity.size;
        let new_cells = self
            .footprint_cells(origin, size)
            .map_err(|e| Error::Wrap {
                func,
                source: Box::new(e),
            })?;

        let entity = self.entities.get_mut(&id).ok_or(Error::NoActingEntity {
            func,
            entity_id: id,
        })?;
        let old_cells = std::mem::replace(&mut entity.occupied, new_cells.clone());
        for cell in old_cells {
            self.occupancy.remove(cell, id);
        }
        for cell in new_cells {
            self.occupancy.insert(cell, id);
        }
        Ok(())
    }

    /// 場上存活單位所屬的陣營集合（障礙物不計），用於終局判定
    pub fn living_unit_factions(&self) -> BTreeSet<FactionID> {
        self.entities
            .values()
            .filter(|e| e.kind.acts_in_battle() && e.is_alive())
            .map(|e| e.faction.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_world(width: usize, height: usize) -> World {
        let factions = BTreeMap::from([
            ("heroes".to_string(), Faction::default()),
            ("bandits".to_string(), Faction::default()),
        ]);
        World::new(
            open_grid(width, height),
            FactionRegistry::new(factions).unwrap(),
        )
    }

    fn test_entity(id: EntityID, size: (u32, u32)) -> Entity {
        let marker = EntityMarker {
            id,
            unit_template_type: "knight".to_string(),
            faction: "heroes".to_string(),
            pos: Pos { x: 0, y: 0 },
            name: None,
        };
        let template = UnitTemplate {
            name: "knight".to_string(),
            size,
            stats: BaseStats {
                max_hp: 10,
                move_points: 3,
                action_points: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        Entity::from_template(&marker, &template, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_footprint_cells_order() {
        let world = test_world(4, 4);
        let cells = world
            .footprint_cells(Pos { x: 1, y: 1 }, (2, 2))
            .unwrap();
        let positions: Vec<Pos> = cells.iter().map(|&c| world.grid.cell(c).pos).collect();
        // 先沿原點列向右，再每行向下
        assert_eq!(
            positions,
            vec![
                Pos { x: 1, y: 1 },
                Pos { x: 2, y: 1 },
                Pos { x: 1, y: 2 },
                Pos { x: 2, y: 2 },
            ]
        );
    }

    #[test]
    fn test_footprint_cells_off_map() {
        let world = test_world(3, 3);
        // 2×2 放在右下角缺格
        let result = world.footprint_cells(Pos { x: 2, y: 2 }, (2, 2));
        assert!(matches!(result, Err(Error::NoCellAtPos { .. })));
    }

    #[test]
    fn test_place_sets_backrefs() {
        let mut world = test_world(4, 4);
        let id = world
            .place(test_entity(1, (2, 2)), Pos { x: 0, y: 0 })
            .unwrap();

        let entity = world.entity(id).unwrap();
        assert_eq!(entity.occupied.len(), 4); // w × h
        for &cell in &entity.occupied.clone() {
            let occupants = world.occupants(cell);
            assert_eq!(occupants.iter().filter(|&&e| e == id).count(), 1);
        }
        assert_eq!(world.entity_at(Pos { x: 1, y: 1 }), Some(id));
        assert_eq!(world.entity_at(Pos { x: 2, y: 2 }), None);
    }

    #[test]
    fn test_place_fails_at_edge() {
        let mut world = test_world(3, 3);
        let result = world.place(test_entity(1, (2, 2)), Pos { x: 2, y: 0 });
        assert!(matches!(result, Err(Error::PlacementFailed { .. })));
        // 失敗不留下任何佔用
        assert_eq!(world.entity_at(Pos { x: 2, y: 0 }), None);
        assert!(world.entity(1).is_none());
    }

    #[test]
    fn test_place_fails_on_obstructing_entity() {
        let mut world = test_world(4, 4);
        world
            .place(test_entity(1, (1, 1)), Pos { x: 1, y: 1 })
            .unwrap();
        let result = world.place(test_entity(2, (2, 2)), Pos { x: 0, y: 0 });
        assert!(matches!(result, Err(Error::PlacementFailed { .. })));
    }

    #[test]
    fn test_place_allows_different_altitude() {
        let mut world = test_world(4, 4);
        world
            .place(test_entity(1, (1, 1)), Pos { x: 1, y: 1 })
            .unwrap();
        let mut flyer = test_entity(2, (1, 1));
        flyer.altitude = 1.0;
        // 高度不同者可共享格子
        assert!(world.place(flyer, Pos { x: 1, y: 1 }).is_ok());
    }

    #[test]
    fn test_relocate_atomicity() {
        let mut world = test_world(5, 5);
        let id = world
            .place(test_entity(1, (2, 2)), Pos { x: 0, y: 0 })
            .unwrap();
        let old_cells = world.entity(id).unwrap().occupied.clone();

        world.relocate(id, Pos { x: 2, y: 2 }).unwrap();

        // 舊 footprint 不再有殘留佔用
        for cell in old_cells {
            assert!(world.occupants(cell).is_empty());
        }
        // 新 footprint 與 entity.occupied 完全一致
        let entity = world.entity(id).unwrap();
        let expected = world
            .footprint_cells(Pos { x: 2, y: 2 }, (2, 2))
            .unwrap();
        assert_eq!(entity.occupied, expected);
        for &cell in &expected {
            assert_eq!(world.occupants(cell), &[id]);
        }
    }

    #[test]
    fn test_relocate_off_map_keeps_state() {
        let mut world = test_world(3, 3);
        let id = world
            .place(test_entity(1, (1, 1)), Pos { x: 1, y: 1 })
            .unwrap();
        let result = world.relocate(id, Pos { x: 5, y: 5 });
        assert!(result.is_err());
        // 失敗時原佔用不變
        assert_eq!(world.entity_at(Pos { x: 1, y: 1 }), Some(id));
    }

    #[test]
    fn test_cell_obstructed_by_full_and_altitude() {
        let mut world = test_world(3, 3);
        let cell_id = world.grid.cell_at(Pos { x: 1, y: 1 }).unwrap();

        let mut cells: Vec<Cell> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Cell::plain(Pos { x, y })))
            .collect();
        cells[4].obstruction = Obstruction::Altitude; // (1,1)
        world.grid = Grid::new(cells);

        let ground = test_entity(1, (1, 1));
        let mut flyer = test_entity(2, (1, 1));
        flyer.altitude = 1.0;
        // Altitude 阻擋只擋地面單位
        assert!(world.cell_obstructed_for(&ground, cell_id));
        assert!(!world.cell_obstructed_for(&flyer, cell_id));
    }

    #[test]
    fn test_cell_obstruction_immunity() {
        let mut world = test_world(3, 3);
        let mut cells: Vec<Cell> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Cell::plain(Pos { x, y })))
            .collect();
        cells[4].obstruction = Obstruction::Full;
        cells[4].tags = BTreeSet::from(["water".to_string()]);
        world.grid = Grid::new(cells);
        let cell_id = world.grid.cell_at(Pos { x: 1, y: 1 }).unwrap();

        let walker = test_entity(1, (1, 1));
        assert!(world.cell_obstructed_for(&walker, cell_id));

        let mut swimmer = test_entity(2, (1, 1));
        swimmer.immunities = BTreeSet::from(["water".to_string()]);
        assert!(!world.cell_obstructed_for(&swimmer, cell_id));
    }

    #[test]
    fn test_impassable_terrain_cost_zero() {
        let mut world = test_world(3, 3);
        let mut cells: Vec<Cell> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Cell::plain(Pos { x, y })))
            .collect();
        cells[4].movement_cost = 0;
        world.grid = Grid::new(cells);
        let cell_id = world.grid.cell_at(Pos { x: 1, y: 1 }).unwrap();

        let walker = test_entity(1, (1, 1));
        assert!(world.cell_obstructed_for(&walker, cell_id));
    }

    #[test]
    fn test_can_access_altitude() {
        let mut world = test_world(3, 1);
        let mut cells: Vec<Cell> = (0..3).map(|x| Cell::plain(Pos { x, y: 0 })).collect();
        cells[1].altitude = 0.5;
        cells[2].altitude = 2.0;
        world.grid = Grid::new(cells);

        let id = world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        let entity = world.entity(id).unwrap();
        let current = entity.occupied.clone();

        // 高度差 0.5 可通行，2.0 不可
        let step = world.grid.get(Pos { x: 1, y: 0 }).unwrap();
        assert!(world.can_access_altitude(entity, &current, step));
        let cliff = world.grid.get(Pos { x: 2, y: 0 }).unwrap();
        assert!(!world.can_access_altitude(entity, &current, cliff));

        // 飛行單位以自身高度跨越
        let mut flyer = test_entity(2, (1, 1));
        flyer.altitude = 2.0;
        assert!(world.can_access_altitude(&flyer, &current, cliff));
    }

    #[test]
    fn test_can_move_onto_diagonal_corner_blocked() {
        let mut world = test_world(3, 3);
        let mut cells: Vec<Cell> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Cell::plain(Pos { x, y })))
            .collect();
        // (1,0) 與 (0,1) 都設為完全阻擋，(1,1) 本身可走
        cells[1].obstruction = Obstruction::Full;
        cells[3].obstruction = Obstruction::Full;
        world.grid = Grid::new(cells);

        let id = world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        // 斜角目的地本身沒有阻擋，但兩側直角格都被擋 → 禁止切角
        assert!(!world.can_move_onto(id, Pos { x: 0, y: 0 }, Pos { x: 1, y: 1 }));
    }

    #[test]
    fn test_can_move_onto_diagonal_one_corner_blocked() {
        let mut world = test_world(3, 3);
        let mut cells: Vec<Cell> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Cell::plain(Pos { x, y })))
            .collect();
        // 只擋 (1,0)，依切角規則單側阻擋即禁止
        cells[1].obstruction = Obstruction::Full;
        world.grid = Grid::new(cells);

        let id = world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        assert!(!world.can_move_onto(id, Pos { x: 0, y: 0 }, Pos { x: 1, y: 1 }));
        // 直走繞路仍可
        assert!(world.can_move_onto(id, Pos { x: 0, y: 0 }, Pos { x: 0, y: 1 }));
    }

    #[test]
    fn test_can_move_onto_edge_blockers() {
        let mut world = test_world(3, 1);
        let mut cells: Vec<Cell> = (0..3).map(|x| Cell::plain(Pos { x, y: 0 })).collect();
        // (1,0) 禁止從左側進入
        cells[1].edge_blockers.left = true;
        world.grid = Grid::new(cells);

        let id = world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        assert!(!world.can_move_onto(id, Pos { x: 0, y: 0 }, Pos { x: 1, y: 0 }));

        // 反方向（從右進入）不受限
        let mut world2 = test_world(3, 1);
        let mut cells: Vec<Cell> = (0..3).map(|x| Cell::plain(Pos { x, y: 0 })).collect();
        cells[1].edge_blockers.left = true;
        world2.grid = Grid::new(cells);
        let id2 = world2
            .place(test_entity(1, (1, 1)), Pos { x: 2, y: 0 })
            .unwrap();
        assert!(world2.can_move_onto(id2, Pos { x: 2, y: 0 }, Pos { x: 1, y: 0 }));
    }

    #[test]
    fn test_can_move_onto_blocked_by_entity() {
        let mut world = test_world(3, 1);
        world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        world
            .place(test_entity(2, (1, 1)), Pos { x: 1, y: 0 })
            .unwrap();
        assert!(!world.can_move_onto(1, Pos { x: 0, y: 0 }, Pos { x: 1, y: 0 }));
    }

    #[test]
    fn test_living_unit_factions_ignores_obstacles() {
        let mut world = test_world(4, 1);
        world
            .place(test_entity(1, (1, 1)), Pos { x: 0, y: 0 })
            .unwrap();
        let mut obstacle = test_entity(2, (1, 1));
        obstacle.kind = EntityKind::Obstacle;
        obstacle.faction = "bandits".to_string();
        world.place(obstacle, Pos { x: 2, y: 0 }).unwrap();

        let factions = world.living_unit_factions();
        assert_eq!(factions, BTreeSet::from(["heroes".to_string()]));
    }
}
