//! battle.rs：
//! - 戰鬥回合流程與狀態機：同一時間恰有一個狀態，切換時先跑退出鉤子再跑進入鉤子。
//! - 進入鉤子可回傳下一個狀態，形成自動推進鏈（EnterBattle → TurnStart → …）。
//! - 非法輸入（超出範圍、點數不足、空目標）一律靜默忽略，狀態不變。
use crate::*;
use abilities_lib::{DangerType, TargetShape};
use std::collections::{HashMap, VecDeque};
use strum_macros::{Display, EnumIter};

const REACHABLE_COLOR: RGBA = (204, 204, 204, 255); // 淺灰
const PATH_COLOR: RGBA = (178, 178, 178, 255); // 中灰
const HIGHLIGHT_COLOR: RGBA = (127, 127, 127, 255); // 深灰
const HARMFUL_COLOR: RGBA = (255, 127, 127, 255); // 淺紅
const HARMFUL_TARGET_COLOR: RGBA = (230, 76, 76, 255); // 深紅
const HELPFUL_COLOR: RGBA = (127, 255, 127, 255); // 淺綠
const NEUTRAL_COLOR: RGBA = (255, 255, 127, 255); // 淺黃

/// 標記顏色分類，由渲染端對應到實際顏色
#[derive(Debug, Clone, Copy, Display, EnumIter, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum MarkTag {
    Reachable,
    Path,
    Highlight,
    Harmful,
    HarmfulTarget,
    Helpful,
    Neutral,
}

pub const fn mark_color(tag: MarkTag) -> RGBA {
    match tag {
        MarkTag::Reachable => REACHABLE_COLOR,
        MarkTag::Path => PATH_COLOR,
        MarkTag::Highlight => HIGHLIGHT_COLOR,
        MarkTag::Harmful => HARMFUL_COLOR,
        MarkTag::HarmfulTarget => HARMFUL_TARGET_COLOR,
        MarkTag::Helpful => HELPFUL_COLOR,
        MarkTag::Neutral => NEUTRAL_COLOR,
    }
}

/// 能力敵意分類對應的實體標記顏色
pub fn danger_mark(danger: DangerType) -> MarkTag {
    match danger {
        DangerType::Harmful => MarkTag::Harmful,
        DangerType::Neutral => MarkTag::Neutral,
        DangerType::Helpful => MarkTag::Helpful,
    }
}

/// 渲染/標記協作者：純通知，回傳值不影響核心邏輯
pub trait Marker {
    fn mark_cell(&mut self, _pos: Pos, _tag: MarkTag) {}
    fn mark_entity(&mut self, _id: EntityID, _tag: MarkTag) {}
    fn unmark_all(&mut self) {}
    /// 相機聚焦（外部協作者）
    fn focus(&mut self, _point: (f32, f32)) {}
}

/// 不做任何事的標記協作者
pub struct NullMarker;
impl Marker for NullMarker {}

/// 輸入協作者送入的離散事件，每個狀態各自決定如何回應
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    CellHovered(Pos),
    CellUnhovered(Pos),
    CellClicked(Pos),
    EntityClicked(EntityID),
    AbilitySlotSelected(usize),
    Cancel,
    EndTurnRequested,
}

#[derive(Debug)]
pub enum GameState {
    EnterBattle,
    TurnStart {
        unit: EntityID,
    },
    /// 回合中等待指示（取消移動/能力後回到這裡）
    AwaitingInput {
        unit: EntityID,
    },
    MovementAction {
        unit: EntityID,
        reachable: HashMap<Pos, (Cost, Pos)>,
        path: Vec<Pos>,
    },
    AbilityActive {
        unit: EntityID,
        slot: usize,
        range: HashMap<Pos, (Cost, Pos)>,
    },
    Moving {
        unit: EntityID,
        mover: Mover,
    },
    AiTurn {
        unit: EntityID,
    },
    TurnEnd {
        unit: EntityID,
    },
    GameOver {
        winner: Option<FactionID>,
    },
}

impl GameState {
    pub fn name(&self) -> &'static str {
        match self {
            GameState::EnterBattle => "enter_battle",
            GameState::TurnStart { .. } => "turn_start",
            GameState::AwaitingInput { .. } => "awaiting_input",
            GameState::MovementAction { .. } => "movement_action",
            GameState::AbilityActive { .. } => "ability_active",
            GameState::Moving { .. } => "moving",
            GameState::AiTurn { .. } => "ai_turn",
            GameState::TurnEnd { .. } => "turn_end",
            GameState::GameOver { .. } => "game_over",
        }
    }
}

/// 自動推進鏈的保險上限，全 AI 對戰時避免空轉
const MAX_AUTO_TRANSITIONS: usize = 256;

pub struct Battle {
    pub world: World,
    pub effects: EffectTable,
    /// 行動順序：隊首為目前單位，回合結束移到隊尾
    pub initiative: VecDeque<EntityID>,
    pub state: GameState,
    /// 移動內插速度（格/秒），0 代表瞬間移動
    pub move_speed: f32,
}

impl Battle {
    pub fn new(world: World, effects: EffectTable) -> Self {
        Battle {
            world,
            effects,
            initiative: VecDeque::new(),
            state: GameState::EnterBattle,
            move_speed: 0.0,
        }
    }

    pub fn current_unit(&self) -> Option<EntityID> {
        self.initiative.front().copied()
    }

    /// 進入戰鬥：跑 EnterBattle 的進入鉤子並自動推進
    pub fn start(&mut self, marker: &mut dyn Marker) {
        let mut next = self.enter_state(marker);
        let mut guard = 0;
        while let Some(state) = next {
            next = self.switch(state, marker);
            guard += 1;
            if guard > MAX_AUTO_TRANSITIONS {
                log::error!("狀態自動推進超過上限，中斷於 {}", self.state.name());
                break;
            }
        }
    }

    /// 切換狀態並跟隨進入鉤子的自動推進鏈
    pub fn transition(&mut self, state: GameState, marker: &mut dyn Marker) {
        let mut next = self.switch(state, marker);
        let mut guard = 0;
        while let Some(state) = next {
            next = self.switch(state, marker);
            guard += 1;
            if guard > MAX_AUTO_TRANSITIONS {
                log::error!("狀態自動推進超過上限，中斷於 {}", self.state.name());
                break;
            }
        }
    }

    /// 單步切換：退出鉤子 → 換狀態 → 進入鉤子
    fn switch(&mut self, state: GameState, marker: &mut dyn Marker) -> Option<GameState> {
        self.exit_state(marker);
        log::debug!("狀態 {} → {}", self.state.name(), state.name());
        self.state = state;
        self.enter_state(marker)
    }

    /// 退出鉤子：清除標記、中斷進行中的移動內插
    fn exit_state(&mut self, marker: &mut dyn Marker) {
        match &mut self.state {
            GameState::MovementAction { .. } | GameState::AbilityActive { .. } => {
                marker.unmark_all();
            }
            GameState::Moving { mover, .. } => {
                mover.halt();
                marker.unmark_all();
            }
            _ => {}
        }
    }

    /// 進入鉤子：計算快取、標記、回傳自動推進的下一個狀態
    fn enter_state(&mut self, marker: &mut dyn Marker) -> Option<GameState> {
        match &self.state {
            GameState::EnterBattle => {
                self.initiative = initiative_order(&self.world);
                log::info!("戰鬥開始，共 {} 個行動單位", self.initiative.len());
                match self.initiative.front().copied() {
                    None => Some(GameState::GameOver { winner: None }),
                    Some(unit) => Some(GameState::TurnStart { unit }),
                }
            }
            GameState::TurnStart { unit } => {
                let unit = *unit;
                let Some(entity) = self.world.entity_mut(unit) else {
                    return Some(GameState::TurnEnd { unit });
                };
                entity.refill_points();
                let name = entity.name.clone();
                let faction = entity.faction.clone();
                log::info!("單位 {name} 回合開始");
                if let Some(center) = self.world.footprint_center(unit) {
                    marker.focus(center);
                }
                if self.world.factions.is_controllable(&faction) {
                    Some(self.movement_action_state(unit))
                } else {
                    Some(GameState::AiTurn { unit })
                }
            }
            GameState::AwaitingInput { unit } => {
                log::debug!("單位 {} 等待輸入", unit);
                None
            }
            GameState::MovementAction { unit, reachable, .. } => {
                for pos in destination_cells(&self.world, *unit, reachable) {
                    marker.mark_cell(pos, MarkTag::Reachable);
                }
                None
            }
            GameState::AbilityActive { range, .. } => {
                for &pos in range.keys() {
                    marker.mark_cell(pos, MarkTag::Harmful);
                }
                None
            }
            GameState::Moving { .. } => None,
            GameState::AiTurn { unit } => {
                // AI 決策尚未實作：記錄後直接結束回合
                log::info!("AI 單位 {} 回合（跳過）", unit);
                Some(GameState::TurnEnd { unit: *unit })
            }
            GameState::TurnEnd { unit } => {
                let unit = *unit;
                // 先檢查終局
                let factions = self.world.living_unit_factions();
                if factions.len() <= 1 {
                    return Some(GameState::GameOver {
                        winner: factions.into_iter().next(),
                    });
                }
                // 輪替：目前單位移到隊尾，再剔除已死亡的單位
                if self.initiative.front() == Some(&unit) {
                    self.initiative.rotate_left(1);
                }
                self.initiative
                    .retain(|id| self.world.entity(*id).is_some());
                match self.initiative.front().copied() {
                    None => Some(GameState::GameOver { winner: None }),
                    Some(next) => Some(GameState::TurnStart { unit: next }),
                }
            }
            GameState::GameOver { winner } => {
                match winner {
                    Some(faction) => log::info!("戰鬥結束，{faction} 獲勝"),
                    None => log::info!("戰鬥結束"),
                }
                None
            }
        }
    }

    /// 建立移動狀態（計算可移動範圍快取）
    fn movement_action_state(&self, unit: EntityID) -> GameState {
        GameState::MovementAction {
            unit,
            reachable: movable_area(&self.world, unit),
            path: Vec::new(),
        }
    }

    /// 單位是否還有行動（可移動或付得起任一能力）
    pub fn has_actions(&self, unit: EntityID) -> bool {
        if can_move_with_points(&self.world, unit) {
            return true;
        }
        self.world
            .entity(unit)
            .map_or(false, |e| e.can_afford_any_ability())
    }

    /// 輸入事件分派：每個狀態各有一組回應，其他一律忽略
    pub fn handle(&mut self, event: InputEvent, marker: &mut dyn Marker) {
        match &self.state {
            GameState::MovementAction { unit, .. } => {
                let unit = *unit;
                self.handle_movement_action(unit, event, marker);
            }
            GameState::AbilityActive { unit, slot, .. } => {
                let (unit, slot) = (*unit, *slot);
                self.handle_ability_active(unit, slot, event, marker);
            }
            GameState::AwaitingInput { unit } => {
                let unit = *unit;
                self.handle_awaiting_input(unit, event, marker);
            }
            // Moving 期間不接受該單位的移動/能力輸入；其餘狀態沒有輸入
            _ => {}
        }
    }

    fn handle_movement_action(
        &mut self,
        unit: EntityID,
        event: InputEvent,
        marker: &mut dyn Marker,
    ) {
        match event {
            InputEvent::CellHovered(pos) => {
                let GameState::MovementAction { reachable, .. } = &self.state else {
                    return;
                };
                let Some(origin) = self.world.anchor_pos(unit) else {
                    return;
                };
                match anchor_for_cell(&self.world, unit, reachable, pos) {
                    Some(anchor) => {
                        let Ok(path) = reconstruct_path(reachable, origin, anchor) else {
                            return;
                        };
                        for &step in &path {
                            if step != origin {
                                marker.mark_cell(step, MarkTag::Path);
                            }
                        }
                        if let GameState::MovementAction { path: cached, .. } = &mut self.state {
                            *cached = path;
                        }
                    }
                    None => marker.mark_cell(pos, MarkTag::Highlight),
                }
            }
            InputEvent::CellUnhovered(_) => {
                marker.unmark_all();
                let GameState::MovementAction { unit, reachable, .. } = &self.state else {
                    return;
                };
                for pos in destination_cells(&self.world, *unit, reachable) {
                    marker.mark_cell(pos, MarkTag::Reachable);
                }
            }
            InputEvent::CellClicked(pos) => {
                let GameState::MovementAction { reachable, .. } = &self.state else {
                    return;
                };
                let Some(origin) = self.world.anchor_pos(unit) else {
                    return;
                };
                let Some(anchor) = anchor_for_cell(&self.world, unit, reachable, pos) else {
                    return; // 超出範圍：靜默忽略
                };
                let Ok(path) = reconstruct_path(reachable, origin, anchor) else {
                    return;
                };
                if commit_move(&mut self.world, unit, reachable, anchor).is_err() {
                    return; // 點數不足等非法操作：靜默忽略
                }
                let mover = Mover::start(&path, self.move_speed);
                self.transition(GameState::Moving { unit, mover }, marker);
            }
            InputEvent::AbilitySlotSelected(slot) => {
                self.try_activate_ability(unit, slot, marker);
            }
            InputEvent::Cancel => {
                self.transition(GameState::AwaitingInput { unit }, marker);
            }
            InputEvent::EndTurnRequested => {
                self.transition(GameState::TurnEnd { unit }, marker);
            }
            InputEvent::EntityClicked(_) => {}
        }
    }

    fn handle_awaiting_input(
        &mut self,
        unit: EntityID,
        event: InputEvent,
        marker: &mut dyn Marker,
    ) {
        match event {
            InputEvent::EntityClicked(id) if id == unit => {
                let state = self.movement_action_state(unit);
                self.transition(state, marker);
            }
            InputEvent::AbilitySlotSelected(slot) => {
                self.try_activate_ability(unit, slot, marker);
            }
            InputEvent::EndTurnRequested => {
                self.transition(GameState::TurnEnd { unit }, marker);
            }
            _ => {}
        }
    }

    fn handle_ability_active(
        &mut self,
        unit: EntityID,
        slot: usize,
        event: InputEvent,
        marker: &mut dyn Marker,
    ) {
        match event {
            InputEvent::CellHovered(pos) => {
                let Some(def) = self.ability_def(unit, slot) else {
                    return;
                };
                let GameState::AbilityActive { range, .. } = &self.state else {
                    return;
                };
                let cells = target_cells(&self.world, unit, &def, range, pos);
                for &cell in &cells {
                    marker.mark_cell(cell, MarkTag::HarmfulTarget);
                }
                let tag = danger_mark(def.danger);
                for id in target_entities(&self.world, &def, unit, &cells) {
                    marker.mark_entity(id, tag);
                }
            }
            InputEvent::CellUnhovered(_) => {
                marker.unmark_all();
                let GameState::AbilityActive { range, .. } = &self.state else {
                    return;
                };
                for &pos in range.keys() {
                    marker.mark_cell(pos, MarkTag::Harmful);
                }
            }
            InputEvent::CellClicked(pos) => {
                self.try_apply_ability(unit, slot, pos, marker);
            }
            InputEvent::EntityClicked(target) => {
                // 點擊實體等同點擊其錨點格
                let Some(pos) = self.world.anchor_pos(target) else {
                    return;
                };
                self.try_apply_ability(unit, slot, pos, marker);
            }
            InputEvent::AbilitySlotSelected(new_slot) => {
                self.try_activate_ability(unit, new_slot, marker);
            }
            InputEvent::Cancel => {
                self.transition(GameState::AwaitingInput { unit }, marker);
            }
            _ => {}
        }
    }

    fn ability_def(&self, unit: EntityID, slot: usize) -> Option<abilities_lib::AbilityDef> {
        self.world
            .entity(unit)?
            .ability(slot)
            .map(|a| a.def.clone())
    }

    /// 啟動能力：付不起行動點數就靜默忽略
    fn try_activate_ability(&mut self, unit: EntityID, slot: usize, marker: &mut dyn Marker) {
        let Some(entity) = self.world.entity(unit) else {
            return;
        };
        let Some(ability) = entity.ability(slot) else {
            return;
        };
        if ability.def.action_cost > entity.action_points {
            return;
        }
        let range = ability_range(&self.world, unit, &ability.def);
        self.transition(GameState::AbilityActive { unit, slot, range }, marker);
    }

    /// 施放能力：驗證點數與非空目標，套用效果後決定下一個狀態
    fn try_apply_ability(&mut self, unit: EntityID, slot: usize, pos: Pos, marker: &mut dyn Marker) {
        let Some(def) = self.ability_def(unit, slot) else {
            return;
        };
        let Some(entity) = self.world.entity(unit) else {
            return;
        };
        if def.action_cost > entity.action_points {
            return;
        }

        let GameState::AbilityActive { range, .. } = &self.state else {
            return;
        };
        let targets = match def.shape {
            // self 形狀不選格子，直接作用於施放者
            TargetShape::SelfCast => {
                if def.affects.self_target {
                    vec![unit]
                } else {
                    Vec::new()
                }
            }
            _ => {
                let cells = target_cells(&self.world, unit, &def, range, pos);
                target_entities(&self.world, &def, unit, &cells)
            }
        };
        if targets.is_empty() {
            return; // 空目標：不扣點、狀態不變
        }

        if let Some(entity) = self.world.entity_mut(unit) {
            entity.action_points -= def.action_cost;
        }
        let outcome = self.effects.apply(&mut self.world, unit, &targets, &def.effects);
        for msg in &outcome.messages {
            log::info!("{msg}");
        }
        if !outcome.destroyed.is_empty() {
            self.initiative
                .retain(|id| self.world.entity(*id).is_some());
        }

        // 終局判定優先於後續狀態
        let factions = self.world.living_unit_factions();
        if factions.len() <= 1 {
            self.transition(
                GameState::GameOver {
                    winner: factions.into_iter().next(),
                },
                marker,
            );
            return;
        }

        if self.has_actions(unit) {
            self.transition(GameState::AwaitingInput { unit }, marker);
        } else {
            self.transition(GameState::TurnEnd { unit }, marker);
        }
    }

    /// 每 tick 推進：只有 Moving 狀態有進行中的內插
    pub fn update(&mut self, dt: f32, marker: &mut dyn Marker) {
        let unit = match &self.state {
            GameState::Moving { unit, .. } => *unit,
            _ => return,
        };
        let status = match &mut self.state {
            GameState::Moving { mover, .. } => mover.tick(dt),
            _ => return,
        };
        match status {
            MoverStatus::Moving(point) => marker.focus(point),
            MoverStatus::Arrived(_) | MoverStatus::Idle => {
                // 抵達後重新計算移動範圍，還有行動就繼續，否則結束回合
                if self.has_actions(unit) {
                    let state = self.movement_action_state(unit);
                    self.transition(state, marker);
                } else {
                    self.transition(GameState::TurnEnd { unit }, marker);
                }
            }
        }
    }
}

use inner::*;
mod inner {
    use super::*;

    /// 依先攻值遞減排序（同值保持原有相對順序），障礙物不參與
    pub fn initiative_order(world: &World) -> VecDeque<EntityID> {
        let mut units: Vec<&Entity> = world
            .entities()
            .filter(|e| e.kind.acts_in_battle() && e.is_alive())
            .collect();
        units.sort_by_key(|e| std::cmp::Reverse(e.stats.initiative));
        units.into_iter().map(|e| e.id).collect()
    }

    /// 找出 footprint 覆蓋指定格、成本最低的可達錨點
    /// 指到單位自身的格子不算目的地
    pub fn anchor_for_cell(
        world: &World,
        unit: EntityID,
        reachable: &HashMap<Pos, (Cost, Pos)>,
        pos: Pos,
    ) -> Option<Pos> {
        let entity = world.entity(unit)?;
        let cell = world.grid.cell_at(pos)?;
        if entity.occupied.contains(&cell) {
            return None;
        }
        reachable
            .keys()
            .filter(|&&anchor| {
                world
                    .footprint_cells(anchor, entity.size)
                    .map_or(false, |cells| cells.contains(&cell))
            })
            .min_by_key(|&&anchor| (reachable[&anchor].0, anchor))
            .copied()
    }
}
