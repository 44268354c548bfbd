use serde::{Deserialize, Serialize};

mod action;
mod battle;
mod entity;
mod error;
mod faction;
mod grid;
mod loader;
mod world;

pub use action::*;
pub use battle::*;
pub use entity::*;
pub use error::*;
pub use faction::*;
pub use grid::*;
pub use loader::*;
pub use world::*;

pub type EntityID = u64;
pub type FactionID = String;
pub type UnitTemplateType = String;
pub type CellID = usize;
pub type RGBA = (u8, u8, u8, u8);

/// 成本以半步為單位：直走 2、斜走 3（即 1 與 1.5 移動點）
/// 斜走成本刻意取 1.5 而非 √2，整數可精確表示
pub type Cost = u32;

pub const ORTHO_STEP: Cost = 2;
pub const DIAG_STEP: Cost = 3;

/// 地面單位可跨越的高度差
pub const ALTITUDE_STEP: f32 = 0.5;

/// 將移動點數換算為半步成本
pub const fn points_to_cost(points: u32) -> Cost {
    points * ORTHO_STEP
}

#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Pos {
    pub x: usize,
    pub y: usize,
}

impl Pos {
    /// 格子中心的世界座標
    pub fn to_point(self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }

    /// 依方向位移，超出左上邊界回傳 None
    pub fn offset(self, dir: (isize, isize)) -> Option<Pos> {
        let x = self.x as isize + dir.0;
        let y = self.y as isize + dir.1;
        if x < 0 || y < 0 {
            return None;
        }
        Some(Pos {
            x: x as usize,
            y: y as usize,
        })
    }

    /// 回傳指向另一格的方向（各軸 -1/0/1）
    pub fn direction_to(self, other: Pos) -> (isize, isize) {
        let sign = |a: usize, b: usize| {
            if b > a {
                1
            } else if b < a {
                -1
            } else {
                0
            }
        };
        (sign(self.x, other.x), sign(self.y, other.y))
    }
}
