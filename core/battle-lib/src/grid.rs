//! grid.rs：
//! - 定義格子（Cell）靜態資料與格子圖（Grid），包含鄰接、距離與空間查詢。
//! - 不處理實體佔用（見 world.rs）、不處理尋路（見 action/algo.rs）。
//! - 格子於載入時建立，鄰接表只計算一次，戰鬥期間不增刪格子。
use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use strum_macros::{Display, EnumIter, EnumString};

/// 八方向：先直後斜
pub const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// 格子的阻擋種類
/// - Altitude 只擋地面單位（altitude == 0）
/// - Full 擋所有單位
#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, Default, EnumString, Display, EnumIter, PartialEq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Obstruction {
    #[default]
    None,
    Altitude,
    Full,
}

/// 方向性進入阻擋：單位不能「從被擋的方向」進入此格（離開不受限）
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
pub struct EdgeBlockers {
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub down: bool,
}

impl EdgeBlockers {
    /// dir 為移動方向；y 軸向下為正
    /// 向右移動（dir.0 == 1）會從左側進入此格，受 left 阻擋
    pub fn blocks_entry(&self, dir: (isize, isize)) -> bool {
        if dir.0 == 1 && self.left {
            return true;
        }
        if dir.0 == -1 && self.right {
            return true;
        }
        if dir.1 == 1 && self.up {
            return true;
        }
        if dir.1 == -1 && self.down {
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub pos: Pos,
    /// 移動成本倍率，0 代表不可通行
    pub movement_cost: u32,
    pub altitude: f32,
    pub obstruction: Obstruction,
    /// 阻擋標籤，實體可對特定標籤免疫
    pub tags: BTreeSet<String>,
    pub edge_blockers: EdgeBlockers,
    /// 八方向鄰接，由 Grid::new 計算一次後不再變動
    pub neighbours: Vec<CellID>,
}

impl Cell {
    pub fn plain(pos: Pos) -> Self {
        Cell {
            pos,
            movement_cost: 1,
            ..Default::default()
        }
    }
}

/// 相鄰兩格的半步成本（直 2、斜 3）
pub fn step_cost(a: Pos, b: Pos) -> Cost {
    if a.x != b.x && a.y != b.y {
        DIAG_STEP
    } else {
        ORTHO_STEP
    }
}

/// 自訂距離：直走 1、斜走 1.5（max + 0.5 * min）
pub fn custom_distance(a: Pos, b: Pos) -> f32 {
    let dx = a.x.abs_diff(b.x) as f32;
    let dy = a.y.abs_diff(b.y) as f32;
    dx.max(dy) + dx.min(dy) * 0.5
}

/// 曼哈頓距離：不允許斜走時使用
pub fn manhattan_distance(a: Pos, b: Pos) -> usize {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

/// 柴比雪夫距離：斜走與直走皆算 1
pub fn chebyshev_distance(a: Pos, b: Pos) -> usize {
    a.x.abs_diff(b.x).max(a.y.abs_diff(b.y))
}

/// 射線查詢的命中結果，依距離排序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub cell: CellID,
    pub distance: f32,
}

/// 格子圖：arena 索引 + 位置索引
#[derive(Debug, Default)]
pub struct Grid {
    cells: Vec<Cell>,
    pos_index: HashMap<Pos, CellID>,
}

impl Grid {
    /// 建立格子圖並計算一次八方向鄰接
    pub fn new(mut cells: Vec<Cell>) -> Self {
        let pos_index: HashMap<Pos, CellID> =
            cells.iter().enumerate().map(|(i, c)| (c.pos, i)).collect();
        for cell in cells.iter_mut() {
            cell.neighbours = DIRECTIONS
                .iter()
                .filter_map(|&dir| cell.pos.offset(dir))
                .filter_map(|pos| pos_index.get(&pos).copied())
                .collect();
        }
        Grid { cells, pos_index }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellID) -> &Cell {
        &self.cells[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellID, &Cell)> {
        self.cells.iter().enumerate()
    }

    pub fn cell_at(&self, pos: Pos) -> Option<CellID> {
        self.pos_index.get(&pos).copied()
    }

    pub fn get(&self, pos: Pos) -> Option<&Cell> {
        self.cell_at(pos).map(|id| self.cell(id))
    }

    /// 取得包含世界座標點的格子（格子以中心為座標、邊長 1）
    pub fn cell_at_point(&self, point: (f32, f32)) -> Option<CellID> {
        let x = point.0.round();
        let y = point.1.round();
        if x < 0.0 || y < 0.0 {
            return None;
        }
        self.cell_at(Pos {
            x: x as usize,
            y: y as usize,
        })
    }

    /// 取得與矩形（世界座標，含邊界）重疊的格子，依位置排序
    pub fn cells_in_rect(&self, min: (f32, f32), max: (f32, f32)) -> Vec<CellID> {
        let x0 = min.0.ceil().max(0.0) as usize;
        let y0 = min.1.ceil().max(0.0) as usize;
        if max.0 < 0.0 || max.1 < 0.0 {
            return Vec::new();
        }
        let x1 = max.0.floor() as usize;
        let y1 = max.1.floor() as usize;
        let mut result = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(id) = self.cell_at(Pos { x, y }) {
                    result.push(id);
                }
            }
        }
        result
    }

    /// 取得圓內（含邊界）的格子，依位置排序
    pub fn cells_in_circle(&self, center: (f32, f32), radius: f32) -> Vec<CellID> {
        let r2 = radius * radius;
        self.cells_in_rect(
            (center.0 - radius, center.1 - radius),
            (center.0 + radius, center.1 + radius),
        )
        .into_iter()
        .filter(|&id| {
            let p = self.cell(id).pos.to_point();
            let dx = p.0 - center.0;
            let dy = p.1 - center.1;
            dx * dx + dy * dy <= r2
        })
        .collect()
    }

    /// 沿 from → to 方向投射射線，回傳路徑上的格子並依距離排序
    /// 遇到不存在的格子（地圖外）即中止
    pub fn raycast(&self, from: Pos, to: Pos, max_len: usize) -> Vec<RayHit> {
        bresenham_line(from, to, max_len, |pos| self.get(pos).is_some())
            .into_iter()
            .filter_map(|pos| {
                self.cell_at(pos).map(|cell| RayHit {
                    cell,
                    distance: {
                        let (px, py) = pos.to_point();
                        let (fx, fy) = from.to_point();
                        ((px - fx).powi(2) + (py - fy).powi(2)).sqrt()
                    },
                })
            })
            .collect()
    }
}

/// 建立 width × height 的平原方格，便於測試與產生器使用
pub fn open_grid(width: usize, height: usize) -> Grid {
    let mut cells = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            cells.push(Cell::plain(Pos { x, y }));
        }
    }
    Grid::new(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbours_computed_once() {
        let grid = open_grid(3, 3);
        // 角落 3 個鄰居、邊 5 個、中央 8 個
        let corner = grid.get(Pos { x: 0, y: 0 }).unwrap();
        assert_eq!(corner.neighbours.len(), 3);
        let edge = grid.get(Pos { x: 1, y: 0 }).unwrap();
        assert_eq!(edge.neighbours.len(), 5);
        let center = grid.get(Pos { x: 1, y: 1 }).unwrap();
        assert_eq!(center.neighbours.len(), 8);
    }

    #[test]
    fn test_step_cost() {
        let test_data = [
            (Pos { x: 1, y: 1 }, Pos { x: 2, y: 1 }, ORTHO_STEP),
            (Pos { x: 1, y: 1 }, Pos { x: 1, y: 0 }, ORTHO_STEP),
            (Pos { x: 1, y: 1 }, Pos { x: 2, y: 2 }, DIAG_STEP),
            (Pos { x: 1, y: 1 }, Pos { x: 0, y: 2 }, DIAG_STEP),
        ];
        for (a, b, expected) in test_data {
            assert_eq!(step_cost(a, b), expected, "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn test_distances() {
        let a = Pos { x: 0, y: 0 };
        let b = Pos { x: 3, y: 2 };
        assert_eq!(custom_distance(a, b), 4.0); // 3 + 2 * 0.5
        assert_eq!(manhattan_distance(a, b), 5);
        assert_eq!(chebyshev_distance(a, b), 3);
        assert_eq!(custom_distance(a, a), 0.0);
    }

    #[test]
    fn test_cell_at_point_rounding() {
        let grid = open_grid(3, 3);
        let test_data = [
            ((0.4, 0.4), Some(Pos { x: 0, y: 0 })),
            ((0.6, 1.4), Some(Pos { x: 1, y: 1 })),
            ((2.0, 2.0), Some(Pos { x: 2, y: 2 })),
            ((3.0, 0.0), None), // 地圖外
            ((-0.6, 0.0), None),
        ];
        for (point, expected) in test_data {
            let pos = grid.cell_at_point(point).map(|id| grid.cell(id).pos);
            assert_eq!(pos, expected, "{point:?}");
        }
    }

    #[test]
    fn test_cells_in_rect() {
        let grid = open_grid(4, 4);
        let ids = grid.cells_in_rect((0.5, 0.5), (2.5, 1.5));
        let cells: Vec<Pos> = ids.into_iter().map(|id| grid.cell(id).pos).collect();
        assert_eq!(
            cells,
            vec![
                Pos { x: 1, y: 1 },
                Pos { x: 2, y: 1 },
            ]
        );
    }

    #[test]
    fn test_cells_in_circle() {
        let grid = open_grid(5, 5);
        let ids = grid.cells_in_circle((2.0, 2.0), 1.0);
        let cells: Vec<Pos> = ids.into_iter().map(|id| grid.cell(id).pos).collect();
        // 半徑 1 只含十字
        assert_eq!(
            cells,
            vec![
                Pos { x: 2, y: 1 },
                Pos { x: 1, y: 2 },
                Pos { x: 2, y: 2 },
                Pos { x: 3, y: 2 },
                Pos { x: 2, y: 3 },
            ]
        );
    }

    #[test]
    fn test_raycast_ordered_by_distance() {
        let grid = open_grid(5, 5);
        let hits = grid.raycast(Pos { x: 0, y: 0 }, Pos { x: 3, y: 3 }, 10);
        let cells: Vec<Pos> = hits.iter().map(|h| grid.cell(h.cell).pos).collect();
        assert_eq!(
            cells,
            vec![
                Pos { x: 0, y: 0 },
                Pos { x: 1, y: 1 },
                Pos { x: 2, y: 2 },
                Pos { x: 3, y: 3 },
            ]
        );
        for pair in hits.windows(2) {
            assert!(pair[0].distance < pair[1].distance);
        }
    }

    #[test]
    fn test_raycast_stops_at_map_edge() {
        let grid = open_grid(2, 2);
        let hits = grid.raycast(Pos { x: 0, y: 0 }, Pos { x: 4, y: 0 }, 10);
        assert_eq!(hits.len(), 2); // (0,0), (1,0) 之後離開地圖
    }

    #[test]
    fn test_edge_blockers_direction_mapping() {
        let blockers = EdgeBlockers {
            left: true,
            up: false,
            right: false,
            down: false,
        };
        // 向右移動會從左側進入
        assert!(blockers.blocks_entry((1, 0)));
        assert!(!blockers.blocks_entry((-1, 0)));
        assert!(!blockers.blocks_entry((0, 1)));
        // 斜向移動也會被水平分量擋下
        assert!(blockers.blocks_entry((1, 1)));

        let blockers = EdgeBlockers {
            left: false,
            up: true,
            right: false,
            down: false,
        };
        // 向下移動（y+）會從上側進入
        assert!(blockers.blocks_entry((0, 1)));
        assert!(!blockers.blocks_entry((0, -1)));
    }
}
