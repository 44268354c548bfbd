//! 本檔案僅收錄「有名且有固定公式」的演算法。
//! 例如：預算限制的 Dijkstra、Bresenham 直線、三角形面積判定等。
//! 若為專案自訂、尚未標準化或僅用於單一場景的邏輯，請勿放於此處。
//! 請維護演算法的正確性、可重現性與註解完整性。
use crate::*;
use std::collections::{BTreeSet, HashMap};

/// 路徑搜尋專用圖介面，供 find_reachable 演算法使用
pub trait SearchGraph {
    /// 判斷節點是否存在
    fn is_valid(&self, pos: Pos) -> bool;
    /// 判斷能否以累積成本 total 從 from 進入 to
    fn is_admitted(&self, from: Pos, to: Pos, total: Cost) -> bool;
    /// 相鄰兩節點的邊成本（半步單位）
    fn edge_cost(&self, from: Pos, to: Pos) -> Cost;
    /// 取得鄰近節點
    fn neighbours(&self, pos: Pos) -> Vec<Pos>;
}

// https://github.com/TheAlgorithms/Rust/blob/master/src/graph/dijkstra.rs
/// 預算限制的 Dijkstra 最短路徑：計算自起點集合可達、且成本不超過 budget 的所有節點
/// 多起點（成本皆為 0）支援多格 footprint 同時出發
/// 回傳 HashMap<Pos, (Cost, Pos)>，key 為節點，value 為 (累積成本, 前驅節點)；起點的前驅為自己
/// 同成本節點依 (成本, 座標) 字典序出佇列，結果可重現
pub fn find_reachable(
    graph: &impl SearchGraph,
    origins: &[Pos],
    budget: Cost,
) -> HashMap<Pos, (Cost, Pos)> {
    let mut ans = HashMap::new();
    let mut prio = BTreeSet::new();

    for &origin in origins {
        if !graph.is_valid(origin) {
            continue;
        }
        ans.insert(origin, (0, origin));
        prio.insert((0, origin));
    }

    // 主迴圈：每次取出最小成本節點，更新鄰居
    while let Some((path_weight, vertex)) = prio.pop_first() {
        for next in graph.neighbours(vertex) {
            if !graph.is_valid(next) {
                continue;
            }
            let new_weight = path_weight + graph.edge_cost(vertex, next);
            if new_weight > budget {
                continue;
            }
            if !graph.is_admitted(vertex, next, new_weight) {
                continue;
            }
            match ans.get(&next) {
                Some((dist_next, _)) if new_weight >= *dist_next => {}
                _ => {
                    if let Some((prev_weight, _)) = ans.insert(next, (new_weight, vertex)) {
                        prio.remove(&(prev_weight, next));
                    };
                    prio.insert((new_weight, next));
                }
            }
        }
    }

    ans
}

pub fn bresenham_line(from: Pos, to: Pos, len: usize, is_valid: impl Fn(Pos) -> bool) -> Vec<Pos> {
    let mut points = Vec::new();

    let dx = (to.x as isize - from.x as isize).abs();
    let dy = (to.y as isize - from.y as isize).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };

    let mut err = dx - dy;
    let mut x = from.x as isize;
    let mut y = from.y as isize;

    for _ in 0..len {
        if x < 0 || y < 0 {
            break;
        }
        let pos = Pos {
            x: x as usize,
            y: y as usize,
        };
        if is_valid(pos) {
            points.push(pos);
        } else {
            break; // 若超出地圖範圍可終止
        }
        if x as usize == to.x && y as usize == to.y {
            break; // 若到達目標可終止
        }

        let e2 = err * 2;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// 浮點面積比較容差（相對於總面積）
const TRIANGLE_EPSILON: f32 = 1e-3;

/// 三角形面積（shoelace 公式）
pub fn triangle_area(p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)) -> f32 {
    ((p1.0 * (p2.1 - p3.1) + p2.0 * (p3.1 - p1.1) + p3.0 * (p1.1 - p2.1)) / 2.0).abs()
}

/// 點在三角形內判定：三個子三角形面積和等於總面積（含相對容差）
pub fn point_in_triangle(p: (f32, f32), a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> bool {
    let total = triangle_area(a, b, c);
    let sum = triangle_area(p, b, c) + triangle_area(a, p, c) + triangle_area(a, b, p);
    (total - sum).abs() <= TRIANGLE_EPSILON * total.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockGraph {
        width: usize,
        height: usize,
        impassable: Vec<Pos>,
        slower: Vec<Pos>,
    }

    impl SearchGraph for MockGraph {
        fn is_valid(&self, pos: Pos) -> bool {
            pos.x < self.width && pos.y < self.height
        }
        fn is_admitted(&self, _from: Pos, to: Pos, _total: Cost) -> bool {
            !self.impassable.contains(&to)
        }
        fn edge_cost(&self, from: Pos, to: Pos) -> Cost {
            let factor = if self.slower.contains(&to) { 2 } else { 1 };
            step_cost(from, to) * factor
        }
        fn neighbours(&self, pos: Pos) -> Vec<Pos> {
            DIRECTIONS
                .iter()
                .filter_map(|&dir| pos.offset(dir))
                .collect()
        }
    }

    #[test]
    fn test_find_reachable_simple() {
        let graph = MockGraph {
            width: 3,
            height: 3,
            ..Default::default()
        };
        let origin = Pos { x: 0, y: 0 };
        let result = find_reachable(&graph, &[origin], 100);
        let test_data = [
            (Pos { x: 0, y: 0 }, 0),
            (Pos { x: 1, y: 0 }, 2),
            (Pos { x: 1, y: 1 }, 3), // 斜走 1.5
            (Pos { x: 2, y: 1 }, 5), // 斜走 + 直走
            (Pos { x: 2, y: 2 }, 6), // 斜走兩次
        ];
        for (pos, cost) in test_data {
            assert_eq!(result.get(&pos).unwrap().0, cost, "{pos:?}");
        }
    }

    #[test]
    fn test_find_reachable_budget_cutoff() {
        let graph = MockGraph {
            width: 5,
            height: 5,
            ..Default::default()
        };
        let origin = Pos { x: 0, y: 0 };
        let result = find_reachable(&graph, &[origin], 4);
        // 成本 4 內：直走兩格或斜走 + 直走不行（5）
        assert!(result.contains_key(&Pos { x: 2, y: 0 }));
        assert!(result.contains_key(&Pos { x: 1, y: 1 }));
        assert!(!result.contains_key(&Pos { x: 2, y: 1 })); // 成本 5
        assert!(!result.contains_key(&Pos { x: 2, y: 2 })); // 成本 6

        // 預算 0 只剩起點
        let result = find_reachable(&graph, &[origin], 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(&origin), Some(&(0, origin)));
    }

    #[test]
    fn test_find_reachable_origin_off_map() {
        let graph = MockGraph {
            width: 3,
            height: 3,
            ..Default::default()
        };
        let result = find_reachable(&graph, &[Pos { x: 9, y: 9 }], 10);
        assert!(result.is_empty());
    }

    #[test]
    fn test_find_reachable_multi_origin() {
        let graph = MockGraph {
            width: 5,
            height: 1,
            ..Default::default()
        };
        // 兩個起點，中間格子取較近者
        let origins = [Pos { x: 0, y: 0 }, Pos { x: 4, y: 0 }];
        let result = find_reachable(&graph, &origins, 100);
        assert_eq!(result.get(&Pos { x: 1, y: 0 }).unwrap().0, 2);
        assert_eq!(result.get(&Pos { x: 3, y: 0 }).unwrap().0, 2);
        assert_eq!(result.get(&Pos { x: 2, y: 0 }).unwrap().0, 4);
        assert_eq!(result.get(&Pos { x: 0, y: 0 }).unwrap().0, 0);
        assert_eq!(result.get(&Pos { x: 4, y: 0 }).unwrap().0, 0);
    }

    #[test]
    fn test_find_reachable_impassable_blocks() {
        let graph = MockGraph {
            width: 3,
            height: 1,
            impassable: vec![Pos { x: 1, y: 0 }],
            ..Default::default()
        };
        let result = find_reachable(&graph, &[Pos { x: 0, y: 0 }], 100);
        assert!(!result.contains_key(&Pos { x: 1, y: 0 }));
        assert!(!result.contains_key(&Pos { x: 2, y: 0 })); // 單行地圖被截斷
    }

    #[test]
    fn test_find_reachable_slower_terrain() {
        let graph = MockGraph {
            width: 3,
            height: 1,
            slower: vec![Pos { x: 1, y: 0 }],
            ..Default::default()
        };
        let result = find_reachable(&graph, &[Pos { x: 0, y: 0 }], 100);
        assert_eq!(result.get(&Pos { x: 1, y: 0 }).unwrap().0, 4); // 2 × 2
        assert_eq!(result.get(&Pos { x: 2, y: 0 }).unwrap().0, 6);
    }

    #[test]
    fn test_find_reachable_deterministic_tie_break() {
        // 中央不可通行，(2,2) 有兩條等價路徑，字典序較小的 (1,2) 先出佇列成為前驅
        let graph = MockGraph {
            width: 3,
            height: 3,
            impassable: vec![Pos { x: 1, y: 1 }],
            ..Default::default()
        };
        let origin = Pos { x: 0, y: 0 };
        let first = find_reachable(&graph, &[origin], 100);
        assert_eq!(first.get(&Pos { x: 2, y: 2 }), Some(&(7, Pos { x: 1, y: 2 })));
        for _ in 0..3 {
            let again = find_reachable(&graph, &[origin], 100);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_bresenham_line() {
        let test_data = [
            (
                10,
                Pos { x: 0, y: 0 },
                Pos { x: 3, y: 3 },
                vec![
                    Pos { x: 0, y: 0 },
                    Pos { x: 1, y: 1 },
                    Pos { x: 2, y: 2 },
                    Pos { x: 3, y: 3 },
                ],
            ),
            (
                2,
                Pos { x: 0, y: 0 },
                Pos { x: 3, y: 3 },
                vec![Pos { x: 0, y: 0 }, Pos { x: 1, y: 1 }],
            ),
            (
                5,
                Pos { x: 0, y: 0 },
                Pos { x: 3, y: 1 },
                vec![
                    Pos { x: 0, y: 0 },
                    Pos { x: 1, y: 0 },
                    Pos { x: 2, y: 1 },
                    Pos { x: 3, y: 1 },
                ],
            ),
        ];
        for (len, from, to, expected) in test_data {
            let line = bresenham_line(from, to, len, |_| true);
            assert_eq!(line, expected);
        }
    }

    #[test]
    fn test_bresenham_line_with_invalid() {
        let from = Pos { x: 0, y: 0 };
        let to = Pos { x: 3, y: 0 };
        let line = bresenham_line(from, to, 10, |pos| pos.x < 2);
        assert_eq!(line, vec![Pos { x: 0, y: 0 }, Pos { x: 1, y: 0 }]);
    }

    #[test]
    fn test_triangle_area() {
        // 直角三角形 (0,0) (4,0) (0,3)，面積 6
        assert!((triangle_area((0.0, 0.0), (4.0, 0.0), (0.0, 3.0)) - 6.0).abs() < 1e-6);
        // 共線三點面積 0
        assert_eq!(triangle_area((0.0, 0.0), (1.0, 1.0), (2.0, 2.0)), 0.0);
    }

    #[test]
    fn test_point_in_triangle() {
        let a = (0.0, 0.0);
        let b = (4.0, 0.0);
        let c = (0.0, 4.0);
        let test_data = [
            ((1.0, 1.0), true),
            ((0.0, 0.0), true),  // 頂點
            ((2.0, 2.0), true),  // 斜邊上
            ((3.0, 3.0), false), // 外部
            ((-1.0, 0.0), false),
        ];
        for (p, expected) in test_data {
            assert_eq!(point_in_triangle(p, a, b, c), expected, "{p:?}");
        }
    }
}
