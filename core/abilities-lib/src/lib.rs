use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

pub type AbilityID = String;
pub type Degree = u16;

/// 能力資料結構（定義檔，實際邏輯在 battle-lib）
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AbilityDef {
    #[serde(default)]
    pub desc: String,
    /// 施放距離（格）
    #[serde(default)]
    pub base_range: u32,
    /// 作用範圍半徑（格），0 代表單格
    #[serde(default)]
    pub area_range: u32,
    #[serde(default = "default_action_cost")]
    pub action_cost: u32,
    #[serde(default)]
    pub danger: DangerType,
    #[serde(default)]
    pub shape: TargetShape,
    #[serde(default)]
    pub affects: TargetFlags,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

/// 能力的敵意分類，決定預設的目標提示顏色
#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, Default, EnumString, Display, EnumIter, PartialEq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DangerType {
    #[default]
    Harmful,
    Neutral,
    Helpful,
}

/// 目標形狀
/// - point: 指向單格（area_range > 0 時以該格為中心擴散）
/// - self: 不選格子，直接作用於施放者
/// - burst: 以施放者為中心，全有或全無
/// - cone: 朝指向方向的三角楔形
/// - beam: 沿指向方向的直線光束
#[derive(Debug, Deserialize, Serialize, Clone, Default, Display, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
#[strum(serialize_all = "snake_case")]
pub enum TargetShape {
    #[default]
    Point,
    #[serde(rename = "self")]
    #[strum(serialize = "self")]
    SelfCast,
    Burst,
    Cone {
        /// 楔形半角（度），使用時會被限制在 [10, 89]
        degree: Degree,
        /// 楔形頂點沿指向方向的前移距離
        #[serde(default)]
        buffer: f32,
    },
    Beam {
        /// 光束全寬（格）
        width: f32,
    },
}

impl TargetShape {
    /// 是否需要選擇目標格（self 不需要）
    pub fn targets_cells(&self) -> bool {
        !matches!(self, TargetShape::SelfCast)
    }
}

/// 能力可作用的對象分類
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct TargetFlags {
    #[serde(default = "default_true")]
    pub enemies: bool,
    #[serde(default)]
    pub allies: bool,
    #[serde(default)]
    pub neutrals: bool,
    #[serde(default, rename = "self")]
    pub self_target: bool,
    /// 是否可作用於障礙物
    #[serde(default = "default_true")]
    pub environment: bool,
}

impl Default for TargetFlags {
    fn default() -> Self {
        TargetFlags {
            enemies: true,
            allies: false,
            neutrals: false,
            self_target: false,
            environment: true,
        }
    }
}

/// 效果種類，載入時透過 registry 對應到實際的套用函式
#[derive(
    Debug,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    EnumString,
    Display,
    EnumIter,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EffectKind {
    /// 傷害（使用者 damage × multiplier，受防禦減免）
    Damage,
    /// 治療（不超過 max_hp）
    Heal,
    /// 降低目標本回合移動點數
    Slow,
    /// 增加目標本回合移動點數
    Haste,
    /// 扣除目標行動點數
    Exhaust,
}

/// 效果描述：tag + 數值倍率，依宣告順序套用
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct EffectSpec {
    pub kind: EffectKind,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

impl Default for AbilityDef {
    fn default() -> Self {
        AbilityDef {
            desc: String::new(),
            base_range: 0,
            area_range: 0,
            action_cost: default_action_cost(),
            danger: DangerType::default(),
            shape: TargetShape::default(),
            affects: TargetFlags::default(),
            effects: Vec::new(),
        }
    }
}

impl AbilityDef {
    /// 是否有任何單位類目標（全 false 代表只作用於環境）
    pub fn affects_any_unit(&self) -> bool {
        let f = &self.affects;
        f.enemies || f.allies || f.neutrals || f.self_target
    }
}

fn default_action_cost() -> u32 {
    1
}

fn default_multiplier() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}
