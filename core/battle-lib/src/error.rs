// 戰鬥核心錯誤型別，攜帶 function name 與 context，支援來源錯誤巢狀
use crate::*;
use abilities_lib::AbilityID;
use thiserror::Error;

/// 戰鬥核心錯誤型別
#[derive(Debug, Error)]
pub enum Error {
    #[error("`{func}`: 參數錯誤: {detail}")]
    InvalidParameter { func: &'static str, detail: String },

    #[error("`{func}`: 缺少單位模板 {template_type}")]
    MissingUnitTemplate {
        func: &'static str,
        template_type: UnitTemplateType,
    },

    #[error("`{func}`: 能力 {ability_id} 不存在")]
    MissingAbility {
        func: &'static str,
        ability_id: AbilityID,
    },

    #[error("`{func}`: 能力 {ability_id} 含未註冊的效果 {kind}")]
    UnknownEffect {
        func: &'static str,
        ability_id: AbilityID,
        kind: String,
    },

    #[error("`{func}`: 陣營 {faction} 不存在")]
    MissingFaction {
        func: &'static str,
        faction: FactionID,
    },

    #[error("`{func}`: 陣營 {a} 同時將 {b} 列為盟友與敵人")]
    FactionRelationConflict {
        func: &'static str,
        a: FactionID,
        b: FactionID,
    },

    #[error("`{func}`: 位置 {pos:?} 不存在")]
    NoCellAtPos { func: &'static str, pos: Pos },

    #[error("`{func}`: 位置 {pos:?} 無實體")]
    NoEntityAtPos { func: &'static str, pos: Pos },

    #[error("`{func}`: 無法找到行動中的實體 {entity_id}")]
    NoActingEntity {
        func: &'static str,
        entity_id: EntityID,
    },

    #[error("`{func}`: 實體 {entity_id} 無法放置於 {pos:?}")]
    PlacementFailed {
        func: &'static str,
        entity_id: EntityID,
        pos: Pos,
    },

    #[error("`{func}`: 位置 {pos:?} 已被佔用")]
    PosOccupied { func: &'static str, pos: Pos },

    #[error("`{func}`: 點數不足")]
    NotEnoughPoints { func: &'static str },

    #[error("`{func}`: 目標 {pos:?} 不可到達")]
    NotReachable { func: &'static str, pos: Pos },

    #[error("`{func}`: 包裝: {source}")]
    Wrap {
        func: &'static str,
        #[source]
        source: Box<Error>,
    },
}

pub fn root_error(err: &Error) -> &Error {
    let mut err = err;
    while let Error::Wrap { source, .. } = err {
        err = source.as_ref();
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_error_unwraps_nested() {
        let inner = Error::NotEnoughPoints { func: "inner" };
        let mid = Error::Wrap {
            func: "mid",
            source: Box::new(inner),
        };
        let outer = Error::Wrap {
            func: "outer",
            source: Box::new(mid),
        };
        assert!(matches!(
            root_error(&outer),
            Error::NotEnoughPoints { func: "inner" }
        ));
    }

    #[test]
    fn test_root_error_plain() {
        let err = Error::NoCellAtPos {
            func: "f",
            pos: Pos { x: 1, y: 2 },
        };
        assert!(matches!(root_error(&err), Error::NoCellAtPos { .. }));
    }
}
