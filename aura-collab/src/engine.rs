//! Geometry mutation engine.
//!
//! Applies structured design commands to a project's mutable geometry,
//! enforcing level-scoped referential integrity. The command set is a closed
//! sum type: every variant the completion service can emit is represented,
//! with `InfoOnly` as the explicit no-mutation case, so dispatch is
//! exhaustive at compile time.
//!
//! Failure discipline: a command either applies in full or leaves the
//! document untouched. Validation happens before the first write.

use serde::{Deserialize, Serialize};

use crate::model::{Placement, PlacementKind, Point, ProjectData, Wall};

/// Default wall thickness in plan units when the payload omits it.
pub const DEFAULT_WALL_THICKNESS: f32 = 10.0;
/// Default wall height in plan units when the payload omits it.
pub const DEFAULT_WALL_HEIGHT: f32 = 240.0;

fn default_level_index() -> usize {
    0
}

/// Payload for `ADD_WALL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWallPayload {
    #[serde(default = "default_level_index")]
    pub level_index: usize,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default)]
    pub thickness: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
}

/// Partial wall properties merged onto an existing wall by `MODIFY_WALL`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallPatch {
    #[serde(default)]
    pub x1: Option<f32>,
    #[serde(default)]
    pub y1: Option<f32>,
    #[serde(default)]
    pub x2: Option<f32>,
    #[serde(default)]
    pub y2: Option<f32>,
    #[serde(default)]
    pub thickness: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
}

/// Payload for `MODIFY_WALL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyWallPayload {
    #[serde(default = "default_level_index")]
    pub level_index: usize,
    pub wall_id: String,
    pub new_properties: WallPatch,
}

/// Payload for `DELETE_WALL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteWallPayload {
    #[serde(default = "default_level_index")]
    pub level_index: usize,
    pub wall_id: String,
}

/// Payload for `ADD_WINDOW`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWindowPayload {
    #[serde(default = "default_level_index")]
    pub level_index: usize,
    pub wall_id: String,
    /// Fractional position along the host wall, in [0, 1].
    pub position_ratio: f32,
    pub width: f32,
    pub height: f32,
}

/// Payload for `MOVE_FURNITURE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFurniturePayload {
    #[serde(default = "default_level_index")]
    pub level_index: usize,
    pub model_id: String,
    pub new_position: Point,
}

/// A structured design command, as produced by the command interpreter.
///
/// Serialized form matches the completion-service contract:
/// `{"action": "ADD_WALL", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum DesignCommand {
    #[serde(rename = "ADD_WALL")]
    AddWall(AddWallPayload),
    #[serde(rename = "MODIFY_WALL")]
    ModifyWall(ModifyWallPayload),
    #[serde(rename = "DELETE_WALL")]
    DeleteWall(DeleteWallPayload),
    #[serde(rename = "ADD_WINDOW")]
    AddWindow(AddWindowPayload),
    #[serde(rename = "MOVE_FURNITURE")]
    MoveFurniture(MoveFurniturePayload),
    /// Informational answer; geometry is left untouched.
    #[serde(rename = "INFO_ONLY")]
    InfoOnly,
}

impl DesignCommand {
    /// True if applying this command can change geometry.
    pub fn mutates(&self) -> bool {
        !matches!(self, DesignCommand::InfoOnly)
    }

    /// Short human-readable description, used as a commit message.
    pub fn describe(&self) -> String {
        match self {
            DesignCommand::AddWall(p) => {
                format!("Add wall on level {}", p.level_index)
            }
            DesignCommand::ModifyWall(p) => format!("Modify wall {}", p.wall_id),
            DesignCommand::DeleteWall(p) => format!("Delete wall {}", p.wall_id),
            DesignCommand::AddWindow(p) => {
                format!("Add window on wall {}", p.wall_id)
            }
            DesignCommand::MoveFurniture(p) => format!("Move model {}", p.model_id),
            DesignCommand::InfoOnly => "No geometry change".to_string(),
        }
    }
}

/// Engine failures. `LevelNotFound`, `WallNotFound`, and `ModelNotFound`
/// are the NotFound class; `InvalidPayload` is the validation class.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    LevelNotFound { index: usize },
    WallNotFound { level_index: usize, wall_id: String },
    ModelNotFound { level_index: usize, model_id: String },
    InvalidPayload(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::LevelNotFound { index } => {
                write!(f, "Level {index} does not exist")
            }
            EngineError::WallNotFound {
                level_index,
                wall_id,
            } => write!(f, "Wall {wall_id} not found on level {level_index}"),
            EngineError::ModelNotFound {
                level_index,
                model_id,
            } => write!(f, "Model {model_id} not found on level {level_index}"),
            EngineError::InvalidPayload(msg) => write!(f, "Invalid payload: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Apply a design command to the project's mutable geometry fields.
///
/// On success the mutated `data` (levels, zones, infrastructure) is the
/// new authoritative state; the caller persists it in one write. On error
/// `data` is unchanged.
pub fn apply(data: &mut ProjectData, command: &DesignCommand) -> Result<(), EngineError> {
    match command {
        DesignCommand::AddWall(p) => add_wall(data, p),
        DesignCommand::ModifyWall(p) => modify_wall(data, p),
        DesignCommand::DeleteWall(p) => delete_wall(data, p),
        DesignCommand::AddWindow(p) => add_window(data, p),
        DesignCommand::MoveFurniture(p) => move_furniture(data, p),
        DesignCommand::InfoOnly => Ok(()),
    }
}

fn level_mut<'a>(
    data: &'a mut ProjectData,
    index: usize,
) -> Result<&'a mut crate::model::Level, EngineError> {
    data.levels
        .get_mut(index)
        .ok_or(EngineError::LevelNotFound { index })
}

fn positive(value: f32, field: &str) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidPayload(format!(
            "{field} must be positive, got {value}"
        )))
    }
}

fn add_wall(data: &mut ProjectData, p: &AddWallPayload) -> Result<(), EngineError> {
    let thickness = p.thickness.unwrap_or(DEFAULT_WALL_THICKNESS);
    let height = p.height.unwrap_or(DEFAULT_WALL_HEIGHT);
    positive(thickness, "thickness")?;
    positive(height, "height")?;

    let level = level_mut(data, p.level_index)?;
    let id = level.fresh_id("wall");
    level.walls.push(Wall {
        id,
        start: Point::new(p.x1, p.y1),
        end: Point::new(p.x2, p.y2),
        thickness,
        height,
    });
    Ok(())
}

fn modify_wall(data: &mut ProjectData, p: &ModifyWallPayload) -> Result<(), EngineError> {
    if let Some(t) = p.new_properties.thickness {
        positive(t, "thickness")?;
    }
    if let Some(h) = p.new_properties.height {
        positive(h, "height")?;
    }

    let level_index = p.level_index;
    let level = level_mut(data, level_index)?;
    let wall = level
        .wall_mut(&p.wall_id)
        .ok_or_else(|| EngineError::WallNotFound {
            level_index,
            wall_id: p.wall_id.clone(),
        })?;

    let patch = &p.new_properties;
    if let Some(x1) = patch.x1 {
        wall.start.x = x1;
    }
    if let Some(y1) = patch.y1 {
        wall.start.y = y1;
    }
    if let Some(x2) = patch.x2 {
        wall.end.x = x2;
    }
    if let Some(y2) = patch.y2 {
        wall.end.y = y2;
    }
    if let Some(t) = patch.thickness {
        wall.thickness = t;
    }
    if let Some(h) = patch.height {
        wall.height = h;
    }
    Ok(())
}

fn delete_wall(data: &mut ProjectData, p: &DeleteWallPayload) -> Result<(), EngineError> {
    let level_index = p.level_index;
    let level = level_mut(data, level_index)?;
    // Locate before removing: a miss must not disturb anything.
    let pos = level
        .walls
        .iter()
        .position(|w| w.id == p.wall_id)
        .ok_or_else(|| EngineError::WallNotFound {
            level_index,
            wall_id: p.wall_id.clone(),
        })?;
    level.walls.remove(pos);
    Ok(())
}

fn add_window(data: &mut ProjectData, p: &AddWindowPayload) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&p.position_ratio) {
        return Err(EngineError::InvalidPayload(format!(
            "positionRatio must be within [0, 1], got {}",
            p.position_ratio
        )));
    }
    positive(p.width, "width")?;
    positive(p.height, "height")?;

    let level_index = p.level_index;
    let level = level_mut(data, level_index)?;
    if level.wall(&p.wall_id).is_none() {
        return Err(EngineError::WallNotFound {
            level_index,
            wall_id: p.wall_id.clone(),
        });
    }

    let id = level.fresh_id("open");
    level.placements.push(Placement {
        id,
        kind: PlacementKind::Window,
        wall_id: p.wall_id.clone(),
        position_ratio: p.position_ratio,
        width: p.width,
        height: p.height,
    });
    Ok(())
}

fn move_furniture(data: &mut ProjectData, p: &MoveFurniturePayload) -> Result<(), EngineError> {
    let level_index = p.level_index;
    let level = level_mut(data, level_index)?;
    let model = level
        .model_mut(&p.model_id)
        .ok_or_else(|| EngineError::ModelNotFound {
            level_index,
            model_id: p.model_id.clone(),
        })?;
    model.position = p.new_position;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, PlacedModel};

    fn one_level_data() -> ProjectData {
        let mut data = ProjectData::default();
        data.levels.push(Level::named("Ground"));
        data
    }

    fn data_with_wall(wall_id: &str) -> ProjectData {
        let mut data = one_level_data();
        data.levels[0].walls.push(Wall {
            id: wall_id.to_string(),
            start: Point::new(0.0, 0.0),
            end: Point::new(400.0, 0.0),
            thickness: 10.0,
            height: 240.0,
        });
        data
    }

    fn add_wall_cmd(level_index: usize) -> DesignCommand {
        DesignCommand::AddWall(AddWallPayload {
            level_index,
            x1: 0.0,
            y1: 0.0,
            x2: 300.0,
            y2: 0.0,
            thickness: None,
            height: None,
        })
    }

    #[test]
    fn test_add_wall_applies_defaults() {
        let mut data = one_level_data();
        apply(&mut data, &add_wall_cmd(0)).unwrap();

        let wall = &data.levels[0].walls[0];
        assert_eq!(wall.thickness, DEFAULT_WALL_THICKNESS);
        assert_eq!(wall.height, DEFAULT_WALL_HEIGHT);
        assert!(wall.id.starts_with("wall_"));
    }

    #[test]
    fn test_add_wall_unknown_level() {
        let mut data = one_level_data();
        let err = apply(&mut data, &add_wall_cmd(3)).unwrap_err();
        assert_eq!(err, EngineError::LevelNotFound { index: 3 });
        assert!(data.levels[0].walls.is_empty());
    }

    #[test]
    fn test_add_wall_ids_never_collide() {
        // §-property scale: ten thousand random insertions, all ids unique.
        let mut data = one_level_data();
        for _ in 0..10_000 {
            apply(&mut data, &add_wall_cmd(0)).unwrap();
        }
        let mut ids: Vec<&str> =
            data.levels[0].walls.iter().map(|w| w.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_modify_wall_merges_patch() {
        let mut data = data_with_wall("wall_12");
        let cmd = DesignCommand::ModifyWall(ModifyWallPayload {
            level_index: 0,
            wall_id: "wall_12".to_string(),
            new_properties: WallPatch {
                x2: Some(500.0),
                height: Some(300.0),
                ..WallPatch::default()
            },
        });
        apply(&mut data, &cmd).unwrap();

        let wall = &data.levels[0].walls[0];
        assert_eq!(wall.end.x, 500.0);
        assert_eq!(wall.height, 300.0);
        // Untouched fields keep their values.
        assert_eq!(wall.start.x, 0.0);
        assert_eq!(wall.thickness, 10.0);
    }

    #[test]
    fn test_modify_wall_not_found_leaves_walls_unchanged() {
        let mut data = data_with_wall("wall_12");
        let before = data.clone();
        let cmd = DesignCommand::ModifyWall(ModifyWallPayload {
            level_index: 0,
            wall_id: "wall_99".to_string(),
            new_properties: WallPatch {
                x1: Some(1.0),
                ..WallPatch::default()
            },
        });
        let err = apply(&mut data, &cmd).unwrap_err();
        assert!(matches!(err, EngineError::WallNotFound { .. }));
        assert_eq!(data, before);
    }

    #[test]
    fn test_delete_wall_removes_exactly_one() {
        let mut data = data_with_wall("wall_12");
        data.levels[0].walls.push(Wall {
            id: "wall_13".to_string(),
            start: Point::new(0.0, 0.0),
            end: Point::new(0.0, 400.0),
            thickness: 10.0,
            height: 240.0,
        });

        let cmd = DesignCommand::DeleteWall(DeleteWallPayload {
            level_index: 0,
            wall_id: "wall_12".to_string(),
        });
        apply(&mut data, &cmd).unwrap();

        assert_eq!(data.levels[0].walls.len(), 1);
        assert_eq!(data.levels[0].walls[0].id, "wall_13");
    }

    #[test]
    fn test_delete_wall_not_found_has_no_partial_effect() {
        let mut data = data_with_wall("wall_12");
        let before = data.clone();
        let cmd = DesignCommand::DeleteWall(DeleteWallPayload {
            level_index: 0,
            wall_id: "wall_99".to_string(),
        });
        assert!(apply(&mut data, &cmd).is_err());
        assert_eq!(data, before);
    }

    #[test]
    fn test_add_window_references_host_wall() {
        let mut data = data_with_wall("wall_12");
        let cmd = DesignCommand::AddWindow(AddWindowPayload {
            level_index: 0,
            wall_id: "wall_12".to_string(),
            position_ratio: 0.5,
            width: 90.0,
            height: 120.0,
        });
        apply(&mut data, &cmd).unwrap();

        let placement = &data.levels[0].placements[0];
        assert_eq!(placement.kind, PlacementKind::Window);
        assert_eq!(placement.wall_id, "wall_12");
        assert_eq!(placement.position_ratio, 0.5);
    }

    #[test]
    fn test_add_window_rejects_missing_wall() {
        let mut data = one_level_data();
        let cmd = DesignCommand::AddWindow(AddWindowPayload {
            level_index: 0,
            wall_id: "wall_12".to_string(),
            position_ratio: 0.5,
            width: 90.0,
            height: 120.0,
        });
        let err = apply(&mut data, &cmd).unwrap_err();
        assert!(matches!(err, EngineError::WallNotFound { .. }));
        assert!(data.levels[0].placements.is_empty());
    }

    #[test]
    fn test_add_window_rejects_out_of_range_ratio() {
        let mut data = data_with_wall("wall_12");
        let cmd = DesignCommand::AddWindow(AddWindowPayload {
            level_index: 0,
            wall_id: "wall_12".to_string(),
            position_ratio: 1.5,
            width: 90.0,
            height: 120.0,
        });
        let err = apply(&mut data, &cmd).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPayload(_)));
        assert!(data.levels[0].placements.is_empty());
    }

    #[test]
    fn test_move_furniture_updates_position() {
        let mut data = one_level_data();
        data.levels[0].models.push(PlacedModel {
            id: "model_1".to_string(),
            catalog_key: "sofa.classic".to_string(),
            position: Point::new(10.0, 10.0),
            rotation: 90.0,
        });

        let cmd = DesignCommand::MoveFurniture(MoveFurniturePayload {
            level_index: 0,
            model_id: "model_1".to_string(),
            new_position: Point::new(250.0, 120.0),
        });
        apply(&mut data, &cmd).unwrap();

        let model = &data.levels[0].models[0];
        assert_eq!(model.position, Point::new(250.0, 120.0));
        assert_eq!(model.rotation, 90.0); // rotation untouched
    }

    #[test]
    fn test_move_furniture_not_found() {
        let mut data = one_level_data();
        let cmd = DesignCommand::MoveFurniture(MoveFurniturePayload {
            level_index: 0,
            model_id: "model_9".to_string(),
            new_position: Point::new(0.0, 0.0),
        });
        assert!(matches!(
            apply(&mut data, &cmd).unwrap_err(),
            EngineError::ModelNotFound { .. }
        ));
    }

    #[test]
    fn test_info_only_is_a_no_op() {
        let mut data = data_with_wall("wall_12");
        let before = data.clone();
        apply(&mut data, &DesignCommand::InfoOnly).unwrap();
        assert_eq!(data, before);
        assert!(!DesignCommand::InfoOnly.mutates());
    }

    #[test]
    fn test_command_wire_format() {
        let json = r#"{
            "action": "ADD_WINDOW",
            "payload": {
                "wallId": "wall_12",
                "positionRatio": 0.5,
                "width": 90,
                "height": 120
            }
        }"#;
        let cmd: DesignCommand = serde_json::from_str(json).unwrap();
        match &cmd {
            DesignCommand::AddWindow(p) => {
                assert_eq!(p.wall_id, "wall_12");
                assert_eq!(p.position_ratio, 0.5);
                assert_eq!(p.level_index, 0); // default when omitted
            }
            other => panic!("Expected ADD_WINDOW, got {other:?}"),
        }
    }

    #[test]
    fn test_info_only_wire_format_without_payload() {
        let cmd: DesignCommand = serde_json::from_str(r#"{"action":"INFO_ONLY"}"#).unwrap();
        assert_eq!(cmd, DesignCommand::InfoOnly);
    }
}
