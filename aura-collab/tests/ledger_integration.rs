//! Version ledger properties through the real store.
//!
//! Verifies:
//! - N sequential saves → version₀ + N, with N records each holding the
//!   state *prior* to its save (commit-before-mutate)
//! - Restore equality, forward version movement, `restored_from` tagging
//! - Cascade delete of version history
//! - Last-writer-wins under concurrent saves: no crash, no corrupt
//!   document — the surviving state is exactly one writer's state

use aura_collab::engine::{self, DeleteWallPayload, DesignCommand, ModifyWallPayload, WallPatch};
use aura_collab::ledger::VersionLedger;
use aura_collab::model::{Identity, Level, Point, ProjectData, VersionKind, Wall};
use aura_collab::storage::{ProjectStore, StoreConfig};

use std::sync::Arc;
use tempfile::tempdir;

fn open_ledger(dir: &tempfile::TempDir) -> VersionLedger {
    let store =
        Arc::new(ProjectStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap());
    VersionLedger::new(store)
}

fn data_with_walls(count: usize) -> ProjectData {
    let mut data = ProjectData::default();
    let mut level = Level::named("Ground");
    for i in 0..count {
        level.walls.push(Wall {
            id: format!("wall_{i}"),
            start: Point::new(0.0, i as f32 * 50.0),
            end: Point::new(400.0, i as f32 * 50.0),
            thickness: 10.0,
            height: 240.0,
        });
    }
    data.levels.push(level);
    data
}

#[test]
fn test_sequential_saves_count_and_content() {
    let dir = tempdir().unwrap();
    let ledger = open_ledger(&dir);
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(1))
        .unwrap();
    let version0 = project.version;

    let n: u64 = 10;
    let mut prior_states = vec![project.data.clone()];
    for i in 0..n {
        let next = data_with_walls(i as usize + 2);
        prior_states.push(next.clone());
        ledger
            .save(project.id, &owner, next, format!("save {i}"), VersionKind::Auto)
            .unwrap();
    }

    let live = ledger.get_project(project.id, &owner).unwrap();
    assert_eq!(live.version, version0 + n);
    assert_eq!(
        ledger.store().count_versions(project.id).unwrap(),
        n as usize
    );

    // Each record tagged K holds the state that was live under version K.
    for k in 1..=n {
        let record = ledger.get_version(project.id, &owner, k).unwrap();
        assert_eq!(record.data, prior_states[(k - 1) as usize]);
    }
}

#[test]
fn test_listing_is_newest_first_metadata() {
    let dir = tempdir().unwrap();
    let ledger = open_ledger(&dir);
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(1))
        .unwrap();
    for i in 0..5u64 {
        ledger
            .save(
                project.id,
                &owner,
                data_with_walls(i as usize + 2),
                format!("save {i}"),
                VersionKind::Manual,
            )
            .unwrap();
    }

    let summaries = ledger.list_versions(project.id, &owner).unwrap();
    let numbers: Vec<u64> = summaries.iter().map(|s| s.version_number).collect();
    assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_restore_is_byte_identical_and_forward() {
    let dir = tempdir().unwrap();
    let ledger = open_ledger(&dir);
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(2))
        .unwrap();
    for i in 0..4u64 {
        ledger
            .save(
                project.id,
                &owner,
                data_with_walls(i as usize + 3),
                "grow",
                VersionKind::Auto,
            )
            .unwrap();
    }

    let target = 3u64;
    let snapshot = ledger.get_version(project.id, &owner, target).unwrap();
    let before = ledger.get_project(project.id, &owner).unwrap();

    let restored = ledger.restore(project.id, &owner, target).unwrap();

    // Byte-for-byte: the snapshot encodes identically to the live data.
    let live_bytes =
        bincode::serde::encode_to_vec(&restored.data, bincode::config::standard()).unwrap();
    let snap_bytes =
        bincode::serde::encode_to_vec(&snapshot.data, bincode::config::standard()).unwrap();
    assert_eq!(live_bytes, snap_bytes);

    assert_eq!(restored.version, before.version + 1);

    let newest = &ledger.list_versions(project.id, &owner).unwrap()[0];
    assert_eq!(newest.restored_from, Some(target));
    assert_eq!(newest.version_number, restored.version);
}

#[test]
fn test_delete_project_purges_history() {
    let dir = tempdir().unwrap();
    let ledger = open_ledger(&dir);
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(1))
        .unwrap();
    for i in 0..6u64 {
        ledger
            .save(
                project.id,
                &owner,
                data_with_walls(i as usize + 2),
                "grow",
                VersionKind::Auto,
            )
            .unwrap();
    }
    assert!(ledger.store().count_versions(project.id).unwrap() > 0);

    ledger.delete_project(project.id, &owner).unwrap();
    assert_eq!(ledger.store().count_versions(project.id).unwrap(), 0);
}

#[test]
fn test_concurrent_saves_last_writer_wins_without_corruption() {
    // Two writers race read-modify-write saves on the same project. There
    // is no compare-and-swap, so one write clobbers the other — but the
    // surviving document must be exactly one writer's state, never a blend,
    // and both writers append ledger entries.
    let dir = tempdir().unwrap();
    let store =
        Arc::new(ProjectStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap());
    let ledger = Arc::new(VersionLedger::new(store));
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(1))
        .unwrap();

    let state_a = data_with_walls(5);
    let state_b = data_with_walls(9);

    let handles: Vec<_> = [state_a.clone(), state_b.clone()]
        .into_iter()
        .enumerate()
        .map(|(i, state)| {
            let ledger = ledger.clone();
            let owner = owner.clone();
            let project_id = project.id;
            std::thread::spawn(move || {
                ledger
                    .save(project_id, &owner, state, format!("writer {i}"), VersionKind::Auto)
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("no writer may panic");
    }

    let live = ledger.get_project(project.id, &owner).unwrap();
    assert!(
        live.data == state_a || live.data == state_b,
        "surviving state must be exactly one writer's document"
    );
    // Version moved forward and history grew; with the race, by one or two.
    assert!(live.version > project.version);
    assert!(ledger.store().count_versions(project.id).unwrap() >= 1);
}

#[test]
fn test_same_wall_conflicting_commands_leave_document_intact() {
    // Two commands target the same wall in the same tick. The outcome is
    // explicitly undefined beyond: no crash, no partial/corrupt document.
    let dir = tempdir().unwrap();
    let store =
        Arc::new(ProjectStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap());
    let ledger = Arc::new(VersionLedger::new(store));
    let owner = Identity::new("Asha");

    let project = ledger
        .create_project("Villa", &owner, data_with_walls(2))
        .unwrap();

    let modify = DesignCommand::ModifyWall(ModifyWallPayload {
        level_index: 0,
        wall_id: "wall_0".to_string(),
        new_properties: WallPatch {
            thickness: Some(20.0),
            ..WallPatch::default()
        },
    });
    let delete = DesignCommand::DeleteWall(DeleteWallPayload {
        level_index: 0,
        wall_id: "wall_0".to_string(),
    });

    let handles: Vec<_> = [modify, delete]
        .into_iter()
        .map(|command| {
            let ledger = ledger.clone();
            let owner = owner.clone();
            let project_id = project.id;
            std::thread::spawn(move || {
                // Read-modify-write on an independent copy, then save.
                let base = ledger.get_project(project_id, &owner).unwrap();
                let mut data = base.data.clone();
                if engine::apply(&mut data, &command).is_ok() {
                    let _ = ledger.save(
                        project_id,
                        &owner,
                        data,
                        command.describe(),
                        VersionKind::Auto,
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("no writer may panic");
    }

    // Whatever won, the document must load and be internally consistent:
    // every placement still references a wall that exists on its level.
    let live = ledger.get_project(project.id, &owner).unwrap();
    for level in &live.data.levels {
        for placement in &level.placements {
            assert!(level.wall(&placement.wall_id).is_some());
        }
    }
    // wall_1 was untouched by both writers and must have survived.
    assert!(live.data.levels[0].wall("wall_1").is_some());
}
