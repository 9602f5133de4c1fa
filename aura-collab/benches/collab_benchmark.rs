use criterion::{black_box, criterion_group, criterion_main, Criterion};

use aura_collab::engine::{self, AddWallPayload, DesignCommand, ModifyWallPayload, WallPatch};
use aura_collab::model::{Identity, Level, Point, ProjectData, Wall};
use aura_collab::protocol::ServerEvent;
use uuid::Uuid;

fn plan_with_walls(count: usize) -> ProjectData {
    let mut data = ProjectData::default();
    let mut level = Level::named("Ground");
    for i in 0..count {
        level.walls.push(Wall {
            id: format!("wall_{i}"),
            start: Point::new(0.0, i as f32 * 10.0),
            end: Point::new(500.0, i as f32 * 10.0),
            thickness: 10.0,
            height: 240.0,
        });
    }
    data.levels.push(level);
    data
}

fn bench_add_wall(c: &mut Criterion) {
    let base = plan_with_walls(1_000);
    let cmd = DesignCommand::AddWall(AddWallPayload {
        level_index: 0,
        x1: 0.0,
        y1: 0.0,
        x2: 300.0,
        y2: 0.0,
        thickness: None,
        height: None,
    });

    c.bench_function("add_wall_1k_level", |b| {
        b.iter(|| {
            let mut data = base.clone();
            engine::apply(black_box(&mut data), black_box(&cmd)).unwrap();
            black_box(data);
        })
    });
}

fn bench_modify_wall(c: &mut Criterion) {
    let base = plan_with_walls(1_000);
    let cmd = DesignCommand::ModifyWall(ModifyWallPayload {
        level_index: 0,
        wall_id: "wall_999".to_string(),
        new_properties: WallPatch {
            thickness: Some(15.0),
            ..WallPatch::default()
        },
    });

    c.bench_function("modify_wall_1k_level", |b| {
        b.iter(|| {
            let mut data = base.clone();
            engine::apply(black_box(&mut data), black_box(&cmd)).unwrap();
            black_box(data);
        })
    });
}

fn bench_geometry_event_encode(c: &mut Criterion) {
    let event = ServerEvent::GeometryUpdate {
        project_id: Uuid::new_v4(),
        data: plan_with_walls(200),
        version: 42,
    };

    c.bench_function("geometry_event_encode_200_walls", |b| {
        b.iter(|| {
            black_box(event.encode().unwrap());
        })
    });
}

fn bench_chat_event_roundtrip(c: &mut Criterion) {
    let message = aura_collab::model::ChatMessage::from_user(
        &Identity::new("Asha"),
        "@aura add a window on wall_12 at position 0.5",
    );
    let event = ServerEvent::ChatMessage { message };
    let encoded = event.encode().unwrap();

    c.bench_function("chat_event_roundtrip", |b| {
        b.iter(|| {
            black_box(ServerEvent::decode(black_box(&encoded)).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_add_wall,
    bench_modify_wall,
    bench_geometry_event_encode,
    bench_chat_event_roundtrip
);
criterion_main!(benches);
