//! Deterministic synthetic worlds for demos and smoke runs.

use cellworld_common::{CellCoord, DoorDestination, LAND_GRID_SIZE, TEXTURE_INDEX_COUNT};
use cellworld_records::{
    CellRecord, DatabaseError, HeightField, LandRecord, LandTextureRecord, LightData,
    MemoryDatabase, Record, RecordData, ReferenceEntry,
};
use glam::Vec3;

const GROUND_TEXTURES: [&str; 4] = [
    "textures/tx_grass.dds",
    "textures/tx_dirt.dds",
    "textures/tx_rock.dds",
    "textures/tx_sand.dds",
];

const INTERIORS: [&str; 2] = ["Tradehouse", "Old Cellar"];

/// Small mixing function; enough to scatter objects without a rand crate.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn cell_seed(seed: u64, coord: CellCoord) -> u64 {
    mix(seed ^ mix((u64::from(coord.x as u32) << 32) | u64::from(coord.z as u32)))
}

fn unit(h: u64) -> f32 {
    (h >> 40) as f32 / (1u64 << 24) as f32
}

fn records() -> Vec<Record> {
    vec![
        Record::new("rock", Some("meshes/r/rock.nif"), RecordData::Static),
        Record::new("tree", Some("meshes/f/tree.nif"), RecordData::Static),
        Record::new("door_tradehouse", Some("meshes/d/door.nif"), RecordData::Door),
        Record::new("chest", Some("meshes/o/chest.nif"), RecordData::Container),
        Record::new(
            "torch",
            Some("meshes/l/torch.nif"),
            RecordData::Light(LightData {
                radius: 192.0,
                color: [255, 170, 90],
                flicker: true,
            }),
        ),
        Record::new("glow", None, RecordData::Light(LightData::default())),
        Record::new("trader", Some("meshes/n/trader.nif"), RecordData::Npc),
        Record::new("book", Some("meshes/m/book.nif"), RecordData::Book),
    ]
}

fn land(seed: u64, coord: CellCoord) -> LandRecord {
    let mut h = cell_seed(seed, coord);
    let mut deltas = Vec::with_capacity(LAND_GRID_SIZE * LAND_GRID_SIZE);
    for _ in 0..LAND_GRID_SIZE * LAND_GRID_SIZE {
        h = mix(h);
        deltas.push((h % 5) as i8 - 2);
    }

    // One texture per 4×4 block, so each block is 16 consecutive entries.
    let mut texture_indices = Vec::with_capacity(TEXTURE_INDEX_COUNT);
    for _ in 0..TEXTURE_INDEX_COUNT / 16 {
        h = mix(h);
        let raw = (h % (GROUND_TEXTURES.len() as u64 + 1)) as u16;
        texture_indices.extend(std::iter::repeat_n(raw, 16));
    }

    LandRecord {
        coord,
        heights: Some(HeightField {
            reference_height: (h % 64) as f32,
            deltas,
        }),
        texture_indices: Some(texture_indices),
    }
}

fn exterior(seed: u64, coord: CellCoord, side: f32) -> CellRecord {
    // Swapped axes keep object scatter independent of the land noise.
    let mut h = cell_seed(seed, CellCoord::new(coord.z, coord.x));
    let mut cell = CellRecord::exterior(coord);
    let origin = Vec3::new(coord.x as f32 * side, coord.z as f32 * side, 0.0);
    let count = 2 + (h % 6) as usize;
    for i in 0..count {
        h = mix(h);
        let target = match h % 4 {
            0 | 1 => "rock",
            2 => "tree",
            _ => "glow",
        };
        let position = origin + Vec3::new(unit(h) * side, unit(mix(h)) * side, 0.0);
        let mut entry = ReferenceEntry::new(target, position);
        entry.rotation = Vec3::new(0.0, 0.0, unit(mix(h ^ i as u64)) * std::f32::consts::TAU);
        if target == "rock" {
            entry.scale = Some(0.5 + unit(h));
        }
        cell = cell.with_reference(entry);
    }

    if coord == CellCoord::new(0, 0) {
        let mut door =
            ReferenceEntry::new("door_tradehouse", origin + Vec3::new(512.0, 512.0, 0.0));
        door.door = Some(DoorDestination {
            cell: Some(INTERIORS[0].into()),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
        });
        cell = cell.with_reference(door);
    }
    cell
}

fn interior(name: &str, index: usize) -> CellRecord {
    let mut exit = ReferenceEntry::new("door_tradehouse", Vec3::new(0.0, -256.0, 0.0));
    exit.door = Some(DoorDestination {
        cell: None,
        position: Vec3::new(512.0, 512.0, 0.0),
        rotation: Vec3::ZERO,
    });
    let mut cell = CellRecord::interior(name)
        .with_reference(exit)
        .with_reference(ReferenceEntry::new("torch", Vec3::new(128.0, 0.0, 160.0)))
        .with_reference(ReferenceEntry::new("chest", Vec3::new(-128.0, 64.0, 0.0)))
        .with_reference(ReferenceEntry::new("book", Vec3::new(-96.0, 64.0, 40.0)));
    if index == 0 {
        cell = cell.with_reference(ReferenceEntry::new("trader", Vec3::ZERO));
    }
    cell.coord = CellCoord::new(index as i32, 0);
    cell
}

/// Build a square world of `(2 * extent + 1)²` exterior cells plus a couple of
/// interiors.
pub fn generate(extent: i32, seed: u64, side: f32) -> Result<MemoryDatabase, DatabaseError> {
    let mut db = MemoryDatabase::new();
    for (index, path) in GROUND_TEXTURES.iter().enumerate() {
        db.insert_land_texture(LandTextureRecord {
            index: index as u16,
            path: (*path).into(),
        });
    }
    for record in records() {
        db.insert_record(record)?;
    }
    for x in -extent..=extent {
        for z in -extent..=extent {
            let coord = CellCoord::new(x, z);
            db.insert_cell(exterior(seed, coord, side))?;
            db.insert_land(land(seed, coord))?;
        }
    }
    for (index, name) in INTERIORS.iter().enumerate() {
        db.insert_cell(interior(name, index))?;
    }
    Ok(db)
}
