use super::*;
use crate::index::{DimensionDesc, RayQuery, ShapeQuery};
use crate::layout::{Field, FieldDesc, Mapping, MappingDesc};
use glam::Vec2;

/// minX, minY, maxX, maxY, tag
fn box_mapping() -> Mapping {
    Mapping::from_desc(MappingDesc {
        name: "Box".to_string(),
        fields: vec![
            FieldDesc::of::<f32>("minX"),
            FieldDesc::of::<f32>("minY"),
            FieldDesc::of::<f32>("maxX"),
            FieldDesc::of::<f32>("maxY"),
            FieldDesc::of::<u32>("tag"),
        ],
    })
    .unwrap()
}

fn field(storage: &Storage, name: &str) -> Field {
    storage.mapping().field_by_name(name).unwrap()
}

fn world_axis(min_field: usize, max_field: usize) -> DimensionDesc {
    DimensionDesc {
        min_field,
        min: (-100.0f32).into(),
        max_field,
        max: 100.0f32.into(),
    }
}

/// Storage with a 2D index over both axes
fn box_storage() -> (Storage, IndexKey) {
    let mut storage = Storage::new(box_mapping());
    let index = storage
        .create_volumetric_index(&[world_axis(0, 2), world_axis(1, 3)])
        .unwrap();
    (storage, index)
}

/// Box layout is the same for every `box_mapping()` instance
fn write_box(record: &mut [u8], min: Vec2, max: Vec2) {
    let mapping = box_mapping();
    for (name, value) in [("minX", min.x), ("minY", min.y), ("maxX", max.x), ("maxY", max.y)] {
        mapping.field_by_name(name).unwrap().write(record, value);
    }
}

fn add_box(storage: &mut Storage, min: Vec2, max: Vec2) -> RecordKey {
    let mut record = storage.mapping().new_record();
    write_box(&mut record, min, max);
    storage.insert_record(&record).unwrap()
}

fn read_area(storage: &Storage, index: IndexKey, min: Vec2, max: Vec2) -> Vec<RecordKey> {
    let mut found: Vec<_> = storage
        .lookup_shape_intersection_to_read(index, &ShapeQuery::from_vec2(min, max))
        .unwrap()
        .collect();
    found.sort();
    found
}

// ============================================================================
// READ CURSOR TESTS
// ============================================================================

#[test]
fn test_read_cursor_iterates_matches() {
    let (mut storage, index) = box_storage();
    let first = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    let second = add_box(&mut storage, Vec2::new(12.0, 8.5), Vec2::new(14.0, 8.7));
    add_box(&mut storage, Vec2::new(-60.0, -60.0), Vec2::new(-50.0, -50.0));

    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(read_area(&storage, index, Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)), expected);
    assert!(read_area(&storage, index, Vec2::new(30.0, 30.0), Vec2::new(40.0, 40.0)).is_empty());
}

#[test]
fn test_read_cursor_exposes_record_bytes() {
    let (mut storage, index) = box_storage();
    add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    let min_x = field(&storage, "minX");

    let cursor = storage
        .lookup_shape_intersection_to_read(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
        .unwrap();
    let record = cursor.record().unwrap();
    assert_eq!(min_x.read::<f32>(record), 10.0);
}

#[test]
fn test_read_cursor_advance_after_end_is_noop() {
    let (mut storage, index) = box_storage();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    let mut cursor = storage
        .lookup_shape_intersection_to_read(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
        .unwrap();
    assert_eq!(cursor.current(), Some(key));
    cursor.advance();
    assert!(cursor.is_finished());
    cursor.advance();
    assert!(cursor.is_finished());
    assert!(cursor.record().is_none());
}

#[test]
fn test_read_cursors_register_and_unregister() {
    let (mut storage, index) = box_storage();
    add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    add_box(&mut storage, Vec2::new(12.0, 8.0), Vec2::new(13.0, 9.0));
    let query = ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0));

    let mut cursor = storage.lookup_shape_intersection_to_read(index, &query).unwrap();
    assert_eq!(storage.reader_count(), 1);
    assert_eq!(storage.volumetric_index(index).unwrap().active_cursors(), 1);

    let copy = cursor.clone();
    assert_eq!(storage.reader_count(), 2);
    assert_eq!(storage.volumetric_index(index).unwrap().active_cursors(), 2);

    // Clones advance independently
    let first = cursor.current();
    cursor.advance();
    assert_ne!(cursor.current(), first);
    assert_eq!(copy.current(), first);

    drop(cursor);
    drop(copy);
    assert_eq!(storage.reader_count(), 0);
    assert!(storage.volumetric_index(index).unwrap().can_be_dropped());
}

#[test]
fn test_read_cursor_over_ray() {
    let (mut storage, index) = box_storage();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    let hit = RayQuery::from_vec2(Vec2::new(7.0, 9.0), Vec2::new(2.0, 0.0), None);
    let found: Vec<_> = storage.lookup_ray_intersection_to_read(index, &hit).unwrap().collect();
    assert_eq!(found, vec![key]);

    let away = RayQuery::from_vec2(Vec2::new(7.0, 9.0), Vec2::new(-2.0, 0.0), None);
    assert_eq!(storage.lookup_ray_intersection_to_read(index, &away).unwrap().count(), 0);
}

// ============================================================================
// EDIT CURSOR TESTS
// ============================================================================

#[test]
fn test_edit_cursor_small_move_keeps_record_in_place() {
    let (mut storage, index) = box_storage();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    let min_x = field(&storage, "minX");
    let max_x = field(&storage, "maxX");

    {
        let mut cursor = storage
            .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
            .unwrap();
        let record = cursor.record_mut().unwrap();
        min_x.write(record, 10.1f32);
        max_x.write(record, 11.1f32);
        cursor.advance();
        assert!(cursor.is_finished());
    }

    assert_eq!(storage.writer_count(), 0);
    assert_eq!(read_area(&storage, index, Vec2::new(11.05, 8.0), Vec2::new(11.06, 9.0)), vec![key]);
    assert!(read_area(&storage, index, Vec2::new(9.0, 8.0), Vec2::new(10.05, 9.0)).is_empty());
}

#[test]
fn test_edit_cursor_moved_records_are_not_revisited() {
    let (mut storage, index) = box_storage();
    for x in [1.0f32, 11.0, 21.0] {
        add_box(&mut storage, Vec2::new(x, 0.0), Vec2::new(x + 1.0, 1.0));
    }
    let min_x = field(&storage, "minX");
    let max_x = field(&storage, "maxX");

    let mut visits = 0;
    {
        let query = ShapeQuery::from_vec2(Vec2::new(0.0, -5.0), Vec2::new(40.0, 5.0));
        let mut cursor = storage.lookup_shape_intersection_to_edit(index, &query).unwrap();
        while let Some(record) = cursor.record_mut() {
            // Still inside the query, but in another tree node
            let x = min_x.read::<f32>(record);
            min_x.write(record, x + 15.0);
            max_x.write(record, x + 16.0);
            visits += 1;
            cursor.advance();
        }
    }
    assert_eq!(visits, 3);

    let found = read_area(&storage, index, Vec2::new(0.0, -5.0), Vec2::new(40.0, 5.0));
    assert_eq!(found.len(), 3);
    let mut xs: Vec<f32> = found
        .iter()
        .map(|key| min_x.read::<f32>(storage.record(*key).unwrap()))
        .collect();
    xs.sort_by(f32::total_cmp);
    assert_eq!(xs, vec![16.0, 26.0, 36.0]);
}

#[test]
fn test_edit_cursor_drop_commits_current_record() {
    let (mut storage, index) = box_storage();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    {
        let mut cursor = storage
            .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
            .unwrap();
        let record = cursor.record_mut().unwrap();
        write_box(record, Vec2::new(-50.0, -50.0), Vec2::new(-49.0, -49.0));
    }

    assert!(read_area(&storage, index, Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)).is_empty());
    assert_eq!(read_area(&storage, index, Vec2::new(-55.0, -55.0), Vec2::new(-45.0, -45.0)), vec![key]);
}

#[test]
fn test_edit_cursor_erase_removes_from_every_index() {
    let (mut storage, index) = box_storage();
    let x_only = storage.create_volumetric_index(&[world_axis(0, 2)]).unwrap();
    let erased = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    let kept = add_box(&mut storage, Vec2::new(50.0, 50.0), Vec2::new(51.0, 51.0));

    {
        let mut cursor = storage
            .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
            .unwrap();
        assert_eq!(cursor.current(), Some(erased));
        cursor.erase();
        assert!(cursor.is_finished());
    }

    assert_eq!(storage.record_count(), 1);
    assert!(!storage.contains_record(erased));
    let x_range = |min: f32, max: f32| ShapeQuery::new(vec![(min.into(), max.into())]);
    assert_eq!(storage.lookup_shape_intersection_to_read(x_only, &x_range(0.0, 20.0)).unwrap().count(), 0);
    let remaining: Vec<_> = storage
        .lookup_shape_intersection_to_read(x_only, &x_range(40.0, 60.0))
        .unwrap()
        .collect();
    assert_eq!(remaining, vec![kept]);
}

#[test]
fn test_edit_cursor_erase_discards_pending_changes() {
    let (mut storage, index) = box_storage();
    let x_only = storage.create_volumetric_index(&[world_axis(0, 2)]).unwrap();
    add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    {
        let mut cursor = storage
            .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
            .unwrap();
        let record = cursor.record_mut().unwrap();
        write_box(record, Vec2::new(-50.0, 8.0), Vec2::new(-49.0, 9.0));
        cursor.erase();
    }

    assert_eq!(storage.record_count(), 0);
    let x_range = |min: f32, max: f32| ShapeQuery::new(vec![(min.into(), max.into())]);
    assert_eq!(storage.lookup_shape_intersection_to_read(x_only, &x_range(-100.0, 100.0)).unwrap().count(), 0);
}

#[test]
fn test_edit_cursor_propagates_to_other_indices() {
    let (mut storage, index) = box_storage();
    let x_only = storage.create_volumetric_index(&[world_axis(0, 2)]).unwrap();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    {
        let mut cursor = storage
            .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
            .unwrap();
        let record = cursor.record_mut().unwrap();
        write_box(record, Vec2::new(-50.0, 8.0), Vec2::new(-49.0, 9.0));
        cursor.advance();
    }

    let x_range = |min: f32, max: f32| ShapeQuery::new(vec![(min.into(), max.into())]);
    assert_eq!(storage.lookup_shape_intersection_to_read(x_only, &x_range(0.0, 20.0)).unwrap().count(), 0);
    let moved: Vec<_> = storage
        .lookup_shape_intersection_to_read(x_only, &x_range(-55.0, -45.0))
        .unwrap()
        .collect();
    assert_eq!(moved, vec![key]);
}

#[test]
fn test_ray_edit_cursor_updates_unindexed_field() {
    let (mut storage, index) = box_storage();
    let key = add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));
    let tag = field(&storage, "tag");

    {
        let query = RayQuery::from_vec2(Vec2::new(7.0, 8.5), Vec2::new(1.0, 0.0), Some(10.0));
        let mut cursor = storage.lookup_ray_intersection_to_edit(index, &query).unwrap();
        tag.write(cursor.record_mut().unwrap(), 7u32);
        cursor.advance();
        assert!(cursor.is_finished());
    }

    assert_eq!(tag.read::<u32>(storage.record(key).unwrap()), 7);
    assert_eq!(read_area(&storage, index, Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)), vec![key]);
}

#[test]
fn test_edit_cursor_releases_writer() {
    let (mut storage, index) = box_storage();
    add_box(&mut storage, Vec2::new(10.0, 8.0), Vec2::new(11.0, 9.0));

    let cursor = storage
        .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
        .unwrap();
    assert!(!cursor.is_finished());
    drop(cursor);

    assert_eq!(storage.writer_count(), 0);
    assert!(storage.volumetric_index(index).unwrap().can_be_dropped());
    assert!(storage.drop_index(index).is_ok());
}

#[test]
#[should_panic(expected = "finished edit cursor")]
fn test_edit_cursor_advance_when_finished_panics() {
    let (mut storage, index) = box_storage();
    let mut cursor = storage
        .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
        .unwrap();
    cursor.advance();
}

#[test]
#[should_panic(expected = "finished edit cursor")]
fn test_edit_cursor_erase_when_finished_panics() {
    let (mut storage, index) = box_storage();
    let mut cursor = storage
        .lookup_shape_intersection_to_edit(index, &ShapeQuery::from_vec2(Vec2::new(9.0, 7.0), Vec2::new(20.0, 10.0)))
        .unwrap();
    cursor.erase();
}
