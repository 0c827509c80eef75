use super::*;

// ============================================================================
// ARCHETYPE TESTS
// ============================================================================

#[test]
fn test_archetype_accepts_size() {
    assert!(FieldArchetype::Int.accepts_size(2));
    assert!(!FieldArchetype::Int.accepts_size(3));
    assert!(FieldArchetype::Float.accepts_size(8));
    assert!(!FieldArchetype::Float.accepts_size(2));
    assert!(FieldArchetype::Bit.accepts_size(1));
    assert!(!FieldArchetype::Block.accepts_size(0));
    assert!(FieldArchetype::String.accepts_size(32));
}

#[test]
fn test_field_type_archetypes() {
    assert_eq!(<i16 as FieldType>::ARCHETYPE, FieldArchetype::Int);
    assert_eq!(<u64 as FieldType>::ARCHETYPE, FieldArchetype::UInt);
    assert_eq!(<f32 as FieldType>::ARCHETYPE, FieldArchetype::Float);
}

#[test]
fn test_field_desc_of() {
    let desc = FieldDesc::of::<f64>("x");
    assert_eq!(desc.name, "x");
    assert_eq!(desc.archetype, FieldArchetype::Float);
    assert_eq!(desc.size, 8);
}

// ============================================================================
// TYPED ACCESS TESTS
// ============================================================================

#[test]
fn test_field_read_write() {
    let field = Field::new(1, 4, 4, FieldArchetype::Float);
    let mut record = vec![0u8; 12];

    field.write(&mut record, 2.5f32);
    assert_eq!(field.read::<f32>(&record), 2.5);
    assert_eq!(&record[0..4], &[0, 0, 0, 0]);
}

#[test]
fn test_field_read_unaligned() {
    let field = Field::new(0, 1, 2, FieldArchetype::Int);
    let mut record = vec![0u8; 3];
    field.write(&mut record, -300i16);
    assert_eq!(field.read::<i16>(&record), -300);
}

#[test]
fn test_field_holds() {
    let field = Field::new(0, 0, 4, FieldArchetype::UInt);
    assert!(field.holds::<u32>());
    assert!(!field.holds::<i32>());
    assert!(!field.holds::<u16>());
}

#[test]
#[should_panic(expected = "does not hold")]
fn test_field_read_with_wrong_type_panics() {
    let field = Field::new(0, 0, 4, FieldArchetype::Float);
    let record = vec![0u8; 4];
    let _ = field.read::<i32>(&record);
}

#[test]
fn test_field_equal_in() {
    let field = Field::new(0, 0, 2, FieldArchetype::UInt);
    let first = [1u8, 2, 3];
    let second = [1u8, 2, 9];
    let third = [1u8, 5, 3];
    assert!(field.equal_in(&first, &second));
    assert!(!field.equal_in(&first, &third));
}
