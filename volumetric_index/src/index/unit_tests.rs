use super::*;

#[test]
fn test_axis_value_from_primitive() {
    assert_eq!(AxisValue::from(3i16), AxisValue::I16(3));
    assert_eq!(AxisValue::from(2.5f32), AxisValue::F32(2.5));
    assert_eq!(AxisValue::from(7u64), AxisValue::U64(7));
}

#[test]
fn test_axis_value_archetype_and_size() {
    assert_eq!(AxisValue::I8(0).archetype(), FieldArchetype::Int);
    assert_eq!(AxisValue::I8(0).size(), 1);
    assert_eq!(AxisValue::U32(0).archetype(), FieldArchetype::UInt);
    assert_eq!(AxisValue::U32(0).size(), 4);
    assert_eq!(AxisValue::F64(0.0).archetype(), FieldArchetype::Float);
    assert_eq!(AxisValue::F64(0.0).size(), 8);
}

#[test]
fn test_axis_unit_roundtrip_exact_type_only() {
    assert_eq!(i32::from_axis_value(AxisValue::I32(-4)), Some(-4));
    assert_eq!(i32::from_axis_value(AxisValue::I64(-4)), None);
    assert_eq!(f32::from_axis_value(AxisValue::F64(1.0)), None);
    assert_eq!(5u8.to_axis_value(), AxisValue::U8(5));
}

#[test]
fn test_axis_unit_to_f64() {
    assert_eq!((-12i16).to_f64(), -12.0);
    assert_eq!(AxisValue::U16(4096).to_f64(), 4096.0);
    assert_eq!(<f32 as AxisUnit>::NAME, "f32");
}
