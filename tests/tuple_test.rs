use std::sync::Arc;

use strata::common::{PageId, StrataError, DEFAULT_PAGE_SIZE};
use strata::storage::page::HeapPage;
use strata::tuple::{FieldType, Tuple, TupleBuilder, TupleDesc, Value};

fn create_user_desc() -> Arc<TupleDesc> {
    TupleDesc::builder()
        .field("id", FieldType::Integer)
        .field("name", FieldType::Text(32))
        .nullable_field("email", FieldType::Text(64))
        .field("visits", FieldType::BigInt)
        .field("active", FieldType::Boolean)
        .build_arc()
}

fn user(desc: &Arc<TupleDesc>, id: i32, name: &str) -> Tuple {
    TupleBuilder::new(desc.clone())
        .value(id)
        .value(name)
        .value(format!("{name}@example.com"))
        .value(id as i64 * 100)
        .value(id % 2 == 0)
        .build()
}

#[test]
fn test_tuple_size_calculation() {
    let desc = create_user_desc();
    // 1 byte null bitmap + 4 + (2 + 32) + (2 + 64) + 8 + 1
    assert_eq!(desc.tuple_size(), 114);
    assert_eq!(
        HeapPage::slots_per_page(&desc, DEFAULT_PAGE_SIZE),
        DEFAULT_PAGE_SIZE * 8 / (114 * 8 + 1)
    );
}

#[test]
fn test_tuples_survive_page_image() {
    let desc = create_user_desc();
    let pid = PageId::new(1, 0);
    let mut page = HeapPage::empty(pid, desc.clone(), DEFAULT_PAGE_SIZE).unwrap();

    let names = ["alice", "bob", "carol"];
    for (i, name) in names.iter().enumerate() {
        page.insert_tuple(&mut user(&desc, i as i32, name)).unwrap();
    }

    let decoded = HeapPage::new(pid, &page.page_data().unwrap(), desc.clone()).unwrap();
    let stored: Vec<&Tuple> = decoded.tuples().collect();
    assert_eq!(stored.len(), 3);
    for (i, tuple) in stored.iter().enumerate() {
        assert_eq!(**tuple, user(&desc, i as i32, names[i]));
        assert_eq!(tuple.record_id().unwrap().page_id, pid);
        assert_eq!(
            tuple.value_by_name("name"),
            Some(&Value::Text(names[i].to_string()))
        );
    }
}

#[test]
fn test_tuple_with_nulls() {
    let desc = create_user_desc();
    let mut tuple = TupleBuilder::new(desc.clone())
        .value(9)
        .value("dave")
        .null()
        .value(0i64)
        .value(false)
        .build();

    let bytes = tuple.to_bytes().unwrap();
    assert_eq!(bytes.len(), desc.tuple_size());
    let decoded = Tuple::from_bytes(desc.clone(), &bytes).unwrap();
    assert!(decoded.value(2).unwrap().is_null());

    // Null in a non-nullable field cannot be stored
    tuple.set_value(1, Value::Null);
    assert!(tuple.to_bytes().is_none());
    let mut page = HeapPage::empty(PageId::new(1, 0), desc, DEFAULT_PAGE_SIZE).unwrap();
    assert!(matches!(
        page.insert_tuple(&mut tuple),
        Err(StrataError::TupleEncoding(_))
    ));
}

#[test]
fn test_text_longer_than_field_is_rejected() {
    let desc = TupleDesc::builder()
        .field("code", FieldType::Text(4))
        .build_arc();
    let tuple = TupleBuilder::new(desc).value("toolong").build();
    assert!(tuple.to_bytes().is_none());
}

#[test]
fn test_all_field_types() {
    let desc = TupleDesc::builder()
        .field("b", FieldType::Boolean)
        .field("i", FieldType::Integer)
        .field("l", FieldType::BigInt)
        .field("d", FieldType::Double)
        .field("s", FieldType::Text(8))
        .build_arc();
    let tuple = TupleBuilder::new(desc.clone())
        .value(true)
        .value(-42)
        .value(i64::MAX)
        .value(2.5)
        .value("hi")
        .build();

    let decoded = Tuple::from_bytes(desc, &tuple.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded.values(), tuple.values());
}

#[test]
fn test_desc_merge_and_lookup() {
    let left = TupleDesc::builder()
        .field("id", FieldType::Integer)
        .build();
    let right = TupleDesc::builder()
        .field("name", FieldType::Text(10))
        .field("id", FieldType::Integer)
        .build();

    let merged = left.merge(&right);
    assert_eq!(merged.field_count(), 3);
    assert_eq!(merged.field_index("id"), Some(0));
    assert_eq!(merged.field_index("name"), Some(1));
    assert_eq!(merged.tuple_size(), left.tuple_size() + right.tuple_size() - 1);
}
