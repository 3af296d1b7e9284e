use serde_json::json;
use weeklog_core::db::open_db_in_memory;
use weeklog_core::{
    ActivityDraft, ActivityList, AnnotationError, AnnotationKey, AnnotationKind, AnnotationStore,
    AnnotationValue, DayIndex, SqliteActivityRepository, SqliteAnnotationStore, WeekKey,
};

fn key(kind: AnnotationKind, week: WeekKey, day: u8) -> AnnotationKey {
    AnnotationKey::new(kind, week, DayIndex::new(day).unwrap())
}

#[test]
fn missing_entry_reads_as_absent() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();

    let value = store
        .read(&key(AnnotationKind::FreeWriting, WeekKey::new(1, 2024), 0))
        .unwrap();
    assert_eq!(value, None);
}

#[test]
fn write_then_read_both_kinds() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();
    let week = WeekKey::new(12, 2024);

    let notes = AnnotationValue::Structured(json!([{ "text": "walked", "done": true }]));
    let text = AnnotationValue::Text("quiet day".to_string());
    store
        .write(&key(AnnotationKind::PositiveNotes, week, 2), &notes)
        .unwrap();
    store
        .write(&key(AnnotationKind::FreeWriting, week, 2), &text)
        .unwrap();

    assert_eq!(
        store.read(&key(AnnotationKind::PositiveNotes, week, 2)).unwrap(),
        Some(notes)
    );
    assert_eq!(
        store.read(&key(AnnotationKind::FreeWriting, week, 2)).unwrap(),
        Some(text)
    );

    let stored: String = conn
        .query_row(
            "SELECT value FROM annotations WHERE kind = 'positiveNotes';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    let reparsed: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(reparsed, json!([{ "text": "walked", "done": true }]));
}

#[test]
fn last_write_wins_per_key() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();
    let slot = key(AnnotationKind::FreeWriting, WeekKey::new(3, 2025), 6);

    store
        .write(&slot, &AnnotationValue::Text("first".to_string()))
        .unwrap();
    store
        .write(&slot, &AnnotationValue::Text("second".to_string()))
        .unwrap();

    assert_eq!(
        store.read(&slot).unwrap(),
        Some(AnnotationValue::Text("second".to_string()))
    );
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM annotations;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn weeks_are_isolated() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();

    store
        .write(
            &key(AnnotationKind::FreeWriting, WeekKey::new(1, 12024), 0),
            &AnnotationValue::Text("a".to_string()),
        )
        .unwrap();

    let other = store
        .read(&key(AnnotationKind::FreeWriting, WeekKey::new(11, 2024), 0))
        .unwrap();
    assert_eq!(other, None);
}

#[test]
fn corrupted_structured_value_is_malformed_and_isolated() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();
    let week = WeekKey::new(8, 2024);

    store
        .write(
            &key(AnnotationKind::FreeWriting, week, 1),
            &AnnotationValue::Text("fine".to_string()),
        )
        .unwrap();
    conn.execute(
        "INSERT INTO annotations (kind, week_number, year, day_index, value)
         VALUES ('positiveNotes', 8, 2024, 1, '{broken');",
        [],
    )
    .unwrap();

    let err = store
        .read(&key(AnnotationKind::PositiveNotes, week, 1))
        .unwrap_err();
    assert!(matches!(err, AnnotationError::Malformed { .. }));

    let slots = store.read_week(week);
    assert_eq!(slots.len(), 2);
    assert_eq!(slots.iter().filter(|(_, result)| result.is_ok()).count(), 1);
}

#[test]
fn removing_an_activity_leaves_its_week_annotations() {
    let conn = open_db_in_memory().unwrap();
    let activities = SqliteActivityRepository::try_new(&conn).unwrap();
    let store = SqliteAnnotationStore::try_new(&conn).unwrap();

    let activity = activities.create(ActivityDraft::new(20, 2024)).unwrap();
    let slot = key(AnnotationKind::FreeWriting, activity.week_key(), 4);
    store
        .write(&slot, &AnnotationValue::Text("still here".to_string()))
        .unwrap();

    activities.remove(activity.id).unwrap();

    assert_eq!(
        store.read(&slot).unwrap(),
        Some(AnnotationValue::Text("still here".to_string()))
    );
}
