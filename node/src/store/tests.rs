use super::*;
use plcscope_kernel::SignalType;
use tempfile::tempdir;

fn entry(device: &str, signal: &str, ts: i64, value: impl Into<SignalValue>) -> LogEntry {
    LogEntry::new(device, signal, ts, value.into())
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn timestamps(entries: &[LogEntry]) -> Vec<i64> {
    entries.iter().map(|e| e.timestamp).collect()
}

fn boundary_fixture(store: &EventStore) {
    store
        .append(&[
            entry("plc1", "A", 0, 0i64),
            entry("plc1", "B", 50, "x"),
            entry("plc1", "A", 100, 1i64),
        ])
        .unwrap();
    store.append(&[entry("plc1", "A", 200, 2i64)]).unwrap();
}

fn assert_boundaries(store: &EventStore) {
    let b = store
        .boundaries(150, 160, &keys(&["plc1::A", "plc1::B", "plc1::missing"]))
        .unwrap();
    assert_eq!(b.before["plc1::A"].timestamp, 100);
    assert_eq!(b.before["plc1::B"].timestamp, 50);
    assert_eq!(b.after["plc1::A"].timestamp, 200);
    assert!(!b.after.contains_key("plc1::B"));
    assert!(!b.before.contains_key("plc1::missing"));
}

#[test]
fn test_boundaries_before_and_after_indexing() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    boundary_fixture(&store);
    assert_boundaries(&store);
    store.finalize().unwrap();
    assert!(store.stats().finalized);
    assert_boundaries(&store);
}

#[test]
fn test_range_is_half_open() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    boundary_fixture(&store);

    let all = store.range(50, 200, None).unwrap();
    assert_eq!(timestamps(&all), vec![50, 100]);

    store.finalize().unwrap();
    let only_a = store.range(0, 200, Some(&keys(&["plc1::A"]))).unwrap();
    assert_eq!(timestamps(&only_a), vec![0, 100]);
    assert!(store.range(200, 200, None).unwrap().is_empty());
    assert!(store.range(0, 500, Some(&keys(&["nope::x"]))).unwrap().is_empty());
}

#[test]
fn test_out_of_order_rows_read_in_time_order() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[entry("plc1", "A", 300, true), entry("plc1", "B", 100, 7i64)])
        .unwrap();
    store.append(&[entry("plc1", "A", 200, false)]).unwrap();

    let scanned: Vec<i64> = store.scan().unwrap().map(|e| e.unwrap().timestamp).collect();
    assert_eq!(scanned, vec![100, 200, 300]);

    store.finalize().unwrap();
    let scanned: Vec<i64> = store.scan().unwrap().map(|e| e.unwrap().timestamp).collect();
    assert_eq!(scanned, vec![100, 200, 300]);

    let values = store.values_at(250, None).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].signal_key(), "plc1::A");
    assert_eq!(values[0].value, SignalValue::Boolean(false));
    assert_eq!(values[1].timestamp, 100);
    assert!(store.values_at(50, None).unwrap().is_empty());

    let stats = store.stats();
    assert_eq!(stats.entry_count, 3);
    assert_eq!(stats.start_time, Some(100));
    assert_eq!(stats.end_time, Some(300));
}

#[test]
fn test_values_at_without_index() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    boundary_fixture(&store);
    let values = store.values_at(100, Some(&keys(&["plc1::A"]))).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, SignalValue::Integer(1));
}

fn table_store(dir: &std::path::Path) -> EventStore {
    let store = EventStore::create(dir.join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[
            entry("dev1", "Temp", 1000, 20i64).with_category(Some("Sensors".into())),
            entry("dev2", "Door", 2000, true).with_category(Some("Doors".into())),
            entry("dev1", "State", 3000, "RUNNING"),
            entry("dev2", "Temp", 4000, 25i64).with_category(Some("Sensors".into())),
        ])
        .unwrap();
    store.finalize().unwrap();
    store
}

fn sort(column: SortColumn, direction: SortDirection) -> SortSpec {
    SortSpec { column, direction }
}

#[test]
fn test_page_totals_follow_filter() {
    let dir = tempdir().unwrap();
    let store = table_store(dir.path());

    let page = store.page(EntryFilter::default(), SortSpec::default(), 0, 2).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(timestamps(&page.entries), vec![1000, 2000]);

    let by_device = EntryFilter {
        device_id: Some("dev2".into()),
        ..Default::default()
    };
    let page = store.page(by_device, SortSpec::default(), 0, 10).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(timestamps(&page.entries), vec![2000, 4000]);

    let by_value = EntryFilter {
        search: Some("run".into()),
        ..Default::default()
    };
    assert_eq!(store.page(by_value, SortSpec::default(), 0, 10).unwrap().total, 1);

    let by_name = EntryFilter {
        search: Some("temp".into()),
        ..Default::default()
    };
    assert_eq!(store.page(by_name, SortSpec::default(), 0, 10).unwrap().total, 2);

    let by_type = EntryFilter {
        signal_type: Some(SignalType::Boolean),
        ..Default::default()
    };
    assert_eq!(store.page(by_type, SortSpec::default(), 0, 10).unwrap().total, 1);

    let past_end = store.page(EntryFilter::default(), SortSpec::default(), 10, 5).unwrap();
    assert!(past_end.entries.is_empty());
    assert_eq!(past_end.total, 4);
}

#[test]
fn test_page_sorting() {
    let dir = tempdir().unwrap();
    let store = table_store(dir.path());

    let sensors = EntryFilter {
        category: Some("Sensors".into()),
        ..Default::default()
    };
    let page = store
        .page(sensors, sort(SortColumn::Timestamp, SortDirection::Desc), 0, 10)
        .unwrap();
    assert_eq!(timestamps(&page.entries), vec![4000, 1000]);

    let page = store
        .page(EntryFilter::default(), sort(SortColumn::DeviceId, SortDirection::Asc), 0, 10)
        .unwrap();
    assert_eq!(timestamps(&page.entries), vec![1000, 3000, 2000, 4000]);

    let page = store
        .page(EntryFilter::default(), sort(SortColumn::Category, SortDirection::Asc), 0, 10)
        .unwrap();
    assert_eq!(timestamps(&page.entries), vec![2000, 1000, 4000, 3000]);

    let page = store
        .page(EntryFilter::default(), sort(SortColumn::Timestamp, SortDirection::Desc), 1, 2)
        .unwrap();
    assert_eq!(timestamps(&page.entries), vec![3000, 2000]);
}

#[test]
fn test_filtered_pages_are_cached_per_generation() {
    let dir = tempdir().unwrap();
    let store = table_store(dir.path());
    let filter = EntryFilter {
        device_id: Some("dev1".into()),
        ..Default::default()
    };
    store.page(filter.clone(), SortSpec::default(), 0, 1).unwrap();
    store.page(filter, SortSpec::default(), 1, 1).unwrap();
    assert_eq!(store.cache.len(), 1);
}

#[test]
fn test_invalid_regex_is_rejected() {
    let dir = tempdir().unwrap();
    let store = table_store(dir.path());
    let filter = EntryFilter {
        search: Some("(unclosed".into()),
        regex: true,
        ..Default::default()
    };
    let err = store.page(filter, SortSpec::default(), 0, 10).unwrap_err();
    assert!(matches!(err, StoreError::InvalidFilter(_)));
}

#[test]
fn test_index_by_time() {
    let dir = tempdir().unwrap();
    let store = table_store(dir.path());
    let asc = SortSpec::default();
    let desc = sort(SortColumn::Timestamp, SortDirection::Desc);

    assert_eq!(store.index_by_time(EntryFilter::default(), asc, 2500).unwrap(), Some(2));
    assert_eq!(store.index_by_time(EntryFilter::default(), desc, 2500).unwrap(), Some(2));
    assert_eq!(store.index_by_time(EntryFilter::default(), asc, 5000).unwrap(), None);
    assert_eq!(store.index_by_time(EntryFilter::default(), desc, 500).unwrap(), None);

    let dev2 = EntryFilter {
        device_id: Some("dev2".into()),
        ..Default::default()
    };
    assert_eq!(store.index_by_time(dev2, asc, 3000).unwrap(), Some(1));
}

#[test]
fn test_time_tree_buckets_populated_minutes() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[
            entry("plc1", "A", 0, 1i64),
            entry("plc1", "B", 30_000, 1i64),
            entry("plc1", "A", 60_000, 2i64),
            entry("plc1", "B", 185_000, 2i64),
        ])
        .unwrap();
    store.finalize().unwrap();

    let tree = store.time_tree(EntryFilter::default()).unwrap();
    let minutes: Vec<(i64, u32)> = tree.iter().map(|b| (b.ts, b.minute)).collect();
    assert_eq!(minutes, vec![(0, 0), (60_000, 1), (185_000, 3)]);
    assert_eq!(tree[0].date, "1970-01-01");
    assert_eq!(tree[0].hour, 0);

    let only_b = EntryFilter {
        signals: keys(&["plc1::B"]),
        ..Default::default()
    };
    let tree = store.time_tree(only_b).unwrap();
    let minutes: Vec<i64> = tree.iter().map(|b| b.ts).collect();
    assert_eq!(minutes, vec![30_000, 185_000]);
}

#[test]
fn test_time_tree_keeps_earliest_entry_per_minute() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[entry("plc1", "A", 30_000, 1i64), entry("plc1", "A", 75_500, 2i64)])
        .unwrap();
    store.append(&[entry("plc1", "B", 12_345, 3i64)]).unwrap();

    let tree_ts = |store: &EventStore| -> Vec<i64> {
        store
            .time_tree(EntryFilter::default())
            .unwrap()
            .iter()
            .map(|b| b.ts)
            .collect()
    };
    assert_eq!(tree_ts(&store), vec![12_345, 75_500]);
    store.finalize().unwrap();
    assert_eq!(tree_ts(&store), vec![12_345, 75_500]);

    let tree = store.time_tree(EntryFilter {
        signals: keys(&["plc1::A"]),
        ..Default::default()
    });
    let minutes: Vec<(i64, u32)> = tree.unwrap().iter().map(|b| (b.ts, b.minute)).collect();
    assert_eq!(minutes, vec![(30_000, 0), (75_500, 1)]);
}

#[test]
fn test_unindexed_out_of_order_batches_merge_in_time_order() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[
            entry("plc1", "A", 130_000, 1i64),
            entry("plc1", "A", 10_000, 2i64),
            entry("plc1", "B", 200_000, 3i64),
        ])
        .unwrap();
    store
        .append(&[entry("plc1", "B", 70_000, 4i64), entry("plc1", "A", 125_000, 5i64)])
        .unwrap();
    store.append(&[entry("plc1", "B", 5_000, 6i64)]).unwrap();
    assert!(!store.stats().finalized);

    let all = vec![5_000, 10_000, 70_000, 125_000, 130_000, 200_000];
    let scanned: Vec<i64> = store.scan().unwrap().map(|e| e.unwrap().timestamp).collect();
    assert_eq!(scanned, all);
    assert_eq!(
        timestamps(&store.range(10_000, 130_000, None).unwrap()),
        vec![10_000, 70_000, 125_000]
    );

    let page = store.page(EntryFilter::default(), SortSpec::default(), 1, 3).unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(timestamps(&page.entries), vec![10_000, 70_000, 125_000]);
    let desc = sort(SortColumn::Timestamp, SortDirection::Desc);
    let page = store.page(EntryFilter::default(), desc, 0, 2).unwrap();
    assert_eq!(timestamps(&page.entries), vec![200_000, 130_000]);

    assert_eq!(store.index_by_time(EntryFilter::default(), SortSpec::default(), 100_000).unwrap(), Some(3));
    assert_eq!(store.index_by_time(EntryFilter::default(), desc, 100_000).unwrap(), Some(3));

    let tree: Vec<i64> = store
        .time_tree(EntryFilter::default())
        .unwrap()
        .iter()
        .map(|b| b.ts)
        .collect();
    assert_eq!(tree, vec![5_000, 70_000, 125_000, 200_000]);

    store.finalize().unwrap();
    let scanned: Vec<i64> = store.scan().unwrap().map(|e| e.unwrap().timestamp).collect();
    assert_eq!(scanned, all);
}

fn streamed_fixture(store: &EventStore) {
    store
        .append(&[
            entry("dev1", "T", 1000, 1i64).with_category(Some("S".into())),
            entry("dev2", "T", 2000, 2i64),
            entry("dev1", "T", 3000, 3i64).with_category(Some("S".into())),
            entry("dev2", "D", 4000, true),
        ])
        .unwrap();
    store
        .append(&[
            entry("dev1", "T", 5000, 5i64),
            entry("dev2", "T", 6000, 6i64).with_category(Some("S".into())),
        ])
        .unwrap();
}

fn assert_streamed_pages(store: &EventStore) {
    let temps = EntryFilter {
        signals: keys(&["dev1::T", "dev2::T"]),
        ..Default::default()
    };
    let page_of = |s: SortSpec, offset: u64, limit: u64| {
        let page = store.page(temps.clone(), s, offset, limit).unwrap();
        assert_eq!(page.total, 5);
        timestamps(&page.entries)
    };

    assert_eq!(page_of(sort(SortColumn::Timestamp, SortDirection::Desc), 1, 2), vec![5000, 3000]);
    assert_eq!(page_of(SortSpec::default(), 3, 10), vec![5000, 6000]);
    assert_eq!(page_of(sort(SortColumn::DeviceId, SortDirection::Asc), 2, 2), vec![5000, 2000]);
    assert_eq!(
        page_of(sort(SortColumn::DeviceId, SortDirection::Desc), 0, 3),
        vec![6000, 2000, 5000]
    );
    assert_eq!(
        page_of(sort(SortColumn::Category, SortDirection::Asc), 1, 3),
        vec![3000, 6000, 2000]
    );
    assert!(page_of(SortSpec::default(), 9, 3).is_empty());

    let index_of = |s: SortSpec, ts: i64| store.index_by_time(temps.clone(), s, ts).unwrap();
    assert_eq!(index_of(sort(SortColumn::DeviceId, SortDirection::Asc), 2500), Some(1));
    assert_eq!(index_of(sort(SortColumn::DeviceId, SortDirection::Desc), 5500), Some(0));
    assert_eq!(index_of(sort(SortColumn::DeviceId, SortDirection::Desc), 6500), None);
    assert_eq!(index_of(sort(SortColumn::Timestamp, SortDirection::Desc), 2500), Some(3));
    assert_eq!(index_of(SortSpec::default(), 2500), Some(2));

    let tree = store.time_tree(temps.clone()).unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].ts, 1000);
}

#[test]
fn test_filtered_queries_stream_past_cache_limit() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig { cache_ids: 2 }).unwrap();
    streamed_fixture(&store);
    assert_streamed_pages(&store);
    assert_eq!(store.cache.len(), 0);

    store.finalize().unwrap();
    assert_streamed_pages(&store);
    assert_eq!(store.cache.len(), 0);
}

#[test]
fn test_streamed_and_cached_pages_agree() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    streamed_fixture(&store);
    store.finalize().unwrap();
    assert_streamed_pages(&store);
    assert!(!store.cache.is_empty());
    // Second pass answers from the cached lists.
    assert_streamed_pages(&store);
}

#[test]
fn test_dictionaries_and_source_tags() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store
        .append(&[
            entry("plc1", "Mode", 10, 1i64).with_source("a.log"),
            entry("plc1", "Mode", 20, "AUTO").with_source("b.log"),
            entry("plc0", "Run", 30, true).with_category(Some("Main".into())),
        ])
        .unwrap();

    assert_eq!(store.signal_keys().unwrap(), keys(&["plc0::Run", "plc1::Mode"]));
    assert_eq!(store.signal_types().unwrap()["plc1::Mode"], SignalType::String);
    assert_eq!(store.categories().unwrap(), keys(&["Main"]));

    let sources: Vec<Option<String>> = store.scan().unwrap().map(|e| e.unwrap().source_id).collect();
    assert_eq!(sources, vec![Some("a.log".into()), Some("b.log".into()), None]);
    store.verify().unwrap();
}

#[test]
fn test_destroy_closes_and_removes_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s");
    let store = EventStore::create(&path, StoreConfig::default()).unwrap();
    store.append(&[entry("plc1", "A", 1, 1i64)]).unwrap();
    assert!(path.exists());

    store.destroy().unwrap();
    assert!(!path.exists());
    assert!(matches!(store.snapshot(), Err(StoreError::Closed)));
    assert!(matches!(store.append(&[entry("plc1", "A", 2, 1i64)]), Err(StoreError::Closed)));
    store.destroy().unwrap();
}

#[test]
fn test_sealed_store_rejects_appends() {
    let dir = tempdir().unwrap();
    let store = EventStore::create(dir.path().join("s"), StoreConfig::default()).unwrap();
    store.append(&[entry("plc1", "A", 1, 1i64)]).unwrap();
    store.finalize().unwrap();
    store.finalize().unwrap();
    assert!(matches!(store.append(&[entry("plc1", "A", 2, 1i64)]), Err(StoreError::Sealed)));
    assert_eq!(store.stats().entry_count, 1);
}
