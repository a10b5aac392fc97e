// tests/archive_store.rs
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{FixedOffset, TimeZone, Utc};
use feed_archiver::archive::month::MonthKey;
use feed_archiver::archive::store::{self, partition_path};
use feed_archiver::FeedItem;
use flate2::write::GzEncoder;
use flate2::Compression;

fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn item(link: &str, title: &str, y: i32, mo: u32, d: u32) -> FeedItem {
    FeedItem {
        title: title.into(),
        link: link.into(),
        pub_date: Utc.with_ymd_and_hms(y, mo, d, 3, 0, 0).unwrap(),
        source: "Wire".into(),
        category: "trade".into(),
    }
}

fn no_guard() -> HashSet<String> {
    HashSet::new()
}

#[test]
fn upsert_creates_month_partitions_under_year_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    let added = store::upsert(
        &archive,
        jst(),
        vec![
            item("https://example.test/a", "a", 2025, 6, 10),
            item("https://example.test/b", "b", 2025, 7, 2),
        ],
        &no_guard(),
    )
    .unwrap();

    assert_eq!(added, 2);
    assert!(archive.join("2025").join("2025-06.ndjson.gz").exists());
    assert!(archive.join("2025").join("2025-07.ndjson.gz").exists());
    assert_eq!(
        store::list_months(&archive).unwrap(),
        vec![
            MonthKey { year: 2025, month: 6 },
            MonthKey { year: 2025, month: 7 },
        ]
    );
}

#[test]
fn second_upsert_of_same_items_is_a_no_op_with_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");
    let batch = vec![
        item("https://example.test/a", "a", 2025, 6, 10),
        item("https://example.test/b", "b", 2025, 6, 11),
    ];

    assert_eq!(store::upsert(&archive, jst(), batch.clone(), &no_guard()).unwrap(), 2);
    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    let before = fs::read(&path).unwrap();

    assert_eq!(store::upsert(&archive, jst(), batch, &no_guard()).unwrap(), 0);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn partitions_grow_but_never_duplicate_links() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    store::upsert(
        &archive,
        jst(),
        vec![item("https://example.test/a", "a", 2025, 6, 10)],
        &no_guard(),
    )
    .unwrap();
    store::upsert(
        &archive,
        jst(),
        vec![
            item("https://example.test/a", "a again", 2025, 6, 20),
            item("https://example.test/c", "c", 2025, 6, 21),
        ],
        &no_guard(),
    )
    .unwrap();

    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    let items = store::read_partition(&path).unwrap();
    assert_eq!(items.len(), 2);

    let links: HashSet<_> = items.iter().map(|it| it.link.as_str()).collect();
    assert_eq!(links.len(), items.len(), "duplicate link in partition");
    // The earlier copy of `a` is the one that stays.
    assert!(items.iter().any(|it| it.title == "a"));
    assert!(!items.iter().any(|it| it.title == "a again"));
}

#[test]
fn same_batch_duplicates_collapse_first_seen() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    let added = store::upsert(
        &archive,
        jst(),
        vec![
            item("https://example.test/a", "first", 2025, 6, 10),
            item("https://example.test/a", "second", 2025, 6, 12),
        ],
        &no_guard(),
    )
    .unwrap();

    assert_eq!(added, 1);
    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    let items = store::read_partition(&path).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "first");
}

#[test]
fn latest_window_links_are_rejected_cross_month() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    // The link is visible in the current window but its true month's
    // partition does not hold it (window rolled past it).
    let guard: HashSet<String> = ["https://example.test/old".to_string()].into();

    let added = store::upsert(
        &archive,
        jst(),
        vec![item("https://example.test/old", "republished", 2024, 1, 5)],
        &guard,
    )
    .unwrap();

    assert_eq!(added, 0);
    assert!(!partition_path(&archive, MonthKey { year: 2024, month: 1 }).exists());
}

#[test]
fn partition_contents_are_sorted_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    store::upsert(
        &archive,
        jst(),
        vec![
            item("https://example.test/a", "a", 2025, 6, 5),
            item("https://example.test/b", "b", 2025, 6, 25),
            item("https://example.test/c", "c", 2025, 6, 15),
        ],
        &no_guard(),
    )
    .unwrap();

    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    let items = store::read_partition(&path).unwrap();
    let dates: Vec<_> = items.iter().map(|it| it.pub_date).collect();
    let mut sorted = dates.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(dates, sorted);
}

#[test]
fn undecodable_lines_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");
    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let good = serde_json::to_string(&item("https://example.test/a", "a", 2025, 6, 10)).unwrap();
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    writeln!(enc, "{good}").unwrap();
    writeln!(enc, "{{ broken line").unwrap();
    writeln!(enc).unwrap();
    writeln!(enc, "{good}").unwrap();
    fs::write(&path, enc.finish().unwrap()).unwrap();

    let items = store::read_partition(&path).unwrap();
    assert_eq!(items.len(), 2);
}

#[test]
fn stray_tmp_files_are_invisible_to_listing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    store::upsert(
        &archive,
        jst(),
        vec![item("https://example.test/a", "a", 2025, 6, 10)],
        &no_guard(),
    )
    .unwrap();

    // Simulate a crash between staging and rename.
    let year_dir = archive.join("2025");
    fs::write(year_dir.join("2025-07.ndjson.gz.tmp"), b"half a file").unwrap();
    fs::write(year_dir.join("notes.txt"), b"unrelated").unwrap();

    assert_eq!(
        store::list_months(&archive).unwrap(),
        vec![MonthKey { year: 2025, month: 6 }]
    );
    // And the real partition still reads fine.
    let path = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    assert_eq!(store::read_partition(&path).unwrap().len(), 1);
}

#[test]
fn civil_timezone_decides_the_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    // 16:00 UTC Jan 31 is Feb 1 in UTC+9.
    let late = FeedItem {
        pub_date: Utc.with_ymd_and_hms(2025, 1, 31, 16, 0, 0).unwrap(),
        ..item("https://example.test/a", "a", 2025, 1, 1)
    };
    store::upsert(&archive, jst(), vec![late], &no_guard()).unwrap();

    assert!(partition_path(&archive, MonthKey { year: 2025, month: 2 }).exists());
    assert!(!partition_path(&archive, MonthKey { year: 2025, month: 1 }).exists());
}

fn read_raw(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn untouched_months_are_not_rewritten_when_a_sibling_month_grows() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");

    store::upsert(
        &archive,
        jst(),
        vec![item("https://example.test/a", "a", 2025, 6, 10)],
        &no_guard(),
    )
    .unwrap();
    let june = partition_path(&archive, MonthKey { year: 2025, month: 6 });
    let before = read_raw(&june);

    store::upsert(
        &archive,
        jst(),
        vec![
            item("https://example.test/a", "a", 2025, 6, 10),
            item("https://example.test/b", "b", 2025, 7, 1),
        ],
        &no_guard(),
    )
    .unwrap();

    assert_eq!(read_raw(&june), before);
    assert!(partition_path(&archive, MonthKey { year: 2025, month: 7 }).exists());
}
