/// Timeline filters applied to a small two-image case
///
/// Image one holds a document with three MAC times, a photo whose created
/// and modified times coincide, and a known system binary. Image two holds
/// one more photo. A web activity event hangs off the document.

use casedb_core::model::{FileKnown, NewFile};
use casedb_core::timeline::EventDescription;
use casedb_core::{
    CaseDatabase, CaseDbConfig, EventType, Interval, NewImage, RootFilter, TimelineFilter,
};
use std::path::PathBuf;
use tempfile::TempDir;

struct TimelineCase {
    _temp_dir: TempDir,
    case: CaseDatabase,
    image_one: i64,
    image_two: i64,
    report: i64,
    photo: i64,
}

fn add_image(case: &CaseDatabase, name: &str) -> i64 {
    case.add_image(NewImage::new(vec![PathBuf::from(format!("/evidence/{}", name))]))
        .unwrap()
        .id
}

fn add_file_with_events(case: &CaseDatabase, parent: i64, file: NewFile) -> i64 {
    let file_id = case.add_file(parent, file).unwrap().id;
    case.timeline().add_file_system_events(file_id).unwrap();
    file_id
}

fn create_timeline_case() -> TimelineCase {
    let temp_dir = TempDir::new().unwrap();
    let case = CaseDatabase::new_case(temp_dir.path().join("case.db"), CaseDbConfig::default()).unwrap();
    let image_one = add_image(&case, "laptop.img");
    let image_two = add_image(&case, "camera.img");

    let report = add_file_with_events(
        &case,
        image_one,
        NewFile::regular("report.pdf", 2048)
            .with_parent_path("/docs/")
            .with_mime_type("application/pdf")
            .with_times(1000, 2000, 3000, 0),
    );
    let photo = add_file_with_events(
        &case,
        image_one,
        NewFile::regular("photo.jpg", 4096)
            .with_parent_path("/pics/")
            .with_mime_type("image/jpeg")
            .with_times(1500, 1500, 0, 0),
    );
    let notepad = add_file_with_events(
        &case,
        image_one,
        NewFile::regular("notepad.exe", 8192)
            .with_parent_path("/windows/")
            .with_times(0, 2500, 0, 0),
    );
    case.set_known(notepad, FileKnown::Known).unwrap();
    add_file_with_events(
        &case,
        image_two,
        NewFile::regular("photo2.png", 1024)
            .with_parent_path("/pics/")
            .with_mime_type("image/png")
            .with_times(0, 4000, 5000, 0),
    );

    case.timeline()
        .add_event(
            EventType::WEB_ACTIVITY,
            6000,
            &EventDescription::new("visited example.test/report", "example.test", "example.test"),
            report,
            None,
        )
        .unwrap()
        .unwrap();

    TimelineCase {
        _temp_dir: temp_dir,
        case,
        image_one,
        image_two,
        report,
        photo,
    }
}

fn count(tc: &TimelineCase, filter: TimelineFilter) -> i64 {
    tc.case.timeline().count_events(Some(&filter)).unwrap()
}

#[test]
fn test_event_type_hierarchy() {
    let tc = create_timeline_case();
    assert_eq!(tc.case.timeline().count_events(None).unwrap(), 9);
    assert_eq!(count(&tc, TimelineFilter::EventType(EventType::ROOT)), 9);
    assert_eq!(count(&tc, TimelineFilter::EventType(EventType::FILE_SYSTEM)), 8);
    assert_eq!(count(&tc, TimelineFilter::EventType(EventType::FILE_MODIFIED)), 4);
    assert_eq!(count(&tc, TimelineFilter::EventType(EventType::WEB_ACTIVITY)), 1);
    assert_eq!(count(&tc, TimelineFilter::EventType(EventType::MISC_TYPES)), 0);
}

#[test]
fn test_repeated_file_system_events_are_ignored() {
    let tc = create_timeline_case();
    let again = tc.case.timeline().add_file_system_events(tc.report).unwrap();
    assert!(again.is_empty());
    assert_eq!(tc.case.timeline().count_events(None).unwrap(), 9);
}

#[test]
fn test_data_source_filters() {
    let tc = create_timeline_case();
    assert_eq!(count(&tc, TimelineFilter::DataSource(tc.image_two)), 2);
    assert_eq!(count(&tc, TimelineFilter::DataSource(tc.image_one)), 7);
    assert_eq!(count(&tc, TimelineFilter::DataSources(vec![tc.image_one, tc.image_two])), 9);
    assert_eq!(count(&tc, TimelineFilter::DataSources(vec![])), 9);
}

#[test]
fn test_file_type_filters() {
    let tc = create_timeline_case();
    assert_eq!(count(&tc, TimelineFilter::FileType(vec!["image/*".into()])), 4);
    assert_eq!(count(&tc, TimelineFilter::FileType(vec!["image/png".into()])), 2);
    assert_eq!(
        count(&tc, TimelineFilter::FileType(vec!["image/png".into(), "application/pdf".into()])),
        6
    );
    // Files without a mime type are not images
    assert_eq!(count(&tc, TimelineFilter::NotFileType(vec!["image/*".into()])), 5);
}

#[test]
fn test_text_and_known_filters() {
    let tc = create_timeline_case();
    assert_eq!(count(&tc, TimelineFilter::Text("pics".into())), 4);
    assert_eq!(count(&tc, TimelineFilter::Text("photo2".into())), 2);
    assert_eq!(count(&tc, TimelineFilter::Text("example.test".into())), 1);
    assert_eq!(count(&tc, TimelineFilter::Text("it's".into())), 0);
    assert_eq!(count(&tc, TimelineFilter::HideKnown), 8);
}

#[test]
fn test_tag_and_hash_hit_flags() {
    let tc = create_timeline_case();
    let tagging = tc.case.tagging();
    let notable = tagging
        .add_or_update_tag_name("Notable", "worth a look", "red", FileKnown::Unknown)
        .unwrap();
    tagging.add_content_tag(tc.photo, &notable, "", 0, 0).unwrap();

    let changed = tc.case.timeline().set_events_hash_hit(tc.report, true).unwrap();
    assert_eq!(changed.len(), 4);
    // Setting the same value again changes nothing
    assert!(tc.case.timeline().set_events_hash_hit(tc.report, true).unwrap().is_empty());

    assert_eq!(count(&tc, TimelineFilter::Tagged(true)), 2);
    assert_eq!(count(&tc, TimelineFilter::Tagged(false)), 7);
    assert_eq!(count(&tc, TimelineFilter::HashHit(true)), 4);
    assert_eq!(
        count(
            &tc,
            TimelineFilter::Union(vec![TimelineFilter::Tagged(true), TimelineFilter::HashHit(true)])
        ),
        6
    );
    assert_eq!(
        count(
            &tc,
            TimelineFilter::Intersection(vec![
                TimelineFilter::EventType(EventType::FILE_SYSTEM),
                TimelineFilter::HashHit(true),
            ])
        ),
        3
    );
}

#[test]
fn test_root_filter() {
    let tc = create_timeline_case();
    let mut root = RootFilter {
        hide_known: true,
        data_sources: vec![tc.image_one],
        ..RootFilter::default()
    };
    assert_eq!(count(&tc, TimelineFilter::Root(Box::new(root.clone()))), 6);

    root.event_type = Some(EventType::FILE_SYSTEM);
    assert_eq!(count(&tc, TimelineFilter::Root(Box::new(root.clone()))), 5);

    root.text = Some("report".into());
    assert_eq!(count(&tc, TimelineFilter::Root(Box::new(root))), 3);

    assert_eq!(count(&tc, TimelineFilter::Root(Box::default())), 9);
}

#[test]
fn test_interval_queries() {
    let tc = create_timeline_case();
    let timeline = tc.case.timeline();

    let ids = timeline.get_event_ids(Interval::new(1000, 2500).unwrap(), None).unwrap();
    let times: Vec<i64> = ids.iter().map(|id| timeline.get_event(*id).unwrap().time).collect();
    assert_eq!(times, vec![1000, 1500, 1500, 2000]);

    let created = TimelineFilter::EventType(EventType::FILE_CREATED);
    assert_eq!(
        timeline.get_event_ids(Interval::new(1000, 2500).unwrap(), Some(&created)).unwrap().len(),
        2
    );

    let by_type = timeline.count_events_by_type(Interval::all(), None).unwrap();
    assert_eq!(by_type.get(&EventType::FILE_MODIFIED), Some(&4));
    assert_eq!(by_type.get(&EventType::FILE_ACCESSED), Some(&2));
    assert_eq!(by_type.get(&EventType::FILE_CREATED), Some(&2));
    assert_eq!(by_type.get(&EventType::WEB_ACTIVITY), Some(&1));
    assert_eq!(by_type.get(&EventType::FILE_CHANGED), None);

    assert_eq!(timeline.get_min_time().unwrap(), Some(1000));
    assert_eq!(timeline.get_max_time().unwrap(), Some(6000));

    let spanning = timeline
        .get_spanning_interval(Interval::new(2100, 2200).unwrap(), None)
        .unwrap();
    assert_eq!(spanning, Interval { start: 2000, end: 2501 });

    assert!(Interval::new(10, 5).unwrap_err().is_data_error());
}
