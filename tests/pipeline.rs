//! Fixture tests for the extract -> dedup -> record pipeline, exercising
//! the pieces a live run wires to the browser.

use patacquire::extract;
use patacquire::ident::IdentifierSet;
use patacquire::storage::{
    save_identifier_list, DownloadLedger, DownloadRecord, DownloadStatus,
};

/// A search page yielding three raw identifiers, two of which are the same
/// document under normalization.
const SEARCH_PAGE: &str = r#"
    <html><body>
      <search-results>
        <article>
          <a href="/patent/US10000001B2/en">Electrolyte composition (grant)</a>
        </article>
        <article>
          <a href="/patent/US10000001A1/en">Electrolyte composition (application)</a>
        </article>
        <article>
          <a href="/patent/EP20000002A1/en">Battery separator membrane</a>
        </article>
      </search-results>
    </body></html>
"#;

#[test]
fn topic_search_collapses_duplicates_and_records_each_identifier() {
    let mut set = IdentifierSet::new();
    extract::extract_primary(SEARCH_PAGE, &mut set, 3);

    // US10000001A1 is the same document as US10000001B2; first-seen wins.
    assert_eq!(set.ids(), ["US10000001B2", "EP20000002A1"]);

    let dir = tempfile::tempdir().expect("tempdir");
    let ids: Vec<String> = set.ids().to_vec();

    let list = save_identifier_list(dir.path(), "battery electrolyte", &ids).expect("save list");
    assert!(list.ends_with("battery_electrolyte_patent_ids.txt"));
    let body = std::fs::read_to_string(&list).expect("read list");
    assert_eq!(body, "US10000001B2\nEP20000002A1\n");

    // The download phase starts from one pending record per identifier.
    let ledger = DownloadLedger::create(dir.path(), "battery electrolyte", &ids).expect("ledger");
    for id in &ids {
        assert_eq!(ledger.get(id).expect("record").status, DownloadStatus::Pending);
    }
}

#[test]
fn rerunning_a_topic_overwrites_its_ledger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = vec!["US1111111B2".to_string()];
    let mut ledger = DownloadLedger::create(dir.path(), "some topic", &first).expect("ledger");
    ledger
        .record("US1111111B2", DownloadRecord::success("US1111111B2.pdf".into()))
        .expect("record");

    // Same topic again: the prior record for that topic is replaced.
    let second = vec!["US2222222B2".to_string()];
    let ledger = DownloadLedger::create(dir.path(), "some topic", &second).expect("ledger");
    let reloaded = DownloadLedger::load(ledger.path()).expect("load");
    assert!(reloaded.get("US1111111B2").is_none());
    assert_eq!(
        reloaded.get("US2222222B2").expect("record").status,
        DownloadStatus::Pending
    );
}

#[test]
fn direct_mode_html_fallback_leaves_failed_record_with_empty_path() {
    // A patent with no discoverable PDF ends as failed, path empty, with
    // the ledger keyed by the identifier itself.
    let dir = tempfile::tempdir().expect("tempdir");
    let ids = vec!["US9999999B2".to_string()];
    let mut ledger = DownloadLedger::create(dir.path(), "US9999999B2", &ids).expect("ledger");
    ledger
        .record("US9999999B2", DownloadRecord::failed("Could not download PDF"))
        .expect("record");

    let reloaded = DownloadLedger::load(ledger.path()).expect("load");
    assert!(reloaded
        .path()
        .ends_with("US9999999B2_download_record.json"));
    let record = reloaded.get("US9999999B2").expect("record");
    assert_eq!(record.status, DownloadStatus::Failed);
    assert!(record.path.is_empty());
    assert_eq!(record.error, "Could not download PDF");
}
