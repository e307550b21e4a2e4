mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use upload_harvester::{
    Credentials, DownloadMode, HarvestError, HarvestRecord, InteractionTiming, RunState,
    UploadHarvester, UploadHarvesterBuilder,
};

use common::{
    Call, CountingBrowser, FixtureSite, PASSWORD, RecordingBrowser, RejectingCaptcha, SITE_KEY,
    StateRecorder, StubCaptcha, USERNAME,
};

fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD)
}

fn builder(site: &FixtureSite, browser: Arc<CountingBrowser>) -> UploadHarvesterBuilder {
    UploadHarvester::builder()
        .with_site_profile(site.site_profile())
        .with_timing(InteractionTiming::immediate())
        .with_browser(browser)
}

fn records(pairs: &[(&str, &str)]) -> Vec<HarvestRecord> {
    pairs
        .iter()
        .map(|(title, filename)| HarvestRecord::new(*title, *filename))
        .collect()
}

#[tokio::test]
async fn dry_run_names_every_item_across_pages() {
    let site = FixtureSite::start().await;
    site.mount_listing(
        "/uploads",
        &[("Talk A", "111"), ("Talk B", "222")],
        Some("/uploads/page/2"),
    )
    .await;
    site.mount_listing("/uploads/page/2", &[("Talk C", "333")], Some("#"))
        .await;
    site.forbid("/download/111").await;
    site.forbid("/download/222").await;
    site.forbid("/download/333").await;

    let browser = CountingBrowser::new();
    let captcha = StubCaptcha::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(captcha.clone())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(
        report.records(),
        records(&[
            ("Talk A", "111.pdf"),
            ("Talk B", "222.pdf"),
            ("Talk C", "333.pdf"),
        ])
        .as_slice()
    );
    assert_eq!(report.pages_completed(), 2);
    assert_eq!(browser.counters.launches(), 1);
    assert_eq!(browser.counters.closes(), 1);

    let tasks = captcha.tasks.lock().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].site_key, SITE_KEY);
    assert_eq!(tasks[0].page_url, site.url("/login/email"));
}

#[tokio::test]
async fn persist_mode_saves_each_download_under_its_suggested_name() {
    let site = FixtureSite::start().await;
    site.mount_listing(
        "/uploads",
        &[("Talk A", "111"), ("Talk B", "222")],
        Some("#"),
    )
    .await;
    site.mount_download("111", "talk-a.pdf", b"%PDF-A").await;
    site.mount_download("222", "../talk-b.pdf", b"%PDF-B").await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("downloads");
    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let report = harvester
        .run(&credentials(), &DownloadMode::Persist(target.clone()))
        .await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(
        report.records(),
        records(&[("Talk A", "talk-a.pdf"), ("Talk B", "talk-b.pdf")]).as_slice()
    );
    assert_eq!(std::fs::read(target.join("talk-a.pdf")).unwrap(), b"%PDF-A");
    assert_eq!(std::fs::read(target.join("talk-b.pdf")).unwrap(), b"%PDF-B");
    assert!(!dir.path().join("talk-b.pdf").exists());
    assert_eq!(browser.counters.closes(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_browsing_context() {
    let site = FixtureSite::start().await;
    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let incomplete = [
        Credentials::default(),
        Credentials {
            username: Some(USERNAME.into()),
            password: None,
        },
        Credentials::new("", PASSWORD),
    ];

    for credentials in &incomplete {
        let report = harvester.run(credentials, &DownloadMode::DryRun).await;
        assert!(report.records().is_empty());
        assert!(matches!(
            report.error(),
            Some(HarvestError::Precondition(_))
        ));
    }

    assert_eq!(browser.counters.launches(), 0);
    assert_eq!(browser.counters.gotos(), 0);
    assert_eq!(browser.counters.closes(), 0);
    assert_eq!(site.request_count().await, 0);
}

#[tokio::test]
async fn empty_listing_page_does_not_end_the_walk() {
    let site = FixtureSite::start().await;
    site.mount_listing("/uploads", &[], Some("/uploads/page/2"))
        .await;
    site.mount_listing("/uploads/page/2", &[("Talk C", "333")], Some("#"))
        .await;

    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(report.records(), records(&[("Talk C", "333.pdf")]).as_slice());
    assert_eq!(report.pages_completed(), 2);
}

#[tokio::test]
async fn missing_next_control_ends_the_walk() {
    let site = FixtureSite::start().await;
    site.mount_listing("/uploads", &[("Talk A", "111")], None).await;
    site.forbid("/uploads/page/2").await;

    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(report.records(), records(&[("Talk A", "111.pdf")]).as_slice());
    assert_eq!(report.pages_completed(), 1);
}

#[tokio::test]
async fn next_control_that_loads_nothing_ends_the_walk() {
    for href in ["#page=2", "javascript:void(0)"] {
        let site = FixtureSite::start().await;
        site.mount_listing("/uploads", &[("Talk A", "111")], Some(href))
            .await;

        let browser = CountingBrowser::new();
        let harvester = builder(&site, browser.clone())
            .with_captcha_provider(StubCaptcha::new())
            .build();

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            harvester.run(&credentials(), &DownloadMode::DryRun),
        )
        .await
        .unwrap_or_else(|_| panic!("walk did not end for next href {href}"));

        assert!(report.is_success(), "unexpected error: {:?}", report.error());
        assert_eq!(report.records(), records(&[("Talk A", "111.pdf")]).as_slice());
        assert_eq!(report.pages_completed(), 1);
        assert_eq!(browser.counters.closes(), 1);
    }
}

#[tokio::test]
async fn default_timing_paces_challenge_click_and_page_settling() {
    let site = FixtureSite::start().await;
    site.mount_listing("/uploads", &[("Talk A", "111")], Some("/uploads/page/2"))
        .await;
    site.mount_listing("/uploads/page/2", &[("Talk B", "222")], Some("#"))
        .await;

    let profile = site.site_profile();
    let browser = RecordingBrowser::new();
    let harvester = UploadHarvester::builder()
        .with_site_profile(profile.clone())
        .with_timing(InteractionTiming::default())
        .with_browser(browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;
    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(report.pages_completed(), 2);

    let calls = browser.calls();
    let entry = calls
        .iter()
        .find_map(|call| match call {
            Call::Located(locator, handle) if *locator == profile.challenge_entry => {
                Some(handle.clone())
            }
            _ => None,
        })
        .expect("challenge entry was never located");
    let entry_delays: Vec<Duration> = calls
        .iter()
        .filter_map(|call| match call {
            Call::Clicked(handle, delay) if *handle == entry => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(entry_delays, vec![Duration::from_millis(300)]);

    let row_scans: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, Call::LocatedAll(locator) if *locator == profile.listing_row))
        .map(|(position, _)| position)
        .collect();
    assert_eq!(row_scans.len(), 2);
    for position in row_scans {
        assert!(position > 0);
        assert_eq!(calls[position - 1], Call::Waited(Duration::from_secs(1)));
    }
}

#[tokio::test]
async fn page_bound_stops_before_following_next() {
    let site = FixtureSite::start().await;
    site.mount_listing("/uploads", &[("Talk A", "111")], Some("/uploads/page/2"))
        .await;
    site.forbid("/uploads/page/2").await;

    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .with_max_pages(1)
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(report.is_success(), "unexpected error: {:?}", report.error());
    assert_eq!(report.records(), records(&[("Talk A", "111.pdf")]).as_slice());
    assert_eq!(browser.counters.closes(), 1);
}

#[tokio::test]
async fn rejected_challenge_aborts_and_closes_once() {
    let site = FixtureSite::start().await;
    site.forbid("/uploads").await;

    let browser = CountingBrowser::new();
    let recorder = Arc::new(StateRecorder::default());
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(Arc::new(RejectingCaptcha))
        .with_event_handler(recorder.clone())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(report.records().is_empty());
    assert!(matches!(
        report.error(),
        Some(HarvestError::ChallengeUnresolved(_))
    ));
    assert_eq!(browser.counters.closes(), 1);
    assert_eq!(
        recorder.states(),
        vec![
            RunState::Authenticating,
            RunState::Failed,
            RunState::Closing,
            RunState::Done,
        ]
    );
}

#[tokio::test]
async fn challenge_without_provider_is_unresolved() {
    let site = FixtureSite::start().await;

    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone()).build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(matches!(
        report.error(),
        Some(HarvestError::ChallengeUnresolved(_))
    ));
    assert_eq!(browser.counters.closes(), 1);
}

#[tokio::test]
async fn failure_on_later_page_keeps_completed_pages() {
    let site = FixtureSite::start().await;
    site.mount_listing(
        "/uploads",
        &[("Talk A", "111"), ("Talk B", "222")],
        Some("/uploads/page/2"),
    )
    .await;
    site.mount_failure("/uploads/page/2", 500).await;

    let browser = CountingBrowser::new();
    let recorder = Arc::new(StateRecorder::default());
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .with_event_handler(recorder.clone())
        .build();

    let report = harvester.run(&credentials(), &DownloadMode::DryRun).await;

    assert!(matches!(report.error(), Some(HarvestError::Navigation(_))));
    assert_eq!(
        report.records(),
        records(&[("Talk A", "111.pdf"), ("Talk B", "222.pdf")]).as_slice()
    );
    assert_eq!(report.pages_completed(), 1);
    assert_eq!(browser.counters.closes(), 1);

    let states = recorder.states();
    assert!(states.contains(&RunState::Harvesting { page: 1 }));
    assert!(!states.contains(&RunState::Failed));
    assert!(states.ends_with(&[RunState::Closing, RunState::Done]));
}

#[tokio::test]
async fn failure_mid_page_discards_that_page() {
    let site = FixtureSite::start().await;
    site.mount_listing(
        "/uploads",
        &[("Talk A", "111"), ("Talk B", "222")],
        Some("#"),
    )
    .await;
    site.mount_download("111", "talk-a.pdf", b"%PDF-A").await;
    site.mount_failure("/download/222", 500).await;

    let dir = tempfile::tempdir().unwrap();
    let browser = CountingBrowser::new();
    let harvester = builder(&site, browser.clone())
        .with_captcha_provider(StubCaptcha::new())
        .build();

    let report = harvester
        .run(&credentials(), &DownloadMode::Persist(dir.path().to_path_buf()))
        .await;

    assert!(report.error().is_some());
    assert!(report.records().is_empty());
    assert_eq!(report.pages_completed(), 0);
    assert_eq!(browser.counters.closes(), 1);
}

#[tokio::test]
async fn into_result_surfaces_the_error() {
    let site = FixtureSite::start().await;
    let harvester = builder(&site, CountingBrowser::new()).build();

    let result = harvester
        .run(&Credentials::default(), &DownloadMode::DryRun)
        .await
        .into_result();

    assert!(matches!(result, Err(HarvestError::Precondition(_))));
}
