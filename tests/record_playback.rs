use fixture_recorder::error::TransportError;
use fixture_recorder::{
    FixtureError, FixtureRecorder, Mode, OutboundRequest, RecorderConfig, RecorderSettings,
    Response, RuleRegistry,
};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn rules_yaml(cache_dir: &Path) -> String {
    format!(
        r#"
cache_dir: '{}'
services:
  - name: library
    base_urls: [bnb.data.bl.uk]
    endpoints:
      - method: get
        path: /doc/resource/*
        file_path: bnb/doc/resource
  - name: mvi
    base_urls: [mvi.example.com]
    endpoints:
      - method: post
        path: /psim
        file_path: mvi/profile
        cache_multiple_responses:
          uid_location: body
          uid_locator: '<ssn>(\d{{9}})</ssn>'
  - name: animals
    base_urls: [animal.pics]
    endpoints:
      - method: post
        path: /get_animals
        file_path: animals
        cache_multiple_responses:
          uid_location: body
          uid_locator: '<Id>(\d+)</Id>'
          optional_code_locator: '<Quality>(.*)</Quality>'
  - name: search
    base_urls: [search.example.com]
    endpoints:
      - method: get
        path: /x
        file_path: search
        cache_multiple_responses:
          uid_location: query
          uid_locator: id
  - name: broken
    base_urls: [broken.example.com]
    endpoints:
      - method: get
        path: /missing
        file_path: broken/missing
        error:
          status: 404
          body: not here
      - method: get
        path: /proxy
        file_path: broken/proxy
        error:
          status: 407
      - method: get
        path: /teapot
        file_path: broken/teapot
        error:
          status: 418
          body: short and stout
  - name: slow
    base_urls: [slow.example.com]
    endpoints:
      - method: get
        path: /fast-enough
        file_path: slow/short
        response_delay: 0.05
      - method: get
        path: /very-slow
        file_path: slow/long
        response_delay: 2
"#,
        cache_dir.display()
    )
}

struct Fixture {
    dir: TempDir,
    recorder: FixtureRecorder,
}

impl Fixture {
    fn new(mode: Mode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig::from_yaml(&rules_yaml(dir.path())).unwrap();
        let recorder = FixtureRecorder::new(
            RuleRegistry::from_config(&config).unwrap(),
            RecorderSettings::new(true, mode),
        );
        Self { dir, recorder }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(self.dir.path(), &mut found);
        found.sort();
        found
    }
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(&path, found);
        } else {
            found.push(path);
        }
    }
}

fn request(method: &str, url: &str) -> OutboundRequest {
    OutboundRequest::new(method, url).unwrap()
}

fn ssn_request(ssn: &str) -> OutboundRequest {
    request("POST", "http://mvi.example.com/psim")
        .with_body(format!("<Envelope><ssn>{}</ssn></Envelope>", ssn))
}

#[test]
fn unregistered_host_passes_through() {
    let fixture = Fixture::new(Mode::Recording);
    let calls = Cell::new(0);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        calls.set(calls.get() + 1);
        Ok(Response::new(200, "live"))
    };

    let response = fixture
        .recorder
        .call(&request("GET", "http://foo.com/v2/bar.json"), &transport)
        .unwrap();

    assert_eq!(response.body, "live");
    assert_eq!(calls.get(), 1);
    assert!(fixture.files().is_empty());
}

#[test]
fn recorded_response_is_replayed() {
    let fixture = Fixture::new(Mode::Recording);
    let book = request("GET", "http://bnb.data.bl.uk/doc/resource/009407494.json");
    let calls = Cell::new(0);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        calls.set(calls.get() + 1);
        Ok(Response::new(200, "Infinite Jest").with_header("Content-Type", "application/json"))
    };

    fixture.recorder.call(&book, &transport).unwrap();
    assert!(fixture.path("bnb/doc/resource.yml").is_file());

    fixture.recorder.settings().set_mode(Mode::Playback);
    let replayed = fixture.recorder.call(&book, &transport).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(replayed.status, 200);
    assert_eq!(replayed.body, "Infinite Jest");
    assert_eq!(
        replayed.headers["Content-Type"].values(),
        vec!["application/json"]
    );
}

#[test]
fn recording_always_refreshes_fixture() {
    let fixture = Fixture::new(Mode::Recording);
    let book = request("GET", "http://bnb.data.bl.uk/doc/resource/009407494.json");
    let body = Cell::new("first");
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, body.get()))
    };

    fixture.recorder.call(&book, &transport).unwrap();
    body.set("second");
    let response = fixture.recorder.call(&book, &transport).unwrap();

    assert_eq!(response.body, "second");
    assert_eq!(fixture.files(), vec![fixture.path("bnb/doc/resource.yml")]);
    let raw = fs::read_to_string(fixture.path("bnb/doc/resource.yml")).unwrap();
    assert!(raw.contains("second"));
    assert!(!raw.contains("first"));
}

#[test]
fn distinct_identifiers_get_distinct_fixtures() {
    let fixture = Fixture::new(Mode::Recording);
    let transport = |request: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, request.body().to_string()))
    };

    fixture.recorder.call(&ssn_request("111223333"), &transport).unwrap();
    fixture.recorder.call(&ssn_request("444555666"), &transport).unwrap();
    fixture.recorder.call(&ssn_request("not-an-ssn"), &transport).unwrap();

    let files = fixture.files();
    assert_eq!(files.len(), 3);
    assert!(fixture.path("mvi/profile/111223333.yml").is_file());
    assert!(fixture.path("mvi/profile/444555666.yml").is_file());

    let unidentified = fixture
        .recorder
        .resolve(&ssn_request("not-an-ssn"))
        .unwrap()
        .unwrap();
    assert_eq!(unidentified.identifier, None);
    assert!(unidentified.key.path().is_file());
    assert_ne!(unidentified.key.path(), fixture.path("mvi/profile/111223333.yml"));
}

#[test]
fn grouped_fixtures_are_written_under_grouping() {
    let fixture = Fixture::new(Mode::Recording);
    let gorilla = request("POST", "http://animal.pics/get_animals").with_body(
        "<Animal><Quality>\"HI-DEF\"</Quality><AnimalType>Gorilla</AnimalType><Id>12345678</Id></Animal>",
    );
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, "gorilla"))
    };

    fixture.recorder.call(&gorilla, &transport).unwrap();

    assert!(fixture.path("animals/HIDEF/12345678.yml").is_file());
}

#[test]
fn recording_never_overwrites_default_fixture() {
    let fixture = Fixture::new(Mode::Recording);
    let curated = "method: get\nbody: curated fallback\nheaders: {}\nstatus: 200\n";
    fs::create_dir_all(fixture.path("search")).unwrap();
    fs::write(fixture.path("search/default.yml"), curated).unwrap();
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(500, "live error"))
    };

    fixture
        .recorder
        .call(&request("GET", "http://search.example.com/x?id=default"), &transport)
        .unwrap();

    assert_eq!(
        fs::read_to_string(fixture.path("search/default.yml")).unwrap(),
        curated
    );
    assert!(fixture.path("search/_default.yml").is_file());
}

#[test]
fn binary_responses_are_recorded_and_replayed() {
    let fixture = Fixture::new(Mode::Recording);
    let pdf: Vec<u8> = b"%PDF-1.4\n\xff\xfe\x00\x9c".to_vec();
    let payload = pdf.clone();
    let transport = move |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, payload.clone()).with_header("Content-Type", "application/pdf"))
    };
    let letter = request("GET", "http://bnb.data.bl.uk/doc/resource/letter.pdf");

    fixture.recorder.call(&letter, &transport).unwrap();
    fixture.recorder.settings().set_mode(Mode::Playback);
    let replayed = fixture.recorder.call(&letter, &transport).unwrap();

    assert_eq!(replayed.body.as_bytes(), &pdf[..]);
}

#[test]
fn playback_without_fixture_or_default_fails() {
    let fixture = Fixture::new(Mode::Playback);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        panic!("playback must not call out")
    };

    let result = fixture.recorder.call(&ssn_request("111223333"), &transport);

    assert!(matches!(result, Err(FixtureError::MissingDefault { .. })));
}

#[test]
fn playback_falls_back_to_default() {
    let fixture = Fixture::new(Mode::Playback);
    fs::create_dir_all(fixture.path("mvi/profile")).unwrap();
    fs::write(
        fixture.path("mvi/profile/default.yml"),
        "method: post\nbody: default profile\nheaders: {}\nstatus: 200\n",
    )
    .unwrap();
    let before = fixture.files();
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        panic!("playback must not call out")
    };

    let response = fixture
        .recorder
        .call(&ssn_request("111223333"), &transport)
        .unwrap();

    assert_eq!(response.body, "default profile");
    assert_eq!(fixture.files(), before);
}

#[test]
fn playback_prefers_recorded_fixture_over_default() {
    let fixture = Fixture::new(Mode::Recording);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, "recorded"))
    };
    fixture.recorder.call(&ssn_request("111223333"), &transport).unwrap();
    fs::write(
        fixture.path("mvi/profile/default.yml"),
        "method: post\nbody: default\nheaders: {}\nstatus: 200\n",
    )
    .unwrap();

    fixture.recorder.settings().set_mode(Mode::Playback);
    let response = fixture
        .recorder
        .call(&ssn_request("111223333"), &transport)
        .unwrap();

    assert_eq!(response.body, "recorded");
}

#[test]
fn corrupt_fixture_is_not_a_cache_miss() {
    let fixture = Fixture::new(Mode::Playback);
    fs::create_dir_all(fixture.path("bnb/doc")).unwrap();
    fs::write(fixture.path("bnb/doc/resource.yml"), "status: [not, a, number").unwrap();
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        panic!("playback must not call out")
    };

    let result = fixture.recorder.call(
        &request("GET", "http://bnb.data.bl.uk/doc/resource/009407494.json"),
        &transport,
    );

    assert!(matches!(result, Err(FixtureError::CorruptFixture { .. })));
}

#[test]
fn disabled_recorder_never_touches_rules_or_fixtures() {
    let recorder = FixtureRecorder::new(
        RuleRegistry::from_file("/this/does/not/exist.yml"),
        RecorderSettings::new(false, Mode::Playback),
    );
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, "live"))
    };

    let response = recorder
        .call(&request("GET", "http://bnb.data.bl.uk/doc/resource/1.json"), &transport)
        .unwrap();

    assert_eq!(response.body, "live");
    assert!(!recorder.registry().is_loaded());
}

#[test]
fn test_environment_forces_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig::from_yaml(&rules_yaml(dir.path())).unwrap();
    let recorder = FixtureRecorder::new(
        RuleRegistry::from_config(&config).unwrap(),
        RecorderSettings::new(true, Mode::Recording).with_environment("test"),
    );
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, "live"))
    };

    recorder
        .call(&request("GET", "http://bnb.data.bl.uk/doc/resource/1.json"), &transport)
        .unwrap();

    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn simulated_errors_are_raised_in_every_mode() {
    for mode in [Mode::Recording, Mode::Playback] {
        let fixture = Fixture::new(mode);
        let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
            panic!("simulated errors must not call out")
        };

        let missing = fixture
            .recorder
            .call(&request("GET", "http://broken.example.com/missing"), &transport);
        assert!(matches!(missing, Err(FixtureError::SimulatedNotFound { body }) if body == "not here"));

        let proxy = fixture
            .recorder
            .call(&request("GET", "http://broken.example.com/proxy"), &transport);
        assert!(matches!(proxy, Err(FixtureError::SimulatedProxyAuth)));

        match fixture
            .recorder
            .call(&request("GET", "http://broken.example.com/teapot"), &transport)
        {
            Err(FixtureError::SimulatedClient { status, body }) => {
                assert_eq!(status, 418);
                assert_eq!(body, "short and stout");
            }
            other => panic!("expected simulated client error, got {:?}", other),
        }
        assert!(fixture.files().is_empty());
    }
}

#[test]
fn delay_applies_in_playback() {
    let fixture = Fixture::new(Mode::Playback);
    fs::create_dir_all(fixture.path("slow")).unwrap();
    fs::write(
        fixture.path("slow/short.yml"),
        "method: get\nbody: eventually\nheaders: {}\nstatus: 200\n",
    )
    .unwrap();
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        panic!("playback must not call out")
    };

    let started = Instant::now();
    let response = fixture
        .recorder
        .call(&request("GET", "http://slow.example.com/fast-enough"), &transport)
        .unwrap();

    assert_eq!(response.body, "eventually");
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn delay_skipped_while_recording() {
    let fixture = Fixture::new(Mode::Recording);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Ok(Response::new(200, "quick"))
    };

    let started = Instant::now();
    fixture
        .recorder
        .call(&request("GET", "http://slow.example.com/very-slow"), &transport)
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(fixture.path("slow/long.yml").is_file());
}

#[test]
fn failed_transport_records_nothing() {
    let fixture = Fixture::new(Mode::Recording);
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        Err("connection refused".into())
    };

    let result = fixture.recorder.call(
        &request("GET", "http://bnb.data.bl.uk/doc/resource/1.json"),
        &transport,
    );

    assert!(matches!(result, Err(FixtureError::Transport(_))));
    assert!(fixture.files().is_empty());
}

#[test]
fn missing_cache_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let config = RecorderConfig::from_yaml(&rules_yaml(&missing)).unwrap();
    let recorder = FixtureRecorder::new(
        RuleRegistry::from_config(&config).unwrap(),
        RecorderSettings::new(true, Mode::Playback),
    );
    let transport = |_: &OutboundRequest| -> Result<Response, TransportError> {
        panic!("playback must not call out")
    };

    let result = recorder.call(
        &request("GET", "http://bnb.data.bl.uk/doc/resource/1.json"),
        &transport,
    );

    assert!(matches!(result, Err(FixtureError::CacheDirMissing { .. })));
}
