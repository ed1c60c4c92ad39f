use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aes::Aes128;
use async_trait::async_trait;
use bytes::Bytes;
use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use grabber_engine::assembler::{partial_path, resume_state_path};
use grabber_engine::{
    DownloadError, DownloadOptions, DownloadSession, DownloadSource, FetchError, SessionEvent,
    SessionState, Transport, TransportRequest,
};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use stream_resolver::{
    PageFetcher, PageReference, PageRequest, PageResponse, Resolver, SiteLayout, TransportError,
};
use tokio::sync::Semaphore;
use url::Url;

const PLAYLIST_URL: &str = "https://cdn.example/hls/index.m3u8";

#[derive(Clone, Default)]
struct Route {
    body: Vec<u8>,
    delay: Duration,
    /// Leading calls answered with this status instead of the body.
    failures: usize,
    failure_status: u16,
    gate: Option<Arc<Semaphore>>,
}

impl Route {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    fn delayed(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn failing(mut self, times: usize, status: u16) -> Self {
        self.failures = times;
        self.failure_status = status;
        self
    }

    fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// In-memory transport keyed by absolute URL.
#[derive(Default)]
struct FakeTransport {
    routes: HashMap<String, Route>,
    calls: Mutex<HashMap<String, usize>>,
    headers: Mutex<HashMap<String, HeaderMap>>,
    segment_calls: AtomicUsize,
}

impl FakeTransport {
    fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    fn headers_for(&self, url: &str) -> Option<HeaderMap> {
        self.headers.lock().get(url).cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, request: &TransportRequest) -> Result<Bytes, FetchError> {
        let url = request.url.to_string();
        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(url.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.headers
            .lock()
            .insert(url.clone(), request.headers.clone());
        if !url.ends_with(".m3u8") && !url.ends_with(".bin") {
            self.segment_calls.fetch_add(1, Ordering::SeqCst);
        }

        let Some(route) = self.routes.get(&url) else {
            return Err(FetchError::bad_status(404, url));
        };
        if let Some(gate) = &route.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| FetchError::transport("gate closed", false))?;
        }
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        if call <= route.failures {
            return Err(FetchError::bad_status(route.failure_status, url));
        }

        let body = match request.range {
            Some(range) => {
                let start = (range.offset as usize).min(route.body.len());
                let end = (range.end() as usize).min(route.body.len());
                route.body[start..end].to_vec()
            }
            None => route.body.clone(),
        };
        Ok(Bytes::from(body))
    }
}

fn media_playlist(segments: &[&str]) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n");
    for segment in segments {
        text.push_str("#EXTINF:4.0,\n");
        text.push_str(segment);
        text.push('\n');
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

fn segment_url(name: &str) -> String {
    format!("https://cdn.example/hls/{name}")
}

/// Honors `RUST_LOG` when debugging a failing scenario.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_options() -> DownloadOptions {
    DownloadOptions::default()
        .with_retry_delays(Duration::from_millis(1), Duration::from_millis(5))
        .with_retry_jitter(false)
}

fn session(
    transport: Arc<FakeTransport>,
    dest: &std::path::Path,
    options: DownloadOptions,
) -> DownloadSession {
    DownloadSession::new(
        DownloadSource::ManifestUrl(Url::parse(PLAYLIST_URL).unwrap()),
        dest,
        options,
    )
    .with_transport(transport)
}

#[tokio::test]
async fn three_segments_assemble_into_one_file() {
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["a.ts", "b.ts", "c.ts"])))
            .route(&segment_url("a.ts"), Route::ok(vec![b'a'; 10]).delayed(20))
            .route(&segment_url("b.ts"), Route::ok(vec![b'b'; 20]))
            .route(&segment_url("c.ts"), Route::ok(vec![b'c'; 10]).delayed(5)),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport, &dest, fast_options().with_concurrency(2))
        .run()
        .await;

    assert_eq!(outcome.path.as_deref(), Some(dest.as_path()));
    assert!(outcome.error.is_none());
    assert!(!outcome.stopped);

    let data = std::fs::read(&dest).unwrap();
    assert_eq!(data.len(), 40);
    let mut expected = vec![b'a'; 10];
    expected.extend(vec![b'b'; 20]);
    expected.extend(vec![b'c'; 10]);
    assert_eq!(data, expected);
    assert!(!partial_path(&dest).exists());
}

#[tokio::test]
async fn output_order_is_independent_of_completion_order() {
    let names = ["s0.ts", "s1.ts", "s2.ts", "s3.ts"];
    let delay_sets: [[u64; 4]; 5] = [
        [0, 0, 0, 0],
        [30, 20, 10, 0],
        [0, 30, 0, 15],
        [15, 0, 30, 5],
        [5, 25, 0, 30],
    ];

    for delays in delay_sets {
        let mut transport = FakeTransport::default().route(PLAYLIST_URL, Route::ok(media_playlist(&names)));
        for (i, name) in names.iter().enumerate() {
            transport = transport.route(
                &segment_url(name),
                Route::ok(vec![i as u8; 3 + i]).delayed(delays[i]),
            );
        }
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.ts");

        let outcome = session(Arc::new(transport), &dest, fast_options().with_concurrency(4))
            .run()
            .await;
        assert!(outcome.is_success(), "delays {delays:?}: {:?}", outcome.error);

        let expected: Vec<u8> = (0..4u8).flat_map(|i| vec![i; 3 + i as usize]).collect();
        assert_eq!(std::fs::read(&dest).unwrap(), expected, "delays {delays:?}");
    }
}

#[tokio::test]
async fn retry_budget_counts_every_attempt() {
    init_tracing();
    let flaky = segment_url("b.ts");
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["a.ts", "b.ts"])))
            .route(&segment_url("a.ts"), Route::ok(vec![1; 4]))
            // Would succeed on the fourth call.
            .route(&flaky, Route::ok(vec![2; 4]).failing(3, 503)),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(
        transport.clone(),
        &dest,
        fast_options().with_retries_per_segment(3),
    )
    .run()
    .await;

    assert!(outcome.path.is_none());
    assert!(!outcome.stopped);
    match outcome.error {
        Some(DownloadError::Segment { index, source }) => {
            assert_eq!(index, 1);
            assert_eq!(source, FetchError::bad_status(503, flaky.clone()));
        }
        other => panic!("expected a segment error, got {other:?}"),
    }
    assert_eq!(transport.calls(&flaky), 3);
    assert!(!dest.exists());
    assert!(!partial_path(&dest).exists());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let missing = segment_url("gone.ts");
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["gone.ts"])))
            .route(&missing, Route::ok(vec![0; 4]).failing(10, 403)),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport.clone(), &dest, fast_options()).run().await;
    assert!(matches!(
        outcome.error,
        Some(DownloadError::Segment {
            source: FetchError::BadStatus { status: 403, .. },
            ..
        })
    ));
    assert_eq!(transport.calls(&missing), 1);
}

#[tokio::test]
async fn cancellation_drains_in_flight_fetches() {
    init_tracing();
    let names = ["c0.ts", "c1.ts", "c2.ts", "c3.ts", "c4.ts"];
    let gate = Arc::new(Semaphore::new(0));
    let mut transport = FakeTransport::default().route(PLAYLIST_URL, Route::ok(media_playlist(&names)));
    for name in names {
        transport = transport.route(&segment_url(name), Route::ok(vec![7; 10]).gated(gate.clone()));
    }
    let transport = Arc::new(transport);
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let running = session(transport.clone(), &dest, fast_options().with_concurrency(2)).start();

    // Wait for the two permitted fetches to be in flight.
    for _ in 0..200 {
        if transport.segment_calls.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(transport.segment_calls.load(Ordering::SeqCst), 2);
    assert_eq!(running.handle.state(), SessionState::Downloading);

    running.handle.cancel();
    gate.add_permits(names.len());

    let outcome = running.join.await.unwrap();
    assert!(outcome.stopped);
    assert!(outcome.path.is_none());
    assert!(matches!(outcome.error, Some(DownloadError::Cancelled)));
    assert_eq!(running.handle.finished().await, SessionState::Cancelled);

    // Nothing was dispatched after the cancel.
    assert_eq!(transport.segment_calls.load(Ordering::SeqCst), 2);
    assert!(!dest.exists());
    let partial_len = std::fs::metadata(partial_path(&dest)).unwrap().len();
    assert!(partial_len <= 20, "partial holds {partial_len} bytes");
}

#[tokio::test]
async fn resumable_session_continues_after_failure() {
    let names = ["r0.ts", "r1.ts", "r2.ts", "r3.ts"];
    let bodies: Vec<Vec<u8>> = (0..4u8).map(|i| vec![b'0' + i; 5 + i as usize]).collect();
    let build = |broken: Option<&str>| {
        let mut transport = FakeTransport::default().route(PLAYLIST_URL, Route::ok(media_playlist(&names)));
        for (name, body) in names.iter().zip(&bodies) {
            let route = match broken {
                Some(b) if b == *name => Route::ok(body.clone()).failing(usize::MAX, 404),
                _ => Route::ok(body.clone()),
            };
            transport = transport.route(&segment_url(name), route);
        }
        Arc::new(transport)
    };
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");
    let options = fast_options().with_concurrency(1).with_resumable(true);

    let first = build(Some("r2.ts"));
    let outcome = session(first, &dest, options.clone()).run().await;
    assert!(matches!(
        outcome.error,
        Some(DownloadError::Segment { index: 2, .. })
    ));
    assert!(partial_path(&dest).exists());
    assert!(resume_state_path(&dest).exists());

    let second = build(None);
    let outcome = session(second.clone(), &dest, options).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(second.calls(&segment_url("r0.ts")), 0);
    assert_eq!(second.calls(&segment_url("r1.ts")), 0);
    assert_eq!(second.calls(&segment_url("r2.ts")), 1);

    assert_eq!(std::fs::read(&dest).unwrap(), bodies.concat());
    assert!(!resume_state_path(&dest).exists());
}

fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, iv).unwrap();
    let mut buffer = vec![0u8; (plaintext.len() / 16 + 1) * 16];
    buffer[..plaintext.len()].copy_from_slice(plaintext);
    cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn encrypted_segments_use_sequence_numbers_as_iv() {
    let key = [0x3cu8; 16];
    let seven = 7u128.to_be_bytes();
    let eight = 8u128.to_be_bytes();
    let first = b"first encrypted segment".to_vec();
    let second = b"second one, a little longer than the first".to_vec();

    let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:7\n\
        #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
        #EXTINF:4,\ne7.ts\n#EXTINF:4,\ne8.ts\n#EXT-X-ENDLIST\n";
    let key_url = segment_url("key.bin");

    for offload in [false, true] {
        let transport = Arc::new(
            FakeTransport::default()
                .route(PLAYLIST_URL, Route::ok(playlist))
                .route(&key_url, Route::ok(key.to_vec()))
                .route(&segment_url("e7.ts"), Route::ok(encrypt(&first, &key, &seven)))
                .route(&segment_url("e8.ts"), Route::ok(encrypt(&second, &key, &eight))),
        );
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.ts");

        let outcome = session(
            transport.clone(),
            &dest,
            fast_options().with_offload_decryption(offload),
        )
        .run()
        .await;
        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(std::fs::read(&dest).unwrap(), [first.clone(), second.clone()].concat());
        assert_eq!(transport.calls(&key_url), 1);
    }
}

#[tokio::test]
async fn byte_range_segments_are_sliced_from_one_resource() {
    let resource: Vec<u8> = (0..30u8).collect();
    let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:10@0\nall.ts\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:12\nall.ts\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:8\nall.ts\n#EXT-X-ENDLIST\n";
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(playlist))
            .route(&segment_url("all.ts"), Route::ok(resource.clone())),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport, &dest, fast_options()).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(std::fs::read(&dest).unwrap(), resource);
}

#[tokio::test]
async fn zero_length_ranges_are_skipped_instead_of_failing_the_session() {
    let resource: Vec<u8> = (0..20u8).collect();
    let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:0@5\nempty.ts\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:10@0\nall.ts\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:10\nall.ts\n#EXT-X-ENDLIST\n";
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(playlist))
            .route(&segment_url("empty.ts"), Route::ok(vec![0xff; 8]))
            .route(&segment_url("all.ts"), Route::ok(resource.clone())),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport.clone(), &dest, fast_options()).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(std::fs::read(&dest).unwrap(), resource);
    assert_eq!(transport.calls(&segment_url("empty.ts")), 0);
}

#[tokio::test]
async fn master_without_usable_variants_fails_to_parse() {
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=abc\nlow.m3u8\n\
        #EXT-X-STREAM-INF:RESOLUTION=1x1\nhigh.m3u8\n";
    let transport = Arc::new(FakeTransport::default().route(PLAYLIST_URL, Route::ok(master)));
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport, &dest, fast_options()).run().await;
    assert!(matches!(
        outcome.error,
        Some(DownloadError::Parse(playlist::ParseError::NoVariants))
    ));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn short_range_bodies_are_retried_then_fail() {
    let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n\
        #EXTINF:4,\n#EXT-X-BYTERANGE:100@0\nshort.ts\n#EXT-X-ENDLIST\n";
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(playlist))
            .route(&segment_url("short.ts"), Route::ok(vec![0; 40])),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport.clone(), &dest, fast_options()).run().await;
    assert!(matches!(
        outcome.error,
        Some(DownloadError::Segment {
            source: FetchError::TruncatedRange {
                expected: 100,
                received: 40
            },
            ..
        })
    ));
    assert_eq!(transport.calls(&segment_url("short.ts")), 3);
}

#[tokio::test]
async fn master_playlist_follows_selected_variant() {
    let master = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\nlow/index.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720\nhigh/index.m3u8\n";
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(master))
            .route(
                "https://cdn.example/hls/high/index.m3u8",
                Route::ok(media_playlist(&["h0.ts"])),
            )
            .route("https://cdn.example/hls/high/h0.ts", Route::ok(b"HIGH".to_vec())),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport.clone(), &dest, fast_options()).run().await;
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(std::fs::read(&dest).unwrap(), b"HIGH");
    assert_eq!(transport.calls("https://cdn.example/hls/low/index.m3u8"), 0);
}

#[tokio::test]
async fn malformed_manifest_fails_before_touching_disk() {
    let transport = Arc::new(
        FakeTransport::default().route(PLAYLIST_URL, Route::ok("<html>not a playlist</html>")),
    );
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");

    let outcome = session(transport, &dest, fast_options()).run().await;
    assert!(matches!(outcome.error, Some(DownloadError::Parse(_))));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn page_sources_need_a_resolver() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = DownloadSession::new(
        DownloadSource::Page(PageReference::content(1)),
        dir.path().join("out.ts"),
        fast_options(),
    )
    .with_transport(Arc::new(FakeTransport::default()))
    .run()
    .await;
    assert!(matches!(outcome.error, Some(DownloadError::ResolverMissing)));
}

struct FakePages {
    pages: HashMap<String, String>,
}

#[async_trait]
impl PageFetcher for FakePages {
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse, TransportError> {
        match self.pages.get(request.url.as_str()) {
            Some(body) => Ok(PageResponse {
                url: request.url,
                body: body.clone(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                url: request.url.to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn page_reference_is_resolved_then_downloaded() {
    init_tracing();
    let pages = FakePages {
        pages: HashMap::from([(
            "https://site.example/iframe/42?episode_id=7".to_string(),
            format!(r#"<script>var video = {{ src: "{PLAYLIST_URL}" }};</script>"#),
        )]),
    };
    let layout = SiteLayout::new(Url::parse("https://site.example").unwrap());
    let resolver = Arc::new(Resolver::new(Arc::new(pages), layout));

    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["p0.ts"])))
            .route(&segment_url("p0.ts"), Route::ok(b"page video".to_vec())),
    );
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.ts");
    let outcome = DownloadSession::new(
        DownloadSource::Page(PageReference::content(42).with_episode(7)),
        &dest,
        fast_options(),
    )
    .with_transport(transport.clone())
    .with_resolver(resolver)
    .on_event(move |event| sink.lock().push(event.clone()))
    .run()
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(std::fs::read(&dest).unwrap(), b"page video");

    let headers = transport.headers_for(&segment_url("p0.ts")).unwrap();
    assert_eq!(headers["referer"], "https://site.example/watch/42?e=7");
    assert_eq!(headers["origin"], "https://site.example");

    let events = events.lock();
    let states: Vec<SessionState> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Resolving,
            SessionState::Downloading,
            SessionState::Completed
        ]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Resolved { trace, .. } if trace.len() == 1
    )));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Finished {
            state: SessionState::Completed
        })
    ));
}

#[tokio::test]
async fn caller_headers_win_over_resolved_ones() {
    let pages = FakePages {
        pages: HashMap::from([(
            "https://site.example/iframe/42?episode_id=7".to_string(),
            format!("<p>{PLAYLIST_URL}</p>"),
        )]),
    };
    let layout = SiteLayout::new(Url::parse("https://site.example").unwrap());
    let resolver = Arc::new(Resolver::new(Arc::new(pages), layout));
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["p0.ts"])))
            .route(&segment_url("p0.ts"), Route::ok(b"x".to_vec())),
    );

    let dir = tempfile::tempdir().unwrap();
    let outcome = DownloadSession::new(
        DownloadSource::Page(PageReference::content(42).with_episode(7)),
        dir.path().join("out.ts"),
        fast_options().with_header("Referer", "https://mine.example/"),
    )
    .with_transport(transport.clone())
    .with_resolver(resolver)
    .run()
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let headers = transport.headers_for(PLAYLIST_URL).unwrap();
    assert_eq!(headers["referer"], "https://mine.example/");
}

#[tokio::test]
async fn status_reports_progress() {
    let transport = Arc::new(
        FakeTransport::default()
            .route(PLAYLIST_URL, Route::ok(media_playlist(&["a.ts", "b.ts"])))
            .route(&segment_url("a.ts"), Route::ok(vec![1; 6]))
            .route(&segment_url("b.ts"), Route::ok(vec![2; 4])),
    );
    let dir = tempfile::tempdir().unwrap();
    let running = session(transport, &dir.path().join("out.ts"), fast_options()).start();
    let handle = running.handle.clone();

    let outcome = running.join.await.unwrap();
    assert!(outcome.is_success());
    let status = handle.status();
    assert_eq!(status.state, SessionState::Completed);
    assert_eq!(status.segments_done, 2);
    assert_eq!(status.total_segments, 2);
    assert_eq!(status.bytes_written, 10);
}
