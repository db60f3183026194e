use futures::future::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracedeck::capture::{CaptureParser, ParseOptions, TraceBytes};
use tracedeck::domain::{ParseError, TraceId};
use tracedeck_common::ToolKind;

const CALLERS: usize = 16;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread().worker_threads(4).enable_all().build().unwrap()
}

fn slow_fixture(name: &'static str) -> TraceBytes {
    async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::read(format!("tests/fixtures/{name}"))
            .map_err(|e| ParseError::Unavailable(e.to_string()))
    }
    .boxed()
}

#[test]
fn test_concurrent_requests_parse_once() {
    let rt = runtime();
    let cache = Arc::new(CaptureParser::new(rt.handle().clone()));
    let sources = Arc::new(AtomicUsize::new(0));

    let captures: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let sources = Arc::clone(&sources);
                scope.spawn(move || {
                    let future = cache.get_or_parse(
                        TraceId(7),
                        || {
                            sources.fetch_add(1, Ordering::SeqCst);
                            slow_fixture("art_trace.json")
                        },
                        ParseOptions::new(ToolKind::Art),
                    );
                    futures::executor::block_on(future).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sources.load(Ordering::SeqCst), 1);
    assert_eq!(cache.parse_count(), 1);
    assert!(captures.iter().all(|c| Arc::ptr_eq(c, &captures[0])));
}

#[test]
fn test_concurrent_requests_share_failure() {
    let rt = runtime();
    let cache = Arc::new(CaptureParser::new(rt.handle().clone()));

    let errors: Vec<ParseError> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    let future = cache.get_or_parse(
                        TraceId(8),
                        || slow_fixture("simpleperf_trace.json"),
                        ParseOptions::new(ToolKind::Art),
                    );
                    futures::executor::block_on(future).unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let expected = ParseError::BadFormat { expected: ToolKind::Art, found: ToolKind::Simpleperf };
    assert!(errors.iter().all(|e| *e == expected));
    assert_eq!(cache.parse_count(), 1);
}

#[test]
fn test_distinct_ids_parse_separately() {
    let rt = runtime();
    let cache = CaptureParser::new(rt.handle().clone());
    let options = ParseOptions::new(ToolKind::Art);

    let first = rt.block_on(cache.get_or_parse(TraceId(1), || slow_fixture("art_trace.json"), options));
    let second = rt.block_on(cache.get_or_parse(TraceId(2), || slow_fixture("art_trace.json"), options));

    assert!(!Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    assert_eq!(cache.parse_count(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_completed_parse_is_returned_without_reparsing() {
    let rt = runtime();
    let cache = CaptureParser::new(rt.handle().clone());
    let options = ParseOptions::new(ToolKind::Art);

    let first = rt.block_on(cache.get_or_parse(TraceId(5), || slow_fixture("art_trace.json"), options));
    let first = first.unwrap();
    assert!(first.trace_size() > 0);

    for _ in 0..3 {
        let again = rt
            .block_on(cache.get_or_parse(TraceId(5), || unreachable!("cached"), options))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(cache.parse_count(), 1);
}
