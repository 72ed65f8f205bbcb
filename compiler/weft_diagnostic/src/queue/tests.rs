use pretty_assertions::assert_eq;

use super::*;

fn parallel_error(start: u32) -> Diagnostic {
    Diagnostic::error(ErrorCode::E7001)
        .with_message("invalid use of parallel construct in serial iterator")
        .with_label(Span::new(start, start + 5), "here")
}

#[test]
fn flush_sorts_by_primary_span() {
    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig::unlimited());
    queue.add(parallel_error(30));
    queue.add(parallel_error(10));
    queue.add(parallel_error(20));
    let starts: Vec<u32> = queue
        .flush()
        .iter()
        .filter_map(Diagnostic::primary_span)
        .map(|s| s.start)
        .collect();
    assert_eq!(starts, vec![10, 20, 30]);
    assert_eq!(queue.error_count(), 0);
}

#[test]
fn duplicates_are_dropped() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.add(parallel_error(10)));
    assert!(!queue.add(parallel_error(10)));
    assert!(queue.add(parallel_error(11)));
    assert_eq!(queue.error_count(), 2);
}

#[test]
fn unlimited_config_keeps_duplicates() {
    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig::unlimited());
    assert!(queue.add(parallel_error(10)));
    assert!(queue.add(parallel_error(10)));
    assert_eq!(queue.error_count(), 2);
}

#[test]
fn error_limit_stops_collection() {
    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig {
        error_limit: 2,
        deduplicate: false,
    });
    assert!(queue.add(parallel_error(1)));
    assert!(queue.add(parallel_error(2)));
    assert!(queue.limit_reached());
    assert!(!queue.add(parallel_error(3)));
    assert!(!queue.add(parallel_error(4)));
    let codes: Vec<ErrorCode> = queue.peek().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E7001, ErrorCode::E7001, ErrorCode::E9002]);
    assert_eq!(queue.error_count(), 2);
}

#[test]
fn has_errors_tracks_error_count() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.has_errors().is_none());
    queue.add(Diagnostic::warning(ErrorCode::E7002).with_message("just a warning"));
    assert!(queue.has_errors().is_none());
    let _proof = queue.emit_error(parallel_error(0));
    assert!(queue.has_errors().is_some());
}

#[test]
fn too_many_errors_is_internal() {
    let diag = too_many_errors(10, Span::new(0, 1));
    assert!(diag.code.is_internal());
    assert_eq!(diag.message, "aborting due to 10 previous errors");
}
