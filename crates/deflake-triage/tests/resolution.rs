//! Integration tests for artifact resolution and location extraction
//!
//! Builds realistic Playwright output trees on disk and checks:
//! - Kind weight dominates recency
//! - Binary traces defer to the aggregate report
//! - Extraction on a real-looking failure log

use deflake_core::{ArtifactKind, DeflakeError};
use deflake_triage::{ArtifactResolver, ExtractionContext, LocationExtractor, ResolverConfig};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Helper to write a file with a fixed modification time
fn write_at(path: &Path, contents: &[u8], age_secs: u64) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
    path.to_path_buf()
}

fn resolver(root: &Path) -> ArtifactResolver {
    ArtifactResolver::new(root, ResolverConfig::default())
}

#[test]
fn test_markdown_context_beats_newer_html_and_trace() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("test-results/login-rejects-chromium");

    let md = write_at(&results.join("error-context.md"), b"# Page snapshot", 3600);
    write_at(&results.join("page.html"), b"<html></html>", 60);
    write_at(&results.join("trace.zip"), b"PK\x03\x04", 1);

    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, md);
    assert_eq!(resolved.kind, ArtifactKind::RichContext);
}

#[test]
fn test_lone_trace_defers_to_aggregate_report() {
    let temp_dir = TempDir::new().unwrap();
    write_at(
        &temp_dir.path().join("test-results/checkout-chromium/trace.zip"),
        b"PK\x03\x04",
        1,
    );
    let report = write_at(
        &temp_dir.path().join("playwright-report/index.html"),
        b"<html>report</html>",
        600,
    );

    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, report);
    assert_eq!(resolved.kind, ArtifactKind::HtmlSnapshot);
}

#[test]
fn test_newest_html_wins_among_snapshots() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("test-results");

    write_at(&results.join("a/old.html"), b"old", 7200);
    let newest = write_at(&results.join("b/new.html"), b"new", 10);

    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, newest);
}

#[test]
fn test_much_newer_trace_defers_to_older_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("test-results");

    let snap = write_at(&results.join("a/snap.html"), b"<p>", 120);
    write_at(&results.join("a/trace.zip"), b"PK", 1);

    // No report on disk: the outranked snapshot is still usable evidence
    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, snap);
    assert_eq!(resolved.kind, ArtifactKind::HtmlSnapshot);
}

#[test]
fn test_aggregate_report_preferred_over_outranked_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("test-results");

    write_at(&results.join("a/snap.html"), b"<p>", 86_400);
    write_at(&results.join("a/trace.zip"), b"PK", 1);
    let report = write_at(
        &temp_dir.path().join("playwright-report/index.html"),
        b"<html>report</html>",
        600,
    );

    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, report);
}

#[test]
fn test_traces_only_is_unsupported() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("test-results");

    write_at(&results.join("a/trace.zip"), b"PK", 300);
    let newest = write_at(&results.join("b/trace.zip"), b"PK", 1);

    match resolver(temp_dir.path()).resolve() {
        Err(DeflakeError::UnsupportedArtifact { path }) => assert_eq!(path, newest),
        other => panic!("expected UnsupportedArtifact, got {:?}", other),
    }
}

#[test]
fn test_aggregate_index_inside_results_is_not_a_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    write_at(&temp_dir.path().join("test-results/index.html"), b"<html>", 5);

    let candidates = resolver(temp_dir.path()).scan();
    assert!(candidates.is_empty());

    // ...but it is still reachable as a conventional fallback
    let resolved = resolver(temp_dir.path()).resolve().unwrap().unwrap();
    assert_eq!(resolved.path, temp_dir.path().join("test-results/index.html"));
}

#[test]
fn test_custom_results_dir() {
    let temp_dir = TempDir::new().unwrap();
    let md = write_at(&temp_dir.path().join("out/run-1/error-context.md"), b"ctx", 5);

    let config = ResolverConfig {
        results_dir: PathBuf::from("out"),
        ..ResolverConfig::default()
    };
    let resolved = ArtifactResolver::new(temp_dir.path(), config)
        .resolve()
        .unwrap()
        .unwrap();
    assert_eq!(resolved.path, md);
}

#[test]
fn test_extraction_against_resolved_tree() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_at(&root.join("pages/login.page.ts"), b"export class LoginPage {}\n", 5);

    let log = format!(
        "  1) [chromium] › tests/login.spec.ts:8:3 › login\n\n\
         Error: locator.click: Timeout 5000ms exceeded.\n\
             at Frame.click ({root}/node_modules/playwright-core/lib/client/frame.js:1:1)\n\
             at Page.click ({root}/node_modules/playwright-core/lib/client/page.js:2:2)\n\
             at LoginPage.submit (pages/login.page.ts:12:16)\n\
             at {root}/tests/login.spec.ts:14:7\n",
        root = root.display()
    );

    let extractor = LocationExtractor::new(ExtractionContext::new(root));
    let location = extractor.extract(&log).unwrap();

    assert_eq!(location.spec_file.as_deref(), Some("tests/login.spec.ts"));
    assert_eq!(location.test_start_line, Some(8));
    assert_eq!(location.root_cause_file.as_deref(), Some("login.page.ts"));
    assert_eq!(
        location.root_cause_absolute_path,
        Some(root.join("pages/login.page.ts"))
    );
    assert_eq!(location.root_cause_line, Some(12));
    assert_eq!(location.test_step_line, Some(14));
}
