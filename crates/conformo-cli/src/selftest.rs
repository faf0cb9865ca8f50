//! Built-in `unittests` suite
//!
//! The engine checking itself through its own test API, so the binary has
//! something to run out of the box: `conformo run unittests:*`.

use conformo::fixture::Cleanup;
use conformo::query::compare_queries;
use conformo::{
    parse_query, CaseRecorder, CaseStatus, CtsResult, NullBackend, ParamsBuilder, SuiteRegistry,
    TestGroup,
};
use serde_json::json;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Suite name of the built-in tests
pub const SUITE: &str = "unittests";

/// Register the built-in suite with `registry`
pub fn register(registry: &SuiteRegistry) -> CtsResult<()> {
    registry.register_readme(SUITE, "", "Self-tests of the conformo engine")?;
    registry.register_readme(SUITE, "params", "Param-space combinators")?;
    registry.register_file(
        SUITE,
        "params,combine",
        "Cartesian products and filters",
        params_combine,
    )?;
    registry.register_file(
        SUITE,
        "params,subcases",
        "Subcase expansion",
        params_subcases,
    )?;
    registry.register_file(SUITE, "query", "Query parsing and ordering", query)?;
    registry.register_file(SUITE, "logging", "Case recorder statuses", logging)?;
    registry.register_file(SUITE, "fixture", "Resource tracking and skips", fixture)?;
    Ok(())
}

fn params_combine() -> CtsResult<TestGroup<NullBackend>> {
    let mut g = TestGroup::new(NullBackend);

    g.test("cardinality")
        .desc("combine multiplies the space; filter keeps matching records")
        .params(|u| u.combine("a", [1u64, 2, 3]).combine("b", [1u64, 4]))
        .test_fn(|t, p| async move {
            let (a, b) = (p.u64("a")?, p.u64("b")?);
            let space = ParamsBuilder::new()
                .combine("x", 0..a)
                .combine("y", 0..b)
                .build()?;
            let count = space.cases().count() as u64;
            t.expect(count == a * b, format!("{a} x {b} gave {count} cases"))?;

            let filtered = ParamsBuilder::new()
                .combine("x", 0..a)
                .combine("y", 0..b)
                .filter(|r| Ok(r.u64("x")? == 0))
                .build()?;
            let kept = filtered.cases().count() as u64;
            t.expect(kept == b, format!("filter kept {kept} of {count}"))?;
            Ok(())
        })?;

    g.test("pbool")
        .test_fn(|t, _| async move {
            let space = ParamsBuilder::new().pbool("flag").build()?;
            let flags = space
                .records()
                .map(|r| r.and_then(|r| r.bool("flag")))
                .collect::<CtsResult<Vec<_>>>()?;
            t.expect(flags == [false, true], "pbool yields false then true")?;
            Ok(())
        })?;

    g.test("correlated")
        .desc("combine_with_params keeps axes together")
        .params(|u| {
            u.combine_with_params([
                json!({"format": "r8", "bytes": 1}),
                json!({"format": "rgba8", "bytes": 4}),
            ])
        })
        .test_fn(|t, p| async move {
            let expected = if p.str("format")? == "r8" { 1 } else { 4 };
            t.expect(p.u64("bytes")? == expected, "bytes follow the format")?;
            Ok(())
        })?;

    Ok(g)
}

fn params_subcases() -> CtsResult<TestGroup<NullBackend>> {
    let mut g = TestGroup::new(NullBackend);

    g.test("expand")
        .desc("expanded axes depend on earlier ones")
        .params(|u| {
            u.combine("levels", [1u64, 3])
                .begin_subcases()
                .expand("level", |p| Ok(0..p.u64("levels")?))
        })
        .before_all_subcases(|t| async move {
            t.debug("shared setup")?;
            Ok(())
        })
        .test_fn(|t, p| async move {
            let (level, levels) = (p.u64("level")?, p.u64("levels")?);
            t.expect(level < levels, format!("level {level} below {levels}"))?;
            Ok(())
        })?;

    Ok(g)
}

fn query() -> CtsResult<TestGroup<NullBackend>> {
    let mut g = TestGroup::new(NullBackend);

    g.test("roundtrip")
        .desc("parsing then printing is the identity")
        .params(|u| {
            u.combine(
                "text",
                [
                    "s:*",
                    "s:a,b,*",
                    "s:a,b:*",
                    "s:a:t,*",
                    "s:a:t,u:*",
                    r#"s:a:t:{"n":1},*"#,
                    r#"s:a:t:{"n":1,"x":"y"}"#,
                ],
            )
        })
        .test_fn(|t, p| async move {
            let text = p.str("text")?;
            let printed = parse_query(text)?.to_string();
            t.expect(printed == text, format!("{text} printed as {printed}"))?;
            Ok(())
        })?;

    g.test("ordering")
        .desc("broader queries sort before the queries they contain")
        .test_fn(|t, _| async move {
            let broad = parse_query("s:a,*")?;
            let narrow = parse_query("s:a,b:t:*")?;
            t.expect(broad.contains(&narrow), "s:a,* contains s:a,b:t:*")?;
            t.expect(!narrow.contains(&broad), "containment is one-way")?;
            t.expect(
                compare_queries(&broad, &narrow) == CmpOrdering::Less,
                "broad sorts first",
            )?;
            t.should_throw(Some("wildcard"), || parse_query("s:a"))?;
            Ok(())
        })?;

    Ok(g)
}

fn logging() -> CtsResult<TestGroup<NullBackend>> {
    let mut g = TestGroup::new(NullBackend);

    g.test("status")
        .desc("the worst record decides the case status")
        .test_fn(|t, _| async move {
            let mut rec = CaseRecorder::new(false);
            rec.start();
            rec.pass("ok");
            rec.warn("slow", None);
            let warned = rec.finish();
            t.expect(warned.status == CaseStatus::Warn, "warn outranks pass")?;

            let mut rec = CaseRecorder::new(false);
            rec.start();
            rec.expectation_failed("bad", None);
            rec.warn("slow", None);
            let failed = rec.finish();
            t.expect(failed.status == CaseStatus::Fail, "failure outranks warn")?;

            let mut rec = CaseRecorder::new(false);
            rec.start();
            rec.debug("hidden");
            t.expect(rec.logs().is_empty(), "debug lines need debug mode")?;
            Ok(())
        })?;

    Ok(g)
}

fn fixture() -> CtsResult<TestGroup<NullBackend>> {
    let mut g = TestGroup::new(NullBackend);

    g.test("tracked")
        .desc("tracked resources are released exactly once")
        .test_fn(|t, _| async move {
            let released = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&released);
            let handle =
                t.track_for_cleanup(Cleanup::new(move || flag.store(true, Ordering::SeqCst)))?;
            t.expect(t.tracked_count() == 1, "one resource tracked")?;
            t.expect(handle.release(), "explicit release")?;
            t.expect(released.load(Ordering::SeqCst), "cleanup ran")?;
            t.expect(!handle.release(), "second release does nothing")?;
            Ok(())
        })?;

    g.test("rejection")
        .desc("eventual rejections are checked at finalization")
        .test_fn(|t, _| async move {
            t.should_reject(Some("refused"), async { Err::<(), _>("refused by backend") })?;
            Ok(())
        })?;

    g.test("skip")
        .desc("backends without optional features skip")
        .test_fn(|t, _| async move { t.skip("NullBackend has no optional features") })?;

    g.test("device_loss")
        .desc("needs a backend that can lose its device")
        .unimplemented()?;

    Ok(g)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conformo::{Logger, Runner, RunnerOptions};

    fn registry() -> Arc<SuiteRegistry> {
        let registry = Arc::new(SuiteRegistry::new());
        register(&registry).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_suite_passes() {
        let runner = Runner::new(registry(), RunnerOptions::new());
        let logger = Logger::new();
        let summary = runner
            .run(&[parse_query("unittests:*").unwrap()], &logger)
            .await
            .unwrap();
        for (query, result) in logger.results() {
            assert!(result.status.is_ok(), "{query}: {result:?}");
        }
        assert!(summary.is_success());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unimplemented, 1);
        assert!(summary.passed >= 10);
    }

    #[test]
    fn test_register_twice_rejected() {
        let registry = registry();
        assert!(register(&registry).is_err());
    }
}
