use minnow::error::NodeError;
use minnow::resources::Resources;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[test]
fn test_parse_cpu_cores() {
    assert_eq!(Resources::parse("1", "").unwrap().cpu_millicores, 1000);
    assert_eq!(Resources::parse("0.5", "").unwrap().cpu_millicores, 500);
    assert_eq!(Resources::parse("2", "").unwrap().cpu_millicores, 2000);
    assert_eq!(Resources::parse("1.5", "").unwrap().cpu_millicores, 1500);
}

#[test]
fn test_parse_cpu_millis() {
    assert_eq!(Resources::parse("250m", "").unwrap().cpu_millicores, 250);
    assert_eq!(Resources::parse("100m", "").unwrap().cpu_millicores, 100);
    assert_eq!(Resources::parse("1500m", "").unwrap().cpu_millicores, 1500);
}

#[test]
fn test_parse_memory_suffixes() {
    assert_eq!(Resources::parse("", "1024").unwrap().memory_bytes, 1024);
    assert_eq!(Resources::parse("", "1Kb").unwrap().memory_bytes, 1024);
    assert_eq!(Resources::parse("", "500Mb").unwrap().memory_bytes, 500 * MIB);
    assert_eq!(Resources::parse("", "1Gb").unwrap().memory_bytes, GIB);
    assert_eq!(Resources::parse("", "2Tb").unwrap().memory_bytes, 2 * 1024 * GIB);
}

#[test]
fn test_parse_memory_case_insensitive() {
    assert_eq!(Resources::parse("", "100kb").unwrap().memory_bytes, 100 * 1024);
    assert_eq!(Resources::parse("", "100KB").unwrap().memory_bytes, 100 * 1024);
    assert_eq!(Resources::parse("", "100mB").unwrap().memory_bytes, 100 * MIB);
}

#[test]
fn test_parse_empty_is_zero() {
    let parsed = Resources::parse("", "").unwrap();
    assert_eq!(parsed, Resources::default());
    assert!(parsed.is_zero());
}

#[test]
fn test_parse_rejects_garbage() {
    for (cpu, memory) in [
        ("abc", ""),
        ("-1", ""),
        ("1.5m", ""),
        ("", "12qb"),
        ("", "five"),
        ("", "-100Mb"),
        ("", "100 Mb"),
    ] {
        let result = Resources::parse(cpu, memory);
        assert!(
            matches!(result, Err(NodeError::InvalidResourceSyntax(_))),
            "expected syntax error for ({:?}, {:?}), got {:?}",
            cpu,
            memory,
            result
        );
    }
}

#[test]
fn test_render_round_trips() {
    for r in [
        Resources::default(),
        Resources::new(1000, 500 * MIB),
        Resources::new(250, 100 * 1024),
        Resources::new(1500, GIB),
        Resources::new(50, 12345),
        Resources::new(0, 3 * 1024 * GIB),
    ] {
        let (cpu, memory) = r.render();
        let reparsed = Resources::parse(&cpu, &memory).unwrap();
        assert_eq!(reparsed, r, "render {:?} -> ({}, {})", r, cpu, memory);
    }
}

#[test]
fn test_add_and_saturating_sub() {
    let a = Resources::new(500, 100);
    let b = Resources::new(250, 50);
    assert_eq!(a.add(b), Resources::new(750, 150));
    assert_eq!(a.saturating_sub(b), Resources::new(250, 50));
    // Subtraction never goes negative.
    assert_eq!(b.saturating_sub(a), Resources::new(0, 0));
}

#[test]
fn test_less_or_equal() {
    let small = Resources::new(500, 100);
    let big = Resources::new(1000, 200);
    assert!(small.less_or_equal(big));
    assert!(small.less_or_equal(small));
    assert!(!big.less_or_equal(small));
    // Mixed dimensions are not comparable.
    assert!(!Resources::new(2000, 50).less_or_equal(big));
}

#[test]
fn test_within_limits_zero_means_unbounded() {
    let job = Resources::new(4000, 8 * GIB);
    assert!(job.within_limits(Resources::default()));
    assert!(job.within_limits(Resources::new(0, 8 * GIB)));
    assert!(!job.within_limits(Resources::new(0, GIB)));
    assert!(!job.within_limits(Resources::new(2000, 0)));
}

#[test]
fn test_ratio_against_total() {
    let total = Resources::new(1000, 1000);
    let (cpu, memory) = Resources::new(500, 250).ratio_against_total(total);
    assert_eq!(cpu, 0.5);
    assert_eq!(memory, 0.25);

    // A zero total component yields a zero fraction.
    let (cpu, memory) = Resources::new(500, 250).ratio_against_total(Resources::default());
    assert_eq!(cpu, 0.0);
    assert_eq!(memory, 0.0);

    // Fractions clamp at 1.
    let (cpu, _) = Resources::new(2000, 0).ratio_against_total(total);
    assert_eq!(cpu, 1.0);
}
