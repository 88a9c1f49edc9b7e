use super::*;
use crate::cycles::VirtualClock;

const SECTION: SectionId = SectionId(1);
const OTHER: SectionId = SectionId(2);

fn instrumented(step: u64) -> (Arc<VirtualClock>, Instrumentation) {
    let clock = Arc::new(VirtualClock::with_step(1_000_000, step));
    let instrumentation = Instrumentation::new(clock.clone());
    instrumentation.register(SECTION, "Sem. Post/Pend");
    instrumentation.register(OTHER, "Task 0 to 1");
    instrumentation.reset();
    instrumentation.start_measuring();
    (clock, instrumentation)
}

#[test]
fn test_reset_without_pairs_reports_no_data() {
    let (_, instrumentation) = instrumented(1);

    assert_eq!(instrumentation.average_cycles(SECTION).unwrap(), None);
    let section = instrumentation.section(SECTION).unwrap();
    assert_eq!(section.invocations, 0);
    assert_eq!(section.accumulated_cycles, 0);
}

#[test]
fn test_k_pairs_of_c_cycles() {
    const K: u64 = 7;
    const C: u64 = 40;
    let (_, instrumentation) = instrumented(C);

    for _ in 0..K {
        instrumentation.begin(SECTION).unwrap();
        instrumentation.end(SECTION).unwrap();
    }

    let section = instrumentation.section(SECTION).unwrap();
    assert_eq!(section.accumulated_cycles, K * C);
    assert_eq!(section.invocations, K);
    assert_eq!(section.average_cycles(), Some(C));
    assert!(!section.started);
}

#[test]
fn test_sections_accumulate_independently() {
    let (clock, instrumentation) = instrumented(0);

    instrumentation.begin(SECTION).unwrap();
    clock.advance(100);
    instrumentation.begin(OTHER).unwrap();
    clock.advance(30);
    instrumentation.end(OTHER).unwrap();
    instrumentation.end(SECTION).unwrap();

    assert_eq!(instrumentation.section(SECTION).unwrap().accumulated_cycles, 130);
    assert_eq!(instrumentation.section(OTHER).unwrap().accumulated_cycles, 30);
}

#[test]
fn test_begin_while_started_is_violation() {
    let (_, instrumentation) = instrumented(1);

    instrumentation.begin(SECTION).unwrap();
    let err = instrumentation.begin(SECTION).unwrap_err();

    assert_eq!(
        err,
        InstrumentationError::ProtocolViolation {
            id: SECTION,
            name: "Sem. Post/Pend".to_string(),
            violation: Violation::BeginWhileStarted,
        }
    );
    assert_eq!(instrumentation.violations(), 1);
    // The open measurement is kept, not merged.
    assert_eq!(instrumentation.section(SECTION).unwrap().invocations, 1);
}

#[test]
fn test_end_while_idle_is_violation() {
    let (_, instrumentation) = instrumented(1);

    let err = instrumentation.end(SECTION).unwrap_err();
    assert!(matches!(
        err,
        InstrumentationError::ProtocolViolation {
            violation: Violation::EndWhileIdle,
            ..
        }
    ));
    assert_eq!(instrumentation.violations(), 1);
}

#[test]
fn test_unknown_section() {
    let (_, instrumentation) = instrumented(1);
    let unknown = SectionId(9);

    assert_eq!(
        instrumentation.begin(unknown),
        Err(InstrumentationError::UnknownSection(unknown))
    );
    assert!(instrumentation.average_cycles(unknown).is_err());
}

#[test]
fn test_calls_outside_window_are_ignored() {
    let (_, instrumentation) = instrumented(10);
    instrumentation.stop_measuring();

    instrumentation.begin(SECTION).unwrap();
    instrumentation.end(SECTION).unwrap();
    instrumentation.end(SECTION).unwrap();

    let section = instrumentation.section(SECTION).unwrap();
    assert_eq!(section.invocations, 0);
    assert_eq!(instrumentation.violations(), 0);
}

#[test]
fn test_global_window_total() {
    let clock = Arc::new(VirtualClock::new(1_000));
    let instrumentation = Instrumentation::new(clock.clone());

    instrumentation.start_measuring();
    assert!(instrumentation.is_measuring());
    clock.advance(500);
    assert_eq!(instrumentation.total_cycles(), 500);
    instrumentation.stop_measuring();
    clock.advance(500);

    assert!(!instrumentation.is_measuring());
    assert_eq!(instrumentation.total_cycles(), 500);
}

#[test]
fn test_reset_clears_everything() {
    let (clock, instrumentation) = instrumented(5);
    instrumentation.begin(SECTION).unwrap();
    instrumentation.end(SECTION).unwrap();
    let _ = instrumentation.end(SECTION);
    clock.advance(10);

    instrumentation.reset();

    assert_eq!(instrumentation.violations(), 0);
    assert_eq!(instrumentation.total_cycles(), 0);
    assert!(!instrumentation.is_measuring());
    assert!(instrumentation
        .sections()
        .iter()
        .all(|s| s.invocations == 0 && s.accumulated_cycles == 0));
}

#[test]
fn test_sections_listed_in_id_order() {
    let (_, instrumentation) = instrumented(1);
    let names: Vec<_> = instrumentation
        .sections()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Sem. Post/Pend", "Task 0 to 1"]);
}
