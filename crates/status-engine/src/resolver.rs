//! Status Resolver
//!
//! Fuses interface availability, trigger problems and the latency probe into
//! one status. Highest-priority signal wins; nothing is blended.

use chrono::{DateTime, Utc};
use telemetry::{HostRecord, InterfaceState, LatencyProbe};
use topology::{HostState, HostStatus};

/// Resolve one host's status.
///
/// 1. A firing trigger means DOWN, whatever the interfaces say.
/// 2. Otherwise any available interface means UP; interfaces that all report
///    unavailable mean DOWN; no interface state at all means UNKNOWN.
///
/// A host missing from the backend's answer is UNKNOWN with no latency and
/// no check time.
pub fn resolve(
    host: Option<&HostRecord>,
    has_trigger_problem: bool,
    latency: Option<&LatencyProbe>,
    now: DateTime<Utc>,
) -> HostStatus {
    let latency_ms = latency.and_then(|probe| probe.latency_ms);
    let last_check = latency.and_then(|probe| probe.clock).unwrap_or(now);

    if has_trigger_problem {
        return HostStatus {
            status: HostState::Down,
            latency: latency_ms,
            last_check: Some(last_check),
            trigger_problem: Some(true),
        };
    }

    let Some(host) = host else {
        return HostStatus::unknown();
    };

    HostStatus {
        status: interface_state(&host.interfaces),
        latency: latency_ms,
        last_check: Some(last_check),
        trigger_problem: Some(false),
    }
}

fn interface_state(interfaces: &[InterfaceState]) -> HostState {
    let mut reported = interfaces
        .iter()
        .filter(|state| **state != InterfaceState::Unknown)
        .peekable();
    if reported.peek().is_none() {
        return HostState::Unknown;
    }
    if reported.any(|state| *state == InterfaceState::Available) {
        HostState::Up
    } else {
        HostState::Down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn host(interfaces: Vec<InterfaceState>) -> HostRecord {
        HostRecord {
            external_id: "101".into(),
            name: "ring-a".into(),
            interfaces,
        }
    }

    fn probe(latency_ms: Option<f64>, secs: Option<i64>) -> LatencyProbe {
        LatencyProbe {
            external_id: "101".into(),
            latency_ms,
            clock: secs.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_500, 0).unwrap()
    }

    #[test]
    fn test_trigger_problem_overrides_available_interface() {
        let record = host(vec![InterfaceState::Available]);
        let latency = probe(Some(3.0), Some(1_700_000_000));
        let status = resolve(Some(&record), true, Some(&latency), now());
        assert_eq!(status.status, HostState::Down);
        assert_eq!(status.latency, Some(3.0));
        assert_eq!(status.trigger_problem, Some(true));
    }

    #[test]
    fn test_interface_rules() {
        use InterfaceState::*;
        let cases = [
            (vec![Available, Unavailable], HostState::Up),
            (vec![Unavailable, Unavailable], HostState::Down),
            (vec![Unavailable, Unknown], HostState::Down),
            (vec![Unknown], HostState::Unknown),
            (vec![], HostState::Unknown),
        ];
        for (interfaces, expected) in cases {
            let status = resolve(Some(&host(interfaces.clone())), false, None, now());
            assert_eq!(status.status, expected, "{:?}", interfaces);
        }
    }

    #[test]
    fn test_last_check_prefers_probe_clock() {
        let record = host(vec![InterfaceState::Available]);
        let latency = probe(Some(1.0), Some(1_700_000_000));
        let status = resolve(Some(&record), false, Some(&latency), now());
        assert_eq!(status.last_check.map(|c| c.timestamp()), Some(1_700_000_000));

        let status = resolve(Some(&record), false, None, now());
        assert_eq!(status.last_check, Some(now()));
    }

    #[test]
    fn test_absent_host_is_bare_unknown() {
        let latency = probe(Some(1.0), Some(1_700_000_000));
        let status = resolve(None, false, Some(&latency), now());
        assert_eq!(status, HostStatus::unknown());
    }

    fn interface() -> impl Strategy<Value = InterfaceState> {
        prop_oneof![
            Just(InterfaceState::Available),
            Just(InterfaceState::Unavailable),
            Just(InterfaceState::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn prop_trigger_problem_always_down(
            present in any::<bool>(),
            interfaces in proptest::collection::vec(interface(), 0..6),
            latency in proptest::option::of(0.0f64..500.0),
            clock in proptest::option::of(1_600_000_000i64..1_800_000_000),
        ) {
            let record = host(interfaces);
            let latency = probe(latency, clock);
            let status = resolve(present.then_some(&record), true, Some(&latency), now());
            prop_assert_eq!(status.status, HostState::Down);
        }
    }
}
