//! Restart event classification

use crate::model::InboundEvent;

/// Reasons that always denote a restart
pub const RESTART_REASONS: [&str; 5] = ["Killing", "BackOff", "FailedMount", "Failed", "Unhealthy"];

/// Message fragments that denote a restart when the reason does not
const RESTART_KEYWORDS: [&str; 3] = ["restart", "restarting", "killed"];

/// Whether `event` reports a workload restart
///
/// The reason is checked against [`RESTART_REASONS`] first; otherwise the
/// lower-cased message is searched for restart keywords.
///
/// # Examples
///
/// ```
/// use podwatch::model::InboundEvent;
/// use podwatch::watcher::is_restart_event;
///
/// assert!(is_restart_event(&InboundEvent::pod_warning("ns", "p", "BackOff", "")));
/// assert!(is_restart_event(&InboundEvent::pod_warning("ns", "p", "Custom", "Container KILLED")));
/// assert!(!is_restart_event(&InboundEvent::pod_warning("ns", "p", "Scheduled", "assigned")));
/// ```
pub fn is_restart_event(event: &InboundEvent) -> bool {
    if RESTART_REASONS.contains(&event.reason.as_str()) {
        return true;
    }

    let message = event.message.to_lowercase();
    RESTART_KEYWORDS
        .iter()
        .any(|keyword| message.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(reason: &str, message: &str) -> InboundEvent {
        InboundEvent::pod_warning("ns", "worker-1", reason, message)
    }

    #[test]
    fn test_allow_listed_reasons_ignore_message() {
        for reason in RESTART_REASONS {
            assert!(is_restart_event(&event(reason, "")), "{reason}");
            assert!(is_restart_event(&event(reason, "nothing to see")), "{reason}");
        }
    }

    #[test]
    fn test_reason_match_is_exact() {
        assert!(!is_restart_event(&event("backoff", "")));
        assert!(!is_restart_event(&event("BackOffExtra", "")));
    }

    #[test]
    fn test_message_keywords_any_case() {
        assert!(is_restart_event(&event("Custom", "Container will be RESTARTED")));
        assert!(is_restart_event(&event("Custom", "Restarting failed container")));
        assert!(is_restart_event(&event("Custom", "process was Killed by OOM")));
    }

    #[test]
    fn test_scheduled_without_keywords() {
        assert!(!is_restart_event(&event(
            "Scheduled",
            "Successfully assigned ns/worker-1 to node-a"
        )));
        assert!(!is_restart_event(&event("Scheduled", "")));
    }

    #[test]
    fn test_scheduled_with_keyword_falls_back_to_message() {
        assert!(is_restart_event(&event("Scheduled", "pod restart pending")));
    }
}
