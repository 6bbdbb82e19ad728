//! Service confirmation state machine.
//!
//! A new problem status is only confirmed after it has been seen on
//! `check_attempts` consecutive cycles. Until then the service is
//! UNCONFIRMED and no notification goes out for it.

use chrono::{DateTime, Utc};

use crate::types::{ServiceCheckResult, ServiceState};

/// Work out the state of a fresh result from the previous one
pub fn advance(
    previous: Option<&ServiceCheckResult>,
    mut current: ServiceCheckResult,
    check_attempts: u32,
    now: DateTime<Utc>,
) -> ServiceCheckResult {
    let Some(previous) = previous else {
        current.state = ServiceState::Confirmed;
        current.check_attempt = 1;
        current.last_state_change = now;
        return current;
    };

    let code_changed = current.return_code != previous.return_code;

    if check_attempts <= 1 {
        current.state = ServiceState::Confirmed;
        current.check_attempt = 1;
    } else if code_changed && current.return_code.is_problem() {
        current.state = ServiceState::Unconfirmed;
        current.check_attempt = 1;
    } else if previous.state == ServiceState::Unconfirmed {
        if previous.check_attempt >= check_attempts - 1 {
            current.state = ServiceState::Confirmed;
            current.check_attempt = 1;
        } else {
            current.state = ServiceState::Unconfirmed;
            current.check_attempt = previous.check_attempt + 1;
        }
    } else {
        current.state = ServiceState::Confirmed;
        current.check_attempt = 1;
    }

    let confirmed_transition = current.state == ServiceState::Confirmed
        && (code_changed || previous.state == ServiceState::Unconfirmed);

    current.last_state_change =
        if confirmed_transition { now } else { previous.last_state_change };

    current
}
